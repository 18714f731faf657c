/// Simulation main loop.
///
/// Each step solves the shared sharing system, asks every model for its
/// next completion, clamps the step to the first trace event that touches
/// a busy resource, advances the clock and lets every model retire what
/// finished. The loop is purely synchronous and single-threaded; equal
/// inputs give equal runs.

use tracing::{debug, info, warn};

use crate::action::{Action, ActionHandle, ActionId, ActionSpec, ActionState, ModelKind};
use crate::config::{KernelConfig, UpdateMode};
use crate::error::{KernelError, KernelResult};
use crate::model::{
    share_all, CpuModel, DiskUsage, ModelContext, NetworkModel, ParallelTask, PtaskModel,
    ResourceModel, StorageModel,
};
use crate::resource::{Resource, ResourceClass, ResourceId, ResourceSpec, ResourceState};
use crate::solver::System;
use crate::time::{double_equals, VirtualTime};
use crate::trace::{TraceKind, TraceManager, TraceSource, TraceValue};

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level kernel driver.
///
/// Owns one model per resource class, the parallel-task model, the shared
/// sharing system, the trace provider and the clock. Call `step` to
/// advance by one completion or state change, `run` to go until nothing
/// more can happen, `run_until` to stop at a date.
#[derive(Debug, Clone)]
pub struct Simulation<T: TraceSource = TraceManager> {
    config: KernelConfig,
    clock: VirtualTime,
    cpu: CpuModel,
    network: NetworkModel,
    storage: StorageModel,
    ptask: PtaskModel,
    solver: System,
    trace: T,
    steps: u64,
    presolved: bool,
}

impl Simulation<TraceManager> {
    /// Create a simulation at time zero with the default trace provider.
    pub fn new(config: KernelConfig) -> KernelResult<Self> {
        Self::with_trace(config, TraceManager::new())
    }
}

impl<T: TraceSource> Simulation<T> {
    /// Create a simulation reading trace events from `trace`.
    ///
    /// The sharing system solves selectively as soon as one model is lazy.
    pub fn with_trace(config: KernelConfig, trace: T) -> KernelResult<Self> {
        config.validate()?;
        let selective = [
            config.cpu.update,
            config.network.update,
            config.storage.update,
            config.ptask.update,
        ]
        .contains(&UpdateMode::Lazy);
        Ok(Simulation {
            cpu: CpuModel::new(&config),
            network: NetworkModel::new(&config),
            storage: StorageModel::new(&config),
            ptask: PtaskModel::new(&config),
            solver: System::new(selective, config.maxmin_precision),
            config,
            clock: VirtualTime::ZERO,
            trace,
            steps: 0,
            presolved: false,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.clock
    }

    /// Steps committed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Access the trace provider (e.g. to schedule one-off events).
    pub fn trace_mut(&mut self) -> &mut T {
        &mut self.trace
    }

    pub fn cpu(&self) -> &CpuModel {
        &self.cpu
    }

    pub fn network(&self) -> &NetworkModel {
        &self.network
    }

    pub fn storage(&self) -> &StorageModel {
        &self.storage
    }

    pub fn ptask(&self) -> &PtaskModel {
        &self.ptask
    }

    pub fn model(&self, kind: ModelKind) -> &dyn ResourceModel {
        match kind {
            ModelKind::Cpu => &self.cpu,
            ModelKind::Network => &self.network,
            ModelKind::Storage => &self.storage,
            ModelKind::Ptask => &self.ptask,
        }
    }

    /// One model and the shared system, borrowed together.
    fn part_mut(&mut self, kind: ModelKind) -> (&mut dyn ResourceModel, &mut System) {
        let model: &mut dyn ResourceModel = match kind {
            ModelKind::Cpu => &mut self.cpu,
            ModelKind::Network => &mut self.network,
            ModelKind::Storage => &mut self.storage,
            ModelKind::Ptask => &mut self.ptask,
        };
        (model, &mut self.solver)
    }

    fn parts_mut(&mut self) -> ([&mut dyn ResourceModel; 4], &mut System) {
        (
            [&mut self.cpu, &mut self.network, &mut self.storage, &mut self.ptask],
            &mut self.solver,
        )
    }

    fn context(&self, kind: ModelKind) -> &ModelContext {
        self.model(kind).context()
    }

    // ── Resources ─────────────────────────────────────────────────────

    /// Register a resource and attach its traces, starting now.
    pub fn create_resource(&mut self, spec: ResourceSpec) -> KernelResult<ResourceId> {
        let now = self.clock.seconds();
        let (model, sys) = self.part_mut(spec.class.into());
        let id = model.add_resource(&spec, sys)?;
        if let Some(trace) = &spec.scale_trace {
            self.trace.attach(id, TraceKind::Scale, trace, now);
        }
        if let Some(trace) = &spec.state_trace {
            self.trace.attach(id, TraceKind::State, trace, now);
        }
        info!(resource = %id, name = %spec.name, peak = spec.peak, "resource created");
        Ok(id)
    }

    pub fn resource(&self, id: ResourceId) -> KernelResult<&Resource> {
        self.context(id.class().into()).resource(id)
    }

    /// Every resource, cpus first, then links, then disks.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        ResourceClass::ALL
            .into_iter()
            .flat_map(move |class| self.context(class.into()).resources())
    }

    /// Look a resource up by class and name.
    pub fn resource_id(&self, class: ResourceClass, name: &str) -> Option<ResourceId> {
        self.context(class.into()).resource_by_name(name)
    }

    pub fn resource_state(&self, id: ResourceId) -> KernelResult<ResourceState> {
        Ok(self.resource(id)?.state())
    }

    /// Effective capacity: `peak × scale × cores`.
    pub fn resource_capacity(&self, id: ResourceId) -> KernelResult<f64> {
        Ok(self.resource(id)?.capacity())
    }

    /// Consumption on the resource after the last solve, parallel tasks
    /// included.
    pub fn resource_usage(&self, id: ResourceId) -> KernelResult<f64> {
        self.resource(id)?;
        Ok(self.context(id.class().into()).resource_usage(id, &self.solver))
    }

    /// `true` if some live action is bound to the resource.
    pub fn resource_used(&self, id: ResourceId) -> bool {
        self.model(id.class().into()).resource_used(id, &self.solver)
    }

    /// Disk space accounting of a storage resource.
    pub fn disk_usage(&self, id: ResourceId) -> KernelResult<DiskUsage> {
        self.storage.usage(id).ok_or(KernelError::UnknownResource(id))
    }

    /// Current state of every listed resource, for the parallel-task model.
    fn snapshot(&self, ids: impl Iterator<Item = ResourceId>) -> KernelResult<Vec<Resource>> {
        ids.map(|id| self.resource(id).cloned()).collect()
    }

    // ── Actions ───────────────────────────────────────────────────────

    /// Create a generic action.
    ///
    /// Demands on a single class go to that class's model. Demands that
    /// span several classes make a parallel task with one variable over
    /// all of them.
    pub fn create_action(&mut self, spec: ActionSpec) -> KernelResult<ActionHandle> {
        let Some((first, _)) = spec.demands().first().copied() else {
            return Err(KernelError::EmptyDemands);
        };
        let now = self.clock.seconds();
        if spec.demands().iter().all(|(r, _)| r.class() == first.class()) {
            let (model, sys) = self.part_mut(first.class().into());
            return model.context_mut().start_action(spec, now, sys);
        }
        let resources = self.snapshot(spec.demands().iter().map(|(r, _)| *r))?;
        debug!(demands = spec.demands().len(), "multi-class action becomes a parallel task");
        self.ptask.start(spec, &resources, now, &mut self.solver)
    }

    /// Start a parallel task of computations and transfers progressing together.
    pub fn execute_parallel(&mut self, task: &ParallelTask) -> KernelResult<ActionHandle> {
        let now = self.clock.seconds();
        let resources = self.snapshot(task.resources())?;
        self.ptask.execute_parallel(task, &resources, now, &mut self.solver)
    }

    /// Compute `amount` on `cpu`.
    pub fn execute(&mut self, cpu: ResourceId, amount: f64) -> KernelResult<ActionHandle> {
        let now = self.clock.seconds();
        self.cpu.execute(cpu, amount, now, &mut self.solver)
    }

    /// Sleep on `cpu` for `duration`, or forever with `None`.
    pub fn sleep(&mut self, cpu: ResourceId, duration: Option<f64>) -> KernelResult<ActionHandle> {
        let now = self.clock.seconds();
        self.cpu.sleep(cpu, duration, now, &mut self.solver)
    }

    /// Transfer `size` along an explicit route of links.
    pub fn communicate(
        &mut self,
        route: &[ResourceId],
        size: f64,
        rate: Option<f64>,
    ) -> KernelResult<ActionHandle> {
        let now = self.clock.seconds();
        self.network.communicate(route, size, rate, now, &mut self.solver)
    }

    pub fn read(&mut self, storage: ResourceId, size: f64) -> KernelResult<ActionHandle> {
        let now = self.clock.seconds();
        self.storage.read(storage, size, now, &mut self.solver)
    }

    pub fn write(&mut self, storage: ResourceId, size: f64) -> KernelResult<ActionHandle> {
        let now = self.clock.seconds();
        self.storage.write(storage, size, now, &mut self.solver)
    }

    pub fn action(&self, id: ActionId) -> KernelResult<&Action> {
        self.context(id.model()).action(id)
    }

    /// Every action of every model not yet released.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        ModelKind::ALL
            .into_iter()
            .flat_map(move |kind| self.context(kind).actions())
    }

    /// Number of actions currently holding capacity (running or suspended).
    pub fn live_actions(&self) -> usize {
        ModelKind::ALL
            .iter()
            .map(|kind| self.context(*kind).live_actions())
            .sum()
    }

    pub fn action_cancel(&mut self, id: ActionId) -> KernelResult<()> {
        let now = self.clock.seconds();
        let (model, sys) = self.part_mut(id.model());
        model.context_mut().cancel(id, now, sys)
    }

    pub fn action_suspend(&mut self, id: ActionId) -> KernelResult<()> {
        let now = self.clock.seconds();
        let (model, sys) = self.part_mut(id.model());
        model.context_mut().suspend(id, now, sys)
    }

    pub fn action_resume(&mut self, id: ActionId) -> KernelResult<()> {
        let now = self.clock.seconds();
        let (model, sys) = self.part_mut(id.model());
        model.context_mut().resume(id, now, sys)
    }

    pub fn action_set_priority(&mut self, id: ActionId, priority: f64) -> KernelResult<()> {
        let now = self.clock.seconds();
        let (model, sys) = self.part_mut(id.model());
        model.context_mut().set_priority(id, priority, now, sys)
    }

    pub fn action_set_max_duration(&mut self, id: ActionId, duration: Option<f64>) -> KernelResult<()> {
        let (model, _) = self.part_mut(id.model());
        model.context_mut().set_max_duration(id, duration)
    }

    /// Remaining work as of now.
    pub fn action_get_remaining(&self, id: ActionId) -> KernelResult<f64> {
        self.context(id.model())
            .remaining(id, self.clock.seconds(), &self.solver)
    }

    pub fn action_get_state(&self, id: ActionId) -> KernelResult<ActionState> {
        Ok(self.action(id)?.state())
    }

    pub fn action_start_time(&self, id: ActionId) -> KernelResult<f64> {
        Ok(self.action(id)?.start())
    }

    pub fn action_finish_time(&self, id: ActionId) -> KernelResult<Option<f64>> {
        Ok(self.action(id)?.finish())
    }

    /// Current rate allocated to the action.
    pub fn action_rate(&self, id: ActionId) -> KernelResult<f64> {
        self.action(id)?;
        Ok(self.context(id.model()).rate(id, &self.solver))
    }

    // ── Main loop ─────────────────────────────────────────────────────

    /// Route a trace event to the resource's owner, then to the
    /// parallel-task model in case it mirrors the resource.
    fn apply_event(&mut self, resource: ResourceId, value: TraceValue, date: f64) {
        let (model, sys) = self.part_mut(resource.class().into());
        model.update_resource_state(resource, value, date, sys);
        self.ptask
            .update_resource_state(resource, value, date, &mut self.solver);
    }

    /// Apply every trace event dated at or before now, then let the models
    /// settle at the current date. Called automatically by the first step.
    pub fn presolve(&mut self) {
        let now = self.clock.seconds();
        while let Some(date) = self.trace.next_event_date() {
            if date > now {
                break;
            }
            while let Some(event) = self.trace.pop_event_leq(date) {
                self.apply_event(event.resource, event.value, now);
            }
        }
        let (models, solver) = self.parts_mut();
        for model in models {
            model.update_actions_state(now, 0.0, solver);
        }
        self.presolved = true;
        debug!(now, "presolve done");
    }

    /// Perform one step.
    ///
    /// Returns the elapsed delay, or `None` once no action can complete and
    /// no trace event is pending. An action stalled at rate zero with no
    /// deadline, on a resource of capacity zero for instance, never
    /// completes: it stays RUNNING after `solve` has returned `None`.
    pub fn solve(&mut self) -> Option<f64> {
        self.solve_until(None)
    }

    /// Alias of [`solve`](Self::solve).
    pub fn step(&mut self) -> Option<f64> {
        self.solve()
    }

    /// Perform one step without moving the clock past `date`.
    pub fn step_until(&mut self, date: f64) -> Option<f64> {
        self.solve_until(Some(date))
    }

    fn solve_until(&mut self, max_date: Option<f64>) -> Option<f64> {
        if !self.presolved {
            self.presolve();
        }
        let now = self.clock.seconds();

        let mut min: Option<f64> = max_date.map(|d| (d - now).max(0.0));
        let (mut models, solver) = self.parts_mut();
        if let Some(next) = share_all(&mut models, solver, now) {
            min = Some(min.map_or(next, |m| m.min(next)));
        }
        debug!(now, min = ?min, "resources shared");

        while let Some(next_date) = self.trace.next_event_date() {
            if let Some(m) = min {
                if next_date > now + m {
                    break;
                }
            }
            // Nothing completes on its own: jump to the event.
            if min.is_none() {
                min = Some((next_date - now).max(0.0));
            }
            while let Some(event) = self.trace.pop_event_leq(next_date) {
                if self.resource_used(event.resource) {
                    min = Some((next_date - now).max(0.0));
                }
                self.apply_event(event.resource, event.value, next_date);
            }
        }

        let Some(delta) = min else {
            debug!(now, "no completion and no pending event");
            return None;
        };
        let Some(clock) = self.clock.advance(delta) else {
            warn!(now, delta, "step delay out of range");
            return None;
        };

        self.clock = clock;
        if let Some(date) = max_date {
            if double_equals(self.clock.seconds(), date, self.config.precision) {
                self.clock = VirtualTime::new(date.max(self.clock.seconds()));
            }
        }
        let now = self.clock.seconds();
        let (models, solver) = self.parts_mut();
        for model in models {
            model.update_actions_state(now, delta, solver);
            model.collect_garbage();
        }
        self.steps += 1;
        debug!(now, delta, step = self.steps, "step committed");
        Some(delta)
    }

    /// Run until nothing more can happen.
    ///
    /// Never returns if a periodic trace keeps producing events.
    /// Returns the number of steps performed during this run.
    pub fn run(&mut self) -> u64 {
        let start = self.steps;
        while self.step().is_some() {}
        self.steps - start
    }

    /// Run until nothing more can happen **or** `max_steps` steps have
    /// been performed, whichever comes first.
    pub fn run_for(&mut self, max_steps: u64) -> u64 {
        let start = self.steps;
        while self.steps - start < max_steps {
            if self.step().is_none() {
                break;
            }
        }
        self.steps - start
    }

    /// Run until the clock reaches `date` (or nothing more can happen).
    pub fn run_until(&mut self, date: f64) -> u64 {
        let start = self.steps;
        while self.clock.seconds() < date {
            if self.step_until(date).is_none() {
                break;
            }
        }
        self.steps - start
    }

    /// `true` if no action holds capacity and no trace event is pending.
    pub fn is_finished(&self) -> bool {
        self.live_actions() == 0 && self.trace.next_event_date().is_none()
    }
}
