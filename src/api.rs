/// Step-by-step simulation API for external interfaces.
///
/// Wraps a `Simulation` together with the named actions it tracks, and
/// exports serde snapshots of its state. This is what the CLI drives.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::action::{ActionHandle, ActionKind, ActionState};
use crate::dsl::ScenarioRun;
use crate::error::KernelResult;
use crate::resource::{ResourceClass, ResourceState};
use crate::simulation::Simulation;

// ── Reports ───────────────────────────────────────────────────────────

/// Result of a single simulation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Steps performed so far, this one included.
    pub step: u64,
    /// Clock after the step.
    pub time: f64,
    /// Elapsed virtual time.
    pub delta: f64,
    /// Tracked actions that reached a terminal state during the step.
    pub finished: Vec<ActionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub name: String,
    pub id: String,
    pub kind: ActionKind,
    pub state: ActionState,
    pub remaining: f64,
    pub rate: f64,
    pub start: f64,
    pub finish: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub id: String,
    pub name: String,
    pub class: ResourceClass,
    pub state: ResourceState,
    pub capacity: f64,
    pub usage: f64,
    pub used: bool,
}

/// Serializable view of the whole simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub time: f64,
    pub steps: u64,
    pub finished: bool,
    pub resources: Vec<ResourceReport>,
    pub actions: Vec<ActionReport>,
}

// ── SimulationApi ─────────────────────────────────────────────────────

/// High-level API wrapping a simulation for external consumption.
pub struct SimulationApi {
    sim: Simulation,
    actions: BTreeMap<String, ActionHandle>,
}

impl SimulationApi {
    pub fn new(sim: Simulation) -> Self {
        SimulationApi {
            sim,
            actions: BTreeMap::new(),
        }
    }

    /// Wrap a built scenario, tracking every action it declared.
    pub fn from_scenario(run: ScenarioRun) -> Self {
        SimulationApi {
            sim: run.simulation,
            actions: run.actions,
        }
    }

    /// Report on `handle` under `name` in steps and snapshots.
    pub fn track(&mut self, name: impl Into<String>, handle: ActionHandle) {
        self.actions.insert(name.into(), handle);
    }

    /// Execute a single step. Returns `None` once nothing more can happen.
    pub fn step(&mut self) -> Option<StepResult> {
        self.step_with(|sim| sim.step())
    }

    /// Execute a single step without moving the clock past `date`.
    pub fn step_until(&mut self, date: f64) -> Option<StepResult> {
        self.step_with(|sim| sim.step_until(date))
    }

    fn step_with(&mut self, step: impl FnOnce(&mut Simulation) -> Option<f64>) -> Option<StepResult> {
        let before: BTreeMap<&str, ActionState> = self
            .actions
            .iter()
            .filter_map(|(name, h)| Some((name.as_str(), self.sim.action_get_state(h.id()).ok()?)))
            .collect();
        let delta = step(&mut self.sim)?;
        let finished = self
            .actions
            .iter()
            .filter(|(name, h)| {
                let was_live = before.get(name.as_str()).is_some_and(|s| !s.is_terminal());
                let now_terminal = self
                    .sim
                    .action_get_state(h.id())
                    .is_ok_and(|s| s.is_terminal());
                was_live && now_terminal
            })
            .filter_map(|(name, h)| self.report(name, h))
            .collect();
        Some(StepResult {
            step: self.sim.steps(),
            time: self.sim.now().seconds(),
            delta,
            finished,
        })
    }

    /// Run to completion. Returns the number of steps performed.
    pub fn run(&mut self) -> u64 {
        self.sim.run()
    }

    /// Run up to `n` steps. Returns the number actually performed.
    pub fn run_steps(&mut self, n: u64) -> u64 {
        self.sim.run_for(n)
    }

    pub fn run_until(&mut self, date: f64) -> u64 {
        self.sim.run_until(date)
    }

    pub fn is_finished(&self) -> bool {
        self.sim.is_finished()
    }

    pub fn current_time(&self) -> f64 {
        self.sim.now().seconds()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    fn report(&self, name: &str, handle: &ActionHandle) -> Option<ActionReport> {
        let id = handle.id();
        let action = self.sim.action(id).ok()?;
        Some(ActionReport {
            name: name.to_string(),
            id: id.to_string(),
            kind: action.kind(),
            state: action.state(),
            remaining: self.sim.action_get_remaining(id).ok()?,
            rate: self.sim.action_rate(id).ok()?,
            start: action.start(),
            finish: action.finish(),
        })
    }

    // ── Export ────────────────────────────────────────────────

    /// Capture the current state.
    pub fn snapshot(&self) -> Snapshot {
        let resources = self
            .sim
            .resources()
            .map(|r| ResourceReport {
                id: r.id().to_string(),
                name: r.name().to_string(),
                class: r.class(),
                state: r.state(),
                capacity: r.capacity(),
                usage: self.sim.resource_usage(r.id()).unwrap_or(0.0),
                used: self.sim.resource_used(r.id()),
            })
            .collect();
        let actions = self
            .actions
            .iter()
            .filter_map(|(name, h)| self.report(name, h))
            .collect();
        Snapshot {
            time: self.sim.now().seconds(),
            steps: self.sim.steps(),
            finished: self.sim.is_finished(),
            resources,
            actions,
        }
    }

    /// Export a snapshot of the current state as a JSON string.
    pub fn snapshot_json(&self) -> KernelResult<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}
