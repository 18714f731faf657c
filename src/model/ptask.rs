//! `PtaskModel`: parallel tasks spanning resources of several classes.
//!
//! A parallel task is one action with one variable, expanded over every
//! resource it demands whatever their class. Computation on each host and
//! the transfers between them progress together, at the pace of the most
//! contended resource. Resources stay owned by the model of their class;
//! this model mirrors the ones its actions use and receives the same trace
//! events.

use tracing::trace;

use crate::action::{ActionHandle, ActionKind, ActionSpec, ModelKind};
use crate::config::KernelConfig;
use crate::error::KernelResult;
use crate::resource::{Resource, ResourceId};
use crate::solver::System;
use crate::trace::TraceValue;

use super::context::ModelContext;
use super::traits::ResourceModel;

/// A parallel task: computations on cpus and transfers along routes, all
/// completing together.
///
/// The task has an amount of 1; each demand is the work that resource
/// performs over the whole task.
#[derive(Debug, Clone, Default)]
pub struct ParallelTask {
    computations: Vec<(ResourceId, f64)>,
    transfers: Vec<(Vec<ResourceId>, f64)>,
    rate: Option<f64>,
}

impl ParallelTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute `flops` on `cpu`.
    pub fn compute(mut self, cpu: ResourceId, flops: f64) -> Self {
        self.computations.push((cpu, flops));
        self
    }

    /// Send `bytes` along `route`.
    pub fn transfer(mut self, route: impl Into<Vec<ResourceId>>, bytes: f64) -> Self {
        self.transfers.push((route.into(), bytes));
        self
    }

    /// Cap the fraction of the task completed per second.
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Every resource the task touches, with repeats.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.computations
            .iter()
            .map(|(cpu, _)| *cpu)
            .chain(self.transfers.iter().flat_map(|(route, _)| route.iter().copied()))
    }
}

/// The parallel-task model.
#[derive(Debug, Clone)]
pub struct PtaskModel {
    ctx: ModelContext,
}

impl PtaskModel {
    pub fn new(config: &KernelConfig) -> Self {
        PtaskModel {
            ctx: ModelContext::new(ModelKind::Ptask, config.ptask.update, config.precision)
                .with_core_bound(),
        }
    }

    /// Start `spec` on `resources`, the current state of every resource it
    /// demands.
    pub fn start(
        &mut self,
        spec: ActionSpec,
        resources: &[Resource],
        now: f64,
        sys: &mut System,
    ) -> KernelResult<ActionHandle> {
        for resource in resources {
            self.ctx.adopt(resource);
        }
        self.ctx.start_action(spec, now, sys)
    }

    /// Start a parallel task. Its latency is the largest summed latency of
    /// the routes that carry data.
    pub fn execute_parallel(
        &mut self,
        task: &ParallelTask,
        resources: &[Resource],
        now: f64,
        sys: &mut System,
    ) -> KernelResult<ActionHandle> {
        for resource in resources {
            self.ctx.adopt(resource);
        }

        let mut latency: f64 = 0.0;
        for (route, bytes) in &task.transfers {
            if *bytes <= 0.0 {
                continue;
            }
            let mut route_latency = 0.0;
            for link in route {
                route_latency += self.ctx.resource(*link)?.latency();
            }
            latency = latency.max(route_latency);
        }

        let mut spec = ActionSpec::new(1.0)
            .kind(ActionKind::Parallel)
            .latency(latency);
        if let Some(rate) = task.rate {
            spec = spec.rate_bound(rate);
        }
        for (cpu, flops) in &task.computations {
            spec = spec.on(*cpu, *flops);
        }
        for (route, bytes) in &task.transfers {
            if *bytes <= 0.0 {
                continue;
            }
            for link in route {
                spec = spec.on(*link, *bytes);
            }
        }
        trace!(
            hosts = task.computations.len(),
            transfers = task.transfers.len(),
            latency,
            "parallel task requested"
        );
        self.ctx.start_action(spec, now, sys)
    }
}

impl ResourceModel for PtaskModel {
    fn context(&self) -> &ModelContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut ModelContext {
        &mut self.ctx
    }

    /// Events reach every model; only mirrored resources are of interest.
    fn update_resource_state(&mut self, resource: ResourceId, value: TraceValue, date: f64, sys: &mut System) {
        if self.ctx.tracks(resource) {
            self.ctx.update_resource_state(resource, value, date, sys);
        }
    }
}
