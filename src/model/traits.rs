//! `ResourceModel` trait: the interface the main loop drives every model through.

use crate::action::{ActionId, ModelKind};
use crate::error::KernelResult;
use crate::resource::{ResourceId, ResourceSpec};
use crate::solver::System;
use crate::trace::TraceValue;

use super::context::ModelContext;

// ── ResourceModel ─────────────────────────────────────────────────────

/// Trait implemented by every model.
///
/// The default methods delegate to the model's [`ModelContext`]; a model
/// overrides the ones where it adds behavior of its own (storage, for
/// instance, bounds the step by the time until its disks fill up).
/// Every model shares one [`System`], passed to each call.
///
/// # Contract
///
/// Within one main-loop step the calls arrive in this order:
/// 1. `share_resources(now, ..)` once, right after the shared solve
///    (see [`share_all`](super::share_all)),
/// 2. zero or more `update_resource_state(resource, value, date, ..)` with
///    `now <= date <= now + Δt`,
/// 3. `update_actions_state(now + Δt, Δt, ..)` once.
pub trait ResourceModel {
    fn context(&self) -> &ModelContext;

    fn context_mut(&mut self) -> &mut ModelContext;

    fn kind(&self) -> ModelKind {
        self.context().kind()
    }

    /// Register a resource owned by this model.
    fn add_resource(&mut self, spec: &ResourceSpec, sys: &mut System) -> KernelResult<ResourceId> {
        self.context_mut().add_resource(spec, sys)
    }

    /// Account the solve that just ran and return the delay until this
    /// model's next completion, or `None` if none of its actions can
    /// complete. `changed` holds the re-solved actions and their old rates.
    fn share_resources(&mut self, now: f64, sys: &System, changed: &[(ActionId, f64)]) -> Option<f64> {
        self.context_mut().share_resources(now, sys, changed)
    }

    /// Advance every action to `now`, `delta` seconds after the previous call.
    fn update_actions_state(&mut self, now: f64, delta: f64, sys: &mut System) {
        self.context_mut().update_actions_state(now, delta, sys)
    }

    /// Apply a trace event dated `date`.
    fn update_resource_state(&mut self, resource: ResourceId, value: TraceValue, date: f64, sys: &mut System) {
        self.context_mut().update_resource_state(resource, value, date, sys)
    }

    /// `true` if the resource has at least one live action.
    fn resource_used(&self, resource: ResourceId, sys: &System) -> bool {
        self.context().resource_used(resource, sys)
    }

    /// Drop terminal actions no client holds any more.
    fn collect_garbage(&mut self) -> usize {
        self.context_mut().collect_garbage()
    }
}
