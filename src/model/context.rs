//! `ModelContext`: the state one model owns.
//!
//! Each model owns its resource arena, action arena, completion heap and
//! dirty set. The sharing [`System`] is common to every model and passed in
//! by the caller, so one action may draw on constraints of several classes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use crate::action::{Action, ActionHandle, ActionId, ActionSpec, ActionState, ModelKind};
use crate::config::UpdateMode;
use crate::error::{KernelError, KernelResult};
use crate::resource::{Resource, ResourceId, ResourceSpec, ResourceState};
use crate::scheduler::{CompletionScheduler, EntryKind};
use crate::solver::System;
use crate::time::reached;
use crate::trace::TraceValue;

/// Per-model kernel state.
#[derive(Debug, Clone)]
pub struct ModelContext {
    kind: ModelKind,
    update: UpdateMode,
    precision: f64,
    /// Multiplier from a resource's capacity to its constraint bound.
    capacity_factor: f64,
    /// Bound each variable by one core's capacity on multi-core resources.
    core_bounded: bool,
    resources: BTreeMap<ResourceId, Resource>,
    /// Resources registered with another model and tracked here for the
    /// actions bound to them. Their constraint bounds belong to the owner.
    mirrored: BTreeSet<ResourceId>,
    names: BTreeMap<String, ResourceId>,
    actions: BTreeMap<ActionId, Action>,
    heap: CompletionScheduler,
    /// Resources whose share must be recomputed before the next step.
    dirty: BTreeSet<ResourceId>,
    next_seq: u64,
}

impl ModelContext {
    pub fn new(kind: ModelKind, update: UpdateMode, precision: f64) -> Self {
        ModelContext {
            kind,
            update,
            precision,
            capacity_factor: 1.0,
            core_bounded: false,
            resources: BTreeMap::new(),
            mirrored: BTreeSet::new(),
            names: BTreeMap::new(),
            actions: BTreeMap::new(),
            heap: CompletionScheduler::new(),
            dirty: BTreeSet::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn with_capacity_factor(mut self, factor: f64) -> Self {
        self.capacity_factor = factor;
        self
    }

    pub(crate) fn with_core_bound(mut self) -> Self {
        self.core_bounded = true;
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.update
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    // ── Resources ─────────────────────────────────────────────────────

    /// Register a resource and its constraint.
    pub fn add_resource(&mut self, spec: &ResourceSpec, sys: &mut System) -> KernelResult<ResourceId> {
        let Some(class) = self.kind.class() else {
            return Err(KernelError::NotAResourceOwner(self.kind));
        };
        if spec.class != class {
            return Err(KernelError::MixedResourceClasses {
                expected: class,
                found: spec.class,
            });
        }
        if self.names.contains_key(&spec.name) {
            return Err(KernelError::DuplicateResource {
                class,
                name: spec.name.clone(),
            });
        }
        for value in [spec.peak, spec.scale, spec.latency] {
            if !value.is_finite() || value < 0.0 {
                return Err(KernelError::InvalidCapacity {
                    name: spec.name.clone(),
                    capacity: value,
                });
            }
        }

        let id = ResourceId::new(class, self.names.len());
        let bound = spec.peak * spec.scale * f64::from(spec.cores.max(1)) * self.capacity_factor;
        let constraint = sys.constraint_new(id, bound, spec.policy);
        self.resources.insert(id, Resource::new(id, spec, constraint));
        self.names.insert(spec.name.clone(), id);
        debug!(resource = %id, name = %spec.name, bound, policy = %spec.policy, "resource registered");
        Ok(id)
    }

    /// Track a resource owned by another model, as it currently is.
    pub(crate) fn adopt(&mut self, resource: &Resource) {
        if self.resources.contains_key(&resource.id()) {
            return;
        }
        let mut mirror = resource.clone();
        mirror.actions.clear();
        trace!(model = %self.kind, resource = %mirror.id(), "resource mirrored");
        self.mirrored.insert(mirror.id());
        self.resources.insert(mirror.id(), mirror);
    }

    /// `true` if the resource is registered with or mirrored by this model.
    pub fn tracks(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    pub fn resource(&self, id: ResourceId) -> KernelResult<&Resource> {
        self.resources.get(&id).ok_or(KernelError::UnknownResource(id))
    }

    pub fn resource_by_name(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied()
    }

    /// Resources this model registered, in registration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        let mirrored = &self.mirrored;
        self.resources
            .values()
            .filter(move |r| !mirrored.contains(&r.id()))
    }

    /// `true` if some live action is bound to the resource.
    pub fn resource_used(&self, id: ResourceId, sys: &System) -> bool {
        self.resource(id)
            .is_ok_and(|r| sys.constraint_used(r.constraint()))
    }

    /// Consumption on the resource after the last solve.
    pub fn resource_usage(&self, id: ResourceId, sys: &System) -> f64 {
        self.resource(id)
            .map_or(0.0, |r| sys.constraint_usage(r.constraint()))
    }

    fn mark_dirty(&mut self, id: ResourceId) {
        self.dirty.insert(id);
    }

    // ── Actions ───────────────────────────────────────────────────────

    /// Validate `spec`, create the action and bind it to its resources.
    ///
    /// An action requested on an offline resource is created already FAILED.
    pub fn start_action(&mut self, spec: ActionSpec, now: f64, sys: &mut System) -> KernelResult<ActionHandle> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !finite_non_negative(spec.amount) {
            return Err(KernelError::InvalidAmount(spec.amount));
        }
        if !spec.priority.is_finite() {
            return Err(KernelError::InvalidAmount(spec.priority));
        }
        for v in [spec.max_duration, spec.rate_bound].into_iter().flatten() {
            if !finite_non_negative(v) {
                return Err(KernelError::InvalidAmount(v));
            }
        }
        if spec.demands.is_empty() {
            return Err(KernelError::EmptyDemands);
        }
        for (resource, demand) in &spec.demands {
            if let Some(class) = self.kind.class() {
                if resource.class() != class {
                    return Err(KernelError::MixedResourceClasses {
                        expected: class,
                        found: resource.class(),
                    });
                }
            }
            self.resource(*resource)?;
            if !finite_non_negative(*demand) {
                return Err(KernelError::InvalidAmount(*demand));
            }
        }
        if spec.demands.iter().all(|(_, d)| *d <= 0.0) {
            return Err(KernelError::NoActiveDemand);
        }

        let id = ActionId::new(self.kind, self.next_seq);
        self.next_seq += 1;
        let (handle, client) = ActionHandle::new(id);
        let mut action = Action::new(id, &spec, now, client);

        let offline = spec
            .demands
            .iter()
            .any(|(r, _)| self.resources.get(r).is_some_and(|res| !res.is_on()));
        if offline {
            action.state = ActionState::Failed;
            action.finish = Some(now);
            debug!(action = %id, "action failed at creation: resource offline");
            self.actions.insert(id, action);
            return Ok(handle);
        }

        action.state = ActionState::Running;
        let bound = self.variable_bound(&action);
        let var = sys.variable_new(id, action.effective_weight(), bound);
        for (resource, demand) in &spec.demands {
            if let Some(res) = self.resources.get_mut(resource) {
                sys.expand(res.constraint(), var, *demand);
                res.actions.insert(id);
            }
            self.dirty.insert(*resource);
        }
        action.variable = Some(var);
        debug!(action = %id, amount = spec.amount, priority = spec.priority, "action started");
        self.actions.insert(id, action);
        Ok(handle)
    }

    pub fn action(&self, id: ActionId) -> KernelResult<&Action> {
        self.actions.get(&id).ok_or(KernelError::UnknownAction(id))
    }

    /// Every action not yet released, in id order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    /// Number of actions holding a solver variable.
    pub fn live_actions(&self) -> usize {
        self.actions.values().filter(|a| a.state().is_live()).count()
    }

    /// Current rate of an action.
    pub fn rate(&self, id: ActionId, sys: &System) -> f64 {
        self.actions
            .get(&id)
            .and_then(|a| a.variable())
            .map_or(0.0, |v| sys.value(v))
    }

    /// Remaining work as of `now`.
    pub fn remaining(&self, id: ActionId, now: f64, sys: &System) -> KernelResult<f64> {
        let action = self.action(id)?;
        Ok(action.remaining_at(self.rate(id, sys), now))
    }

    /// Cancel a live action. Cancelling a terminal action is a no-op.
    pub fn cancel(&mut self, id: ActionId, now: f64, sys: &mut System) -> KernelResult<()> {
        if self.action(id)?.state().is_live() {
            self.sync_action(id, now, sys);
            self.finish_action(id, ActionState::Canceled, now, sys);
        }
        Ok(())
    }

    pub fn suspend(&mut self, id: ActionId, now: f64, sys: &mut System) -> KernelResult<()> {
        if self.action(id)?.state() != ActionState::Running {
            return Ok(());
        }
        self.sync_action(id, now, sys);
        if let Some(action) = self.actions.get_mut(&id) {
            action.state = ActionState::Suspended;
        }
        self.heap.remove(id);
        self.refresh_weight(id, sys);
        trace!(action = %id, "action suspended");
        Ok(())
    }

    pub fn resume(&mut self, id: ActionId, now: f64, sys: &mut System) -> KernelResult<()> {
        if self.action(id)?.state() != ActionState::Suspended {
            return Ok(());
        }
        self.sync_action(id, now, sys);
        if let Some(action) = self.actions.get_mut(&id) {
            action.state = ActionState::Running;
        }
        self.refresh_weight(id, sys);
        trace!(action = %id, "action resumed");
        Ok(())
    }

    pub fn set_priority(&mut self, id: ActionId, priority: f64, now: f64, sys: &mut System) -> KernelResult<()> {
        if !priority.is_finite() {
            return Err(KernelError::InvalidAmount(priority));
        }
        self.action(id)?;
        self.sync_action(id, now, sys);
        if let Some(action) = self.actions.get_mut(&id) {
            action.priority = priority;
        }
        self.refresh_weight(id, sys);
        Ok(())
    }

    pub fn set_max_duration(&mut self, id: ActionId, duration: Option<f64>) -> KernelResult<()> {
        if let Some(d) = duration {
            if !d.is_finite() || d < 0.0 {
                return Err(KernelError::InvalidAmount(d));
            }
        }
        let action = self.actions.get_mut(&id).ok_or(KernelError::UnknownAction(id))?;
        action.max_duration = duration;
        for (resource, _) in action.demands() {
            self.dirty.insert(*resource);
        }
        Ok(())
    }

    /// Push the action's effective weight to its variable and flag its resources.
    fn refresh_weight(&mut self, id: ActionId, sys: &mut System) {
        let Some(action) = self.actions.get(&id) else {
            return;
        };
        let weight = action.effective_weight();
        if let Some(var) = action.variable() {
            sys.update_variable_weight(var, weight);
        }
        for (resource, _) in action.demands() {
            self.dirty.insert(*resource);
        }
    }

    /// Largest rate the action may get: its own bound, and on multi-core
    /// resources one core's capacity.
    fn variable_bound(&self, action: &Action) -> Option<f64> {
        let mut bound = action.rate_bound();
        if !self.core_bounded {
            return bound;
        }
        for (resource, demand) in action.demands() {
            let Some(res) = self.resources.get(resource) else {
                continue;
            };
            if res.cores() > 1 && *demand > 0.0 {
                let cap = res.core_capacity() / demand;
                bound = Some(bound.map_or(cap, |b| b.min(cap)));
            }
        }
        bound
    }

    /// Bring `remaining` and `latency` up to `now` using the current rate.
    pub(crate) fn sync_action(&mut self, id: ActionId, now: f64, sys: &System) {
        let Some(action) = self.actions.get_mut(&id) else {
            return;
        };
        let rate = action.variable().map_or(0.0, |v| sys.value(v));
        action.advance(rate, now, self.precision);
    }

    /// Move a live action to a terminal state and release its variable.
    pub(crate) fn finish_action(&mut self, id: ActionId, state: ActionState, date: f64, sys: &mut System) {
        let Some(action) = self.actions.get_mut(&id) else {
            return;
        };
        if action.state().is_terminal() {
            return;
        }
        action.state = state;
        action.finish = Some(date);
        if let Some(var) = action.variable.take() {
            sys.variable_free(var);
        }
        for (resource, _) in action.demands() {
            if let Some(res) = self.resources.get_mut(resource) {
                res.actions.remove(&id);
            }
            self.dirty.insert(*resource);
        }
        self.heap.remove(id);
        debug!(action = %id, state = %state, date, remaining = action.remaining(), "action finished");
    }

    /// Physically drop terminal actions no client refers to any more.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.actions.len();
        self.actions
            .retain(|_, a| !(a.state().is_terminal() && !a.is_referenced()));
        let freed = before - self.actions.len();
        if freed > 0 {
            trace!(model = %self.kind, freed, "released actions collected");
        }
        freed
    }

    // ── Stepping ──────────────────────────────────────────────────────

    /// Flag the constraints of every dirty resource as modified.
    pub(crate) fn flush_dirty(&mut self, sys: &mut System) {
        for id in std::mem::take(&mut self.dirty) {
            if let Some(res) = self.resources.get(&id) {
                sys.touch(res.constraint());
            }
        }
    }

    /// Take the solve that just ran into account and return the delay until
    /// the earliest predicted completion, or `None` if no action will ever
    /// complete.
    ///
    /// `changed` lists the re-solved actions with the rate they progressed
    /// at before the solve.
    pub fn share_resources(&mut self, now: f64, sys: &System, changed: &[(ActionId, f64)]) -> Option<f64> {
        for (id, rate) in changed {
            if let Some(action) = self.actions.get_mut(id) {
                action.advance(*rate, now, self.precision);
            }
        }
        match self.update {
            UpdateMode::Lazy => {
                for (id, _) in changed {
                    if self.actions.contains_key(id) {
                        self.reschedule(*id, now, sys);
                    }
                }
                self.heap.peek().map(|e| (e.date - now).max(0.0))
            }
            UpdateMode::Full => {
                let mut min: Option<f64> = None;
                for action in self.actions.values() {
                    let rate = action.variable().map_or(0.0, |v| sys.value(v));
                    if let Some((date, _)) = completion(action, rate, now) {
                        let delay = (date - now).max(0.0);
                        min = Some(min.map_or(delay, |m: f64| m.min(delay)));
                    }
                }
                min
            }
        }
    }

    fn reschedule(&mut self, id: ActionId, now: f64, sys: &System) {
        self.heap.remove(id);
        let Some(action) = self.actions.get(&id) else {
            return;
        };
        let rate = action.variable().map_or(0.0, |v| sys.value(v));
        if let Some((date, kind)) = completion(action, rate, now) {
            trace!(action = %id, date, kind = ?kind, rate, "completion scheduled");
            self.heap.insert(id, date, kind);
        }
    }

    /// Account progress up to `now` and retire what completed.
    pub fn update_actions_state(&mut self, now: f64, delta: f64, sys: &mut System) {
        trace!(model = %self.kind, now, delta, "updating actions");
        match self.update {
            UpdateMode::Lazy => self.update_lazy(now, sys),
            UpdateMode::Full => self.update_full(now, sys),
        }
    }

    fn update_lazy(&mut self, now: f64, sys: &mut System) {
        while let Some(entry) = self.heap.peek().copied() {
            if !reached(now, entry.date, self.precision) {
                break;
            }
            self.heap.pop();
            self.sync_action(entry.action, now, sys);
            match entry.kind {
                EntryKind::Latency => {
                    if let Some(action) = self.actions.get_mut(&entry.action) {
                        action.latency = 0.0;
                    }
                    self.refresh_weight(entry.action, sys);
                }
                EntryKind::Normal => {
                    if let Some(action) = self.actions.get_mut(&entry.action) {
                        action.remaining = 0.0;
                    }
                    self.finish_action(entry.action, ActionState::Done, now, sys);
                }
                EntryKind::MaxDuration => {
                    self.finish_action(entry.action, ActionState::Done, now, sys);
                }
            }
        }
    }

    fn update_full(&mut self, now: f64, sys: &mut System) {
        let live: Vec<ActionId> = self
            .actions
            .values()
            .filter(|a| a.state().is_live())
            .map(|a| a.id())
            .collect();

        for id in live {
            self.sync_action(id, now, sys);
            let Some(action) = self.actions.get(&id) else {
                continue;
            };
            if action.state() != ActionState::Running {
                // The deadline keeps running while suspended.
                if action.deadline().is_some_and(|d| reached(now, d, self.precision)) {
                    self.finish_action(id, ActionState::Done, now, sys);
                }
                continue;
            }

            // End of the latency phase.
            let weight = action.effective_weight();
            let current = action
                .variable()
                .and_then(|v| sys.variable(v))
                .map_or(weight, |v| v.weight());
            if current != weight {
                self.refresh_weight(id, sys);
            }

            let Some(action) = self.actions.get(&id) else {
                continue;
            };
            let rate = self.rate(id, sys);
            let exhausted = action.effective_weight() > 0.0
                && (action.remaining() <= 0.0
                    || (rate > 0.0 && action.remaining() / rate <= self.precision));
            let expired = action
                .deadline()
                .is_some_and(|d| reached(now, d, self.precision));

            if exhausted {
                if let Some(action) = self.actions.get_mut(&id) {
                    action.remaining = 0.0;
                }
                self.finish_action(id, ActionState::Done, now, sys);
            } else if expired {
                self.finish_action(id, ActionState::Done, now, sys);
            }
        }
    }

    /// Apply a trace event to a resource.
    ///
    /// An OFF transition fails every live action bound to the resource at
    /// `date`, after charging it the progress it made up to `date`. On a
    /// mirrored resource only this model's view and actions change.
    pub fn update_resource_state(&mut self, id: ResourceId, value: TraceValue, date: f64, sys: &mut System) {
        let mirrored = self.mirrored.contains(&id);
        let Some(res) = self.resources.get_mut(&id) else {
            warn!(resource = %id, "trace event for unknown resource dropped");
            return;
        };

        match value {
            TraceValue::Scale(scale) => {
                if !scale.is_finite() || scale < 0.0 {
                    warn!(resource = %id, scale, "invalid scale event dropped");
                    return;
                }
                res.set_scale(scale);
                let bound = res.capacity() * self.capacity_factor;
                let constraint = res.constraint();
                let bound_actions: Vec<ActionId> = res.actions().collect();
                if !mirrored {
                    sys.update_constraint_bound(constraint, bound);
                }
                if self.core_bounded {
                    for action in bound_actions {
                        self.refresh_bound(action, sys);
                    }
                }
                debug!(model = %self.kind, resource = %id, scale, bound, date, "resource capacity changed");
            }
            TraceValue::State(state) => {
                res.set_state(state);
                let victims: Vec<ActionId> = if state == ResourceState::Off {
                    res.actions().collect()
                } else {
                    Vec::new()
                };
                debug!(model = %self.kind, resource = %id, state = %state, date, failed = victims.len(), "resource state changed");
                for action in victims {
                    self.sync_action(action, date, sys);
                    self.finish_action(action, ActionState::Failed, date, sys);
                }
            }
        }
        self.mark_dirty(id);
    }

    fn refresh_bound(&mut self, id: ActionId, sys: &mut System) {
        let Some(action) = self.actions.get(&id) else {
            return;
        };
        let bound = self.variable_bound(action);
        if let Some(var) = action.variable() {
            sys.update_variable_bound(var, bound);
        }
    }
}

/// Earliest date at which `action` changes state at `rate`, and why.
///
/// A date that is not finite, such as a huge remaining amount over a tiny
/// rate, counts as never.
fn completion(action: &Action, rate: f64, now: f64) -> Option<(f64, EntryKind)> {
    if !action.state().is_live() {
        return None;
    }
    let mut best = if action.state() != ActionState::Running {
        None
    } else if action.latency() > 0.0 {
        Some((now + action.latency(), EntryKind::Latency))
    } else if action.effective_weight() > 0.0 && rate > 0.0 {
        Some((now + action.remaining() / rate, EntryKind::Normal))
    } else {
        None
    };
    if let Some(deadline) = action.deadline() {
        if best.map_or(true, |(date, _)| deadline < date) {
            best = Some((deadline, EntryKind::MaxDuration));
        }
    }
    best.filter(|(date, _)| date.is_finite())
}
