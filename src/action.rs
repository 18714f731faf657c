/// Actions: units of work progressing on one or more resources.
///
/// An action owns an amount of work, consumes it at the rate the sharing
/// system allocates to its variable, and walks the lifecycle
/// `Init → Running ⇄ Suspended → Done | Failed | Canceled`.
///
/// The kernel keeps every action in its model's arena. Clients hold an
/// [`ActionHandle`]; once the action is terminal and the last handle is
/// dropped, the model removes it for good.

use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::resource::{ResourceClass, ResourceId};
use crate::solver::VariableId;
use crate::time::double_update;

// ── Identity ──────────────────────────────────────────────────────────

/// The model an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Cpu,
    Network,
    Storage,
    /// Parallel tasks, whose actions may span several resource classes.
    Ptask,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Cpu,
        ModelKind::Network,
        ModelKind::Storage,
        ModelKind::Ptask,
    ];

    /// The resource class this model owns, if any.
    pub fn class(self) -> Option<ResourceClass> {
        match self {
            ModelKind::Cpu => Some(ResourceClass::Cpu),
            ModelKind::Network => Some(ResourceClass::Network),
            ModelKind::Storage => Some(ResourceClass::Storage),
            ModelKind::Ptask => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Cpu => "cpu",
            ModelKind::Network => "network",
            ModelKind::Storage => "storage",
            ModelKind::Ptask => "ptask",
        }
    }
}

impl From<ResourceClass> for ModelKind {
    fn from(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Cpu => ModelKind::Cpu,
            ResourceClass::Network => ModelKind::Network,
            ResourceClass::Storage => ModelKind::Storage,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique action identifier. Sequence numbers are monotonic per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId {
    model: ModelKind,
    seq: u64,
}

impl ActionId {
    #[inline]
    pub(crate) fn new(model: impl Into<ModelKind>, seq: u64) -> Self {
        ActionId {
            model: model.into(),
            seq,
        }
    }

    /// The model owning this action.
    #[inline]
    pub fn model(self) -> ModelKind {
        self.model
    }

    #[inline]
    pub fn seq(self) -> u64 {
        self.seq
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-action#{}", self.model, self.seq)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    /// Created, not yet accepted by its model.
    Init,
    Running,
    /// Running but paused by the client; holds its variable at weight zero.
    Suspended,
    Done,
    Failed,
    Canceled,
}

impl ActionState {
    /// `Done`, `Failed` or `Canceled`. No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionState::Done | ActionState::Failed | ActionState::Canceled
        )
    }

    /// The action still holds a solver variable.
    pub fn is_live(self) -> bool {
        matches!(self, ActionState::Running | ActionState::Suspended)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionState::Init => "INIT",
            ActionState::Running => "RUNNING",
            ActionState::Suspended => "SUSPENDED",
            ActionState::Done => "DONE",
            ActionState::Failed => "FAILED",
            ActionState::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// What the action models. Only informational except for storage writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Generic,
    Execute,
    Sleep,
    Communicate,
    Read,
    Write,
    /// Computations and transfers progressing together as one task.
    Parallel,
}

// ── Request ───────────────────────────────────────────────────────────

/// A request for a new action.
///
/// ```
/// use fairshare::{ActionSpec, ModelKind, Simulation, KernelConfig, ResourceSpec};
///
/// let mut sim = Simulation::new(KernelConfig::default()).unwrap();
/// let cpu = sim.create_resource(ResourceSpec::cpu("h", 10.0)).unwrap();
/// let spec = ActionSpec::new(100.0).on(cpu, 1.0).priority(2.0).max_duration(60.0);
/// let handle = sim.create_action(spec).unwrap();
/// assert_eq!(handle.id().model(), ModelKind::Cpu);
/// ```
#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub(crate) kind: ActionKind,
    pub(crate) amount: f64,
    pub(crate) demands: Vec<(ResourceId, f64)>,
    pub(crate) priority: f64,
    pub(crate) max_duration: Option<f64>,
    pub(crate) rate_bound: Option<f64>,
    pub(crate) latency: f64,
    pub(crate) sleeping: bool,
}

impl ActionSpec {
    /// An action of `amount` work units with no demand yet.
    pub fn new(amount: f64) -> Self {
        ActionSpec {
            kind: ActionKind::Generic,
            amount,
            demands: Vec::new(),
            priority: 1.0,
            max_duration: None,
            rate_bound: None,
            latency: 0.0,
            sleeping: false,
        }
    }

    /// Consume `demand` capacity units of `resource` per unit of rate.
    pub fn on(mut self, resource: ResourceId, demand: f64) -> Self {
        self.demands.push((resource, demand));
        self
    }

    /// Share weight. Non-positive freezes the action.
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_duration(mut self, duration: f64) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Upper bound on the action's rate.
    pub fn rate_bound(mut self, rate: f64) -> Self {
        self.rate_bound = Some(rate);
        self
    }

    pub(crate) fn kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn sleeping(mut self) -> Self {
        self.sleeping = true;
        self.kind = ActionKind::Sleep;
        self
    }

    pub fn demands(&self) -> &[(ResourceId, f64)] {
        &self.demands
    }
}

// ── Client handle ─────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct ActionToken;

/// Client-side reference to an action.
///
/// Cloning adds a reference; dropping the last clone releases the action
/// once it is no longer running.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    id: ActionId,
    token: Rc<ActionToken>,
}

impl ActionHandle {
    pub(crate) fn new(id: ActionId) -> (Self, Weak<ActionToken>) {
        let token = Rc::new(ActionToken);
        let weak = Rc::downgrade(&token);
        (ActionHandle { id, token }, weak)
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Number of live client references.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.token)
    }
}

impl PartialEq for ActionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActionHandle {}

// ── Action ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Action {
    id: ActionId,
    kind: ActionKind,
    pub(crate) state: ActionState,
    amount: f64,
    pub(crate) remaining: f64,
    pub(crate) priority: f64,
    pub(crate) max_duration: Option<f64>,
    pub(crate) rate_bound: Option<f64>,
    /// Latency still to elapse before the action starts consuming.
    pub(crate) latency: f64,
    sleeping: bool,
    start: f64,
    pub(crate) finish: Option<f64>,
    /// Date up to which `remaining` and `latency` are accounted for.
    pub(crate) last_update: f64,
    demands: Vec<(ResourceId, f64)>,
    pub(crate) variable: Option<VariableId>,
    client: Weak<ActionToken>,
}

impl Action {
    pub(crate) fn new(id: ActionId, spec: &ActionSpec, start: f64, client: Weak<ActionToken>) -> Self {
        Action {
            id,
            kind: spec.kind,
            state: ActionState::Init,
            amount: spec.amount,
            remaining: spec.amount,
            priority: spec.priority,
            max_duration: spec.max_duration,
            rate_bound: spec.rate_bound,
            latency: spec.latency.max(0.0),
            sleeping: spec.sleeping,
            start,
            finish: None,
            last_update: start,
            demands: spec.demands.clone(),
            variable: None,
            client,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Remaining work as of the last accounting date.
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn max_duration(&self) -> Option<f64> {
        self.max_duration
    }

    /// Absolute date at which `max_duration` forces completion.
    pub fn deadline(&self) -> Option<f64> {
        self.max_duration.map(|d| self.start + d)
    }

    pub fn rate_bound(&self) -> Option<f64> {
        self.rate_bound
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn finish(&self) -> Option<f64> {
        self.finish
    }

    pub fn demands(&self) -> &[(ResourceId, f64)] {
        &self.demands
    }

    pub fn variable(&self) -> Option<VariableId> {
        self.variable
    }

    /// `true` while some client still holds a handle.
    pub fn is_referenced(&self) -> bool {
        self.client.strong_count() > 0
    }

    /// Weight to give the solver: the priority, or zero while the action
    /// is frozen, suspended, sleeping or still in its latency phase.
    pub(crate) fn effective_weight(&self) -> f64 {
        if self.state != ActionState::Running
            || self.sleeping
            || self.latency > 0.0
            || self.priority <= 0.0
        {
            0.0
        } else {
            self.priority
        }
    }

    /// Remaining work projected to `now` at `rate`, without mutating.
    pub(crate) fn remaining_at(&self, rate: f64, now: f64) -> f64 {
        if self.state != ActionState::Running || rate <= 0.0 {
            return self.remaining;
        }
        let mut dt = (now - self.last_update).max(0.0);
        dt -= self.latency.min(dt);
        (self.remaining - rate * dt).max(0.0)
    }

    /// Account for progress between `last_update` and `now` at `rate`.
    ///
    /// Latency is consumed first; suspended time counts for nothing.
    pub(crate) fn advance(&mut self, rate: f64, now: f64, precision: f64) {
        let mut dt = now - self.last_update;
        if dt > 0.0 && self.state == ActionState::Running {
            if self.latency > 0.0 {
                let spent = self.latency.min(dt);
                dt -= spent;
                double_update(&mut self.latency, spent, precision);
            }
            if rate > 0.0 && dt > 0.0 {
                double_update(&mut self.remaining, rate * dt, precision);
            }
        }
        if now > self.last_update {
            self.last_update = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_action(amount: f64) -> (Action, ActionHandle) {
        let id = ActionId::new(ResourceClass::Cpu, 0);
        let (handle, weak) = ActionHandle::new(id);
        let spec = ActionSpec::new(amount).on(ResourceId::new(ResourceClass::Cpu, 0), 1.0);
        (Action::new(id, &spec, 0.0, weak), handle)
    }

    #[test]
    fn test_terminal_states() {
        assert!(ActionState::Done.is_terminal());
        assert!(ActionState::Failed.is_terminal());
        assert!(ActionState::Canceled.is_terminal());
        assert!(!ActionState::Running.is_terminal());
        assert!(ActionState::Suspended.is_live());
        assert!(!ActionState::Init.is_live());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", ActionId::new(ResourceClass::Storage, 7)), "storage-action#7");
        assert_eq!(format!("{}", ActionId::new(ModelKind::Ptask, 0)), "ptask-action#0");
    }

    #[test]
    fn test_model_kind_of_class() {
        for class in ResourceClass::ALL {
            assert_eq!(ModelKind::from(class).class(), Some(class));
        }
        assert_eq!(ModelKind::Ptask.class(), None);
    }

    #[test]
    fn test_handle_refcount() {
        let (action, handle) = cpu_action(10.0);
        assert!(action.is_referenced());
        let other = handle.clone();
        assert_eq!(handle.ref_count(), 2);
        drop(handle);
        assert!(action.is_referenced());
        drop(other);
        assert!(!action.is_referenced());
    }

    #[test]
    fn test_advance_consumes_work() {
        let (mut action, _h) = cpu_action(100.0);
        action.state = ActionState::Running;
        action.advance(10.0, 4.0, 1e-5);
        assert_eq!(action.remaining(), 60.0);
        assert_eq!(action.last_update, 4.0);
        action.advance(10.0, 10.0, 1e-5);
        assert_eq!(action.remaining(), 0.0);
    }

    #[test]
    fn test_advance_skips_latency_first() {
        let (mut action, _h) = cpu_action(100.0);
        action.state = ActionState::Running;
        action.latency = 2.0;
        action.advance(10.0, 5.0, 1e-5);
        assert_eq!(action.latency(), 0.0);
        assert_eq!(action.remaining(), 70.0);
    }

    #[test]
    fn test_suspended_does_not_progress() {
        let (mut action, _h) = cpu_action(100.0);
        action.state = ActionState::Suspended;
        action.advance(10.0, 5.0, 1e-5);
        assert_eq!(action.remaining(), 100.0);
        assert_eq!(action.last_update, 5.0);
    }

    #[test]
    fn test_remaining_at_projects() {
        let (mut action, _h) = cpu_action(100.0);
        action.state = ActionState::Running;
        assert_eq!(action.remaining_at(10.0, 3.0), 70.0);
        assert_eq!(action.remaining_at(10.0, 30.0), 0.0);
        assert_eq!(action.remaining(), 100.0);
    }

    #[test]
    fn test_effective_weight() {
        let (mut action, _h) = cpu_action(1.0);
        assert_eq!(action.effective_weight(), 0.0);
        action.state = ActionState::Running;
        assert_eq!(action.effective_weight(), 1.0);
        action.priority = 0.0;
        assert_eq!(action.effective_weight(), 0.0);
        action.priority = 3.0;
        action.latency = 0.5;
        assert_eq!(action.effective_weight(), 0.0);
    }

    #[test]
    fn test_deadline() {
        let id = ActionId::new(ResourceClass::Cpu, 1);
        let (_handle, weak) = ActionHandle::new(id);
        let spec = ActionSpec::new(1.0).max_duration(5.0);
        let action = Action::new(id, &spec, 2.0, weak);
        assert_eq!(action.deadline(), Some(7.0));
    }
}
