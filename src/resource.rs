/// Resources: the capacity-bearing entities actions compete for.
///
/// A resource belongs to exactly one class (cpu, network link, storage) and
/// is owned by that class's model. Its effective capacity is
/// `peak × scale × cores`; trace events move `scale` and the on/off state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::solver::{ConstraintId, SharingPolicy};
use crate::trace::Trace;

// ── Class & identity ──────────────────────────────────────────────────

/// The resource class, one per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Cpu,
    Network,
    Storage,
}

impl ResourceClass {
    /// Every class, in the order the main loop visits the models.
    pub const ALL: [ResourceClass; 3] = [
        ResourceClass::Cpu,
        ResourceClass::Network,
        ResourceClass::Storage,
    ];

    /// Short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceClass::Cpu => "cpu",
            ResourceClass::Network => "network",
            ResourceClass::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a resource: its class plus its slot in the owning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    class: ResourceClass,
    index: u32,
}

impl ResourceId {
    #[inline]
    pub(crate) fn new(class: ResourceClass, index: usize) -> Self {
        ResourceId {
            class,
            index: index as u32,
        }
    }

    /// The class (and therefore the model) this resource belongs to.
    #[inline]
    pub fn class(self) -> ResourceClass {
        self.class
    }

    /// Slot inside the owning model.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.class, self.index)
    }
}

/// Availability of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    On,
    Off,
}

impl ResourceState {
    /// Interpret a raw trace value: strictly positive means ON.
    pub fn from_trace_value(value: f64) -> Self {
        if value > 0.0 {
            ResourceState::On
        } else {
            ResourceState::Off
        }
    }

    #[inline]
    pub fn is_on(self) -> bool {
        self == ResourceState::On
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::On => f.write_str("ON"),
            ResourceState::Off => f.write_str("OFF"),
        }
    }
}

// ── Declaration ───────────────────────────────────────────────────────

/// Everything needed to register a resource with the kernel.
///
/// ```
/// use fairshare::{ResourceSpec, ResourceState};
///
/// let spec = ResourceSpec::cpu("host-1", 1e9).cores(4).state(ResourceState::On);
/// assert_eq!(spec.name(), "host-1");
/// ```
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub(crate) name: String,
    pub(crate) class: ResourceClass,
    pub(crate) peak: f64,
    pub(crate) scale: f64,
    pub(crate) cores: u32,
    pub(crate) state: ResourceState,
    pub(crate) policy: SharingPolicy,
    pub(crate) latency: f64,
    pub(crate) size: Option<f64>,
    pub(crate) scale_trace: Option<Trace>,
    pub(crate) state_trace: Option<Trace>,
}

impl ResourceSpec {
    /// A resource of `class` with peak capacity `peak`, shared, initially ON.
    pub fn new(class: ResourceClass, name: impl Into<String>, peak: f64) -> Self {
        ResourceSpec {
            name: name.into(),
            class,
            peak,
            scale: 1.0,
            cores: 1,
            state: ResourceState::On,
            policy: SharingPolicy::Shared,
            latency: 0.0,
            size: None,
            scale_trace: None,
            state_trace: None,
        }
    }

    /// A single-core cpu computing `speed` units per second.
    pub fn cpu(name: impl Into<String>, speed: f64) -> Self {
        Self::new(ResourceClass::Cpu, name, speed)
    }

    /// A shared network link of `bandwidth` units per second.
    pub fn link(name: impl Into<String>, bandwidth: f64) -> Self {
        Self::new(ResourceClass::Network, name, bandwidth)
    }

    /// A fatpipe link: every flow gets up to the full `bandwidth`.
    pub fn fatpipe(name: impl Into<String>, bandwidth: f64) -> Self {
        Self::new(ResourceClass::Network, name, bandwidth).policy(SharingPolicy::Fatpipe)
    }

    /// A storage device with `bandwidth` units per second and `size` units of space.
    pub fn storage(name: impl Into<String>, bandwidth: f64, size: f64) -> Self {
        Self::new(ResourceClass::Storage, name, bandwidth).size(size)
    }

    pub fn cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }

    /// Initial availability factor applied to the peak capacity.
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn state(mut self, state: ResourceState) -> Self {
        self.state = state;
        self
    }

    pub fn policy(mut self, policy: SharingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Link latency in seconds (network only).
    pub fn latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    /// Storage capacity (storage only).
    pub fn size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    /// Trace driving the availability factor.
    pub fn scale_trace(mut self, trace: Trace) -> Self {
        self.scale_trace = Some(trace);
        self
    }

    /// Trace driving the on/off state.
    pub fn state_trace(mut self, trace: Trace) -> Self {
        self.state_trace = Some(trace);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ResourceClass {
        self.class
    }
}

// ── Resource ──────────────────────────────────────────────────────────

/// A registered resource, owned by its model.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    name: String,
    peak: f64,
    scale: f64,
    cores: u32,
    state: ResourceState,
    policy: SharingPolicy,
    latency: f64,
    size: Option<f64>,
    constraint: ConstraintId,
    /// Back-references to the actions currently bound to this resource.
    pub(crate) actions: BTreeSet<ActionId>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, spec: &ResourceSpec, constraint: ConstraintId) -> Self {
        Resource {
            id,
            name: spec.name.clone(),
            peak: spec.peak,
            scale: spec.scale,
            cores: spec.cores.max(1),
            state: spec.state,
            policy: spec.policy,
            latency: spec.latency,
            size: spec.size,
            constraint,
            actions: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ResourceClass {
        self.id.class()
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn cores(&self) -> u32 {
        self.cores
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state.is_on()
    }

    pub fn policy(&self) -> SharingPolicy {
        self.policy
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn size(&self) -> Option<f64> {
        self.size
    }

    /// The solver constraint backing this resource.
    pub fn constraint(&self) -> ConstraintId {
        self.constraint
    }

    /// Effective capacity: `peak × scale × cores`.
    pub fn capacity(&self) -> f64 {
        self.peak * self.scale * f64::from(self.cores)
    }

    /// Capacity of a single core: `peak × scale`.
    pub fn core_capacity(&self) -> f64 {
        self.peak * self.scale
    }

    /// Actions currently bound to this resource, in id order.
    pub fn actions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.actions.iter().copied()
    }

    pub(crate) fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub(crate) fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_display() {
        let id = ResourceId::new(ResourceClass::Network, 3);
        assert_eq!(format!("{}", id), "network#3");
        assert_eq!(id.class(), ResourceClass::Network);
        assert_eq!(id.index(), 3);
    }

    #[test]
    fn test_state_from_trace_value() {
        assert_eq!(ResourceState::from_trace_value(1.0), ResourceState::On);
        assert_eq!(ResourceState::from_trace_value(0.0), ResourceState::Off);
        assert_eq!(ResourceState::from_trace_value(-1.0), ResourceState::Off);
    }

    #[test]
    fn test_spec_builders() {
        let spec = ResourceSpec::fatpipe("bb", 1e9).latency(0.01);
        assert_eq!(spec.class(), ResourceClass::Network);
        assert_eq!(spec.policy, SharingPolicy::Fatpipe);
        assert_eq!(spec.latency, 0.01);

        let disk = ResourceSpec::storage("disk", 100.0, 5000.0);
        assert_eq!(disk.class(), ResourceClass::Storage);
        assert_eq!(disk.size, Some(5000.0));
    }

    #[test]
    fn test_capacity() {
        let spec = ResourceSpec::cpu("h", 10.0).cores(4).scale(0.5);
        let mut r = Resource::new(
            ResourceId::new(ResourceClass::Cpu, 0),
            &spec,
            ConstraintId::new(0),
        );
        assert_eq!(r.capacity(), 20.0);
        assert_eq!(r.core_capacity(), 5.0);
        r.set_scale(1.0);
        assert_eq!(r.capacity(), 40.0);
    }

    #[test]
    fn test_zero_cores_clamped() {
        let spec = ResourceSpec::cpu("h", 10.0).cores(0);
        let r = Resource::new(
            ResourceId::new(ResourceClass::Cpu, 0),
            &spec,
            ConstraintId::new(0),
        );
        assert_eq!(r.cores(), 1);
    }
}
