/// Solver constraints: one per resource.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceId;

use super::variable::VariableId;

/// Slot of a constraint inside its [`System`](super::System).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(usize);

impl ConstraintId {
    #[inline]
    pub(crate) fn new(raw: usize) -> Self {
        ConstraintId(raw)
    }

    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// How a constraint divides its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingPolicy {
    /// The sum of weighted rates is bounded by the capacity.
    #[default]
    Shared,
    /// Each weighted rate is independently bounded by the capacity.
    Fatpipe,
}

impl std::fmt::Display for SharingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SharingPolicy::Shared => f.write_str("shared"),
            SharingPolicy::Fatpipe => f.write_str("fatpipe"),
        }
    }
}

/// A capacity bound shared by the variables expanded onto it.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub(crate) resource: ResourceId,
    pub(crate) bound: f64,
    pub(crate) policy: SharingPolicy,
    /// Each attached variable appears exactly once.
    pub(crate) variables: Vec<VariableId>,
    /// Consumption computed by the last solve that covered this constraint.
    pub(crate) usage: f64,
}

impl Constraint {
    pub(crate) fn new(resource: ResourceId, bound: f64, policy: SharingPolicy) -> Self {
        Constraint {
            resource,
            bound,
            policy,
            variables: Vec::new(),
            usage: 0.0,
        }
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn policy(&self) -> SharingPolicy {
        self.policy
    }

    pub fn variables(&self) -> &[VariableId] {
        &self.variables
    }

    pub fn usage(&self) -> f64 {
        self.usage
    }
}
