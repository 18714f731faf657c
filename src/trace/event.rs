/// Trace event records.

use serde::{Deserialize, Serialize};

use crate::resource::{ResourceId, ResourceState};

/// Which attribute of a resource a trace drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// Availability factor multiplied into the peak capacity.
    Scale,
    /// On/off state; a value `> 0` means ON.
    State,
}

/// The new value carried by a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceValue {
    Scale(f64),
    State(ResourceState),
}

impl TraceValue {
    /// Interpret a raw trace value for the given kind.
    pub fn from_raw(kind: TraceKind, value: f64) -> Self {
        match kind {
            TraceKind::Scale => TraceValue::Scale(value),
            TraceKind::State => TraceValue::State(ResourceState::from_trace_value(value)),
        }
    }
}

impl std::fmt::Display for TraceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceValue::Scale(v) => write!(f, "scale={}", v),
            TraceValue::State(s) => write!(f, "state={}", s),
        }
    }
}

/// A change to apply to `resource` at `date`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEvent {
    pub date: f64,
    pub resource: ResourceId,
    pub value: TraceValue,
}

impl std::fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[T={}] {} {}", self.date, self.resource, self.value)
    }
}
