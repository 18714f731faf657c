//! Structured error types for the kernel.
//!
//! All fallible public APIs return `Result<T, KernelError>`. These are
//! configuration and usage errors, reported synchronously to the caller.
//! Simulated failures (a resource going offline under an action) are not
//! errors: they surface as `ActionState::Failed`.

use thiserror::Error;

use crate::action::{ActionId, ModelKind};
use crate::resource::{ResourceClass, ResourceId};

/// The top-level error type for the kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    // ── Resource errors ───────────────────────────────────

    /// A resource ID was referenced but is not registered.
    #[error("resource {0} not found")]
    UnknownResource(ResourceId),

    /// A resource name is already in use within its class.
    #[error("{class} resource '{name}' is already registered")]
    DuplicateResource { class: ResourceClass, name: String },

    /// The model only tracks resources registered with another model.
    #[error("the {0} model does not own resources")]
    NotAResourceOwner(ModelKind),

    /// Capacity (or scale, or size) is negative or not finite.
    #[error("resource '{name}' has invalid capacity {capacity}")]
    InvalidCapacity { name: String, capacity: f64 },

    // ── Action errors ─────────────────────────────────────

    /// An action was requested without any resource demand.
    #[error("action has no resource demand")]
    EmptyDemands,

    /// Every demand of the requested action is zero.
    #[error("action has no positive resource demand")]
    NoActiveDemand,

    /// An action spans resources of different classes.
    #[error("action spans {expected} and {found} resources")]
    MixedResourceClasses {
        expected: ResourceClass,
        found: ResourceClass,
    },

    /// Amount, priority, duration or rate is negative or not a number.
    #[error("invalid action parameter {0}")]
    InvalidAmount(f64),

    /// An action ID was referenced but the action no longer exists.
    #[error("action {0} not found")]
    UnknownAction(ActionId),

    // ── Trace errors ──────────────────────────────────────

    /// A trace profile could not be parsed.
    #[error("invalid trace at line {line}: {reason}")]
    InvalidTrace { line: usize, reason: String },

    // ── Scenario / config errors ──────────────────────────

    /// The kernel configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A scenario description references something that does not exist.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    // ── I/O errors ────────────────────────────────────────

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type KernelResult<T> = Result<T, KernelError>;
