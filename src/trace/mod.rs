//! Trace collaborator: externally scripted capacity and availability changes.
//!
//! A [`Trace`] is a list of `(date, value)` points, optionally repeating.
//! Traces are attached to a resource as either a scale (availability
//! factor) or a state (on/off) trace. The main loop only sees the
//! [`TraceSource`] interface: the date of the next pending event, and the
//! events due up to a given date.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`event`] | [`TraceKind`], [`TraceValue`], [`TraceEvent`] |
//! | [`profile`] | [`Trace`] and its text format |
//! | [`manager`] | [`TraceSource`] trait, [`TraceManager`] |

pub mod event;
pub mod manager;
pub mod profile;

pub use event::{TraceEvent, TraceKind, TraceValue};
pub use manager::{TraceManager, TraceSource};
pub use profile::Trace;
