//! The sharing system: a max-min fair allocation solver.
//!
//! Every resource is a [`Constraint`] with a capacity bound; every running
//! action is a [`Variable`] whose weight expresses its share. An
//! [`Element`] binds a variable to a constraint with a consumption weight.
//! [`System::solve`] computes a rate for every variable such that no
//! constraint is oversubscribed and no variable can grow without shrinking
//! one whose weighted rate is not larger.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`constraint`] | [`ConstraintId`], [`SharingPolicy`], [`Constraint`] |
//! | [`variable`] | [`VariableId`], [`Element`], [`Variable`] |
//! | [`system`] | [`System`] and the progressive-filling solve |

pub mod constraint;
pub mod system;
pub mod variable;

pub use constraint::{Constraint, ConstraintId, SharingPolicy};
pub use system::System;
pub use variable::{Element, Variable, VariableId};

#[cfg(test)]
mod tests;
