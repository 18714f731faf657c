/// Solver variables: one per running action.

use crate::action::ActionId;

use super::constraint::ConstraintId;

/// Slot of a variable inside its [`System`](super::System).
///
/// Slots are recycled after [`System::variable_free`](super::System::variable_free),
/// so a `VariableId` must be dropped together with the action that owned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(usize);

impl VariableId {
    #[inline]
    pub(crate) fn new(raw: usize) -> Self {
        VariableId(raw)
    }

    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Binding of a variable to a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub constraint: ConstraintId,
    /// Capacity used on the constraint per unit of the variable's rate.
    pub consumption: f64,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) action: ActionId,
    pub(crate) weight: f64,
    pub(crate) bound: Option<f64>,
    pub(crate) value: f64,
    pub(crate) elements: Vec<Element>,
}

impl Variable {
    pub(crate) fn new(action: ActionId, weight: f64, bound: Option<f64>) -> Self {
        Variable {
            action,
            weight,
            bound,
            value: 0.0,
            elements: Vec::new(),
        }
    }

    /// The action this variable carries the rate of.
    pub fn action(&self) -> ActionId {
        self.action
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Upper bound on the rate, if any.
    pub fn bound(&self) -> Option<f64> {
        self.bound
    }

    /// Rate allocated by the last solve.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// A variable with a non-positive weight takes no share.
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }

    /// Active consumption on `constraint`, if the variable is bound to it.
    pub fn consumption_on(&self, constraint: ConstraintId) -> Option<f64> {
        self.elements
            .iter()
            .find(|e| e.constraint == constraint)
            .map(|e| e.consumption)
    }
}
