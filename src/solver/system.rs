/// Progressive-filling max-min solver.
///
/// Each variable `v` receives `rate(v) = weight(v) × λ` where the common
/// level `λ` rises until some constraint saturates. For a shared constraint
/// `k` the level at which it saturates is
/// `remaining(k) / Σ consumption(v,k) × weight(v)`; for a fatpipe it is
/// `bound(k) / max consumption(v,k) × weight(v)`. The variables on the
/// constraint with the lowest level are fixed, their consumption is removed
/// from every other constraint they touch, and the process repeats until
/// no unfixed variable is left on a live constraint. A variable with a rate
/// bound is fixed at that bound as soon as the level would exceed it.
///
/// With selective updates on, only the connected component reachable from a
/// modified constraint is recomputed. The rest of the system keeps the rates
/// of the previous solve, which are still exact because nothing they depend
/// on changed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use crate::action::ActionId;
use crate::resource::ResourceId;
use crate::time::{double_equals, double_positive};

use super::constraint::{Constraint, ConstraintId, SharingPolicy};
use super::variable::{Element, Variable, VariableId};

/// Per-constraint scratch state during one solve.
#[derive(Debug, Clone, Copy)]
struct Level {
    remaining: f64,
    usage: f64,
}

/// The sharing system owned by one model.
#[derive(Debug, Clone)]
pub struct System {
    constraints: Vec<Constraint>,
    variables: Vec<Option<Variable>>,
    free_slots: Vec<usize>,
    /// Constraints whose variables must be re-examined on the next solve.
    modified: BTreeSet<ConstraintId>,
    selective_update: bool,
    precision: f64,
    solves: u64,
}

impl System {
    /// Create an empty system.
    pub fn new(selective_update: bool, precision: f64) -> Self {
        System {
            constraints: Vec::new(),
            variables: Vec::new(),
            free_slots: Vec::new(),
            modified: BTreeSet::new(),
            selective_update,
            precision,
            solves: 0,
        }
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// Number of solves that actually recomputed something.
    pub fn solves(&self) -> u64 {
        self.solves
    }

    // ── Constraints ───────────────────────────────────────────────────

    /// Register a constraint for `resource` with capacity `bound`.
    pub fn constraint_new(
        &mut self,
        resource: ResourceId,
        bound: f64,
        policy: SharingPolicy,
    ) -> ConstraintId {
        let id = ConstraintId::new(self.constraints.len());
        self.constraints.push(Constraint::new(resource, bound, policy));
        id
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id.raw())
    }

    /// Change the capacity of a constraint. Takes effect on the next solve.
    pub fn update_constraint_bound(&mut self, id: ConstraintId, bound: f64) {
        match self.constraints.get_mut(id.raw()) {
            Some(cnst) => {
                cnst.bound = bound;
                self.modified.insert(id);
            }
            None => warn!(constraint = %id, "bound update on unknown constraint"),
        }
    }

    /// `true` if at least one variable is bound to the constraint.
    pub fn constraint_used(&self, id: ConstraintId) -> bool {
        self.constraint(id).is_some_and(|c| !c.variables.is_empty())
    }

    /// Consumption recorded by the last solve.
    pub fn constraint_usage(&self, id: ConstraintId) -> f64 {
        self.constraint(id).map_or(0.0, |c| c.usage)
    }

    /// Flag a constraint so the next solve recomputes its component.
    pub fn touch(&mut self, id: ConstraintId) {
        if id.raw() < self.constraints.len() {
            self.modified.insert(id);
        }
    }

    /// `true` if the next solve has work to do.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    // ── Variables ─────────────────────────────────────────────────────

    /// Register a variable for `action`.
    pub fn variable_new(&mut self, action: ActionId, weight: f64, bound: Option<f64>) -> VariableId {
        let variable = Variable::new(action, weight, bound);
        match self.free_slots.pop() {
            Some(slot) => {
                self.variables[slot] = Some(variable);
                VariableId::new(slot)
            }
            None => {
                self.variables.push(Some(variable));
                VariableId::new(self.variables.len() - 1)
            }
        }
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.raw()).and_then(Option::as_ref)
    }

    /// Rate of a variable after the last solve, `0.0` if it does not exist.
    pub fn value(&self, id: VariableId) -> f64 {
        self.variable(id).map_or(0.0, |v| v.value)
    }

    /// Number of live variables.
    pub fn variable_count(&self) -> usize {
        self.variables.iter().filter(|v| v.is_some()).count()
    }

    /// Bind `var` to `cnst` with the given consumption weight.
    ///
    /// Expanding twice onto the same constraint accumulates consumption on a
    /// shared constraint and keeps the larger one on a fatpipe.
    pub fn expand(&mut self, cnst: ConstraintId, var: VariableId, consumption: f64) {
        let Some(policy) = self.constraints.get(cnst.raw()).map(|c| c.policy) else {
            warn!(constraint = %cnst, "expand on unknown constraint");
            return;
        };
        let Some(variable) = self.variables.get_mut(var.raw()).and_then(Option::as_mut) else {
            warn!(variable = %var, "expand of unknown variable");
            return;
        };
        match variable.elements.iter_mut().find(|e| e.constraint == cnst) {
            Some(elem) => match policy {
                SharingPolicy::Shared => elem.consumption += consumption,
                SharingPolicy::Fatpipe => elem.consumption = elem.consumption.max(consumption),
            },
            None => {
                variable.elements.push(Element {
                    constraint: cnst,
                    consumption,
                });
                self.constraints[cnst.raw()].variables.push(var);
            }
        }
        self.modified.insert(cnst);
    }

    /// Detach a variable from every constraint and recycle its slot.
    pub fn variable_free(&mut self, var: VariableId) {
        let Some(variable) = self.variables.get_mut(var.raw()).and_then(Option::take) else {
            return;
        };
        for elem in &variable.elements {
            if let Some(cnst) = self.constraints.get_mut(elem.constraint.raw()) {
                cnst.variables.retain(|v| *v != var);
                self.modified.insert(elem.constraint);
            }
        }
        self.free_slots.push(var.raw());
    }

    /// Change the weight of a variable. A non-positive weight freezes it at rate zero.
    pub fn update_variable_weight(&mut self, var: VariableId, weight: f64) {
        if let Some(variable) = self.variables.get_mut(var.raw()).and_then(Option::as_mut) {
            if variable.weight == weight {
                return;
            }
            variable.weight = weight;
            self.modified
                .extend(variable.elements.iter().map(|e| e.constraint));
        }
    }

    /// Change the rate bound of a variable.
    pub fn update_variable_bound(&mut self, var: VariableId, bound: Option<f64>) {
        if let Some(variable) = self.variables.get_mut(var.raw()).and_then(Option::as_mut) {
            if variable.bound == bound {
                return;
            }
            variable.bound = bound;
            self.modified
                .extend(variable.elements.iter().map(|e| e.constraint));
        }
    }

    // ── Solve ─────────────────────────────────────────────────────────

    /// Variables whose rate the next [`solve`](Self::solve) will recompute.
    pub fn pending_variables(&self) -> Vec<VariableId> {
        self.modified_component().1.into_iter().collect()
    }

    /// Recompute rates for every variable affected by changes since the
    /// previous solve and return those variables.
    ///
    /// Calling `solve` again without intervening changes does nothing.
    pub fn solve(&mut self) -> Vec<VariableId> {
        if self.modified.is_empty() {
            return Vec::new();
        }
        let (constraints, variables) = self.modified_component();
        self.modified.clear();
        self.solve_component(&constraints, &variables);
        self.solves += 1;
        debug!(
            constraints = constraints.len(),
            variables = variables.len(),
            selective = self.selective_update,
            "sharing system solved"
        );
        variables.into_iter().collect()
    }

    /// The constraints and variables a solve must cover.
    fn modified_component(&self) -> (BTreeSet<ConstraintId>, BTreeSet<VariableId>) {
        let mut constraints = BTreeSet::new();
        let mut variables = BTreeSet::new();
        if self.modified.is_empty() {
            return (constraints, variables);
        }

        if !self.selective_update {
            for (raw, cnst) in self.constraints.iter().enumerate() {
                constraints.insert(ConstraintId::new(raw));
                variables.extend(cnst.variables.iter().copied());
            }
            return (constraints, variables);
        }

        let mut stack: Vec<ConstraintId> = self.modified.iter().copied().collect();
        while let Some(cnst) = stack.pop() {
            if !constraints.insert(cnst) {
                continue;
            }
            for &var in &self.constraints[cnst.raw()].variables {
                if !variables.insert(var) {
                    continue;
                }
                let Some(variable) = self.variable(var) else {
                    continue;
                };
                // Frozen variables take no capacity, so they link nothing.
                if !variable.is_active() {
                    continue;
                }
                stack.extend(
                    variable
                        .elements
                        .iter()
                        .map(|e| e.constraint)
                        .filter(|c| !constraints.contains(c)),
                );
            }
        }
        (constraints, variables)
    }

    /// Weighted demand on `cnst` from the variables not yet fixed.
    fn pending_usage(&self, cnst: ConstraintId, unfixed: &BTreeSet<VariableId>) -> f64 {
        let constraint = &self.constraints[cnst.raw()];
        let mut usage: f64 = 0.0;
        for var in constraint.variables.iter().filter(|v| unfixed.contains(v)) {
            let Some(variable) = self.variable(*var) else {
                continue;
            };
            let Some(consumption) = variable.consumption_on(cnst) else {
                continue;
            };
            if consumption <= 0.0 {
                continue;
            }
            let demand = consumption * variable.weight;
            match constraint.policy {
                SharingPolicy::Shared => usage += demand,
                SharingPolicy::Fatpipe => usage = usage.max(demand),
            }
        }
        usage
    }

    fn solve_component(
        &mut self,
        constraints: &BTreeSet<ConstraintId>,
        variables: &BTreeSet<VariableId>,
    ) {
        let eps = self.precision;

        let mut unfixed: BTreeSet<VariableId> = BTreeSet::new();
        for &var in variables {
            if let Some(variable) = self.variables.get_mut(var.raw()).and_then(Option::as_mut) {
                variable.value = 0.0;
                if variable.is_active() {
                    unfixed.insert(var);
                }
            }
        }

        // A constraint without capacity pins its variables at rate zero.
        for &cnst in constraints {
            let constraint = &self.constraints[cnst.raw()];
            if double_positive(constraint.bound, eps) {
                continue;
            }
            for var in &constraint.variables {
                let consumes = self
                    .variable(*var)
                    .and_then(|v| v.consumption_on(cnst))
                    .is_some_and(|c| c > 0.0);
                if consumes {
                    unfixed.remove(var);
                }
            }
        }

        let mut live: BTreeMap<ConstraintId, Level> = BTreeMap::new();
        for &cnst in constraints {
            let bound = self.constraints[cnst.raw()].bound;
            if !double_positive(bound, eps) {
                continue;
            }
            let usage = self.pending_usage(cnst, &unfixed);
            if usage > 0.0 {
                live.insert(
                    cnst,
                    Level {
                        remaining: bound,
                        usage,
                    },
                );
            }
        }

        loop {
            let mut min_level: Option<f64> = None;
            let mut saturated: Vec<ConstraintId> = Vec::new();
            for (&cnst, level) in &live {
                let candidate = level.remaining / level.usage;
                match min_level {
                    Some(min) if candidate > min => {}
                    Some(min) if candidate == min => saturated.push(cnst),
                    _ => {
                        min_level = Some(candidate);
                        saturated.clear();
                        saturated.push(cnst);
                    }
                }
            }

            let mut min_bound: Option<f64> = None;
            for var in &unfixed {
                let Some(variable) = self.variable(*var) else {
                    continue;
                };
                if let Some(bound) = variable.bound {
                    let candidate = bound / variable.weight;
                    let below_level = min_level.map_or(true, |min| candidate < min);
                    if below_level && min_bound.map_or(true, |min| candidate < min) {
                        min_bound = Some(candidate);
                    }
                }
            }

            let mut to_fix: Vec<(VariableId, f64)> = Vec::new();
            let mut chosen: BTreeSet<VariableId> = BTreeSet::new();
            if let Some(level) = min_bound {
                for var in &unfixed {
                    let Some(variable) = self.variable(*var) else {
                        continue;
                    };
                    if let Some(bound) = variable.bound {
                        if double_equals(bound / variable.weight, level, eps) && chosen.insert(*var) {
                            to_fix.push((*var, bound));
                        }
                    }
                }
            } else if let Some(level) = min_level {
                for cnst in &saturated {
                    for var in &self.constraints[cnst.raw()].variables {
                        if !unfixed.contains(var) {
                            continue;
                        }
                        let Some(variable) = self.variable(*var) else {
                            continue;
                        };
                        let consumes = variable.consumption_on(*cnst).is_some_and(|c| c > 0.0);
                        if consumes && chosen.insert(*var) {
                            to_fix.push((*var, (level * variable.weight).max(0.0)));
                        }
                    }
                }
            } else {
                break;
            }

            if to_fix.is_empty() {
                break;
            }

            let mut touched: BTreeSet<ConstraintId> = BTreeSet::new();
            for (var, value) in to_fix {
                unfixed.remove(&var);
                let Some(variable) = self.variables.get_mut(var.raw()).and_then(Option::as_mut) else {
                    continue;
                };
                variable.value = value;
                trace!(variable = %var, action = %variable.action, rate = value, "variable fixed");
                for elem in &variable.elements {
                    let Some(level) = live.get_mut(&elem.constraint) else {
                        continue;
                    };
                    let constraint = &self.constraints[elem.constraint.raw()];
                    if constraint.policy == SharingPolicy::Shared {
                        level.remaining -= elem.consumption * value;
                        if level.remaining < constraint.bound * eps {
                            level.remaining = 0.0;
                        }
                    }
                    touched.insert(elem.constraint);
                }
            }

            for cnst in touched {
                let usage = self.pending_usage(cnst, &unfixed);
                if let Some(level) = live.get_mut(&cnst) {
                    level.usage = usage;
                }
            }
            live.retain(|_, level| level.usage > 0.0);
        }

        for &cnst in constraints {
            let usage = self.allocated_usage(cnst);
            self.constraints[cnst.raw()].usage = usage;
        }
    }

    /// Consumption on `cnst` implied by the current variable values.
    fn allocated_usage(&self, cnst: ConstraintId) -> f64 {
        let constraint = &self.constraints[cnst.raw()];
        let mut usage: f64 = 0.0;
        for var in &constraint.variables {
            let Some(variable) = self.variable(*var) else {
                continue;
            };
            let consumed = variable.consumption_on(cnst).unwrap_or(0.0) * variable.value;
            match constraint.policy {
                SharingPolicy::Shared => usage += consumed,
                SharingPolicy::Fatpipe => usage = usage.max(consumed),
            }
        }
        usage
    }
}
