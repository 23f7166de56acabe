//! Max-min-margin linear problem over range-action setpoints.
//!
//! Variables: one setpoint per (state, range action) of the perimeter, its
//! absolute variation from the pre-perimeter setpoint, the minimum margin,
//! and one violation slack per monitored Cnec. Cnec flows are linearized
//! around the setpoints the sensitivities were computed at:
//!
//! ```text
//! F(c) = F0(c) + Σ_r s(c, r) · (x(r) − x0(r))
//! ```
//!
//! where `x(r)` is the variable of the latest state acting on the Cnec's
//! state (the preventive one, or a previous instant of the same
//! contingency).

use crate::applied::RangeActionSetpoints;
use crate::error::EvaluationError;
use crate::objective::ObjectiveFunction;
use crate::parameters::RangeActionsParameters;
use crate::perimeter::OptimizationPerimeter;
use crate::sensitivity::SensitivityResult;
use good_lp::solvers::clarabel::clarabel;
use good_lp::{
    constraint, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable,
};
use rao_core::{Cnec, Network, RangeAction, RangeActionKind, State};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

/// Ratio applied per iteration to the admissible range when shrinking.
pub const SHRINK_RATIO: f64 = 0.667;

/// Stand-in for infinite bounds, which the solver does not accept.
const INFINITE_BOUND: f64 = 1e6;

/// Interval a range-action setpoint may take in one linear problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeActionBounds {
    pub min: f64,
    pub max: f64,
}

impl RangeActionBounds {
    /// Admissible interval given the previous-instant setpoint, limited to
    /// the tap range for PSTs.
    pub fn admissible(ra: &RangeAction, previous: f64, network: &Network) -> Self {
        let mut min = ra.min_admissible_setpoint(previous);
        let mut max = ra.max_admissible_setpoint(previous);
        if ra.kind == RangeActionKind::PstTap {
            if let Ok((low, high)) = network.pst_tap_range(&ra.element) {
                min = min.max(f64::from(low));
                max = max.min(f64::from(high));
            }
        }
        Self { min, max }
    }

    /// Restrict the interval around `center` at a 0-based `iteration`.
    ///
    /// The first iteration is never shrunk; infinite intervals are kept.
    pub fn shrunk(self, center: f64, iteration: usize) -> Self {
        if iteration == 0 || !self.min.is_finite() || !self.max.is_finite() {
            return self;
        }
        let exponent = i32::try_from(iteration).unwrap_or(i32::MAX);
        let range = (self.max - self.min) * SHRINK_RATIO.powi(exponent);
        let center = self.clamp(center);
        Self {
            min: (center - range).max(self.min),
            max: (center + range).min(self.max),
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Closest integer tap inside the interval.
    pub fn round_tap(&self, value: f64) -> f64 {
        let low = self.min.ceil();
        let high = self.max.floor();
        if low > high {
            return self.clamp(value);
        }
        value.round().max(low).min(high)
    }

    fn solver_bounds(&self) -> (f64, f64) {
        (
            self.min.max(-INFINITE_BOUND),
            self.max.min(INFINITE_BOUND),
        )
    }
}

struct SetpointVariable {
    state: State,
    range_action: Arc<RangeAction>,
    setpoint: Variable,
    variation: Variable,
    bounds: RangeActionBounds,
    previous: f64,
    reference: f64,
}

/// One linear problem, built around a sensitivity result.
pub(crate) struct LinearProblem<'a> {
    pub perimeter: &'a OptimizationPerimeter,
    pub network: &'a Network,
    pub pre_perimeter_setpoints: &'a BTreeMap<String, f64>,
    /// Setpoints `sensitivity` was computed at
    pub reference: &'a RangeActionSetpoints,
    pub sensitivity: &'a SensitivityResult,
    pub objective: &'a ObjectiveFunction,
    pub params: &'a RangeActionsParameters,
}

impl LinearProblem<'_> {
    fn penalty(&self, kind: RangeActionKind) -> f64 {
        match kind {
            RangeActionKind::PstTap => self.params.pst_penalty_cost,
            RangeActionKind::Hvdc => self.params.hvdc_penalty_cost,
            RangeActionKind::Injection => self.params.injection_penalty_cost,
        }
    }

    fn previous_setpoint(&self, state: &State, ra: &RangeAction) -> f64 {
        self.pre_perimeter_setpoints
            .get(&ra.id)
            .copied()
            .or_else(|| self.reference.get(state, &ra.id))
            .unwrap_or(ra.initial_setpoint)
    }

    /// Bounds of every (state, range action) at `iteration`.
    pub fn bounds(&self, iteration: usize, shrinking: bool) -> BTreeMap<(State, String), RangeActionBounds> {
        let mut bounds = BTreeMap::new();
        for (state, range_actions) in self.perimeter.range_actions_per_state() {
            for ra in range_actions {
                let previous = self.previous_setpoint(state, ra);
                let reference = self.reference.get(state, &ra.id).unwrap_or(previous);
                let mut b = RangeActionBounds::admissible(ra, previous, self.network);
                if shrinking {
                    b = b.shrunk(reference, iteration);
                }
                bounds.insert((state.clone(), ra.id.clone()), b);
            }
        }
        bounds
    }

    /// Variable acting on `range_action` in `state`.
    fn effective<'v>(
        variables: &'v [SetpointVariable],
        state: &State,
        range_action: &str,
    ) -> Option<&'v SetpointVariable> {
        variables
            .iter()
            .filter(|v| v.range_action.id == range_action)
            .filter(|v| {
                v.state.is_preventive()
                    || (v.state.contingency() == state.contingency()
                        && v.state.instant() <= state.instant())
            })
            .max_by(|a, b| a.state.cmp(&b.state))
    }

    fn flow_expression(&self, cnec: &Cnec, variables: &[SetpointVariable]) -> Option<Expression> {
        let flow = self.sensitivity.flow(&cnec.id)?;
        let mut constant = flow;
        let mut terms = Vec::new();
        let range_action_ids: BTreeSet<&str> = variables
            .iter()
            .map(|v| v.range_action.id.as_str())
            .collect();
        for id in range_action_ids {
            let s = self.sensitivity.sensitivity(&cnec.id, id);
            if s == 0.0 {
                continue;
            }
            if let Some(v) = Self::effective(variables, &cnec.state, id) {
                constant -= s * v.reference;
                terms.push(s * v.setpoint);
            }
        }
        let mut expression = Expression::from(constant);
        for term in terms {
            expression += term;
        }
        Some(expression)
    }

    /// Solve at `iteration`; PST setpoints are rounded to taps.
    pub fn solve(
        &self,
        iteration: usize,
        shrinking: bool,
    ) -> Result<RangeActionSetpoints, EvaluationError> {
        let bounds = self.bounds(iteration, shrinking);
        let mut vars = variables!();

        let mut setpoint_vars = Vec::new();
        for (state, range_actions) in self.perimeter.range_actions_per_state() {
            for ra in range_actions {
                let Some(b) = bounds.get(&(state.clone(), ra.id.clone())).copied() else {
                    continue;
                };
                if b.min > b.max {
                    return Err(EvaluationError::Infeasible(format!(
                        "empty admissible range for '{}' in '{state}'",
                        ra.id
                    )));
                }
                let (low, high) = b.solver_bounds();
                let previous = self.previous_setpoint(state, ra);
                setpoint_vars.push(SetpointVariable {
                    state: state.clone(),
                    range_action: ra.clone(),
                    setpoint: vars.add(variable().min(low).max(high)),
                    variation: vars.add(variable().min(0.0).max(2.0 * INFINITE_BOUND)),
                    bounds: b,
                    previous,
                    reference: self.reference.get(state, &ra.id).unwrap_or(previous),
                });
            }
        }

        let perimeter_cnecs: BTreeSet<&str> =
            self.perimeter.cnecs().iter().map(|c| c.id.as_str()).collect();
        let usable = |cnec: &Cnec| {
            perimeter_cnecs.contains(cnec.id.as_str())
                && !self.sensitivity.is_state_failed(&cnec.state)
        };

        let mut margin_constraints = Vec::new();
        for cnec in self.objective.optimized_cnecs().iter().filter(|c| usable(*c)) {
            if let Some(flow) = self.flow_expression(cnec, &setpoint_vars) {
                margin_constraints.push((cnec.min, cnec.max, flow));
            }
        }
        let min_margin = (!margin_constraints.is_empty())
            .then(|| vars.add(variable().min(-INFINITE_BOUND).max(INFINITE_BOUND)));

        let mut mnec_constraints = Vec::new();
        for (cnec, floor) in self.objective.monitored_cnecs() {
            if !usable(cnec) {
                continue;
            }
            if let Some(flow) = self.flow_expression(cnec, &setpoint_vars) {
                let slack = vars.add(variable().min(0.0).max(INFINITE_BOUND));
                mnec_constraints.push((cnec.min, cnec.max, *floor, flow, slack));
            }
        }

        let mut objective = Expression::from(0.0);
        if let Some(m) = min_margin {
            objective += -1.0 * m;
        }
        for v in &setpoint_vars {
            objective += self.penalty(v.range_action.kind) * v.variation;
        }
        for (.., slack) in &mnec_constraints {
            objective += self.objective.mnec_violation_cost() * *slack;
        }

        let mut problem = vars.minimise(objective).using(clarabel);

        for v in &setpoint_vars {
            problem = problem.with(constraint!(v.variation - v.setpoint >= -v.previous));
            problem = problem.with(constraint!(v.variation + v.setpoint >= v.previous));
        }

        let mut groups: BTreeMap<(&State, &str), Vec<Variable>> = BTreeMap::new();
        for v in &setpoint_vars {
            if let Some(group) = v.range_action.group_id.as_deref() {
                groups.entry((&v.state, group)).or_default().push(v.setpoint);
            }
        }
        for members in groups.values() {
            for pair in members.windows(2) {
                problem = problem.with(constraint!(pair[1] - pair[0] == 0.0));
            }
        }

        if let Some(m) = min_margin {
            for (min, max, flow) in margin_constraints {
                if let Some(max) = max {
                    let lhs = flow.clone() + m;
                    problem = problem.with(constraint!(lhs <= max));
                }
                if let Some(min) = min {
                    let lhs = Expression::from(m) - flow;
                    problem = problem.with(constraint!(lhs <= -min));
                }
            }
        }

        for (min, max, floor, flow, slack) in mnec_constraints {
            // margin + slack >= floor on both sides
            if let Some(max) = max {
                let lhs = flow.clone() - slack;
                problem = problem.with(constraint!(lhs <= max - floor));
            }
            if let Some(min) = min {
                let lhs = flow + slack;
                problem = problem.with(constraint!(lhs >= min + floor));
            }
        }

        let solution = problem.solve().map_err(|e| match e {
            ResolutionError::Infeasible => {
                EvaluationError::Infeasible(format!("iteration {iteration}: no admissible setpoints"))
            }
            other => EvaluationError::Solver(format!("LP solver failed: {other:?}")),
        })?;

        let mut setpoints = RangeActionSetpoints::new();
        for v in &setpoint_vars {
            let raw = solution.value(v.setpoint);
            let value = match v.range_action.kind {
                RangeActionKind::PstTap => v.bounds.round_tap(raw),
                RangeActionKind::Hvdc | RangeActionKind::Injection => v.bounds.clamp(raw),
            };
            trace!(state = %v.state, range_action = %v.range_action.id, raw, value, "linear problem setpoint");
            setpoints.set(&v.state, v.range_action.id.clone(), value);
        }
        Ok(setpoints)
    }
}
