//! Range-action optimization for a fixed set of network actions.
//!
//! A leaf hands its network, sensitivities and starting setpoints to a
//! [`LinearOptimizer`], which returns optimized setpoints and the resulting
//! cost. [`IteratingLinearOptimizer`] is the default implementation: a
//! max-min-margin linear problem solved repeatedly around the latest
//! sensitivities.

mod iterating;
mod problem;

pub use iterating::IteratingLinearOptimizer;
pub use problem::{RangeActionBounds, SHRINK_RATIO};

use crate::applied::{AppliedRemedialActions, RangeActionSetpoints};
use crate::error::EvaluationError;
use crate::objective::{ObjectiveFunction, ObjectiveValue};
use crate::parameters::RaUsageLimits;
use crate::perimeter::OptimizationPerimeter;
use crate::sensitivity::{SensitivityProvider, SensitivityResult};
use rao_core::{Instant, Network, NetworkAction, RaoResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Setpoint changes below this value are considered as no move.
pub const SETPOINT_CHANGE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearProblemStatus {
    /// Setpoints converged
    Optimal,
    /// Stopped on a non-improving or infeasible later iteration
    Feasible,
    /// No solution at the first iteration; setpoints unchanged
    Infeasible,
    MaxIterationReached,
    SensitivityComputationFailed,
}

/// Everything one range-action optimization works on.
pub struct LinearOptimizationInput<'a> {
    pub perimeter: &'a OptimizationPerimeter,
    /// Leaf network: network actions and starting main-state setpoints applied
    pub network: &'a Network,
    /// Post-contingency actions decided outside this perimeter
    pub applied: &'a AppliedRemedialActions,
    /// Setpoints before the perimeter, reference of admissible ranges and penalties
    pub pre_perimeter_setpoints: &'a BTreeMap<String, f64>,
    pub starting_setpoints: &'a RangeActionSetpoints,
    /// Sensitivities at `starting_setpoints`
    pub sensitivity: &'a SensitivityResult,
    pub objective: &'a ObjectiveFunction,
    pub provider: &'a dyn SensitivityProvider,
    pub ra_range_shrinking: bool,
    pub usage_limits: &'a BTreeMap<Instant, RaUsageLimits>,
    /// Network actions of the leaf, counted against the usage limits
    pub activated_network_actions: &'a [Arc<NetworkAction>],
}

#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    pub status: LinearProblemStatus,
    pub setpoints: RangeActionSetpoints,
    pub sensitivity: SensitivityResult,
    pub objective: ObjectiveValue,
    pub iterations: usize,
}

/// Continuous optimizer seen by the search tree.
pub trait LinearOptimizer: Send + Sync {
    fn id(&self) -> &str;

    /// Optimize the perimeter's range actions.
    ///
    /// Infeasibility is a status of the result; an `Err` means the leaf
    /// cannot be evaluated.
    fn optimize(
        &self,
        input: &LinearOptimizationInput<'_>,
    ) -> Result<LinearOptimizationResult, EvaluationError>;
}

/// Current setpoint on `network` of every (state, range action) of the perimeter.
pub fn setpoints_from_network(
    perimeter: &OptimizationPerimeter,
    network: &Network,
) -> RaoResult<RangeActionSetpoints> {
    let mut setpoints = RangeActionSetpoints::new();
    for (state, range_actions) in perimeter.range_actions_per_state() {
        for ra in range_actions {
            setpoints.set(state, ra.id.clone(), network.range_action_setpoint(ra)?);
        }
    }
    Ok(setpoints)
}

/// Put `setpoints` in effect: main-state setpoints go on `network`, the
/// others are recorded in `applied` for their state.
pub fn apply_setpoints(
    perimeter: &OptimizationPerimeter,
    setpoints: &RangeActionSetpoints,
    network: &mut Network,
    applied: &mut AppliedRemedialActions,
) -> RaoResult<()> {
    for (state, range_actions) in perimeter.range_actions_per_state() {
        for ra in range_actions {
            let Some(setpoint) = setpoints.get(state, &ra.id) else {
                continue;
            };
            if state == perimeter.main_state() {
                network.apply_range_action(ra, setpoint)?;
            } else {
                applied.add_range_action(state, ra.clone(), setpoint);
            }
        }
    }
    Ok(())
}
