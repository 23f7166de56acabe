use super::combination::NetworkActionCombination;
use super::SearchTreeInput;
use crate::applied::{AppliedRemedialActions, RangeActionSetpoints};
use crate::error::EvaluationError;
use crate::linear::{
    apply_setpoints, LinearOptimizationInput, LinearProblemStatus, SETPOINT_CHANGE_TOLERANCE,
};
use crate::objective::ObjectiveValue;
use crate::perimeter::OptimizationPerimeter;
use crate::sensitivity::{SensitivityRequest, SensitivityResult};
use rao_core::{Network, NetworkAction, RangeAction, RangeActionKind, RemedialAction};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Forward-only lifecycle of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafStatus {
    NotEvaluated,
    Evaluated,
    Optimized,
    Error,
}

#[derive(Debug, Clone)]
struct Evaluation {
    sensitivity: SensitivityResult,
    objective: ObjectiveValue,
}

#[derive(Debug, Clone)]
struct Optimization {
    setpoints: RangeActionSetpoints,
    objective: ObjectiveValue,
    lp_status: Option<LinearProblemStatus>,
}

/// One node of the search tree: the network actions applied since the root
/// and their evaluation.
#[derive(Debug, Clone)]
pub struct Leaf {
    network_actions: Vec<Arc<NetworkAction>>,
    starting_setpoints: RangeActionSetpoints,
    remove_range_actions: bool,
    status: LeafStatus,
    evaluation: Option<Evaluation>,
    optimization: Option<Optimization>,
    error: Option<String>,
}

impl Leaf {
    pub fn root(starting_setpoints: RangeActionSetpoints) -> Self {
        Self {
            network_actions: Vec::new(),
            starting_setpoints,
            remove_range_actions: false,
            status: LeafStatus::NotEvaluated,
            evaluation: None,
            optimization: None,
            error: None,
        }
    }

    /// Leaf adding `combination` to `parent`.
    ///
    /// Range actions start from the parent's optimized setpoints, or from
    /// `pre_perimeter` when they must be removed.
    pub fn child(
        parent: &Leaf,
        combination: &NetworkActionCombination,
        remove_range_actions: bool,
        pre_perimeter: &RangeActionSetpoints,
    ) -> Self {
        let mut network_actions = parent.network_actions.clone();
        network_actions.extend(combination.actions().iter().cloned());
        Self {
            network_actions,
            starting_setpoints: if remove_range_actions {
                pre_perimeter.clone()
            } else {
                parent.setpoints().clone()
            },
            remove_range_actions,
            status: LeafStatus::NotEvaluated,
            evaluation: None,
            optimization: None,
            error: None,
        }
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    pub fn is_root(&self) -> bool {
        self.network_actions.is_empty()
    }

    pub fn network_actions(&self) -> &[Arc<NetworkAction>] {
        &self.network_actions
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn lp_status(&self) -> Option<LinearProblemStatus> {
        self.optimization.as_ref().and_then(|o| o.lp_status)
    }

    /// Optimized setpoints, or the starting ones before optimization.
    pub fn setpoints(&self) -> &RangeActionSetpoints {
        self.optimization
            .as_ref()
            .map_or(&self.starting_setpoints, |o| &o.setpoints)
    }

    pub fn objective(&self) -> Option<&ObjectiveValue> {
        match (&self.optimization, &self.evaluation) {
            (Some(o), _) => Some(&o.objective),
            (None, Some(e)) => Some(&e.objective),
            _ => None,
        }
    }

    /// Total cost; `None` until evaluated and for errored leaves.
    pub fn cost(&self) -> Option<f64> {
        self.objective().map(ObjectiveValue::cost)
    }

    pub fn virtual_cost(&self) -> Option<f64> {
        self.objective().map(ObjectiveValue::virtual_cost)
    }

    /// Sorted ids of the applied network actions, joined.
    pub fn concatenated_id(&self) -> String {
        let mut ids: Vec<&str> = self.network_actions.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        ids.join(" + ")
    }

    /// Range actions of the main state moved away from their pre-perimeter setpoint.
    pub fn activated_range_actions(
        &self,
        perimeter: &OptimizationPerimeter,
        pre_perimeter: &BTreeMap<String, f64>,
    ) -> Vec<Arc<RangeAction>> {
        let state = perimeter.main_state();
        perimeter
            .range_actions_for(state)
            .iter()
            .filter(|ra| {
                let current = self.setpoints().get(state, &ra.id);
                let previous = pre_perimeter.get(&ra.id);
                matches!((current, previous), (Some(c), Some(p)) if (c - p).abs() >= SETPOINT_CHANGE_TOLERANCE)
            })
            .cloned()
            .collect()
    }

    /// PST taps moved in the main state, per operator.
    pub fn moved_taps(
        &self,
        perimeter: &OptimizationPerimeter,
        pre_perimeter: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, usize> {
        let state = perimeter.main_state();
        let mut moved = BTreeMap::new();
        for ra in self.activated_range_actions(perimeter, pre_perimeter) {
            if ra.kind != RangeActionKind::PstTap {
                continue;
            }
            let (Some(operator), Some(current), Some(previous)) = (
                ra.operator(),
                self.setpoints().get(state, &ra.id),
                pre_perimeter.get(&ra.id),
            ) else {
                continue;
            };
            let taps = (current - previous).abs().round() as usize;
            *moved.entry(operator.to_string()).or_default() += taps;
        }
        moved
    }

    /// Apply the leaf's network actions and starting setpoints to `network`
    /// and compute its sensitivities.
    ///
    /// A leaf is evaluated at most once; later calls do nothing.
    pub fn evaluate(&mut self, input: &SearchTreeInput<'_>, network: &mut Network) {
        if self.status != LeafStatus::NotEvaluated {
            debug!(leaf = %self, status = ?self.status, "leaf already evaluated");
            return;
        }
        match self.compute_evaluation(input, network) {
            Ok(evaluation) => {
                debug!(leaf = %self, cost = evaluation.objective.cost(), "leaf evaluated");
                self.evaluation = Some(evaluation);
                self.status = LeafStatus::Evaluated;
            }
            Err(e) => {
                warn!(leaf = %self, error = %e, "leaf evaluation failed");
                self.error = Some(e.to_string());
                self.status = LeafStatus::Error;
            }
        }
    }

    fn overlay(
        &self,
        input: &SearchTreeInput<'_>,
        network: &mut Network,
    ) -> Result<AppliedRemedialActions, EvaluationError> {
        let mut applied = AppliedRemedialActions::new();
        applied.extend(input.applied);
        apply_setpoints(input.perimeter, &self.starting_setpoints, network, &mut applied)?;
        Ok(applied)
    }

    fn compute_evaluation(
        &self,
        input: &SearchTreeInput<'_>,
        network: &mut Network,
    ) -> Result<Evaluation, EvaluationError> {
        for action in &self.network_actions {
            network.apply_network_action(action)?;
        }
        let applied = self.overlay(input, network)?;
        let range_actions = input.perimeter.range_actions();
        let sensitivity = input.provider.compute(&SensitivityRequest {
            network,
            cnecs: input.perimeter.cnecs(),
            range_actions: &range_actions,
            applied: &applied,
        })?;
        if sensitivity.is_failure() {
            return Err(EvaluationError::SensitivityFailure(format!(
                "{} state(s) did not converge",
                sensitivity.failed_states.len()
            )));
        }
        let objective = input.objective.evaluate(&sensitivity);
        Ok(Evaluation {
            sensitivity,
            objective,
        })
    }

    /// Optimize range actions on the evaluated `network`.
    ///
    /// Without range actions the leaf stays evaluated. A leaf removing range
    /// actions keeps its starting setpoints.
    pub fn optimize(&mut self, input: &SearchTreeInput<'_>, network: &mut Network) {
        if self.status != LeafStatus::Evaluated {
            return;
        }
        if !input.perimeter.has_range_actions() {
            debug!(leaf = %self, "no range action to optimize");
            return;
        }
        let Some(evaluation) = self.evaluation.as_ref() else {
            return;
        };
        if self.remove_range_actions {
            self.optimization = Some(Optimization {
                setpoints: self.starting_setpoints.clone(),
                objective: evaluation.objective.clone(),
                lp_status: None,
            });
            self.status = LeafStatus::Optimized;
            return;
        }

        let result = self.overlay(input, network).and_then(|applied| {
            input.optimizer.optimize(&LinearOptimizationInput {
                perimeter: input.perimeter,
                network,
                applied: &applied,
                pre_perimeter_setpoints: input.pre_perimeter.setpoints(),
                starting_setpoints: &self.starting_setpoints,
                sensitivity: &evaluation.sensitivity,
                objective: input.objective,
                provider: input.provider,
                ra_range_shrinking: input.tree_parameters.ra_range_shrinking,
                usage_limits: &input.params.ra_usage_limits,
                activated_network_actions: &self.network_actions,
            })
        });
        match result {
            Ok(result) => {
                debug!(
                    leaf = %self,
                    status = ?result.status,
                    iterations = result.iterations,
                    cost = result.objective.cost(),
                    "range actions optimized"
                );
                self.optimization = Some(Optimization {
                    setpoints: result.setpoints,
                    objective: result.objective,
                    lp_status: Some(result.status),
                });
                self.status = LeafStatus::Optimized;
            }
            Err(e) => {
                warn!(leaf = %self, error = %e, "range action optimization failed");
                self.evaluation = None;
                self.error = Some(e.to_string());
                self.status = LeafStatus::Error;
            }
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "Root leaf")
        } else {
            let ids: Vec<&str> = self.network_actions.iter().map(|a| a.id.as_str()).collect();
            write!(f, "network action(s): {}", ids.join(", "))
        }
    }
}
