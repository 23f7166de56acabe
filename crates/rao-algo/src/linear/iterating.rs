//! Successive linearization of the range-action problem.

use super::problem::LinearProblem;
use super::{
    apply_setpoints, LinearOptimizationInput, LinearOptimizationResult, LinearOptimizer,
    LinearProblemStatus, SETPOINT_CHANGE_TOLERANCE,
};
use crate::applied::{AppliedRemedialActions, RangeActionSetpoints};
use crate::error::EvaluationError;
use crate::objective::ObjectiveValue;
use crate::parameters::RangeActionsParameters;
use crate::perimeter::OptimizationPerimeter;
use crate::sensitivity::{SensitivityRequest, SensitivityResult};
use rao_core::{NetworkAction, RangeActionKind, RemedialAction, State};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Solves the linear problem, re-runs the sensitivity computation at the new
/// setpoints and repeats until setpoints stop moving.
#[derive(Debug, Clone, Default)]
pub struct IteratingLinearOptimizer {
    params: RangeActionsParameters,
}

impl IteratingLinearOptimizer {
    pub fn new(params: RangeActionsParameters) -> Self {
        Self { params }
    }

    fn evaluate(
        &self,
        input: &LinearOptimizationInput<'_>,
        setpoints: &RangeActionSetpoints,
    ) -> Result<SensitivityResult, EvaluationError> {
        let mut network = input.network.clone();
        let mut applied = AppliedRemedialActions::new();
        applied.extend(input.applied);
        apply_setpoints(input.perimeter, setpoints, &mut network, &mut applied)?;
        let range_actions = input.perimeter.range_actions();
        input.provider.compute(&SensitivityRequest {
            network: &network,
            cnecs: input.perimeter.cnecs(),
            range_actions: &range_actions,
            applied: &applied,
        })
    }
}

struct Iterate {
    setpoints: RangeActionSetpoints,
    sensitivity: SensitivityResult,
    objective: ObjectiveValue,
}

impl LinearOptimizer for IteratingLinearOptimizer {
    fn id(&self) -> &str {
        "iterating-max-min-margin"
    }

    fn optimize(
        &self,
        input: &LinearOptimizationInput<'_>,
    ) -> Result<LinearOptimizationResult, EvaluationError> {
        let mut best = Iterate {
            setpoints: input.starting_setpoints.clone(),
            sensitivity: input.sensitivity.clone(),
            objective: input.objective.evaluate(input.sensitivity),
        };
        let mut current_setpoints = best.setpoints.clone();
        let mut current_sensitivity = best.sensitivity.clone();
        let mut status = LinearProblemStatus::MaxIterationReached;
        let mut iterations = 0;

        for iteration in 0..self.params.max_mip_iterations {
            iterations = iteration + 1;
            let problem = LinearProblem {
                perimeter: input.perimeter,
                network: input.network,
                pre_perimeter_setpoints: input.pre_perimeter_setpoints,
                reference: &current_setpoints,
                sensitivity: &current_sensitivity,
                objective: input.objective,
                params: &self.params,
            };
            let solved = match problem.solve(iteration, input.ra_range_shrinking) {
                Ok(setpoints) => setpoints,
                Err(EvaluationError::Infeasible(reason)) => {
                    debug!(iteration, %reason, "linear problem infeasible");
                    status = if iteration == 0 {
                        LinearProblemStatus::Infeasible
                    } else {
                        LinearProblemStatus::Feasible
                    };
                    break;
                }
                Err(e) => return Err(e),
            };
            let setpoints = enforce_usage_limits(input, solved);

            if setpoints.max_difference(&current_setpoints) < SETPOINT_CHANGE_TOLERANCE {
                status = LinearProblemStatus::Optimal;
                break;
            }

            let sensitivity = self.evaluate(input, &setpoints)?;
            if sensitivity.is_failure() {
                warn!(iteration, "sensitivity computation failed on optimized setpoints");
                status = LinearProblemStatus::SensitivityComputationFailed;
                break;
            }
            let objective = input.objective.evaluate(&sensitivity);
            debug!(
                iteration,
                cost = objective.cost(),
                best = best.objective.cost(),
                "linear optimization iteration"
            );

            if objective.cost() < best.objective.cost() {
                best = Iterate {
                    setpoints: setpoints.clone(),
                    sensitivity: sensitivity.clone(),
                    objective,
                };
            } else if !input.ra_range_shrinking {
                status = LinearProblemStatus::Feasible;
                break;
            }
            current_setpoints = setpoints;
            current_sensitivity = sensitivity;
        }

        Ok(LinearOptimizationResult {
            status,
            setpoints: best.setpoints,
            sensitivity: best.sensitivity,
            objective: best.objective,
            iterations,
        })
    }
}

/// Moved range actions (or aligned groups) of one state, moved as a unit.
struct Move {
    key: String,
    members: Vec<String>,
    operator: Option<String>,
    is_pst: bool,
    variation: f64,
}

/// Reset the smallest moves until the usage limits of each state hold.
///
/// Network actions of the leaf count for the main state. Moves are kept
/// by decreasing absolute variation.
fn enforce_usage_limits(
    input: &LinearOptimizationInput<'_>,
    mut setpoints: RangeActionSetpoints,
) -> RangeActionSetpoints {
    let perimeter = input.perimeter;
    for (state, range_actions) in perimeter.range_actions_per_state() {
        let Some(limits) = input.usage_limits.get(&state.instant()) else {
            continue;
        };
        let network_actions: &[Arc<NetworkAction>] = if state == perimeter.main_state() {
            input.activated_network_actions
        } else {
            &[]
        };

        let mut moves: BTreeMap<String, Move> = BTreeMap::new();
        for ra in range_actions {
            let Some(value) = setpoints.get(state, &ra.id) else {
                continue;
            };
            let previous = input
                .pre_perimeter_setpoints
                .get(&ra.id)
                .copied()
                .unwrap_or(value);
            let variation = (value - previous).abs();
            if variation < SETPOINT_CHANGE_TOLERANCE {
                continue;
            }
            let key = ra.group_id.clone().unwrap_or_else(|| ra.id.clone());
            let entry = moves.entry(key.clone()).or_insert_with(|| Move {
                key,
                members: Vec::new(),
                operator: ra.operator.clone(),
                is_pst: ra.kind == RangeActionKind::PstTap,
                variation: 0.0,
            });
            entry.members.push(ra.id.clone());
            entry.variation = entry.variation.max(variation);
        }
        if moves.is_empty() {
            continue;
        }

        let mut ordered: Vec<Move> = moves.into_values().collect();
        ordered.sort_by(|a, b| b.variation.total_cmp(&a.variation).then_with(|| a.key.cmp(&b.key)));

        let mut total = network_actions.len();
        let mut per_operator: BTreeMap<String, usize> = BTreeMap::new();
        let mut psts_per_operator: BTreeMap<String, usize> = BTreeMap::new();
        let mut operators: BTreeSet<String> = BTreeSet::new();
        for na in network_actions {
            if let Some(op) = na.operator() {
                *per_operator.entry(op.to_string()).or_default() += 1;
                operators.insert(op.to_string());
            }
        }

        for m in ordered {
            let count = m.members.len();
            let mut allowed = total + count <= limits.max_ra();
            if let Some(op) = m.operator.as_deref() {
                let used = per_operator.get(op).copied().unwrap_or(0);
                allowed &= used + count <= limits.max_ra_for(op);
                if m.is_pst {
                    let used = psts_per_operator.get(op).copied().unwrap_or(0);
                    allowed &= used + count <= limits.max_pst_for(op);
                }
                if !operators.contains(op) {
                    allowed &= operators.len() < limits.max_tso();
                }
            }
            if allowed {
                total += count;
                if let Some(op) = m.operator {
                    *per_operator.entry(op.clone()).or_default() += count;
                    if m.is_pst {
                        *psts_per_operator.entry(op.clone()).or_default() += count;
                    }
                    operators.insert(op);
                }
            } else {
                debug!(state = %state, range_action = %m.key, "range action move exceeds usage limits, reset");
                reset(&mut setpoints, perimeter, state, &m.members, input);
            }
        }
    }
    setpoints
}

fn reset(
    setpoints: &mut RangeActionSetpoints,
    perimeter: &OptimizationPerimeter,
    state: &State,
    members: &[String],
    input: &LinearOptimizationInput<'_>,
) {
    for ra in perimeter.range_actions_for(state) {
        if !members.contains(&ra.id) {
            continue;
        }
        if let Some(previous) = input.pre_perimeter_setpoints.get(&ra.id) {
            setpoints.set(state, ra.id.clone(), *previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::setpoints_from_network;
    use crate::objective::ObjectiveFunction;
    use crate::parameters::{RaUsageLimits, RaoParameters};
    use crate::perimeter::{PerimeterBuilder, PrePerimeterResult};
    use crate::sensitivity::{LinearSensitivityProvider, SensitivityModel, SensitivityProvider};
    use rao_core::{
        Bus, Cnec, Crac, Edge, ElementId, Instant, Network, Pst, RangeAction, SetpointRange,
        UsageMethod, UsageRule,
    };

    fn network() -> Network {
        let mut n = Network::new();
        n.add_bus(Bus::new("a", Some("FR"))).unwrap();
        n.add_bus(Bus::new("b", Some("FR"))).unwrap();
        for id in ["pst-1", "pst-2"] {
            n.add_edge(Edge::Pst(Pst {
                id: ElementId::new(id),
                from_bus: ElementId::new("a"),
                to_bus: ElementId::new("b"),
                tap: 0,
                low_tap: -16,
                high_tap: 16,
                connected: true,
            }))
            .unwrap();
        }
        n
    }

    fn pst(id: &str, element: &str, operator: &str) -> RangeAction {
        RangeAction::new(id, RangeActionKind::PstTap, ElementId::new(element), 0.0)
            .with_range(SetpointRange::absolute(-16.0, 16.0))
            .with_operator(operator)
            .with_usage_rule(UsageRule::OnInstant {
                instant: Instant::Preventive,
                usage_method: UsageMethod::Available,
            })
    }

    struct Fixture {
        network: Network,
        crac: Crac,
        provider: LinearSensitivityProvider,
    }

    fn fixture() -> Fixture {
        let network = network();
        let crac = Crac::new("iterating")
            .with_cnec(Cnec::flow("c1", ElementId::new("pst-1"), State::preventive(), 100.0))
            .with_cnec(Cnec::flow("c2", ElementId::new("pst-2"), State::preventive(), 100.0))
            .with_range_action(pst("ra-1", "pst-1", "RTE"))
            .with_range_action(pst("ra-2", "pst-2", "ELIA"));
        let model = SensitivityModel {
            reference_flows: BTreeMap::from([("c1".into(), 130.0), ("c2".into(), 120.0)]),
            setpoint_sensitivities: BTreeMap::from([
                ("c1".into(), BTreeMap::from([(ElementId::new("pst-1"), -10.0)])),
                ("c2".into(), BTreeMap::from([(ElementId::new("pst-2"), -10.0)])),
            ]),
            ..SensitivityModel::default()
        };
        let provider = LinearSensitivityProvider::new(model, &network, &[]).unwrap();
        Fixture {
            network,
            crac,
            provider,
        }
    }

    fn run(f: &Fixture, params: &RaoParameters) -> LinearOptimizationResult {
        let applied = AppliedRemedialActions::new();
        let initial = f
            .provider
            .compute(&SensitivityRequest {
                network: &f.network,
                cnecs: &f.crac.cnecs,
                range_actions: &f.crac.range_actions.iter().cloned().map(Arc::new).collect::<Vec<_>>(),
                applied: &applied,
            })
            .unwrap();
        let prior = PrePerimeterResult::from_network(&f.crac, &f.network, initial);
        let perimeter = PerimeterBuilder::new(&f.crac, &f.network, &prior, params)
            .preventive(&BTreeSet::from([State::preventive()]))
            .unwrap();
        let objective = ObjectiveFunction::new(perimeter.cnecs(), prior.sensitivity(), &params.virtual_costs);
        let starting = setpoints_from_network(&perimeter, &f.network).unwrap();
        let optimizer = IteratingLinearOptimizer::new(params.range_actions.clone());
        optimizer
            .optimize(&LinearOptimizationInput {
                perimeter: &perimeter,
                network: &f.network,
                applied: &applied,
                pre_perimeter_setpoints: prior.setpoints(),
                starting_setpoints: &starting,
                sensitivity: prior.sensitivity(),
                objective: &objective,
                provider: &f.provider,
                ra_range_shrinking: false,
                usage_limits: &params.ra_usage_limits,
                activated_network_actions: &[],
            })
            .unwrap()
    }

    #[test]
    fn test_converges_on_exact_linear_model() {
        let f = fixture();
        let result = run(&f, &RaoParameters::default());
        assert_eq!(result.status, LinearProblemStatus::Optimal);
        assert_eq!(result.setpoints.get(&State::preventive(), "ra-1"), Some(13.0));
        assert_eq!(result.setpoints.get(&State::preventive(), "ra-2"), Some(12.0));
        assert!(result.objective.cost() < 0.0);
        assert_eq!(result.iterations, 2);
    }

    #[test]
    fn test_max_ra_keeps_largest_move() {
        let f = fixture();
        let mut params = RaoParameters::default();
        params.ra_usage_limits.insert(
            Instant::Preventive,
            RaUsageLimits {
                max_ra: Some(1),
                ..RaUsageLimits::default()
            },
        );
        let result = run(&f, &params);
        assert_eq!(result.setpoints.get(&State::preventive(), "ra-1"), Some(13.0));
        assert_eq!(result.setpoints.get(&State::preventive(), "ra-2"), Some(0.0));
    }
}
