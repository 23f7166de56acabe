//! Run-level sequencing of the perimeters.
//!
//! # Pipeline
//!
//! 1. Sensitivity of the initial situation over every Cnec. A failure ends
//!    the run with [`RunStatus::Failure`] and no action.
//! 2. Preventive perimeter over the basecase scenario.
//! 3. Contingency scenarios, each on its own network clone: the auto
//!    perimeter (forced network actions) then every curative perimeter in
//!    chronological order. Independent scenarios run in parallel.
//! 4. Optional second preventive optimization on a global perimeter,
//!    seeded with the first preventive network actions.
//! 5. Evaluation of the whole solution. A solution worse than the initial
//!    situation is discarded.
//!
//! Stages only read the result of the previous stage; nothing is written
//! back.

use crate::applied::AppliedRemedialActions;
use crate::budget::RunBudget;
use crate::linear::{apply_setpoints, LinearOptimizer, LinearProblemStatus};
use crate::objective::{ObjectiveFunction, ObjectiveValue};
use crate::parameters::{OptimizationGoal, RaoParameters, SecondPreventiveCondition, TreeParameters};
use crate::perimeter::{OptimizationPerimeter, PerimeterBuilder, PerimeterKind, PrePerimeterResult};
use crate::search_tree::{
    run_search_tree, Leaf, LeafStatus, NetworkActionCombination, SearchTreeInput, SearchTreeResult,
};
use crate::sensitivity::{ComputationStatus, SensitivityProvider, SensitivityRequest, SensitivityResult};
use crate::state_tree::{ContingencyScenario, StateTree};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rao_core::{Cnec, Crac, Network, RangeAction, RaoResult, State};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// A final cost above the initial one by more than this is a regression.
pub const COST_INCREASE_TOLERANCE: f64 = 1e-6;

/// Number of most limiting elements reported per perimeter.
const REPORTED_LIMITING_ELEMENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every optimized Cnec is within its limits
    Secure,
    Unsecure,
    /// Some state's sensitivity computation failed
    Degraded,
    /// The initial situation could not be computed
    Failure,
}

/// Selected leaf of one perimeter.
#[derive(Debug, Clone, Serialize)]
pub struct PerimeterOutcome {
    pub state: String,
    pub kind: PerimeterKind,
    pub leaf_status: LeafStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lp_status: Option<LinearProblemStatus>,
    pub network_actions: Vec<String>,
    /// Range actions moved in the perimeter's state, by id
    pub range_action_setpoints: BTreeMap<String, f64>,
    pub cost: Option<f64>,
    pub functional_cost: Option<f64>,
    pub virtual_costs: BTreeMap<String, f64>,
    pub most_limiting_elements: Vec<String>,
    pub search_depth: usize,
    pub evaluated_leaves: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PerimeterOutcome {
    fn new(
        perimeter: &OptimizationPerimeter,
        result: &SearchTreeResult,
        pre_perimeter_setpoints: &BTreeMap<String, f64>,
    ) -> Self {
        let leaf = &result.best_leaf;
        let state = perimeter.main_state();
        let objective = leaf.objective();
        Self {
            state: state.id(),
            kind: perimeter.kind(),
            leaf_status: leaf.status(),
            lp_status: leaf.lp_status(),
            network_actions: leaf.network_actions().iter().map(|na| na.id.clone()).collect(),
            range_action_setpoints: leaf
                .activated_range_actions(perimeter, pre_perimeter_setpoints)
                .iter()
                .filter_map(|ra| leaf.setpoints().get(state, &ra.id).map(|v| (ra.id.clone(), v)))
                .collect(),
            cost: leaf.cost(),
            functional_cost: objective.map(|o| o.functional_cost),
            virtual_costs: objective.map(|o| o.virtual_costs.clone()).unwrap_or_default(),
            most_limiting_elements: objective
                .map(|o| {
                    o.most_limiting_elements(REPORTED_LIMITING_ELEMENTS)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            search_depth: result.depth,
            evaluated_leaves: result.evaluated_leaves,
            error: leaf.error().map(str::to_string),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.cost.is_some_and(|c| c <= 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SecondPreventiveReport {
    pub run: bool,
    /// Whether its solution replaced the first one
    pub kept: bool,
}

/// Result of a whole optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct RaoOutcome {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub initial_cost: Option<f64>,
    pub final_cost: Option<f64>,
    pub final_min_margin: Option<f64>,
    /// Preventive first, then contingency scenarios in Crac order
    pub perimeters: Vec<PerimeterOutcome>,
    pub second_preventive: SecondPreventiveReport,
    /// Actions were discarded because they degraded the initial situation
    pub fell_back_to_initial_situation: bool,
    pub failed_states: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RaoOutcome {
    fn failure(started_at: DateTime<Utc>, failed_states: Vec<String>, message: String) -> Self {
        Self {
            status: RunStatus::Failure,
            started_at,
            finished_at: Utc::now(),
            initial_cost: None,
            final_cost: None,
            final_min_margin: None,
            perimeters: Vec::new(),
            second_preventive: SecondPreventiveReport::default(),
            fell_back_to_initial_situation: false,
            failed_states,
            message: Some(message),
        }
    }

    pub fn perimeter(&self, state_id: &str) -> Option<&PerimeterOutcome> {
        self.perimeters.iter().find(|p| p.state == state_id)
    }

    /// Ids of the network actions activated over all perimeters, by state id.
    pub fn activated_network_actions(&self) -> BTreeMap<&str, &[String]> {
        self.perimeters
            .iter()
            .filter(|p| !p.network_actions.is_empty())
            .map(|p| (p.state.as_str(), p.network_actions.as_slice()))
            .collect()
    }
}

/// Optimize the remedial actions of `crac` on `network`.
///
/// Inconsistent parameters or Crac, and an exhausted run budget, are errors.
/// Every other problem is reported in the outcome's status.
pub fn run_rao(
    crac: &Crac,
    network: &Network,
    params: &RaoParameters,
    provider: &dyn SensitivityProvider,
    optimizer: &dyn LinearOptimizer,
) -> RaoResult<RaoOutcome> {
    params.validate()?;
    crac.ensure_valid(Some(network))?;
    let started_at = Utc::now();
    let budget = RunBudget::from_seconds(params.max_run_duration_seconds);
    info!(
        crac = %crac.id,
        provider = provider.id(),
        optimizer = optimizer.id(),
        cnecs = crac.cnecs.len(),
        network_actions = crac.network_actions.len(),
        range_actions = crac.range_actions.len(),
        "starting remedial action optimization"
    );

    let range_actions: Vec<Arc<RangeAction>> =
        crac.range_actions.iter().cloned().map(Arc::new).collect();
    let initial = compute_sensitivity(
        provider,
        network,
        &crac.cnecs,
        &range_actions,
        &AppliedRemedialActions::new(),
    );
    if initial.is_failure() {
        warn!(failed_states = initial.failed_states.len(), "initial sensitivity computation failed");
        return Ok(RaoOutcome::failure(
            started_at,
            state_ids(&initial.failed_states),
            "initial sensitivity computation failed".to_string(),
        ));
    }

    let rao = Rao {
        crac,
        network,
        params,
        provider,
        optimizer,
        budget,
        state_tree: StateTree::build(crac),
        global_objective: ObjectiveFunction::new(&crac.cnecs, &initial, &params.virtual_costs),
        initial_prior: PrePerimeterResult::from_network(crac, network, initial.clone()),
        initial,
        range_actions,
    };
    rao.run(started_at)
}

/// Network state reached by a set of decisions.
#[derive(Debug, Clone)]
struct Solution {
    /// Network with the preventive actions applied
    network: Network,
    /// Auto and curative actions
    applied: AppliedRemedialActions,
}

#[derive(Debug, Clone, Default)]
struct ScenarioOutcome {
    perimeters: Vec<PerimeterOutcome>,
    applied: AppliedRemedialActions,
    /// Network actions only, seed of the second preventive optimization
    network_actions: AppliedRemedialActions,
}

struct Rao<'a> {
    crac: &'a Crac,
    network: &'a Network,
    params: &'a RaoParameters,
    provider: &'a dyn SensitivityProvider,
    optimizer: &'a dyn LinearOptimizer,
    budget: RunBudget,
    state_tree: StateTree,
    global_objective: ObjectiveFunction,
    initial: SensitivityResult,
    initial_prior: PrePerimeterResult,
    range_actions: Vec<Arc<RangeAction>>,
}

impl Rao<'_> {
    fn run(&self, started_at: DateTime<Utc>) -> RaoResult<RaoOutcome> {
        let initial_value = self.global_objective.evaluate(&self.initial);
        info!(cost = initial_value.cost(), "initial situation evaluated");

        self.budget.check()?;
        let basecase_states = self.state_tree.basecase_scenario().all_states();
        let preventive_perimeter =
            PerimeterBuilder::new(self.crac, self.network, &self.initial_prior, self.params)
                .preventive(&basecase_states)?;
        let preventive = self.optimize_perimeter(
            &preventive_perimeter,
            self.network,
            &AppliedRemedialActions::new(),
            &self.initial_prior,
            &TreeParameters::preventive(self.params),
            &[],
        )?;
        let mut first_pass = Solution {
            network: self.network.clone(),
            applied: AppliedRemedialActions::new(),
        };
        apply_leaf(
            &preventive_perimeter,
            &preventive.best_leaf,
            &mut first_pass.network,
            &mut first_pass.applied,
        )?;
        let mut perimeters = vec![PerimeterOutcome::new(
            &preventive_perimeter,
            &preventive,
            self.initial_prior.setpoints(),
        )];

        let mut scenarios = Vec::new();
        if self.state_tree.contingency_scenarios().is_empty() {
            info!("no contingency scenario to optimize");
        } else if self.skip_contingency_scenarios(&preventive.best_leaf) {
            info!("preventive perimeter is unsecure, contingency scenarios are not optimized");
        } else {
            let post_preventive = compute_sensitivity(
                self.provider,
                &first_pass.network,
                &self.crac.cnecs,
                &self.range_actions,
                &AppliedRemedialActions::new(),
            );
            if post_preventive.is_failure() {
                warn!("post-preventive sensitivity computation failed, contingency scenarios are not optimized");
            } else {
                let prior =
                    PrePerimeterResult::from_network(self.crac, &first_pass.network, post_preventive);
                scenarios = self.optimize_contingency_scenarios(&first_pass.network, &prior)?;
            }
        }
        for scenario in &scenarios {
            first_pass.applied.extend(&scenario.applied);
            perimeters.extend(scenario.perimeters.iter().cloned());
        }

        let (mut final_sensitivity, mut final_value) = self.evaluate(&first_pass);
        info!(cost = final_value.cost(), "first optimization pass evaluated");

        let mut second_preventive = SecondPreventiveReport::default();
        if self.should_run_second_preventive(&scenarios, &perimeters, &initial_value, &final_value) {
            second_preventive.run = true;
            let (perimeter, result, solution) =
                self.run_second_preventive(&preventive.best_leaf, &scenarios)?;
            let (sensitivity, value) = self.evaluate(&solution);
            info!(
                first_cost = final_value.cost(),
                second_cost = value.cost(),
                "second preventive optimization evaluated"
            );
            if value.cost() <= final_value.cost() {
                second_preventive.kept = true;
                update_with_global_leaf(
                    &mut perimeters,
                    &perimeter,
                    &result,
                    self.initial_prior.setpoints(),
                );
                final_sensitivity = sensitivity;
                final_value = value;
            } else {
                info!("second preventive optimization did not improve the solution, discarded");
            }
        }

        let mut fell_back = false;
        let mut message = None;
        if final_value.cost() > initial_value.cost() + COST_INCREASE_TOLERANCE {
            warn!(
                initial_cost = initial_value.cost(),
                final_cost = final_value.cost(),
                "optimization degraded the initial situation, remedial actions discarded"
            );
            fell_back = true;
            message = Some("remedial actions degraded the initial situation".to_string());
            perimeters.clear();
            final_sensitivity = self.initial.clone();
            final_value = initial_value.clone();
        }

        let status = run_status(&final_sensitivity, &final_value, &perimeters);
        info!(?status, cost = final_value.cost(), "remedial action optimization finished");
        Ok(RaoOutcome {
            status,
            started_at,
            finished_at: Utc::now(),
            initial_cost: Some(initial_value.cost()),
            final_cost: Some(final_value.cost()),
            final_min_margin: final_value.min_margin(),
            perimeters,
            second_preventive,
            fell_back_to_initial_situation: fell_back,
            failed_states: state_ids(&final_sensitivity.failed_states),
            message,
        })
    }

    fn optimize_perimeter(
        &self,
        perimeter: &OptimizationPerimeter,
        network: &Network,
        applied: &AppliedRemedialActions,
        prior: &PrePerimeterResult,
        tree_parameters: &TreeParameters,
        hints: &[NetworkActionCombination],
    ) -> RaoResult<SearchTreeResult> {
        info!(
            state = %perimeter.main_state(),
            kind = ?perimeter.kind(),
            cnecs = perimeter.cnecs().len(),
            network_actions = perimeter.network_actions().len(),
            range_actions = perimeter.range_actions().len(),
            "optimizing perimeter"
        );
        let objective =
            ObjectiveFunction::new(perimeter.cnecs(), &self.initial, &self.params.virtual_costs);
        run_search_tree(&SearchTreeInput {
            perimeter,
            network,
            applied,
            pre_perimeter: prior,
            objective: &objective,
            provider: self.provider,
            optimizer: self.optimizer,
            params: self.params,
            tree_parameters,
            hints,
            budget: Some(self.budget),
        })
    }

    fn skip_contingency_scenarios(&self, preventive_leaf: &Leaf) -> bool {
        let objective = &self.params.objective;
        objective.preventive_stop_criterion == OptimizationGoal::Secure
            && !objective.optimize_curative_if_preventive_unsecure
            && preventive_leaf.cost().map_or(true, |c| c > 0.0)
    }

    fn optimize_contingency_scenarios(
        &self,
        network: &Network,
        prior: &PrePerimeterResult,
    ) -> RaoResult<Vec<ScenarioOutcome>> {
        let threads = self.params.multithreading.contingency_scenarios_in_parallel.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("building Rayon thread pool for contingency scenarios")?;
        info!(
            scenarios = self.state_tree.contingency_scenarios().len(),
            threads,
            "optimizing contingency scenarios"
        );
        pool.install(|| {
            self.state_tree
                .contingency_scenarios()
                .par_iter()
                .map(|scenario| self.optimize_scenario(scenario, network, prior))
                .collect()
        })
    }

    fn optimize_scenario(
        &self,
        scenario: &ContingencyScenario,
        preventive_network: &Network,
        prior: &PrePerimeterResult,
    ) -> RaoResult<ScenarioOutcome> {
        let contingency = scenario.contingency();
        let mut network = preventive_network.clone();
        network.apply_contingency(contingency)?;
        let mut outcome = ScenarioOutcome::default();
        let mut prior = prior.clone();
        let none = AppliedRemedialActions::new();

        if let Some(state) = scenario.auto_state() {
            self.budget.check()?;
            let perimeter =
                PerimeterBuilder::new(self.crac, &network, &prior, self.params).auto(state)?;
            let result = self.optimize_perimeter(
                &perimeter,
                &network,
                &none,
                &prior,
                &TreeParameters::auto(self.params),
                &[],
            )?;
            self.record(&perimeter, &result, &prior, &mut network, &mut outcome)?;
            if !result.best_leaf.network_actions().is_empty() {
                prior = self.scenario_prior(scenario, &network);
            }
        }

        for state in scenario.curative_states() {
            self.budget.check()?;
            let perimeter =
                PerimeterBuilder::new(self.crac, &network, &prior, self.params).curative(state)?;
            let result = self.optimize_perimeter(
                &perimeter,
                &network,
                &none,
                &prior,
                &TreeParameters::curative(self.params),
                &[],
            )?;
            self.record(&perimeter, &result, &prior, &mut network, &mut outcome)?;
            prior = self.scenario_prior(scenario, &network);
        }
        Ok(outcome)
    }

    fn record(
        &self,
        perimeter: &OptimizationPerimeter,
        result: &SearchTreeResult,
        prior: &PrePerimeterResult,
        network: &mut Network,
        outcome: &mut ScenarioOutcome,
    ) -> RaoResult<()> {
        let leaf = &result.best_leaf;
        apply_leaf(perimeter, leaf, network, &mut outcome.applied)?;
        for na in leaf.network_actions() {
            outcome
                .network_actions
                .add_network_action(perimeter.main_state(), na.clone());
        }
        outcome
            .perimeters
            .push(PerimeterOutcome::new(perimeter, result, prior.setpoints()));
        Ok(())
    }

    /// Pre-perimeter result of the next perimeter of `scenario`.
    fn scenario_prior(&self, scenario: &ContingencyScenario, network: &Network) -> PrePerimeterResult {
        let id = &scenario.contingency().id;
        let cnecs: Vec<Cnec> = self
            .crac
            .cnecs
            .iter()
            .filter(|c| c.state.contingency() == Some(id))
            .cloned()
            .collect();
        let sensitivity = compute_sensitivity(
            self.provider,
            network,
            &cnecs,
            &self.range_actions,
            &AppliedRemedialActions::new(),
        );
        PrePerimeterResult::from_network(self.crac, network, sensitivity)
    }

    fn should_run_second_preventive(
        &self,
        scenarios: &[ScenarioOutcome],
        perimeters: &[PerimeterOutcome],
        initial: &ObjectiveValue,
        first_pass: &ObjectiveValue,
    ) -> bool {
        if scenarios.is_empty() {
            return false;
        }
        let wanted = match self.params.second_preventive.execution_condition {
            SecondPreventiveCondition::Disabled => false,
            SecondPreventiveCondition::PossibleCurativeImprovement => perimeters
                .iter()
                .any(|p| p.kind == PerimeterKind::Curative && !p.is_secure()),
            SecondPreventiveCondition::CostIncrease => {
                first_pass.cost() > initial.cost() + COST_INCREASE_TOLERANCE
            }
        };
        if !wanted {
            return false;
        }
        // the second pass is expected to take about as long as the first one
        if self.budget.remaining() < self.budget.elapsed() {
            info!(
                remaining_seconds = self.budget.remaining().as_secs(),
                "not enough time left for a second preventive optimization"
            );
            return false;
        }
        true
    }

    fn run_second_preventive(
        &self,
        first_preventive: &Leaf,
        scenarios: &[ScenarioOutcome],
    ) -> RaoResult<(OptimizationPerimeter, SearchTreeResult, Solution)> {
        self.budget.check()?;
        let curative_states: BTreeSet<State> = self
            .state_tree
            .optimized_post_contingency_states()
            .into_iter()
            .filter(|s| s.instant().is_curative())
            .collect();
        let perimeter = PerimeterBuilder::new(self.crac, self.network, &self.initial_prior, self.params)
            .global(&self.state_tree.basecase_scenario().all_states(), &curative_states)?;

        let mut applied = AppliedRemedialActions::new();
        for scenario in scenarios {
            applied.extend(&scenario.network_actions);
        }
        let hints = if self.params.second_preventive.hint_from_first_preventive_rao
            && !first_preventive.network_actions().is_empty()
        {
            vec![NetworkActionCombination::new(first_preventive.network_actions().iter().cloned()).detected()]
        } else {
            Vec::new()
        };

        let result = self.optimize_perimeter(
            &perimeter,
            self.network,
            &applied,
            &self.initial_prior,
            &TreeParameters::second_preventive(self.params),
            &hints,
        )?;
        let mut solution = Solution {
            network: self.network.clone(),
            applied,
        };
        apply_leaf(&perimeter, &result.best_leaf, &mut solution.network, &mut solution.applied)?;
        Ok((perimeter, result, solution))
    }

    /// Sensitivity and cost of `solution` over every Cnec.
    fn evaluate(&self, solution: &Solution) -> (SensitivityResult, ObjectiveValue) {
        let sensitivity = compute_sensitivity(
            self.provider,
            &solution.network,
            &self.crac.cnecs,
            &self.range_actions,
            &solution.applied,
        );
        let value = self.global_objective.evaluate(&sensitivity);
        (sensitivity, value)
    }
}

/// Put the actions of `leaf` in effect.
///
/// Main-state actions go on `network`. Post-contingency ones are also
/// recorded in `applied`, together with the setpoints of other states.
fn apply_leaf(
    perimeter: &OptimizationPerimeter,
    leaf: &Leaf,
    network: &mut Network,
    applied: &mut AppliedRemedialActions,
) -> RaoResult<()> {
    let state = perimeter.main_state();
    for na in leaf.network_actions() {
        network.apply_network_action(na)?;
        applied.add_network_action(state, na.clone());
    }
    apply_setpoints(perimeter, leaf.setpoints(), network, applied)?;
    for ra in perimeter.range_actions_for(state) {
        if let Some(setpoint) = leaf.setpoints().get(state, &ra.id) {
            applied.add_range_action(state, ra.clone(), setpoint);
        }
    }
    Ok(())
}

/// Replace the preventive outcome by the global one, and the curative
/// setpoints by those it chose.
fn update_with_global_leaf(
    perimeters: &mut [PerimeterOutcome],
    perimeter: &OptimizationPerimeter,
    result: &SearchTreeResult,
    initial_setpoints: &BTreeMap<String, f64>,
) {
    let leaf = &result.best_leaf;
    for outcome in perimeters.iter_mut() {
        if outcome.kind == PerimeterKind::Preventive {
            *outcome = PerimeterOutcome::new(perimeter, result, initial_setpoints);
            continue;
        }
        let Some(state) = perimeter
            .range_actions_per_state()
            .keys()
            .find(|s| s.id() == outcome.state)
        else {
            continue;
        };
        outcome.range_action_setpoints = perimeter
            .range_actions_for(state)
            .iter()
            .filter_map(|ra| {
                let setpoint = leaf.setpoints().get(state, &ra.id)?;
                let initial = initial_setpoints.get(&ra.id)?;
                ((setpoint - initial).abs() >= crate::linear::SETPOINT_CHANGE_TOLERANCE)
                    .then(|| (ra.id.clone(), setpoint))
            })
            .collect();
    }
}

/// Sensitivity of `cnecs`; a provider error fails every requested state.
fn compute_sensitivity(
    provider: &dyn SensitivityProvider,
    network: &Network,
    cnecs: &[Cnec],
    range_actions: &[Arc<RangeAction>],
    applied: &AppliedRemedialActions,
) -> SensitivityResult {
    let request = SensitivityRequest {
        network,
        cnecs,
        range_actions,
        applied,
    };
    provider.compute(&request).unwrap_or_else(|e| {
        warn!(error = %e, "sensitivity computation failed");
        let failed_states: BTreeSet<State> = cnecs.iter().map(|c| c.state.clone()).collect();
        SensitivityResult {
            status: ComputationStatus::Failure,
            failed_states,
            ..SensitivityResult::default()
        }
    })
}

fn run_status(
    sensitivity: &SensitivityResult,
    value: &ObjectiveValue,
    perimeters: &[PerimeterOutcome],
) -> RunStatus {
    if !sensitivity.failed_states.is_empty()
        || perimeters.iter().any(|p| p.leaf_status == LeafStatus::Error)
    {
        RunStatus::Degraded
    } else if value.cost() <= 0.0 {
        RunStatus::Secure
    } else {
        RunStatus::Unsecure
    }
}

fn state_ids(states: &BTreeSet<State>) -> Vec<String> {
    states.iter().map(State::id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(functional: f64, virtual_cost: f64) -> ObjectiveValue {
        ObjectiveValue {
            functional_cost: functional,
            virtual_costs: BTreeMap::from([("mnec-violation".to_string(), virtual_cost)]),
            ..ObjectiveValue::default()
        }
    }

    #[test]
    fn test_run_status() {
        let ok = SensitivityResult::default();
        assert_eq!(run_status(&ok, &value(-10.0, 0.0), &[]), RunStatus::Secure);
        assert_eq!(run_status(&ok, &value(-10.0, 20.0), &[]), RunStatus::Unsecure);
        assert_eq!(run_status(&ok, &value(5.0, 0.0), &[]), RunStatus::Unsecure);

        let mut failed = SensitivityResult::default();
        failed.failed_states.insert(State::preventive());
        assert_eq!(run_status(&failed, &value(-10.0, 0.0), &[]), RunStatus::Degraded);
    }

    #[test]
    fn test_failure_outcome_has_no_action() {
        let outcome = RaoOutcome::failure(Utc::now(), vec!["preventive".into()], "boom".into());
        assert_eq!(outcome.status, RunStatus::Failure);
        assert!(outcome.perimeters.is_empty());
        assert!(outcome.activated_network_actions().is_empty());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["failed_states"][0], "preventive");
    }
}
