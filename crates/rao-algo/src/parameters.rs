//! Run parameters and the per-perimeter tree parameters derived from them.
//!
//! [`RaoParameters`] is the user-facing configuration, read from TOML by the
//! CLI. Every field has a default so that a partial file (or none at all) is a
//! valid configuration. [`TreeParameters`] is the small subset one search tree
//! needs, derived per perimeter kind.

use rao_core::{Instant, RaoError, RaoResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Goal of a perimeter optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationGoal {
    /// Keep improving the objective until the depth limit
    MinObjective,
    /// Stop as soon as every optimized Cnec is secure
    #[default]
    Secure,
}

/// When to run a second preventive optimization after the curative ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondPreventiveCondition {
    #[default]
    Disabled,
    /// Run when some curative perimeter is not secure
    PossibleCurativeImprovement,
    /// Run when some curative cost ended above the initial cost
    CostIncrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveParameters {
    #[serde(default)]
    pub preventive_stop_criterion: OptimizationGoal,
    #[serde(default)]
    pub curative_stop_criterion: OptimizationGoal,
    /// Optimize contingency scenarios even when the preventive perimeter stays unsecure
    #[serde(default)]
    pub optimize_curative_if_preventive_unsecure: bool,
}

impl Default for ObjectiveParameters {
    fn default() -> Self {
        Self {
            preventive_stop_criterion: OptimizationGoal::Secure,
            curative_stop_criterion: OptimizationGoal::Secure,
            optimize_curative_if_preventive_unsecure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopoOptimizationParameters {
    #[serde(default = "default_search_depth")]
    pub max_preventive_search_tree_depth: usize,
    #[serde(default = "default_search_depth")]
    pub max_auto_search_tree_depth: usize,
    #[serde(default = "default_search_depth")]
    pub max_curative_search_tree_depth: usize,
    /// Network action ids worth trying together, as one candidate
    #[serde(default)]
    pub predefined_combinations: Vec<Vec<String>>,
    #[serde(default)]
    pub skip_actions_far_from_most_limiting_element: bool,
    #[serde(default = "default_max_boundaries")]
    pub max_number_of_boundaries_for_skipping_actions: usize,
    /// Minimum cost decrease (MW) for a leaf to replace the best one
    #[serde(default)]
    pub absolute_minimum_impact_threshold: f64,
    /// Minimum relative cost decrease, in `[0, 1]`
    #[serde(default)]
    pub relative_minimum_impact_threshold: f64,
}

impl Default for TopoOptimizationParameters {
    fn default() -> Self {
        Self {
            max_preventive_search_tree_depth: default_search_depth(),
            max_auto_search_tree_depth: default_search_depth(),
            max_curative_search_tree_depth: default_search_depth(),
            predefined_combinations: Vec::new(),
            skip_actions_far_from_most_limiting_element: false,
            max_number_of_boundaries_for_skipping_actions: default_max_boundaries(),
            absolute_minimum_impact_threshold: 0.0,
            relative_minimum_impact_threshold: 0.0,
        }
    }
}

fn default_search_depth() -> usize {
    2
}

fn default_max_boundaries() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeActionsParameters {
    #[serde(default = "default_max_mip_iterations")]
    pub max_mip_iterations: usize,
    #[serde(default)]
    pub ra_range_shrinking: bool,
    /// Cost per tap moved
    #[serde(default = "default_pst_penalty")]
    pub pst_penalty_cost: f64,
    /// Cost per MW moved
    #[serde(default = "default_setpoint_penalty")]
    pub injection_penalty_cost: f64,
    /// Cost per MW moved
    #[serde(default = "default_setpoint_penalty")]
    pub hvdc_penalty_cost: f64,
}

impl Default for RangeActionsParameters {
    fn default() -> Self {
        Self {
            max_mip_iterations: default_max_mip_iterations(),
            ra_range_shrinking: false,
            pst_penalty_cost: default_pst_penalty(),
            injection_penalty_cost: default_setpoint_penalty(),
            hvdc_penalty_cost: default_setpoint_penalty(),
        }
    }
}

fn default_max_mip_iterations() -> usize {
    10
}

fn default_pst_penalty() -> f64 {
    0.01
}

fn default_setpoint_penalty() -> f64 {
    0.001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultithreadingParameters {
    #[serde(default = "default_one")]
    pub available_cpus: usize,
    #[serde(default = "default_one")]
    pub preventive_leaves_in_parallel: usize,
    #[serde(default = "default_one")]
    pub curative_leaves_in_parallel: usize,
    #[serde(default = "default_one")]
    pub contingency_scenarios_in_parallel: usize,
}

impl Default for MultithreadingParameters {
    fn default() -> Self {
        Self {
            available_cpus: 1,
            preventive_leaves_in_parallel: 1,
            curative_leaves_in_parallel: 1,
            contingency_scenarios_in_parallel: 1,
        }
    }
}

impl MultithreadingParameters {
    /// Spread `cpus` threads over leaves and contingency scenarios alike.
    pub fn use_available_cpus(&mut self, cpus: usize) {
        let cpus = cpus.max(1);
        self.available_cpus = cpus;
        self.preventive_leaves_in_parallel = cpus;
        self.curative_leaves_in_parallel = cpus;
        self.contingency_scenarios_in_parallel = cpus;
    }
}

fn default_one() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondPreventiveParameters {
    #[serde(default)]
    pub execution_condition: SecondPreventiveCondition,
    /// Seed the second pass with the first-pass preventive network actions
    #[serde(default = "default_true")]
    pub hint_from_first_preventive_rao: bool,
    #[serde(default)]
    pub ra_ids_excluded_from_second_preventive: BTreeSet<String>,
}

impl Default for SecondPreventiveParameters {
    fn default() -> Self {
        Self {
            execution_condition: SecondPreventiveCondition::Disabled,
            hint_from_first_preventive_rao: true,
            ra_ids_excluded_from_second_preventive: BTreeSet::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Caps on how many remedial actions may be used at one instant.
///
/// Absent limits are unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaUsageLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ra: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tso: Option<usize>,
    #[serde(default)]
    pub max_topo_per_tso: BTreeMap<String, usize>,
    #[serde(default)]
    pub max_pst_per_tso: BTreeMap<String, usize>,
    #[serde(default)]
    pub max_ra_per_tso: BTreeMap<String, usize>,
    #[serde(default)]
    pub max_elementary_actions_per_tso: BTreeMap<String, usize>,
    #[serde(default)]
    pub excluded_operators: BTreeSet<String>,
}

impl RaUsageLimits {
    pub fn max_ra(&self) -> usize {
        self.max_ra.unwrap_or(usize::MAX)
    }

    pub fn max_tso(&self) -> usize {
        self.max_tso.unwrap_or(usize::MAX)
    }

    pub fn max_topo_for(&self, tso: &str) -> usize {
        self.max_topo_per_tso.get(tso).copied().unwrap_or(usize::MAX)
    }

    pub fn max_pst_for(&self, tso: &str) -> usize {
        self.max_pst_per_tso.get(tso).copied().unwrap_or(usize::MAX)
    }

    pub fn max_ra_for(&self, tso: &str) -> usize {
        self.max_ra_per_tso.get(tso).copied().unwrap_or(usize::MAX)
    }

    pub fn max_elementary_actions_for(&self, tso: &str) -> usize {
        self.max_elementary_actions_per_tso
            .get(tso)
            .copied()
            .unwrap_or(usize::MAX)
    }

    pub fn is_operator_excluded(&self, operator: Option<&str>) -> bool {
        operator.is_some_and(|op| self.excluded_operators.contains(op))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualCostParameters {
    /// Cost per MW of monitored-Cnec violation
    #[serde(default = "default_mnec_violation_cost")]
    pub mnec_violation_cost: f64,
    /// Margin (MW) a monitored Cnec may lose before it is penalized
    #[serde(default = "default_mnec_acceptable_decrease")]
    pub mnec_acceptable_margin_decrease: f64,
    /// Cost added per state whose sensitivity computation failed
    #[serde(default = "default_sensitivity_failure_cost")]
    pub sensitivity_failure_over_cost: f64,
}

impl Default for VirtualCostParameters {
    fn default() -> Self {
        Self {
            mnec_violation_cost: default_mnec_violation_cost(),
            mnec_acceptable_margin_decrease: default_mnec_acceptable_decrease(),
            sensitivity_failure_over_cost: default_sensitivity_failure_cost(),
        }
    }
}

fn default_mnec_violation_cost() -> f64 {
    10.0
}

fn default_mnec_acceptable_decrease() -> f64 {
    50.0
}

fn default_sensitivity_failure_cost() -> f64 {
    10_000.0
}

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaoParameters {
    #[serde(default)]
    pub objective: ObjectiveParameters,
    #[serde(default)]
    pub topo: TopoOptimizationParameters,
    #[serde(default)]
    pub range_actions: RangeActionsParameters,
    #[serde(default)]
    pub multithreading: MultithreadingParameters,
    #[serde(default)]
    pub second_preventive: SecondPreventiveParameters,
    /// Keyed by instant (`"preventive"`, `"curative-1"`, ...)
    #[serde(default)]
    pub ra_usage_limits: BTreeMap<Instant, RaUsageLimits>,
    #[serde(default)]
    pub virtual_costs: VirtualCostParameters,
    /// Wall-clock budget of the whole run
    #[serde(default = "default_max_run_duration")]
    pub max_run_duration_seconds: u64,
}

impl Default for RaoParameters {
    fn default() -> Self {
        Self {
            objective: ObjectiveParameters::default(),
            topo: TopoOptimizationParameters::default(),
            range_actions: RangeActionsParameters::default(),
            multithreading: MultithreadingParameters::default(),
            second_preventive: SecondPreventiveParameters::default(),
            ra_usage_limits: BTreeMap::new(),
            virtual_costs: VirtualCostParameters::default(),
            max_run_duration_seconds: default_max_run_duration(),
        }
    }
}

fn default_max_run_duration() -> u64 {
    24 * 60 * 60
}

impl RaoParameters {
    /// Usage limits of `instant`; unlimited when none are configured.
    pub fn ra_usage_limits_for(&self, instant: Instant) -> RaUsageLimits {
        self.ra_usage_limits
            .get(&instant)
            .cloned()
            .unwrap_or_default()
    }

    /// Reject combinations no search could run with.
    pub fn validate(&self) -> RaoResult<()> {
        let relative = self.topo.relative_minimum_impact_threshold;
        if !(0.0..=1.0).contains(&relative) {
            return Err(RaoError::Config(format!(
                "relative_minimum_impact_threshold must lie in [0, 1], got {relative}"
            )));
        }
        if self.topo.absolute_minimum_impact_threshold < 0.0 {
            return Err(RaoError::Config(
                "absolute_minimum_impact_threshold must not be negative".into(),
            ));
        }
        let mt = &self.multithreading;
        if mt.preventive_leaves_in_parallel == 0
            || mt.curative_leaves_in_parallel == 0
            || mt.contingency_scenarios_in_parallel == 0
        {
            return Err(RaoError::Config(
                "parallelism settings must be at least 1".into(),
            ));
        }
        if self.max_run_duration_seconds == 0 {
            return Err(RaoError::Config(
                "max_run_duration_seconds must be positive".into(),
            ));
        }
        let ra = &self.range_actions;
        if ra.pst_penalty_cost < 0.0 || ra.injection_penalty_cost < 0.0 || ra.hvdc_penalty_cost < 0.0
        {
            return Err(RaoError::Config("penalty costs must not be negative".into()));
        }
        Ok(())
    }
}

/// Stop criterion of one search tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCriterion {
    /// Explore until the depth limit or until no improvement
    MinObjective,
    /// Stop once a leaf's cost is at or below the target
    AtTargetObjectiveValue(f64),
}

impl From<OptimizationGoal> for StopCriterion {
    fn from(goal: OptimizationGoal) -> Self {
        match goal {
            OptimizationGoal::MinObjective => StopCriterion::MinObjective,
            OptimizationGoal::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
        }
    }
}

/// Configuration of one search tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParameters {
    pub stop_criterion: StopCriterion,
    pub maximum_search_depth: usize,
    pub leaves_in_parallel: usize,
    pub ra_range_shrinking: bool,
    pub absolute_improvement_threshold: f64,
    pub relative_improvement_threshold: f64,
}

impl TreeParameters {
    pub fn preventive(params: &RaoParameters) -> Self {
        Self::build(
            params,
            params.objective.preventive_stop_criterion,
            params.topo.max_preventive_search_tree_depth,
            params.multithreading.preventive_leaves_in_parallel,
        )
    }

    /// Auto perimeters only simulate network actions; no range shrinking.
    pub fn auto(params: &RaoParameters) -> Self {
        Self {
            ra_range_shrinking: false,
            ..Self::build(
                params,
                params.objective.curative_stop_criterion,
                params.topo.max_auto_search_tree_depth,
                params.multithreading.curative_leaves_in_parallel,
            )
        }
    }

    pub fn curative(params: &RaoParameters) -> Self {
        Self::build(
            params,
            params.objective.curative_stop_criterion,
            params.topo.max_curative_search_tree_depth,
            params.multithreading.curative_leaves_in_parallel,
        )
    }

    /// The global pass always minimizes the objective.
    pub fn second_preventive(params: &RaoParameters) -> Self {
        Self {
            stop_criterion: StopCriterion::MinObjective,
            ..Self::preventive(params)
        }
    }

    fn build(params: &RaoParameters, goal: OptimizationGoal, depth: usize, leaves: usize) -> Self {
        Self {
            stop_criterion: goal.into(),
            maximum_search_depth: depth,
            leaves_in_parallel: leaves.max(1),
            ra_range_shrinking: params.range_actions.ra_range_shrinking,
            absolute_improvement_threshold: params.topo.absolute_minimum_impact_threshold,
            relative_improvement_threshold: params.topo.relative_minimum_impact_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = RaoParameters::default();
        assert_eq!(params.max_run_duration_seconds, 86_400);
        assert_eq!(params.range_actions.max_mip_iterations, 10);
        assert_eq!(
            params.second_preventive.execution_condition,
            SecondPreventiveCondition::Disabled
        );
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let params: RaoParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(params, RaoParameters::default());
    }

    #[test]
    fn test_usage_limits_keyed_by_instant() {
        let json = r#"{
            "ra_usage_limits": {
                "curative-1": {"max_ra": 2, "max_topo_per_tso": {"FR": 1}, "excluded_operators": ["BE"]}
            }
        }"#;
        let params: RaoParameters = serde_json::from_str(json).unwrap();
        let limits = params.ra_usage_limits_for(Instant::Curative(1));
        assert_eq!(limits.max_ra(), 2);
        assert_eq!(limits.max_topo_for("FR"), 1);
        assert_eq!(limits.max_topo_for("NL"), usize::MAX);
        assert!(limits.is_operator_excluded(Some("BE")));
        assert!(!limits.is_operator_excluded(None));
        assert_eq!(params.ra_usage_limits_for(Instant::Preventive).max_tso(), usize::MAX);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut params = RaoParameters::default();
        params.topo.relative_minimum_impact_threshold = 1.5;
        assert!(matches!(params.validate(), Err(RaoError::Config(_))));
    }

    #[test]
    fn test_tree_parameters_per_perimeter() {
        let mut params = RaoParameters::default();
        params.objective.preventive_stop_criterion = OptimizationGoal::MinObjective;
        params.topo.max_curative_search_tree_depth = 3;
        params.multithreading.curative_leaves_in_parallel = 4;
        params.range_actions.ra_range_shrinking = true;

        let prev = TreeParameters::preventive(&params);
        assert_eq!(prev.stop_criterion, StopCriterion::MinObjective);

        let cur = TreeParameters::curative(&params);
        assert_eq!(cur.stop_criterion, StopCriterion::AtTargetObjectiveValue(0.0));
        assert_eq!(cur.maximum_search_depth, 3);
        assert_eq!(cur.leaves_in_parallel, 4);
        assert!(cur.ra_range_shrinking);
        assert!(!TreeParameters::auto(&params).ra_range_shrinking);

        params.objective.preventive_stop_criterion = OptimizationGoal::Secure;
        let second = TreeParameters::second_preventive(&params);
        assert_eq!(second.stop_criterion, StopCriterion::MinObjective);
    }

    #[test]
    fn test_available_cpus_sets_every_pool() {
        let mut mt = MultithreadingParameters::default();
        mt.use_available_cpus(6);
        assert_eq!(mt.preventive_leaves_in_parallel, 6);
        assert_eq!(mt.contingency_scenarios_in_parallel, 6);
        mt.use_available_cpus(0);
        assert_eq!(mt.available_cpus, 1);
    }
}
