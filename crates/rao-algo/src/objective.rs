//! Objective function: maximize the minimum margin, plus virtual costs.
//!
//! The functional cost is the opposite of the smallest margin over the
//! optimized Cnecs, so that a negative cost means every optimized Cnec is
//! secure. Virtual costs penalize degraded monitored Cnecs and failed
//! sensitivity computations.

use crate::parameters::VirtualCostParameters;
use crate::sensitivity::SensitivityResult;
use rao_core::Cnec;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MNEC_VIOLATION: &str = "mnec-violation";
pub const SENSITIVITY_FAILURE: &str = "sensitivity-failure";

/// Cost breakdown of one network situation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectiveValue {
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    /// Optimized Cnecs by increasing margin, as (id, margin)
    pub most_limiting: Vec<(String, f64)>,
    /// Cnecs contributing to each non-zero virtual cost
    pub costly_elements: BTreeMap<String, Vec<String>>,
}

impl ObjectiveValue {
    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }

    pub fn min_margin(&self) -> Option<f64> {
        self.most_limiting.first().map(|(_, m)| *m)
    }

    pub fn most_limiting_elements(&self, count: usize) -> impl Iterator<Item = &str> {
        self.most_limiting.iter().take(count).map(|(id, _)| id.as_str())
    }
}

/// Evaluates sensitivity results against a fixed set of Cnecs.
#[derive(Debug, Clone)]
pub struct ObjectiveFunction {
    optimized: Vec<Cnec>,
    /// Monitored Cnecs with the margin they may not drop below
    monitored: Vec<(Cnec, f64)>,
    params: VirtualCostParameters,
}

impl ObjectiveFunction {
    /// Margins of monitored Cnecs in `initial` set the reference they are
    /// penalized against.
    pub fn new(cnecs: &[Cnec], initial: &SensitivityResult, params: &VirtualCostParameters) -> Self {
        let optimized = cnecs
            .iter()
            .filter(|c| c.optimized && c.has_thresholds())
            .cloned()
            .collect();
        let monitored = cnecs
            .iter()
            .filter(|c| c.monitored && c.has_thresholds())
            .map(|c| {
                let initial_margin = initial.margin(c).unwrap_or(0.0);
                let floor = (initial_margin - params.mnec_acceptable_margin_decrease).min(0.0);
                (c.clone(), floor)
            })
            .collect();
        Self {
            optimized,
            monitored,
            params: params.clone(),
        }
    }

    pub fn optimized_cnecs(&self) -> &[Cnec] {
        &self.optimized
    }

    /// Monitored Cnecs and the margin below which they are penalized.
    pub fn monitored_cnecs(&self) -> &[(Cnec, f64)] {
        &self.monitored
    }

    pub fn mnec_violation_cost(&self) -> f64 {
        self.params.mnec_violation_cost
    }

    pub fn has_optimized_cnecs(&self) -> bool {
        !self.optimized.is_empty()
    }

    pub fn evaluate(&self, result: &SensitivityResult) -> ObjectiveValue {
        let mut most_limiting: Vec<(String, f64)> = self
            .optimized
            .iter()
            .filter(|c| !result.is_state_failed(&c.state))
            .filter_map(|c| result.margin(c).map(|m| (c.id.clone(), m)))
            .collect();
        most_limiting.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let functional_cost = most_limiting.first().map_or(0.0, |(_, m)| -m);

        let mut virtual_costs = BTreeMap::new();
        let mut costly_elements = BTreeMap::new();

        let mut violation = 0.0;
        let mut violated = Vec::new();
        for (cnec, floor) in &self.monitored {
            let Some(margin) = result.margin(cnec) else {
                continue;
            };
            let excess = (floor - margin).max(0.0);
            if excess > 0.0 {
                violation += excess;
                violated.push(cnec.id.clone());
            }
        }
        virtual_costs.insert(
            MNEC_VIOLATION.to_string(),
            violation * self.params.mnec_violation_cost,
        );
        if !violated.is_empty() {
            costly_elements.insert(MNEC_VIOLATION.to_string(), violated);
        }

        let failed = result.failed_states.len() as f64;
        virtual_costs.insert(
            SENSITIVITY_FAILURE.to_string(),
            failed * self.params.sensitivity_failure_over_cost,
        );

        ObjectiveValue {
            functional_cost,
            virtual_costs,
            most_limiting,
            costly_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensitivity::ComputationStatus;
    use rao_core::{ContingencyId, ElementId, Instant, State};

    fn result(flows: &[(&str, f64)]) -> SensitivityResult {
        SensitivityResult {
            flows: flows.iter().map(|(id, f)| (id.to_string(), *f)).collect(),
            ..SensitivityResult::default()
        }
    }

    fn cnecs() -> Vec<Cnec> {
        vec![
            Cnec::flow("a", ElementId::new("l1"), State::preventive(), 100.0),
            Cnec::flow("b", ElementId::new("l2"), State::preventive(), 100.0),
            Cnec::flow("m", ElementId::new("l3"), State::preventive(), 100.0).monitored_only(),
        ]
    }

    #[test]
    fn test_functional_cost_is_minus_min_margin() {
        let initial = result(&[("a", 80.0), ("b", 120.0), ("m", 0.0)]);
        let f = ObjectiveFunction::new(&cnecs(), &initial, &VirtualCostParameters::default());
        let value = f.evaluate(&initial);
        assert_eq!(value.functional_cost, 20.0);
        assert_eq!(value.min_margin(), Some(-20.0));
        assert_eq!(value.most_limiting_elements(1).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(value.virtual_cost(), 0.0);
        assert_eq!(value.cost(), 20.0);
    }

    #[test]
    fn test_mnec_violation() {
        let params = VirtualCostParameters {
            mnec_violation_cost: 10.0,
            mnec_acceptable_margin_decrease: 20.0,
            sensitivity_failure_over_cost: 0.0,
        };
        let initial = result(&[("a", 0.0), ("b", 0.0), ("m", 90.0)]);
        let f = ObjectiveFunction::new(&cnecs(), &initial, &params);
        // initial margin 10, floor min(0, 10 - 20) = -10
        let fine = f.evaluate(&result(&[("a", 0.0), ("b", 0.0), ("m", 105.0)]));
        assert_eq!(fine.virtual_costs[MNEC_VIOLATION], 0.0);
        let bad = f.evaluate(&result(&[("a", 0.0), ("b", 0.0), ("m", 115.0)]));
        assert_eq!(bad.virtual_costs[MNEC_VIOLATION], 50.0);
        assert_eq!(bad.costly_elements[MNEC_VIOLATION], vec!["m".to_string()]);
    }

    #[test]
    fn test_failed_states_are_penalized_and_skipped() {
        let cur = State::post_contingency(ContingencyId::new("co"), Instant::Curative(1)).unwrap();
        let cnecs = vec![
            Cnec::flow("a", ElementId::new("l1"), State::preventive(), 100.0),
            Cnec::flow("c", ElementId::new("l1"), cur.clone(), 100.0),
        ];
        let mut r = result(&[("a", 50.0)]);
        r.failed_states.insert(cur);
        r.status = ComputationStatus::PartialFailure;
        let f = ObjectiveFunction::new(&cnecs, &r, &VirtualCostParameters::default());
        let value = f.evaluate(&r);
        assert_eq!(value.functional_cost, -50.0);
        assert_eq!(value.virtual_costs[SENSITIVITY_FAILURE], 10_000.0);
    }

    #[test]
    fn test_no_optimized_cnec_gives_zero_functional_cost() {
        let f = ObjectiveFunction::new(&[], &result(&[]), &VirtualCostParameters::default());
        assert!(!f.has_optimized_cnecs());
        assert_eq!(f.evaluate(&result(&[])).cost(), 0.0);
    }
}
