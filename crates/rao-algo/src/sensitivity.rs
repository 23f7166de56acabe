//! Sensitivity computation: Cnec values and their derivatives with respect to
//! range-action setpoints.
//!
//! The search tree treats the load-flow engine as an opaque, synchronous
//! collaborator behind [`SensitivityProvider`]. A state whose computation does
//! not converge is reported in [`SensitivityResult::failed_states`] instead of
//! failing the call.
//!
//! [`LinearSensitivityProvider`] is a superposition model: every Cnec has a
//! reference flow that moves linearly with element setpoints and by fixed
//! amounts when switchable elements change status.

use crate::applied::AppliedRemedialActions;
use crate::error::EvaluationError;
use rao_core::{
    Cnec, Contingency, ContingencyId, ElementId, Network, RangeAction, RaoError, RaoResult, State,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Outcome of a sensitivity computation as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    #[default]
    Default,
    /// Some post-contingency states failed
    PartialFailure,
    /// The preventive state, or every requested state, failed
    Failure,
}

impl ComputationStatus {
    pub fn from_failures(requested: &BTreeSet<State>, failed: &BTreeSet<State>) -> Self {
        if failed.is_empty() {
            ComputationStatus::Default
        } else if failed.iter().any(State::is_preventive) || requested.is_subset(failed) {
            ComputationStatus::Failure
        } else {
            ComputationStatus::PartialFailure
        }
    }
}

/// Values and sensitivities of a set of Cnecs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensitivityResult {
    pub status: ComputationStatus,
    /// Cnec value (MW for flows), by Cnec id
    pub flows: BTreeMap<String, f64>,
    /// d(value)/d(setpoint), by Cnec id then range-action id
    pub sensitivities: BTreeMap<String, BTreeMap<String, f64>>,
    pub failed_states: BTreeSet<State>,
}

impl SensitivityResult {
    pub fn flow(&self, cnec_id: &str) -> Option<f64> {
        self.flows.get(cnec_id).copied()
    }

    /// Zero when the pair was not computed.
    pub fn sensitivity(&self, cnec_id: &str, range_action_id: &str) -> f64 {
        self.sensitivities
            .get(cnec_id)
            .and_then(|m| m.get(range_action_id))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn margin(&self, cnec: &Cnec) -> Option<f64> {
        self.flow(&cnec.id).map(|value| cnec.margin(value))
    }

    pub fn is_state_failed(&self, state: &State) -> bool {
        self.failed_states.contains(state)
    }

    pub fn is_failure(&self) -> bool {
        self.status == ComputationStatus::Failure
    }
}

/// Inputs of one sensitivity computation.
pub struct SensitivityRequest<'a> {
    /// Network with every preventive action of the leaf applied
    pub network: &'a Network,
    pub cnecs: &'a [Cnec],
    /// Range actions to compute sensitivities for
    pub range_actions: &'a [Arc<RangeAction>],
    /// Actions applied in post-contingency states
    pub applied: &'a AppliedRemedialActions,
}

/// Load-flow engine seen by the optimizer.
pub trait SensitivityProvider: Send + Sync {
    /// Provider identifier (e.g., "linear-superposition")
    fn id(&self) -> &str;

    /// Compute values of `request.cnecs` and their sensitivities.
    ///
    /// Non-convergence of a state is reported in the result; an `Err` means
    /// the request itself could not be processed.
    fn compute(&self, request: &SensitivityRequest<'_>) -> Result<SensitivityResult, EvaluationError>;
}

/// Coefficients of the superposition model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensitivityModel {
    /// Value of each Cnec on the reference network, by Cnec id
    #[serde(default)]
    pub reference_flows: BTreeMap<String, f64>,
    /// Flow change per unit of setpoint (tap, MW) of an element, by Cnec id
    #[serde(default)]
    pub setpoint_sensitivities: BTreeMap<String, BTreeMap<ElementId, f64>>,
    /// Flow change when an element's open status differs from the reference, by Cnec id
    #[serde(default)]
    pub topology_deltas: BTreeMap<String, BTreeMap<ElementId, f64>>,
    /// Ids of states whose load flow never converges
    #[serde(default)]
    pub failing_states: BTreeSet<String>,
    /// Elements whose opening makes the load flow diverge
    #[serde(default)]
    pub diverging_open_elements: BTreeSet<ElementId>,
}

/// [`SensitivityProvider`] evaluating a [`SensitivityModel`].
///
/// Deviations are measured against the reference network with the Cnec's
/// contingency applied, so post-contingency reference flows already include
/// the outage.
#[derive(Debug, Clone)]
pub struct LinearSensitivityProvider {
    model: SensitivityModel,
    contingencies: BTreeMap<ContingencyId, Contingency>,
    references: BTreeMap<Option<ContingencyId>, Network>,
}

impl LinearSensitivityProvider {
    pub fn new(
        model: SensitivityModel,
        reference: &Network,
        contingencies: &[Contingency],
    ) -> RaoResult<Self> {
        let mut references = BTreeMap::from([(None, reference.clone())]);
        for contingency in contingencies {
            let mut network = reference.clone();
            network.apply_contingency(contingency)?;
            references.insert(Some(contingency.id.clone()), network);
        }
        Ok(Self {
            model,
            contingencies: contingencies
                .iter()
                .map(|c| (c.id.clone(), c.clone()))
                .collect(),
            references,
        })
    }

    pub fn model(&self) -> &SensitivityModel {
        &self.model
    }

    fn element_setpoint(network: &Network, element: &ElementId) -> RaoResult<f64> {
        network
            .pst_tap(element)
            .map(f64::from)
            .or_else(|_| network.setpoint(element))
    }

    fn cnec_flow(&self, cnec: &Cnec, network: &Network, reference: &Network) -> RaoResult<f64> {
        let mut flow = self
            .model
            .reference_flows
            .get(&cnec.id)
            .copied()
            .unwrap_or(0.0);
        if let Some(coefficients) = self.model.setpoint_sensitivities.get(&cnec.id) {
            for (element, coefficient) in coefficients {
                let moved = Self::element_setpoint(network, element)?
                    - Self::element_setpoint(reference, element)?;
                flow += coefficient * moved;
            }
        }
        if let Some(deltas) = self.model.topology_deltas.get(&cnec.id) {
            for (element, delta) in deltas {
                if network.is_open(element)? != reference.is_open(element)? {
                    flow += delta;
                }
            }
        }
        Ok(flow)
    }

    fn state_network(
        &self,
        request: &SensitivityRequest<'_>,
        state: &State,
    ) -> RaoResult<Network> {
        let mut network = request.network.clone();
        if let Some(id) = state.contingency() {
            let contingency = self
                .contingencies
                .get(id)
                .ok_or_else(|| RaoError::Network(format!("unknown contingency '{id}'")))?;
            network.apply_contingency(contingency)?;
        }
        request.applied.apply_for(&mut network, state)?;
        Ok(network)
    }

    fn diverges(&self, network: &Network) -> bool {
        self.model
            .diverging_open_elements
            .iter()
            .any(|element| network.is_open(element).unwrap_or(false))
    }
}

impl SensitivityProvider for LinearSensitivityProvider {
    fn id(&self) -> &str {
        "linear-superposition"
    }

    fn compute(&self, request: &SensitivityRequest<'_>) -> Result<SensitivityResult, EvaluationError> {
        let mut by_state: BTreeMap<&State, Vec<&Cnec>> = BTreeMap::new();
        for cnec in request.cnecs {
            by_state.entry(&cnec.state).or_default().push(cnec);
        }

        let mut result = SensitivityResult::default();
        for (state, cnecs) in &by_state {
            if self.model.failing_states.contains(&state.id()) {
                result.failed_states.insert((*state).clone());
                continue;
            }
            let network = self.state_network(request, state)?;
            if self.diverges(&network) {
                result.failed_states.insert((*state).clone());
                continue;
            }
            let reference = self
                .references
                .get(&state.contingency().cloned())
                .ok_or_else(|| {
                    EvaluationError::SensitivityFailure(format!("no reference for state '{state}'"))
                })?;
            for cnec in cnecs {
                let flow = self.cnec_flow(cnec, &network, reference)?;
                result.flows.insert(cnec.id.clone(), flow);
                let Some(coefficients) = self.model.setpoint_sensitivities.get(&cnec.id) else {
                    continue;
                };
                for ra in request.range_actions {
                    if let Some(s) = coefficients.get(&ra.element) {
                        result
                            .sensitivities
                            .entry(cnec.id.clone())
                            .or_default()
                            .insert(ra.id.clone(), *s);
                    }
                }
            }
        }

        let requested: BTreeSet<State> = by_state.keys().map(|s| (*s).clone()).collect();
        result.status = ComputationStatus::from_failures(&requested, &result.failed_states);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{Bus, Edge, Instant, Line, Pst, RangeActionKind, Switch};

    fn network() -> Network {
        let mut n = Network::new();
        n.add_bus(Bus::new("a", Some("FR"))).unwrap();
        n.add_bus(Bus::new("b", Some("FR"))).unwrap();
        n.add_edge(Edge::Line(Line {
            id: ElementId::new("l1"),
            from_bus: ElementId::new("a"),
            to_bus: ElementId::new("b"),
            connected: true,
        }))
        .unwrap();
        n.add_edge(Edge::Switch(Switch {
            id: ElementId::new("s1"),
            from_bus: ElementId::new("a"),
            to_bus: ElementId::new("b"),
            open: false,
        }))
        .unwrap();
        n.add_edge(Edge::Pst(Pst {
            id: ElementId::new("pst"),
            from_bus: ElementId::new("a"),
            to_bus: ElementId::new("b"),
            tap: 0,
            low_tap: -10,
            high_tap: 10,
            connected: true,
        }))
        .unwrap();
        n
    }

    fn curative() -> State {
        State::post_contingency(ContingencyId::new("co1"), Instant::Curative(1)).unwrap()
    }

    fn provider() -> LinearSensitivityProvider {
        let mut model = SensitivityModel::default();
        model.reference_flows.insert("c-prev".into(), 120.0);
        model.reference_flows.insert("c-cur".into(), 150.0);
        model
            .setpoint_sensitivities
            .insert("c-prev".into(), BTreeMap::from([(ElementId::new("pst"), -5.0)]));
        model
            .setpoint_sensitivities
            .insert("c-cur".into(), BTreeMap::from([(ElementId::new("pst"), -4.0)]));
        model
            .topology_deltas
            .insert("c-prev".into(), BTreeMap::from([(ElementId::new("s1"), -30.0)]));
        model
            .topology_deltas
            .insert("c-cur".into(), BTreeMap::from([(ElementId::new("s1"), -30.0)]));
        let contingencies = [Contingency::new("co1", vec![ElementId::new("l1")])];
        LinearSensitivityProvider::new(model, &network(), &contingencies).unwrap()
    }

    fn cnecs() -> Vec<Cnec> {
        vec![
            Cnec::flow("c-prev", ElementId::new("l1"), State::preventive(), 100.0),
            Cnec::flow("c-cur", ElementId::new("s1"), curative(), 100.0),
        ]
    }

    fn pst_action() -> Arc<RangeAction> {
        Arc::new(RangeAction::new(
            "ra-pst",
            RangeActionKind::PstTap,
            ElementId::new("pst"),
            0.0,
        ))
    }

    #[test]
    fn test_reference_flows_include_contingency() {
        let cnecs = cnecs();
        let applied = AppliedRemedialActions::new();
        let net = network();
        let ras = [pst_action()];
        let result = provider()
            .compute(&SensitivityRequest {
                network: &net,
                cnecs: &cnecs,
                range_actions: &ras,
                applied: &applied,
            })
            .unwrap();
        assert_eq!(result.status, ComputationStatus::Default);
        assert_eq!(result.flow("c-prev"), Some(120.0));
        assert_eq!(result.flow("c-cur"), Some(150.0));
        assert_eq!(result.sensitivity("c-prev", "ra-pst"), -5.0);
        assert_eq!(result.margin(&cnecs[0]), Some(-20.0));
    }

    #[test]
    fn test_flows_follow_taps_and_switches() {
        let cnecs = cnecs();
        let applied = AppliedRemedialActions::new();
        let mut net = network();
        net.set_pst_tap(&ElementId::new("pst"), 2).unwrap();
        net.set_open(&ElementId::new("s1"), true).unwrap();
        let result = provider()
            .compute(&SensitivityRequest {
                network: &net,
                cnecs: &cnecs,
                range_actions: &[],
                applied: &applied,
            })
            .unwrap();
        assert_eq!(result.flow("c-prev"), Some(120.0 - 10.0 - 30.0));
        assert_eq!(result.flow("c-cur"), Some(150.0 - 8.0 - 30.0));
        assert!(result.sensitivities.is_empty());
    }

    #[test]
    fn test_curative_overrides_only_affect_their_contingency() {
        let cnecs = cnecs();
        let mut applied = AppliedRemedialActions::new();
        applied.add_range_action(&curative(), pst_action(), 5.0);
        let net = network();
        let result = provider()
            .compute(&SensitivityRequest {
                network: &net,
                cnecs: &cnecs,
                range_actions: &[],
                applied: &applied,
            })
            .unwrap();
        assert_eq!(result.flow("c-prev"), Some(120.0));
        assert_eq!(result.flow("c-cur"), Some(130.0));
    }

    #[test]
    fn test_failing_states() {
        let mut p = provider();
        p.model.failing_states.insert(curative().id());
        let cnecs = cnecs();
        let applied = AppliedRemedialActions::new();
        let net = network();
        let request = SensitivityRequest {
            network: &net,
            cnecs: &cnecs,
            range_actions: &[],
            applied: &applied,
        };
        let result = p.compute(&request).unwrap();
        assert_eq!(result.status, ComputationStatus::PartialFailure);
        assert!(result.is_state_failed(&curative()));
        assert_eq!(result.flow("c-cur"), None);

        p.model.diverging_open_elements.insert(ElementId::new("s1"));
        let mut open = network();
        open.set_open(&ElementId::new("s1"), true).unwrap();
        let request = SensitivityRequest {
            network: &open,
            ..request
        };
        assert!(p.compute(&request).unwrap().is_failure());
    }

    #[test]
    fn test_status_from_failures() {
        let prev = State::preventive();
        let cur = curative();
        let requested = BTreeSet::from([prev.clone(), cur.clone()]);
        assert_eq!(
            ComputationStatus::from_failures(&requested, &BTreeSet::new()),
            ComputationStatus::Default
        );
        assert_eq!(
            ComputationStatus::from_failures(&requested, &BTreeSet::from([cur.clone()])),
            ComputationStatus::PartialFailure
        );
        assert_eq!(
            ComputationStatus::from_failures(&requested, &BTreeSet::from([prev])),
            ComputationStatus::Failure
        );
        let only_cur = BTreeSet::from([cur.clone()]);
        assert_eq!(
            ComputationStatus::from_failures(&only_cur, &BTreeSet::from([cur])),
            ComputationStatus::Failure
        );
    }

    #[test]
    fn test_model_deserializes_with_defaults() {
        let model: SensitivityModel =
            serde_json::from_str(r#"{"reference_flows": {"c1": 10.0}}"#).unwrap();
        assert_eq!(model.reference_flows["c1"], 10.0);
        assert!(model.failing_states.is_empty());
    }
}
