//! The CRAC: contingencies, remedial actions and constraints of a study.

use crate::action::{NetworkAction, RangeAction, RemedialAction, UsageRule};
use crate::cnec::Cnec;
use crate::diagnostics::Diagnostics;
use crate::error::RaoResult;
use crate::network::Network;
use crate::state::{Contingency, Instant, State};
use crate::ContingencyId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// In-memory CRAC. Read-only during optimization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Crac {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub contingencies: Vec<Contingency>,
    #[serde(default)]
    pub cnecs: Vec<Cnec>,
    #[serde(default)]
    pub network_actions: Vec<NetworkAction>,
    #[serde(default)]
    pub range_actions: Vec<RangeAction>,
}

impl Crac {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_contingency(mut self, contingency: Contingency) -> Self {
        self.contingencies.push(contingency);
        self
    }

    pub fn with_cnec(mut self, cnec: Cnec) -> Self {
        self.cnecs.push(cnec);
        self
    }

    pub fn with_network_action(mut self, action: NetworkAction) -> Self {
        self.network_actions.push(action);
        self
    }

    pub fn with_range_action(mut self, action: RangeAction) -> Self {
        self.range_actions.push(action);
        self
    }

    pub fn preventive_state(&self) -> State {
        State::preventive()
    }

    pub fn contingency(&self, id: &ContingencyId) -> Option<&Contingency> {
        self.contingencies.iter().find(|c| &c.id == id)
    }

    pub fn cnec(&self, id: &str) -> Option<&Cnec> {
        self.cnecs.iter().find(|c| c.id == id)
    }

    pub fn network_action(&self, id: &str) -> Option<&NetworkAction> {
        self.network_actions.iter().find(|a| a.id == id)
    }

    pub fn range_action(&self, id: &str) -> Option<&RangeAction> {
        self.range_actions.iter().find(|a| a.id == id)
    }

    /// Every state of the study: the preventive state, the states carrying
    /// Cnecs, and the states targeted by contingency-state usage rules.
    pub fn states(&self) -> BTreeSet<State> {
        let mut states = BTreeSet::from([State::preventive()]);
        states.extend(self.cnecs.iter().map(|c| c.state.clone()));
        let rules = self
            .network_actions
            .iter()
            .flat_map(|a| a.usage_rules.iter())
            .chain(self.range_actions.iter().flat_map(|a| a.usage_rules.iter()));
        states.extend(rules.filter_map(UsageRule::state));
        states
    }

    /// States following `contingency`, in chronological order.
    pub fn states_of_contingency(&self, contingency: &ContingencyId) -> Vec<State> {
        self.states()
            .into_iter()
            .filter(|s| s.contingency() == Some(contingency))
            .collect()
    }

    pub fn cnecs_for_state<'a>(&'a self, state: &'a State) -> impl Iterator<Item = &'a Cnec> + 'a {
        self.cnecs.iter().filter(move |c| &c.state == state)
    }

    /// Whether any remedial action has a rule for the instant of `state`.
    pub fn has_remedial_actions_for(&self, state: &State) -> bool {
        let applies = |rule: &UsageRule| match rule {
            UsageRule::OnContingencyState {
                contingency,
                instant,
                ..
            } => Some(contingency) == state.contingency() && *instant == state.instant(),
            other => other.instant() == state.instant(),
        };
        self.network_actions
            .iter()
            .flat_map(|a| a.usage_rules.iter())
            .chain(self.range_actions.iter().flat_map(|a| a.usage_rules.iter()))
            .any(applies)
    }

    /// Check internal consistency, and references into `network` when given.
    pub fn validate(&self, network: Option<&Network>) -> Diagnostics {
        let mut diag = Diagnostics::new();

        let mut seen = HashSet::new();
        for id in self
            .contingencies
            .iter()
            .map(|c| c.id.as_str())
            .chain(self.cnecs.iter().map(|c| c.id.as_str()))
            .chain(self.network_actions.iter().map(|a| a.id.as_str()))
            .chain(self.range_actions.iter().map(|a| a.id.as_str()))
        {
            if !seen.insert(id) {
                diag.add_error_with_entity("duplicate", "identifier used more than once", id);
            }
        }

        let contingency_ids: HashSet<&ContingencyId> =
            self.contingencies.iter().map(|c| &c.id).collect();
        let check_state = |diag: &mut Diagnostics, state: &State, entity: &str| {
            if !state.is_well_formed() {
                diag.add_error_with_entity(
                    "state",
                    &format!("state '{state}' pairs instant and contingency inconsistently"),
                    entity,
                );
            }
            if let Some(c) = state.contingency() {
                if !contingency_ids.contains(c) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("unknown contingency '{c}'"),
                        entity,
                    );
                }
            }
        };

        for cnec in &self.cnecs {
            check_state(&mut diag, &cnec.state, &cnec.id);
            if !cnec.has_thresholds() {
                diag.add_warning_with_entity("threshold", "Cnec has no threshold", &cnec.id);
            }
            if !cnec.optimized && !cnec.monitored {
                diag.add_warning_with_entity(
                    "threshold",
                    "Cnec is neither optimized nor monitored",
                    &cnec.id,
                );
            }
        }

        let cnec_ids: HashSet<&str> = self.cnecs.iter().map(|c| c.id.as_str()).collect();
        let all_actions = self
            .network_actions
            .iter()
            .map(|a| a as &dyn RemedialAction)
            .chain(self.range_actions.iter().map(|a| a as &dyn RemedialAction));
        for action in all_actions {
            if action.usage_rules().is_empty() {
                diag.add_warning_with_entity(
                    "usage-rule",
                    "remedial action has no usage rule and will never be used",
                    action.id(),
                );
            }
            for rule in action.usage_rules() {
                match rule {
                    UsageRule::OnFlowConstraint { cnec, .. } if !cnec_ids.contains(cnec.as_str()) => {
                        diag.add_error_with_entity(
                            "reference",
                            &format!("usage rule references unknown Cnec '{cnec}'"),
                            action.id(),
                        );
                    }
                    UsageRule::OnContingencyState { .. } => {
                        if let Some(state) = rule.state() {
                            check_state(&mut diag, &state, action.id());
                        }
                    }
                    _ => {}
                }
                if rule.instant() == Instant::Outage {
                    diag.add_error_with_entity(
                        "usage-rule",
                        "remedial actions cannot be used at the outage instant",
                        action.id(),
                    );
                }
            }
        }

        for ra in &self.range_actions {
            for range in &ra.ranges {
                if range.min > range.max {
                    diag.add_error_with_entity("range", "range has min above max", &ra.id);
                }
            }
        }

        if let Some(network) = network {
            for contingency in &self.contingencies {
                for element in &contingency.elements {
                    if !network.contains_element(element) {
                        diag.add_error_with_entity(
                            "reference",
                            &format!("unknown network element '{element}'"),
                            contingency.id.as_str(),
                        );
                    }
                }
            }
            for cnec in &self.cnecs {
                if !network.contains_element(&cnec.element) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("unknown network element '{}'", cnec.element),
                        &cnec.id,
                    );
                }
            }
            for action in &self.network_actions {
                for element in action.network_elements() {
                    if !network.contains_element(element) {
                        diag.add_error_with_entity(
                            "reference",
                            &format!("unknown network element '{element}'"),
                            &action.id,
                        );
                    }
                }
            }
            for ra in &self.range_actions {
                if network.range_action_setpoint(ra).is_err() {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("'{}' cannot carry a {:?} range action", ra.element, ra.kind),
                        &ra.id,
                    );
                }
            }
        }

        diag
    }

    /// [`Crac::validate`], failing with a configuration error on any error.
    pub fn ensure_valid(&self, network: Option<&Network>) -> RaoResult<()> {
        self.validate(network).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionType, ElementaryAction, UsageMethod};
    use crate::ElementId;

    fn co1() -> ContingencyId {
        ContingencyId::new("co1")
    }

    fn crac() -> Crac {
        let cur = State::post_contingency(co1(), Instant::Curative(1)).unwrap();
        let out = State::post_contingency(co1(), Instant::Outage).unwrap();
        Crac::new("test")
            .with_contingency(Contingency::new("co1", vec![ElementId::new("l1")]))
            .with_cnec(Cnec::flow("prev", ElementId::new("l2"), State::preventive(), 100.0))
            .with_cnec(Cnec::flow("out", ElementId::new("l2"), out, 120.0))
            .with_cnec(Cnec::flow("cur", ElementId::new("l2"), cur, 100.0))
            .with_network_action(
                NetworkAction::new(
                    "open-s1",
                    vec![ElementaryAction::Topological {
                        element: ElementId::new("s1"),
                        action_type: ActionType::Open,
                    }],
                )
                .with_usage_rule(UsageRule::OnInstant {
                    instant: Instant::Preventive,
                    usage_method: UsageMethod::Available,
                }),
            )
    }

    #[test]
    fn test_states_are_collected_in_order() {
        let states: Vec<String> = crac().states().iter().map(State::id).collect();
        assert_eq!(states, vec!["preventive", "co1 - outage", "co1 - curative-1"]);
    }

    #[test]
    fn test_states_of_contingency() {
        let c = crac();
        let states = c.states_of_contingency(&co1());
        assert_eq!(states.len(), 2);
        assert!(states[0].instant() < states[1].instant());
    }

    #[test]
    fn test_has_remedial_actions_for() {
        let c = crac();
        assert!(c.has_remedial_actions_for(&State::preventive()));
        let cur = State::post_contingency(co1(), Instant::Curative(1)).unwrap();
        assert!(!c.has_remedial_actions_for(&cur));
    }

    #[test]
    fn test_valid_crac() {
        assert!(crac().ensure_valid(None).is_ok());
    }

    #[test]
    fn test_duplicate_and_dangling_references() {
        let ghost = State::post_contingency(ContingencyId::new("ghost"), Instant::Curative(1)).unwrap();
        let c = crac()
            .with_cnec(Cnec::flow("prev", ElementId::new("l2"), ghost, 10.0))
            .with_network_action(NetworkAction::new("na", vec![]).with_usage_rule(
                UsageRule::OnFlowConstraint {
                    instant: Instant::Preventive,
                    cnec: "missing".into(),
                    usage_method: UsageMethod::Available,
                },
            ));
        let diag = c.validate(None);
        assert_eq!(diag.issues_by_category("duplicate").count(), 1);
        assert_eq!(diag.issues_by_category("reference").count(), 2);
        assert!(c.ensure_valid(None).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let c = crac();
        let json = serde_json::to_string(&c).unwrap();
        let back: Crac = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cnecs.len(), 3);
        assert_eq!(back.states(), c.states());
    }
}
