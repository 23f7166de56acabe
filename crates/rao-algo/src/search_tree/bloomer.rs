//! Candidate generation for the next depth of the search tree.
//!
//! From the optimal leaf, the bloomer proposes every predefined combination
//! and every single network action still available, then filters them in
//! order: already activated, incompatible, already tested, usage limits,
//! distance from the most limiting elements and elementary-action counts.
//! Usage-limit filters may flag a candidate so that its leaf is evaluated
//! with range actions back at their pre-perimeter setpoints.

use super::combination::NetworkActionCombination;
use super::leaf::Leaf;
use crate::compatibility::is_combination_compatible;
use crate::parameters::{RaUsageLimits, RaoParameters, TreeParameters};
use crate::perimeter::OptimizationPerimeter;
use rao_core::{Country, CountryGraph, Network, NetworkAction, RemedialAction};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Combination proposed for evaluation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub combination: NetworkActionCombination,
    pub predefined: bool,
    /// Evaluate with range actions at their pre-perimeter setpoints
    pub remove_range_actions: bool,
}

impl Candidate {
    fn new(combination: NetworkActionCombination, predefined: bool) -> Self {
        Self {
            combination,
            predefined,
            remove_range_actions: false,
        }
    }

    /// Evaluation order: detected combinations, predefined ones, larger ones, then by id.
    pub fn sort(candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| {
            b.combination
                .is_detected_during_rao()
                .cmp(&a.combination.is_detected_during_rao())
                .then_with(|| b.predefined.cmp(&a.predefined))
                .then_with(|| b.combination.len().cmp(&a.combination.len()))
                .then_with(|| {
                    a.combination
                        .concatenated_id()
                        .cmp(&b.combination.concatenated_id())
                })
        });
    }
}

pub struct Bloomer<'a> {
    perimeter: &'a OptimizationPerimeter,
    network: &'a Network,
    country_graph: CountryGraph,
    limits: RaUsageLimits,
    predefined: Vec<NetworkActionCombination>,
    max_depth: usize,
    /// Country hops within which actions are close, when skipping far actions
    max_boundaries: Option<usize>,
    pre_perimeter_setpoints: &'a BTreeMap<String, f64>,
}

impl<'a> Bloomer<'a> {
    /// `hints` are combinations selected by a previous optimization.
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        network: &'a Network,
        params: &RaoParameters,
        tree_parameters: &TreeParameters,
        hints: &[NetworkActionCombination],
        pre_perimeter_setpoints: &'a BTreeMap<String, f64>,
    ) -> Self {
        let available: BTreeMap<&str, &Arc<NetworkAction>> = perimeter
            .network_actions()
            .iter()
            .map(|na| (na.id.as_str(), na))
            .collect();

        let mut predefined: Vec<NetworkActionCombination> = Vec::new();
        for hint in hints {
            if hint.ids().iter().all(|id| available.contains_key(id)) && !hint.is_empty() {
                predefined.push(hint.clone().detected());
            }
        }
        for ids in &params.topo.predefined_combinations {
            let actions: Option<Vec<Arc<NetworkAction>>> = ids
                .iter()
                .map(|id| available.get(id.as_str()).map(|na| Arc::clone(na)))
                .collect();
            match actions {
                Some(actions) if !actions.is_empty() => {
                    let combination = NetworkActionCombination::new(actions);
                    if !predefined.contains(&combination) {
                        predefined.push(combination);
                    }
                }
                _ => debug!(combination = ?ids, "predefined combination not fully available"),
            }
        }

        let max_boundaries = params
            .topo
            .skip_actions_far_from_most_limiting_element
            .then_some(params.topo.max_number_of_boundaries_for_skipping_actions);

        Self {
            perimeter,
            network,
            country_graph: network.country_graph(),
            limits: params.ra_usage_limits_for(perimeter.main_state().instant()),
            predefined,
            max_depth: tree_parameters.maximum_search_depth,
            max_boundaries,
            pre_perimeter_setpoints,
        }
    }

    pub fn predefined_combinations(&self) -> &[NetworkActionCombination] {
        &self.predefined
    }

    /// Candidates to try on top of `leaf`, in evaluation order.
    pub fn bloom(&self, leaf: &Leaf) -> Vec<Candidate> {
        let mut candidates = self.generate();
        let steps: [(&str, fn(&Self, Vec<Candidate>, &Leaf) -> Vec<Candidate>); 9] = [
            ("already activated", Self::remove_already_activated),
            ("incompatible", Self::remove_incompatible),
            ("already tested", Self::remove_already_tested),
            ("search depth", Self::remove_too_deep),
            ("max_ra", Self::apply_max_ra),
            ("max_ra_per_tso", Self::apply_max_ra_per_tso),
            ("max_tso", Self::apply_max_tso),
            ("far from most limiting element", Self::remove_far),
            ("max_elementary_actions_per_tso", Self::apply_max_elementary_actions),
        ];
        for (name, filter) in steps {
            let before = candidates.len();
            candidates = filter(self, candidates, leaf);
            if candidates.len() < before {
                debug!(filter = name, removed = before - candidates.len(), "candidates filtered");
            }
        }
        Candidate::sort(&mut candidates);
        candidates
    }

    fn generate(&self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .predefined
            .iter()
            .map(|c| Candidate::new(c.clone(), true))
            .collect();
        let single_predefined: BTreeSet<&str> = self
            .predefined
            .iter()
            .filter(|c| c.len() == 1)
            .flat_map(|c| c.actions().iter().map(|a| a.id.as_str()))
            .collect();
        for na in self.perimeter.network_actions() {
            if !single_predefined.contains(na.id.as_str()) {
                candidates.push(Candidate::new(
                    NetworkActionCombination::single(na.clone()),
                    false,
                ));
            }
        }
        candidates
    }

    fn remove_already_activated(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let activated: BTreeSet<&str> = leaf.network_actions().iter().map(|a| a.id.as_str()).collect();
        candidates
            .into_iter()
            .filter(|c| c.combination.actions().iter().all(|a| !activated.contains(a.id.as_str())))
            .collect()
    }

    fn remove_incompatible(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| is_combination_compatible(c.combination.actions(), leaf.network_actions()))
            .collect()
    }

    /// A predefined combination missing a single action has already been
    /// tried as a whole; that action is not tried alone.
    fn remove_already_tested(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let activated: BTreeSet<&str> = leaf.network_actions().iter().map(|a| a.id.as_str()).collect();
        let mut tested: BTreeSet<&str> = BTreeSet::new();
        for combination in self.predefined.iter().filter(|c| !c.is_detected_during_rao() && c.len() > 1) {
            let remaining: Vec<&str> = combination
                .actions()
                .iter()
                .map(|a| a.id.as_str())
                .filter(|id| !activated.contains(id))
                .collect();
            if let [single] = remaining.as_slice() {
                tested.insert(*single);
            }
        }
        candidates
            .into_iter()
            .filter(|c| {
                c.combination.len() != 1
                    || !c.combination.actions().iter().any(|a| tested.contains(a.id.as_str()))
            })
            .collect()
    }

    fn remove_too_deep(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let activated = leaf.network_actions().len();
        candidates
            .into_iter()
            .filter(|c| activated + c.combination.len() <= self.max_depth)
            .collect()
    }

    fn activated_range_actions(&self, leaf: &Leaf) -> Vec<Arc<rao_core::RangeAction>> {
        leaf.activated_range_actions(self.perimeter, self.pre_perimeter_setpoints)
    }

    fn apply_max_ra(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let max_ra = self.limits.max_ra();
        let activated_na = leaf.network_actions().len();
        let activated_ra = self.activated_range_actions(leaf).len();
        candidates
            .into_iter()
            .filter_map(|mut c| {
                let size = c.combination.len();
                if activated_na + size > max_ra {
                    return None;
                }
                if activated_na + activated_ra + size > max_ra {
                    c.remove_range_actions = true;
                }
                Some(c)
            })
            .collect()
    }

    fn apply_max_ra_per_tso(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let activated_na = count_per_operator(leaf.network_actions().iter().map(|a| a.operator()));
        let activated_ra_list = self.activated_range_actions(leaf);
        let activated_ra = count_per_operator(activated_ra_list.iter().map(|a| a.operator()));
        candidates
            .into_iter()
            .filter_map(|mut c| {
                let combination = count_per_operator(c.combination.actions().iter().map(|a| a.operator()));
                for (operator, count) in combination {
                    let na = activated_na.get(operator).copied().unwrap_or(0);
                    let ra = activated_ra.get(operator).copied().unwrap_or(0);
                    let max_ra = self.limits.max_ra_for(operator);
                    let max_na = max_ra
                        .saturating_sub(na)
                        .min(self.limits.max_topo_for(operator).saturating_sub(na));
                    if count > max_na {
                        return None;
                    }
                    if na + ra + count > max_ra {
                        c.remove_range_actions = true;
                    }
                }
                Some(c)
            })
            .collect()
    }

    fn apply_max_tso(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let max_tso = self.limits.max_tso();
        let na_operators: BTreeSet<&str> = leaf.network_actions().iter().filter_map(|a| a.operator()).collect();
        let ra_list = self.activated_range_actions(leaf);
        let ra_operators: BTreeSet<&str> = ra_list.iter().filter_map(|a| a.operator()).collect();
        candidates
            .into_iter()
            .filter_map(|mut c| {
                let mut operators: BTreeSet<&str> = c.combination.operators();
                operators.extend(na_operators.iter().copied());
                if operators.len() > max_tso {
                    return None;
                }
                operators.extend(ra_operators.iter().copied());
                if operators.len() > max_tso {
                    c.remove_range_actions = true;
                }
                Some(c)
            })
            .collect()
    }

    fn remove_far(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        let Some(max_boundaries) = self.max_boundaries else {
            return candidates;
        };
        let Some(objective) = leaf.objective() else {
            return candidates;
        };
        let mut cnec_ids: BTreeSet<&str> = objective.most_limiting_elements(1).collect();
        for ids in objective.costly_elements.values() {
            cnec_ids.extend(ids.iter().map(String::as_str));
        }
        let mut locations: BTreeSet<Option<Country>> = BTreeSet::new();
        for cnec in self.perimeter.cnecs().iter().filter(|c| cnec_ids.contains(c.id.as_str())) {
            locations.extend(self.network.element_countries(&cnec.element));
        }
        if locations.is_empty() || locations.contains(&None) {
            return candidates;
        }
        let countries: Vec<Country> = locations.into_iter().flatten().collect();
        candidates
            .into_iter()
            .filter(|c| c.combination.actions().iter().any(|na| self.is_close(na, &countries, max_boundaries)))
            .collect()
    }

    fn is_close(&self, action: &NetworkAction, countries: &[Country], max_boundaries: usize) -> bool {
        let location = action.location(self.network);
        if location.contains(&None) {
            return true;
        }
        location.iter().flatten().any(|a| {
            countries
                .iter()
                .any(|b| self.country_graph.are_neighbors(a, b, max_boundaries))
        })
    }

    fn apply_max_elementary_actions(&self, candidates: Vec<Candidate>, leaf: &Leaf) -> Vec<Candidate> {
        if self.limits.max_elementary_actions_per_tso.is_empty() {
            return candidates;
        }
        let mut activated: BTreeMap<&str, usize> = BTreeMap::new();
        for na in leaf.network_actions() {
            if let Some(op) = na.operator() {
                *activated.entry(op).or_default() += na.elementary_actions.len();
            }
        }
        let moved_taps = leaf.moved_taps(self.perimeter, self.pre_perimeter_setpoints);
        candidates
            .into_iter()
            .filter_map(|mut c| {
                let mut per_operator = activated.clone();
                for na in c.combination.actions() {
                    if let Some(op) = na.operator() {
                        *per_operator.entry(op).or_default() += na.elementary_actions.len();
                    }
                }
                for operator in c.combination.operators() {
                    let limit = self.limits.max_elementary_actions_for(operator);
                    let count = per_operator.get(operator).copied().unwrap_or(0);
                    if count > limit {
                        return None;
                    }
                    if count + moved_taps.get(operator).copied().unwrap_or(0) > limit {
                        c.remove_range_actions = true;
                    }
                }
                Some(c)
            })
            .collect()
    }
}

fn count_per_operator<'o>(operators: impl Iterator<Item = Option<&'o str>>) -> BTreeMap<&'o str, usize> {
    let mut counts = BTreeMap::new();
    for operator in operators.flatten() {
        *counts.entry(operator).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applied::{AppliedRemedialActions, RangeActionSetpoints};
    use crate::linear::IteratingLinearOptimizer;
    use crate::objective::ObjectiveFunction;
    use crate::perimeter::{PerimeterBuilder, PrePerimeterResult};
    use crate::search_tree::SearchTreeInput;
    use crate::sensitivity::{LinearSensitivityProvider, SensitivityModel, SensitivityResult};
    use rao_core::{
        ActionType, Bus, Cnec, Crac, Edge, ElementId, ElementaryAction, Instant, Line, State,
        Switch, UsageMethod, UsageRule,
    };

    fn network() -> Network {
        let mut n = Network::new();
        for (bus, country) in [("fr", "FR"), ("be", "BE"), ("nl", "NL"), ("de", "DE")] {
            n.add_bus(Bus::new(bus, Some(country))).unwrap();
        }
        for (id, from, to) in [("fr-be", "fr", "be"), ("be-nl", "be", "nl"), ("nl-de", "nl", "de")] {
            n.add_edge(Edge::Line(Line {
                id: ElementId::new(id),
                from_bus: ElementId::new(from),
                to_bus: ElementId::new(to),
                connected: true,
            }))
            .unwrap();
        }
        for (id, bus) in [("s-fr", "fr"), ("s-be", "be"), ("s-de", "de"), ("s-fr2", "fr")] {
            n.add_edge(Edge::Switch(Switch {
                id: ElementId::new(id),
                from_bus: ElementId::new(bus),
                to_bus: ElementId::new(bus),
                open: false,
            }))
            .unwrap();
        }
        n
    }

    fn open(id: &str, switch: &str, operator: &str) -> NetworkAction {
        NetworkAction::new(
            id,
            vec![ElementaryAction::Topological {
                element: ElementId::new(switch),
                action_type: ActionType::Open,
            }],
        )
        .with_operator(operator)
        .with_usage_rule(UsageRule::OnInstant {
            instant: Instant::Preventive,
            usage_method: UsageMethod::Available,
        })
    }

    fn crac() -> Crac {
        Crac::new("bloomer")
            .with_cnec(Cnec::flow("cnec-fr", ElementId::new("fr-be"), State::preventive(), 100.0))
            .with_network_action(open("na-fr", "s-fr", "RTE"))
            .with_network_action(open("na-be", "s-be", "ELIA"))
            .with_network_action(open("na-de", "s-de", "TENNET"))
            .with_network_action(open("na-fr2", "s-fr2", "RTE"))
    }

    struct Fixture {
        network: Network,
        perimeter: OptimizationPerimeter,
        prior: PrePerimeterResult,
    }

    fn fixture() -> Fixture {
        let network = network();
        let crac = crac();
        let sensitivity = SensitivityResult {
            flows: BTreeMap::from([("cnec-fr".to_string(), 150.0)]),
            ..SensitivityResult::default()
        };
        let prior = PrePerimeterResult::from_network(&crac, &network, sensitivity);
        let perimeter = PerimeterBuilder::new(&crac, &network, &prior, &RaoParameters::default())
            .preventive(&BTreeSet::from([State::preventive()]))
            .unwrap();
        Fixture {
            network,
            perimeter,
            prior,
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<String> {
        candidates.iter().map(|c| c.combination.concatenated_id()).collect()
    }

    fn tree_params(depth: usize) -> TreeParameters {
        TreeParameters {
            maximum_search_depth: depth,
            ..TreeParameters::preventive(&RaoParameters::default())
        }
    }

    #[test]
    fn test_root_candidates_are_all_singles() {
        let f = fixture();
        let params = RaoParameters::default();
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        let root = Leaf::root(RangeActionSetpoints::new());
        assert_eq!(ids(&bloomer.bloom(&root)), vec!["na-be", "na-de", "na-fr", "na-fr2"]);
    }

    #[test]
    fn test_predefined_combinations_first_and_already_tested_removed() {
        let f = fixture();
        let mut params = RaoParameters::default();
        params.topo.predefined_combinations = vec![
            vec!["na-fr".into(), "na-be".into()],
            vec!["na-fr".into(), "unknown".into()],
        ];
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        assert_eq!(bloomer.predefined_combinations().len(), 1);
        let root = Leaf::root(RangeActionSetpoints::new());
        let candidates = bloomer.bloom(&root);
        assert_eq!(ids(&candidates)[0], "na-be + na-fr");
        assert!(candidates[0].predefined);

        let after_fr = Leaf::child(
            &root,
            &NetworkActionCombination::single(Arc::new(open("na-fr", "s-fr", "RTE"))),
            false,
            &RangeActionSetpoints::new(),
        );
        // na-be was tried together with na-fr already
        assert_eq!(ids(&bloomer.bloom(&after_fr)), vec!["na-de", "na-fr2"]);
    }

    #[test]
    fn test_depth_limits_combination_size() {
        let f = fixture();
        let mut params = RaoParameters::default();
        params.topo.predefined_combinations = vec![vec!["na-fr".into(), "na-be".into()]];
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(1), &[], f.prior.setpoints());
        let root = Leaf::root(RangeActionSetpoints::new());
        assert!(bloomer.bloom(&root).iter().all(|c| c.combination.len() == 1));
    }

    #[test]
    fn test_usage_limits() {
        let f = fixture();
        let mut params = RaoParameters::default();
        params.ra_usage_limits.insert(
            Instant::Preventive,
            RaUsageLimits {
                max_tso: Some(1),
                max_topo_per_tso: BTreeMap::from([("RTE".to_string(), 1)]),
                ..RaUsageLimits::default()
            },
        );
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        let root = Leaf::root(RangeActionSetpoints::new());
        let after_fr = Leaf::child(
            &root,
            &NetworkActionCombination::single(Arc::new(open("na-fr", "s-fr", "RTE"))),
            false,
            &RangeActionSetpoints::new(),
        );
        // a second RTE topology exceeds max_topo_per_tso, another operator exceeds max_tso
        assert!(bloomer.bloom(&after_fr).is_empty());
    }

    #[test]
    fn test_max_elementary_actions_per_tso() {
        let f = fixture();
        let mut params = RaoParameters::default();
        params.ra_usage_limits.insert(
            Instant::Preventive,
            RaUsageLimits {
                max_elementary_actions_per_tso: BTreeMap::from([("RTE".to_string(), 1)]),
                ..RaUsageLimits::default()
            },
        );
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        let root = Leaf::root(RangeActionSetpoints::new());
        let after_fr = Leaf::child(
            &root,
            &NetworkActionCombination::single(Arc::new(open("na-fr", "s-fr", "RTE"))),
            false,
            &RangeActionSetpoints::new(),
        );
        assert_eq!(ids(&bloomer.bloom(&after_fr)), vec!["na-be", "na-de"]);
    }

    /// Root leaf evaluated with "cnec-fr" as most limiting element.
    fn evaluated_root(f: &Fixture, params: &RaoParameters) -> Leaf {
        let model = SensitivityModel {
            reference_flows: BTreeMap::from([("cnec-fr".to_string(), 150.0)]),
            ..SensitivityModel::default()
        };
        let provider = LinearSensitivityProvider::new(model, &f.network, &[]).unwrap();
        let objective =
            ObjectiveFunction::new(f.perimeter.cnecs(), f.prior.sensitivity(), &params.virtual_costs);
        let optimizer = IteratingLinearOptimizer::default();
        let tree_parameters = tree_params(1);
        let none = AppliedRemedialActions::new();
        let input = SearchTreeInput {
            perimeter: &f.perimeter,
            network: &f.network,
            applied: &none,
            pre_perimeter: &f.prior,
            objective: &objective,
            provider: &provider,
            optimizer: &optimizer,
            params,
            tree_parameters: &tree_parameters,
            hints: &[],
            budget: None,
        };
        let mut root = Leaf::root(RangeActionSetpoints::new());
        root.evaluate(&input, &mut f.network.clone());
        root
    }

    #[test]
    fn test_actions_far_from_most_limiting_element_are_skipped() {
        let f = fixture();
        let mut params = RaoParameters::default();
        params.topo.skip_actions_far_from_most_limiting_element = true;
        params.topo.max_number_of_boundaries_for_skipping_actions = 1;
        let root = evaluated_root(&f, &params);
        let limiting: Vec<&str> = root.objective().unwrap().most_limiting_elements(1).collect();
        assert_eq!(limiting, vec!["cnec-fr"]);

        // DE is two borders away from the FR-BE line
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        assert_eq!(ids(&bloomer.bloom(&root)), vec!["na-be", "na-fr", "na-fr2"]);

        // not evaluated yet: nothing to be far from
        let unevaluated = Leaf::root(RangeActionSetpoints::new());
        assert_eq!(bloomer.bloom(&unevaluated).len(), 4);

        params.topo.max_number_of_boundaries_for_skipping_actions = 2;
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        assert_eq!(ids(&bloomer.bloom(&root)), vec!["na-be", "na-de", "na-fr", "na-fr2"]);

        params.topo.skip_actions_far_from_most_limiting_element = false;
        params.topo.max_number_of_boundaries_for_skipping_actions = 0;
        let bloomer = Bloomer::new(&f.perimeter, &f.network, &params, &tree_params(3), &[], f.prior.setpoints());
        assert_eq!(bloomer.bloom(&root).len(), 4);
    }

    #[test]
    fn test_candidate_sort_order() {
        let na = |id: &str| Arc::new(NetworkAction::new(id, vec![]));
        let mut candidates = vec![
            Candidate::new(NetworkActionCombination::single(na("z")), false),
            Candidate::new(NetworkActionCombination::new([na("b"), na("c")]), false),
            Candidate::new(NetworkActionCombination::single(na("a")), false),
            Candidate::new(NetworkActionCombination::single(na("y")), true),
            Candidate::new(NetworkActionCombination::single(na("x")).detected(), true),
        ];
        Candidate::sort(&mut candidates);
        assert_eq!(ids(&candidates), vec!["x", "y", "b + c", "a", "z"]);
    }
}
