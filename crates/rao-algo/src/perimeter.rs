//! Optimization perimeters: the states, Cnecs and remedial actions one search
//! tree works on.
//!
//! A perimeter is built once per stage by [`PerimeterBuilder`] and is
//! immutable afterwards. Building applies every admissibility rule up front:
//! usage rules, operator exclusions, applicability on the network, range
//! bounds and alignment groups. Remedial actions that fail a rule are logged
//! and left out; only an inconsistent request is an error.

use crate::compatibility::is_network_action_consistent;
use crate::parameters::{RaUsageLimits, RaoParameters};
use crate::sensitivity::SensitivityResult;
use crate::state_tree::StateTree;
use rao_core::{
    Cnec, Crac, Instant, NetworkAction, RangeAction, RaoError, RaoResult, RemedialAction,
    State, UsageMethod, UsageRule,
};
use rao_core::Network;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tolerance under which aligned range actions share a setpoint.
pub const GROUP_SETPOINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerimeterKind {
    Preventive,
    Auto,
    Curative,
    /// Preventive state optimized together with the curative states
    Global,
}

/// Network situation at the start of a perimeter.
#[derive(Debug, Clone)]
pub struct PrePerimeterResult {
    sensitivity: SensitivityResult,
    setpoints: BTreeMap<String, f64>,
}

impl PrePerimeterResult {
    pub fn new(sensitivity: SensitivityResult, setpoints: BTreeMap<String, f64>) -> Self {
        Self {
            sensitivity,
            setpoints,
        }
    }

    /// Read the setpoint of every range action of `crac` from `network`.
    pub fn from_network(crac: &Crac, network: &Network, sensitivity: SensitivityResult) -> Self {
        let setpoints = crac
            .range_actions
            .iter()
            .filter_map(|ra| {
                network
                    .range_action_setpoint(ra)
                    .ok()
                    .map(|v| (ra.id.clone(), v))
            })
            .collect();
        Self::new(sensitivity, setpoints)
    }

    pub fn sensitivity(&self) -> &SensitivityResult {
        &self.sensitivity
    }

    pub fn setpoint(&self, range_action: &str) -> Option<f64> {
        self.setpoints.get(range_action).copied()
    }

    pub fn setpoints(&self) -> &BTreeMap<String, f64> {
        &self.setpoints
    }

    pub fn margin(&self, cnec: &Cnec) -> Option<f64> {
        self.sensitivity.margin(cnec)
    }
}

/// Unit of work of one search tree.
#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    kind: PerimeterKind,
    main_state: State,
    monitored_states: BTreeSet<State>,
    cnecs: Vec<Cnec>,
    network_actions: Vec<Arc<NetworkAction>>,
    range_actions: BTreeMap<State, Vec<Arc<RangeAction>>>,
}

impl OptimizationPerimeter {
    pub fn kind(&self) -> PerimeterKind {
        self.kind
    }

    pub fn main_state(&self) -> &State {
        &self.main_state
    }

    pub fn monitored_states(&self) -> &BTreeSet<State> {
        &self.monitored_states
    }

    pub fn cnecs(&self) -> &[Cnec] {
        &self.cnecs
    }

    pub fn optimized_cnecs(&self) -> impl Iterator<Item = &Cnec> {
        self.cnecs.iter().filter(|c| c.optimized)
    }

    pub fn network_actions(&self) -> &[Arc<NetworkAction>] {
        &self.network_actions
    }

    pub fn range_actions_per_state(&self) -> &BTreeMap<State, Vec<Arc<RangeAction>>> {
        &self.range_actions
    }

    pub fn range_actions_for(&self, state: &State) -> &[Arc<RangeAction>] {
        self.range_actions
            .get(state)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every range action of the perimeter once, whatever its states.
    pub fn range_actions(&self) -> Vec<Arc<RangeAction>> {
        let mut seen = BTreeSet::new();
        self.range_actions
            .values()
            .flatten()
            .filter(|ra| seen.insert(ra.id.clone()))
            .cloned()
            .collect()
    }

    pub fn has_range_actions(&self) -> bool {
        self.range_actions.values().any(|v| !v.is_empty())
    }

    pub fn has_network_actions(&self) -> bool {
        !self.network_actions.is_empty()
    }
}

/// Builds perimeters from the Crac, a network snapshot and the pre-perimeter result.
pub struct PerimeterBuilder<'a> {
    crac: &'a Crac,
    network: &'a Network,
    prior: &'a PrePerimeterResult,
    params: &'a RaoParameters,
}

impl<'a> PerimeterBuilder<'a> {
    pub fn new(
        crac: &'a Crac,
        network: &'a Network,
        prior: &'a PrePerimeterResult,
        params: &'a RaoParameters,
    ) -> Self {
        Self {
            crac,
            network,
            prior,
            params,
        }
    }

    /// Preventive perimeter monitoring `states` (which must include the preventive state).
    pub fn preventive(&self, states: &BTreeSet<State>) -> RaoResult<OptimizationPerimeter> {
        let main = State::preventive();
        self.build(PerimeterKind::Preventive, &main, states, std::slice::from_ref(&main))
    }

    /// Auto perimeter: forced network actions only.
    pub fn auto(&self, state: &State) -> RaoResult<OptimizationPerimeter> {
        if !state.instant().is_auto() {
            return Err(RaoError::Config(format!("'{state}' is not an auto state")));
        }
        self.build(PerimeterKind::Auto, state, &BTreeSet::from([state.clone()]), &[])
    }

    pub fn curative(&self, state: &State) -> RaoResult<OptimizationPerimeter> {
        if !state.instant().is_curative() {
            return Err(RaoError::Config(format!("'{state}' is not a curative state")));
        }
        self.build(
            PerimeterKind::Curative,
            state,
            &BTreeSet::from([state.clone()]),
            std::slice::from_ref(state),
        )
    }

    /// Preventive state optimized jointly with `curative_states`.
    pub fn global(
        &self,
        basecase_states: &BTreeSet<State>,
        curative_states: &BTreeSet<State>,
    ) -> RaoResult<OptimizationPerimeter> {
        let main = State::preventive();
        let mut states = basecase_states.clone();
        states.extend(curative_states.iter().cloned());
        let mut range_action_states = vec![main.clone()];
        range_action_states.extend(curative_states.iter().filter(|s| s.instant().is_curative()).cloned());
        self.build(PerimeterKind::Global, &main, &states, &range_action_states)
    }

    fn build(
        &self,
        kind: PerimeterKind,
        main_state: &State,
        states: &BTreeSet<State>,
        range_action_states: &[State],
    ) -> RaoResult<OptimizationPerimeter> {
        if !main_state.instant().can_activate_remedial_actions() {
            return Err(RaoError::Config(format!(
                "no remedial action can be optimized at '{main_state}'"
            )));
        }
        if !states.contains(main_state) {
            return Err(RaoError::Config(format!(
                "perimeter of '{main_state}' does not monitor its own state"
            )));
        }
        let known = self.crac.states();
        if let Some(unknown) = states.iter().find(|s| !known.contains(s)) {
            return Err(RaoError::Config(format!("state '{unknown}' is not part of the Crac")));
        }

        let failed = &self.prior.sensitivity().failed_states;
        let monitored_states: BTreeSet<State> = states
            .iter()
            .filter(|s| {
                let ok = !failed.contains(*s);
                if !ok {
                    warn!(state = %s, "sensitivity failed for state, it is not monitored in this perimeter");
                }
                ok
            })
            .cloned()
            .collect();

        let cnecs: Vec<Cnec> = self
            .crac
            .cnecs
            .iter()
            .filter(|c| monitored_states.contains(&c.state))
            .cloned()
            .collect();

        let network_actions = self.network_actions(kind, main_state, &cnecs);

        let mut range_actions = BTreeMap::new();
        if kind != PerimeterKind::Auto {
            for state in range_action_states {
                let available = self.range_actions(kind, state, &cnecs);
                if !available.is_empty() {
                    range_actions.insert(state.clone(), available);
                }
            }
        }

        debug!(
            main_state = %main_state,
            ?kind,
            states = monitored_states.len(),
            cnecs = cnecs.len(),
            network_actions = network_actions.len(),
            range_actions = range_actions.values().map(Vec::len).sum::<usize>(),
            "built optimization perimeter"
        );

        Ok(OptimizationPerimeter {
            kind,
            main_state: main_state.clone(),
            monitored_states,
            cnecs,
            network_actions,
            range_actions,
        })
    }

    fn excluded_from_second_preventive(&self, kind: PerimeterKind, id: &str) -> bool {
        kind == PerimeterKind::Global
            && self
                .params
                .second_preventive
                .ra_ids_excluded_from_second_preventive
                .contains(id)
    }

    fn network_actions(
        &self,
        kind: PerimeterKind,
        state: &State,
        cnecs: &[Cnec],
    ) -> Vec<Arc<NetworkAction>> {
        let limits = self.params.ra_usage_limits_for(state.instant());
        let mut actions = Vec::new();
        for na in &self.crac.network_actions {
            if !is_remedial_action_available(na, state, self.crac, self.network, self.prior, cnecs, &limits)
                || self.excluded_from_second_preventive(kind, &na.id)
            {
                continue;
            }
            if !is_network_action_consistent(na) {
                warn!(action = %na.id, "network action contradicts itself and is filtered out");
                continue;
            }
            if !na.can_be_applied(self.network) {
                warn!(action = %na.id, state = %state, "network action cannot be applied and is filtered out");
                continue;
            }
            if !na.has_impact_on_network(self.network) {
                warn!(action = %na.id, state = %state, "network action has no impact and is filtered out");
                continue;
            }
            actions.push(Arc::new(na.clone()));
        }
        actions
    }

    fn range_actions(
        &self,
        kind: PerimeterKind,
        state: &State,
        cnecs: &[Cnec],
    ) -> Vec<Arc<RangeAction>> {
        let limits = self.params.ra_usage_limits_for(state.instant());
        let mut kept: Vec<(&RangeAction, f64)> = Vec::new();
        for ra in &self.crac.range_actions {
            if !is_remedial_action_available(ra, state, self.crac, self.network, self.prior, cnecs, &limits)
                || self.excluded_from_second_preventive(kind, &ra.id)
            {
                continue;
            }
            let setpoint = match self
                .prior
                .setpoint(&ra.id)
                .map(Ok)
                .unwrap_or_else(|| self.network.range_action_setpoint(ra))
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(action = %ra.id, error = %e, "range action setpoint unknown, filtered out");
                    continue;
                }
            };
            let (min, max) = (
                ra.min_admissible_setpoint(setpoint),
                ra.max_admissible_setpoint(setpoint),
            );
            if setpoint < min || setpoint > max {
                warn!(
                    action = %ra.id,
                    setpoint,
                    min,
                    max,
                    "range action initial setpoint is out of its admissible range, filtered out"
                );
                continue;
            }
            kept.push((ra, setpoint));
        }

        let mut group_setpoints: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (ra, setpoint) in &kept {
            if let Some(group) = ra.group_id.as_deref() {
                group_setpoints.entry(group).or_default().push(*setpoint);
            }
        }
        let misaligned: BTreeSet<&str> = group_setpoints
            .iter()
            .filter(|(_, values)| {
                let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                hi - lo > GROUP_SETPOINT_TOLERANCE
            })
            .map(|(group, _)| *group)
            .collect();
        for group in &misaligned {
            warn!(group = %group, state = %state, "aligned range actions have different setpoints, group filtered out");
        }

        kept.into_iter()
            .filter(|(ra, _)| !ra.group_id.as_deref().is_some_and(|g| misaligned.contains(g)))
            .map(|(ra, _)| Arc::new(ra.clone()))
            .collect()
    }
}

/// Build the perimeter optimizing `state`.
///
/// A preventive state yields the preventive perimeter monitoring the whole
/// basecase scenario.
pub fn build_perimeter(
    state: &State,
    crac: &Crac,
    network: &Network,
    prior: &PrePerimeterResult,
    params: &RaoParameters,
) -> RaoResult<OptimizationPerimeter> {
    let builder = PerimeterBuilder::new(crac, network, prior, params);
    match state.instant() {
        Instant::Preventive => {
            let tree = StateTree::build(crac);
            builder.preventive(&tree.basecase_scenario().all_states())
        }
        Instant::Outage => Err(RaoError::Config(format!(
            "no perimeter can be built for outage state '{state}'"
        ))),
        Instant::Auto => builder.auto(state),
        Instant::Curative(_) => builder.curative(state),
    }
}

fn is_cnec_relevant(cnec: &Cnec, state: &State) -> bool {
    state.is_preventive() || cnec.state.contingency() == state.contingency()
}

fn is_overloaded(cnec: &Cnec, prior: &PrePerimeterResult) -> bool {
    prior.margin(cnec).is_some_and(|m| m <= 0.0)
}

/// Whether `rule` applies in `state`.
fn rule_applies(
    rule: &UsageRule,
    state: &State,
    crac: &Crac,
    network: &Network,
    prior: &PrePerimeterResult,
    cnecs: &[Cnec],
) -> bool {
    match rule {
        UsageRule::OnInstant { instant, .. } => *instant == state.instant(),
        UsageRule::OnContingencyState { .. } => rule.state().as_ref() == Some(state),
        UsageRule::OnFlowConstraint { instant, cnec, .. } => {
            *instant == state.instant()
                && crac
                    .cnec(cnec)
                    .is_some_and(|c| is_cnec_relevant(c, state) && is_overloaded(c, prior))
        }
        UsageRule::OnFlowConstraintInCountry {
            instant, country, ..
        } => {
            *instant == state.instant()
                && cnecs.iter().any(|c| {
                    is_cnec_relevant(c, state)
                        && network.element_countries(&c.element).contains(&Some(country.clone()))
                        && is_overloaded(c, prior)
                })
        }
    }
}

/// Whether a remedial action may be used in `state`.
///
/// The strongest usage method among applicable rules must be `Forced` at
/// the auto instant and `Available` elsewhere; actions of excluded
/// operators are never available.
pub fn is_remedial_action_available<A: RemedialAction + ?Sized>(
    action: &A,
    state: &State,
    crac: &Crac,
    network: &Network,
    prior: &PrePerimeterResult,
    cnecs: &[Cnec],
    limits: &RaUsageLimits,
) -> bool {
    if limits.is_operator_excluded(action.operator()) {
        debug!(action = action.id(), "operator excluded at this instant");
        return false;
    }
    let strongest = UsageMethod::strongest(
        action
            .usage_rules()
            .iter()
            .filter(|rule| rule_applies(rule, state, crac, network, prior, cnecs))
            .map(UsageRule::usage_method),
    );
    let expected = if state.instant().is_auto() {
        UsageMethod::Forced
    } else {
        UsageMethod::Available
    };
    strongest == Some(expected)
}
