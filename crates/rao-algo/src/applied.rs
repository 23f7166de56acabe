//! Remedial actions already decided for later states, and range-action
//! setpoints keyed by state.

use rao_core::{Network, NetworkAction, RangeAction, RaoResult, State};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Range-action setpoints per state, by range-action id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeActionSetpoints {
    per_state: BTreeMap<State, BTreeMap<String, f64>>,
}

impl RangeActionSetpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, state: &State, range_action: &str) -> Option<f64> {
        self.per_state.get(state)?.get(range_action).copied()
    }

    pub fn set(&mut self, state: &State, range_action: impl Into<String>, setpoint: f64) {
        self.per_state
            .entry(state.clone())
            .or_default()
            .insert(range_action.into(), setpoint);
    }

    pub fn for_state(&self, state: &State) -> Option<&BTreeMap<String, f64>> {
        self.per_state.get(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&State, &str, f64)> {
        self.per_state
            .iter()
            .flat_map(|(state, m)| m.iter().map(move |(id, v)| (state, id.as_str(), *v)))
    }

    pub fn is_empty(&self) -> bool {
        self.per_state.values().all(BTreeMap::is_empty)
    }

    /// Largest absolute difference with `other` over the setpoints of `self`.
    ///
    /// A setpoint missing from `other` counts as an infinite change.
    pub fn max_difference(&self, other: &RangeActionSetpoints) -> f64 {
        self.iter()
            .map(|(state, id, v)| match other.get(state, id) {
                Some(o) => (v - o).abs(),
                None => f64::INFINITY,
            })
            .fold(0.0, f64::max)
    }
}

impl Serialize for RangeActionSetpoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.per_state.len()))?;
        for (state, setpoints) in &self.per_state {
            map.serialize_entry(&state.id(), setpoints)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default)]
struct StateActions {
    network_actions: Vec<Arc<NetworkAction>>,
    range_actions: Vec<(Arc<RangeAction>, f64)>,
}

/// Actions to apply on top of a network when looking at post-contingency states.
///
/// An action recorded for a state applies to that state and to every later
/// state of the same contingency. Preventive actions are expected to be on
/// the network already and are never recorded here.
#[derive(Debug, Clone, Default)]
pub struct AppliedRemedialActions {
    per_state: BTreeMap<State, StateActions>,
}

impl AppliedRemedialActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network_action(&mut self, state: &State, action: Arc<NetworkAction>) {
        if state.is_preventive() {
            return;
        }
        self.per_state
            .entry(state.clone())
            .or_default()
            .network_actions
            .push(action);
    }

    pub fn add_range_action(&mut self, state: &State, action: Arc<RangeAction>, setpoint: f64) {
        if state.is_preventive() {
            return;
        }
        let entry = self.per_state.entry(state.clone()).or_default();
        entry.range_actions.retain(|(ra, _)| ra.id != action.id);
        entry.range_actions.push((action, setpoint));
    }

    pub fn is_empty(&self) -> bool {
        self.per_state
            .values()
            .all(|a| a.network_actions.is_empty() && a.range_actions.is_empty())
    }

    pub fn network_actions(&self, state: &State) -> &[Arc<NetworkAction>] {
        self.per_state
            .get(state)
            .map(|a| a.network_actions.as_slice())
            .unwrap_or(&[])
    }

    /// Every action recorded for `state` and the states of the same
    /// contingency preceding it, in chronological order.
    pub fn apply_for(&self, network: &mut Network, state: &State) -> RaoResult<()> {
        let Some(contingency) = state.contingency() else {
            return Ok(());
        };
        let relevant = self.per_state.iter().filter(|(s, _)| {
            s.contingency() == Some(contingency) && s.instant() <= state.instant()
        });
        for (_, actions) in relevant {
            for na in &actions.network_actions {
                network.apply_network_action(na)?;
            }
            for (ra, setpoint) in &actions.range_actions {
                network.apply_range_action(ra, *setpoint)?;
            }
        }
        Ok(())
    }

    /// Merge `other` in; entries of `other` win for range actions set in both.
    pub fn extend(&mut self, other: &AppliedRemedialActions) {
        for (state, actions) in &other.per_state {
            for na in &actions.network_actions {
                self.add_network_action(state, na.clone());
            }
            for (ra, setpoint) in &actions.range_actions {
                self.add_range_action(state, ra.clone(), *setpoint);
            }
        }
    }
}
