//! Split of the study states into the perimeters that optimize them.
//!
//! States without any usable remedial action are monitored by the preventive
//! perimeter (the *basecase scenario*). Every contingency whose auto or
//! curative states do have remedial actions forms a *contingency scenario*,
//! optimized after the preventive perimeter as an auto-then-curative cascade.

use rao_core::{Contingency, Crac, Instant, State};
use std::collections::BTreeSet;

/// States secured by the preventive perimeter.
#[derive(Debug, Clone)]
pub struct BasecaseScenario {
    basecase: State,
    other_states: BTreeSet<State>,
}

impl BasecaseScenario {
    pub fn basecase(&self) -> &State {
        &self.basecase
    }

    pub fn other_states(&self) -> &BTreeSet<State> {
        &self.other_states
    }

    /// The preventive state and every other state of the scenario.
    pub fn all_states(&self) -> BTreeSet<State> {
        let mut states = self.other_states.clone();
        states.insert(self.basecase.clone());
        states
    }
}

/// Auto and curative states of one contingency, in chronological order.
#[derive(Debug, Clone)]
pub struct ContingencyScenario {
    contingency: Contingency,
    auto_state: Option<State>,
    curative_states: Vec<State>,
}

impl ContingencyScenario {
    pub fn contingency(&self) -> &Contingency {
        &self.contingency
    }

    pub fn auto_state(&self) -> Option<&State> {
        self.auto_state.as_ref()
    }

    pub fn curative_states(&self) -> &[State] {
        &self.curative_states
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.auto_state.iter().chain(self.curative_states.iter())
    }
}

#[derive(Debug, Clone)]
pub struct StateTree {
    basecase: BasecaseScenario,
    contingency_scenarios: Vec<ContingencyScenario>,
}

impl StateTree {
    pub fn build(crac: &Crac) -> Self {
        let mut other_states = BTreeSet::new();
        let mut contingency_scenarios = Vec::new();

        for contingency in &crac.contingencies {
            let mut auto_state = None;
            let mut curative_states = Vec::new();
            for state in crac.states_of_contingency(&contingency.id) {
                let optimizable = state.instant().can_activate_remedial_actions()
                    && crac.has_remedial_actions_for(&state);
                match state.instant() {
                    Instant::Auto if optimizable => auto_state = Some(state),
                    Instant::Curative(_) if optimizable => curative_states.push(state),
                    _ => {
                        other_states.insert(state);
                    }
                }
            }
            if auto_state.is_some() || !curative_states.is_empty() {
                contingency_scenarios.push(ContingencyScenario {
                    contingency: contingency.clone(),
                    auto_state,
                    curative_states,
                });
            }
        }

        Self {
            basecase: BasecaseScenario {
                basecase: State::preventive(),
                other_states,
            },
            contingency_scenarios,
        }
    }

    pub fn basecase_scenario(&self) -> &BasecaseScenario {
        &self.basecase
    }

    pub fn contingency_scenarios(&self) -> &[ContingencyScenario] {
        &self.contingency_scenarios
    }

    /// Every state optimized after the preventive perimeter.
    pub fn optimized_post_contingency_states(&self) -> BTreeSet<State> {
        self.contingency_scenarios
            .iter()
            .flat_map(|s| s.states().cloned())
            .collect()
    }
}
