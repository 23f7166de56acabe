//! Pairwise compatibility of discrete actions.
//!
//! Two elementary actions conflict when they drive the same target to
//! different outcomes. Network actions are compatible when no pair of their
//! elementary actions conflicts.

use rao_core::{ElementaryAction, NetworkAction};
use std::sync::Arc;

const SETPOINT_TOLERANCE: f64 = 1e-6;

/// Whether two elementary actions can be applied together.
///
/// Symmetric in its arguments.
pub fn are_elementary_actions_compatible(a: &ElementaryAction, b: &ElementaryAction) -> bool {
    use ElementaryAction::*;
    match (a, b) {
        (
            Topological {
                element: e1,
                action_type: t1,
            },
            Topological {
                element: e2,
                action_type: t2,
            },
        ) => e1 != e2 || t1 == t2,
        (
            Topological {
                element,
                action_type,
            },
            SwitchPair {
                switch_to_open,
                switch_to_close,
            },
        )
        | (
            SwitchPair {
                switch_to_open,
                switch_to_close,
            },
            Topological {
                element,
                action_type,
            },
        ) => {
            if action_type.is_open() {
                element != switch_to_close
            } else {
                element != switch_to_open
            }
        }
        (
            SwitchPair {
                switch_to_open: o1,
                switch_to_close: c1,
            },
            SwitchPair {
                switch_to_open: o2,
                switch_to_close: c2,
            },
        ) => {
            let identical = o1 == o2 && c1 == c2;
            let disjoint = o1 != o2 && o1 != c2 && c1 != o2 && c1 != c2;
            identical || disjoint
        }
        (PstSetpoint { element: e1, tap: t1 }, PstSetpoint { element: e2, tap: t2 }) => {
            e1 != e2 || t1 == t2
        }
        (
            InjectionSetpoint {
                element: e1,
                setpoint: s1,
            },
            InjectionSetpoint {
                element: e2,
                setpoint: s2,
            },
        ) => e1 != e2 || (s1 - s2).abs() < SETPOINT_TOLERANCE,
        (Topological { .. }, PstSetpoint { .. } | InjectionSetpoint { .. })
        | (PstSetpoint { .. } | InjectionSetpoint { .. }, Topological { .. })
        | (SwitchPair { .. }, PstSetpoint { .. } | InjectionSetpoint { .. })
        | (PstSetpoint { .. } | InjectionSetpoint { .. }, SwitchPair { .. })
        | (PstSetpoint { .. }, InjectionSetpoint { .. })
        | (InjectionSetpoint { .. }, PstSetpoint { .. }) => true,
    }
}

/// Whether every elementary action of `a` is compatible with every one of `b`.
pub fn are_network_actions_compatible(a: &NetworkAction, b: &NetworkAction) -> bool {
    a.elementary_actions.iter().all(|ea| {
        b.elementary_actions
            .iter()
            .all(|eb| are_elementary_actions_compatible(ea, eb))
    })
}

/// Whether the elementary actions of a single network action agree with each other.
pub fn is_network_action_consistent(action: &NetworkAction) -> bool {
    let actions = &action.elementary_actions;
    actions.iter().enumerate().all(|(i, ea)| {
        actions[i + 1..]
            .iter()
            .all(|eb| are_elementary_actions_compatible(ea, eb))
    })
}

/// Whether `candidates` can all be applied on top of `applied`, and together.
pub fn is_combination_compatible(
    candidates: &[Arc<NetworkAction>],
    applied: &[Arc<NetworkAction>],
) -> bool {
    candidates.iter().enumerate().all(|(i, na)| {
        applied
            .iter()
            .chain(candidates[i + 1..].iter())
            .all(|other| are_network_actions_compatible(na, other))
    })
}
