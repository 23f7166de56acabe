use rao_core::{NetworkAction, RemedialAction};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Network actions tried together as one move of the search tree.
///
/// Actions are deduplicated and kept sorted by id.
#[derive(Debug, Clone)]
pub struct NetworkActionCombination {
    actions: Vec<Arc<NetworkAction>>,
    /// Built from the actions selected by a previous optimization
    detected_during_rao: bool,
}

impl NetworkActionCombination {
    pub fn new(actions: impl IntoIterator<Item = Arc<NetworkAction>>) -> Self {
        let mut actions: Vec<Arc<NetworkAction>> = actions.into_iter().collect();
        actions.sort_by(|a, b| a.id.cmp(&b.id));
        actions.dedup_by(|a, b| a.id == b.id);
        Self {
            actions,
            detected_during_rao: false,
        }
    }

    pub fn single(action: Arc<NetworkAction>) -> Self {
        Self::new([action])
    }

    pub fn detected(mut self) -> Self {
        self.detected_during_rao = true;
        self
    }

    pub fn actions(&self) -> &[Arc<NetworkAction>] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_detected_during_rao(&self) -> bool {
        self.detected_during_rao
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.iter().any(|a| a.id == id)
    }

    /// Concatenated ids, used for deterministic ordering.
    pub fn concatenated_id(&self) -> String {
        self.actions
            .iter()
            .map(|a| a.id.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    pub fn operators(&self) -> BTreeSet<&str> {
        self.actions.iter().filter_map(|a| a.operator()).collect()
    }

    pub fn ids(&self) -> BTreeSet<&str> {
        self.actions.iter().map(|a| a.id.as_str()).collect()
    }
}

impl PartialEq for NetworkActionCombination {
    fn eq(&self, other: &Self) -> bool {
        self.ids() == other.ids()
    }
}

impl Eq for NetworkActionCombination {}

#[cfg(test)]
mod tests {
    use super::*;

    fn na(id: &str, operator: Option<&str>) -> Arc<NetworkAction> {
        let mut action = NetworkAction::new(id, vec![]);
        action.operator = operator.map(str::to_string);
        Arc::new(action)
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let combination = NetworkActionCombination::new([
            na("b", Some("RTE")),
            na("a", None),
            na("b", Some("RTE")),
        ]);
        assert_eq!(combination.len(), 2);
        assert_eq!(combination.concatenated_id(), "a + b");
        assert_eq!(combination.operators(), BTreeSet::from(["RTE"]));
        assert!(!combination.is_detected_during_rao());
        assert!(combination.clone().detected().is_detected_during_rao());
    }

    #[test]
    fn test_equality_ignores_order() {
        let x = NetworkActionCombination::new([na("a", None), na("b", None)]);
        let y = NetworkActionCombination::new([na("b", None), na("a", None)]);
        assert_eq!(x, y);
        assert!(x.contains("a"));
    }
}
