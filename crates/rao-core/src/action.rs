//! Remedial actions: discrete network actions and continuous range actions.
//!
//! A [`NetworkAction`] is an atomic bundle of [`ElementaryAction`]s (switch
//! flips, tap or setpoint changes) that is either fully applied or not at all.
//! A [`RangeAction`] moves one continuous quantity inside an admissible
//! interval. Both carry [`UsageRule`]s telling in which states they may be
//! used, and both expose the common [`RemedialAction`] interface consumed by
//! the perimeter builder.

use crate::network::Network;
use crate::state::{Instant, State};
use crate::{ContingencyId, Country, ElementId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tolerance used when deciding whether a setpoint action changes anything.
pub const SETPOINT_IMPACT_EPSILON: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Open,
    Close,
}

impl ActionType {
    #[inline]
    pub fn is_open(self) -> bool {
        self == ActionType::Open
    }
}

/// Smallest atomic effect of a network action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementaryAction {
    /// Open or close a switchable element (switch, line, PST, HVDC link)
    Topological {
        element: ElementId,
        action_type: ActionType,
    },
    /// Move a phase-shifting transformer to a fixed tap
    PstSetpoint { element: ElementId, tap: i32 },
    /// Fix the setpoint of an injection or HVDC link (MW or sections)
    InjectionSetpoint { element: ElementId, setpoint: f64 },
    /// Swap two switches: open one, close the other
    SwitchPair {
        switch_to_open: ElementId,
        switch_to_close: ElementId,
    },
}

impl ElementaryAction {
    pub fn network_elements(&self) -> Vec<&ElementId> {
        match self {
            ElementaryAction::Topological { element, .. }
            | ElementaryAction::PstSetpoint { element, .. }
            | ElementaryAction::InjectionSetpoint { element, .. } => vec![element],
            ElementaryAction::SwitchPair {
                switch_to_open,
                switch_to_close,
            } => vec![switch_to_open, switch_to_close],
        }
    }

    /// Whether the action makes sense on `network` as it currently stands.
    ///
    /// A switch pair needs exactly one of its switches open; a PST tap must
    /// lie inside the transformer's tap range.
    pub fn can_be_applied(&self, network: &Network) -> bool {
        match self {
            ElementaryAction::Topological { element, .. } => network.is_open(element).is_ok(),
            ElementaryAction::PstSetpoint { element, tap } => network
                .pst_tap_range(element)
                .map(|(low, high)| (low..=high).contains(tap))
                .unwrap_or(false),
            ElementaryAction::InjectionSetpoint { element, .. } => {
                network.setpoint(element).is_ok()
            }
            ElementaryAction::SwitchPair {
                switch_to_open,
                switch_to_close,
            } => match (
                network.is_switch_open(switch_to_open),
                network.is_switch_open(switch_to_close),
            ) {
                (Ok(first), Ok(second)) => first != second,
                _ => false,
            },
        }
    }

    /// Whether applying the action would change `network`.
    pub fn has_impact_on_network(&self, network: &Network) -> bool {
        match self {
            ElementaryAction::Topological {
                element,
                action_type,
            } => network
                .is_open(element)
                .map(|open| open != action_type.is_open())
                .unwrap_or(false),
            ElementaryAction::PstSetpoint { element, tap } => network
                .pst_tap(element)
                .map(|current| current != *tap)
                .unwrap_or(false),
            ElementaryAction::InjectionSetpoint { element, setpoint } => network
                .setpoint(element)
                .map(|current| (current - setpoint).abs() >= SETPOINT_IMPACT_EPSILON)
                .unwrap_or(false),
            ElementaryAction::SwitchPair {
                switch_to_open,
                switch_to_close,
            } => {
                matches!(network.is_switch_open(switch_to_open), Ok(false))
                    || matches!(network.is_switch_open(switch_to_close), Ok(true))
            }
        }
    }
}

/// How a remedial action may be used when its rule applies.
///
/// Ordered by strength: when several rules apply to the same state the
/// strongest method wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UsageMethod {
    #[default]
    Available,
    Forced,
    Unavailable,
}

impl UsageMethod {
    pub fn strongest(methods: impl IntoIterator<Item = UsageMethod>) -> Option<UsageMethod> {
        methods.into_iter().max()
    }
}

/// Condition under which a remedial action may be activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageRule {
    /// Usable in every state of the instant
    OnInstant {
        instant: Instant,
        #[serde(default)]
        usage_method: UsageMethod,
    },
    /// Usable only after one contingency at one instant
    OnContingencyState {
        contingency: ContingencyId,
        instant: Instant,
        #[serde(default)]
        usage_method: UsageMethod,
    },
    /// Usable at the instant when the given Cnec is overloaded
    OnFlowConstraint {
        instant: Instant,
        cnec: String,
        #[serde(default)]
        usage_method: UsageMethod,
    },
    /// Usable at the instant when a Cnec located in the country is overloaded
    OnFlowConstraintInCountry {
        instant: Instant,
        country: Country,
        #[serde(default)]
        usage_method: UsageMethod,
    },
}

impl UsageRule {
    pub fn instant(&self) -> Instant {
        match self {
            UsageRule::OnInstant { instant, .. }
            | UsageRule::OnContingencyState { instant, .. }
            | UsageRule::OnFlowConstraint { instant, .. }
            | UsageRule::OnFlowConstraintInCountry { instant, .. } => *instant,
        }
    }

    pub fn usage_method(&self) -> UsageMethod {
        match self {
            UsageRule::OnInstant { usage_method, .. }
            | UsageRule::OnContingencyState { usage_method, .. }
            | UsageRule::OnFlowConstraint { usage_method, .. }
            | UsageRule::OnFlowConstraintInCountry { usage_method, .. } => *usage_method,
        }
    }

    /// The state the rule is pinned to, if it is a contingency-state rule.
    pub fn state(&self) -> Option<State> {
        match self {
            UsageRule::OnContingencyState {
                contingency,
                instant,
                ..
            } => State::post_contingency(contingency.clone(), *instant).ok(),
            _ => None,
        }
    }
}

/// Behaviour shared by network and range actions.
pub trait RemedialAction {
    fn id(&self) -> &str;

    fn operator(&self) -> Option<&str>;

    fn usage_rules(&self) -> &[UsageRule];

    fn network_elements(&self) -> Vec<&ElementId>;

    /// Countries the action acts upon; `None` marks an element without a
    /// known country.
    fn location(&self, network: &Network) -> BTreeSet<Option<Country>> {
        self.network_elements()
            .into_iter()
            .flat_map(|element| network.element_countries(element))
            .collect()
    }
}

/// Discrete remedial action: elementary actions applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operator: Option<String>,
    pub elementary_actions: Vec<ElementaryAction>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRule>,
}

impl NetworkAction {
    pub fn new(id: impl Into<String>, elementary_actions: Vec<ElementaryAction>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            operator: None,
            elementary_actions,
            usage_rules: Vec::new(),
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_usage_rule(mut self, rule: UsageRule) -> Self {
        self.usage_rules.push(rule);
        self
    }

    pub fn can_be_applied(&self, network: &Network) -> bool {
        self.elementary_actions
            .iter()
            .all(|ea| ea.can_be_applied(network))
    }

    pub fn has_impact_on_network(&self, network: &Network) -> bool {
        self.elementary_actions
            .iter()
            .any(|ea| ea.has_impact_on_network(network))
    }
}

impl RemedialAction for NetworkAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn usage_rules(&self) -> &[UsageRule] {
        &self.usage_rules
    }

    fn network_elements(&self) -> Vec<&ElementId> {
        self.elementary_actions
            .iter()
            .flat_map(ElementaryAction::network_elements)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionKind {
    /// Phase-shifting transformer; setpoint is the tap position
    PstTap,
    /// HVDC active power setpoint (MW)
    Hvdc,
    /// Generation or load injection setpoint (MW)
    Injection,
}

/// Reference a range is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    #[default]
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointRange {
    #[serde(default)]
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

impl SetpointRange {
    pub fn absolute(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::Absolute,
            min,
            max,
        }
    }

    fn offset(&self, initial: f64, previous: f64) -> f64 {
        match self.range_type {
            RangeType::Absolute => 0.0,
            RangeType::RelativeToInitialNetwork => initial,
            RangeType::RelativeToPreviousInstant => previous,
        }
    }
}

/// Continuous remedial action moving one setpoint inside admissible bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operator: Option<String>,
    pub kind: RangeActionKind,
    pub element: ElementId,
    /// Range actions sharing a group id must move together
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub ranges: Vec<SetpointRange>,
    /// Setpoint in the initial network, reference of relative-to-initial ranges
    #[serde(default)]
    pub initial_setpoint: f64,
    #[serde(default)]
    pub usage_rules: Vec<UsageRule>,
}

impl RangeAction {
    pub fn new(
        id: impl Into<String>,
        kind: RangeActionKind,
        element: ElementId,
        initial_setpoint: f64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            operator: None,
            kind,
            element,
            group_id: None,
            ranges: Vec::new(),
            initial_setpoint,
            usage_rules: Vec::new(),
        }
    }

    pub fn with_range(mut self, range: SetpointRange) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_usage_rule(mut self, rule: UsageRule) -> Self {
        self.usage_rules.push(rule);
        self
    }

    /// Lowest admissible setpoint given the setpoint of the previous instant.
    ///
    /// Every range restricts the interval; relative ranges are shifted by the
    /// initial or previous setpoint.
    pub fn min_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.ranges
            .iter()
            .map(|r| r.min + r.offset(self.initial_setpoint, previous_setpoint))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Highest admissible setpoint given the setpoint of the previous instant.
    pub fn max_admissible_setpoint(&self, previous_setpoint: f64) -> f64 {
        self.ranges
            .iter()
            .map(|r| r.max + r.offset(self.initial_setpoint, previous_setpoint))
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether `previous_setpoint` lies inside the bounds computed from itself.
    pub fn is_setpoint_admissible(&self, previous_setpoint: f64) -> bool {
        previous_setpoint >= self.min_admissible_setpoint(previous_setpoint)
            && previous_setpoint <= self.max_admissible_setpoint(previous_setpoint)
    }
}

impl RemedialAction for RangeAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn usage_rules(&self) -> &[UsageRule] {
        &self.usage_rules
    }

    fn network_elements(&self) -> Vec<&ElementId> {
        vec![&self.element]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strongest_usage_method() {
        assert_eq!(
            UsageMethod::strongest([UsageMethod::Available, UsageMethod::Forced]),
            Some(UsageMethod::Forced)
        );
        assert_eq!(
            UsageMethod::strongest([UsageMethod::Forced, UsageMethod::Unavailable]),
            Some(UsageMethod::Unavailable)
        );
        assert_eq!(UsageMethod::strongest([]), None);
    }

    #[test]
    fn test_admissible_setpoints_intersect_ranges() {
        let pst = RangeAction::new("pst", RangeActionKind::PstTap, ElementId::new("pst-1"), 0.0)
            .with_range(SetpointRange::absolute(-16.0, 16.0))
            .with_range(SetpointRange {
                range_type: RangeType::RelativeToPreviousInstant,
                min: -5.0,
                max: 5.0,
            });
        assert_eq!(pst.min_admissible_setpoint(14.0), 9.0);
        assert_eq!(pst.max_admissible_setpoint(14.0), 16.0);
        assert_eq!(pst.min_admissible_setpoint(-14.0), -16.0);
    }

    #[test]
    fn test_relative_to_initial_range() {
        let hvdc = RangeAction::new("hvdc", RangeActionKind::Hvdc, ElementId::new("dc"), 500.0)
            .with_range(SetpointRange {
                range_type: RangeType::RelativeToInitialNetwork,
                min: -100.0,
                max: 100.0,
            });
        assert_eq!(hvdc.min_admissible_setpoint(0.0), 400.0);
        assert_eq!(hvdc.max_admissible_setpoint(0.0), 600.0);
        assert!(hvdc.is_setpoint_admissible(550.0));
        assert!(!hvdc.is_setpoint_admissible(650.0));
    }

    #[test]
    fn test_unbounded_range_action() {
        let ra = RangeAction::new("inj", RangeActionKind::Injection, ElementId::new("g"), 0.0);
        assert!(ra.min_admissible_setpoint(0.0).is_infinite());
        assert!(ra.is_setpoint_admissible(1e6));
    }

    #[test]
    fn test_usage_rule_accessors() {
        let rule = UsageRule::OnContingencyState {
            contingency: ContingencyId::new("co1"),
            instant: Instant::Curative(1),
            usage_method: UsageMethod::Available,
        };
        assert_eq!(rule.instant(), Instant::Curative(1));
        assert_eq!(rule.state().unwrap().id(), "co1 - curative-1");
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"type\":\"on_contingency_state\""));
    }

    #[test]
    fn test_elementary_action_serde_tag() {
        let json = r#"{"type":"switch_pair","switch_to_open":"s1","switch_to_close":"s2"}"#;
        let ea: ElementaryAction = serde_json::from_str(json).unwrap();
        assert_eq!(ea.network_elements().len(), 2);
    }
}
