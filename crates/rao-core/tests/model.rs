//! Loading a study from JSON and acting on its network

use rao_core::{
    ContingencyId, Crac, ElementId, Instant, Network, RaoError, RemedialAction, Severity, State,
};

const NETWORK: &str = r#"{
    "buses": [
        {"id": "fr-1", "country": "fr"},
        {"id": "be-1", "country": "BE"}
    ],
    "lines": [
        {"id": "fr-be-1", "from_bus": "fr-1", "to_bus": "be-1"},
        {"id": "fr-be-2", "from_bus": "fr-1", "to_bus": "be-1"}
    ],
    "switches": [
        {"id": "coupler", "from_bus": "fr-1", "to_bus": "be-1", "open": true}
    ],
    "psts": [
        {"id": "pst-fr", "from_bus": "fr-1", "to_bus": "be-1", "tap": 0, "low_tap": -16, "high_tap": 16}
    ]
}"#;

const CRAC: &str = r#"{
    "id": "fr-be",
    "contingencies": [
        {"id": "co-fr-be-2", "elements": ["fr-be-2"]}
    ],
    "cnecs": [
        {"id": "fr-be-1 - prev", "element": "fr-be-1", "state": {"instant": "preventive"}, "min": -100, "max": 100},
        {"id": "fr-be-1 - cur", "element": "fr-be-1",
         "state": {"contingency": "co-fr-be-2", "instant": "curative-1"}, "max": 120}
    ],
    "network_actions": [
        {
            "id": "close-coupler",
            "elementary_actions": [
                {"type": "topological", "element": "coupler", "action_type": "close"}
            ],
            "usage_rules": [
                {"type": "on_instant", "instant": "preventive"}
            ]
        },
        {
            "id": "pst-fr-5",
            "elementary_actions": [{"type": "pst_setpoint", "element": "pst-fr", "tap": 5}],
            "usage_rules": [
                {"type": "on_contingency_state", "contingency": "co-fr-be-2", "instant": "curative-1"}
            ]
        }
    ],
    "range_actions": [
        {
            "id": "pst-fr-range",
            "kind": "pst_tap",
            "element": "pst-fr",
            "ranges": [{"min": -10, "max": 10}],
            "usage_rules": [{"type": "on_instant", "instant": "preventive", "usage_method": "available"}]
        }
    ]
}"#;

fn load() -> (Network, Crac) {
    let network: Network = serde_json::from_str(NETWORK).unwrap();
    let crac: Crac = serde_json::from_str(CRAC).unwrap();
    (network, crac)
}

#[test]
fn study_loads_and_validates() {
    let (network, crac) = load();

    let stats = network.stats();
    assert_eq!(stats.num_buses, 2);

    let diag = crac.validate(Some(&network));
    assert!(!diag.has_errors(), "{}", diag.summary());

    assert_eq!(crac.states().len(), 2);
    let curative =
        State::post_contingency(ContingencyId::new("co-fr-be-2"), Instant::Curative(1)).unwrap();
    assert!(crac.has_remedial_actions_for(&curative));
    assert_eq!(crac.cnecs_for_state(&curative).count(), 1);
    assert_eq!(crac.cnec("fr-be-1 - cur").unwrap().min, None);
}

#[test]
fn contingency_and_actions_change_the_network() {
    let (mut network, crac) = load();

    let contingency = crac.contingency(&ContingencyId::new("co-fr-be-2")).unwrap();
    network.apply_contingency(contingency).unwrap();
    assert!(network.is_open(&ElementId::new("fr-be-2")).unwrap());

    let close = crac.network_action("close-coupler").unwrap();
    assert!(close.has_impact_on_network(&network));
    network.apply_network_action(close).unwrap();
    assert!(!network.is_switch_open(&ElementId::new("coupler")).unwrap());
    assert!(!close.has_impact_on_network(&network));

    let tap = crac.network_action("pst-fr-5").unwrap();
    network.apply_network_action(tap).unwrap();
    assert_eq!(network.pst_tap(&ElementId::new("pst-fr")).unwrap(), 5);

    let range = crac.range_action("pst-fr-range").unwrap();
    assert_eq!(network.range_action_setpoint(range).unwrap(), 5.0);
}

#[test]
fn actions_are_located_in_their_countries() {
    let (network, crac) = load();
    let close = crac.network_action("close-coupler").unwrap();
    let countries: Vec<String> = close
        .location(&network)
        .into_iter()
        .flatten()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(countries, vec!["BE", "FR"]);
}

#[test]
fn dangling_references_are_reported() {
    let (network, mut crac) = load();
    crac.contingencies[0].elements.push(ElementId::new("ghost-line"));
    crac.cnecs[1].state =
        State::post_contingency(ContingencyId::new("co-unknown"), Instant::Curative(1)).unwrap();

    let diag = crac.validate(Some(&network));
    assert_eq!(diag.error_count(), 2);
    assert!(diag.errors().all(|issue| issue.severity == Severity::Error));

    let err = crac.ensure_valid(Some(&network)).unwrap_err();
    assert!(matches!(err, RaoError::Config(msg) if msg.contains("ghost-line")));
}

#[test]
fn network_with_unknown_bus_is_rejected() {
    let json = r#"{
        "buses": [{"id": "a"}],
        "lines": [{"id": "l", "from_bus": "a", "to_bus": "missing"}]
    }"#;
    let err = serde_json::from_str::<Network>(json).unwrap_err();
    assert!(err.to_string().contains("missing"));
}
