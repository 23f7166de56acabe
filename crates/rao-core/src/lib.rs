//! # rao-core: Remedial Action Optimization Model
//!
//! Data structures describing a remedial-action optimization study: the network
//! snapshot that remedial actions act upon, and the CRAC (Contingencies,
//! Remedial Actions and Constraints) that says what may be done and what must
//! be kept within limits.
//!
//! ## Design Philosophy
//!
//! - **States** pair an [`Instant`] (preventive, outage, auto, curative-n) with an
//!   optional contingency. Instants are totally ordered.
//! - **Cnecs** are monitored quantities tied to a state. *Optimized* Cnecs drive
//!   the objective, *monitored* Cnecs only have to stay feasible.
//! - **Remedial actions** are either discrete [`NetworkAction`]s made of
//!   [`ElementaryAction`]s, or continuous [`RangeAction`]s with admissible bounds.
//!   Elementary actions form a closed enum so that every pairwise comparison is
//!   an exhaustive `match`.
//! - The **network** is a petgraph multigraph of buses and switchable branches
//!   carrying only what actions change (open status, taps, setpoints). It is
//!   cheap to clone.
//!
//! ## Quick Start
//!
//! ```rust
//! use rao_core::*;
//!
//! let mut network = Network::new();
//! network.add_bus(Bus::new("b1", Some("FR"))).unwrap();
//! network.add_bus(Bus::new("b2", Some("FR"))).unwrap();
//! network
//!     .add_edge(Edge::Switch(Switch {
//!         id: ElementId::new("s1"),
//!         from_bus: ElementId::new("b1"),
//!         to_bus: ElementId::new("b2"),
//!         open: false,
//!     }))
//!     .unwrap();
//!
//! let open_s1 = NetworkAction::new(
//!     "open-s1",
//!     vec![ElementaryAction::Topological {
//!         element: ElementId::new("s1"),
//!         action_type: ActionType::Open,
//!     }],
//! )
//! .with_usage_rule(UsageRule::OnInstant {
//!     instant: Instant::Preventive,
//!     usage_method: UsageMethod::Available,
//! });
//!
//! let crac = Crac::new("study")
//!     .with_cnec(Cnec::flow("b1-b2", ElementId::new("s1"), State::preventive(), 100.0))
//!     .with_network_action(open_s1);
//! assert!(crac.ensure_valid(Some(&network)).is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`state`] - Instants, states and contingencies
//! - [`cnec`] - Monitored elements and their margins
//! - [`action`] - Network actions, range actions and usage rules
//! - [`crac`] - The CRAC container and its validation
//! - [`network`] - Network snapshot, action application, country graph
//! - [`diagnostics`] - Validation findings

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod action;
pub mod cnec;
pub mod crac;
pub mod diagnostics;
pub mod error;
pub mod network;
pub mod state;

pub use action::{
    ActionType, ElementaryAction, NetworkAction, RangeAction, RangeActionKind, RangeType,
    RemedialAction, SetpointRange, UsageMethod, UsageRule, SETPOINT_IMPACT_EPSILON,
};
pub use cnec::{Cnec, PhysicalParameter};
pub use crac::Crac;
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{RaoError, RaoResult};
pub use network::{
    Bus, CountryGraph, Edge, HvdcLine, Injection, Line, Network, NetworkData, NetworkStats, Node,
    Pst, Switch,
};
pub use state::{Contingency, Instant, State};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContingencyId(String);
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Country(String);

impl ElementId {
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        ElementId(value.into())
    }
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ContingencyId {
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        ContingencyId(value.into())
    }
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Country {
    /// Country code, normalized to upper case.
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        Country(value.into().to_ascii_uppercase())
    }
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Country {
    fn from(value: String) -> Self {
        Country::new(value)
    }
}

impl From<Country> for String {
    fn from(country: Country) -> Self {
        country.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContingencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ElementId::new("line-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"line-1\"");
        let back: ContingencyId = serde_json::from_str("\"co\"").unwrap();
        assert_eq!(back.as_str(), "co");
    }

    #[test]
    fn test_country_is_upper_case() {
        assert_eq!(Country::new("fr"), Country::new("FR"));
        assert_eq!(Country::new("be").to_string(), "BE");
        let parsed: Country = serde_json::from_str("\"nl\"").unwrap();
        assert_eq!(parsed.as_str(), "NL");
    }
}
