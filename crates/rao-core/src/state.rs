//! Decision instants, the states built on them, and contingencies.

use crate::error::{RaoError, RaoResult};
use crate::{ContingencyId, ElementId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Point in time at which the network is secured.
///
/// The derived order is the chronological one:
/// `Preventive < Outage < Auto < Curative(1) < Curative(2) < Curative(3)`.
///
/// Serialized as `"preventive"`, `"outage"`, `"auto"` or `"curative-<n>"`
/// (`"curative"` alone parses as the first curative instant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Instant {
    Preventive,
    Outage,
    Auto,
    Curative(u8),
}

impl Instant {
    pub const MAX_CURATIVE_RANK: u8 = 3;

    #[inline]
    pub fn is_preventive(&self) -> bool {
        matches!(self, Instant::Preventive)
    }

    #[inline]
    pub fn is_outage(&self) -> bool {
        matches!(self, Instant::Outage)
    }

    #[inline]
    pub fn is_auto(&self) -> bool {
        matches!(self, Instant::Auto)
    }

    #[inline]
    pub fn is_curative(&self) -> bool {
        matches!(self, Instant::Curative(_))
    }

    /// Remedial actions can be activated at every instant but the outage one.
    #[inline]
    pub fn can_activate_remedial_actions(&self) -> bool {
        !self.is_outage()
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instant::Preventive => write!(f, "preventive"),
            Instant::Outage => write!(f, "outage"),
            Instant::Auto => write!(f, "auto"),
            Instant::Curative(rank) => write!(f, "curative-{rank}"),
        }
    }
}

impl FromStr for Instant {
    type Err = RaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "preventive" => Ok(Instant::Preventive),
            "outage" => Ok(Instant::Outage),
            "auto" => Ok(Instant::Auto),
            "curative" => Ok(Instant::Curative(1)),
            other => {
                let rank = other
                    .strip_prefix("curative-")
                    .and_then(|r| r.parse::<u8>().ok())
                    .ok_or_else(|| RaoError::Parse(format!("unknown instant '{s}'")))?;
                if rank == 0 || rank > Self::MAX_CURATIVE_RANK {
                    return Err(RaoError::Parse(format!(
                        "curative rank must be between 1 and {}, got {rank}",
                        Self::MAX_CURATIVE_RANK
                    )));
                }
                Ok(Instant::Curative(rank))
            }
        }
    }
}

impl TryFrom<String> for Instant {
    type Error = RaoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Instant> for String {
    fn from(instant: Instant) -> Self {
        instant.to_string()
    }
}

/// An (instant, contingency) pair to secure.
///
/// The preventive state is the only one without a contingency. States are
/// ordered preventive first, then by contingency, then chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contingency: Option<ContingencyId>,
    instant: Instant,
}

impl State {
    pub fn preventive() -> Self {
        Self {
            contingency: None,
            instant: Instant::Preventive,
        }
    }

    /// State following `contingency` at a non-preventive instant.
    pub fn post_contingency(contingency: ContingencyId, instant: Instant) -> RaoResult<Self> {
        if instant.is_preventive() {
            return Err(RaoError::Config(format!(
                "contingency '{contingency}' cannot be attached to the preventive instant"
            )));
        }
        Ok(Self {
            contingency: Some(contingency),
            instant,
        })
    }

    #[inline]
    pub fn instant(&self) -> Instant {
        self.instant
    }

    #[inline]
    pub fn contingency(&self) -> Option<&ContingencyId> {
        self.contingency.as_ref()
    }

    #[inline]
    pub fn is_preventive(&self) -> bool {
        self.instant.is_preventive()
    }

    /// Whether the pairing of instant and contingency is meaningful.
    pub fn is_well_formed(&self) -> bool {
        self.instant.is_preventive() == self.contingency.is_none()
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.contingency {
            None => write!(f, "{}", self.instant),
            Some(c) => write!(f, "{} - {}", c, self.instant),
        }
    }
}

/// A set of network elements tripped together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contingency {
    pub id: ContingencyId,
    #[serde(default)]
    pub name: String,
    pub elements: Vec<ElementId>,
}

impl Contingency {
    pub fn new(id: impl Into<String>, elements: Vec<ElementId>) -> Self {
        let id = ContingencyId::new(id);
        Self {
            name: id.to_string(),
            id,
            elements,
        }
    }
}
