//! Constrained network elements under contingency (Cnecs).

use crate::state::State;
use crate::ElementId;
use serde::{Deserialize, Serialize};

/// Physical quantity watched by a Cnec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalParameter {
    #[default]
    Flow,
    Voltage,
    Angle,
}

/// A monitored quantity of one network element in one state.
///
/// An *optimized* Cnec drives the objective (its margin is maximized); a
/// *monitored* Cnec only has to stay feasible. A Cnec can be both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cnec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub element: ElementId,
    pub state: State,
    #[serde(default)]
    pub parameter: PhysicalParameter,
    /// Lower threshold (MW for flows)
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper threshold (MW for flows)
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default = "default_true")]
    pub optimized: bool,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub operator: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Cnec {
    /// Optimized flow Cnec with symmetric thresholds `[-limit, limit]`.
    pub fn flow(id: impl Into<String>, element: ElementId, state: State, limit: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            element,
            state,
            parameter: PhysicalParameter::Flow,
            min: Some(-limit),
            max: Some(limit),
            optimized: true,
            monitored: false,
            operator: None,
        }
    }

    pub fn with_thresholds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Keep the Cnec feasible without letting it drive the objective.
    pub fn monitored_only(mut self) -> Self {
        self.optimized = false;
        self.monitored = true;
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Distance of `value` to the closest threshold; negative when violated.
    ///
    /// A Cnec without any threshold has an infinite margin.
    pub fn margin(&self, value: f64) -> f64 {
        let lower = self.min.map_or(f64::INFINITY, |min| value - min);
        let upper = self.max.map_or(f64::INFINITY, |max| max - value);
        lower.min(upper)
    }

    #[inline]
    pub fn has_thresholds(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}
