//! Input files of the CLI: the JSON scenario and the TOML parameter file.

use anyhow::{Context, Result};
use rao_algo::{RaoParameters, SensitivityModel};
use rao_core::{Crac, Network};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything one optimization needs besides its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub network: Network,
    pub crac: Crac,
    /// Coefficients of the superposition load-flow model
    #[serde(default)]
    pub sensitivity: SensitivityModel,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Parameter file: [`RaoParameters`] plus a `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsFile {
    pub rao: RaoParameters,
    pub logging: LoggingSection,
}

#[derive(Deserialize)]
struct LoggingOnly {
    #[serde(default)]
    logging: LoggingSection,
}

impl ParamsFile {
    pub fn parse(text: &str) -> Result<Self> {
        let rao: RaoParameters = toml::from_str(text).context("parsing RAO parameters")?;
        let LoggingOnly { logging } = toml::from_str(text).context("parsing [logging] section")?;
        Ok(Self { rao, logging })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading parameter file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in parameter file {}", path.display()))
    }

    /// `[logging] level`, when set to a valid level name.
    pub fn log_level(&self) -> Option<tracing::Level> {
        self.logging.level.as_deref()?.parse().ok()
    }

    /// Default parameters rendered as TOML.
    pub fn default_toml() -> Result<String> {
        let params = toml::to_string_pretty(&RaoParameters::default())
            .context("serializing default parameters")?;
        Ok(format!("{params}\n[logging]\nlevel = \"info\"\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_algo::OptimizationGoal;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = ParamsFile::parse(
            r#"
            max_run_duration_seconds = 60

            [logging]
            level = "debug"

            [objective]
            preventive_stop_criterion = "min_objective"
            "#,
        )
        .unwrap();
        assert_eq!(file.rao.max_run_duration_seconds, 60);
        assert_eq!(
            file.rao.objective.preventive_stop_criterion,
            OptimizationGoal::MinObjective
        );
        assert_eq!(file.rao.topo, RaoParameters::default().topo);
        assert_eq!(file.log_level(), Some(tracing::Level::DEBUG));
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = ParamsFile::parse("").unwrap();
        assert_eq!(file, ParamsFile::default());
        assert_eq!(file.log_level(), None);
    }

    #[test]
    fn test_default_toml_parses_back() {
        let text = ParamsFile::default_toml().unwrap();
        let file = ParamsFile::parse(&text).unwrap();
        assert_eq!(file.rao, RaoParameters::default());
        assert_eq!(file.log_level(), Some(tracing::Level::INFO));
    }

    #[test]
    fn test_unknown_level_is_ignored() {
        let file = ParamsFile::parse("[logging]\nlevel = \"loud\"\n").unwrap();
        assert_eq!(file.log_level(), None);
    }
}
