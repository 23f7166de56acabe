use rao_core::RaoError;
use thiserror::Error;

/// Failures local to one leaf or one perimeter.
///
/// These never abort a run: the search tree marks the offending leaf as
/// errored and carries on with its siblings.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Sensitivity computation did not converge
    #[error("sensitivity computation failed: {0}")]
    SensitivityFailure(String),

    /// Linear solver reported a numerical problem
    #[error("linear solver failed: {0}")]
    Solver(String),

    /// Linear problem has no feasible point
    #[error("linear problem infeasible: {0}")]
    Infeasible(String),

    /// Network could not be put into the requested configuration
    #[error(transparent)]
    Network(#[from] RaoError),
}

impl EvaluationError {
    /// Whether the error comes from the sensitivity step.
    pub fn is_sensitivity_failure(&self) -> bool {
        matches!(self, EvaluationError::SensitivityFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_transparent() {
        let err: EvaluationError = RaoError::Network("unknown switch 's9'".into()).into();
        assert_eq!(err.to_string(), "Network error: unknown switch 's9'");
        assert!(!err.is_sensitivity_failure());
    }

    #[test]
    fn test_sensitivity_failure_display() {
        let err = EvaluationError::SensitivityFailure("co2 - curative-1 diverged".into());
        assert!(err.is_sensitivity_failure());
        assert!(err.to_string().contains("co2 - curative-1"));
    }
}
