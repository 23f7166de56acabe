//! Wall-clock budget of a run.

use rao_core::{RaoError, RaoResult};
use web_time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    started: Instant,
    budget: Duration,
}

impl RunBudget {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self::new(Duration::from_secs(seconds))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// `Err(RaoError::Timeout)` once the budget is spent.
    pub fn check(&self) -> RaoResult<()> {
        if self.is_exhausted() {
            Err(RaoError::Timeout(self.budget))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_exhausted() {
        let budget = RunBudget::new(Duration::ZERO);
        assert!(budget.is_exhausted());
        assert!(matches!(budget.check(), Err(RaoError::Timeout(_))));
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_day_budget_is_not_exhausted() {
        let budget = RunBudget::from_seconds(86_400);
        assert!(budget.check().is_ok());
        assert!(budget.remaining() > Duration::from_secs(86_000));
    }
}
