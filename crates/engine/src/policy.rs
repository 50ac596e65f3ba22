use chrono::{DateTime, Duration, Utc};
use domain::LendingError;
use serde::{Deserialize, Serialize};

/// Maximum active-or-pending borrows per user.
pub const DEFAULT_MAX_BORROWS: u32 = 3;

/// Days between approval and due date.
pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 14;

/// Longest loan period accepted, ten years.
pub const MAX_LOAN_PERIOD_DAYS: i64 = 3650;

/// Limits applied by the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPolicy {
    pub max_borrows: u32,
    pub loan_period_days: i64,
}

impl LendingPolicy {
    pub fn new(max_borrows: u32, loan_period_days: i64) -> Self {
        Self {
            max_borrows,
            loan_period_days,
        }
    }

    /// True when the borrow limit and the loan period are both usable.
    pub fn is_valid(&self) -> bool {
        self.max_borrows >= 1 && (1..=MAX_LOAN_PERIOD_DAYS).contains(&self.loan_period_days)
    }

    /// Due date of a loan issued at `issued_at`.
    pub fn due_date(&self, issued_at: DateTime<Utc>) -> Result<DateTime<Utc>, LendingError> {
        if !(1..=MAX_LOAN_PERIOD_DAYS).contains(&self.loan_period_days) {
            return Err(LendingError::Validation(format!(
                "loan period of {} days is outside 1..={MAX_LOAN_PERIOD_DAYS}",
                self.loan_period_days
            )));
        }
        Duration::try_days(self.loan_period_days)
            .and_then(|period| issued_at.checked_add_signed(period))
            .ok_or_else(|| {
                LendingError::Validation(format!(
                    "due date overflows for a {} day loan",
                    self.loan_period_days
                ))
            })
    }
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BORROWS, DEFAULT_LOAN_PERIOD_DAYS)
    }
}
