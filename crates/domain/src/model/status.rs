//! Request status state machines.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// The state of a borrow request.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Approved
///           └──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BorrowStatus {
    /// Awaiting a librarian decision.
    #[default]
    Pending,

    /// A copy was issued (terminal state).
    Approved,

    /// The request was turned down (terminal state).
    Rejected,
}

impl BorrowStatus {
    /// Returns true if a librarian may still decide on the request.
    pub fn can_decide(&self) -> bool {
        matches!(self, BorrowStatus::Pending)
    }

    /// Returns the approved state, or None unless the request is pending.
    pub fn approve(self) -> Option<Self> {
        self.can_decide().then_some(BorrowStatus::Approved)
    }

    /// Returns the rejected state, or None unless the request is pending.
    pub fn reject(self) -> Option<Self> {
        self.can_decide().then_some(BorrowStatus::Rejected)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.can_decide()
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "Pending",
            BorrowStatus::Approved => "Approved",
            BorrowStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BorrowStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BorrowStatus::Pending),
            "Approved" => Ok(BorrowStatus::Approved),
            "Rejected" => Ok(BorrowStatus::Rejected),
            other => Err(StoreError::Corrupt(format!(
                "unknown borrow request status '{other}'"
            ))),
        }
    }
}

/// The state of a return request.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Approved   (loan closed, copy released)
///           └──► Rejected   (loan stays active)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReturnStatus {
    /// Awaiting a librarian decision.
    #[default]
    Pending,

    /// The copy was taken back (terminal state).
    Approved,

    /// The return was refused (terminal state).
    Rejected,
}

impl ReturnStatus {
    /// Returns true if a librarian may still process the request.
    pub fn can_process(&self) -> bool {
        matches!(self, ReturnStatus::Pending)
    }

    /// Returns the approved state, or None unless the request is pending.
    pub fn approve(self) -> Option<Self> {
        self.can_process().then_some(ReturnStatus::Approved)
    }

    /// Returns the rejected state, or None unless the request is pending.
    pub fn reject(self) -> Option<Self> {
        self.can_process().then_some(ReturnStatus::Rejected)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "Pending",
            ReturnStatus::Approved => "Approved",
            ReturnStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ReturnStatus::Pending),
            "Approved" => Ok(ReturnStatus::Approved),
            "Rejected" => Ok(ReturnStatus::Rejected),
            other => Err(StoreError::Corrupt(format!(
                "unknown return request status '{other}'"
            ))),
        }
    }
}
