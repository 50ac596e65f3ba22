//! Library users as seen by the lending workflow.

use std::str::FromStr;

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Role of a user in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May request borrows and returns.
    Student,
    /// May approve and reject requests and edit inventory.
    Librarian,
    /// Same lending powers as a librarian.
    Admin,
}

impl Role {
    /// Returns true if the role may decide on borrow and return requests.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }

    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Librarian => "Librarian",
            Role::Admin => "Admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Student" => Ok(Role::Student),
            "Librarian" => Ok(Role::Librarian),
            "Admin" => Ok(Role::Admin),
            other => Err(StoreError::Corrupt(format!("unknown role '{other}'"))),
        }
    }
}

/// A user record owned by the account directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    /// Address for best-effort emails; notifications are still stored without one.
    pub email: Option<String>,
    pub role: Role,
    pub is_blocked: bool,
    pub is_deleted: bool,
}

impl User {
    /// Creates an active, unblocked user.
    pub fn new(full_name: impl Into<String>, email: Option<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            full_name: full_name.into(),
            email,
            role,
            is_blocked: false,
            is_deleted: false,
        }
    }

    /// Returns true if the user exists and is not blocked.
    pub fn is_active(&self) -> bool {
        !self.is_deleted && !self.is_blocked
    }

    /// Returns true if the user may open borrow and return requests.
    pub fn can_request(&self) -> bool {
        self.is_active() && self.role == Role::Student
    }

    /// Returns true if the user may approve or reject requests.
    pub fn can_process(&self) -> bool {
        self.is_active() && self.role.is_staff()
    }
}
