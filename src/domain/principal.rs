use crate::domain::booking::UserId;
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

/// The authenticated caller, as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn student(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(id),
            role: Role::Student,
        }
    }

    pub fn teacher(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(id),
            role: Role::Teacher,
        }
    }

    /// Turns an optional session into a principal, failing when absent.
    pub fn require(session: Option<Principal>) -> Result<Principal> {
        session.ok_or(BookingError::AuthenticationError)
    }
}
