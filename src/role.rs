//! Role hierarchy resolver.
//!
//! Roles form a fixed, totally ordered hierarchy. Rank lookups are O(1) and
//! total: every role has a rank, and parsing anything outside the table is an
//! explicit [`UnknownRoleError`] rather than a silent default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a role identifier is not part of the fixed role table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRoleError(pub String);

/// A subject's role within an organization.
///
/// The variants are listed in ascending rank order; [`Role::dominates`] is the
/// only comparison callers should need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Student,
    Teacher,
    Manager,
    Admin,
    Owner,
}

impl Role {
    /// Every role, in ascending rank order.
    pub const ALL: [Role; 6] = [
        Role::Viewer,
        Role::Student,
        Role::Teacher,
        Role::Manager,
        Role::Admin,
        Role::Owner,
    ];

    /// Ordinal rank in the hierarchy.
    pub const fn rank(self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Student => 1,
            Role::Teacher => 2,
            Role::Manager => 3,
            Role::Admin => 4,
            Role::Owner => 5,
        }
    }

    /// Whether `self` sits at or above `other` in the hierarchy.
    pub const fn dominates(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(UnknownRoleError(other.to_string())),
        }
    }
}
