// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, the only role allowed to hold API tokens
/// - `Moderator` - Reviews submitted shows, venues and artists
/// - `Member` - Regular account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Listing moderation
    Moderator,
    /// Regular user
    #[default]
    Member,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Moderator, Role::Moderator | Role::Member) => true,
            (Role::Member, Role::Member) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Moderator => write!(f, "moderator"),
            Role::Member => write!(f, "member"),
        }
    }
}
