// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims and authenticated user representation.

use serde::{Deserialize, Serialize};

use super::Role;
use crate::storage::User;

/// Claims carried by a session token.
///
/// `email` is informational only: verification always re-reads the user by
/// `user_id`, so profile changes apply on the next request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expiration (Unix seconds). Optional on the wire so a token without it
    /// can be rejected distinctly instead of failing to parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    pub iss: String,

    pub aud: String,
}

/// How a request was authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthMethod {
    Session,
    ApiToken { token_id: String },
}

/// Authenticated user information.
///
/// This is the type handlers receive from the `Auth` extractor.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    /// Current user record (re-read from storage, never taken from the token)
    pub user: User,
    pub method: AuthMethod,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    /// Whether the user's role grants at least `required`.
    pub fn has_role(&self, required: Role) -> bool {
        self.user.role.has_privilege(required)
    }
}
