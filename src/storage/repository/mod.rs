// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the credential database.
//!
//! Each repository borrows the [`AuthDatabase`](super::AuthDatabase) and
//! performs one redb transaction per operation.

pub mod api_tokens;
pub mod challenges;
pub mod credentials;
pub mod users;

pub use api_tokens::{ApiTokenRecord, ApiTokenRepository};
pub use challenges::{ChallengeLookup, ChallengeOperation, ChallengeRepository, WebauthnChallenge};
pub use credentials::{CredentialRepository, WebauthnCredential};
pub use users::{normalize_email, AppleIdentity, NewUser, User, UserPreferences, UserRepository};
