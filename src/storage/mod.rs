// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage
//!
//! Persistent state for every credential kind lives in one embedded redb
//! file (`$DATA_DIR/identity.redb`).
//!
//! ## What is stored
//!
//! - Users, their default preferences and Apple identity links
//! - API token metadata and SHA-256 digests (never the raw token)
//! - Passkey public keys
//! - Short-lived WebAuthn ceremony challenges
//!
//! Session tokens are stateless and never stored. The Apple signing-key cache
//! is process-local (see `crate::apple::keys`).

pub mod database;
pub mod repository;

pub use database::{AuthDatabase, StorageError, StorageResult, TableCounts};
pub use repository::{
    normalize_email, ApiTokenRecord, ApiTokenRepository, AppleIdentity, ChallengeLookup,
    ChallengeOperation, ChallengeRepository, CredentialRepository, NewUser, User,
    UserPreferences, UserRepository, WebauthnChallenge, WebauthnCredential,
};
