// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded credential database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized User
//! - `user_email_index`: normalized email → user_id
//! - `user_preferences`: user_id → serialized UserPreferences
//! - `apple_identities`: Apple subject → serialized AppleIdentity
//! - `api_tokens`: token id → serialized ApiTokenRecord
//! - `api_token_hash_index`: SHA-256 hex digest → token id
//! - `webauthn_credentials`: record id → serialized WebauthnCredential
//! - `webauthn_credential_index`: base64url credential id → record id
//! - `webauthn_challenges`: challenge id → serialized WebauthnChallenge
//! - `sequences`: sequence name → last allocated value

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<i64, &[u8]> = TableDefinition::new("users");

pub(crate) const USER_EMAIL_INDEX: TableDefinition<&str, i64> =
    TableDefinition::new("user_email_index");

pub(crate) const USER_PREFERENCES: TableDefinition<i64, &[u8]> =
    TableDefinition::new("user_preferences");

pub(crate) const APPLE_IDENTITIES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("apple_identities");

pub(crate) const API_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("api_tokens");

pub(crate) const API_TOKEN_HASH_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("api_token_hash_index");

pub(crate) const WEBAUTHN_CREDENTIALS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("webauthn_credentials");

pub(crate) const WEBAUTHN_CREDENTIAL_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("webauthn_credential_index");

pub(crate) const WEBAUTHN_CHALLENGES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("webauthn_challenges");

pub(crate) const SEQUENCES: TableDefinition<&str, i64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub(crate) fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// AuthDatabase
// =============================================================================

/// Embedded ACID store for every credential kind.
pub struct AuthDatabase {
    db: Database,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAIL_INDEX)?;
            let _ = write_txn.open_table(USER_PREFERENCES)?;
            let _ = write_txn.open_table(APPLE_IDENTITIES)?;
            let _ = write_txn.open_table(API_TOKENS)?;
            let _ = write_txn.open_table(API_TOKEN_HASH_INDEX)?;
            let _ = write_txn.open_table(WEBAUTHN_CREDENTIALS)?;
            let _ = write_txn.open_table(WEBAUTHN_CREDENTIAL_INDEX)?;
            let _ = write_txn.open_table(WEBAUTHN_CHALLENGES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn inner(&self) -> &Database {
        &self.db
    }

    /// Count the rows of every table, for startup logging.
    pub fn table_counts(&self) -> StorageResult<TableCounts> {
        let read_txn = self.db.begin_read()?;
        Ok(TableCounts {
            users: read_txn.open_table(USERS)?.len()?,
            api_tokens: read_txn.open_table(API_TOKENS)?.len()?,
            webauthn_credentials: read_txn.open_table(WEBAUTHN_CREDENTIALS)?.len()?,
            webauthn_challenges: read_txn.open_table(WEBAUTHN_CHALLENGES)?.len()?,
        })
    }
}

/// Row counts reported at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub users: u64,
    pub api_tokens: u64,
    pub webauthn_credentials: u64,
    pub webauthn_challenges: u64,
}

/// Allocate the next value of a named sequence inside an open write transaction.
pub(crate) fn next_sequence(txn: &redb::WriteTransaction, name: &str) -> StorageResult<i64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(name)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(name, next)?;
    Ok(next)
}

// =============================================================================
// Tests
// =============================================================================
