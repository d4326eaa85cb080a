// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! Users are the identity collaborator every verifier resolves into. Each
//! user is created together with its default preferences in one write
//! transaction; Apple sign-up additionally links the issuer subject in the
//! same transaction.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::super::database::{
    decode, encode, next_sequence, AuthDatabase, StorageError, StorageResult, APPLE_IDENTITIES,
    USERS, USER_EMAIL_INDEX, USER_PREFERENCES,
};
use super::credentials::{insert_credential, WebauthnCredential};
use crate::auth::Role;

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Numeric user id
    pub id: i64,
    /// Normalized email address (absent for private-relay sign-ups without email)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: Role,
    /// Inactive users are rejected by every verifier
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.has_privilege(Role::Admin)
    }

    /// Name shown by authenticators during passkey registration.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => self.login_name(),
        }
    }

    /// Account name shown by authenticators (email, or a stable fallback).
    pub fn login_name(&self) -> String {
        self.email
            .clone()
            .unwrap_or_else(|| format!("user-{}", self.id))
    }
}

/// Fields for a user about to be created.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
}

/// Per-user notification preferences, created with defaults on sign-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPreferences {
    pub user_id: i64,
    pub email_notifications: bool,
    pub weekly_digest: bool,
    pub created_at: DateTime<Utc>,
}

impl UserPreferences {
    fn defaults_for(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email_notifications: true,
            weekly_digest: false,
            created_at: now,
        }
    }
}

/// Link between an Apple subject and a platform user.
///
/// One user may carry several subjects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppleIdentity {
    pub subject: String,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Normalize an email for lookup: trimmed, NFKC, lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Repository for user records.
pub struct UserRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Get a user by id.
    pub fn get(&self, user_id: i64) -> StorageResult<Option<User>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Find a user by email (normalized before lookup).
    pub fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let email = normalize_email(email);
        let read_txn = self.db.inner().begin_read()?;
        let index = read_txn.open_table(USER_EMAIL_INDEX)?;
        let Some(user_id) = index.get(email.as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Create a user and its default preferences.
    pub fn create(&self, new_user: NewUser) -> StorageResult<User> {
        let write_txn = self.db.inner().begin_write()?;
        let user = insert_user(&write_txn, new_user)?;
        write_txn.commit()?;
        Ok(user)
    }

    /// Create a user, its default preferences and an Apple identity link as one unit.
    pub fn create_with_apple_identity(
        &self,
        new_user: NewUser,
        subject: &str,
    ) -> StorageResult<User> {
        let write_txn = self.db.inner().begin_write()?;
        let user = insert_user(&write_txn, new_user)?;
        insert_apple_identity(&write_txn, subject, user.id, user.email.clone())?;
        write_txn.commit()?;
        Ok(user)
    }

    /// Create a user together with its first passkey (passkey sign-up).
    ///
    /// `credential` receives the new user and builds the record to store.
    pub fn create_with_credential(
        &self,
        new_user: NewUser,
        credential: impl FnOnce(&User) -> WebauthnCredential,
    ) -> StorageResult<(User, WebauthnCredential)> {
        let write_txn = self.db.inner().begin_write()?;
        let user = insert_user(&write_txn, new_user)?;
        let credential = credential(&user);
        insert_credential(&write_txn, &credential)?;
        write_txn.commit()?;
        Ok((user, credential))
    }

    /// Replace a stored user record.
    pub fn update(&self, user: &User) -> StorageResult<()> {
        let json = encode(user)?;
        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            if table.get(user.id)?.is_none() {
                return Err(StorageError::NotFound(format!("User {}", user.id)));
            }
            table.insert(user.id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Activate or deactivate a user.
    pub fn set_active(&self, user_id: i64, is_active: bool) -> StorageResult<User> {
        let mut user = self
            .get(user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?;
        user.is_active = is_active;
        self.update(&user)?;
        Ok(user)
    }

    /// Change a user's role.
    pub fn set_role(&self, user_id: i64, role: Role) -> StorageResult<User> {
        let mut user = self
            .get(user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?;
        user.role = role;
        self.update(&user)?;
        Ok(user)
    }

    /// Get a user's preferences.
    pub fn preferences(&self, user_id: i64) -> StorageResult<Option<UserPreferences>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(USER_PREFERENCES)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up an Apple identity link by subject.
    pub fn find_apple_identity(&self, subject: &str) -> StorageResult<Option<AppleIdentity>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(APPLE_IDENTITIES)?;
        match table.get(subject)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Link an Apple subject to an existing user.
    pub fn link_apple_identity(
        &self,
        subject: &str,
        user_id: i64,
        email: Option<String>,
    ) -> StorageResult<AppleIdentity> {
        let write_txn = self.db.inner().begin_write()?;
        let identity = insert_apple_identity(&write_txn, subject, user_id, email)?;
        write_txn.commit()?;
        Ok(identity)
    }

    /// List every Apple identity linked to a user.
    pub fn apple_identities_for(&self, user_id: i64) -> StorageResult<Vec<AppleIdentity>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(APPLE_IDENTITIES)?;
        let mut identities = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let identity: AppleIdentity = decode(value.value())?;
            if identity.user_id == user_id {
                identities.push(identity);
            }
        }
        Ok(identities)
    }
}

fn insert_user(txn: &redb::WriteTransaction, new_user: NewUser) -> StorageResult<User> {
    let email = new_user.email.as_deref().map(normalize_email);

    if let Some(email) = &email {
        let index = txn.open_table(USER_EMAIL_INDEX)?;
        if index.get(email.as_str())?.is_some() {
            return Err(StorageError::AlreadyExists(format!("User with email {email}")));
        }
    }

    let now = Utc::now();
    let user = User {
        id: next_sequence(txn, "users")?,
        email,
        first_name: new_user.first_name,
        last_name: new_user.last_name,
        role: new_user.role,
        is_active: true,
        created_at: now,
    };

    {
        let mut users = txn.open_table(USERS)?;
        users.insert(user.id, encode(&user)?.as_slice())?;
    }
    if let Some(email) = &user.email {
        let mut index = txn.open_table(USER_EMAIL_INDEX)?;
        index.insert(email.as_str(), user.id)?;
    }
    {
        let mut preferences = txn.open_table(USER_PREFERENCES)?;
        let defaults = UserPreferences::defaults_for(user.id, now);
        preferences.insert(user.id, encode(&defaults)?.as_slice())?;
    }

    Ok(user)
}

fn insert_apple_identity(
    txn: &redb::WriteTransaction,
    subject: &str,
    user_id: i64,
    email: Option<String>,
) -> StorageResult<AppleIdentity> {
    let mut table = txn.open_table(APPLE_IDENTITIES)?;
    if table.get(subject)?.is_some() {
        return Err(StorageError::AlreadyExists(format!("Apple identity {subject}")));
    }
    let identity = AppleIdentity {
        subject: subject.to_string(),
        user_id,
        email,
        created_at: Utc::now(),
    };
    table.insert(subject, encode(&identity)?.as_slice())?;
    Ok(identity)
}
