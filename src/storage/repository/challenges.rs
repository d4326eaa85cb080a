// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebAuthn challenge repository.
//!
//! A challenge is only visible when its id, its ceremony type and its expiry
//! all match. Wrong ceremony, expired and unknown ids are indistinguishable
//! to callers: each surfaces as [`ChallengeLookup::NotFound`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::database::{decode, encode, AuthDatabase, StorageResult, WEBAUTHN_CHALLENGES};

/// Ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeOperation {
    Registration,
    Authentication,
    SignupRegistration,
}

impl fmt::Display for ChallengeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeOperation::Registration => write!(f, "registration"),
            ChallengeOperation::Authentication => write!(f, "authentication"),
            ChallengeOperation::SignupRegistration => write!(f, "signup_registration"),
        }
    }
}

/// A pending ceremony.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebauthnChallenge {
    pub id: String,
    /// Owner for registration/authentication; absent for discoverable login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Email being signed up (sign-up ceremonies only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_email: Option<String>,
    /// Serialized ceremony state
    pub challenge: String,
    pub operation: ChallengeOperation,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WebauthnChallenge {
    fn is_usable(&self, operation: ChallengeOperation, now: DateTime<Utc>) -> bool {
        self.operation == operation && now < self.expires_at
    }
}

/// Result of a challenge lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeLookup {
    Found(WebauthnChallenge),
    NotFound,
}

impl ChallengeLookup {
    pub fn into_option(self) -> Option<WebauthnChallenge> {
        match self {
            ChallengeLookup::Found(challenge) => Some(challenge),
            ChallengeLookup::NotFound => None,
        }
    }
}

/// Repository for short-lived ceremony challenges.
pub struct ChallengeRepository<'a> {
    db: &'a AuthDatabase,
    ttl: Duration,
}

impl<'a> ChallengeRepository<'a> {
    /// Create a new ChallengeRepository with the given challenge lifetime.
    pub fn new(db: &'a AuthDatabase, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Store a challenge bound to a user (or to nobody, for discoverable login).
    pub fn store_challenge(
        &self,
        user_id: Option<i64>,
        session_data: String,
        operation: ChallengeOperation,
    ) -> StorageResult<String> {
        self.insert(user_id, None, session_data, operation, Utc::now())
    }

    /// Store a sign-up challenge keyed by the email being registered.
    pub fn store_signup_challenge(&self, email: &str, session_data: String) -> StorageResult<String> {
        self.insert(
            None,
            Some(email.to_string()),
            session_data,
            ChallengeOperation::SignupRegistration,
            Utc::now(),
        )
    }

    /// Fetch a challenge without consuming it.
    pub fn get_challenge(
        &self,
        challenge_id: &str,
        operation: ChallengeOperation,
    ) -> StorageResult<ChallengeLookup> {
        self.get_challenge_at(challenge_id, operation, Utc::now())
    }

    pub fn get_challenge_at(
        &self,
        challenge_id: &str,
        operation: ChallengeOperation,
        now: DateTime<Utc>,
    ) -> StorageResult<ChallengeLookup> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(WEBAUTHN_CHALLENGES)?;
        let challenge: Option<WebauthnChallenge> = match table.get(challenge_id)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(match challenge {
            Some(challenge) if challenge.is_usable(operation, now) => ChallengeLookup::Found(challenge),
            _ => ChallengeLookup::NotFound,
        })
    }

    /// Fetch a sign-up challenge, returning its state and the pending email.
    pub fn get_signup_challenge(&self, challenge_id: &str) -> StorageResult<Option<(String, String)>> {
        let lookup = self.get_challenge(challenge_id, ChallengeOperation::SignupRegistration)?;
        Ok(lookup
            .into_option()
            .and_then(|c| c.pending_email.map(|email| (c.challenge, email))))
    }

    /// Fetch and delete a challenge in one transaction.
    ///
    /// A challenge that does not match is left in place for the sweeper.
    pub fn consume_challenge(
        &self,
        challenge_id: &str,
        operation: ChallengeOperation,
    ) -> StorageResult<ChallengeLookup> {
        self.consume_challenge_at(challenge_id, operation, Utc::now())
    }

    pub fn consume_challenge_at(
        &self,
        challenge_id: &str,
        operation: ChallengeOperation,
        now: DateTime<Utc>,
    ) -> StorageResult<ChallengeLookup> {
        self.take_if(challenge_id, |c| c.is_usable(operation, now))
    }

    /// Consume a challenge bound to `user_id`.
    ///
    /// A challenge owned by someone else is left untouched and reported as
    /// [`ChallengeLookup::NotFound`].
    pub fn consume_user_challenge(
        &self,
        challenge_id: &str,
        operation: ChallengeOperation,
        user_id: i64,
    ) -> StorageResult<ChallengeLookup> {
        let now = Utc::now();
        self.take_if(challenge_id, |c| {
            c.is_usable(operation, now) && c.user_id == Some(user_id)
        })
    }

    fn take_if<F>(&self, challenge_id: &str, accept: F) -> StorageResult<ChallengeLookup>
    where
        F: Fn(&WebauthnChallenge) -> bool,
    {
        let write_txn = self.db.inner().begin_write()?;
        let lookup = {
            let mut table = write_txn.open_table(WEBAUTHN_CHALLENGES)?;
            let challenge: Option<WebauthnChallenge> = match table.get(challenge_id)? {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };
            match challenge {
                Some(challenge) if accept(&challenge) => {
                    table.remove(challenge_id)?;
                    ChallengeLookup::Found(challenge)
                }
                _ => ChallengeLookup::NotFound,
            }
        };
        write_txn.commit()?;
        Ok(lookup)
    }

    /// Delete a challenge. Deleting a missing challenge is a no-op.
    pub fn delete_challenge(&self, challenge_id: &str) -> StorageResult<()> {
        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(WEBAUTHN_CHALLENGES)?;
            table.remove(challenge_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove all challenges expired at `now`. Returns the number removed.
    pub fn cleanup_expired_challenges(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let write_txn = self.db.inner().begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(WEBAUTHN_CHALLENGES)?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let challenge: WebauthnChallenge = decode(value.value())?;
                if now >= challenge.expires_at {
                    stale.push(key.value().to_string());
                }
            }
            for id in &stale {
                table.remove(id.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn insert(
        &self,
        user_id: Option<i64>,
        pending_email: Option<String>,
        session_data: String,
        operation: ChallengeOperation,
        now: DateTime<Utc>,
    ) -> StorageResult<String> {
        let challenge = WebauthnChallenge {
            id: Uuid::new_v4().to_string(),
            user_id,
            pending_email,
            challenge: session_data,
            operation,
            created_at: now,
            expires_at: now + self.ttl,
        };
        let json = encode(&challenge)?;

        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(WEBAUTHN_CHALLENGES)?;
            table.insert(challenge.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(challenge.id)
    }
}
