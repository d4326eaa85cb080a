// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebAuthn credential repository.
//!
//! Every owner-facing operation is keyed by `(user_id, id)`; a record owned by
//! someone else behaves exactly like a missing one.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::super::database::{
    decode, encode, AuthDatabase, StorageError, StorageResult, WEBAUTHN_CREDENTIALS,
    WEBAUTHN_CREDENTIAL_INDEX,
};

/// A registered passkey.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebauthnCredential {
    /// Record identifier (UUID)
    pub id: String,
    pub user_id: i64,
    /// Base64url (unpadded) authenticator credential id
    pub credential_id: String,
    /// Serialized public-key credential, including signature counter state
    pub public_key: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Repository for passkey records.
pub struct CredentialRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> CredentialRepository<'a> {
    /// Create a new CredentialRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Store a new credential. Credential ids are globally unique.
    pub fn create(&self, credential: &WebauthnCredential) -> StorageResult<()> {
        let write_txn = self.db.inner().begin_write()?;
        insert_credential(&write_txn, credential)?;
        write_txn.commit()?;
        Ok(())
    }

    /// List a user's credentials, oldest first.
    pub fn list_by_user(&self, user_id: i64) -> StorageResult<Vec<WebauthnCredential>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(WEBAUTHN_CREDENTIALS)?;
        let mut credentials = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let credential: WebauthnCredential = decode(value.value())?;
            if credential.user_id == user_id {
                credentials.push(credential);
            }
        }
        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(credentials)
    }

    /// Look up by authenticator credential id (base64url).
    pub fn find_by_credential_id(
        &self,
        credential_id: &str,
    ) -> StorageResult<Option<WebauthnCredential>> {
        let read_txn = self.db.inner().begin_read()?;
        let index = read_txn.open_table(WEBAUTHN_CREDENTIAL_INDEX)?;
        let Some(id) = index.get(credential_id)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(WEBAUTHN_CREDENTIALS)?;
        match table.get(id.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a credential record, only if owned by `user_id`.
    pub fn get_for_user(&self, user_id: i64, id: &str) -> StorageResult<Option<WebauthnCredential>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(WEBAUTHN_CREDENTIALS)?;
        let credential: Option<WebauthnCredential> = match table.get(id)? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(credential.filter(|c| c.user_id == user_id))
    }

    /// Rename a credential owned by `user_id`.
    pub fn rename(&self, user_id: i64, id: &str, display_name: &str) -> StorageResult<WebauthnCredential> {
        self.modify(user_id, id, |credential| {
            credential.display_name = display_name.to_string();
        })
    }

    /// Persist updated key material and usage time after an authentication.
    pub fn record_use(
        &self,
        user_id: i64,
        id: &str,
        public_key: Option<String>,
        now: DateTime<Utc>,
    ) -> StorageResult<WebauthnCredential> {
        self.modify(user_id, id, |credential| {
            if let Some(public_key) = public_key {
                credential.public_key = public_key;
            }
            credential.last_used_at = Some(now);
        })
    }

    /// Delete a credential owned by `user_id`.
    pub fn delete(&self, user_id: i64, id: &str) -> StorageResult<()> {
        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(WEBAUTHN_CREDENTIALS)?;
            let credential: WebauthnCredential = {
                let existing = table
                    .get(id)?
                    .ok_or_else(|| StorageError::NotFound(format!("Credential {id}")))?;
                decode(existing.value())?
            };
            if credential.user_id != user_id {
                return Err(StorageError::NotFound(format!("Credential {id}")));
            }
            table.remove(id)?;

            let mut index = write_txn.open_table(WEBAUTHN_CREDENTIAL_INDEX)?;
            index.remove(credential.credential_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn modify(
        &self,
        user_id: i64,
        id: &str,
        change: impl FnOnce(&mut WebauthnCredential),
    ) -> StorageResult<WebauthnCredential> {
        let write_txn = self.db.inner().begin_write()?;
        let credential = {
            let mut table = write_txn.open_table(WEBAUTHN_CREDENTIALS)?;
            let mut credential: WebauthnCredential = {
                let existing = table
                    .get(id)?
                    .ok_or_else(|| StorageError::NotFound(format!("Credential {id}")))?;
                decode(existing.value())?
            };
            if credential.user_id != user_id {
                return Err(StorageError::NotFound(format!("Credential {id}")));
            }
            change(&mut credential);
            table.insert(id, encode(&credential)?.as_slice())?;
            credential
        };
        write_txn.commit()?;
        Ok(credential)
    }
}

pub(super) fn insert_credential(
    txn: &redb::WriteTransaction,
    credential: &WebauthnCredential,
) -> StorageResult<()> {
    let json = encode(credential)?;
    let mut index = txn.open_table(WEBAUTHN_CREDENTIAL_INDEX)?;
    if index.get(credential.credential_id.as_str())?.is_some() {
        return Err(StorageError::AlreadyExists(format!(
            "Credential {}",
            credential.credential_id
        )));
    }
    index.insert(credential.credential_id.as_str(), credential.id.as_str())?;

    let mut table = txn.open_table(WEBAUTHN_CREDENTIALS)?;
    table.insert(credential.id.as_str(), json.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;

    fn credential(id: &str, user_id: i64, credential_id: &str) -> WebauthnCredential {
        WebauthnCredential {
            id: id.to_string(),
            user_id,
            credential_id: credential_id.to_string(),
            public_key: "{}".to_string(),
            display_name: "Laptop".to_string(),
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    #[test]
    fn create_and_lookup() {
        let (db, _dir) = temp_db();
        let repo = CredentialRepository::new(&db);
        repo.create(&credential("c1", 1, "cred-a")).unwrap();

        assert_eq!(repo.find_by_credential_id("cred-a").unwrap().unwrap().id, "c1");
        assert_eq!(repo.list_by_user(1).unwrap().len(), 1);
        assert!(repo.list_by_user(2).unwrap().is_empty());
    }

    #[test]
    fn duplicate_credential_id_rejected() {
        let (db, _dir) = temp_db();
        let repo = CredentialRepository::new(&db);
        repo.create(&credential("c1", 1, "cred-a")).unwrap();
        let result = repo.create(&credential("c2", 2, "cred-a"));
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn cross_user_access_is_not_found() {
        let (db, _dir) = temp_db();
        let repo = CredentialRepository::new(&db);
        repo.create(&credential("c1", 1, "cred-a")).unwrap();

        assert!(repo.get_for_user(2, "c1").unwrap().is_none());
        assert!(matches!(repo.rename(2, "c1", "x"), Err(StorageError::NotFound(_))));
        assert!(matches!(repo.delete(2, "c1"), Err(StorageError::NotFound(_))));

        // Still intact for the owner
        assert_eq!(repo.get_for_user(1, "c1").unwrap().unwrap().display_name, "Laptop");
    }

    #[test]
    fn rename_and_delete_for_owner() {
        let (db, _dir) = temp_db();
        let repo = CredentialRepository::new(&db);
        repo.create(&credential("c1", 1, "cred-a")).unwrap();

        let renamed = repo.rename(1, "c1", "Phone").unwrap();
        assert_eq!(renamed.display_name, "Phone");

        repo.delete(1, "c1").unwrap();
        assert!(repo.find_by_credential_id("cred-a").unwrap().is_none());
    }

    #[test]
    fn record_use_updates_key_material() {
        let (db, _dir) = temp_db();
        let repo = CredentialRepository::new(&db);
        repo.create(&credential("c1", 1, "cred-a")).unwrap();

        let now = Utc::now();
        let updated = repo
            .record_use(1, "c1", Some(r#"{"counter":2}"#.to_string()), now)
            .unwrap();
        assert_eq!(updated.public_key, r#"{"counter":2}"#);
        assert_eq!(updated.last_used_at, Some(now));
    }
}
