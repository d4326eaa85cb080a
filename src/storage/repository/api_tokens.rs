// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! API token repository.
//!
//! Only the SHA-256 digest of a token is stored; the hash index gives a
//! unique lookup from digest to record.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::super::database::{
    decode, encode, AuthDatabase, StorageError, StorageResult, API_TOKENS, API_TOKEN_HASH_INDEX,
};

/// Persisted API token metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiTokenRecord {
    /// Token identifier (UUID)
    pub id: String,
    /// Owner
    pub user_id: i64,
    /// Hex SHA-256 of the raw token
    pub token_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Repository for API token records.
pub struct ApiTokenRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> ApiTokenRepository<'a> {
    /// Create a new ApiTokenRepository.
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Insert a new token record and its hash index entry.
    pub fn create(&self, record: &ApiTokenRecord) -> StorageResult<()> {
        let json = encode(record)?;
        let write_txn = self.db.inner().begin_write()?;
        {
            let mut index = write_txn.open_table(API_TOKEN_HASH_INDEX)?;
            if index.get(record.token_hash.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists("API token hash".to_string()));
            }
            index.insert(record.token_hash.as_str(), record.id.as_str())?;

            let mut table = write_txn.open_table(API_TOKENS)?;
            table.insert(record.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a token by id, regardless of owner.
    pub fn get(&self, token_id: &str) -> StorageResult<Option<ApiTokenRecord>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(API_TOKENS)?;
        match table.get(token_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a token by id, only if owned by `user_id`.
    pub fn get_for_user(&self, user_id: i64, token_id: &str) -> StorageResult<Option<ApiTokenRecord>> {
        Ok(self.get(token_id)?.filter(|record| record.user_id == user_id))
    }

    /// Look up a token by its digest.
    pub fn find_by_hash(&self, token_hash: &str) -> StorageResult<Option<ApiTokenRecord>> {
        let read_txn = self.db.inner().begin_read()?;
        let index = read_txn.open_table(API_TOKEN_HASH_INDEX)?;
        let Some(token_id) = index.get(token_hash)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(API_TOKENS)?;
        match table.get(token_id.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// List all tokens owned by a user, newest first.
    pub fn list_by_user(&self, user_id: i64) -> StorageResult<Vec<ApiTokenRecord>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(API_TOKENS)?;
        let mut tokens = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: ApiTokenRecord = decode(value.value())?;
            if record.user_id == user_id {
                tokens.push(record);
            }
        }
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    /// Mark a token revoked. Already-revoked tokens keep their original timestamp.
    pub fn revoke(&self, token_id: &str, now: DateTime<Utc>) -> StorageResult<ApiTokenRecord> {
        self.modify(token_id, |record| {
            if record.revoked_at.is_none() {
                record.revoked_at = Some(now);
            }
        })
    }

    /// Record a successful use.
    pub fn touch_last_used(&self, token_id: &str, now: DateTime<Utc>) -> StorageResult<()> {
        self.modify(token_id, |record| record.last_used_at = Some(now))
            .map(|_| ())
    }

    /// Delete tokens whose expiry is before `cutoff`. Returns the number removed.
    pub fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let write_txn = self.db.inner().begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(API_TOKENS)?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let record: ApiTokenRecord = decode(value.value())?;
                if record.expires_at < cutoff {
                    stale.push((key.value().to_string(), record.token_hash));
                }
            }

            let mut index = write_txn.open_table(API_TOKEN_HASH_INDEX)?;
            for (id, hash) in &stale {
                table.remove(id.as_str())?;
                index.remove(hash.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn modify(
        &self,
        token_id: &str,
        change: impl FnOnce(&mut ApiTokenRecord),
    ) -> StorageResult<ApiTokenRecord> {
        let write_txn = self.db.inner().begin_write()?;
        let record = {
            let mut table = write_txn.open_table(API_TOKENS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table
                    .get(token_id)?
                    .ok_or_else(|| StorageError::NotFound(format!("API token {token_id}")))?;
                existing.value().to_vec()
            };

            let mut record: ApiTokenRecord = decode(&existing_bytes)?;
            change(&mut record);
            table.insert(token_id, encode(&record)?.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;
    use chrono::Duration;

    fn record(id: &str, user_id: i64, hash: &str, expires_in: Duration) -> ApiTokenRecord {
        let now = Utc::now();
        ApiTokenRecord {
            id: id.to_string(),
            user_id,
            token_hash: hash.to_string(),
            description: None,
            created_at: now,
            expires_at: now + expires_in,
            revoked_at: None,
            last_used_at: None,
        }
    }

    #[test]
    fn create_and_find_by_hash() {
        let (db, _dir) = temp_db();
        let repo = ApiTokenRepository::new(&db);

        repo.create(&record("t1", 1, "abc", Duration::days(1))).unwrap();
        let found = repo.find_by_hash("abc").unwrap().unwrap();
        assert_eq!(found.id, "t1");
        assert!(repo.find_by_hash("zzz").unwrap().is_none());
    }

    #[test]
    fn get_for_user_hides_foreign_tokens() {
        let (db, _dir) = temp_db();
        let repo = ApiTokenRepository::new(&db);

        repo.create(&record("t1", 1, "abc", Duration::days(1))).unwrap();
        assert!(repo.get_for_user(1, "t1").unwrap().is_some());
        assert!(repo.get_for_user(2, "t1").unwrap().is_none());
    }

    #[test]
    fn revoke_keeps_first_timestamp() {
        let (db, _dir) = temp_db();
        let repo = ApiTokenRepository::new(&db);
        repo.create(&record("t1", 1, "abc", Duration::days(1))).unwrap();

        let first = Utc::now() - Duration::hours(1);
        repo.revoke("t1", first).unwrap();
        let again = repo.revoke("t1", Utc::now()).unwrap();
        assert_eq!(again.revoked_at, Some(first));
    }

    #[test]
    fn touch_last_used_records_time() {
        let (db, _dir) = temp_db();
        let repo = ApiTokenRepository::new(&db);
        repo.create(&record("t1", 1, "abc", Duration::days(1))).unwrap();

        let now = Utc::now();
        repo.touch_last_used("t1", now).unwrap();
        assert_eq!(repo.get("t1").unwrap().unwrap().last_used_at, Some(now));

        let missing = repo.touch_last_used("nope", now);
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn delete_expired_before_removes_index_too() {
        let (db, _dir) = temp_db();
        let repo = ApiTokenRepository::new(&db);
        repo.create(&record("old", 1, "h-old", -Duration::days(40))).unwrap();
        repo.create(&record("new", 1, "h-new", Duration::days(10))).unwrap();

        let removed = repo.delete_expired_before(Utc::now() - Duration::days(30)).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_by_hash("h-old").unwrap().is_none());
        assert!(repo.find_by_hash("h-new").unwrap().is_some());

        // Idempotent
        assert_eq!(repo.delete_expired_before(Utc::now() - Duration::days(30)).unwrap(), 0);
    }

    #[test]
    fn list_by_user_filters_owner() {
        let (db, _dir) = temp_db();
        let repo = ApiTokenRepository::new(&db);
        repo.create(&record("a", 1, "h1", Duration::days(1))).unwrap();
        repo.create(&record("b", 1, "h2", Duration::days(1))).unwrap();
        repo.create(&record("c", 2, "h3", Duration::days(1))).unwrap();

        assert_eq!(repo.list_by_user(1).unwrap().len(), 2);
        assert_eq!(repo.list_by_user(2).unwrap().len(), 1);
    }
}
