//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. State is lost on restart; deployments that
//! need durability use the PostgreSQL backend.

use crate::traits::{AdminStore, ChainStore, IdentityStore, QueryWindow, ResetSummary};
use crate::{StorageError, StorageResult};
use aadhaar_types::{AccessToken, ChainEntry, ChainHead, IdentityHash, IdentityRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct IdentityTables {
    by_hash: HashMap<IdentityHash, IdentityRecord>,
    by_token: HashMap<AccessToken, IdentityHash>,
}

#[derive(Default)]
struct ChainTables {
    entries: Vec<ChainEntry>,
    // positions into `entries`, ascending
    by_identity: HashMap<IdentityHash, Vec<usize>>,
}

impl ChainTables {
    fn head(&self) -> ChainHead {
        self.entries
            .last()
            .map(ChainEntry::head)
            .unwrap_or_else(ChainHead::genesis)
    }

    #[cfg(any(test, feature = "test-util"))]
    fn reindex(&mut self) {
        self.by_identity.clear();
        for (pos, entry) in self.entries.iter().enumerate() {
            self.by_identity
                .entry(entry.identity_hash.clone())
                .or_default()
                .push(pos);
        }
    }
}

/// In-memory storage adapter.
///
/// Lock order is always identities before chain.
#[derive(Default)]
pub struct InMemoryLedgerStorage {
    identities: RwLock<IdentityTables>,
    chain: RwLock<ChainTables>,
}

impl InMemoryLedgerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a stored entry in place, bypassing every chain check.
    /// Returns `false` if no entry has that sequence id.
    #[cfg(any(test, feature = "test-util"))]
    pub fn tamper_entry(&self, sequence_id: u64, mutate: impl FnOnce(&mut ChainEntry)) -> bool {
        let Ok(mut chain) = self.chain.write() else {
            return false;
        };
        let Some(entry) = chain
            .entries
            .iter_mut()
            .find(|e| e.sequence_id == sequence_id)
        else {
            return false;
        };
        mutate(entry);
        chain.reindex();
        true
    }

    /// Drop a stored entry, leaving a hole in the sequence.
    #[cfg(any(test, feature = "test-util"))]
    pub fn remove_entry(&self, sequence_id: u64) -> bool {
        let Ok(mut chain) = self.chain.write() else {
            return false;
        };
        let before = chain.entries.len();
        chain.entries.retain(|e| e.sequence_id != sequence_id);
        let removed = chain.entries.len() != before;
        chain.reindex();
        removed
    }
}

fn poisoned(table: &str) -> StorageError {
    StorageError::Backend(format!("{table} lock poisoned"))
}

#[async_trait]
impl IdentityStore for InMemoryLedgerStorage {
    async fn insert_identity(&self, record: IdentityRecord) -> StorageResult<()> {
        let mut guard = self.identities.write().map_err(|_| poisoned("identities"))?;

        if guard.by_hash.contains_key(&record.identity_hash) {
            return Err(StorageError::DuplicateIdentity(
                record.identity_hash.short().to_string(),
            ));
        }
        if guard.by_token.contains_key(&record.access_token) {
            return Err(StorageError::DuplicateToken);
        }

        guard
            .by_token
            .insert(record.access_token, record.identity_hash.clone());
        guard.by_hash.insert(record.identity_hash.clone(), record);
        Ok(())
    }

    async fn get_identity(
        &self,
        identity_hash: &IdentityHash,
    ) -> StorageResult<Option<IdentityRecord>> {
        let guard = self.identities.read().map_err(|_| poisoned("identities"))?;
        Ok(guard.by_hash.get(identity_hash).cloned())
    }

    async fn find_by_token(&self, token: &AccessToken) -> StorageResult<Option<IdentityRecord>> {
        let guard = self.identities.read().map_err(|_| poisoned("identities"))?;
        Ok(guard
            .by_token
            .get(token)
            .and_then(|hash| guard.by_hash.get(hash))
            .cloned())
    }

    async fn set_active(&self, identity_hash: &IdentityHash, active: bool) -> StorageResult<()> {
        let mut guard = self.identities.write().map_err(|_| poisoned("identities"))?;
        let record = guard.by_hash.get_mut(identity_hash).ok_or_else(|| {
            StorageError::NotFound(format!("identity {} not found", identity_hash.short()))
        })?;
        record.active = active;
        Ok(())
    }
}

#[async_trait]
impl ChainStore for InMemoryLedgerStorage {
    async fn append_entry(&self, expected: &ChainHead, entry: &ChainEntry) -> StorageResult<()> {
        if entry.sequence_id != expected.next_sequence() || entry.prev_digest != expected.digest {
            return Err(StorageError::InvariantViolation(format!(
                "entry {} is not the successor of head {}",
                entry.sequence_id, expected.sequence_id
            )));
        }

        let identities = self.identities.read().map_err(|_| poisoned("identities"))?;
        if !identities.by_hash.contains_key(&entry.identity_hash) {
            return Err(StorageError::NotFound(format!(
                "identity {} not found",
                entry.identity_hash.short()
            )));
        }

        let mut chain = self.chain.write().map_err(|_| poisoned("chain"))?;
        let current = chain.head();
        if current.sequence_id != expected.sequence_id {
            return Err(StorageError::StaleHead {
                expected: expected.sequence_id,
                found: current.sequence_id,
            });
        }
        if current.digest != expected.digest {
            return Err(StorageError::InvariantViolation(format!(
                "head digest mismatch at sequence {}",
                current.sequence_id
            )));
        }

        let pos = chain.entries.len();
        chain.entries.push(entry.clone());
        chain
            .by_identity
            .entry(entry.identity_hash.clone())
            .or_default()
            .push(pos);
        Ok(())
    }

    async fn chain_head(&self) -> StorageResult<ChainHead> {
        let chain = self.chain.read().map_err(|_| poisoned("chain"))?;
        Ok(chain.head())
    }

    async fn entries_for_identity(
        &self,
        identity_hash: &IdentityHash,
        window: QueryWindow,
    ) -> StorageResult<Vec<ChainEntry>> {
        let chain = self.chain.read().map_err(|_| poisoned("chain"))?;
        let Some(positions) = chain.by_identity.get(identity_hash) else {
            return Ok(Vec::new());
        };
        Ok(window.apply(positions.iter().filter_map(|pos| chain.entries.get(*pos).cloned())))
    }

    async fn entries_after(&self, after: u64, limit: usize) -> StorageResult<Vec<ChainEntry>> {
        let chain = self.chain.read().map_err(|_| poisoned("chain"))?;
        let window = QueryWindow { limit, offset: 0 };
        Ok(window.apply(
            chain
                .entries
                .iter()
                .filter(|e| e.sequence_id > after)
                .cloned(),
        ))
    }
}

#[async_trait]
impl AdminStore for InMemoryLedgerStorage {
    async fn reset_all(&self) -> StorageResult<ResetSummary> {
        let mut identities = self.identities.write().map_err(|_| poisoned("identities"))?;
        let mut chain = self.chain.write().map_err(|_| poisoned("chain"))?;

        let summary = ResetSummary {
            identities_removed: identities.by_hash.len() as u64,
            entries_removed: chain.entries.len() as u64,
        };
        *identities = IdentityTables::default();
        *chain = ChainTables::default();
        Ok(summary)
    }

    fn backend_label(&self) -> &'static str {
        "memory"
    }
}
