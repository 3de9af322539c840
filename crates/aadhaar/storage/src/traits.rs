use crate::StorageResult;
use aadhaar_types::{AccessToken, ChainEntry, ChainHead, IdentityHash, IdentityRecord};
use async_trait::async_trait;

/// Generic query window for paged reads. `limit == 0` returns everything after `offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub(crate) fn apply<T>(self, items: impl Iterator<Item = T>) -> Vec<T> {
        let iter = items.skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

/// Row counts removed by a bulk reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub identities_removed: u64,
    pub entries_removed: u64,
}

/// Storage interface for identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateIdentity` or `DuplicateToken`.
    async fn insert_identity(&self, record: IdentityRecord) -> StorageResult<()>;

    async fn get_identity(&self, identity_hash: &IdentityHash)
        -> StorageResult<Option<IdentityRecord>>;

    async fn find_by_token(&self, token: &AccessToken) -> StorageResult<Option<IdentityRecord>>;

    /// Flip the soft-delete flag. `NotFound` if the identity does not exist.
    async fn set_active(&self, identity_hash: &IdentityHash, active: bool) -> StorageResult<()>;
}

/// Storage interface for the append-only chain log.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Insert `entry` iff the stored head is still `expected`.
    ///
    /// Returns `StaleHead` when another writer moved the head, and
    /// `InvariantViolation` when `entry` is not the successor of `expected`.
    async fn append_entry(&self, expected: &ChainHead, entry: &ChainEntry) -> StorageResult<()>;

    /// Current head, `{0, GENESIS}` when empty.
    async fn chain_head(&self) -> StorageResult<ChainHead>;

    /// Entries for one identity, ascending sequence id.
    async fn entries_for_identity(
        &self,
        identity_hash: &IdentityHash,
        window: QueryWindow,
    ) -> StorageResult<Vec<ChainEntry>>;

    /// Up to `limit` entries with `sequence_id > after`, ascending.
    async fn entries_after(&self, after: u64, limit: usize) -> StorageResult<Vec<ChainEntry>>;
}

/// Maintenance operations.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Remove every identity and chain entry. Development deployments only.
    async fn reset_all(&self) -> StorageResult<ResetSummary>;

    fn backend_label(&self) -> &'static str;
}

/// Unified storage bundle used by the registry, the chain log and the gateway.
pub trait LedgerStorage: IdentityStore + ChainStore + AdminStore + Send + Sync {}

impl<T> LedgerStorage for T where T: IdentityStore + ChainStore + AdminStore + Send + Sync {}
