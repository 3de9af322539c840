//! Aadhaar Lite Ledger - the hash-chained service-usage log.
//!
//! One global chain per deployment. Every entry commits to its predecessor's
//! digest, so editing, dropping or reordering stored entries is detected when
//! the chain is walked.
//!
//! Appends are serialized twice: a process-local mutex around the cached head,
//! and the storage backend's compare-and-append for writers in other processes.

#![deny(unsafe_code)]

mod integrity;

pub use integrity::{verify_entries, BreakKind, ChainBreak, ChainVerifier, IntegrityReport};

use aadhaar_storage::{LedgerStorage, QueryWindow, ResetSummary, StorageError};
use aadhaar_types::{capture_timestamp, ChainEntry, ChainHead, IdentityHash, TypesError, UsageEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(20);

/// Tunables for the chain log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainLogConfig {
    /// Total tries per append across stale-head refreshes and transient failures.
    pub append_attempts: usize,
    /// Entries fetched per page while verifying.
    pub verify_page_size: usize,
}

impl Default for ChainLogConfig {
    fn default() -> Self {
        Self {
            append_attempts: 3,
            verify_page_size: 500,
        }
    }
}

/// The chain log facade over a storage backend.
pub struct ChainLog {
    storage: Arc<dyn LedgerStorage>,
    // `None` until first use, and again after any failure that leaves the
    // backend state uncertain.
    head: Mutex<Option<ChainHead>>,
    config: ChainLogConfig,
}

impl ChainLog {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self::with_config(storage, ChainLogConfig::default())
    }

    pub fn with_config(storage: Arc<dyn LedgerStorage>, config: ChainLogConfig) -> Self {
        Self {
            storage,
            head: Mutex::new(None),
            config: ChainLogConfig {
                append_attempts: config.append_attempts.max(1),
                verify_page_size: config.verify_page_size.max(1),
            },
        }
    }

    pub fn storage(&self) -> Arc<dyn LedgerStorage> {
        Arc::clone(&self.storage)
    }

    /// Validate a raw payload and append it for `identity_hash`.
    pub async fn append(
        &self,
        identity_hash: &IdentityHash,
        event_kind: &str,
        quantity: Option<f64>,
        unit: Option<&str>,
    ) -> Result<ChainEntry, LedgerError> {
        let event = UsageEvent::new(event_kind, quantity, unit)?;
        self.append_event(identity_hash, &event).await
    }

    /// Append a validated event. Returns only after the backend reports a durable insert.
    pub async fn append_event(
        &self,
        identity_hash: &IdentityHash,
        event: &UsageEvent,
    ) -> Result<ChainEntry, LedgerError> {
        self.ensure_active(identity_hash).await?;

        let mut cached = self.head.lock().await;
        let mut head = match cached.as_ref() {
            Some(head) => head.clone(),
            None => self.storage.chain_head().await?,
        };
        let mut entry = ChainEntry::seal(&head, identity_hash.clone(), event, capture_timestamp());

        let mut attempt = 1;
        loop {
            let err = match self.storage.append_entry(&head, &entry).await {
                Ok(()) => {
                    *cached = Some(entry.head());
                    info!(
                        sequence_id = entry.sequence_id,
                        identity = identity_hash.short(),
                        digest = entry.entry_digest.short(),
                        "chain entry appended"
                    );
                    return Ok(entry);
                }
                Err(err) => err,
            };

            if attempt >= self.config.append_attempts {
                *cached = None;
                error!(attempt, error = %err, "chain append failed; attempts exhausted");
                return Err(LedgerError::from(err));
            }

            match err {
                StorageError::StaleHead { expected, found } => {
                    warn!(expected, found, attempt, "chain head moved; resealing");
                    head = match self.storage.chain_head().await {
                        Ok(current) => current,
                        Err(err) => {
                            *cached = None;
                            error!(error = %err, "could not refresh chain head");
                            return Err(LedgerError::from(err));
                        }
                    };
                    entry = ChainEntry::seal(
                        &head,
                        identity_hash.clone(),
                        event,
                        capture_timestamp(),
                    );
                }
                err if err.is_transient() => {
                    warn!(attempt, error = %err, "transient storage failure during append");
                    tokio::time::sleep(RETRY_BACKOFF_BASE * (1u32 << (attempt - 1).min(6))).await;

                    match self.storage.chain_head().await {
                        // The failed call actually committed.
                        Ok(current) if current == entry.head() => {
                            *cached = Some(current);
                            info!(
                                sequence_id = entry.sequence_id,
                                "chain entry found committed after transient failure"
                            );
                            return Ok(entry);
                        }
                        Ok(current) if current == head => {
                            debug!("retrying prepared entry");
                        }
                        Ok(current) => {
                            head = current;
                            entry = ChainEntry::seal(
                                &head,
                                identity_hash.clone(),
                                event,
                                capture_timestamp(),
                            );
                        }
                        Err(err) if err.is_transient() => {
                            debug!(error = %err, "head unavailable; retrying prepared entry");
                        }
                        Err(err) => {
                            *cached = None;
                            error!(error = %err, "could not refresh chain head");
                            return Err(LedgerError::from(err));
                        }
                    }
                }
                other => {
                    *cached = None;
                    error!(error = %other, "chain append failed");
                    return Err(LedgerError::from(other));
                }
            }
            attempt += 1;
        }
    }

    /// Entries recorded for one identity, ascending sequence id.
    pub async fn history_for(
        &self,
        identity_hash: &IdentityHash,
        window: QueryWindow,
    ) -> Result<Vec<ChainEntry>, LedgerError> {
        self.ensure_active(identity_hash).await?;
        Ok(self
            .storage
            .entries_for_identity(identity_hash, window)
            .await?)
    }

    /// Walk the chain up to the head observed at the start of the call.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let snapshot = self.storage.chain_head().await?;
        let mut verifier = ChainVerifier::new();

        while verifier.entries_checked() < snapshot.sequence_id {
            let after = verifier.head().sequence_id;
            let page = self
                .storage
                .entries_after(after, self.config.verify_page_size)
                .await?;
            if page.is_empty() {
                return Ok(self.report_broken(&verifier, verifier.missing_next()));
            }

            for entry in page.iter().take_while(|e| e.sequence_id <= snapshot.sequence_id) {
                if let Err(first_break) = verifier.check(entry) {
                    return Ok(self.report_broken(&verifier, first_break));
                }
            }

            if verifier.head().sequence_id == after {
                // Nothing in this page was inside the snapshot.
                return Ok(self.report_broken(&verifier, verifier.missing_next()));
            }
        }

        let report = verifier.finish();
        info!(?report, "chain verified");
        Ok(report)
    }

    /// Wipe every identity and entry. Holds the append lock so no append
    /// straddles the reset.
    pub async fn reset_all(&self) -> Result<ResetSummary, LedgerError> {
        let mut cached = self.head.lock().await;
        *cached = None;
        let summary = self.storage.reset_all().await?;
        warn!(
            identities_removed = summary.identities_removed,
            entries_removed = summary.entries_removed,
            "storage reset"
        );
        Ok(summary)
    }

    fn report_broken(&self, verifier: &ChainVerifier, first_break: ChainBreak) -> IntegrityReport {
        warn!(
            sequence_id = first_break.sequence_id,
            kind = ?first_break.kind,
            "chain integrity break"
        );
        verifier.broken(first_break)
    }

    async fn ensure_active(&self, identity_hash: &IdentityHash) -> Result<(), LedgerError> {
        match self.storage.get_identity(identity_hash).await? {
            Some(record) if record.active => Ok(()),
            _ => Err(LedgerError::IdentityNotFound),
        }
    }
}

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] TypesError),

    #[error("identity not found or inactive")]
    IdentityNotFound,

    #[error("storage failure: {0}")]
    StorageFailure(StorageError),
}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(_) => Self::IdentityNotFound,
            other => Self::StorageFailure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aadhaar_storage::{
        AdminStore, ChainStore, IdentityStore, InMemoryLedgerStorage, ResetSummary, StorageResult,
    };
    use aadhaar_types::{AccessToken, Digest, IdentityRecord, Profile, SecretHash, GENESIS};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity_record(number: &str) -> IdentityRecord {
        IdentityRecord {
            identity_hash: IdentityHash::from_raw_number(number).unwrap(),
            secret_hash: SecretHash::from_raw_secret("1234").unwrap(),
            profile: Profile {
                display_name: "Meera".to_string(),
                date_of_birth: None,
                region_code: None,
            },
            access_token: AccessToken::generate(),
            active: true,
            registered_at: capture_timestamp(),
        }
    }

    async fn seeded(numbers: &[&str]) -> (Arc<InMemoryLedgerStorage>, Vec<IdentityHash>) {
        let storage = Arc::new(InMemoryLedgerStorage::new());
        let mut hashes = Vec::new();
        for number in numbers {
            let record = identity_record(number);
            hashes.push(record.identity_hash.clone());
            storage.insert_identity(record).await.unwrap();
        }
        (storage, hashes)
    }

    #[tokio::test]
    async fn three_water_events_form_a_linked_chain() {
        let (storage, ids) = seeded(&["123456789012"]).await;
        let log = ChainLog::new(storage);

        let mut entries = Vec::new();
        for _ in 0..3 {
            entries.push(log.append(&ids[0], "water", Some(10.0), Some("L")).await.unwrap());
        }

        assert_eq!(
            entries.iter().map(|e| e.sequence_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(entries[0].prev_digest.as_str(), GENESIS);
        assert_eq!(entries[1].prev_digest, entries[0].entry_digest);
        assert_eq!(entries[2].prev_digest, entries[1].entry_digest);

        let report = log.verify_integrity().await.unwrap();
        assert_eq!(
            report,
            IntegrityReport::Valid {
                entries_checked: 3,
                head_digest: entries[2].entry_digest.clone()
            }
        );
    }

    #[tokio::test]
    async fn invalid_payload_and_unknown_identity_are_rejected() {
        let (storage, ids) = seeded(&["123456789012"]).await;
        let log = ChainLog::new(storage.clone());

        assert!(matches!(
            log.append(&ids[0], "  ", None, None).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            log.append(&ids[0], "water", Some(f64::NAN), None).await,
            Err(LedgerError::InvalidInput(_))
        ));

        let stranger = IdentityHash::from_raw_number("999999999999").unwrap();
        assert!(matches!(
            log.append(&stranger, "water", None, None).await,
            Err(LedgerError::IdentityNotFound)
        ));

        storage.set_active(&ids[0], false).await.unwrap();
        assert!(matches!(
            log.append(&ids[0], "water", None, None).await,
            Err(LedgerError::IdentityNotFound)
        ));
        assert!(matches!(
            log.history_for(&ids[0], QueryWindow::all()).await,
            Err(LedgerError::IdentityNotFound)
        ));
        assert_eq!(storage.chain_head().await.unwrap(), ChainHead::genesis());
    }

    #[tokio::test]
    async fn history_contains_exactly_the_identity_entries() {
        let (storage, ids) = seeded(&["111111111111", "222222222222"]).await;
        let log = ChainLog::new(storage);

        for i in 0..7 {
            let who = &ids[i % 2];
            log.append(who, "ration", Some(i as f64), Some("kg")).await.unwrap();
        }

        let first = log.history_for(&ids[0], QueryWindow::all()).await.unwrap();
        assert_eq!(
            first.iter().map(|e| e.sequence_id).collect::<Vec<_>>(),
            vec![1, 3, 5, 7]
        );
        assert!(first.iter().all(|e| e.identity_hash == ids[0]));

        let second = log
            .history_for(&ids[1], QueryWindow { limit: 2, offset: 1 })
            .await
            .unwrap();
        assert_eq!(
            second.iter().map(|e| e.sequence_id).collect::<Vec<_>>(),
            vec![4, 6]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_never_fork() {
        let (storage, ids) = seeded(&["111111111111", "222222222222", "333333333333"]).await;
        let log = Arc::new(ChainLog::new(storage));
        let tasks = 48;

        let mut handles = Vec::new();
        for i in 0..tasks {
            let log = Arc::clone(&log);
            let who = ids[i % ids.len()].clone();
            handles.push(tokio::spawn(async move {
                log.append(&who, "water", Some(1.0), Some("L")).await.unwrap()
            }));
        }

        let mut sequence_ids = HashSet::new();
        let mut prev_digests = HashSet::new();
        for handle in handles {
            let entry = handle.await.unwrap();
            assert!(sequence_ids.insert(entry.sequence_id));
            assert!(prev_digests.insert(entry.prev_digest.clone()));
        }
        assert_eq!(sequence_ids, (1..=tasks as u64).collect::<HashSet<_>>());

        let report = log.verify_integrity().await.unwrap();
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn two_logs_on_one_store_reseal_on_stale_head() {
        let (storage, ids) = seeded(&["123456789012"]).await;
        let a = ChainLog::new(storage.clone());
        let b = ChainLog::new(storage.clone());

        a.append(&ids[0], "water", Some(1.0), None).await.unwrap();
        b.append(&ids[0], "water", Some(2.0), None).await.unwrap();
        // `a` still caches head 1.
        let third = a.append(&ids[0], "water", Some(3.0), None).await.unwrap();

        assert_eq!(third.sequence_id, 3);
        assert!(a.verify_integrity().await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn verification_is_paged() {
        let (storage, ids) = seeded(&["123456789012"]).await;
        let log = ChainLog::with_config(
            storage.clone(),
            ChainLogConfig {
                append_attempts: 3,
                verify_page_size: 2,
            },
        );
        for _ in 0..5 {
            log.append(&ids[0], "water", None, None).await.unwrap();
        }
        assert!(matches!(
            log.verify_integrity().await.unwrap(),
            IntegrityReport::Valid {
                entries_checked: 5,
                ..
            }
        ));

        assert!(storage.remove_entry(4));
        assert_eq!(
            log.verify_integrity().await.unwrap().first_break(),
            Some(ChainBreak {
                sequence_id: 4,
                kind: BreakKind::SequenceGap
            })
        );
    }

    #[tokio::test]
    async fn reset_restarts_the_chain_at_genesis() {
        let (storage, ids) = seeded(&["123456789012"]).await;
        let log = ChainLog::new(storage.clone());
        log.append(&ids[0], "water", None, None).await.unwrap();
        log.append(&ids[0], "water", None, None).await.unwrap();

        let summary = log.reset_all().await.unwrap();
        assert_eq!(summary.identities_removed, 1);
        assert_eq!(summary.entries_removed, 2);

        let record = identity_record("123456789012");
        storage.insert_identity(record).await.unwrap();
        let entry = log.append(&ids[0], "water", None, None).await.unwrap();
        assert_eq!(entry.sequence_id, 1);
        assert!(entry.prev_digest.is_genesis());
    }

    #[tokio::test]
    async fn empty_chain_verifies_at_genesis() {
        let (storage, _) = seeded(&[]).await;
        let log = ChainLog::new(storage);
        assert_eq!(
            log.verify_integrity().await.unwrap(),
            IntegrityReport::Valid {
                entries_checked: 0,
                head_digest: Digest::genesis()
            }
        );
    }

    /// Fails `append_entry` with `Unavailable`, optionally after committing.
    /// With `grow_on_page` set, every `entries_after` call first appends one
    /// entry for that identity, as a writer in another process would.
    struct FlakyStorage {
        inner: InMemoryLedgerStorage,
        failures: AtomicUsize,
        commit_before_failing: bool,
        append_calls: AtomicUsize,
        grow_on_page: std::sync::Mutex<Option<IdentityHash>>,
    }

    impl FlakyStorage {
        fn new(failures: usize, commit_before_failing: bool) -> Self {
            Self {
                inner: InMemoryLedgerStorage::new(),
                failures: AtomicUsize::new(failures),
                commit_before_failing,
                append_calls: AtomicUsize::new(0),
                grow_on_page: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl IdentityStore for FlakyStorage {
        async fn insert_identity(&self, record: IdentityRecord) -> StorageResult<()> {
            self.inner.insert_identity(record).await
        }

        async fn get_identity(
            &self,
            identity_hash: &IdentityHash,
        ) -> StorageResult<Option<IdentityRecord>> {
            self.inner.get_identity(identity_hash).await
        }

        async fn find_by_token(
            &self,
            token: &AccessToken,
        ) -> StorageResult<Option<IdentityRecord>> {
            self.inner.find_by_token(token).await
        }

        async fn set_active(&self, identity_hash: &IdentityHash, active: bool) -> StorageResult<()> {
            self.inner.set_active(identity_hash, active).await
        }
    }

    #[async_trait]
    impl ChainStore for FlakyStorage {
        async fn append_entry(&self, expected: &ChainHead, entry: &ChainEntry) -> StorageResult<()> {
            self.append_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                if self.commit_before_failing {
                    self.inner.append_entry(expected, entry).await?;
                }
                return Err(StorageError::Unavailable("connection reset".to_string()));
            }
            self.inner.append_entry(expected, entry).await
        }

        async fn chain_head(&self) -> StorageResult<ChainHead> {
            self.inner.chain_head().await
        }

        async fn entries_for_identity(
            &self,
            identity_hash: &IdentityHash,
            window: QueryWindow,
        ) -> StorageResult<Vec<ChainEntry>> {
            self.inner.entries_for_identity(identity_hash, window).await
        }

        async fn entries_after(&self, after: u64, limit: usize) -> StorageResult<Vec<ChainEntry>> {
            let grower = self.grow_on_page.lock().unwrap().clone();
            if let Some(identity) = grower {
                let head = self.inner.chain_head().await?;
                let event = UsageEvent::new("late", Some(1.0), None).unwrap();
                let late = ChainEntry::seal(&head, identity, &event, capture_timestamp());
                self.inner.append_entry(&head, &late).await?;
            }
            self.inner.entries_after(after, limit).await
        }
    }

    #[async_trait]
    impl AdminStore for FlakyStorage {
        async fn reset_all(&self) -> StorageResult<ResetSummary> {
            self.inner.reset_all().await
        }

        fn backend_label(&self) -> &'static str {
            "flaky"
        }
    }

    async fn flaky(failures: usize, commit_before_failing: bool) -> (Arc<FlakyStorage>, IdentityHash) {
        let storage = Arc::new(FlakyStorage::new(failures, commit_before_failing));
        let record = identity_record("123456789012");
        let hash = record.identity_hash.clone();
        storage.insert_identity(record).await.unwrap();
        (storage, hash)
    }

    #[tokio::test]
    async fn transient_failure_retries_the_prepared_entry() {
        let (storage, id) = flaky(1, false).await;
        let log = ChainLog::new(storage.clone());

        let entry = log.append(&id, "water", Some(5.0), Some("L")).await.unwrap();
        assert_eq!(entry.sequence_id, 1);
        assert_eq!(storage.append_calls.load(Ordering::SeqCst), 2);
        assert_eq!(storage.chain_head().await.unwrap(), entry.head());
    }

    #[tokio::test]
    async fn transient_failure_after_commit_is_not_duplicated() {
        let (storage, id) = flaky(1, true).await;
        let log = ChainLog::new(storage.clone());

        let entry = log.append(&id, "water", Some(5.0), Some("L")).await.unwrap();
        assert_eq!(entry.sequence_id, 1);
        assert_eq!(storage.append_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            storage.entries_after(0, 0).await.unwrap(),
            vec![entry]
        );
    }

    #[tokio::test]
    async fn entries_appended_mid_walk_are_outside_the_report() {
        let (storage, id) = flaky(0, false).await;
        let log = ChainLog::with_config(
            storage.clone(),
            ChainLogConfig {
                append_attempts: 3,
                verify_page_size: 2,
            },
        );
        for _ in 0..5 {
            log.append(&id, "water", None, None).await.unwrap();
        }
        let snapshot = storage.chain_head().await.unwrap();
        *storage.grow_on_page.lock().unwrap() = Some(id.clone());

        let report = log.verify_integrity().await.unwrap();
        assert_eq!(
            report,
            IntegrityReport::Valid {
                entries_checked: 5,
                head_digest: snapshot.digest.clone()
            }
        );
        // Pages after 0, 2 and 4 each grew the chain by one.
        assert_eq!(storage.chain_head().await.unwrap().sequence_id, 8);

        *storage.grow_on_page.lock().unwrap() = None;
        assert!(matches!(
            log.verify_integrity().await.unwrap(),
            IntegrityReport::Valid {
                entries_checked: 8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_storage_failure() {
        let (storage, id) = flaky(10, false).await;
        let log = ChainLog::new(storage.clone());

        let err = log.append(&id, "water", None, None).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::StorageFailure(StorageError::Unavailable(_))
        ));
        assert_eq!(storage.append_calls.load(Ordering::SeqCst), 3);
        assert_eq!(storage.chain_head().await.unwrap(), ChainHead::genesis());
    }

    #[derive(Debug, Clone, Copy)]
    enum Tamper {
        Identity,
        Kind,
        Quantity,
        Unit,
        RecordedAt,
        PrevDigest,
        EntryDigest,
        SequenceId,
    }

    fn tamper_strategy() -> impl Strategy<Value = Tamper> {
        prop_oneof![
            Just(Tamper::Identity),
            Just(Tamper::Kind),
            Just(Tamper::Quantity),
            Just(Tamper::Unit),
            Just(Tamper::RecordedAt),
            Just(Tamper::PrevDigest),
            Just(Tamper::EntryDigest),
            Just(Tamper::SequenceId),
        ]
    }

    fn apply(tamper: Tamper, entry: &mut ChainEntry) {
        match tamper {
            Tamper::Identity => {
                entry.identity_hash = IdentityHash::from_raw_number("555555555555").unwrap()
            }
            Tamper::Kind => entry.event_kind.push('x'),
            Tamper::Quantity => entry.quantity = Some(entry.quantity.unwrap_or(0.0) + 1.0),
            Tamper::Unit => {
                entry.unit = match entry.unit {
                    Some(_) => None,
                    None => Some("L".to_string()),
                }
            }
            Tamper::RecordedAt => entry.recorded_at += chrono::Duration::microseconds(1),
            Tamper::PrevDigest => entry.prev_digest = forged_digest(),
            Tamper::EntryDigest => entry.entry_digest = forged_digest(),
            Tamper::SequenceId => entry.sequence_id += 1_000,
        }
    }

    fn forged_digest() -> Digest {
        Digest::parse(&"f".repeat(64)).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_out_of_band_edit_is_pinpointed(
            len in 1u64..8,
            pick in any::<proptest::sample::Index>(),
            tamper in tamper_strategy(),
            page in 1usize..4,
        ) {
            let target = pick.index(len as usize) as u64 + 1;
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            let report = rt.block_on(async move {
                let (storage, ids) = seeded(&["123456789012"]).await;
                let log = ChainLog::with_config(
                    storage.clone(),
                    ChainLogConfig { append_attempts: 3, verify_page_size: page },
                );
                for i in 0..len {
                    log.append(&ids[0], "water", Some(i as f64), Some("L")).await.unwrap();
                }
                assert!(log.verify_integrity().await.unwrap().is_valid());
                assert!(storage.tamper_entry(target, |entry| apply(tamper, entry)));
                log.verify_integrity().await.unwrap()
            });

            let first_break = report.first_break();
            prop_assert!(first_break.is_some(), "tamper {:?} at {} went unnoticed", tamper, target);
            prop_assert_eq!(first_break.map(|b| b.sequence_id), Some(target));
        }
    }
}
