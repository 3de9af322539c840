//! PostgreSQL adapter.
//!
//! Appends run inside a transaction that takes `LOCK TABLE ... IN EXCLUSIVE MODE`
//! on the chain table, so processes sharing one database serialize on the head
//! check and the insert.

use crate::traits::{AdminStore, ChainStore, IdentityStore, QueryWindow, ResetSummary};
use crate::{StorageError, StorageResult};
use aadhaar_types::{
    AccessToken, ChainEntry, ChainHead, Digest, IdentityHash, IdentityRecord, Profile, SecretHash,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Acquire, Row};

const IDENTITY_PKEY: &str = "aadhaar_identities_pkey";
const IDENTITY_TOKEN_KEY: &str = "aadhaar_identities_access_token_key";
const CHAIN_IDENTITY_FKEY: &str = "aadhaar_chain_entries_identity_fkey";

const ENTRY_COLUMNS: &str = "sequence_id, identity_hash, event_kind, quantity, unit, recorded_at, prev_digest, entry_digest";
const IDENTITY_COLUMNS: &str = "identity_hash, secret_hash, display_name, date_of_birth, region_code, access_token, active, registered_at";

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresLedgerStorage {
    pool: PgPool,
}

impl PostgresLedgerStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS aadhaar_identities (
                identity_hash TEXT NOT NULL,
                secret_hash TEXT NOT NULL,
                display_name TEXT NOT NULL,
                date_of_birth DATE,
                region_code TEXT,
                access_token TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                registered_at TIMESTAMPTZ NOT NULL,
                CONSTRAINT aadhaar_identities_pkey PRIMARY KEY (identity_hash),
                CONSTRAINT aadhaar_identities_access_token_key UNIQUE (access_token)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS aadhaar_chain_entries (
                sequence_id BIGINT NOT NULL,
                identity_hash TEXT NOT NULL,
                event_kind TEXT NOT NULL,
                quantity DOUBLE PRECISION,
                unit TEXT,
                recorded_at TIMESTAMPTZ NOT NULL,
                prev_digest TEXT NOT NULL,
                entry_digest TEXT NOT NULL,
                CONSTRAINT aadhaar_chain_entries_pkey PRIMARY KEY (sequence_id),
                CONSTRAINT aadhaar_chain_entries_entry_digest_key UNIQUE (entry_digest),
                CONSTRAINT aadhaar_chain_entries_identity_fkey
                    FOREIGN KEY (identity_hash) REFERENCES aadhaar_identities (identity_hash)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS aadhaar_chain_entries_identity_idx
                ON aadhaar_chain_entries (identity_hash, sequence_id)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn fetch_identity(
        &self,
        column: &str,
        value: &str,
    ) -> StorageResult<Option<IdentityRecord>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM aadhaar_identities WHERE {column} = $1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(identity_row_to_record).transpose()
    }
}

#[async_trait]
impl IdentityStore for PostgresLedgerStorage {
    async fn insert_identity(&self, record: IdentityRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO aadhaar_identities
                (identity_hash, secret_hash, display_name, date_of_birth, region_code, access_token, active, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.identity_hash.as_str())
        .bind(record.secret_hash.to_hex())
        .bind(&record.profile.display_name)
        .bind(record.profile.date_of_birth)
        .bind(record.profile.region_code.as_deref())
        .bind(record.access_token.to_string())
        .bind(record.active)
        .bind(record.registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e) {
            StorageError::DuplicateIdentity(_) => {
                StorageError::DuplicateIdentity(record.identity_hash.short().to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get_identity(
        &self,
        identity_hash: &IdentityHash,
    ) -> StorageResult<Option<IdentityRecord>> {
        self.fetch_identity("identity_hash", identity_hash.as_str())
            .await
    }

    async fn find_by_token(&self, token: &AccessToken) -> StorageResult<Option<IdentityRecord>> {
        self.fetch_identity("access_token", &token.to_string()).await
    }

    async fn set_active(&self, identity_hash: &IdentityHash, active: bool) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE aadhaar_identities SET active = $1 WHERE identity_hash = $2")
                .bind(active)
                .bind(identity_hash.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "identity {} not found",
                identity_hash.short()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainStore for PostgresLedgerStorage {
    async fn append_entry(&self, expected: &ChainHead, entry: &ChainEntry) -> StorageResult<()> {
        if entry.sequence_id != expected.next_sequence() || entry.prev_digest != expected.digest {
            return Err(StorageError::InvariantViolation(format!(
                "entry {} is not the successor of head {}",
                entry.sequence_id, expected.sequence_id
            )));
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let conn = tx.acquire().await.map_err(map_sqlx_error)?;

        sqlx::query("LOCK TABLE aadhaar_chain_entries IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let last = sqlx::query(
            "SELECT sequence_id, entry_digest FROM aadhaar_chain_entries ORDER BY sequence_id DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
        let current = last.map(head_row).transpose()?.unwrap_or_else(ChainHead::genesis);

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

        sqlx::query(
            r#"
            INSERT INTO aadhaar_chain_entries
                (sequence_id, identity_hash, event_kind, quantity, unit, recorded_at, prev_digest, entry_digest)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(to_i64(entry.sequence_id)?)
        .bind(entry.identity_hash.as_str())
        .bind(&entry.event_kind)
        .bind(entry.quantity)
        .bind(entry.unit.as_deref())
        .bind(entry.recorded_at)
        .bind(entry.prev_digest.as_str())
        .bind(entry.entry_digest.as_str())
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn chain_head(&self) -> StorageResult<ChainHead> {
        let row = sqlx::query(
            "SELECT sequence_id, entry_digest FROM aadhaar_chain_entries ORDER BY sequence_id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(head_row).transpose()?.unwrap_or_else(ChainHead::genesis))
    }

    async fn entries_for_identity(
        &self,
        identity_hash: &IdentityHash,
        window: QueryWindow,
    ) -> StorageResult<Vec<ChainEntry>> {
        let rows = if window.limit == 0 {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM aadhaar_chain_entries WHERE identity_hash = $1 ORDER BY sequence_id ASC OFFSET $2"
            );
            sqlx::query(&sql)
                .bind(identity_hash.as_str())
                .bind(usize_to_i64(window.offset)?)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        } else {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM aadhaar_chain_entries WHERE identity_hash = $1 ORDER BY sequence_id ASC LIMIT $2 OFFSET $3"
            );
            sqlx::query(&sql)
                .bind(identity_hash.as_str())
                .bind(usize_to_i64(window.limit)?)
                .bind(usize_to_i64(window.offset)?)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        };

        rows.into_iter().map(entry_row_to_record).collect()
    }

    async fn entries_after(&self, after: u64, limit: usize) -> StorageResult<Vec<ChainEntry>> {
        let rows = if limit == 0 {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM aadhaar_chain_entries WHERE sequence_id > $1 ORDER BY sequence_id ASC"
            );
            sqlx::query(&sql)
                .bind(to_i64(after)?)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        } else {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM aadhaar_chain_entries WHERE sequence_id > $1 ORDER BY sequence_id ASC LIMIT $2"
            );
            sqlx::query(&sql)
                .bind(to_i64(after)?)
                .bind(usize_to_i64(limit)?)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?
        };

        rows.into_iter().map(entry_row_to_record).collect()
    }
}

#[async_trait]
impl AdminStore for PostgresLedgerStorage {
    async fn reset_all(&self) -> StorageResult<ResetSummary> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let conn = tx.acquire().await.map_err(map_sqlx_error)?;

        let entries = sqlx::query("DELETE FROM aadhaar_chain_entries")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        let identities = sqlx::query("DELETE FROM aadhaar_identities")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ResetSummary {
            identities_removed: identities.rows_affected(),
            entries_removed: entries.rows_affected(),
        })
    }

    fn backend_label(&self) -> &'static str {
        "postgres"
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Serialization(format!("column {column}: {e}")))
}

fn head_row(row: PgRow) -> StorageResult<ChainHead> {
    let sequence_id: i64 = get(&row, "sequence_id")?;
    let digest: String = get(&row, "entry_digest")?;
    Ok(ChainHead {
        sequence_id: from_i64(sequence_id)?,
        digest: Digest::parse(&digest).map_err(|e| StorageError::Serialization(e.to_string()))?,
    })
}

fn identity_row_to_record(row: PgRow) -> StorageResult<IdentityRecord> {
    let identity_hash: String = get(&row, "identity_hash")?;
    let secret_hash: String = get(&row, "secret_hash")?;
    let access_token: String = get(&row, "access_token")?;
    let date_of_birth: Option<NaiveDate> = get(&row, "date_of_birth")?;
    let registered_at: DateTime<Utc> = get(&row, "registered_at")?;

    Ok(IdentityRecord {
        identity_hash: IdentityHash::from_hex(&identity_hash)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        secret_hash: SecretHash::from_hex(&secret_hash)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        profile: Profile {
            display_name: get(&row, "display_name")?,
            date_of_birth,
            region_code: get(&row, "region_code")?,
        },
        access_token: AccessToken::parse(&access_token)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        active: get(&row, "active")?,
        registered_at,
    })
}

fn entry_row_to_record(row: PgRow) -> StorageResult<ChainEntry> {
    let sequence_id: i64 = get(&row, "sequence_id")?;
    let identity_hash: String = get(&row, "identity_hash")?;
    let prev_digest: String = get(&row, "prev_digest")?;
    let entry_digest: String = get(&row, "entry_digest")?;

    Ok(ChainEntry {
        sequence_id: from_i64(sequence_id)?,
        identity_hash: IdentityHash::from_hex(&identity_hash)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        event_kind: get(&row, "event_kind")?,
        quantity: get(&row, "quantity")?,
        unit: get(&row, "unit")?,
        recorded_at: get(&row, "recorded_at")?,
        prev_digest: Digest::parse(&prev_digest)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        entry_digest: Digest::parse(&entry_digest)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code();
            match (code.as_deref(), db_err.constraint()) {
                (Some("23505"), Some(IDENTITY_TOKEN_KEY)) => StorageError::DuplicateToken,
                (Some("23505"), Some(IDENTITY_PKEY)) => {
                    StorageError::DuplicateIdentity(db_err.message().to_string())
                }
                (Some("23505"), _) => StorageError::InvariantViolation(db_err.message().to_string()),
                (Some("23503"), Some(CHAIN_IDENTITY_FKEY)) => {
                    StorageError::NotFound("identity for chain entry not found".to_string())
                }
                (Some("40001" | "40P01"), _) => StorageError::Unavailable(err.to_string()),
                _ => StorageError::Backend(err.to_string()),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(err.to_string())
        }
        _ => StorageError::Backend(err.to_string()),
    }
}

fn to_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("sequence id too large".to_string()))
}

fn usize_to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}

fn from_i64(value: i64) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("negative sequence id {value}")))
}
