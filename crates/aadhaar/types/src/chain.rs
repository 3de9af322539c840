use crate::{validation, IdentityHash, TypesError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `prev_digest` of the first entry in a chain.
pub const GENESIS: &str = "GENESIS";

/// Domain tag that prefixes every canonical entry encoding (version 1).
pub const ENTRY_ENCODING_TAG: &[u8] = b"aadhaar-lite/chain-entry/v1";

/// Hex BLAKE3 digest, or the genesis sentinel.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub fn genesis() -> Self {
        Self(GENESIS.to_string())
    }

    pub fn is_genesis(&self) -> bool {
        self.0 == GENESIS
    }

    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let valid = raw == GENESIS
            || (raw.len() == 64 && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(TypesError::MalformedDigest(raw.chars().take(16).collect()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        if self.is_genesis() {
            &self.0
        } else {
            &self.0[..12]
        }
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.to_hex().to_string())
    }
}

impl TryFrom<String> for Digest {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

/// Position and digest of the last entry, `{0, GENESIS}` for an empty chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub sequence_id: u64,
    pub digest: Digest,
}

impl ChainHead {
    pub fn genesis() -> Self {
        Self {
            sequence_id: 0,
            digest: Digest::genesis(),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence_id + 1
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Validated usage payload waiting to be sealed into the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    event_kind: String,
    quantity: Option<f64>,
    unit: Option<String>,
}

impl UsageEvent {
    pub fn new(
        event_kind: &str,
        quantity: Option<f64>,
        unit: Option<&str>,
    ) -> Result<Self, TypesError> {
        Ok(Self {
            event_kind: validation::normalize_event_kind(event_kind)?,
            quantity: validation::validate_quantity(quantity)?,
            unit: validation::normalize_unit(unit)?,
        })
    }

    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    pub fn quantity(&self) -> Option<f64> {
        self.quantity
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

/// One sealed record of the chain log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub sequence_id: u64,
    pub identity_hash: IdentityHash,
    pub event_kind: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub prev_digest: Digest,
    pub entry_digest: Digest,
}

impl ChainEntry {
    /// Build the successor of `head`.
    pub fn seal(
        head: &ChainHead,
        identity_hash: IdentityHash,
        event: &UsageEvent,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let recorded_at = recorded_at.trunc_subsecs(6);
        let entry_digest = compute_entry_digest(
            &identity_hash,
            event.event_kind(),
            event.quantity(),
            event.unit(),
            &head.digest,
            &recorded_at,
        );
        Self {
            sequence_id: head.next_sequence(),
            identity_hash,
            event_kind: event.event_kind().to_string(),
            quantity: event.quantity(),
            unit: event.unit().map(str::to_string),
            recorded_at,
            prev_digest: head.digest.clone(),
            entry_digest,
        }
    }

    /// Digest of the stored fields, independent of the stored `entry_digest`.
    pub fn recompute_digest(&self) -> Digest {
        compute_entry_digest(
            &self.identity_hash,
            &self.event_kind,
            self.quantity,
            self.unit.as_deref(),
            &self.prev_digest,
            &self.recorded_at,
        )
    }

    pub fn head(&self) -> ChainHead {
        ChainHead {
            sequence_id: self.sequence_id,
            digest: self.entry_digest.clone(),
        }
    }
}

/// Capture "now" at the precision every backend stores exactly.
pub fn capture_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn canonical_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// IEEE-754 bits, big-endian, as 16 lowercase hex characters.
pub fn canonical_quantity(quantity: f64) -> String {
    format!("{:016x}", quantity.to_bits())
}

pub fn canonical_entry_bytes(
    identity_hash: &IdentityHash,
    event_kind: &str,
    quantity: Option<f64>,
    unit: Option<&str>,
    prev_digest: &Digest,
    recorded_at: &DateTime<Utc>,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(ENTRY_ENCODING_TAG);
    push_field(&mut buf, identity_hash.as_str().as_bytes());
    push_field(&mut buf, event_kind.as_bytes());
    push_opt_field(&mut buf, quantity.map(canonical_quantity).as_deref());
    push_opt_field(&mut buf, unit);
    push_field(&mut buf, prev_digest.as_str().as_bytes());
    push_field(&mut buf, canonical_timestamp(recorded_at).as_bytes());
    buf
}

pub fn compute_entry_digest(
    identity_hash: &IdentityHash,
    event_kind: &str,
    quantity: Option<f64>,
    unit: Option<&str>,
    prev_digest: &Digest,
    recorded_at: &DateTime<Utc>,
) -> Digest {
    let bytes = canonical_entry_bytes(
        identity_hash,
        event_kind,
        quantity,
        unit,
        prev_digest,
        recorded_at,
    );
    Digest::from(blake3::hash(&bytes))
}

fn push_field(buf: &mut Vec<u8>, value: &[u8]) {
    let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(value);
}

fn push_opt_field(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        None => buf.push(0x00),
        Some(v) => {
            buf.push(0x01);
            push_field(buf, v.as_bytes());
        }
    }
}
