use crate::{validation, TypesError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const IDENTITY_CONTEXT: &str = "aadhaar-lite identity v1";
const SECRET_CONTEXT: &str = "aadhaar-lite secret v1";

/// Keyed digest of a normalized national-ID number. The raw number is never retained.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Normalize and digest a raw identity number.
    pub fn from_raw_number(raw: &str) -> Result<Self, TypesError> {
        let normalized = validation::normalize_identity_number(raw)?;
        let bytes = blake3::derive_key(IDENTITY_CONTEXT, normalized.as_bytes());
        Ok(Self(blake3::Hash::from(bytes).to_hex().to_string()))
    }

    /// Accept an already-computed digest (storage rows, admin paths).
    pub fn from_hex(hex: &str) -> Result<Self, TypesError> {
        if is_lower_hex_digest(hex) {
            Ok(Self(hex.to_string()))
        } else {
            Err(TypesError::MalformedDigest(truncate_for_error(hex)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters only; enough to correlate log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityHash({})", self.short())
    }
}

impl TryFrom<String> for IdentityHash {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<IdentityHash> for String {
    fn from(value: IdentityHash) -> Self {
        value.0
    }
}

/// Digest of a PIN. Compared for equality only.
#[derive(Clone)]
pub struct SecretHash(blake3::Hash);

impl SecretHash {
    pub fn from_raw_secret(raw: &str) -> Result<Self, TypesError> {
        validation::validate_secret(raw)?;
        Ok(Self::digest(raw))
    }

    pub fn from_hex(hex: &str) -> Result<Self, TypesError> {
        blake3::Hash::from_hex(hex)
            .map(Self)
            .map_err(|_| TypesError::MalformedDigest(truncate_for_error(hex)))
    }

    /// Constant-time comparison of a presented secret against this digest.
    ///
    /// Malformed input is digested and compared like any other value so the
    /// work done does not depend on the shape of the input.
    pub fn matches(&self, presented: &str) -> bool {
        Self::digest(presented).0 == self.0
    }

    /// Digest of the empty PIN, which registration never accepts.
    pub fn decoy() -> Self {
        Self::digest("")
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    fn digest(raw: &str) -> Self {
        Self(blake3::Hash::from(blake3::derive_key(
            SECRET_CONTEXT,
            raw.as_bytes(),
        )))
    }
}

impl PartialEq for SecretHash {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretHash {}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(<redacted>)")
    }
}

/// Opaque bearer token handed out at registration (UUID v4).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(Uuid);

impl AccessToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| TypesError::MalformedToken)
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Profile fields returned after successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
}

/// One registered person as held by the identity store.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub identity_hash: IdentityHash,
    pub secret_hash: SecretHash,
    pub profile: Profile,
    pub access_token: AccessToken,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

fn is_lower_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn truncate_for_error(value: &str) -> String {
    value.chars().take(16).collect()
}
