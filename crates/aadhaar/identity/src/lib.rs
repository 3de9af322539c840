//! Aadhaar Lite Identity - registration and credential verification.
//!
//! Raw identity numbers and PINs enter here and leave only as digests. Every
//! failed verification looks the same to the caller, whatever the cause.

#![deny(unsafe_code)]

use aadhaar_storage::{IdentityStore, StorageError};
use aadhaar_types::{
    capture_timestamp, validation, AccessToken, IdentityHash, IdentityRecord, Profile, SecretHash,
    TypesError,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_TOKEN_ATTEMPTS: usize = 3;

/// Identity registry over a pluggable identity store.
pub struct IdentityRegistry {
    store: Arc<dyn IdentityStore>,
    token_attempts: usize,
    // compared against when the presented token resolves to nothing
    decoy: SecretHash,
}

impl IdentityRegistry {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            token_attempts: DEFAULT_TOKEN_ATTEMPTS,
            decoy: SecretHash::decoy(),
        }
    }

    /// Bound on token regeneration when a freshly generated token collides.
    pub fn with_token_attempts(mut self, attempts: usize) -> Self {
        self.token_attempts = attempts.max(1);
        self
    }

    /// Register a new identity and issue its access token.
    pub async fn register(&self, request: RegistrationRequest) -> Result<AccessToken, IdentityError> {
        let identity_hash = IdentityHash::from_raw_number(&request.identity_number)?;
        let secret_hash = SecretHash::from_raw_secret(&request.pin)?;
        let profile = Profile {
            display_name: validation::normalize_display_name(&request.full_name)?,
            date_of_birth: validation::parse_date_of_birth(request.date_of_birth.as_deref())?,
            region_code: validation::normalize_region_code(request.region_code.as_deref())?,
        };

        for attempt in 1..=self.token_attempts {
            let record = IdentityRecord {
                identity_hash: identity_hash.clone(),
                secret_hash: secret_hash.clone(),
                profile: profile.clone(),
                access_token: AccessToken::generate(),
                active: true,
                registered_at: capture_timestamp(),
            };
            let token = record.access_token;

            match self.store.insert_identity(record).await {
                Ok(()) => {
                    info!(identity = identity_hash.short(), "identity registered");
                    return Ok(token);
                }
                Err(StorageError::DuplicateToken) => {
                    warn!(attempt, "access token collision; regenerating");
                }
                Err(StorageError::DuplicateIdentity(_)) => {
                    warn!(identity = identity_hash.short(), "duplicate registration rejected");
                    return Err(IdentityError::DuplicateIdentity);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(IdentityError::DuplicateToken)
    }

    /// Check a token and PIN. Unknown token, inactive identity and wrong PIN
    /// all yield `VerificationFailed`.
    pub async fn authenticate(&self, token: &str, secret: &str) -> Result<Profile, IdentityError> {
        let record = match AccessToken::parse(token) {
            Ok(token) => self.store.find_by_token(&token).await?,
            Err(_) => None,
        };

        let Some(record) = record else {
            std::hint::black_box(self.decoy.matches(secret));
            warn!("verification failed");
            return Err(IdentityError::VerificationFailed);
        };

        let secret_ok = record.secret_hash.matches(secret);
        if secret_ok && record.active {
            info!(identity = record.identity_hash.short(), "identity verified");
            Ok(record.profile)
        } else {
            warn!(identity = record.identity_hash.short(), "verification failed");
            Err(IdentityError::VerificationFailed)
        }
    }

    /// Map a token to its identity digest. Token possession is sufficient.
    pub async fn resolve_identity_hash(&self, token: &str) -> Result<IdentityHash, IdentityError> {
        let token = AccessToken::parse(token).map_err(|_| IdentityError::NotFound)?;
        let record = self
            .store
            .find_by_token(&token)
            .await?
            .ok_or(IdentityError::NotFound)?;
        if !record.active {
            return Err(IdentityError::Inactive);
        }
        Ok(record.identity_hash)
    }

    /// Administrative soft-delete toggle.
    pub async fn set_active(
        &self,
        identity_hash: &IdentityHash,
        active: bool,
    ) -> Result<(), IdentityError> {
        self.store.set_active(identity_hash, active).await?;
        info!(identity = identity_hash.short(), active, "identity active flag changed");
        Ok(())
    }
}

/// Raw registration input as received from the gateway.
#[derive(Clone, Default)]
pub struct RegistrationRequest {
    pub full_name: String,
    pub identity_number: String,
    pub pin: String,
    pub date_of_birth: Option<String>,
    pub region_code: Option<String>,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("full_name", &self.full_name)
            .field("identity_number", &"<redacted>")
            .field("pin", &"<redacted>")
            .field("date_of_birth", &self.date_of_birth.as_ref().map(|_| "<redacted>"))
            .field("region_code", &self.region_code)
            .finish()
    }
}

/// Identity-related errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid input: {0}")]
    InvalidInput(TypesError),

    #[error("identity already registered")]
    DuplicateIdentity,

    #[error("could not issue a unique access token")]
    DuplicateToken,

    #[error("verification failed")]
    VerificationFailed,

    #[error("identity not found")]
    NotFound,

    #[error("identity is inactive")]
    Inactive,

    #[error("storage failure: {0}")]
    StorageFailure(StorageError),
}

impl From<TypesError> for IdentityError {
    fn from(err: TypesError) -> Self {
        IdentityError::InvalidInput(err)
    }
}

impl From<StorageError> for IdentityError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => IdentityError::NotFound,
            StorageError::DuplicateIdentity(_) => IdentityError::DuplicateIdentity,
            StorageError::DuplicateToken => IdentityError::DuplicateToken,
            other => IdentityError::StorageFailure(other),
        }
    }
}
