//! Aadhaar Lite Types - the shared vocabulary of the identity store and the chain log.
//!
//! Everything that ends up inside a digest lives here, so every crate (and any
//! third-party verifier) computes digests from one definition.

#![deny(unsafe_code)]

mod chain;
mod error;
mod identity;
pub mod validation;

pub use chain::{
    canonical_entry_bytes, canonical_quantity, canonical_timestamp, capture_timestamp,
    compute_entry_digest, ChainEntry, ChainHead, Digest, UsageEvent, ENTRY_ENCODING_TAG, GENESIS,
};
pub use error::TypesError;
pub use identity::{AccessToken, IdentityHash, IdentityRecord, Profile, SecretHash};
