//! Aadhaar Lite storage contracts.
//!
//! Two tables back the whole system:
//! - identity records keyed by identity digest, unique by access token
//! - the chain log, keyed by gap-free sequence id and indexed by identity
//!
//! Appends are compare-and-append: a backend inserts an entry only when its
//! current head is the head the caller sealed the entry against.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryLedgerStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedgerStorage;
pub use traits::{
    AdminStore, ChainStore, IdentityStore, LedgerStorage, QueryWindow, ResetSummary,
};
