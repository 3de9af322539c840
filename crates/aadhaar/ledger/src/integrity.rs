//! Chain walking. Pure functions over entries; no storage access.

use aadhaar_types::{ChainEntry, ChainHead, Digest};
use serde::{Deserialize, Serialize};

/// What went wrong at the first bad entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The entry at this position is missing or carries the wrong sequence id.
    SequenceGap,
    /// `prev_digest` does not match the predecessor's `entry_digest`.
    BrokenLink,
    /// The stored `entry_digest` does not match the recomputed one.
    DigestMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub sequence_id: u64,
    pub kind: BreakKind,
}

/// Result of walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntegrityReport {
    Valid {
        entries_checked: u64,
        head_digest: Digest,
    },
    Broken {
        first_break: ChainBreak,
        entries_checked: u64,
    },
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, IntegrityReport::Valid { .. })
    }

    pub fn first_break(&self) -> Option<ChainBreak> {
        match self {
            IntegrityReport::Valid { .. } => None,
            IntegrityReport::Broken { first_break, .. } => Some(*first_break),
        }
    }
}

/// Incremental verifier; feed entries in ascending order.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    head: ChainHead,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self {
            head: ChainHead::genesis(),
        }
    }

    /// Check the next entry. On success the verifier advances past it.
    pub fn check(&mut self, entry: &ChainEntry) -> Result<(), ChainBreak> {
        let expected = self.head.next_sequence();
        if entry.sequence_id != expected {
            return Err(ChainBreak {
                sequence_id: expected,
                kind: BreakKind::SequenceGap,
            });
        }
        if entry.prev_digest != self.head.digest {
            return Err(ChainBreak {
                sequence_id: entry.sequence_id,
                kind: BreakKind::BrokenLink,
            });
        }
        if entry.recompute_digest() != entry.entry_digest {
            return Err(ChainBreak {
                sequence_id: entry.sequence_id,
                kind: BreakKind::DigestMismatch,
            });
        }
        self.head = entry.head();
        Ok(())
    }

    /// Record that the entry expected next never arrived.
    pub fn missing_next(&self) -> ChainBreak {
        ChainBreak {
            sequence_id: self.head.next_sequence(),
            kind: BreakKind::SequenceGap,
        }
    }

    pub fn entries_checked(&self) -> u64 {
        self.head.sequence_id
    }

    pub fn head(&self) -> &ChainHead {
        &self.head
    }

    pub fn broken(&self, first_break: ChainBreak) -> IntegrityReport {
        IntegrityReport::Broken {
            first_break,
            entries_checked: self.entries_checked(),
        }
    }

    pub fn finish(self) -> IntegrityReport {
        IntegrityReport::Valid {
            entries_checked: self.head.sequence_id,
            head_digest: self.head.digest,
        }
    }
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a complete chain held in memory, starting at sequence 1.
pub fn verify_entries(entries: &[ChainEntry]) -> IntegrityReport {
    let mut verifier = ChainVerifier::new();
    for entry in entries {
        if let Err(first_break) = verifier.check(entry) {
            return verifier.broken(first_break);
        }
    }
    verifier.finish()
}
