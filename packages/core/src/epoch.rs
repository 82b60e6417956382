//! Monotonic write-ordering tag.
//!
//! Every top-level batch is stamped with an [`Epoch`] before it reaches a
//! `GraphStore`. Store adapters must honor epoch order: writes from epoch
//! N must be observable before any write from epoch N+1 is observed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A monotonically increasing write-ordering tag, paired with the
/// wall-clock millis at which it was minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch {
    /// Sequence number. Strictly increasing across the process lifetime.
    pub seq: u64,
    /// Wall-clock milliseconds when this epoch was minted.
    pub minted_at_millis: u64,
}

/// Mints strictly increasing [`Epoch`] values.
#[derive(Debug, Default)]
pub struct EpochGenerator {
    next_seq: AtomicU64,
}

impl EpochGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next epoch, stamped with `now_millis`.
    pub fn next(&self, now_millis: u64) -> Epoch {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        Epoch {
            seq,
            minted_at_millis: now_millis,
        }
    }
}
