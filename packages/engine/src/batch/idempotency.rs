//! Idempotency cache: `(batch type, hash of item (id,type) pairs) -> cached result`.
//!
//! A periodic sweeper (60s) evicts TTL-expired entries, mirroring the
//! `IdempotencyCache` + background-sweep idiom used for other short-lived
//! caches across the pack (e.g. the teacher's record-store layer).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use codegraph_core::CancelToken;

use super::types::BatchResult;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// TTL-bounded cache of completed [`BatchResult`]s, keyed by idempotency key.
pub struct IdempotencyCache {
    entries: DashMap<String, (BatchResult, Instant)>,
    ttl: Duration,
    cancel: CancelToken,
    started: AtomicBool,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            ttl,
            cancel: CancelToken::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Starts the background sweeper. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    () = cache.cancel.cancelled() => break,
                    _ = ticker.tick() => cache.sweep(),
                }
            }
        });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
    }

    /// Returns the cached result if present and not expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<BatchResult> {
        let entry = self.entries.get(key)?;
        let (result, inserted) = entry.value();
        if inserted.elapsed() < self.ttl {
            Some(result.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: String, result: BatchResult) {
        self.entries.insert(key, (result, Instant::now()));
    }

    /// Derives the idempotency key from a batch type and the `(id, kind)`
    /// pairs of its items, order-independent (sorted before hashing).
    #[must_use]
    pub fn derive_key<'a>(batch_type: &str, items: impl Iterator<Item = (&'a str, &'a str)>) -> String {
        let mut pairs: Vec<(String, String)> = items.map(|(id, kind)| (id.to_string(), kind.to_string())).collect();
        pairs.sort();

        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let mut feed = |bytes: &[u8]| {
            for byte in bytes {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
            }
        };
        feed(batch_type.as_bytes());
        for (id, kind) in &pairs {
            feed(id.as_bytes());
            feed(kind.as_bytes());
        }
        format!("{batch_type}:{hash:016x}")
    }
}
