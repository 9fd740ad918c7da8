//! Per-action retry bookkeeping and backoff computation.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Counter plus last-attempt timestamp for one action name.
#[derive(Debug, Clone, Copy)]
pub struct RetryRecord {
    pub count: u32,
    pub last_attempt: Instant,
}

/// Bounded map of [`RetryRecord`]s keyed by action name.
#[derive(Debug)]
pub struct RetryLedger {
    entries: HashMap<String, RetryRecord>,
    cap: usize,
}

impl RetryLedger {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            cap,
        }
    }

    /// Register one more retry for `key`. Returns the attempt number
    /// (1-based), or `None` once `max` attempts have been spent.
    pub fn begin_attempt(&mut self, key: &str, now: Instant, max: u32) -> Option<u32> {
        if self.entries.len() >= self.cap && !self.entries.contains_key(key) {
            self.evict_stalest();
        }
        let rec = self.entries.entry(key.to_string()).or_insert(RetryRecord {
            count: 0,
            last_attempt: now,
        });
        if rec.count >= max {
            return None;
        }
        rec.count += 1;
        rec.last_attempt = now;
        Some(rec.count)
    }

    /// Forget the record for one action (called when it fulfills).
    pub fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_stalest(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, rec)| rec.last_attempt)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&key);
        }
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    base.checked_mul(1u32 << exp).unwrap_or(cap).min(cap)
}
