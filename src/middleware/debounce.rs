//! Duplicate-dispatch suppression.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks the last dispatch time per dedupe key and suppresses repeats
/// inside the window. The map is pruned once it outgrows its cap.
#[derive(Debug)]
pub struct DebounceMap {
    seen: HashMap<String, Instant>,
    window: Duration,
    cap: usize,
}

impl DebounceMap {
    pub fn new(window: Duration, cap: usize) -> Self {
        Self {
            seen: HashMap::new(),
            window,
            cap,
        }
    }

    /// Returns true when `key` was dispatched within the window and the
    /// new dispatch should be suppressed. Otherwise records `now`.
    pub fn suppress(&mut self, key: &str, now: Instant) -> bool {
        if let Some(&last) = self.seen.get(key) {
            if now.duration_since(last) < self.window {
                return true;
            }
        }
        self.seen.insert(key.to_string(), now);

        if self.seen.len() > self.cap {
            if let Some(cutoff) = now.checked_sub(self.window * 10) {
                self.seen.retain(|_, &mut t| t >= cutoff);
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_repeat_inside_window_suppressed() {
        let mut map = DebounceMap::new(Duration::from_secs(1), 100);
        assert!(!map.suppress("k", Instant::now()));
        assert!(map.suppress("k", Instant::now()));

        advance(Duration::from_millis(1_001)).await;
        assert!(!map.suppress("k", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_independent() {
        let mut map = DebounceMap::new(Duration::from_secs(1), 100);
        assert!(!map.suppress("a", Instant::now()));
        assert!(!map.suppress("b", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_stale_entries() {
        let mut map = DebounceMap::new(Duration::from_secs(1), 3);
        for i in 0..3 {
            map.suppress(&format!("stale-{i}"), Instant::now());
        }
        // Past the 10x-window horizon the stale entries are prunable.
        advance(Duration::from_secs(11)).await;
        map.suppress("fresh", Instant::now());
        assert_eq!(map.len(), 1);
    }
}
