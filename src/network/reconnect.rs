//! Reconnection backoff policy

use std::time::Duration;

/// Default wait before each reconnect attempt, in milliseconds
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 5] = [0, 2_000, 5_000, 10_000, 30_000];

/// Maps a consecutive-failure count to the delay before the next attempt.
///
/// Attempt `n` waits `delays[min(n, len - 1)]`, so the last entry repeats
/// for every attempt past the end of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
    max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RECONNECT_DELAYS_MS, None)
    }
}

impl ReconnectPolicy {
    /// Build from a delay table in milliseconds. An empty table falls back
    /// to the default table.
    pub fn from_millis(delays_ms: &[u64], max_attempts: Option<u32>) -> Self {
        let table = if delays_ms.is_empty() {
            &DEFAULT_RECONNECT_DELAYS_MS[..]
        } else {
            delays_ms
        };
        Self {
            delays: table.iter().copied().map(Duration::from_millis).collect(),
            max_attempts,
        }
    }

    /// Delay before attempt `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let last = self.delays.len().saturating_sub(1);
        let idx = (attempt as usize).min(last);
        self.delays.get(idx).copied().unwrap_or_default()
    }

    /// Delay before attempt `attempt`, or `None` once the policy gives up
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay_for(attempt)),
        }
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}
