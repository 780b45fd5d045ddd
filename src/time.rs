use tokio::time::Instant;

/// Time tracking for admission control
///
/// Uses `tokio::time::Instant` so that tests running under the paused tokio
/// clock observe the same timeline as the sleep/timeout machinery. Outside a
/// test runtime this is an ordinary monotonic clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeSource {
    /// Epoch for relative time measurements
    epoch: Instant,
}

impl TimeSource {
    /// Create a new time source with current time as epoch
    #[inline(always)]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    /// Get current time in nanoseconds since epoch
    #[inline(always)]
    pub fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert milliseconds to nanoseconds, saturating at `u64::MAX`
#[inline(always)]
pub(crate) const fn millis_to_nanos(millis: u64) -> u64 {
    millis.saturating_mul(1_000_000)
}
