use std::time::Duration;

use crate::config::GroupConfig;
use crate::time::millis_to_nanos;

/// Outcome of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Admitted now; the group's TAT has been advanced
    Admitted,
    /// Denied; earliest duration after which an attempt can succeed
    RetryAfter(Duration),
}

/// Generic Cell Rate Algorithm state for one group
///
/// A single theoretical-arrival-time scalar replaces explicit token counters:
/// an attempt at `now` is admitted while `TAT <= now + tolerance`, where
/// `tolerance = (capacity - 1) * increment` grants exactly the configured
/// burst, even when increment is set smaller than `period / capacity`.
/// Equivalent to a token bucket with burst `capacity` and steady rate
/// `1 / increment`, in O(1) space regardless of contention.
///
/// All mutation happens under the owning group's mutex; a denied attempt
/// never changes state.
#[derive(Debug)]
pub(crate) struct GcraState {
    /// Theoretical arrival time, nanoseconds since the limiter epoch
    tat_nanos: u64,

    /// Nominal cost per admitted call
    increment_nanos: u64,

    /// Burst allowance: `(capacity - 1) * increment`
    tolerance_nanos: u64,
}

impl GcraState {
    pub fn new(config: &GroupConfig) -> Self {
        let increment_nanos = millis_to_nanos(config.increment_ms);
        let burst_slots = u64::from(config.capacity).saturating_sub(1);

        Self { tat_nanos: 0, increment_nanos, tolerance_nanos: increment_nanos.saturating_mul(burst_slots) }
    }

    /// Attempt one admission at `now`
    ///
    /// `rate_ratio` stretches the effective increment while the group is
    /// throttled: at 0.5 every admitted call costs twice the nominal
    /// increment, halving the steady rate.
    pub fn try_admit(&mut self, now_nanos: u64, rate_ratio: f64) -> Admission {
        let horizon = now_nanos.saturating_add(self.tolerance_nanos);

        if self.tat_nanos <= horizon {
            let effective_increment = (self.increment_nanos as f64 / rate_ratio) as u64;
            self.tat_nanos = self.tat_nanos.max(now_nanos).saturating_add(effective_increment);
            Admission::Admitted
        } else {
            Admission::RetryAfter(Duration::from_nanos(self.tat_nanos - horizon))
        }
    }

    /// Forbid any admission before the given instant
    ///
    /// Raises TAT monotonically; used for the post-rejection cooldown
    /// freeze. The burst allowance is consumed as well, so the first
    /// admission after the freeze happens exactly at `until_nanos` and the
    /// group resumes at its steady (ratio-stretched) rate with no burst.
    pub fn block_until(&mut self, until_nanos: u64) {
        self.tat_nanos = self.tat_nanos.max(until_nanos.saturating_add(self.tolerance_nanos));
    }

    #[cfg(test)]
    pub fn tat_nanos(&self) -> u64 {
        self.tat_nanos
    }
}
