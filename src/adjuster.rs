use tracing::info;
use tracing::warn;

use crate::classify::ResourceGroup;
use crate::config::LimiterConfig;
use crate::gcra::GcraState;
use crate::time::millis_to_nanos;

/// Floor for the throttle ratio; repeated shrinks never reach zero
const MIN_RATE_RATIO: f64 = 0.01;

/// Self-healing phase of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// Full nominal speed
    Normal,
    /// Rejection observed; admissions frozen for the cooldown
    Throttled,
    /// Cooldown elapsed; ratio stepping back up toward 1.0
    Recovering,
}

/// Mutable health fields of one group, guarded by the group's mutex
#[derive(Debug)]
pub(crate) struct HealthState {
    /// Throttle multiplier in (0, 1]; 1.0 is nominal speed
    pub rate_ratio: f64,
    pub phase: RecoveryPhase,
    /// Rejections seen inside the rolling window
    pub rejections: u32,
    pub last_rejection_nanos: Option<u64>,
    /// Next scheduled ratio step while recovering
    next_step_nanos: Option<u64>,
}

impl HealthState {
    pub fn new() -> Self {
        Self { rate_ratio: 1.0, phase: RecoveryPhase::Normal, rejections: 0, last_rejection_nanos: None, next_step_nanos: None }
    }
}

/// Zero-tolerance throttle/recovery policy
///
/// `Normal -> Throttled` on crossing the rejection threshold (default: any
/// single rejection). Entering `Throttled` shrinks the rate ratio and
/// freezes the group's TAT for the full cooldown, which is what makes the
/// guarantee provable: the failing call pattern cannot be repeated inside
/// the window. After a quiet cooldown the group steps its ratio back up to
/// 1.0; a rejection seen while recovering drops it straight back to
/// `Throttled`, shrinking from the already-reduced ratio.
#[derive(Debug)]
pub(crate) struct DynamicAdjuster {
    threshold: u32,
    window_nanos: u64,
    cooldown_nanos: u64,
    shrink_factor: f64,
    step: f64,
    step_interval_nanos: u64,
}

impl DynamicAdjuster {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            threshold: config.rejection_threshold,
            window_nanos: millis_to_nanos(config.rejection_window_ms),
            cooldown_nanos: millis_to_nanos(config.cooldown_ms),
            shrink_factor: config.shrink_factor,
            step: config.recovery_step_percent,
            step_interval_nanos: millis_to_nanos(config.recovery_step_interval_ms),
        }
    }

    /// Record one provider-side rejection for the group
    pub fn on_rejection(&self, group: ResourceGroup, gcra: &mut GcraState, health: &mut HealthState, now_nanos: u64) {
        match health.phase {
            RecoveryPhase::Normal => {
                if let Some(last) = health.last_rejection_nanos {
                    if now_nanos.saturating_sub(last) > self.window_nanos {
                        health.rejections = 0;
                    }
                }
                health.rejections += 1;
                health.last_rejection_nanos = Some(now_nanos);

                if health.rejections >= self.threshold {
                    self.throttle(group, gcra, health, now_nanos);
                }
            }
            // Already frozen: extend the freeze but do not shrink again,
            // so a rejection storm collapses the rate exactly once.
            RecoveryPhase::Throttled => {
                health.last_rejection_nanos = Some(now_nanos);
                gcra.block_until(now_nanos.saturating_add(self.cooldown_nanos));
            }
            RecoveryPhase::Recovering => {
                self.throttle(group, gcra, health, now_nanos);
            }
        }
    }

    fn throttle(&self, group: ResourceGroup, gcra: &mut GcraState, health: &mut HealthState, now_nanos: u64) {
        health.rate_ratio = (health.rate_ratio * self.shrink_factor).max(MIN_RATE_RATIO);
        health.phase = RecoveryPhase::Throttled;
        health.last_rejection_nanos = Some(now_nanos);
        health.next_step_nanos = None;
        gcra.block_until(now_nanos.saturating_add(self.cooldown_nanos));

        warn!(group = %group, rate_ratio = health.rate_ratio, cooldown_ms = self.cooldown_nanos / 1_000_000, "rate limit rejection, throttling group");
    }

    /// Advance the phase machine to `now`
    ///
    /// Returns the absolute time of the next scheduled phase event, if any,
    /// so the group worker can sleep precisely until it.
    pub fn advance(&self, group: ResourceGroup, health: &mut HealthState, now_nanos: u64) -> Option<u64> {
        match health.phase {
            RecoveryPhase::Normal => None,
            RecoveryPhase::Throttled => {
                let last = health.last_rejection_nanos.unwrap_or(now_nanos);
                let cooldown_ends = last.saturating_add(self.cooldown_nanos);
                if now_nanos < cooldown_ends {
                    return Some(cooldown_ends);
                }

                health.phase = RecoveryPhase::Recovering;
                health.next_step_nanos = Some(now_nanos + self.step_interval_nanos);
                info!(group = %group, rate_ratio = health.rate_ratio, "cooldown elapsed, recovering");
                health.next_step_nanos
            }
            RecoveryPhase::Recovering => {
                let mut next = health.next_step_nanos.unwrap_or(now_nanos);
                while now_nanos >= next {
                    health.rate_ratio = (health.rate_ratio + self.step).min(1.0);
                    next += self.step_interval_nanos;

                    if health.rate_ratio >= 1.0 {
                        health.rate_ratio = 1.0;
                        health.phase = RecoveryPhase::Normal;
                        health.rejections = 0;
                        health.next_step_nanos = None;
                        info!(group = %group, "group recovered to nominal rate");
                        return None;
                    }
                }
                health.next_step_nanos = Some(next);
                Some(next)
            }
        }
    }
}
