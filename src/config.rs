use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::File;
use serde::Deserialize;

use crate::classify::EndpointRule;
use crate::classify::ResourceGroup;
use crate::error::AdmissionError;
use crate::error::Result;

/// Per-group budget constants, immutable after startup
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Burst size: number of calls admissible from a fresh state
    pub capacity: u32,

    /// Refill interval covering one full burst
    pub period_ms: u64,

    /// Cost per admitted call; at nominal speed one call is admitted per
    /// increment once the burst is spent
    pub increment_ms: u64,
}

impl GroupConfig {
    /// Budget with the increment derived as `period / capacity`
    pub fn new(capacity: u32, period_ms: u64) -> Self {
        let increment_ms = (period_ms / u64::from(capacity.max(1))).max(1);
        Self { capacity, period_ms, increment_ms }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn increment(&self) -> Duration {
        Duration::from_millis(self.increment_ms)
    }

    fn validate(&self, group: ResourceGroup) -> Result<()> {
        if self.capacity == 0 {
            return Err(AdmissionError::InvalidConfig(format!("group {group}: capacity must be greater than 0")));
        }
        if self.period_ms == 0 {
            return Err(AdmissionError::InvalidConfig(format!("group {group}: period_ms must be greater than 0")));
        }
        if self.increment_ms == 0 || self.increment_ms > self.period_ms {
            return Err(AdmissionError::InvalidConfig(format!("group {group}: increment_ms must be in 1..=period_ms")));
        }
        Ok(())
    }
}

/// Top-level limiter configuration
///
/// Loaded once at startup (from a file via [`load_limiter_config`] or built
/// programmatically, e.g. by the [`crate::exchanges`] presets) and validated
/// fatally before any worker is spawned.
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    /// Budget per resource group; every group referenced anywhere must
    /// appear here
    pub groups: BTreeMap<ResourceGroup, GroupConfig>,

    /// Endpoint-to-group rules consulted by the classifier
    #[serde(default)]
    pub rules: Vec<EndpointRule>,

    /// Group used when no rule matches; required
    pub default_group: Option<ResourceGroup>,

    /// Rejections within the rolling window needed to throttle (zero
    /// tolerance by default: a single 429 is a signal)
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: u32,

    /// Rolling window for counting rejections
    #[serde(default = "default_rejection_window_ms")]
    pub rejection_window_ms: u64,

    /// Freeze duration after entering the throttled phase
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Multiplier applied to the rate ratio on each throttle transition
    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,

    /// Additive rate-ratio step applied during recovery
    #[serde(default = "default_recovery_step_percent")]
    pub recovery_step_percent: f64,

    /// Interval between recovery steps
    #[serde(default = "default_recovery_step_interval_ms")]
    pub recovery_step_interval_ms: u64,

    /// Longest a caller is parked before a typed timeout error
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_rejection_threshold() -> u32 {
    1
}

fn default_rejection_window_ms() -> u64 {
    10_000
}

fn default_cooldown_ms() -> u64 {
    300_000
}

fn default_shrink_factor() -> f64 {
    0.5
}

fn default_recovery_step_percent() -> f64 {
    0.05
}

fn default_recovery_step_interval_ms() -> u64 {
    10_000
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl LimiterConfig {
    /// Programmatic configuration with default self-healing tunables
    pub fn new(groups: BTreeMap<ResourceGroup, GroupConfig>, rules: Vec<EndpointRule>, default_group: ResourceGroup) -> Self {
        Self {
            groups,
            rules,
            default_group: Some(default_group),
            rejection_threshold: default_rejection_threshold(),
            rejection_window_ms: default_rejection_window_ms(),
            cooldown_ms: default_cooldown_ms(),
            shrink_factor: default_shrink_factor(),
            recovery_step_percent: default_recovery_step_percent(),
            recovery_step_interval_ms: default_recovery_step_interval_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Reject any configuration the limiter could not run safely with.
    /// Construction-time only; nothing here is recoverable at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(AdmissionError::InvalidConfig("at least one group budget is required".to_string()));
        }

        for (group, group_config) in &self.groups {
            group_config.validate(*group)?;
        }

        let default_group = match self.default_group {
            Some(group) => group,
            None => return Err(AdmissionError::InvalidConfig("default_group is required".to_string())),
        };
        if !self.groups.contains_key(&default_group) {
            return Err(AdmissionError::InvalidConfig(format!("default_group {default_group} has no budget")));
        }

        for rule in &self.rules {
            if !self.groups.contains_key(&rule.group) {
                return Err(AdmissionError::InvalidConfig(format!("rule for {} maps to unbudgeted group {}", rule.path_prefix, rule.group)));
            }
        }

        if self.rejection_threshold == 0 {
            return Err(AdmissionError::InvalidConfig("rejection_threshold must be at least 1".to_string()));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(AdmissionError::InvalidConfig("shrink_factor must be in (0, 1)".to_string()));
        }
        if !(self.recovery_step_percent > 0.0 && self.recovery_step_percent <= 1.0) {
            return Err(AdmissionError::InvalidConfig("recovery_step_percent must be in (0, 1]".to_string()));
        }
        for (name, value) in [
            ("rejection_window_ms", self.rejection_window_ms),
            ("cooldown_ms", self.cooldown_ms),
            ("recovery_step_interval_ms", self.recovery_step_interval_ms),
            ("acquire_timeout_ms", self.acquire_timeout_ms),
        ] {
            if value == 0 {
                return Err(AdmissionError::InvalidConfig(format!("{name} must be greater than 0")));
            }
        }

        Ok(())
    }
}

/// Load a limiter configuration from a file (TOML/YAML/JSON by extension)
pub fn load_limiter_config<P: AsRef<Path>>(path: P) -> std::result::Result<LimiterConfig, ConfigError> {
    let config = Config::builder().add_source(File::from(path.as_ref())).build()?;

    config.try_deserialize()
}
