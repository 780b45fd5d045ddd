//! Adaptive admission control for outbound exchange REST calls
//!
//! Maps every operation onto a small set of resource groups, gates each
//! group with a GCRA budget, parks over-budget callers in a strict-FIFO
//! queue serviced by a supervised per-group worker, and self-heals after
//! provider-side rejections by collapsing the group's effective rate and
//! stepping it back up once a cooldown passes cleanly.

pub mod classify;
pub mod config;
pub mod error;
pub mod exchanges;
pub mod limiter;

mod adjuster;
mod gcra;
mod time;
mod waiters;
mod worker;

pub use adjuster::RecoveryPhase;
pub use classify::EndpointRule;
pub use classify::GroupClassifier;
pub use classify::ResourceGroup;
pub use config::GroupConfig;
pub use config::LimiterConfig;
pub use config::load_limiter_config;
pub use error::AdmissionError;
pub use error::Result;
pub use limiter::GroupStatus;
pub use limiter::RateLimiter;
