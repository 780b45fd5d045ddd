use std::time::Duration;

use thiserror::Error;

use crate::classify::ResourceGroup;

/// Result type for admission control operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Errors surfaced by the admission controller
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Fatal at construction, never recovered at runtime
    #[error("invalid rate limiter configuration: {0}")]
    InvalidConfig(String),

    /// Caller asked for a group that has no configured budget
    #[error("no rate limit configured for group {0}")]
    UnknownGroup(ResourceGroup),

    /// Non-blocking admission was denied
    #[error("rate limit exceeded")]
    Exceeded,

    /// Caller waited longer than the configured acquire timeout
    #[error("admission not granted within {0:?}")]
    AcquireTimeout(Duration),

    /// The limiter was shut down while the caller was parked
    #[error("rate limiter shut down")]
    Shutdown,
}
