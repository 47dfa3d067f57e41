//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of claim operations in flight at once.
pub const DEFAULT_CLAIM_POOL_WIDTH: usize = 100;

/// Engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum concurrent in-flight claim operations per batch.
    pub max_in_flight: usize,

    /// Retry policy applied to collaborator invocations.
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_CLAIM_POOL_WIDTH,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry with linear backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per collaborator call before giving up.
    pub max_attempts: u32,

    /// Base delay between attempts; grows linearly with the attempt number.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}
