use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::numbering::DEFAULT_PADDING;

/// Engine-wide settings for costing, numbering and catalog access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overhead applied by cost summaries when the caller gives none.
    pub default_overhead_pct: Decimal,
    /// Attempts for a number-issuing unit of work before giving up.
    pub number_retry_limit: u32,
    /// Linear backoff step between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Upper bound for a single catalog lookup, in milliseconds.
    pub catalog_timeout_ms: u64,
    /// Zero-padding of the sequence part of document numbers.
    pub number_padding: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_overhead_pct: dec!(10),
            number_retry_limit: 5,
            retry_backoff_ms: 10,
            catalog_timeout_ms: 2_000,
            number_padding: DEFAULT_PADDING,
        }
    }
}

impl EngineConfig {
    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Builder for [`EngineConfig`].
///
/// ```
/// use werkbeleg::core::EngineConfigBuilder;
/// use rust_decimal_macros::dec;
///
/// let config = EngineConfigBuilder::new()
///     .default_overhead_pct(dec!(12))
///     .catalog_timeout_ms(500)
///     .build();
/// assert_eq!(config.number_retry_limit, 5);
/// ```
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_overhead_pct(mut self, pct: Decimal) -> Self {
        self.config.default_overhead_pct = pct;
        self
    }

    /// Set the attempt budget (at least 1).
    pub fn number_retry_limit(mut self, attempts: u32) -> Self {
        self.config.number_retry_limit = attempts.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn catalog_timeout_ms(mut self, ms: u64) -> Self {
        self.config.catalog_timeout_ms = ms;
        self
    }

    pub fn number_padding(mut self, width: usize) -> Self {
        self.config.number_padding = width;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
