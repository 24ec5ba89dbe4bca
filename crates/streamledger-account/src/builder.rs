//! Fluent builder API for creating account estimators.
//!
//! # Example
//!
//! ```rust,no_run
//! use streamledger_account::{EstimatorBuilder, MemoryEventSource};
//!
//! let estimator = EstimatorBuilder::new()
//!     .page_size(250)
//!     .network(11155111, "sepolia", 86_400)
//!     .build(MemoryEventSource::default())
//!     .unwrap();
//! ```

use streamledger_core::config::{EstimatorConfig, NetworkConfig};
use streamledger_core::error::EstimateError;

use crate::estimator::AccountEstimator;
use crate::fetcher::EventSource;

/// Fluent builder for `EstimatorConfig` / `AccountEstimator`.
#[derive(Default)]
pub struct EstimatorBuilder {
    config: EstimatorConfig,
}

impl EstimatorBuilder {
    pub fn new() -> Self {
        Self {
            config: EstimatorConfig::default(),
        }
    }

    /// Start from an existing configuration (e.g. loaded from a file).
    pub fn from_config(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Set the number of events requested per page.
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Add a network, replacing any existing entry with the same chain id.
    pub fn network(mut self, chain_id: u64, name: impl Into<String>, cycle_secs: u64) -> Self {
        self.config.networks.retain(|n| n.chain_id != chain_id);
        self.config.networks.push(NetworkConfig {
            chain_id,
            name: name.into(),
            cycle_secs,
        });
        self
    }

    /// Build the `EstimatorConfig`.
    pub fn build_config(self) -> EstimatorConfig {
        self.config
    }

    /// Build an estimator over `source`.
    pub fn build<S: EventSource>(self, source: S) -> Result<AccountEstimator<S>, EstimateError> {
        AccountEstimator::new(source, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEventSource;

    #[test]
    fn builder_defaults() {
        let cfg = EstimatorBuilder::new().build_config();
        assert_eq!(cfg.page_size, 500);
        assert_eq!(cfg.network(1).unwrap().cycle_secs, 604_800);
    }

    #[test]
    fn builder_custom() {
        let cfg = EstimatorBuilder::new()
            .page_size(100)
            .network(1, "ethereum", 3_600)
            .network(10, "optimism", 86_400)
            .build_config();

        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.networks.len(), 2);
        assert_eq!(cfg.network(1).unwrap().cycle_secs, 3_600);
        assert_eq!(cfg.network(10).unwrap().name, "optimism");
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = EstimatorBuilder::new()
            .page_size(0)
            .build(MemoryEventSource::default());
        assert!(result.is_err());
    }
}
