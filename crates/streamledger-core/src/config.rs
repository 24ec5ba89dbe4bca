//! Estimator configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::CycleWindow;
use crate::error::EstimateError;

/// Per-network protocol constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// EVM chain id (e.g. `1` for Ethereum mainnet).
    pub chain_id: u64,
    /// Human-readable network name.
    pub name: String,
    /// Length of an accounting cycle, in seconds.
    pub cycle_secs: u64,
}

/// Configuration for an estimator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Events requested per page from the event source.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Networks the estimator can compute cycles for.
    #[serde(default = "default_networks")]
    pub networks: Vec<NetworkConfig>,
}

fn default_page_size() -> usize {
    500
}

fn default_networks() -> Vec<NetworkConfig> {
    vec![NetworkConfig {
        chain_id: 1,
        name: "ethereum".into(),
        cycle_secs: 604_800,
    }]
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            networks: default_networks(),
        }
    }
}

impl EstimatorConfig {
    /// Look up a network by chain id.
    pub fn network(&self, chain_id: u64) -> Result<&NetworkConfig, EstimateError> {
        self.networks
            .iter()
            .find(|n| n.chain_id == chain_id)
            .ok_or_else(|| EstimateError::InvalidInput(format!("unknown chain id {chain_id}")))
    }

    /// The accounting cycle containing `now` on the given network.
    pub fn cycle_window(
        &self,
        chain_id: u64,
        now: DateTime<Utc>,
    ) -> Result<CycleWindow, EstimateError> {
        CycleWindow::containing(self.network(chain_id)?.cycle_secs, now)
    }

    /// Reject configurations that could never produce an estimate.
    pub fn validate(&self) -> Result<(), EstimateError> {
        if self.page_size == 0 {
            return Err(EstimateError::InvalidInput("page_size must be positive".into()));
        }
        if let Some(n) = self.networks.iter().find(|n| n.cycle_secs == 0) {
            return Err(EstimateError::InvalidInput(format!(
                "network {} has a zero-length cycle",
                n.chain_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_mainnet() {
        let cfg = EstimatorConfig::default();
        assert_eq!(cfg.page_size, 500);
        assert_eq!(cfg.network(1).unwrap().cycle_secs, 604_800);
        assert!(cfg.network(5).is_err());
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: EstimatorConfig = serde_json::from_str(r#"{"page_size": 100}"#).unwrap();
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.networks.len(), 1);
    }

    #[test]
    fn cycle_window_uses_network_length() {
        let cfg: EstimatorConfig = serde_json::from_str(
            r#"{"networks": [{"chain_id": 11155111, "name": "sepolia", "cycle_secs": 86400}]}"#,
        )
        .unwrap();
        let now = DateTime::from_timestamp(86_400 * 3 + 5, 0).unwrap();
        let w = cfg.cycle_window(11155111, now).unwrap();
        assert_eq!(w.current_start_secs().unwrap(), 86_400 * 3);
        assert!(cfg.cycle_window(1, now).is_err());
    }

    #[test]
    fn zero_page_size_is_invalid() {
        let cfg = EstimatorConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
