//! Account-level estimation.
//!
//! `AccountEstimator` owns an event source and a cache of reconciled event
//! logs, one per user. Ledgers are rebuilt from the cached log on every
//! estimate, so a snapshot only changes when [`AccountEstimator::refresh`]
//! replaces it.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use indexmap::IndexMap;
use std::collections::HashMap;

use streamledger_core::config::EstimatorConfig;
use streamledger_core::error::EstimateError;
use streamledger_core::ledger::{build_ledger, Ledger};
use streamledger_core::projection::{estimate, Estimate};
use streamledger_core::reconcile::reconcile_account;
use streamledger_core::types::{ConfigurationChangedEvent, ReconciledEvent, SqueezeRecord};

use crate::fetcher::{EventFetcher, EventSource};

/// Per-token estimates, in first-seen token order.
pub type TokenEstimates = IndexMap<String, Result<Estimate, EstimateError>>;

/// Reconciled history of one account, as of the last refresh.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub user_id: String,
    pub fetched_at: DateTime<Utc>,
    /// Number of raw events fetched.
    pub event_count: usize,
    /// Reconciled events per token address, in first-seen token order.
    pub tokens: IndexMap<String, Vec<ReconciledEvent>>,
}

impl AccountSnapshot {
    fn new(
        user_id: &str,
        events: Vec<ConfigurationChangedEvent>,
    ) -> Result<Self, EstimateError> {
        let event_count = events.len();
        let tokens = reconcile_account(events)?;
        tracing::info!(
            user = user_id,
            events = event_count,
            tokens = tokens.len(),
            "Reconciled account"
        );
        Ok(Self {
            user_id: user_id.to_string(),
            fetched_at: Utc::now(),
            event_count,
            tokens,
        })
    }

    /// Build a fresh ledger for `token` (address match is case-insensitive).
    pub fn ledger(&self, token: &str) -> Result<Ledger, EstimateError> {
        let (token, events) = self
            .tokens
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(token))
            .ok_or_else(|| EstimateError::MissingLedger {
                user_id: self.user_id.clone(),
                token: token.to_string(),
            })?;
        build_ledger(&self.user_id, token, events)
    }

    /// Build fresh ledgers for every token the account ever configured.
    pub fn ledgers(&self) -> Result<IndexMap<String, Ledger>, EstimateError> {
        self.tokens
            .iter()
            .map(|(token, events)| {
                build_ledger(&self.user_id, token, events).map(|ledger| (token.clone(), ledger))
            })
            .collect()
    }
}

/// Fetches, reconciles and projects streaming accounts.
pub struct AccountEstimator<S> {
    fetcher: EventFetcher<S>,
    config: EstimatorConfig,
    snapshots: HashMap<String, AccountSnapshot>,
}

impl<S: EventSource> AccountEstimator<S> {
    pub fn new(source: S, config: EstimatorConfig) -> Result<Self, EstimateError> {
        config.validate()?;
        Ok(Self {
            fetcher: EventFetcher::new(source, config.page_size),
            config,
            snapshots: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        self.fetcher.source()
    }

    /// The cached snapshot for `user_id`, if it was ever refreshed.
    pub fn snapshot(&self, user_id: &str) -> Option<&AccountSnapshot> {
        self.snapshots.get(user_id)
    }

    /// Drop the cached snapshot for `user_id`.
    pub fn invalidate(&mut self, user_id: &str) {
        self.snapshots.remove(user_id);
    }

    /// Re-fetch and re-reconcile the full history of `user_id`.
    ///
    /// On failure the previous snapshot, if any, is left untouched.
    pub async fn refresh(&mut self, user_id: &str) -> Result<&AccountSnapshot, EstimateError> {
        check_user(user_id)?;
        let events = self.fetcher.fetch_all(user_id).await?;
        let snapshot = AccountSnapshot::new(user_id, events)?;
        self.snapshots.insert(user_id.to_string(), snapshot);
        self.snapshots
            .get(user_id)
            .ok_or_else(|| EstimateError::InvalidInput(format!("no snapshot for {user_id}")))
    }

    /// Refresh several users, fetching their histories concurrently.
    ///
    /// Fails as a whole on the first error; no snapshot is replaced then.
    pub async fn refresh_many(&mut self, user_ids: &[&str]) -> Result<(), EstimateError> {
        for user_id in user_ids {
            check_user(user_id)?;
        }
        let fetcher = &self.fetcher;
        let histories = try_join_all(user_ids.iter().map(|u| fetcher.fetch_all(u))).await?;

        let snapshots = user_ids
            .iter()
            .zip(histories)
            .map(|(user_id, events)| AccountSnapshot::new(user_id, events))
            .collect::<Result<Vec<_>, _>>()?;
        for snapshot in snapshots {
            self.snapshots.insert(snapshot.user_id.clone(), snapshot);
        }
        Ok(())
    }

    /// Estimate every token of `user_id` as of the current wall-clock time.
    pub async fn estimate(
        &mut self,
        user_id: &str,
        chain_id: u64,
        squeezes: Option<&[SqueezeRecord]>,
    ) -> Result<TokenEstimates, EstimateError> {
        self.estimate_at(user_id, chain_id, squeezes, Utc::now()).await
    }

    /// Estimate every token of `user_id` as of `now`.
    ///
    /// Refreshes first if the user has no cached snapshot. Fetch failures and
    /// invalid input fail the whole call; a token whose history is malformed
    /// gets its own error and leaves the other tokens untouched.
    pub async fn estimate_at(
        &mut self,
        user_id: &str,
        chain_id: u64,
        squeezes: Option<&[SqueezeRecord]>,
        now: DateTime<Utc>,
    ) -> Result<TokenEstimates, EstimateError> {
        check_user(user_id)?;
        let cycle = self.config.cycle_window(chain_id, now)?;
        let snapshot = self.loaded(user_id).await?;
        let squeezes = squeezes.unwrap_or_default();

        Ok(snapshot
            .tokens
            .iter()
            .map(|(token, events)| {
                let result = build_ledger(&snapshot.user_id, token, events)
                    .and_then(|ledger| estimate(&ledger, now, &cycle, squeezes));
                if let Err(e) = &result {
                    tracing::warn!(user = user_id, token = %token, error = %e, "Token estimate failed");
                }
                (token.clone(), result)
            })
            .collect())
    }

    /// Estimate a single token. Surfaces [`EstimateError::MissingLedger`] if
    /// the account never configured streams for it.
    pub async fn estimate_token(
        &mut self,
        user_id: &str,
        chain_id: u64,
        token: &str,
        squeezes: Option<&[SqueezeRecord]>,
        now: DateTime<Utc>,
    ) -> Result<Estimate, EstimateError> {
        check_user(user_id)?;
        let cycle = self.config.cycle_window(chain_id, now)?;
        let ledger = self.loaded(user_id).await?.ledger(token)?;
        estimate(&ledger, now, &cycle, squeezes.unwrap_or_default())
    }

    async fn loaded(&mut self, user_id: &str) -> Result<&AccountSnapshot, EstimateError> {
        if !self.snapshots.contains_key(user_id) {
            self.refresh(user_id).await?;
        }
        self.snapshots
            .get(user_id)
            .ok_or_else(|| EstimateError::InvalidInput(format!("no snapshot for {user_id}")))
    }
}

fn check_user(user_id: &str) -> Result<(), EstimateError> {
    if user_id.trim().is_empty() {
        return Err(EstimateError::InvalidInput("user id is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEventSource;
    use alloy_primitives::U256;
    use streamledger_core::types::ReceiverObservation;

    fn ev(owner: &str, asset: u64, ts: u64) -> ConfigurationChangedEvent {
        ConfigurationChangedEvent {
            owner_id: owner.into(),
            asset_id: U256::from(asset),
            block_timestamp: ts,
            balance: U256::from(10u8),
            max_end: 0,
            receivers_hash: format!("r{ts}"),
            history_hash: format!("h{ts}"),
            receivers: vec![],
        }
    }

    fn estimator(events: Vec<ConfigurationChangedEvent>) -> AccountEstimator<MemoryEventSource> {
        AccountEstimator::new(MemoryEventSource::new(events), EstimatorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn empty_user_is_rejected_before_io() {
        let mut est = estimator(vec![]);
        let err = est.estimate("", 1, None).await.unwrap_err();
        assert!(matches!(err, EstimateError::InvalidInput(_)));
        assert_eq!(est.source().calls(), 0);
    }

    #[tokio::test]
    async fn unknown_chain_is_rejected_before_io() {
        let mut est = estimator(vec![ev("u", 1, 1)]);
        assert!(est.estimate("u", 999, None).await.is_err());
        assert_eq!(est.source().calls(), 0);
    }

    #[tokio::test]
    async fn snapshot_is_cached_until_refresh() {
        let mut est = estimator(vec![ev("u", 1, 1)]);
        let now = DateTime::from_timestamp(100, 0).unwrap();

        est.estimate_at("u", 1, None, now).await.unwrap();
        est.estimate_at("u", 1, None, now).await.unwrap();
        assert_eq!(est.source().calls(), 1);

        est.source().push(ev("u", 2, 2));
        assert_eq!(est.estimate_at("u", 1, None, now).await.unwrap().len(), 1);

        est.refresh("u").await.unwrap();
        assert_eq!(est.snapshot("u").unwrap().event_count, 2);
        assert_eq!(est.estimate_at("u", 1, None, now).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn refresh_many_loads_every_user() {
        let mut est = estimator(vec![ev("a", 1, 1), ev("b", 1, 2), ev("b", 2, 3)]);
        est.refresh_many(&["a", "b"]).await.unwrap();
        assert_eq!(est.snapshot("a").unwrap().tokens.len(), 1);
        assert_eq!(est.snapshot("b").unwrap().tokens.len(), 2);
    }

    #[tokio::test]
    async fn malformed_token_keeps_the_others() {
        let mut bad = ev("u", 2, 5);
        bad.max_end = u32::MAX;
        bad.receivers = vec![ReceiverObservation {
            receiver_id: "r".into(),
            packed_config: U256::from(9u8) << 224usize,
        }];
        let mut est = estimator(vec![ev("u", 1, 1), bad]);
        let now = DateTime::from_timestamp(100, 0).unwrap();

        let estimates = est.estimate_at("u", 1, None, now).await.unwrap();
        assert_eq!(estimates.len(), 2);
        let mut results = estimates.values();
        assert!(results.next().unwrap().is_ok());
        let err = results.next().unwrap().as_ref().unwrap_err();
        assert!(matches!(err, EstimateError::MalformedEvent { timestamp: 5, .. }));
        assert_eq!(err.token(), estimates.keys().nth(1).map(String::as_str));
    }

    #[tokio::test]
    async fn unknown_token_is_missing_ledger() {
        let mut est = estimator(vec![ev("u", 1, 1)]);
        let now = DateTime::from_timestamp(100, 0).unwrap();
        let err = est
            .estimate_token("u", 1, "0x00000000000000000000000000000000000000ff", None, now)
            .await
            .unwrap_err();
        assert!(err.is_no_data());
    }
}
