//! Event reconciliation: rebuilds the complete receiver set behind every
//! configuration event.
//!
//! The chain only records a hash of each receiver set, and an indexer only
//! exposes the receivers touched by a given event. The full set for a hash is
//! the union of every observation carrying that hash, anywhere in the history.

use alloy_primitives::U256;
use indexmap::IndexMap;

use crate::error::EstimateError;
use crate::token::token_address;
use crate::types::{ConfigurationChangedEvent, ReceiverObservation, ReconciledEvent};

/// Receiver set accumulated for one `receivers_hash`.
///
/// Observations are keyed by packed config alone, so two receivers sharing an
/// identical packed config under the same hash collapse into the first one seen.
#[derive(Debug, Default, Clone)]
pub struct ReceiverSet {
    by_config: IndexMap<U256, ReceiverObservation>,
}

impl ReceiverSet {
    /// Merge an observation, keeping the first one seen for its config.
    pub fn merge(&mut self, observation: &ReceiverObservation) {
        self.by_config
            .entry(observation.packed_config)
            .or_insert_with(|| observation.clone());
    }

    pub fn len(&self) -> usize {
        self.by_config.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_config.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ReceiverObservation> {
        self.by_config.values().cloned().collect()
    }
}

/// Stable sort by block timestamp; ties keep their original order.
pub fn sort_events(events: &mut [ConfigurationChangedEvent]) {
    events.sort_by_key(|e| e.block_timestamp);
}

/// Group events by token address, preserving order inside each group and the
/// order in which tokens first appear.
pub fn separate_by_token(
    events: Vec<ConfigurationChangedEvent>,
) -> Result<IndexMap<String, Vec<ConfigurationChangedEvent>>, EstimateError> {
    let mut by_token: IndexMap<String, Vec<ConfigurationChangedEvent>> = IndexMap::new();
    for event in events {
        let token = token_address(event.asset_id).map_err(|reason| {
            EstimateError::MalformedEvent {
                owner_id: event.owner_id.clone(),
                token: format!("{:#x}", event.asset_id),
                timestamp: event.block_timestamp,
                receivers_hash: event.receivers_hash.clone(),
                reason,
            }
        })?;
        by_token.entry(token).or_default().push(event);
    }
    Ok(by_token)
}

/// Annotate every event with the full receiver set of its hash.
///
/// Built in one pass over the whole log, so duplicate hashes are reconciled
/// no matter how far apart they occur.
pub fn reconcile_receivers(events: Vec<ConfigurationChangedEvent>) -> Vec<ReconciledEvent> {
    let mut sets: IndexMap<String, ReceiverSet> = IndexMap::new();
    for event in &events {
        let set = sets.entry(event.receivers_hash.clone()).or_default();
        for observation in &event.receivers {
            set.merge(observation);
        }
    }

    tracing::debug!(
        events = events.len(),
        distinct_hashes = sets.len(),
        receivers = sets.values().map(ReceiverSet::len).sum::<usize>(),
        unobserved_hashes = sets.values().filter(|s| s.is_empty()).count(),
        "Reconciled receiver sets"
    );

    events
        .into_iter()
        .map(|event| {
            let receivers = sets
                .get(&event.receivers_hash)
                .map(ReceiverSet::to_vec)
                .unwrap_or_default();
            ReconciledEvent { event, receivers }
        })
        .collect()
}

/// Full reconciliation of an account's raw log: sort, split by token,
/// reconcile each token's receivers.
pub fn reconcile_account(
    mut events: Vec<ConfigurationChangedEvent>,
) -> Result<IndexMap<String, Vec<ReconciledEvent>>, EstimateError> {
    sort_events(&mut events);
    let by_token = separate_by_token(events)?;
    Ok(by_token
        .into_iter()
        .map(|(token, events)| (token, reconcile_receivers(events)))
        .collect())
}
