//! In-memory event source.
//!
//! Serves a fixed (but appendable) event log with the same offset paging an
//! indexer would. Useful for tests, replaying JSON dumps, and offline estimates.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use streamledger_core::error::EstimateError;
use streamledger_core::types::ConfigurationChangedEvent;

use crate::fetcher::EventSource;

/// In-memory event source. Counts every page request it serves.
#[derive(Default)]
pub struct MemoryEventSource {
    events: Mutex<Vec<ConfigurationChangedEvent>>,
    calls: AtomicUsize,
}

impl MemoryEventSource {
    pub fn new(events: Vec<ConfigurationChangedEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            calls: AtomicUsize::new(0),
        }
    }

    /// Load a JSON array of events, as exported from an indexer.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Append an event, as if it were just indexed.
    pub fn push(&self, event: ConfigurationChangedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Number of page requests served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Total number of stored events (all owners).
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn fetch_events(
        &self,
        user_id: &str,
        skip: usize,
        first: usize,
    ) -> Result<Vec<ConfigurationChangedEvent>, EstimateError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events
            .iter()
            .filter(|e| e.owner_id == user_id)
            .skip(skip)
            .take(first)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn ev(owner: &str, ts: u64) -> ConfigurationChangedEvent {
        ConfigurationChangedEvent {
            owner_id: owner.into(),
            asset_id: U256::from(1u8),
            block_timestamp: ts,
            balance: U256::ZERO,
            max_end: 0,
            receivers_hash: "0x".into(),
            history_hash: "0x".into(),
            receivers: vec![],
        }
    }

    #[tokio::test]
    async fn pages_only_the_requested_owner() {
        let source = MemoryEventSource::new(vec![ev("a", 1), ev("b", 2), ev("a", 3), ev("a", 4)]);

        let page = source.fetch_events("a", 1, 2).await.unwrap();
        assert_eq!(page.iter().map(|e| e.block_timestamp).collect::<Vec<_>>(), [3, 4]);
        assert!(source.fetch_events("a", 3, 2).await.unwrap().is_empty());
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn loads_json_dump() {
        let source = MemoryEventSource::from_json(
            r#"[{
                "ownerId": "a", "assetId": "1", "blockTimestamp": 5, "balance": "10",
                "maxEnd": 0, "receiversHash": "0x1", "historyHash": "0x2"
            }]"#,
        )
        .unwrap();
        assert_eq!(source.len(), 1);
        source.push(ev("a", 6));
        assert_eq!(source.len(), 2);
    }
}
