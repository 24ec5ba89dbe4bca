//! Paginated event fetching.
//!
//! Indexers serve an account's configuration history in offset pages. The
//! fetcher keeps requesting pages until one comes back short, which marks the
//! end of the data.

use async_trait::async_trait;

use streamledger_core::error::EstimateError;
use streamledger_core::types::ConfigurationChangedEvent;

/// Trait for the external store of configuration events (usually a subgraph).
///
/// Pages carry no ordering guarantee; callers sort after fetching.
/// Transport failures should be reported as [`EstimateError::Fetch`].
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(
        &self,
        user_id: &str,
        skip: usize,
        first: usize,
    ) -> Result<Vec<ConfigurationChangedEvent>, EstimateError>;
}

/// Wraps an `EventSource` and adds pagination.
pub struct EventFetcher<S> {
    source: S,
    page_size: usize,
}

impl<S: EventSource> EventFetcher<S> {
    pub fn new(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch the complete history of `user_id`.
    ///
    /// Any page failure fails the whole fetch; nothing partial is returned.
    pub async fn fetch_all(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConfigurationChangedEvent>, EstimateError> {
        let mut all = Vec::new();
        let mut skip = 0;
        let mut pages = 0u32;

        loop {
            let page = self
                .source
                .fetch_events(user_id, skip, self.page_size)
                .await?;
            pages += 1;
            let len = page.len();
            tracing::debug!(user = user_id, skip, len, "Fetched event page");

            all.extend(page);
            if len < self.page_size {
                break;
            }
            skip += len;
        }

        tracing::info!(user = user_id, events = all.len(), pages, "Fetched configuration history");
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy_primitives::U256;

    /// Serves pages of fixed sizes regardless of offset.
    struct Pages {
        sizes: Vec<usize>,
        calls: AtomicUsize,
    }

    fn event(i: usize) -> ConfigurationChangedEvent {
        ConfigurationChangedEvent {
            owner_id: "u".into(),
            asset_id: U256::from(1u8),
            block_timestamp: i as u64,
            balance: U256::ZERO,
            max_end: 0,
            receivers_hash: "0x".into(),
            history_hash: "0x".into(),
            receivers: vec![],
        }
    }

    #[async_trait]
    impl EventSource for Pages {
        async fn fetch_events(
            &self,
            _user_id: &str,
            _skip: usize,
            _first: usize,
        ) -> Result<Vec<ConfigurationChangedEvent>, EstimateError> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            let size = self.sizes.get(call).copied().unwrap_or(0);
            Ok((0..size).map(event).collect())
        }
    }

    fn pages(sizes: &[usize]) -> EventFetcher<Pages> {
        EventFetcher::new(
            Pages {
                sizes: sizes.to_vec(),
                calls: AtomicUsize::new(0),
            },
            500,
        )
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let fetcher = pages(&[500, 500, 3]);
        let events = fetcher.fetch_all("u").await.unwrap();
        assert_eq!(events.len(), 1003);
        assert_eq!(fetcher.source().calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn stops_on_empty_first_page() {
        let fetcher = pages(&[]);
        let events = fetcher.fetch_all("u").await.unwrap();
        assert!(events.is_empty());
        assert_eq!(fetcher.source().calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let fetcher = pages(&[500, 500]);
        let events = fetcher.fetch_all("u").await.unwrap();
        assert_eq!(events.len(), 1000);
        assert_eq!(fetcher.source().calls.load(Ordering::Relaxed), 3);
    }
}
