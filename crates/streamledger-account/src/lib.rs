//! streamledger-account — fetches an account's configuration history and
//! turns it into per-token estimates.

pub mod builder;
pub mod estimator;
pub mod fetcher;
pub mod memory;

pub use builder::EstimatorBuilder;
pub use estimator::{AccountEstimator, AccountSnapshot, TokenEstimates};
pub use fetcher::{EventFetcher, EventSource};
pub use memory::MemoryEventSource;
