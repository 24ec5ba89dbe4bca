//! streamledger-core — reconstruction and projection of token streaming accounts.
//!
//! # Architecture
//!
//! ```text
//! ConfigurationChangedEvent[] (raw, paged from an indexer)
//!        │
//!        ├── reconcile   (sort, split by token, union receivers per hash)
//!        ├── ledger      (checkpoints in the fixed-point base)
//!        └── projection  (lifetime + current-cycle estimates at "now")
//! ```
//!
//! Everything in this crate is synchronous and free of I/O; fetching lives in
//! `streamledger-account`.

pub mod amount;
pub mod config;
pub mod cycle;
pub mod error;
pub mod ledger;
pub mod projection;
pub mod reconcile;
pub mod stream;
pub mod token;
pub mod types;

pub use config::{EstimatorConfig, NetworkConfig};
pub use cycle::CycleWindow;
pub use error::EstimateError;
pub use ledger::{build_ledger, Ledger, LedgerCheckpoint};
pub use projection::{estimate, AssetEstimate, AssetTotals, Estimate, StreamEstimate};
pub use reconcile::{reconcile_account, reconcile_receivers, separate_by_token, sort_events};
pub use stream::{stream_id, Stream, StreamConfig};
pub use types::{ConfigurationChangedEvent, MaxEnd, ReceiverObservation, ReconciledEvent, SqueezeRecord};
