//! Shared types for the reconciliation pipeline.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{serde_num, serde_uint};

// ─── Events ───────────────────────────────────────────────────────────────────

/// A receiver entry visible in a single configuration event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverObservation {
    pub receiver_id: String,
    #[serde(with = "serde_uint")]
    pub packed_config: U256,
}

/// One on-chain "streams configuration changed" event.
///
/// `receivers` holds only what this event exposed; the full set for
/// `receivers_hash` may be spread across several events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationChangedEvent {
    pub owner_id: String,
    #[serde(with = "serde_uint")]
    pub asset_id: U256,
    /// Unix timestamp of the block (seconds since epoch).
    #[serde(with = "serde_num")]
    pub block_timestamp: u64,
    /// Balance after the change, in token units.
    #[serde(with = "serde_uint")]
    pub balance: U256,
    /// Raw `maxEnd`; interpret through [`MaxEnd::from_raw`].
    #[serde(with = "serde_num")]
    pub max_end: u32,
    pub receivers_hash: String,
    pub history_hash: String,
    #[serde(default)]
    pub receivers: Vec<ReceiverObservation>,
}

/// A configuration event annotated with the full receiver set of its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledEvent {
    pub event: ConfigurationChangedEvent,
    /// Deduplicated union of every observation ever seen for `receivers_hash`.
    pub receivers: Vec<ReceiverObservation>,
}

impl ReconciledEvent {
    pub fn timestamp(&self) -> u64 {
        self.event.block_timestamp
    }

    pub fn receivers_hash(&self) -> &str {
        &self.event.receivers_hash
    }
}

// ─── MaxEnd ───────────────────────────────────────────────────────────────────

/// Interpreted `maxEnd` of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxEnd {
    /// `0`: no stream is active.
    NoStreams,
    /// `u32::MAX`: every stream ends before the balance runs out.
    Unbounded,
    /// The balance runs out at this unix timestamp.
    EndsAt(u32),
}

impl MaxEnd {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::NoStreams,
            u32::MAX => Self::Unbounded,
            ts => Self::EndsAt(ts),
        }
    }

    /// The depletion date implied by this value, if any.
    pub fn depletion_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::NoStreams | Self::Unbounded => None,
            Self::EndsAt(ts) => DateTime::from_timestamp(i64::from(*ts), 0),
        }
    }
}

// ─── Squeezes ─────────────────────────────────────────────────────────────────

/// Funds a receiver withdrew from the current, still-open cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqueezeRecord {
    pub sender_id: String,
    pub receiver_id: String,
    pub token_address: String,
    /// Squeezed amount, in token units.
    #[serde(with = "serde_uint")]
    pub amount: U256,
    /// Unix timestamp of the squeeze.
    #[serde(with = "serde_num")]
    pub cycle_timestamp: u64,
}

impl SqueezeRecord {
    /// Returns `true` if this squeeze took `amount` from the given stream triple.
    pub fn matches(&self, sender_id: &str, receiver_id: &str, token_address: &str) -> bool {
        self.sender_id == sender_id
            && self.receiver_id == receiver_id
            && self.token_address.eq_ignore_ascii_case(token_address)
    }
}
