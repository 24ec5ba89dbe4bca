//! Ledger building: turns a token's reconciled events into an append-only,
//! time-ordered history of balance checkpoints.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{serde_uint, to_fixed};
use crate::error::EstimateError;
use crate::stream::{stream_id, Stream, StreamConfig};
use crate::types::{MaxEnd, ReconciledEvent};

/// Snapshot of a token's streaming configuration at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCheckpoint {
    /// Unix timestamp of the configuring event.
    pub timestamp: u64,
    /// Balance in the fixed-point base.
    #[serde(with = "serde_uint")]
    pub balance: U256,
    pub receivers: Vec<Stream>,
    pub history_hash: String,
    pub receivers_hash: String,
    pub max_end: MaxEnd,
    pub depletion_date: Option<DateTime<Utc>>,
}

/// Per-token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub owner_id: String,
    pub token_address: String,
    /// Receivers of the latest checkpoint.
    pub current_streams: Vec<Stream>,
    /// Checkpoints in non-decreasing timestamp order.
    pub history: Vec<LedgerCheckpoint>,
}

impl Ledger {
    pub fn latest(&self) -> Option<&LedgerCheckpoint> {
        self.history.last()
    }
}

/// Build the ledger for one token from its chronologically sorted events.
///
/// Fails with [`EstimateError::MissingLedger`] when `events` is empty, and with
/// [`EstimateError::MalformedEvent`] when an event cannot be interpreted.
pub fn build_ledger(
    owner_id: &str,
    token_address: &str,
    events: &[ReconciledEvent],
) -> Result<Ledger, EstimateError> {
    if events.is_empty() {
        return Err(EstimateError::MissingLedger {
            user_id: owner_id.to_string(),
            token: token_address.to_string(),
        });
    }

    let mut history: Vec<LedgerCheckpoint> = Vec::with_capacity(events.len());
    for event in events {
        let checkpoint = checkpoint_from_event(token_address, event)?;
        if let Some(prev) = history.last() {
            if checkpoint.timestamp < prev.timestamp {
                return Err(malformed(
                    token_address,
                    event,
                    format!("event precedes previous checkpoint at {}", prev.timestamp),
                ));
            }
        }
        history.push(checkpoint);
    }

    let current_streams = history
        .last()
        .map(|cp| cp.receivers.clone())
        .unwrap_or_default();

    tracing::info!(
        owner = owner_id,
        token = token_address,
        checkpoints = history.len(),
        current_streams = current_streams.len(),
        "Built ledger"
    );

    Ok(Ledger {
        owner_id: owner_id.to_string(),
        token_address: token_address.to_string(),
        current_streams,
        history,
    })
}

fn checkpoint_from_event(
    token_address: &str,
    event: &ReconciledEvent,
) -> Result<LedgerCheckpoint, EstimateError> {
    let raw = &event.event;
    let max_end = MaxEnd::from_raw(raw.max_end);

    let receivers = match max_end {
        MaxEnd::NoStreams => Vec::new(),
        MaxEnd::Unbounded | MaxEnd::EndsAt(_) => event
            .receivers
            .iter()
            .map(|r| {
                let config = StreamConfig::decode(r.packed_config)
                    .map_err(|e| malformed(token_address, event, e.to_string()))?;
                Ok(Stream {
                    id: stream_id(&raw.owner_id, token_address, config.drip_id),
                    sender_id: raw.owner_id.clone(),
                    receiver_id: r.receiver_id.clone(),
                    config,
                })
            })
            .collect::<Result<Vec<_>, EstimateError>>()?,
    };

    let balance = to_fixed(raw.balance)
        .ok_or_else(|| {
            malformed(
                token_address,
                event,
                format!("balance {} is unrepresentable", raw.balance),
            )
        })?;

    let depletion_date = if receivers.is_empty() {
        None
    } else {
        max_end.depletion_date()
    };

    Ok(LedgerCheckpoint {
        timestamp: raw.block_timestamp,
        balance,
        receivers,
        history_hash: raw.history_hash.clone(),
        receivers_hash: raw.receivers_hash.clone(),
        max_end,
        depletion_date,
    })
}

fn malformed(token_address: &str, event: &ReconciledEvent, reason: String) -> EstimateError {
    EstimateError::MalformedEvent {
        owner_id: event.event.owner_id.clone(),
        token: token_address.to_string(),
        timestamp: event.event.block_timestamp,
        receivers_hash: event.event.receivers_hash.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::AMT_PER_SEC_MULTIPLIER;
    use crate::types::{ConfigurationChangedEvent, ReceiverObservation};

    const TOKEN: &str = "0x0000000000000000000000000000000000000001";

    fn packed(drip_id: u32, rate: u64) -> U256 {
        StreamConfig {
            drip_id,
            start: 0,
            duration: 0,
            amount_per_sec: U256::from(rate),
        }
        .encode()
        .unwrap()
    }

    fn reconciled(ts: u64, max_end: u32, receivers: Vec<(&str, U256)>) -> ReconciledEvent {
        let receivers: Vec<_> = receivers
            .into_iter()
            .map(|(id, cfg)| ReceiverObservation {
                receiver_id: id.into(),
                packed_config: cfg,
            })
            .collect();
        ReconciledEvent {
            event: ConfigurationChangedEvent {
                owner_id: "u".into(),
                asset_id: U256::from(1u8),
                block_timestamp: ts,
                balance: U256::from(1000u64),
                max_end,
                receivers_hash: format!("r{ts}"),
                history_hash: format!("h{ts}"),
                receivers: receivers.clone(),
            },
            receivers,
        }
    }

    #[test]
    fn empty_history_is_missing_ledger() {
        let err = build_ledger("u", TOKEN, &[]).unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn balance_is_rescaled_and_streams_decoded() {
        let ledger = build_ledger("u", TOKEN, &[reconciled(10, 110, vec![("r", packed(3, 7))])]).unwrap();
        let cp = ledger.latest().unwrap();
        assert_eq!(cp.balance, U256::from(1000u64) * AMT_PER_SEC_MULTIPLIER);
        assert_eq!(cp.receivers.len(), 1);
        assert_eq!(cp.receivers[0].id, format!("u-{TOKEN}-3"));
        assert_eq!(cp.receivers[0].config.amount_per_sec, U256::from(7u64));
        assert_eq!(ledger.current_streams, cp.receivers);
    }

    #[test]
    fn depletion_follows_max_end_sentinels() {
        let unbounded = build_ledger("u", TOKEN, &[reconciled(1, u32::MAX, vec![("r", packed(0, 1))])]).unwrap();
        assert!(unbounded.latest().unwrap().depletion_date.is_none());

        let none = build_ledger("u", TOKEN, &[reconciled(1, 0, vec![("r", packed(0, 1))])]).unwrap();
        assert!(none.latest().unwrap().depletion_date.is_none());
        assert!(none.current_streams.is_empty());

        let finite = build_ledger("u", TOKEN, &[reconciled(1, 500, vec![("r", packed(0, 1))])]).unwrap();
        assert_eq!(finite.latest().unwrap().depletion_date.unwrap().timestamp(), 500);
    }

    #[test]
    fn history_is_monotonic() {
        let events: Vec<_> = [1, 5, 5, 9]
            .into_iter()
            .map(|ts| reconciled(ts, u32::MAX, vec![]))
            .collect();
        let ledger = build_ledger("u", TOKEN, &events).unwrap();
        assert!(ledger.history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let events = vec![reconciled(9, u32::MAX, vec![]), reconciled(1, u32::MAX, vec![])];
        assert!(matches!(
            build_ledger("u", TOKEN, &events),
            Err(EstimateError::MalformedEvent { timestamp: 1, .. })
        ));
    }

    #[test]
    fn undecodable_config_aborts_with_context() {
        let zero_rate = U256::from(5u8) << 224usize;
        let err = build_ledger("u", TOKEN, &[reconciled(42, 100, vec![("r", zero_rate)])]).unwrap_err();
        match err {
            EstimateError::MalformedEvent { token, timestamp, receivers_hash, .. } => {
                assert_eq!(token, TOKEN);
                assert_eq!(timestamp, 42);
                assert_eq!(receivers_hash, "r42");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unrepresentable_balance_is_rejected() {
        let mut event = reconciled(1, u32::MAX, vec![]);
        event.event.balance = U256::MAX;
        assert!(build_ledger("u", TOKEN, &[event]).is_err());
    }
}
