//! Projection engine: walks a ledger forward to "now".
//!
//! Each checkpoint opens an interval that lasts until the next checkpoint (or
//! until now, for the last one). Inside an interval the checkpoint balance is
//! a single pot drained by every receiver whose window covers the current
//! second. When the pot cannot fund another whole second, the residue is paid
//! out pro rata during that second and every receiver stops until the next
//! checkpoint resets the balance.
//!
//! All accrual happens in the fixed-point base and is truncated to token
//! units only when the estimate is assembled.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::amount::{from_fixed, serde_uint, to_fixed};
use crate::cycle::CycleWindow;
use crate::error::EstimateError;
use crate::ledger::{Ledger, LedgerCheckpoint};
use crate::stream::Stream;
use crate::types::SqueezeRecord;

// ─── Output ───────────────────────────────────────────────────────────────────

/// Projection for a single stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEstimate {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub token_address: String,
    /// Amount delivered, in token units.
    #[serde(with = "serde_uint")]
    pub total_streamed: U256,
    /// Rate right now, in the fixed-point base; zero once stopped or depleted.
    #[serde(with = "serde_uint")]
    pub current_amount_per_second: U256,
    pub depletion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTotals {
    #[serde(with = "serde_uint")]
    pub total_streamed: U256,
    #[serde(with = "serde_uint")]
    pub remaining_balance: U256,
    #[serde(with = "serde_uint")]
    pub total_amount_per_second: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEstimate {
    pub streams: Vec<StreamEstimate>,
    pub totals: AssetTotals,
}

/// Lifetime and current-cycle projection for one token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub total: AssetEstimate,
    pub current_cycle: AssetEstimate,
}

// ─── Internals ────────────────────────────────────────────────────────────────

/// A payment to one stream.
#[derive(Debug)]
enum Flow {
    /// Constant rate over `[from, to)`.
    Rate {
        slot: usize,
        from: u64,
        to: u64,
        rate: U256,
    },
    /// Share of an exhausted pot, paid during the second starting at `at`.
    Residue { slot: usize, at: u64, amount: U256 },
}

/// Result of draining one checkpoint's pot over its interval.
#[derive(Debug)]
struct IntervalRun {
    flows: Vec<Flow>,
    remaining: U256,
    depleted_at: Option<u64>,
}

#[derive(Debug)]
struct Accrual {
    stream: Stream,
    total: U256,
    cycle: U256,
    current_rate: U256,
    in_latest: bool,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// Project `ledger` to `now`.
///
/// `squeezes` taken during `cycle` are deducted from the current-cycle
/// figures of the matching streams. The function is pure: identical inputs
/// always produce identical estimates.
pub fn estimate(
    ledger: &Ledger,
    now: DateTime<Utc>,
    cycle: &CycleWindow,
    squeezes: &[SqueezeRecord],
) -> Result<Estimate, EstimateError> {
    validate(ledger)?;
    let now = u64::try_from(now.timestamp())
        .map_err(|_| EstimateError::InvalidInput(format!("{now} is before the unix epoch")))?;
    let cycle_start = cycle.current_start_secs()?;

    let effective: Vec<&LedgerCheckpoint> = ledger
        .history
        .iter()
        .take_while(|cp| cp.timestamp <= now)
        .collect();

    let mut accruals: IndexMap<(String, String), Accrual> = IndexMap::new();
    let mut remaining = U256::ZERO;

    for (i, cp) in effective.iter().enumerate() {
        let is_latest = i + 1 == effective.len();
        let end = effective.get(i + 1).map_or(now, |next| next.timestamp);

        let slots: Vec<usize> = cp
            .receivers
            .iter()
            .map(|stream| {
                let entry = accruals.entry((stream.id.clone(), stream.receiver_id.clone()));
                let slot = entry.index();
                let acc = entry.or_insert_with(|| Accrual {
                    stream: stream.clone(),
                    total: U256::ZERO,
                    cycle: U256::ZERO,
                    current_rate: U256::ZERO,
                    in_latest: false,
                });
                acc.stream = stream.clone();
                acc.in_latest |= is_latest;
                slot
            })
            .collect();

        let run = drain(ledger, cp, cp.timestamp, end, &slots)?;

        for flow in &run.flows {
            let (slot, total, in_cycle) = match *flow {
                Flow::Rate {
                    slot,
                    from,
                    to,
                    rate,
                } => {
                    let total = rate
                        .checked_mul(U256::from(to - from))
                        .ok_or_else(|| overflow(ledger, cp))?;
                    let in_cycle = rate
                        .checked_mul(U256::from(overlap(from, to, cycle_start, now)))
                        .ok_or_else(|| overflow(ledger, cp))?;
                    (slot, total, in_cycle)
                }
                Flow::Residue { slot, at, amount } => {
                    let in_cycle = if at >= cycle_start && at < now {
                        amount
                    } else {
                        U256::ZERO
                    };
                    (slot, amount, in_cycle)
                }
            };
            let Some((_, acc)) = accruals.get_index_mut(slot) else {
                continue;
            };
            acc.total = acc.total.checked_add(total).ok_or_else(|| overflow(ledger, cp))?;
            acc.cycle = acc.cycle.checked_add(in_cycle).ok_or_else(|| overflow(ledger, cp))?;
        }

        if is_latest {
            apply_current_rates(ledger, cp, now, &run, &slots, &mut accruals)?;
            remaining = run.remaining;
        }
    }

    deduct_squeezes(ledger, cycle, squeezes, &mut accruals);

    let depletion_date = effective.last().and_then(|cp| cp.depletion_date);
    let total = assemble(ledger, &accruals, remaining, depletion_date, |a| a.total);
    let current_cycle = assemble(ledger, &accruals, remaining, depletion_date, |a| a.cycle);

    tracing::debug!(
        owner = %ledger.owner_id,
        token = %ledger.token_address,
        streams = accruals.len(),
        total_streamed = %total.totals.total_streamed,
        remaining = %total.totals.remaining_balance,
        "Projected ledger"
    );

    Ok(Estimate {
        total,
        current_cycle,
    })
}

/// Drain `cp.balance` over `[start, end)`.
fn drain(
    ledger: &Ledger,
    cp: &LedgerCheckpoint,
    start: u64,
    end: u64,
    slots: &[usize],
) -> Result<IntervalRun, EstimateError> {
    let mut remaining = cp.balance;
    let mut flows = Vec::new();
    if end <= start {
        return Ok(IntervalRun {
            flows,
            remaining,
            depleted_at: None,
        });
    }

    // Receiver windows clipped to the interval.
    let windows: Vec<(usize, u64, u64, U256)> = cp
        .receivers
        .iter()
        .zip(slots)
        .filter_map(|(stream, &slot)| {
            let (from, to) = stream.config.window(cp.timestamp);
            let from = from.max(start);
            let to = to.map_or(end, |t| t.min(end));
            (from < to).then_some((slot, from, to, stream.config.amount_per_sec))
        })
        .collect();

    let mut bounds: Vec<u64> = windows.iter().flat_map(|w| [w.1, w.2]).collect();
    bounds.sort_unstable();
    bounds.dedup();

    for pair in bounds.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let active: Vec<_> = windows.iter().filter(|w| w.1 <= a && w.2 >= b).collect();
        let rate = active
            .iter()
            .try_fold(U256::ZERO, |acc, w| acc.checked_add(w.3))
            .ok_or_else(|| overflow(ledger, cp))?;
        if rate.is_zero() {
            continue;
        }

        let len = b - a;
        let cost = rate
            .checked_mul(U256::from(len))
            .ok_or_else(|| overflow(ledger, cp))?;
        let secs = if cost <= remaining {
            len
        } else {
            u64::try_from(remaining / rate).unwrap_or(len).min(len)
        };

        if secs > 0 {
            flows.extend(active.iter().map(|w| Flow::Rate {
                slot: w.0,
                from: a,
                to: a + secs,
                rate: w.3,
            }));
            remaining -= rate * U256::from(secs);
        }
        if secs < len {
            let residue = split_residue(remaining, rate, a + secs, &active)
                .ok_or_else(|| overflow(ledger, cp))?;
            flows.extend(residue);
            remaining = U256::ZERO;
            return Ok(IntervalRun {
                flows,
                remaining,
                depleted_at: Some(a + secs),
            });
        }
    }

    Ok(IntervalRun {
        flows,
        remaining,
        depleted_at: None,
    })
}

/// Share `residue` (less than one second at `rate`) among `active` in
/// proportion to their rates. Rounding dust goes to the first stream, so the
/// shares always sum to `residue`.
fn split_residue(
    residue: U256,
    rate: U256,
    at: u64,
    active: &[&(usize, u64, u64, U256)],
) -> Option<Vec<Flow>> {
    if residue.is_zero() {
        return Some(Vec::new());
    }
    let mut shares: Vec<(usize, U256)> = active
        .iter()
        .map(|w| Some((w.0, residue.checked_mul(w.3)? / rate)))
        .collect::<Option<_>>()?;
    let paid = shares
        .iter()
        .fold(U256::ZERO, |sum, (_, share)| sum.saturating_add(*share));
    if let Some(first) = shares.first_mut() {
        first.1 += residue.saturating_sub(paid);
    }
    Some(
        shares
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(slot, amount)| Flow::Residue { slot, at, amount })
            .collect(),
    )
}

/// Set the live rate of every stream in the latest checkpoint.
fn apply_current_rates(
    ledger: &Ledger,
    cp: &LedgerCheckpoint,
    now: u64,
    run: &IntervalRun,
    slots: &[usize],
    accruals: &mut IndexMap<(String, String), Accrual>,
) -> Result<(), EstimateError> {
    let active: Vec<(usize, U256)> = cp
        .receivers
        .iter()
        .zip(slots)
        .filter(|(stream, _)| {
            let (from, to) = stream.config.window(cp.timestamp);
            from <= now && to.map_or(true, |t| now < t)
        })
        .map(|(stream, &slot)| (slot, stream.config.amount_per_sec))
        .collect();

    let active_rate = active
        .iter()
        .try_fold(U256::ZERO, |acc, (_, rate)| acc.checked_add(*rate))
        .ok_or_else(|| overflow(ledger, cp))?;
    if run.depleted_at.is_some() || run.remaining < active_rate {
        return Ok(());
    }

    for (slot, rate) in active {
        if let Some((_, acc)) = accruals.get_index_mut(slot) {
            acc.current_rate += rate;
        }
    }
    Ok(())
}

/// Remove squeezed amounts from current-cycle accruals, first-seen stream first.
fn deduct_squeezes(
    ledger: &Ledger,
    cycle: &CycleWindow,
    squeezes: &[SqueezeRecord],
    accruals: &mut IndexMap<(String, String), Accrual>,
) {
    for squeeze in squeezes
        .iter()
        .filter(|s| cycle.contains(s.cycle_timestamp))
        .filter(|s| s.token_address.eq_ignore_ascii_case(&ledger.token_address))
    {
        let mut left = to_fixed(squeeze.amount).unwrap_or(U256::MAX);
        for acc in accruals.values_mut() {
            if left.is_zero() {
                break;
            }
            let s = &acc.stream;
            if !squeeze.matches(&s.sender_id, &s.receiver_id, &ledger.token_address) {
                continue;
            }
            let taken = left.min(acc.cycle);
            acc.cycle -= taken;
            left -= taken;
        }
        if !left.is_zero() {
            tracing::warn!(
                sender = %squeeze.sender_id,
                receiver = %squeeze.receiver_id,
                token = %squeeze.token_address,
                excess = %from_fixed(left),
                "Squeeze exceeds current-cycle accrual"
            );
        }
    }
}

fn assemble(
    ledger: &Ledger,
    accruals: &IndexMap<(String, String), Accrual>,
    remaining: U256,
    depletion_date: Option<DateTime<Utc>>,
    amount: impl Fn(&Accrual) -> U256,
) -> AssetEstimate {
    let streams: Vec<StreamEstimate> = accruals
        .values()
        .map(|acc| StreamEstimate {
            id: acc.stream.id.clone(),
            sender_id: acc.stream.sender_id.clone(),
            receiver_id: acc.stream.receiver_id.clone(),
            token_address: ledger.token_address.clone(),
            total_streamed: from_fixed(amount(acc)),
            current_amount_per_second: acc.current_rate,
            depletion_date: if acc.in_latest { depletion_date } else { None },
        })
        .collect();

    let totals = AssetTotals {
        total_streamed: streams
            .iter()
            .fold(U256::ZERO, |sum, s| sum.saturating_add(s.total_streamed)),
        remaining_balance: from_fixed(remaining),
        total_amount_per_second: streams
            .iter()
            .fold(U256::ZERO, |sum, s| sum.saturating_add(s.current_amount_per_second)),
    };

    AssetEstimate { streams, totals }
}

/// Reject ledgers the engine cannot project faithfully.
fn validate(ledger: &Ledger) -> Result<(), EstimateError> {
    if ledger.history.is_empty() {
        return Err(EstimateError::MissingLedger {
            user_id: ledger.owner_id.clone(),
            token: ledger.token_address.clone(),
        });
    }
    for (i, cp) in ledger.history.iter().enumerate() {
        if i > 0 && cp.timestamp < ledger.history[i - 1].timestamp {
            return Err(malformed(ledger, cp, "checkpoint out of chronological order"));
        }
        if let Some(stream) = cp.receivers.iter().find(|s| s.config.amount_per_sec.is_zero()) {
            return Err(malformed(
                ledger,
                cp,
                &format!("stream {} has a zero rate", stream.id),
            ));
        }
    }
    Ok(())
}

fn overlap(from: u64, to: u64, lo: u64, hi: u64) -> u64 {
    to.min(hi).saturating_sub(from.max(lo))
}

fn overflow(ledger: &Ledger, cp: &LedgerCheckpoint) -> EstimateError {
    malformed(ledger, cp, "streamed amount overflows 256 bits")
}

fn malformed(ledger: &Ledger, cp: &LedgerCheckpoint, reason: &str) -> EstimateError {
    EstimateError::MalformedCheckpoint {
        token: ledger.token_address.clone(),
        timestamp: cp.timestamp,
        receivers_hash: cp.receivers_hash.clone(),
        reason: reason.to_string(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
