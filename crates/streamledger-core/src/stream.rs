//! Stream configurations and the packed on-chain config codec.
//!
//! A packed config is a single 256-bit word, most significant bits first:
//!
//! ```text
//! | dripId: 32 | amtPerSec: 160 | start: 32 | duration: 32 |
//! ```

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::amount::serde_uint;
use crate::error::EstimateError;

const U32_MASK: U256 = U256::from_limbs([u32::MAX as u64, 0, 0, 0]);
const AMT_PER_SEC_BITS: usize = 160;

/// Decoded configuration of a single stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Sender-chosen identifier distinguishing streams to the same receiver.
    pub drip_id: u32,
    /// Start timestamp; `0` means "when the configuration was set".
    pub start: u32,
    /// Duration in seconds; `0` means "until the balance runs out".
    pub duration: u32,
    /// Rate per second, in the fixed-point base (see [`crate::amount`]).
    #[serde(with = "serde_uint")]
    pub amount_per_sec: U256,
}

impl StreamConfig {
    /// Decode a packed config word.
    pub fn decode(packed: U256) -> Result<Self, EstimateError> {
        let duration = low_u32(packed);
        let start = low_u32(packed >> 32usize);
        let amount_per_sec = (packed >> 64usize) & amt_per_sec_mask();
        let drip_id = low_u32(packed >> 224usize);

        if amount_per_sec.is_zero() {
            return Err(EstimateError::InvalidConfig {
                packed: packed.to_string(),
                reason: "amtPerSec is zero".into(),
            });
        }

        Ok(Self {
            drip_id,
            start,
            duration,
            amount_per_sec,
        })
    }

    /// Pack this config into a single word.
    pub fn encode(&self) -> Result<U256, EstimateError> {
        if self.amount_per_sec.is_zero() || self.amount_per_sec > amt_per_sec_mask() {
            return Err(EstimateError::InvalidConfig {
                packed: self.amount_per_sec.to_string(),
                reason: "amtPerSec must be in 1..2^160".into(),
            });
        }
        Ok((U256::from(self.drip_id) << 224usize)
            | (self.amount_per_sec << 64usize)
            | (U256::from(self.start) << 32usize)
            | U256::from(self.duration))
    }

    /// The window `[from, to)` during which this stream pays out, for a
    /// configuration set at `configured_at`. `to` is `None` for unbounded streams.
    pub fn window(&self, configured_at: u64) -> (u64, Option<u64>) {
        let from = if self.start == 0 {
            configured_at
        } else {
            u64::from(self.start)
        };
        let to = (self.duration != 0).then(|| from + u64::from(self.duration));
        (from, to)
    }
}

fn low_u32(word: U256) -> u32 {
    // Masked to 32 bits, so the narrowing is lossless.
    (word & U32_MASK).as_limbs()[0] as u32
}

fn amt_per_sec_mask() -> U256 {
    (U256::from(1u8) << AMT_PER_SEC_BITS) - U256::from(1u8)
}

/// A single (sender, receiver, token) funding relation as configured at some
/// checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    /// Deterministic id, see [`stream_id`].
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub config: StreamConfig,
}

/// Build the deterministic stream id from sender, token and drip id.
pub fn stream_id(sender_id: &str, token_address: &str, drip_id: u32) -> String {
    format!("{sender_id}-{token_address}-{drip_id}")
}
