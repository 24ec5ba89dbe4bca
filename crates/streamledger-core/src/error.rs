//! Error types for the reconciliation and estimation pipeline.

use thiserror::Error;

/// Errors that can occur while fetching, reconciling or projecting an account.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("Event source error for user {user_id}: {reason}")]
    Fetch { user_id: String, reason: String },

    #[error("Malformed event from {owner_id} for token {token} at {timestamp} (receivers hash {receivers_hash}): {reason}")]
    MalformedEvent {
        owner_id: String,
        token: String,
        timestamp: u64,
        receivers_hash: String,
        reason: String,
    },

    #[error("Malformed checkpoint for token {token} at {timestamp} (receivers hash {receivers_hash}): {reason}")]
    MalformedCheckpoint {
        token: String,
        timestamp: u64,
        receivers_hash: String,
        reason: String,
    },

    #[error("Invalid stream config {packed}: {reason}")]
    InvalidConfig { packed: String, reason: String },

    #[error("No streaming history for user {user_id} and token {token}")]
    MissingLedger { user_id: String, token: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EstimateError {
    /// Returns `true` if the account never streamed the requested token.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::MissingLedger { .. })
    }

    /// The token the error is scoped to, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::MalformedEvent { token, .. }
            | Self::MalformedCheckpoint { token, .. }
            | Self::MissingLedger { token, .. } => Some(token),
            Self::Fetch { .. } | Self::InvalidConfig { .. } | Self::InvalidInput(_) => None,
        }
    }

    /// Returns `true` if retrying the whole fetch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ledger_is_no_data() {
        let err = EstimateError::MissingLedger {
            user_id: "42".into(),
            token: "0xabc".into(),
        };
        assert!(err.is_no_data());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "No streaming history for user 42 and token 0xabc"
        );
    }

    #[test]
    fn only_fetch_errors_are_retryable() {
        let fetch = EstimateError::Fetch {
            user_id: "1".into(),
            reason: "HTTP 502".into(),
        };
        assert!(fetch.is_retryable());
        assert!(!EstimateError::InvalidInput("empty user id".into()).is_retryable());
    }

    #[test]
    fn malformed_event_names_its_token() {
        let err = EstimateError::MalformedEvent {
            owner_id: "7".into(),
            token: "0xabc".into(),
            timestamp: 12,
            receivers_hash: "0xr".into(),
            reason: "amtPerSec is zero".into(),
        };
        assert_eq!(err.token(), Some("0xabc"));
        assert!(err.to_string().contains("for token 0xabc at 12"));
        assert_eq!(EstimateError::InvalidInput("x".into()).token(), None);
    }
}
