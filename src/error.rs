//! Error types for fetching transaction lists

use alloy_primitives::Address;
use thiserror::Error;

/// Failure of a single call to a transaction source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("upstream rate limit reached")]
    Throttled,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed transaction data: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Network failures and non-2xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transport(_) | SourceError::Status(_))
    }
}

/// Final outcome of a fetch for one address once retries are used up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch for {address:#x} failed after {attempts} attempts: {source}")]
    Exhausted {
        address: Address,
        attempts: u32,
        source: SourceError,
    },

    #[error("fetch for {address:#x} still throttled after {attempts} attempts")]
    Throttled { address: Address, attempts: u32 },

    #[error("fetch for {address:#x} rejected: {source}")]
    Rejected {
        address: Address,
        source: SourceError,
    },
}

impl FetchError {
    pub fn address(&self) -> Address {
        match self {
            FetchError::Exhausted { address, .. }
            | FetchError::Throttled { address, .. }
            | FetchError::Rejected { address, .. } => *address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(SourceError::Transport("reset".into()).is_retryable());
        assert!(SourceError::Status(500).is_retryable());
        assert!(!SourceError::Throttled.is_retryable());
        assert!(!SourceError::Rejected("Invalid API Key".into()).is_retryable());
        assert!(!SourceError::Malformed("bad hash".into()).is_retryable());
    }

    #[test]
    fn fetch_error_reports_address() {
        let address = Address::repeat_byte(0x42);
        let err = FetchError::Exhausted {
            address,
            attempts: 3,
            source: SourceError::Status(502),
        };
        assert_eq!(err.address(), address);
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("0x4242"));
    }
}
