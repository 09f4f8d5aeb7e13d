//! Rate-limited, retrying access to a [`TransactionSource`].

use crate::{
    data_sources::TransactionSource,
    error::{FetchError, SourceError},
    rate_limiter::RateLimiter,
    types::Transaction,
};
use alloy_primitives::Address;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// How hard the fetcher tries before giving up on an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed for transport and HTTP failures, including the first one
    pub max_attempts: u32,
    /// Fixed pause between failed attempts
    pub retry_delay: Duration,
    /// Throttled responses tolerated before giving up; these do not use up `max_attempts`
    pub max_throttle_retries: u32,
    pub throttle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            max_throttle_retries: 5,
            throttle_delay: Duration::from_secs(1),
        }
    }
}

/// The only path from the tracer to a transaction source.
///
/// Every attempt first takes a token from the shared [`RateLimiter`]. Results are never cached.
pub struct Fetcher<S> {
    source: S,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl<S: TransactionSource> Fetcher<S> {
    pub fn new(source: S, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            source,
            limiter,
            policy,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn fetch_transactions(
        &self,
        address: &Address,
    ) -> Result<Vec<Transaction>, FetchError> {
        let mut failures = 0u32;
        let mut throttled = 0u32;

        loop {
            self.limiter.acquire(1.0).await;

            match self.source.list_transactions(address).await {
                Ok(transactions) => {
                    debug!(
                        "Fetched {} transactions for {:#x}",
                        transactions.len(),
                        address
                    );
                    return Ok(transactions);
                }
                Err(SourceError::Throttled) => {
                    throttled += 1;
                    if throttled > self.policy.max_throttle_retries {
                        return Err(FetchError::Throttled {
                            address: *address,
                            attempts: throttled,
                        });
                    }
                    warn!(
                        "Throttled fetching {:#x} ({}/{}), backing off {:?}",
                        address,
                        throttled,
                        self.policy.max_throttle_retries,
                        self.policy.throttle_delay
                    );
                    tokio::time::sleep(self.policy.throttle_delay).await;
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        return Err(FetchError::Exhausted {
                            address: *address,
                            attempts: failures,
                            source: err,
                        });
                    }
                    warn!(
                        "Fetch for {:#x} failed ({}/{}): {}, retrying in {:?}",
                        address,
                        failures,
                        self.policy.max_attempts,
                        err,
                        self.policy.retry_delay
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(err) => {
                    return Err(FetchError::Rejected {
                        address: *address,
                        source: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::aliases::TxHash;
    use std::{collections::VecDeque, sync::Mutex};
    use tokio::time::Instant;

    /// Replays scripted responses, then keeps repeating the last one.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<Transaction>, SourceError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<Transaction>, SourceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl TransactionSource for ScriptedSource {
        async fn list_transactions(
            &self,
            _address: &Address,
        ) -> Result<Vec<Transaction>, SourceError> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn fetcher(script: Vec<Result<Vec<Transaction>, SourceError>>) -> Fetcher<ScriptedSource> {
        Fetcher::new(
            ScriptedSource::new(script),
            Arc::new(RateLimiter::default()),
            RetryPolicy::default(),
        )
    }

    fn tx() -> Transaction {
        Transaction::new(
            TxHash::repeat_byte(1),
            Address::repeat_byte(0xa),
            Some(Address::repeat_byte(0xb)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_three_times_then_fatal() {
        let fetcher = fetcher(vec![Err(SourceError::Status(500))]);
        let start = Instant::now();

        let err = fetcher
            .fetch_transactions(&Address::repeat_byte(0xa))
            .await
            .unwrap_err();

        assert_eq!(fetcher.source().calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(
            err,
            FetchError::Exhausted {
                address: Address::repeat_byte(0xa),
                attempts: 3,
                source: SourceError::Status(500),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let fetcher = fetcher(vec![
            Err(SourceError::Transport("connection reset".into())),
            Ok(vec![tx()]),
        ]);
        let txs = fetcher
            .fetch_transactions(&Address::repeat_byte(0xa))
            .await
            .unwrap();
        assert_eq!(txs, vec![tx()]);
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_does_not_use_the_failure_budget() {
        let fetcher = fetcher(vec![
            Err(SourceError::Status(502)),
            Err(SourceError::Throttled),
            Err(SourceError::Throttled),
            Err(SourceError::Throttled),
            Err(SourceError::Status(502)),
            Ok(vec![tx()]),
        ]);
        let txs = fetcher
            .fetch_transactions(&Address::repeat_byte(0xa))
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(fetcher.source().calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_is_capped() {
        let fetcher = fetcher(vec![Err(SourceError::Throttled)]);
        let err = fetcher
            .fetch_transactions(&Address::repeat_byte(0xa))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Throttled { attempts: 6, .. }));
        assert_eq!(fetcher.source().calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let fetcher = fetcher(vec![Err(SourceError::Rejected("Invalid API Key".into()))]);
        let err = fetcher
            .fetch_transactions(&Address::repeat_byte(0xa))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Rejected { .. }));
        assert_eq!(fetcher.source().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_takes_a_token() {
        let fetcher = fetcher(vec![Ok(vec![])]);
        for _ in 0..3 {
            fetcher
                .fetch_transactions(&Address::repeat_byte(0xa))
                .await
                .unwrap();
        }
        assert_eq!(fetcher.source().calls(), 3);
        assert!(fetcher.limiter().available() < 2.5);
    }
}
