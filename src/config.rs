//! Configuration loading and validation

use crate::{
    etherscan::{DEFAULT_BASE_URL, SortOrder},
    fetch::RetryPolicy,
    rate_limiter::{DEFAULT_CAPACITY, DEFAULT_FILL_RATE, MIN_FILL_RATE},
    types::TraceRequest,
};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    str::FromStr,
    time::Duration,
};

/// Everything the binary reads from `credentials.yml` and the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default, alias = "Etherscan")]
    pub etherscan: EtherscanSettings,
    #[serde(default)]
    pub trace: TraceSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default, alias = "START_ADDRESSES")]
    pub start_addresses: BTreeMap<String, String>,
    #[serde(default, alias = "TARGET_ADDRESSES")]
    pub target_addresses: BTreeMap<String, String>,
    #[serde(default, alias = "EXCLUDE_ADDRESSES")]
    pub exclude_addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanSettings {
    #[serde(default, alias = "API_KEY")]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EtherscanSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            sort: SortOrder::default(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceSettings {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_max_transactions_per_node")]
    pub max_transactions_per_node: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per start address; unset means no deadline
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            max_transactions_per_node: default_max_transactions_per_node(),
            concurrency: default_concurrency(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Tokens per second
    #[serde(default = "default_fill_rate")]
    pub fill_rate: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            fill_rate: default_fill_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_max_throttle_retries")]
    pub max_throttle_retries: u32,
    #[serde(default = "default_throttle_delay_secs")]
    pub throttle_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            max_throttle_retries: default_max_throttle_retries(),
            throttle_delay_secs: default_throttle_delay_secs(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            max_throttle_retries: self.max_throttle_retries,
            throttle_delay: Duration::from_secs(self.throttle_delay_secs),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_max_hops() -> usize {
    2
}

fn default_max_transactions_per_node() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

fn default_capacity() -> f64 {
    DEFAULT_CAPACITY
}

fn default_fill_rate() -> f64 {
    DEFAULT_FILL_RATE
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_max_throttle_retries() -> u32 {
    5
}

fn default_throttle_delay_secs() -> u64 {
    1
}

impl Settings {
    /// Load settings from a YAML file, then environment variables prefixed `WALLETLINK__`.
    ///
    /// e.g. `WALLETLINK__ETHERSCAN__API_KEY` overrides `etherscan.api_key`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("WALLETLINK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let settings: Settings = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.start_addresses.is_empty() {
            anyhow::bail!("START_ADDRESSES must name at least one address");
        }
        if self.target_addresses.is_empty() {
            anyhow::bail!("TARGET_ADDRESSES must name at least one address");
        }
        if !(self.rate_limit.capacity >= 1.0) {
            anyhow::bail!("rate_limit.capacity must be at least 1");
        }
        let fill_rate = self.rate_limit.fill_rate;
        if !(fill_rate.is_finite() && fill_rate >= MIN_FILL_RATE) {
            anyhow::bail!(
                "rate_limit.fill_rate must be a finite rate of at least {MIN_FILL_RATE}"
            );
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.trace.concurrency == 0 {
            anyhow::bail!("trace.concurrency must be at least 1");
        }

        // surface bad addresses before any tracing starts
        self.trace_request()?;
        Ok(())
    }

    /// The start, target and exclude sets, parsed, together with the trace bounds.
    pub fn trace_request(&self) -> Result<TraceRequest> {
        Ok(TraceRequest {
            start_addresses: parse_labelled(&self.start_addresses, "START_ADDRESSES")?,
            target_addresses: parse_labelled(&self.target_addresses, "TARGET_ADDRESSES")?,
            exclude_addresses: self
                .exclude_addresses
                .iter()
                .map(|raw| parse_address(raw, "EXCLUDE_ADDRESSES"))
                .collect::<Result<HashSet<_>>>()?,
            max_hops: self.trace.max_hops,
            max_transactions_per_node: self.trace.max_transactions_per_node,
        })
    }

    pub fn has_api_key(&self) -> bool {
        let key = self.etherscan.api_key.trim();
        !key.is_empty() && key != "YOUR_API_KEY"
    }
}

fn parse_address(raw: &str, section: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("Invalid address {raw:?} in {section}"))
}

fn parse_labelled(
    raw: &BTreeMap<String, String>,
    section: &str,
) -> Result<BTreeMap<Address, String>> {
    let mut parsed = BTreeMap::new();
    for (address, label) in raw {
        if parsed
            .insert(parse_address(address, section)?, label.clone())
            .is_some()
        {
            anyhow::bail!("Address {address} appears twice in {section}");
        }
    }
    Ok(parsed)
}
