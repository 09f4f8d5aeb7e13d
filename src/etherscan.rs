//! Etherscan `account/txlist` connector

use crate::{data_sources::TransactionSource, error::SourceError, types::Transaction};
use alloy_primitives::{Address, aliases::TxHash};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.etherscan.io/api";

/// Explorer sort order for transaction lists; it fixes the order the tracer walks edges in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Response envelope shared by every Etherscan endpoint.
///
/// `result` is an array on success and a plain string on errors, including throttling.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    time_stamp: Option<String>,
    #[serde(default)]
    function_name: Option<String>,
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = SourceError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let malformed = |field: &str, value: &str| {
            SourceError::Malformed(format!("invalid {field} {value:?} in {}", raw.hash))
        };

        let hash = TxHash::from_str(&raw.hash).map_err(|_| malformed("hash", &raw.hash))?;
        let from = Address::from_str(&raw.from).map_err(|_| malformed("from", &raw.from))?;
        let to = match raw.to.trim() {
            "" => None,
            to => Some(Address::from_str(to).map_err(|_| malformed("to", to))?),
        };

        let mut tx = Transaction::new(hash, from, to);
        if let Some(ts) = raw.time_stamp.as_deref().and_then(|ts| ts.parse().ok()) {
            tx = tx.with_timestamp(ts);
        }
        if let Some(name) = raw.function_name.filter(|name| !name.is_empty()) {
            tx = tx.with_function_name(name);
        }
        Ok(tx)
    }
}

/// Turn a txlist response body into transactions, classifying explorer-level errors.
pub fn parse_txlist(body: &str) -> Result<Vec<Transaction>, SourceError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| SourceError::Transport(format!("undecodable response: {e}")))?;

    match envelope.result {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<RawTransaction>(item)
                    .map_err(|e| SourceError::Malformed(e.to_string()))
                    .and_then(Transaction::try_from)
            })
            .collect(),
        Some(serde_json::Value::String(reason)) => {
            if reason.to_ascii_lowercase().contains("rate limit") {
                Err(SourceError::Throttled)
            } else {
                Err(SourceError::Rejected(reason))
            }
        }
        Some(other) => Err(SourceError::Rejected(format!(
            "{}: unexpected result {}",
            envelope.message.unwrap_or_default(),
            other
        ))),
    }
}

/// EtherscanSource
///
/// Lists normal transactions of an address over the whole chain history.
///
pub struct EtherscanSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sort: SortOrder,
}

impl EtherscanSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        sort: SortOrder,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            sort,
        })
    }
}

impl TransactionSource for EtherscanSource {
    async fn list_transactions(
        &self,
        address: &Address,
    ) -> Result<Vec<Transaction>, SourceError> {
        let address = format!("{address:#x}");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address.as_str()),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", self.sort.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Throttled);
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        debug!("txlist for {} returned {} bytes", address, body.len());

        parse_txlist(&body)
    }
}
