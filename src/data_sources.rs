use crate::{error::SourceError, types::*};
use alloy_primitives::{Address, aliases::TxHash};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::{collections::HashMap, path::Path, str::FromStr, sync::Arc};
use tracing::info;

/// TransactionSource
///
/// A generic trait across the places transaction lists can come from.
///
/// Implementations return every transaction in which `address` is either sender or recipient,
/// in the source's own order. They never retry; see `fetch::Fetcher` for that.
///
#[allow(async_fn_in_trait)]
pub trait TransactionSource {
    async fn list_transactions(&self, address: &Address)
    -> Result<Vec<Transaction>, SourceError>;
}

/// InMemorySource
///
/// Transactions held in memory and indexed by both endpoints.
///
/// Per-address lists keep the order in which transactions were supplied, which makes traces over
/// an InMemorySource fully deterministic.
///
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    by_address: HashMap<Address, Vec<Transaction>>,
}

impl InMemorySource {
    pub fn new(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        let mut source = Self::default();
        for tx in transactions {
            source.insert(tx);
        }
        source
    }

    pub fn insert(&mut self, tx: Transaction) {
        if let Some(to) = tx.to {
            if to != tx.from {
                self.by_address.entry(to).or_default().push(tx.clone());
            }
        }
        self.by_address.entry(tx.from).or_default().push(tx);
    }

    /// Number of distinct addresses with at least one transaction.
    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }

    /// Load an explorer CSV export.
    ///
    /// The file needs `hash`, `from` and `to` columns; `timeStamp` and `functionName` are picked
    /// up when present. An empty `to` marks a contract creation.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Force strings; hashes and addresses must not be inferred as numbers
        let schema_changes = Schema::from_iter(vec![
            Field::new("hash".into(), DataType::String),
            Field::new("from".into(), DataType::String),
            Field::new("to".into(), DataType::String),
        ]);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_schema_overwrite(Some(Arc::new(schema_changes)))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("Failed to open {}", path.display()))?
            .finish()
            .with_context(|| format!("Failed to read CSV {}", path.display()))?;

        let source = Self::from_dataframe(df)?;
        info!(
            "Loaded {} addresses from {}",
            source.address_count(),
            path.display()
        );
        Ok(source)
    }

    /// Build a source from a DataFrame with the columns described in `from_csv`.
    pub fn from_dataframe(df: DataFrame) -> Result<Self> {
        // rows without a hash are summary or padding lines
        let df = df.lazy().filter(col("hash").is_not_null()).collect()?;

        let col_hash = df.column("hash")?.str()?;
        let col_from = df.column("from")?.str()?;
        let col_to = df.column("to")?.str()?;
        let col_timestamp = match df.column("timeStamp") {
            Ok(column) => Some(column.cast(&DataType::UInt64)?),
            Err(_) => None,
        };
        let col_timestamp = col_timestamp.as_ref().map(|c| c.u64()).transpose()?;
        let col_function = match df.column("functionName") {
            Ok(column) => Some(column.cast(&DataType::String)?),
            Err(_) => None,
        };
        let col_function = col_function.as_ref().map(|c| c.str()).transpose()?;

        let mut source = Self::default();
        for row in 0..df.height() {
            let hash = col_hash
                .get(row)
                .with_context(|| format!("Failed to get hash for {}", row))?;
            let from = col_from
                .get(row)
                .with_context(|| format!("Failed to get from for {}", row))?;

            let mut tx = Transaction::new(
                TxHash::from_str(hash).with_context(|| format!("Invalid hash in row {}", row))?,
                Address::from_str(from).with_context(|| format!("Invalid from in row {}", row))?,
                match col_to.get(row).map(str::trim).filter(|to| !to.is_empty()) {
                    Some(to) => Some(
                        Address::from_str(to)
                            .with_context(|| format!("Invalid to in row {}", row))?,
                    ),
                    None => None,
                },
            );
            if let Some(timestamp) = col_timestamp.and_then(|c| c.get(row)) {
                tx = tx.with_timestamp(timestamp);
            }
            if let Some(name) = col_function
                .and_then(|c| c.get(row))
                .filter(|n| !n.is_empty())
            {
                tx = tx.with_function_name(name);
            }
            source.insert(tx);
        }

        Ok(source)
    }
}

impl TransactionSource for InMemorySource {
    async fn list_transactions(
        &self,
        address: &Address,
    ) -> Result<Vec<Transaction>, SourceError> {
        Ok(self.by_address.get(address).cloned().unwrap_or_default())
    }
}
