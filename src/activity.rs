//! Heuristics over an address's transaction list.
//!
//! The tracer uses these to annotate the nodes it expands.

use crate::types::Transaction;
use alloy_primitives::{Address, address, aliases::TxHash};

/// Uniswap Universal Router
pub const UNIVERSAL_ROUTER: Address = address!("0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD");

/// What counts as a swap when scanning a transaction list.
#[derive(Debug, Clone)]
pub struct SwapHints {
    /// Function names, matched as substrings of the explorer's `functionName`.
    ///
    /// `swap` alone already covers `swapExactETHForTokens`; the default list still names both so
    /// it reads the same as the monitoring scripts' list.
    pub functions: Vec<String>,
    /// Calling any of these contracts counts as a swap regardless of function name
    pub routers: Vec<Address>,
}

impl Default for SwapHints {
    fn default() -> Self {
        Self {
            functions: ["swapExactETHForTokens", "unoswap", "execute", "swap"]
                .into_iter()
                .map(String::from)
                .collect(),
            routers: vec![UNIVERSAL_ROUTER],
        }
    }
}

/// Whether any transaction created a contract.
pub fn deployed_contract(transactions: &[Transaction]) -> bool {
    transactions.iter().any(|tx| tx.to.is_none())
}

pub fn swap_transactions<'a>(
    transactions: &'a [Transaction],
    hints: &SwapHints,
) -> Vec<&'a Transaction> {
    transactions
        .iter()
        .filter(|tx| {
            let by_name = tx.function_name.as_deref().is_some_and(|name| {
                hints.functions.iter().any(|f| name.contains(f.as_str()))
            });
            let by_router = tx.to.is_some_and(|to| hints.routers.contains(&to));
            by_name || by_router
        })
        .collect()
}

/// Whether the address had any transaction strictly before `timestamp`, ignoring `except`.
///
/// Transactions without a timestamp are ignored.
pub fn active_before(
    transactions: &[Transaction],
    timestamp: u64,
    except: Option<TxHash>,
) -> bool {
    transactions
        .iter()
        .any(|tx| Some(tx.hash) != except && tx.timestamp != 0 && tx.timestamp < timestamp)
}
