use alloy_primitives::{Address, aliases::TxHash};
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    fmt::{Debug, Display},
};

///
/// Transaction
///
/// A single explorer transaction, i.e. one directed edge `from -> to` in the transaction graph.
///
/// `to` is `None` for contract creations. `function_name` is the explorer's decoded
/// function signature hint, e.g. `swapExactETHForTokens(uint256,address[],address,uint256)`.
///
#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub timestamp: u64,
    pub function_name: Option<String>,
}

impl Transaction {
    pub fn new(hash: TxHash, from: Address, to: Option<Address>) -> Self {
        Self {
            hash,
            from,
            to,
            timestamp: 0,
            function_name: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_function_name(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    /// Neighbours of this edge in the order the tracer visits them: `to` first, then `from`.
    pub fn endpoints(&self) -> [Option<Address>; 2] {
        [self.to, Some(self.from)]
    }
}

impl Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transaction {{ hash: {}, from: {:#x}, to: {}, timestamp: {}, function_name: {:?} }}",
            self.hash,
            self.from,
            self.to
                .map(|to| format!("{to:#x}"))
                .unwrap_or_else(|| "<contract creation>".to_string()),
            self.timestamp,
            self.function_name
        )
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to {
            Some(to) => write!(f, "{:#x} -> {:#x} ({})", self.from, to, self.hash),
            None => write!(f, "{:#x} -> <contract creation> ({})", self.from, self.hash),
        }
    }
}

///
/// PathStep
///
/// The address reached and the hash of the transaction used to reach it.
/// The seed step of every path has no incoming hash.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub address: Address,
    pub incoming: Option<TxHash>,
}

impl PathStep {
    pub fn seed(address: Address) -> Self {
        Self {
            address,
            incoming: None,
        }
    }

    pub fn via(address: Address, incoming: TxHash) -> Self {
        Self {
            address,
            incoming: Some(incoming),
        }
    }
}

///
/// LinkPath
///
/// An ordered walk from a start address to a target address.
///
/// `hops` is always `steps.len() - 1`.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPath {
    pub steps: Vec<PathStep>,
    pub hops: usize,
}

impl LinkPath {
    pub fn start(&self) -> Option<Address> {
        self.steps.first().map(|step| step.address)
    }

    pub fn terminal(&self) -> Option<Address> {
        self.steps.last().map(|step| step.address)
    }
}

///
/// FrontierEntry
///
/// A node waiting to be expanded. `path` holds the steps leading up to, but not including,
/// `address`.
///
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub address: Address,
    pub path: Vec<PathStep>,
    pub incoming: Option<TxHash>,
    pub hops: usize,
}

///
/// Frontier
///
/// FIFO queue of nodes to expand, in BFS order.
///
pub type Frontier = VecDeque<FrontierEntry>;

///
/// TraceRequest
///
/// Everything a trace run needs to know about which addresses matter.
///
/// Start and target maps carry a human label for each address. They are ordered maps so that
/// iterating the start set is deterministic.
///
#[derive(Debug, Clone, Default)]
pub struct TraceRequest {
    pub start_addresses: BTreeMap<Address, String>,
    pub target_addresses: BTreeMap<Address, String>,
    pub exclude_addresses: HashSet<Address>,
    pub max_hops: usize,
    pub max_transactions_per_node: usize,
}

impl TraceRequest {
    /// Label for any address the request knows about, start labels first.
    pub fn label_of(&self, address: &Address) -> Option<&str> {
        self.start_addresses
            .get(address)
            .or_else(|| self.target_addresses.get(address))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn addresses_compare_equal_regardless_of_case() {
        let lower = Address::from_str("0x4ad434b8cdc3aa5ac97932d6bd18b5d313ab0f6f").unwrap();
        let mixed = Address::from_str("0x4ad434b8CDC3AA5AC97932D6BD18b5d313aB0f6f").unwrap();
        assert_eq!(lower, mixed);
        assert_eq!(
            format!("{mixed:#x}"),
            "0x4ad434b8cdc3aa5ac97932d6bd18b5d313ab0f6f"
        );

        let mut targets = BTreeMap::new();
        targets.insert(lower, "EVERMOON".to_string());
        let request = TraceRequest {
            target_addresses: targets,
            ..Default::default()
        };
        assert_eq!(request.label_of(&mixed), Some("EVERMOON"));
    }

    #[test]
    fn endpoints_visit_to_before_from() {
        let from = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let tx = Transaction::new(TxHash::repeat_byte(0x10), from, Some(to));
        assert_eq!(tx.endpoints(), [Some(to), Some(from)]);

        let creation = Transaction::new(TxHash::repeat_byte(0x11), from, None);
        assert_eq!(creation.endpoints(), [None, Some(from)]);
        assert!(creation.to_string().contains("<contract creation>"));
    }

    #[test]
    fn label_prefers_start_label() {
        let addr = Address::repeat_byte(0x0a);
        let mut request = TraceRequest::default();
        request.start_addresses.insert(addr, "PAI".to_string());
        request.target_addresses.insert(addr, "SCAM".to_string());
        assert_eq!(request.label_of(&addr), Some("PAI"));
        assert_eq!(request.label_of(&Address::ZERO), None);
    }
}
