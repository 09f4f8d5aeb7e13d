// Basic types used throughout walletlink
pub mod types;
pub mod error;

// Token bucket shared by every explorer call
pub mod rate_limiter;
// TransactionSource trait with in-memory and CSV connectors
pub mod data_sources;
// The Etherscan connector gets its own module, it is the one used in production
pub mod etherscan;
// Retry and rate limiting around a TransactionSource
pub mod fetch;

// Bounded BFS from start addresses to target addresses
pub mod traversal;
// Heuristics over transaction lists, used to annotate expanded nodes
pub mod activity;

// Printable per-start summaries of a trace
pub mod summary;
// Graph of discovered links and its DOT export
pub mod graph_utils;

// Settings file and environment loading
pub mod config;
