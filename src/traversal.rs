use crate::{
    activity::{SwapHints, active_before, deployed_contract, swap_transactions},
    data_sources::TransactionSource,
    error::FetchError,
    fetch::Fetcher,
    summary::LinkSummary,
    types::*,
};
use alloy_primitives::Address;
use futures::{StreamExt, stream};
use std::{collections::HashSet, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Knobs that shape how a trace runs, as opposed to what it looks for.
#[derive(Debug, Clone)]
pub struct TracerOptions {
    /// Fetches of the current BFS layer allowed in flight at once
    pub concurrency: usize,
    /// Wall-clock budget for one start address; the frontier left over is abandoned
    pub deadline: Option<Duration>,
    pub swap_hints: SwapHints,
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            deadline: None,
            swap_hints: SwapHints::default(),
        }
    }
}

/// A node whose transaction list was fetched and examined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedNode {
    pub address: Address,
    pub hops: usize,
    pub transaction_count: usize,
    pub deployed_contract: bool,
    pub swap_count: usize,
    /// Active before the transaction the trace reached it through; always false for the start
    pub prior_activity: bool,
}

/// A node whose fetch failed for good; nothing behind it was explored.
#[derive(Debug, Clone)]
pub struct DeadEnd {
    pub address: Address,
    pub hops: usize,
    pub error: FetchError,
}

/// Everything one trace run produced.
#[derive(Debug, Clone, Default)]
pub struct TraceOutcome {
    pub paths: Vec<LinkPath>,
    pub expanded: Vec<ExpandedNode>,
    pub dead_ends: Vec<DeadEnd>,
    pub timed_out: bool,
}

impl TraceOutcome {
    /// Paths sorted by hop count, then by terminal address.
    pub fn sorted_paths(&self) -> Vec<LinkPath> {
        let mut paths = self.paths.clone();
        paths.sort_by(|a, b| {
            a.hops
                .cmp(&b.hops)
                .then_with(|| a.terminal().cmp(&b.terminal()))
        });
        paths
    }
}

///
/// LinkTracer
///
/// Breadth-first search over the transaction graph from a start address towards a set of targets.
///
/// Transactions are treated as undirected edges: both the sender and the recipient of every
/// transaction of a node are its neighbours.
///
pub struct LinkTracer<S> {
    fetcher: Fetcher<S>,
    options: TracerOptions,
}

impl<S: TransactionSource> LinkTracer<S> {
    pub fn new(fetcher: Fetcher<S>, options: TracerOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    /// Trace every start address of the request, in address order.
    pub async fn trace_all(&self, request: &TraceRequest) -> Vec<LinkSummary> {
        let mut summaries = Vec::with_capacity(request.start_addresses.len());
        for (start, label) in &request.start_addresses {
            info!("Tracing {} ({:#x})", label, start);
            let outcome = self.find_hops(*start, request).await;
            info!(
                "{} ({:#x}): {} paths, {} nodes expanded, {} dead ends",
                label,
                start,
                outcome.paths.len(),
                outcome.expanded.len(),
                outcome.dead_ends.len()
            );
            summaries.push(LinkSummary::new(*start, outcome, request));
        }
        summaries
    }

    /// Find every path from `start` to a target address within the request's bounds.
    pub async fn find_hops(&self, start: Address, request: &TraceRequest) -> TraceOutcome {
        let deadline = self.options.deadline.map(|budget| Instant::now() + budget);
        let mut outcome = TraceOutcome::default();

        // visited holds every address that has been enqueued or recorded as a path end
        let mut visited: HashSet<Address> = HashSet::from([start]);
        let mut frontier = Frontier::new();
        if request.max_hops > 0 {
            frontier.push_back(FrontierEntry {
                address: start,
                path: Vec::new(),
                incoming: None,
                hops: 0,
            });
        }

        let fetcher = &self.fetcher;
        'layers: while !frontier.is_empty() {
            // Entries of one layer are fetched ahead, but handled strictly in FIFO order
            let layer: Vec<FrontierEntry> = frontier.drain(..).collect();
            debug!("Expanding {} nodes", layer.len());
            let mut fetched = stream::iter(layer)
                .map(|entry| async move {
                    let result = fetcher.fetch_transactions(&entry.address).await;
                    (entry, result)
                })
                .buffered(self.options.concurrency.max(1));

            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, fetched.next()).await
                    {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(
                                "Deadline reached tracing {:#x}, abandoning remaining frontier",
                                start
                            );
                            outcome.timed_out = true;
                            break 'layers;
                        }
                    },
                    None => fetched.next().await,
                };
                let Some((entry, result)) = next else {
                    break;
                };

                let FrontierEntry {
                    address,
                    mut path,
                    incoming,
                    hops,
                } = entry;
                path.push(PathStep { address, incoming });

                let transactions = match result {
                    Ok(transactions) => transactions,
                    Err(error) => {
                        warn!("Skipping {:#x}: {}", address, error);
                        outcome.dead_ends.push(DeadEnd {
                            address,
                            hops,
                            error,
                        });
                        continue;
                    }
                };

                outcome.expanded.push(ExpandedNode {
                    address,
                    hops,
                    transaction_count: transactions.len(),
                    deployed_contract: deployed_contract(&transactions),
                    swap_count: swap_transactions(&transactions, &self.options.swap_hints).len(),
                    prior_activity: incoming
                        .and_then(|hash| transactions.iter().find(|tx| tx.hash == hash))
                        .is_some_and(|tx| {
                            active_before(&transactions, tx.timestamp, Some(tx.hash))
                        }),
                });

                // busy addresses (exchanges, routers) still report direct target hits
                let fans_out = transactions.len() <= request.max_transactions_per_node;
                if !fans_out {
                    debug!(
                        "{:#x} has {} transactions, not fanning out",
                        address,
                        transactions.len()
                    );
                }

                for tx in &transactions {
                    for candidate in tx.endpoints().into_iter().flatten() {
                        if request.exclude_addresses.contains(&candidate)
                            || !visited.insert(candidate)
                        {
                            continue;
                        }

                        if request.target_addresses.contains_key(&candidate) {
                            let mut steps = path.clone();
                            steps.push(PathStep::via(candidate, tx.hash));
                            info!(
                                "Found link {:#x} -> {:#x} after {} hops",
                                start,
                                candidate,
                                hops + 1
                            );
                            outcome.paths.push(LinkPath {
                                steps,
                                hops: hops + 1,
                            });
                        } else if hops + 1 < request.max_hops && fans_out {
                            frontier.push_back(FrontierEntry {
                                address: candidate,
                                path: path.clone(),
                                incoming: Some(tx.hash),
                                hops: hops + 1,
                            });
                        }
                    }
                }
            }
        }

        outcome
    }
}
