use crate::{summary::LinkSummary, types::TraceRequest};
use alloy_primitives::{Address, aliases::TxHash};
use anyhow::{Context, Result};
use petgraph::{Directed, Graph, graph::NodeIndex, visit::EdgeRef};
use std::{collections::HashMap, fmt::Write, fs, path::Path};

///
/// LinkGraph
///
/// Union of discovered paths. Nodes are addresses, edges carry the transaction hash used to step
/// from one address to the next.
///
/// Edges point along the path (start towards target), which is not necessarily the direction
/// funds moved in.
///
pub type LinkGraph = Graph<Address, TxHash, Directed>;

/// Merge the paths of every summary into one graph, sharing nodes and edges between paths.
pub fn build_link_graph(summaries: &[LinkSummary]) -> LinkGraph {
    let mut graph = LinkGraph::new();
    let mut addr_idx_map: HashMap<Address, NodeIndex> = HashMap::new();

    for link in summaries.iter().flat_map(|summary| &summary.links) {
        for pair in link.steps.windows(2) {
            let (prev, next) = (&pair[0].step, &pair[1].step);
            let Some(tx_hash) = next.incoming else {
                continue;
            };

            let from_idx = *addr_idx_map
                .entry(prev.address)
                .or_insert_with(|| graph.add_node(prev.address));
            let to_idx = *addr_idx_map
                .entry(next.address)
                .or_insert_with(|| graph.add_node(next.address));

            // the same hop can appear in several paths
            let known = graph
                .edges_connecting(from_idx, to_idx)
                .any(|edge| *edge.weight() == tx_hash);
            if !known {
                graph.add_edge(from_idx, to_idx, tx_hash);
            }
        }
    }

    graph
}

/// Write a LinkGraph into a DOT string for visualization
///
/// Start and target addresses get their labels and a distinct shape.
pub fn write_graph_to_dot(graph: &LinkGraph, request: &TraceRequest) -> Result<String> {
    let mut dot = String::new();
    writeln!(dot, "digraph LinkGraph {{")?;
    writeln!(dot, "  node [shape=ellipse];")?;
    writeln!(dot, "  edge [dir=forward];")?;
    writeln!(dot)?;

    for node_idx in graph.node_indices() {
        let address = graph[node_idx];
        let shape = if request.start_addresses.contains_key(&address) {
            " shape=box"
        } else if request.target_addresses.contains_key(&address) {
            " shape=doubleoctagon"
        } else {
            ""
        };
        match request.label_of(&address) {
            Some(label) => writeln!(
                dot,
                "  \"{:#x}\" [label=\"{}\\n{:.12}...\"{}];",
                address,
                label.replace('"', "\\\""),
                format!("{address:#x}"),
                shape
            )?,
            None => writeln!(
                dot,
                "  \"{:#x}\" [label=\"{:.12}...\"{}];",
                address,
                format!("{address:#x}"),
                shape
            )?,
        }
    }

    writeln!(dot)?;

    for edge_idx in graph.edge_indices() {
        let (from_idx, to_idx) = graph
            .edge_endpoints(edge_idx)
            .context("edge index without endpoints")?;
        let tx_hash = graph[edge_idx];
        writeln!(
            dot,
            "  \"{:#x}\" -> \"{:#x}\" [label=\"{:.12}...\" tooltip=\"Tx: {}\"];",
            graph[from_idx],
            graph[to_idx],
            tx_hash.to_string(),
            tx_hash
        )?;
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

/// Write the DOT rendering of `graph` to `path`.
pub fn save_graph_as_dot(graph: &LinkGraph, request: &TraceRequest, path: &Path) -> Result<()> {
    let dot = write_graph_to_dot(graph, request)?;
    fs::write(path, dot).with_context(|| format!("Failed to write DOT to {}", path.display()))?;
    Ok(())
}
