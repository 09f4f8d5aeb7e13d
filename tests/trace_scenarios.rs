use alloy_primitives::{Address, aliases::TxHash};
use std::{io::Write, sync::Arc};
use walletlink::{
    data_sources::InMemorySource,
    fetch::{Fetcher, RetryPolicy},
    graph_utils::build_link_graph,
    rate_limiter::RateLimiter,
    traversal::{LinkTracer, TracerOptions},
    types::{PathStep, TraceRequest, Transaction},
};

fn addr(b: u8) -> Address {
    Address::repeat_byte(b)
}

fn tracer(source: InMemorySource) -> LinkTracer<InMemorySource> {
    LinkTracer::new(
        Fetcher::new(
            source,
            Arc::new(RateLimiter::default()),
            RetryPolicy::default(),
        ),
        TracerOptions::default(),
    )
}

fn request(max_hops: usize) -> TraceRequest {
    TraceRequest {
        start_addresses: [(addr(0xa), "A".to_string())].into_iter().collect(),
        target_addresses: [(addr(0xd), "D".to_string())].into_iter().collect(),
        exclude_addresses: Default::default(),
        max_hops,
        max_transactions_per_node: 100,
    }
}

fn chain() -> InMemorySource {
    InMemorySource::new([
        Transaction::new(TxHash::repeat_byte(1), addr(0xa), Some(addr(0xb))),
        Transaction::new(TxHash::repeat_byte(2), addr(0xb), Some(addr(0xc))),
        Transaction::new(TxHash::repeat_byte(3), addr(0xc), Some(addr(0xd))),
    ])
}

#[tokio::test(start_paused = true)]
async fn three_hop_chain_needs_three_hops() {
    let tracer = tracer(chain());

    let short = tracer.trace_all(&request(2)).await;
    assert_eq!(short.len(), 1);
    assert!(!short[0].has_links());
    assert!(short[0].to_string().starts_with("No link found between A"));

    let long = tracer.trace_all(&request(3)).await;
    let link = &long[0].links[0];
    assert_eq!(link.hops, 3);
    assert_eq!(link.target_label, "D");
    let steps: Vec<PathStep> = link.steps.iter().map(|s| s.step).collect();
    assert_eq!(
        steps,
        vec![
            PathStep::seed(addr(0xa)),
            PathStep::via(addr(0xb), TxHash::repeat_byte(1)),
            PathStep::via(addr(0xc), TxHash::repeat_byte(2)),
            PathStep::via(addr(0xd), TxHash::repeat_byte(3)),
        ]
    );

    let graph = build_link_graph(&long);
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn excluded_target_with_direct_edge_is_ignored() {
    let source = InMemorySource::new([Transaction::new(
        TxHash::repeat_byte(1),
        addr(0xa),
        Some(addr(0xd)),
    )]);
    let mut request = request(3);
    request.exclude_addresses.insert(addr(0xd));

    let summaries = tracer(source).trace_all(&request).await;
    assert!(!summaries[0].has_links());
}

#[tokio::test(start_paused = true)]
async fn traces_an_explorer_csv_export() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "hash,from,to,timeStamp,functionName").unwrap();
    for (h, from, to) in [(1u8, 0xaau8, 0xbbu8), (2, 0xbb, 0xdd)] {
        writeln!(
            file,
            "{:#x},{:#x},{:#x},1700000000,",
            TxHash::repeat_byte(h),
            addr(from),
            addr(to)
        )
        .unwrap();
    }
    file.flush().unwrap();

    let source = InMemorySource::from_csv(file.path()).unwrap();
    let request = TraceRequest {
        start_addresses: [(addr(0xaa), "PAI".to_string())].into_iter().collect(),
        target_addresses: [(addr(0xdd), "SCAM".to_string())].into_iter().collect(),
        exclude_addresses: Default::default(),
        max_hops: 2,
        max_transactions_per_node: 100,
    };

    let summaries = tracer(source).trace_all(&request).await;
    let text = summaries[0].to_string();
    assert!(text.contains("linked to SCAM"));
    assert!(text.contains("after 2 hops"));
}
