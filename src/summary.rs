use crate::{
    traversal::{DeadEnd, TraceOutcome},
    types::{LinkPath, PathStep, TraceRequest},
};
use alloy_primitives::Address;
use std::fmt::{Debug, Display};

/// A path step with the label the request gives its address, if any.
#[derive(Debug, Clone)]
pub struct LabeledStep {
    pub step: PathStep,
    pub label: Option<String>,
}

impl Display for LabeledStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(f, "Address: {} ({:#x})", label, self.step.address)?,
            None => write!(f, "Address: {:#x}", self.step.address)?,
        }
        match self.step.incoming {
            Some(hash) => write!(f, " - Transaction Hash: {}", hash),
            None => write!(f, " - Transaction Hash: None"),
        }
    }
}

/// One discovered link, ready for printing.
#[derive(Debug, Clone)]
pub struct Link {
    pub target: Address,
    pub target_label: String,
    pub hops: usize,
    pub steps: Vec<LabeledStep>,
}

///
/// LinkSummary
///
/// What a trace found for one start address, with labels resolved.
///
/// Links are sorted by hop count, then by target address.
///
pub struct LinkSummary {
    pub start: Address,
    pub start_label: String,
    pub max_hops: usize,
    pub links: Vec<Link>,
    pub dead_ends: Vec<DeadEnd>,
    pub expanded: usize,
    pub timed_out: bool,
}

impl LinkSummary {
    pub fn new(start: Address, outcome: TraceOutcome, request: &TraceRequest) -> Self {
        let label = |address: &Address| request.label_of(address).map(str::to_string);

        let links = outcome
            .sorted_paths()
            .into_iter()
            .filter_map(|LinkPath { steps, hops }| {
                let target = steps.last()?.address;
                Some(Link {
                    target,
                    target_label: label(&target).unwrap_or_default(),
                    hops,
                    steps: steps
                        .into_iter()
                        .map(|step| LabeledStep {
                            label: label(&step.address),
                            step,
                        })
                        .collect(),
                })
            })
            .collect();

        Self {
            start,
            start_label: label(&start).unwrap_or_default(),
            max_hops: request.max_hops,
            links,
            dead_ends: outcome.dead_ends,
            expanded: outcome.expanded.len(),
            timed_out: outcome.timed_out,
        }
    }

    pub fn has_links(&self) -> bool {
        !self.links.is_empty()
    }
}

impl Display for LinkSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.links.is_empty() {
            writeln!(
                f,
                "No link found between {} ({:#x}) and the target addresses within {} hops.",
                self.start_label, self.start, self.max_hops
            )?;
        }

        for link in &self.links {
            writeln!(f)?;
            writeln!(
                f,
                "{} ({:#x}) linked to {} ({:#x}) after {} hops",
                self.start_label, self.start, link.target_label, link.target, link.hops
            )?;
            writeln!(f)?;
            writeln!(f, "The path is:")?;
            for step in &link.steps {
                writeln!(f, "{}", step)?;
            }
        }

        for dead_end in &self.dead_ends {
            writeln!(f, "Warning: could not expand {:#x}: {}", dead_end.address, dead_end.error)?;
        }
        if self.timed_out {
            writeln!(
                f,
                "Warning: trace from {} ({:#x}) hit its deadline after expanding {} addresses; results are partial.",
                self.start_label, self.start, self.expanded
            )?;
        }
        Ok(())
    }
}

impl Debug for LinkSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LinkSummary {{ start: {:#x}, links: {}, dead_ends: {}, expanded: {}, timed_out: {} }}",
            self.start,
            self.links.len(),
            self.dead_ends.len(),
            self.expanded,
            self.timed_out
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, SourceError};
    use alloy_primitives::aliases::TxHash;

    fn request() -> TraceRequest {
        let mut request = TraceRequest {
            max_hops: 2,
            ..Default::default()
        };
        request
            .start_addresses
            .insert(Address::repeat_byte(0xa), "PAI".to_string());
        request
            .target_addresses
            .insert(Address::repeat_byte(0xd), "SCAM".to_string());
        request
            .target_addresses
            .insert(Address::repeat_byte(0xe), "EYE".to_string());
        request
    }

    #[test]
    fn no_links_prints_notice() {
        let summary = LinkSummary::new(
            Address::repeat_byte(0xa),
            TraceOutcome::default(),
            &request(),
        );
        assert!(!summary.has_links());
        assert_eq!(
            summary.to_string(),
            format!(
                "No link found between PAI ({:#x}) and the target addresses within 2 hops.\n",
                Address::repeat_byte(0xa)
            )
        );
    }

    #[test]
    fn links_are_labelled_and_sorted() {
        let a = Address::repeat_byte(0xa);
        let b = Address::repeat_byte(0xb);
        let d = Address::repeat_byte(0xd);
        let e = Address::repeat_byte(0xe);
        let outcome = TraceOutcome {
            paths: vec![
                LinkPath {
                    steps: vec![
                        PathStep::seed(a),
                        PathStep::via(b, TxHash::repeat_byte(1)),
                        PathStep::via(e, TxHash::repeat_byte(2)),
                    ],
                    hops: 2,
                },
                LinkPath {
                    steps: vec![PathStep::seed(a), PathStep::via(d, TxHash::repeat_byte(3))],
                    hops: 1,
                },
            ],
            dead_ends: vec![DeadEnd {
                address: b,
                hops: 1,
                error: FetchError::Exhausted {
                    address: b,
                    attempts: 3,
                    source: SourceError::Status(500),
                },
            }],
            ..Default::default()
        };

        let summary = LinkSummary::new(a, outcome, &request());
        assert_eq!(summary.links[0].target_label, "SCAM");
        assert_eq!(summary.links[1].target_label, "EYE");
        assert_eq!(summary.links[1].steps[1].label, None);

        let text = summary.to_string();
        assert!(text.contains(&format!("PAI ({a:#x}) linked to SCAM ({d:#x}) after 1 hops")));
        assert!(text.contains(&format!("Address: PAI ({a:#x}) - Transaction Hash: None")));
        assert!(text.contains(&format!(
            "Address: {b:#x} - Transaction Hash: {}",
            TxHash::repeat_byte(1)
        )));
        assert!(text.contains("Warning: could not expand"));
        assert!(!text.contains("No link found"));
    }
}
