//! Sampling report and its builder.
//!
//! The builder is pure aggregation: it takes what the region resolver,
//! seed collector and worklist decoder produced and folds it into one
//! immutable [`Report`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::regions::ExecutableRegion;
use super::seeds::SeedSummary;
use super::worklist::{Counters, Traversal};
use crate::container::{Architecture, ContainerFormat};

/// Diagnostic categories attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    RegionTruncated,
    RegionUnreadable,
    SeedSource,
    UnsupportedEncoding,
    InvalidInstruction,
    ZeroLengthInstruction,
    Exception,
    UnresolvedAddress,
    Budget,
    UnsupportedArchitecture,
    Suppressed,
}

/// One diagnostic entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Bounded diagnostic list.
///
/// Once `cap` entries are stored, further issues are only counted; a single
/// trailing `Suppressed` entry reports how many were dropped.
#[derive(Debug, Clone)]
pub struct IssueLog {
    cap: usize,
    issues: Vec<Issue>,
    suppressed: u64,
}

impl IssueLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            issues: Vec::new(),
            suppressed: 0,
        }
    }

    pub fn push(&mut self, kind: IssueKind, message: impl Into<String>) {
        if self.issues.len() < self.cap {
            let message = message.into();
            trace!(?kind, %message, "issue recorded");
            self.issues.push(Issue { kind, message });
        } else {
            self.suppressed += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    /// Consume the log, appending the suppression summary when needed.
    pub fn finish(mut self) -> Vec<Issue> {
        if self.suppressed > 0 {
            self.issues.push(Issue {
                kind: IssueKind::Suppressed,
                message: format!("{} additional diagnostics suppressed", self.suppressed),
            });
        }
        self.issues
    }
}

/// How the traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraversalOutcome {
    #[default]
    Completed,
    Cancelled,
    BudgetExhausted,
}

/// A region as it appears in the report (bytes omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub label: String,
    pub base_address: u64,
    pub length: u64,
}

/// Running counters reported to progress observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub bytes_decoded: u64,
    pub instruction_count: u64,
    pub invalid_instruction_count: u64,
}

/// Result of one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub format: Option<ContainerFormat>,
    pub architecture: Option<Architecture>,
    pub bitness: u32,
    pub bytes_sampled: u64,
    pub bytes_decoded: u64,
    pub instruction_count: u64,
    pub invalid_instruction_count: u64,
    /// Instruction count per feature name.
    pub feature_usage: BTreeMap<String, u64>,
    pub issues: Vec<Issue>,
    pub seed_summary: SeedSummary,
    pub regions: Vec<RegionSummary>,
    pub outcome: TraversalOutcome,
}

impl Report {
    /// Creates a new builder for constructing reports.
    pub fn builder() -> ReportBuilder {
        ReportBuilder::new()
    }

    /// Feature usage ordered by descending count, ties by name.
    pub fn features_by_count(&self) -> Vec<(&str, u64)> {
        let mut out: Vec<(&str, u64)> = self
            .feature_usage
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out
    }

    pub fn is_partial(&self) -> bool {
        self.outcome != TraversalOutcome::Completed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builder for [`Report`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    format: Option<ContainerFormat>,
    architecture: Option<Architecture>,
    bitness: u32,
    regions: Vec<RegionSummary>,
    bytes_sampled: u64,
    counters: Counters,
    feature_usage: BTreeMap<String, u64>,
    seed_summary: SeedSummary,
    issues: Vec<Issue>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = Some(architecture);
        self
    }

    pub fn with_bitness(mut self, bitness: u32) -> Self {
        self.bitness = bitness;
        self
    }

    /// Record the sampled regions; `bytes_sampled` is the sum of their lengths.
    pub fn with_regions(mut self, regions: &[ExecutableRegion]) -> Self {
        self.regions = regions
            .iter()
            .map(|r| RegionSummary {
                label: r.label.clone(),
                base_address: r.base_address,
                length: r.len() as u64,
            })
            .collect();
        self.bytes_sampled = self.regions.iter().map(|r| r.length).sum();
        self
    }

    /// Record the traversal counters. Feature keys are rendered with `Debug`.
    pub fn with_traversal<F: fmt::Debug>(mut self, traversal: Traversal<F>) -> Self {
        let (counters, features) = traversal.into_parts();
        for (feature, count) in features {
            *self
                .feature_usage
                .entry(format!("{:?}", feature))
                .or_insert(0) += count;
        }
        self.counters = counters;
        self
    }

    pub fn with_seed_summary(mut self, summary: SeedSummary) -> Self {
        self.seed_summary = summary;
        self
    }

    pub fn with_issues(mut self, issues: IssueLog) -> Self {
        self.issues = issues.finish();
        self
    }

    pub fn build(self) -> Report {
        let counters = self.counters;
        Report {
            format: self.format,
            architecture: self.architecture,
            bitness: self.bitness,
            bytes_sampled: self.bytes_sampled,
            bytes_decoded: counters.bytes_decoded.min(self.bytes_sampled),
            instruction_count: counters.instruction_count,
            invalid_instruction_count: counters.invalid_instruction_count,
            feature_usage: self.feature_usage,
            issues: self.issues,
            seed_summary: self.seed_summary,
            regions: self.regions,
            outcome: counters.outcome,
        }
    }
}
