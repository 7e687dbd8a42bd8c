//! Control-flow guided instruction-set sampling.
//!
//! The pipeline for one input is:
//!
//! 1. [`regions::resolve`] reads the executable windows of the container.
//! 2. [`seeds::collect`] gathers candidate code addresses.
//! 3. [`worklist::traverse`] decodes everything reachable from those seeds.
//! 4. [`report::ReportBuilder`] folds the results into a [`Report`].
//!
//! [`analyze_path`] and [`analyze_bytes`] run the whole pipeline with the
//! `iced-x86` primitive; [`sample`] accepts any [`DecodePrimitive`].

pub mod address;
pub mod decode;
pub mod iced;
pub mod regions;
pub mod report;
pub mod seeds;
pub mod unwind;
pub mod worklist;

use std::path::Path;

use tracing::{debug, info_span, warn};

use crate::config::SamplerConfig;
use crate::container::ContainerLayout;
use crate::error::{Result, SamplerError};
use crate::io::{ByteSource, IOLimits, MemorySource, SafeReader};
use crate::timeout::CancellationToken;

pub use address::{AddressDomain, AddressSpace, Location};
pub use decode::{DecodePrimitive, DecodedInstruction, FlowControlKind, InstructionCursor};
pub use iced::IcedPrimitive;
pub use regions::ExecutableRegion;
pub use report::{
    Issue, IssueKind, ProgressSnapshot, RegionSummary, Report, ReportBuilder, TraversalOutcome,
};
pub use seeds::{SeedSet, SeedSource, SeedSummary};

/// Caller hooks for one run: a cancellation signal and a progress observer.
#[derive(Default)]
pub struct Control<'a> {
    cancel: Option<CancellationToken>,
    observer: Option<&'a mut dyn FnMut(&ProgressSnapshot)>,
}

impl<'a> Control<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Called every `yield_interval` decoded instructions.
    pub fn with_observer(mut self, observer: &'a mut dyn FnMut(&ProgressSnapshot)) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    pub(crate) fn report(&mut self, snapshot: &ProgressSnapshot) {
        if let Some(observer) = self.observer.as_deref_mut() {
            observer(snapshot);
        }
    }
}

/// Run the full pipeline over `layout` with an explicit decode primitive.
pub fn sample<S, P>(
    layout: &ContainerLayout,
    source: &mut S,
    primitive: &P,
    config: &SamplerConfig,
    control: &mut Control<'_>,
) -> Report
where
    S: ByteSource + ?Sized,
    P: DecodePrimitive,
{
    let span = info_span!(
        "isa_sample",
        format = %layout.format,
        arch = %layout.architecture,
        bitness = layout.bitness
    );
    let _guard = span.enter();

    let mut issues = report::IssueLog::new(config.max_issues);
    let regions = regions::resolve(layout, source, config, &mut issues);
    let space = AddressSpace::new(layout.domain(), &regions);
    let seeds = seeds::collect(layout, source, space, config, &mut issues);
    let bytes_sampled: u64 = regions.iter().map(|r| r.len() as u64).sum();

    let traversal = worklist::traverse(
        space,
        primitive,
        &seeds.addresses,
        bytes_sampled,
        config,
        control,
        &mut issues,
    );

    Report::builder()
        .with_format(layout.format)
        .with_architecture(layout.architecture)
        .with_bitness(layout.bitness)
        .with_regions(&regions)
        .with_traversal(traversal)
        .with_seed_summary(seeds.summary)
        .with_issues(issues)
        .build()
}

/// Regions and seeds only, for code no decode primitive understands.
fn survey<S: ByteSource + ?Sized>(
    layout: &ContainerLayout,
    source: &mut S,
    config: &SamplerConfig,
    reason: &SamplerError,
) -> Report {
    let mut issues = report::IssueLog::new(config.max_issues);
    issues.push(IssueKind::UnsupportedArchitecture, reason.to_string());
    let regions = regions::resolve(layout, source, config, &mut issues);
    let space = AddressSpace::new(layout.domain(), &regions);
    let seeds = seeds::collect(layout, source, space, config, &mut issues);

    Report::builder()
        .with_format(layout.format)
        .with_architecture(layout.architecture)
        .with_bitness(layout.bitness)
        .with_regions(&regions)
        .with_seed_summary(seeds.summary)
        .with_issues(issues)
        .build()
}

/// The decode primitive for `layout`, if one exists.
pub fn primitive_for(layout: &ContainerLayout) -> Result<IcedPrimitive> {
    if !layout.architecture.is_x86_family() {
        return Err(SamplerError::UnsupportedArchitecture(
            layout.architecture.to_string(),
        ));
    }
    IcedPrimitive::new(layout.bitness)
}

/// Sample an already parsed container, picking the decode primitive from
/// its architecture.
pub fn analyze_layout<S: ByteSource + ?Sized>(
    layout: &ContainerLayout,
    source: &mut S,
    config: &SamplerConfig,
    control: &mut Control<'_>,
) -> Report {
    match primitive_for(layout) {
        Ok(primitive) => sample(layout, source, &primitive, config, control),
        Err(e) => {
            warn!(error = %e, "no decoder for this architecture, sampling skipped");
            survey(layout, source, config, &e)
        }
    }
}

/// Sample an ELF or PE image held in memory.
pub fn analyze_bytes(
    data: &[u8],
    config: &SamplerConfig,
    control: &mut Control<'_>,
) -> Result<Report> {
    let layout = ContainerLayout::parse(data)?;
    let mut source = MemorySource::new(data.to_vec());
    Ok(analyze_layout(&layout, &mut source, config, control))
}

/// Sample an ELF or PE file on disk.
pub fn analyze_path<P: AsRef<Path>>(
    path: P,
    config: &SamplerConfig,
    control: &mut Control<'_>,
) -> Result<Report> {
    let path = path.as_ref();
    let mut reader = SafeReader::open(path, IOLimits::from(&config.io))?;
    let layout = ContainerLayout::parse(reader.as_slice())?;
    let report = analyze_layout(&layout, &mut reader, config, control);
    debug!(
        path = %path.display(),
        bytes_read = reader.bytes_read(),
        instructions = report.instruction_count,
        "file sampled"
    );
    Ok(report)
}
