//! Executable region resolution.
//!
//! Load segments marked executable are preferred; only when none exist do
//! executable sections stand in for them. Each region is read from the
//! byte source once, capped at `max_region_bytes`.

use bytes::Bytes;
use tracing::{debug, warn};

use super::address::AddressDomain;
use super::report::{IssueKind, IssueLog};
use crate::config::SamplerConfig;
use crate::container::{ContainerLayout, MappedRange};
use crate::io::ByteSource;

/// A contiguous window of executable bytes loaded at `base_address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableRegion {
    pub label: String,
    pub base_address: u64,
    pub bytes: Bytes,
}

impl ExecutableRegion {
    pub fn new(label: impl Into<String>, base_address: u64, bytes: Bytes) -> Self {
        Self {
            label: label.into(),
            base_address,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Which metadata the regions were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOrigin {
    Segments,
    Sections,
    None,
}

/// Pick the executable, file-backed, non-empty ranges of the layout.
pub fn executable_ranges(layout: &ContainerLayout) -> (RegionOrigin, Vec<&MappedRange>) {
    let usable = |r: &&MappedRange| r.is_executable() && r.length > 0 && r.file_offset.is_some();

    let segments: Vec<&MappedRange> = layout.segments.iter().filter(usable).collect();
    if !segments.is_empty() {
        return (RegionOrigin::Segments, segments);
    }
    let sections: Vec<&MappedRange> = layout.sections.iter().filter(usable).collect();
    if !sections.is_empty() {
        return (RegionOrigin::Sections, sections);
    }
    (RegionOrigin::None, Vec::new())
}

/// Read every executable range into memory.
///
/// Truncated reads still yield a usable region plus a `RegionTruncated`
/// issue; failed or empty reads are skipped with a `RegionUnreadable` issue.
pub fn resolve<S: ByteSource + ?Sized>(
    layout: &ContainerLayout,
    source: &mut S,
    config: &SamplerConfig,
    issues: &mut IssueLog,
) -> Vec<ExecutableRegion> {
    let domain = layout.domain();
    let (origin, ranges) = executable_ranges(layout);
    let mut regions = Vec::with_capacity(ranges.len());

    for range in ranges {
        let Some(file_offset) = range.file_offset else {
            continue;
        };
        let wanted = range.length.min(config.max_region_bytes);
        let bytes = match source.read_range(file_offset, wanted) {
            Ok(b) => b,
            Err(e) => {
                warn!(label = %range.label, error = %e, "executable region unreadable");
                issues.push(
                    IssueKind::RegionUnreadable,
                    format!("{}: {}", range.label, e),
                );
                continue;
            }
        };
        if bytes.is_empty() {
            issues.push(
                IssueKind::RegionUnreadable,
                format!(
                    "{}: no file data at offset {:#x}",
                    range.label, file_offset
                ),
            );
            continue;
        }
        if (bytes.len() as u64) < range.length {
            issues.push(
                IssueKind::RegionTruncated,
                format!(
                    "{}: read {:#x} of {:#x} bytes",
                    range.label,
                    bytes.len(),
                    range.length
                ),
            );
        }
        regions.push(ExecutableRegion::new(
            range.label.clone(),
            region_base(domain, range.base_address),
            bytes,
        ));
    }

    debug!(
        ?origin,
        regions = regions.len(),
        bytes = regions.iter().map(|r| r.len()).sum::<usize>(),
        "executable regions resolved"
    );
    regions
}

fn region_base(domain: AddressDomain, base: u64) -> u64 {
    domain.normalize(base)
}
