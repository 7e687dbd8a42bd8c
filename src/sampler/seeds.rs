//! Seed collection.
//!
//! Each structural source (entry point, constructor arrays, symbol tables,
//! unwind indexes, caller-supplied addresses) is enumerated independently
//! and its candidates pass through one shared filter: zero addresses,
//! addresses already accepted, and addresses outside every executable region
//! are rejected and counted per source.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::address::AddressSpace;
use super::report::{IssueKind, IssueLog};
use super::unwind::{self, StartTable};
use crate::config::SamplerConfig;
use crate::container::{ContainerLayout, Endianness, PointerArray, SymbolType, UnwindTableKind};
use crate::io::ByteSource;

/// Yield and rejection counts of one seed source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSource {
    pub name: String,
    pub candidates: usize,
    pub added: usize,
    pub skipped_zero: usize,
    pub skipped_not_executable: usize,
    pub skipped_duplicate: usize,
}

/// Per-source breakdown of the seed set, in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub sources: Vec<SeedSource>,
    pub accepted: usize,
}

impl SeedSummary {
    pub fn source(&self, name: &str) -> Option<&SeedSource> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Accepted seeds in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSet {
    pub addresses: Vec<u64>,
    /// Index into `summary.sources` of the source that contributed each address.
    pub provenance: Vec<usize>,
    pub summary: SeedSummary,
}

impl SeedSet {
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Name of the source that contributed `address`.
    pub fn origin_of(&self, address: u64) -> Option<&str> {
        let i = self.addresses.iter().position(|&a| a == address)?;
        let source = *self.provenance.get(i)?;
        self.summary.sources.get(source).map(|s| s.name.as_str())
    }
}

/// Applies the shared filter to candidates from successive sources.
pub struct SeedCollector<'r> {
    space: AddressSpace<'r>,
    seen: HashSet<u64>,
    set: SeedSet,
}

impl<'r> SeedCollector<'r> {
    pub fn new(space: AddressSpace<'r>) -> Self {
        Self {
            space,
            seen: HashSet::new(),
            set: SeedSet::default(),
        }
    }

    /// Filter one source's candidates and record its counts.
    pub fn offer<I>(&mut self, name: &str, candidates: I) -> &SeedSource
    where
        I: IntoIterator<Item = u64>,
    {
        let index = self.set.summary.sources.len();
        let mut source = SeedSource {
            name: name.to_string(),
            ..SeedSource::default()
        };
        for candidate in candidates {
            source.candidates += 1;
            let address = self.space.domain().normalize(candidate);
            if address == 0 {
                source.skipped_zero += 1;
            } else if self.seen.contains(&address) {
                source.skipped_duplicate += 1;
            } else if !self.space.contains(address) {
                source.skipped_not_executable += 1;
            } else {
                self.seen.insert(address);
                self.set.addresses.push(address);
                self.set.provenance.push(index);
                source.added += 1;
            }
        }
        trace!(
            source = name,
            candidates = source.candidates,
            added = source.added,
            "seed source filtered"
        );
        self.set.summary.accepted += source.added;
        self.set.summary.sources.push(source);
        &self.set.summary.sources[index]
    }

    pub fn finish(self) -> SeedSet {
        self.set
    }
}

/// Gather seeds from every enabled source, entry point first.
pub fn collect<S: ByteSource + ?Sized>(
    layout: &ContainerLayout,
    source: &mut S,
    space: AddressSpace<'_>,
    config: &SamplerConfig,
    issues: &mut IssueLog,
) -> SeedSet {
    let toggles = &config.sources;
    let mut collector = SeedCollector::new(space);

    // Always offered, so the entry point is the fallback seed.
    collector.offer("entry_point", [layout.entry]);

    if toggles.pointer_arrays {
        for array in &layout.pointer_arrays {
            let entries = read_pointer_array(layout, source, array, config, issues);
            collector.offer(&array.name, entries);
        }
    }

    if toggles.symbols {
        for table in symbol_tables(layout) {
            collector.offer(table, symbol_candidates(layout, table));
        }
    }

    if toggles.unwind_tables {
        for table in &layout.unwind_tables {
            let name = match table.kind {
                UnwindTableKind::EhFrameHdr => "eh_frame_hdr",
                UnwindTableKind::RuntimeFunctions => "pdata",
            };
            let starts = read_unwind_table(layout, source, table, config, issues, name);
            collector.offer(name, starts);
        }
    }

    if toggles.extra_entry_points {
        collector.offer("extra_entry_points", config.extra_entry_points.iter().copied());
    }

    let set = collector.finish();
    debug!(
        accepted = set.summary.accepted,
        sources = set.summary.sources.len(),
        "seeds collected"
    );
    set
}

/// Symbol table names in first-seen order.
fn symbol_tables(layout: &ContainerLayout) -> Vec<&str> {
    let mut tables: Vec<&str> = Vec::new();
    for sym in &layout.symbols {
        if !tables.contains(&sym.table.as_str()) {
            tables.push(&sym.table);
        }
    }
    tables
}

/// Defined, non-zero function symbols of `table` that belong to a section.
fn symbol_candidates(layout: &ContainerLayout, table: &str) -> Vec<u64> {
    let rebase = layout.symbols_are_section_relative();
    layout
        .symbols
        .iter()
        .filter(|s| s.table == table && s.kind == SymbolType::Function && s.is_defined)
        .filter(|s| s.value != 0)
        .filter_map(|s| {
            let index = s.section_index?;
            if !rebase {
                return Some(s.value);
            }
            let base = layout.section_by_index(index).map_or(0, |sec| sec.base_address);
            Some(s.value.wrapping_add(base))
        })
        .collect()
}

/// Read the pointers of one constructor/destructor or TLS callback array.
///
/// Sized arrays keep zero entries so the filter can count them as padding;
/// unsized arrays end at the first zero.
fn read_pointer_array<S: ByteSource + ?Sized>(
    layout: &ContainerLayout,
    source: &mut S,
    array: &PointerArray,
    config: &SamplerConfig,
    issues: &mut IssueLog,
) -> Vec<u64> {
    let ptr = layout.pointer_size();
    let Some((offset, remaining)) = layout.file_offset_of(array.address) else {
        issues.push(
            IssueKind::SeedSource,
            format!(
                "{}: address {:#x} has no file data",
                array.name, array.address
            ),
        );
        return Vec::new();
    };
    let cap = (config.max_pointer_array_entries as u64).saturating_mul(ptr as u64);
    let len = array.size.unwrap_or(remaining).min(remaining).min(cap);
    let bytes = match source.read_range(offset, len) {
        Ok(b) => b,
        Err(e) => {
            warn!(array = %array.name, error = %e, "pointer array unreadable");
            issues.push(IssueKind::SeedSource, format!("{}: {}", array.name, e));
            return Vec::new();
        }
    };

    let mut entries = Vec::with_capacity(bytes.len() / ptr);
    for chunk in bytes.chunks_exact(ptr) {
        let value = read_pointer(chunk, layout.endianness);
        if value == 0 {
            if array.size.is_none() {
                break;
            }
            entries.push(0);
            continue;
        }
        entries.push(value.wrapping_sub(array.bias));
    }
    trace!(array = %array.name, entries = entries.len(), "pointer array read");
    entries
}

fn read_pointer(chunk: &[u8], endianness: Endianness) -> u64 {
    let mut buf = [0u8; 8];
    match endianness {
        Endianness::Little => {
            buf[..chunk.len()].copy_from_slice(chunk);
            u64::from_le_bytes(buf)
        }
        Endianness::Big => {
            buf[8 - chunk.len()..].copy_from_slice(chunk);
            u64::from_be_bytes(buf)
        }
    }
}

fn read_unwind_table<S: ByteSource + ?Sized>(
    layout: &ContainerLayout,
    source: &mut S,
    table: &crate::container::UnwindTable,
    config: &SamplerConfig,
    issues: &mut IssueLog,
    name: &str,
) -> Vec<u64> {
    let Some((offset, remaining)) = layout.file_offset_of(table.address) else {
        issues.push(
            IssueKind::SeedSource,
            format!("{}: address {:#x} has no file data", name, table.address),
        );
        return Vec::new();
    };
    let bytes = match source.read_range(offset, table.size.min(remaining)) {
        Ok(b) => b,
        Err(e) => {
            warn!(table = name, error = %e, "unwind table unreadable");
            issues.push(IssueKind::SeedSource, format!("{}: {}", name, e));
            return Vec::new();
        }
    };
    let StartTable { starts, error } = match table.kind {
        UnwindTableKind::EhFrameHdr => unwind::eh_frame_hdr_starts(
            &bytes,
            table.address,
            layout.endianness,
            layout.pointer_size() as u8,
            config.max_unwind_entries,
        ),
        UnwindTableKind::RuntimeFunctions => {
            unwind::runtime_function_starts(&bytes, config.max_unwind_entries)
        }
    };
    if let Some(error) = error {
        let kind = if error.is_encoding_error() {
            IssueKind::UnsupportedEncoding
        } else {
            IssueKind::SeedSource
        };
        warn!(table = name, %error, "unwind table not fully decoded");
        issues.push(kind, format!("{}: {}", name, error));
    }
    starts
}
