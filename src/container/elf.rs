//! ELF layout extraction.
//!
//! Load segments come from `PT_LOAD` program headers; sections carry the
//! `SHF_EXECINSTR` bit. Symbol values are passed through untouched: for
//! relocatable objects (no load segments) they are section-relative and the
//! seed collector rebases them.

use object::elf::{PF_R, PF_W, PF_X, SHF_EXECINSTR, SHF_WRITE};
use object::{
    Object, ObjectSection, ObjectSegment, ObjectSymbol, SectionFlags, SegmentFlags, SymbolKind,
};
use tracing::debug;

use super::{
    Architecture, ContainerFormat, ContainerLayout, Endianness, MappedRange, Perms,
    PointerArray, SymbolEntry, SymbolType, UnwindTable, UnwindTableKind,
};

/// Sections holding packed arrays of constructor/destructor pointers.
const POINTER_ARRAY_SECTIONS: &[&str] = &[
    ".preinit_array",
    ".init_array",
    ".fini_array",
    ".ctors",
    ".dtors",
];

pub(crate) fn layout<'data>(obj: &object::read::File<'data>) -> ContainerLayout {
    let mut layout = ContainerLayout::new(
        ContainerFormat::Elf,
        Architecture::from(obj.architecture()),
        if obj.is_64() { 64 } else { 32 },
    );
    layout.endianness = if obj.is_little_endian() {
        Endianness::Little
    } else {
        Endianness::Big
    };
    layout.entry = obj.entry();

    for (i, seg) in obj.segments().enumerate() {
        let (file_offset, file_size) = seg.file_range();
        let perms = match seg.flags() {
            SegmentFlags::Elf { p_flags } => segment_perms(p_flags),
            _ => Perms::empty(),
        };
        layout.segments.push(MappedRange {
            label: format!("LOAD[{}]", i),
            index: i,
            base_address: seg.address(),
            file_offset: Some(file_offset),
            length: file_size,
            perms,
        });
    }

    for sec in obj.sections() {
        let name = sec.name().unwrap_or("").to_string();
        let perms = match sec.flags() {
            SectionFlags::Elf { sh_flags } => section_perms(sh_flags),
            _ => Perms::empty(),
        };
        let (file_offset, length) = match sec.file_range() {
            Some((off, size)) => (Some(off), size),
            None => (None, sec.size()),
        };
        if POINTER_ARRAY_SECTIONS.contains(&name.as_str()) && file_offset.is_some() {
            layout.pointer_arrays.push(PointerArray {
                name: name.trim_start_matches('.').to_string(),
                address: sec.address(),
                size: Some(length),
                bias: 0,
            });
        }
        if name == ".eh_frame_hdr" && file_offset.is_some() {
            layout.unwind_tables.push(UnwindTable {
                kind: UnwindTableKind::EhFrameHdr,
                address: sec.address(),
                size: length,
            });
        }
        layout.sections.push(MappedRange {
            label: name,
            index: sec.index().0,
            base_address: sec.address(),
            file_offset,
            length,
            perms,
        });
    }

    for sym in obj.symbols() {
        layout.symbols.push(symbol_entry(".symtab", &sym));
    }
    for sym in obj.dynamic_symbols() {
        layout.symbols.push(symbol_entry(".dynsym", &sym));
    }

    debug!(
        segments = layout.segments.len(),
        sections = layout.sections.len(),
        symbols = layout.symbols.len(),
        pointer_arrays = layout.pointer_arrays.len(),
        unwind_tables = layout.unwind_tables.len(),
        entry = format_args!("{:#x}", layout.entry),
        "ELF layout extracted"
    );
    layout
}

fn symbol_entry<'data, S>(table: &str, sym: &S) -> SymbolEntry
where
    S: ObjectSymbol<'data>,
{
    SymbolEntry {
        table: table.to_string(),
        value: sym.address(),
        section_index: sym.section_index().map(|i| i.0),
        kind: match sym.kind() {
            SymbolKind::Text => SymbolType::Function,
            SymbolKind::Data => SymbolType::Data,
            _ => SymbolType::Other,
        },
        is_defined: !sym.is_undefined(),
    }
}

fn segment_perms(p_flags: u32) -> Perms {
    let mut perms = Perms::empty();
    perms.set(Perms::READ, p_flags & PF_R != 0);
    perms.set(Perms::WRITE, p_flags & PF_W != 0);
    perms.set(Perms::EXECUTE, p_flags & PF_X != 0);
    perms
}

fn section_perms(sh_flags: u64) -> Perms {
    let mut perms = Perms::READ;
    perms.set(Perms::WRITE, sh_flags & u64::from(SHF_WRITE) != 0);
    perms.set(Perms::EXECUTE, sh_flags & u64::from(SHF_EXECINSTR) != 0);
    perms
}
