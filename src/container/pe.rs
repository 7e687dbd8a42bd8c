//! PE layout extraction.
//!
//! Every address in the resulting layout is an RVA. The `object` crate
//! reports virtual addresses (image base included), so they are rebased
//! here once. The TLS directory is located with a minimal header walk since
//! only its callback pointer is needed.

use object::pe::{
    IMAGE_DIRECTORY_ENTRY_TLS, IMAGE_NT_OPTIONAL_HDR32_MAGIC, IMAGE_NT_OPTIONAL_HDR64_MAGIC,
    IMAGE_SCN_CNT_CODE, IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ, IMAGE_SCN_MEM_WRITE,
};
use object::{Object, ObjectSection, SectionFlags};
use tracing::{debug, warn};

use super::{
    Architecture, ContainerFormat, ContainerLayout, Endianness, MappedRange, Perms,
    PointerArray, SymbolEntry, SymbolType, UnwindTable, UnwindTableKind,
};

pub(crate) fn layout<'data>(obj: &object::read::File<'data>, data: &[u8]) -> ContainerLayout {
    let image_base = obj.relative_address_base();
    let mut layout = ContainerLayout::new(
        ContainerFormat::Pe,
        Architecture::from(obj.architecture()),
        if obj.is_64() { 64 } else { 32 },
    );
    layout.endianness = Endianness::Little;
    layout.image_base = image_base;
    layout.entry = to_rva(obj.entry(), image_base);

    for sec in obj.sections() {
        let name = sec.name().unwrap_or("").to_string();
        let perms = match sec.flags() {
            SectionFlags::Coff { characteristics } => section_perms(characteristics),
            _ => Perms::empty(),
        };
        let rva = to_rva(sec.address(), image_base);
        let (file_offset, length) = match sec.file_range() {
            Some((off, size)) => (Some(off), size),
            None => (None, sec.size()),
        };
        if name == ".pdata" && file_offset.is_some() {
            layout.unwind_tables.push(UnwindTable {
                kind: UnwindTableKind::RuntimeFunctions,
                address: rva,
                size: length,
            });
        }
        layout.sections.push(MappedRange {
            label: name,
            index: sec.index().0,
            base_address: rva,
            file_offset,
            length,
            perms,
        });
    }

    match obj.exports() {
        Ok(exports) => {
            for export in exports {
                let rva = to_rva(export.address(), image_base);
                let section_index = layout
                    .sections
                    .iter()
                    .find(|s| s.contains(rva))
                    .map(|s| s.index);
                layout.symbols.push(SymbolEntry {
                    table: "exports".to_string(),
                    value: rva,
                    section_index,
                    kind: SymbolType::Function,
                    is_defined: true,
                });
            }
        }
        Err(e) => warn!(error = %e, "PE export directory unreadable"),
    }

    if let Some(callbacks) = tls_callbacks_rva(data, &layout) {
        layout.pointer_arrays.push(PointerArray {
            name: "tls_callbacks".to_string(),
            address: callbacks,
            size: None,
            bias: image_base,
        });
    }

    debug!(
        sections = layout.sections.len(),
        exports = layout.symbols.len(),
        image_base = format_args!("{:#x}", image_base),
        entry_rva = format_args!("{:#x}", layout.entry),
        "PE layout extracted"
    );
    layout
}

/// Strip the image base from a virtual address. Values already below the
/// base are taken to be RVAs.
fn to_rva(address: u64, image_base: u64) -> u64 {
    if address >= image_base {
        address - image_base
    } else {
        address
    }
}

fn section_perms(characteristics: u32) -> Perms {
    let mut perms = Perms::empty();
    perms.set(Perms::READ, characteristics & IMAGE_SCN_MEM_READ != 0);
    perms.set(Perms::WRITE, characteristics & IMAGE_SCN_MEM_WRITE != 0);
    perms.set(
        Perms::EXECUTE,
        characteristics & (IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_CNT_CODE) != 0,
    );
    perms
}

fn read_u16_le(data: &[u8], off: usize) -> Option<u16> {
    data.get(off..off.checked_add(2)?)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(data: &[u8], off: usize) -> Option<u32> {
    data.get(off..off.checked_add(4)?)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64_le(data: &[u8], off: usize) -> Option<u64> {
    let lo = read_u32_le(data, off)? as u64;
    let hi = read_u32_le(data, off.checked_add(4)?)? as u64;
    Some(lo | (hi << 32))
}

/// RVA of the TLS callback array, if the image declares one.
fn tls_callbacks_rva(data: &[u8], layout: &ContainerLayout) -> Option<u64> {
    let e_lfanew = read_u32_le(data, 0x3c)? as usize;
    if data.get(e_lfanew..e_lfanew.checked_add(4)?)? != b"PE\0\0" {
        return None;
    }
    let opt = e_lfanew + 4 + 20;
    let (dirs_off, count_off, is_pe32_plus) = match read_u16_le(data, opt)? {
        IMAGE_NT_OPTIONAL_HDR32_MAGIC => (opt + 96, opt + 92, false),
        IMAGE_NT_OPTIONAL_HDR64_MAGIC => (opt + 112, opt + 108, true),
        _ => return None,
    };
    if read_u32_le(data, count_off)? as usize <= IMAGE_DIRECTORY_ENTRY_TLS {
        return None;
    }
    let tls_rva = read_u32_le(data, dirs_off + IMAGE_DIRECTORY_ENTRY_TLS * 8)? as u64;
    if tls_rva == 0 {
        return None;
    }
    let (tls_off, _) = layout.file_offset_of(tls_rva)?;
    let tls_off = usize::try_from(tls_off).ok()?;
    let callbacks_va = if is_pe32_plus {
        read_u64_le(data, tls_off + 0x18)?
    } else {
        read_u32_le(data, tls_off + 0x0c)? as u64
    };
    if callbacks_va == 0 {
        return None;
    }
    Some(to_rva(callbacks_va, layout.image_base))
}
