//! Function start addresses from unwind index tables.
//!
//! Two layouts are understood:
//!
//! * `.eh_frame_hdr`: a version byte, three pointer-encoding bytes, the
//!   encoded `eh_frame_ptr` and `fde_count`, then `fde_count` sorted pairs
//!   of `(initial_location, fde_address)`.
//! * PE `.pdata`: packed 12-byte `RUNTIME_FUNCTION` records whose first
//!   field is the function's begin RVA.
//!
//! Pointer fields are read with `gimli`'s [`Reader`]; only the `absptr`,
//! `pcrel` and `datarel` applications are supported, and indirect pointers
//! are rejected.

// gimli names its `DW_EH_PE_*` constants in lower case.
#![allow(non_upper_case_globals)]

use gimli::constants::{
    DW_EH_PE_absptr, DW_EH_PE_datarel, DW_EH_PE_indirect, DW_EH_PE_omit, DW_EH_PE_pcrel,
    DW_EH_PE_sdata2, DW_EH_PE_sdata4, DW_EH_PE_sdata8, DW_EH_PE_sleb128, DW_EH_PE_udata2,
    DW_EH_PE_udata4, DW_EH_PE_udata8, DW_EH_PE_uleb128,
};
use gimli::{DwEhPe, EndianSlice, Reader, RunTimeEndian};
use thiserror::Error;

use crate::container::Endianness;

const FORMAT_MASK: u8 = 0x0f;
const APPLICATION_MASK: u8 = 0x70;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnwindError {
    #[error("unsupported .eh_frame_hdr version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported pointer encoding {encoding:#04x} for {field}")]
    UnsupportedEncoding { field: &'static str, encoding: u8 },

    #[error("table truncated after {decoded} entries")]
    Truncated { decoded: usize },

    #[error("table declares {declared} entries, only the first {limit} were read")]
    EntryLimit { declared: u64, limit: usize },
}

impl UnwindError {
    /// True when the table was rejected outright rather than partially read.
    pub fn is_encoding_error(&self) -> bool {
        matches!(
            self,
            UnwindError::UnsupportedVersion(_) | UnwindError::UnsupportedEncoding { .. }
        )
    }
}

/// Start addresses read from one table, plus the problem that stopped the
/// read early, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartTable {
    pub starts: Vec<u64>,
    pub error: Option<UnwindError>,
}

impl StartTable {
    fn failed(error: UnwindError) -> Self {
        Self {
            starts: Vec::new(),
            error: Some(error),
        }
    }
}

struct PointerContext<'a> {
    section: EndianSlice<'a, RunTimeEndian>,
    section_address: u64,
    address_size: u8,
}

impl PointerContext<'_> {
    fn check(&self, field: &'static str, encoding: DwEhPe) -> Result<(), UnwindError> {
        let unsupported = Err(UnwindError::UnsupportedEncoding {
            field,
            encoding: encoding.0,
        });
        if encoding == DW_EH_PE_omit {
            return Ok(());
        }
        if encoding.0 & DW_EH_PE_indirect.0 != 0 {
            return unsupported;
        }
        let application = DwEhPe(encoding.0 & APPLICATION_MASK);
        if application != DW_EH_PE_absptr
            && application != DW_EH_PE_pcrel
            && application != DW_EH_PE_datarel
        {
            return unsupported;
        }
        let format = DwEhPe(encoding.0 & FORMAT_MASK);
        let known = [
            DW_EH_PE_absptr,
            DW_EH_PE_uleb128,
            DW_EH_PE_udata2,
            DW_EH_PE_udata4,
            DW_EH_PE_udata8,
            DW_EH_PE_sleb128,
            DW_EH_PE_sdata2,
            DW_EH_PE_sdata4,
            DW_EH_PE_sdata8,
        ];
        if !known.contains(&format) {
            return unsupported;
        }
        Ok(())
    }

    /// Read one pointer field. `encoding` must have passed [`Self::check`].
    fn read(
        &self,
        r: &mut EndianSlice<'_, RunTimeEndian>,
        encoding: DwEhPe,
    ) -> gimli::Result<u64> {
        let field_address = self
            .section_address
            .wrapping_add(Reader::offset_from(&*r, &self.section) as u64);
        let raw = match DwEhPe(encoding.0 & FORMAT_MASK) {
            DW_EH_PE_uleb128 => r.read_uleb128()?,
            DW_EH_PE_udata2 => u64::from(r.read_u16()?),
            DW_EH_PE_udata4 => u64::from(r.read_u32()?),
            DW_EH_PE_udata8 => r.read_u64()?,
            DW_EH_PE_sleb128 => r.read_sleb128()? as u64,
            DW_EH_PE_sdata2 => i64::from(r.read_i16()?) as u64,
            DW_EH_PE_sdata4 => i64::from(r.read_i32()?) as u64,
            DW_EH_PE_sdata8 => r.read_i64()? as u64,
            _ => r.read_address(self.address_size)?,
        };
        let value = match DwEhPe(encoding.0 & APPLICATION_MASK) {
            DW_EH_PE_pcrel => field_address.wrapping_add(raw),
            DW_EH_PE_datarel => self.section_address.wrapping_add(raw),
            _ => raw,
        };
        Ok(if self.address_size == 4 {
            value & 0xFFFF_FFFF
        } else {
            value
        })
    }
}

fn runtime_endian(endianness: Endianness) -> RunTimeEndian {
    match endianness {
        Endianness::Little => RunTimeEndian::Little,
        Endianness::Big => RunTimeEndian::Big,
    }
}

fn read_header(r: &mut EndianSlice<'_, RunTimeEndian>) -> gimli::Result<[u8; 4]> {
    Ok([r.read_u8()?, r.read_u8()?, r.read_u8()?, r.read_u8()?])
}

/// Decode the binary search table of an `.eh_frame_hdr` section loaded at
/// `section_address`.
pub fn eh_frame_hdr_starts(
    data: &[u8],
    section_address: u64,
    endianness: Endianness,
    address_size: u8,
    max_entries: usize,
) -> StartTable {
    let section = EndianSlice::new(data, runtime_endian(endianness));
    let ctx = PointerContext {
        section,
        section_address,
        address_size,
    };
    let mut r = section;

    let [version, frame_ptr_enc, count_enc, table_enc] = match read_header(&mut r) {
        Ok(h) => h,
        Err(_) => return StartTable::failed(UnwindError::Truncated { decoded: 0 }),
    };
    if version != 1 {
        return StartTable::failed(UnwindError::UnsupportedVersion(version));
    }
    let (frame_ptr_enc, count_enc, table_enc) =
        (DwEhPe(frame_ptr_enc), DwEhPe(count_enc), DwEhPe(table_enc));
    for (field, enc) in [
        ("eh_frame_ptr", frame_ptr_enc),
        ("fde_count", count_enc),
        ("table", table_enc),
    ] {
        if let Err(e) = ctx.check(field, enc) {
            return StartTable::failed(e);
        }
    }

    if frame_ptr_enc != DW_EH_PE_omit && ctx.read(&mut r, frame_ptr_enc).is_err() {
        return StartTable::failed(UnwindError::Truncated { decoded: 0 });
    }
    if count_enc == DW_EH_PE_omit || table_enc == DW_EH_PE_omit {
        return StartTable::default();
    }
    let declared = match ctx.read(&mut r, count_enc) {
        Ok(n) => n,
        Err(_) => return StartTable::failed(UnwindError::Truncated { decoded: 0 }),
    };

    let limit = usize::try_from(declared).map_or(max_entries, |n| n.min(max_entries));
    let mut table = StartTable {
        starts: Vec::with_capacity(limit.min(r.len())),
        error: None,
    };
    for _ in 0..limit {
        let entry = ctx
            .read(&mut r, table_enc)
            .and_then(|start| ctx.read(&mut r, table_enc).map(|_| start));
        match entry {
            Ok(start) => table.starts.push(start),
            Err(_) => {
                table.error = Some(UnwindError::Truncated {
                    decoded: table.starts.len(),
                });
                return table;
            }
        }
    }
    if declared > limit as u64 {
        table.error = Some(UnwindError::EntryLimit {
            declared,
            limit: max_entries,
        });
    }
    table
}

/// Begin RVAs of a PE `.pdata` table.
pub fn runtime_function_starts(data: &[u8], max_entries: usize) -> StartTable {
    const ENTRY_SIZE: usize = 12;
    let declared = (data.len() / ENTRY_SIZE) as u64;
    let mut table = StartTable {
        starts: data
            .chunks_exact(ENTRY_SIZE)
            .take(max_entries)
            .map(|e| u64::from(u32::from_le_bytes([e[0], e[1], e[2], e[3]])))
            .collect(),
        error: None,
    };
    if declared > max_entries as u64 {
        table.error = Some(UnwindError::EntryLimit {
            declared,
            limit: max_entries,
        });
    }
    table
}
