//! Container metadata consumed by the sampler.
//!
//! [`ContainerLayout`] is the narrow view of an ELF or PE image that the
//! region resolver and seed collector need: load segments, sections,
//! symbols, constructor-style pointer arrays and unwind tables. It is
//! produced by [`ContainerLayout::parse`] on top of the `object` crate and
//! can equally be assembled by hand for synthetic inputs.
//!
//! PE layouts store every address as an RVA; ELF layouts store virtual
//! addresses. [`ContainerLayout::domain`] tells the sampler which one.

pub mod elf;
pub mod pe;

use bitflags::bitflags;
use object::{Object, ObjectKind};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SamplerError};
use crate::sampler::address::AddressDomain;

/// Container families the sampler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerFormat {
    Elf,
    Pe,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Elf => write!(f, "elf"),
            ContainerFormat::Pe => write!(f, "pe"),
        }
    }
}

/// Instruction-set family of the code in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    X86,
    X86_64,
    Arm,
    AArch64,
    Other,
}

impl Architecture {
    pub fn is_x86_family(&self) -> bool {
        matches!(self, Architecture::X86 | Architecture::X86_64)
    }
}

impl From<object::Architecture> for Architecture {
    fn from(a: object::Architecture) -> Self {
        match a {
            object::Architecture::I386 => Architecture::X86,
            object::Architecture::X86_64 => Architecture::X86_64,
            object::Architecture::Arm => Architecture::Arm,
            object::Architecture::Aarch64 => Architecture::AArch64,
            _ => Architecture::Other,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Arm => write!(f, "arm"),
            Architecture::AArch64 => write!(f, "aarch64"),
            Architecture::Other => write!(f, "other"),
        }
    }
}

/// Byte order of multi-byte fields in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

bitflags! {
    /// Memory permissions of a mapped range.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Perms: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXECUTE = 0b100;
    }
}

/// A segment or section: `length` bytes at `base_address`, backed by the
/// file at `file_offset` when the range has file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRange {
    pub label: String,
    /// Section header index (sections) or position in the program header list (segments).
    pub index: usize,
    pub base_address: u64,
    pub file_offset: Option<u64>,
    /// File-backed size in bytes.
    pub length: u64,
    pub perms: Perms,
}

impl MappedRange {
    pub fn is_executable(&self) -> bool {
        self.perms.contains(Perms::EXECUTE)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address - self.base_address < self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolType {
    Function,
    Data,
    Other,
}

/// One symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Table the symbol came from (`.symtab`, `.dynsym`, `exports`).
    pub table: String,
    pub value: u64,
    pub section_index: Option<usize>,
    pub kind: SymbolType,
    pub is_defined: bool,
}

/// A packed array of code pointers (`.init_array`, TLS callbacks, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerArray {
    pub name: String,
    pub address: u64,
    /// Size in bytes; `None` for arrays terminated by a null entry.
    pub size: Option<u64>,
    /// Subtracted from every entry to bring it into the layout's address domain.
    pub bias: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnwindTableKind {
    /// `.eh_frame_hdr` binary search table.
    EhFrameHdr,
    /// PE `.pdata` `RUNTIME_FUNCTION` entries.
    RuntimeFunctions,
}

/// Location of an exception/unwind table that lists function start addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindTable {
    pub kind: UnwindTableKind,
    pub address: u64,
    pub size: u64,
}

/// Everything the sampler needs to know about a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    pub format: ContainerFormat,
    pub architecture: Architecture,
    pub bitness: u32,
    pub endianness: Endianness,
    /// Preferred load address; addresses in a PE layout are relative to it.
    pub image_base: u64,
    pub entry: u64,
    pub segments: Vec<MappedRange>,
    pub sections: Vec<MappedRange>,
    pub symbols: Vec<SymbolEntry>,
    pub pointer_arrays: Vec<PointerArray>,
    pub unwind_tables: Vec<UnwindTable>,
}

impl ContainerLayout {
    /// An empty layout, useful as a starting point for synthetic inputs.
    pub fn new(format: ContainerFormat, architecture: Architecture, bitness: u32) -> Self {
        Self {
            format,
            architecture,
            bitness,
            endianness: Endianness::Little,
            image_base: 0,
            entry: 0,
            segments: Vec::new(),
            sections: Vec::new(),
            symbols: Vec::new(),
            pointer_arrays: Vec::new(),
            unwind_tables: Vec::new(),
        }
    }

    /// Parse an ELF or PE image.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let obj = object::read::File::parse(data)?;
        match obj.format() {
            object::BinaryFormat::Elf => {
                if obj.kind() == ObjectKind::Unknown {
                    return Err(SamplerError::InvalidFormat(
                        "ELF file of unknown type".to_string(),
                    ));
                }
                Ok(elf::layout(&obj))
            }
            object::BinaryFormat::Pe => Ok(pe::layout(&obj, data)),
            other => Err(SamplerError::UnsupportedFormat(format!("{:?}", other))),
        }
    }

    /// Address domain the sampler must use for this layout.
    pub fn domain(&self) -> AddressDomain {
        match self.format {
            ContainerFormat::Pe => AddressDomain::Rva32,
            ContainerFormat::Elf => AddressDomain::Va64,
        }
    }

    /// Size of one pointer in the container.
    pub fn pointer_size(&self) -> usize {
        if self.bitness == 64 {
            8
        } else {
            4
        }
    }

    pub fn section_by_index(&self, index: usize) -> Option<&MappedRange> {
        self.sections.iter().find(|s| s.index == index)
    }

    /// ELF objects without program headers carry section-relative symbol values.
    pub fn symbols_are_section_relative(&self) -> bool {
        self.format == ContainerFormat::Elf && self.segments.is_empty()
    }

    /// Map a container address to `(file offset, file-backed bytes remaining)`.
    ///
    /// Segments are consulted first, then sections.
    pub fn file_offset_of(&self, address: u64) -> Option<(u64, u64)> {
        self.segments
            .iter()
            .chain(self.sections.iter())
            .filter(|r| r.file_offset.is_some())
            .find(|r| r.contains(address))
            .and_then(|r| {
                let delta = address - r.base_address;
                let offset = r.file_offset?.checked_add(delta)?;
                Some((offset, r.length - delta))
            })
    }
}
