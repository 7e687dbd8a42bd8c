//! Minimal ELF64 and PE32+ images built in memory.
//!
//! Only the structures the sampler reads are filled in: one executable
//! load segment (ELF) or `.text` section (PE), optional symbols, and an
//! optional TLS callback array.

/// Load address of the synthetic ELF image.
pub const ELF_BASE: u64 = 0x400000;
/// File offset (and virtual offset from `ELF_BASE`) of the ELF code.
pub const ELF_CODE_OFFSET: u64 = 0x78;
/// Preferred image base of the synthetic PE image.
pub const PE_IMAGE_BASE: u64 = 0x1_4000_0000;
/// RVA of the PE `.text` section.
pub const PE_TEXT_RVA: u32 = 0x1000;
/// RVA of the PE `.rdata` section.
pub const PE_RDATA_RVA: u32 = 0x2000;

/// A function symbol placed at `offset` bytes into the ELF code.
pub struct ElfFunction {
    pub name: &'static str,
    pub offset: u64,
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn align(v: usize, to: usize) -> usize {
    v.div_ceil(to) * to
}

/// Virtual address of `offset` bytes into the ELF code.
pub fn elf_code_address(offset: u64) -> u64 {
    ELF_BASE + ELF_CODE_OFFSET + offset
}

/// An x86-64 `ET_EXEC` image whose entry point is the first code byte.
///
/// The single `PT_LOAD` segment is R+X and covers headers and code. When
/// `functions` is non-empty a `.symtab` with matching `STT_FUNC` symbols is
/// appended after the segment.
pub fn elf64(code: &[u8], functions: &[ElfFunction]) -> Vec<u8> {
    let code_off = ELF_CODE_OFFSET as usize;
    let code_end = code_off + code.len();
    let mut out = vec![0u8; code_end];
    out[code_off..code_end].copy_from_slice(code);

    // e_ident
    out[0..4].copy_from_slice(b"\x7fELF");
    out[4] = 2; // ELFCLASS64
    out[5] = 1; // ELFDATA2LSB
    out[6] = 1; // EV_CURRENT
    put_u16(&mut out, 16, 2); // ET_EXEC
    put_u16(&mut out, 18, 0x3e); // EM_X86_64
    put_u32(&mut out, 20, 1);
    put_u64(&mut out, 24, elf_code_address(0));
    put_u64(&mut out, 32, 64); // e_phoff
    put_u16(&mut out, 52, 64); // e_ehsize
    put_u16(&mut out, 54, 56); // e_phentsize
    put_u16(&mut out, 56, 1); // e_phnum
    put_u16(&mut out, 58, 64); // e_shentsize

    // PT_LOAD, PF_R | PF_X
    let ph = 64;
    put_u32(&mut out, ph, 1);
    put_u32(&mut out, ph + 4, 5);
    put_u64(&mut out, ph + 8, 0);
    put_u64(&mut out, ph + 16, ELF_BASE);
    put_u64(&mut out, ph + 24, ELF_BASE);
    put_u64(&mut out, ph + 32, code_end as u64);
    put_u64(&mut out, ph + 40, code_end as u64);
    put_u64(&mut out, ph + 48, 0x1000);

    if functions.is_empty() {
        return out;
    }

    // .symtab: null symbol, then one STB_GLOBAL STT_FUNC per function.
    let symtab_off = align(out.len(), 8);
    out.resize(symtab_off, 0);
    let mut strtab = vec![0u8];
    let mut symtab = vec![0u8; 24];
    for f in functions {
        let mut sym = [0u8; 24];
        put_u32(&mut sym, 0, strtab.len() as u32);
        sym[4] = 0x12;
        put_u16(&mut sym, 6, 1); // .text
        put_u64(&mut sym, 8, elf_code_address(f.offset));
        symtab.extend_from_slice(&sym);
        strtab.extend_from_slice(f.name.as_bytes());
        strtab.push(0);
    }
    out.extend_from_slice(&symtab);
    let strtab_off = out.len();
    out.extend_from_slice(&strtab);

    let shstrtab: &[u8] = b"\0.text\0.symtab\0.strtab\0.shstrtab\0";
    let shstrtab_off = out.len();
    out.extend_from_slice(shstrtab);

    let shoff = align(out.len(), 8);
    out.resize(shoff + 5 * 64, 0);
    put_u64(&mut out, 40, shoff as u64);
    put_u16(&mut out, 60, 5); // e_shnum
    put_u16(&mut out, 62, 4); // e_shstrndx

    #[allow(clippy::too_many_arguments)]
    fn section(
        out: &mut [u8],
        at: usize,
        name: u32,
        kind: u32,
        flags: u64,
        addr: u64,
        offset: usize,
        size: usize,
        link: u32,
        info: u32,
        entsize: u64,
    ) {
        put_u32(out, at, name);
        put_u32(out, at + 4, kind);
        put_u64(out, at + 8, flags);
        put_u64(out, at + 16, addr);
        put_u64(out, at + 24, offset as u64);
        put_u64(out, at + 32, size as u64);
        put_u32(out, at + 40, link);
        put_u32(out, at + 44, info);
        put_u64(out, at + 48, 1);
        put_u64(out, at + 56, entsize);
    }

    let sh = |i: usize| shoff + i * 64;
    section(
        &mut out,
        sh(1),
        1,
        1, // SHT_PROGBITS
        0x6, // SHF_ALLOC | SHF_EXECINSTR
        elf_code_address(0),
        code_off,
        code.len(),
        0,
        0,
        0,
    );
    section(&mut out, sh(2), 7, 2, 0, 0, symtab_off, symtab.len(), 3, 1, 24);
    section(&mut out, sh(3), 15, 3, 0, 0, strtab_off, strtab.len(), 0, 0, 0);
    section(&mut out, sh(4), 23, 3, 0, 0, shstrtab_off, shstrtab.len(), 0, 0, 0);
    out
}

/// An x86-64 PE32+ image with `.text` at RVA 0x1000 (entry at its first
/// byte) and `.rdata` at RVA 0x2000.
///
/// `tls_callbacks` are RVAs inside `.text`; when present, a TLS directory
/// and a null-terminated callback array (as VAs) are written to `.rdata`.
pub fn pe64(code: &[u8], tls_callbacks: &[u32]) -> Vec<u8> {
    const FILE_ALIGN: usize = 0x200;
    const TEXT_RAW: usize = 0x200;
    const RDATA_RAW: usize = 0x400;
    assert!(code.len() <= FILE_ALIGN, "code must fit one file page");

    let mut out = vec![0u8; RDATA_RAW + FILE_ALIGN];
    out[0..2].copy_from_slice(b"MZ");
    put_u32(&mut out, 0x3c, 0x40);
    out[0x40..0x44].copy_from_slice(b"PE\0\0");

    let coff = 0x44;
    put_u16(&mut out, coff, 0x8664);
    put_u16(&mut out, coff + 2, 2); // sections
    put_u16(&mut out, coff + 16, 240); // SizeOfOptionalHeader
    put_u16(&mut out, coff + 18, 0x22);

    let opt = coff + 20;
    put_u16(&mut out, opt, 0x20b);
    put_u32(&mut out, opt + 4, FILE_ALIGN as u32); // SizeOfCode
    put_u32(&mut out, opt + 16, PE_TEXT_RVA); // AddressOfEntryPoint
    put_u32(&mut out, opt + 20, PE_TEXT_RVA); // BaseOfCode
    put_u64(&mut out, opt + 24, PE_IMAGE_BASE);
    put_u32(&mut out, opt + 32, 0x1000); // SectionAlignment
    put_u32(&mut out, opt + 36, FILE_ALIGN as u32);
    put_u16(&mut out, opt + 40, 6); // OS version
    put_u16(&mut out, opt + 48, 6); // subsystem version
    put_u32(&mut out, opt + 56, 0x3000); // SizeOfImage
    put_u32(&mut out, opt + 60, FILE_ALIGN as u32); // SizeOfHeaders
    put_u16(&mut out, opt + 68, 3); // console
    put_u64(&mut out, opt + 72, 0x100000);
    put_u64(&mut out, opt + 80, 0x1000);
    put_u64(&mut out, opt + 88, 0x100000);
    put_u64(&mut out, opt + 96, 0x1000);
    put_u32(&mut out, opt + 108, 16); // NumberOfRvaAndSizes

    let sections = opt + 240;
    let text = sections;
    out[text..text + 5].copy_from_slice(b".text");
    put_u32(&mut out, text + 8, FILE_ALIGN as u32);
    put_u32(&mut out, text + 12, PE_TEXT_RVA);
    put_u32(&mut out, text + 16, FILE_ALIGN as u32);
    put_u32(&mut out, text + 20, TEXT_RAW as u32);
    put_u32(&mut out, text + 36, 0x6000_0020); // CODE | EXECUTE | READ

    let rdata = sections + 40;
    out[rdata..rdata + 6].copy_from_slice(b".rdata");
    put_u32(&mut out, rdata + 8, FILE_ALIGN as u32);
    put_u32(&mut out, rdata + 12, PE_RDATA_RVA);
    put_u32(&mut out, rdata + 16, FILE_ALIGN as u32);
    put_u32(&mut out, rdata + 20, RDATA_RAW as u32);
    put_u32(&mut out, rdata + 36, 0x4000_0040); // INITIALIZED_DATA | READ

    out[TEXT_RAW..TEXT_RAW + FILE_ALIGN].fill(0xCC);
    out[TEXT_RAW..TEXT_RAW + code.len()].copy_from_slice(code);

    if !tls_callbacks.is_empty() {
        // TLS directory at .rdata+0, callback array at .rdata+0x40.
        let dir = RDATA_RAW;
        let array_rva = PE_RDATA_RVA as u64 + 0x40;
        put_u64(&mut out, dir + 0x18, PE_IMAGE_BASE + array_rva);
        for (i, cb) in tls_callbacks.iter().enumerate() {
            put_u64(&mut out, dir + 0x40 + i * 8, PE_IMAGE_BASE + *cb as u64);
        }
        // data directory 9: TLS
        put_u32(&mut out, opt + 112 + 9 * 8, PE_RDATA_RVA);
        put_u32(&mut out, opt + 112 + 9 * 8 + 4, 40);
    }
    out
}
