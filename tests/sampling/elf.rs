use isa_sampler::sampler::TraversalOutcome;
use isa_sampler::{analyze_bytes, analyze_path, Control, ContainerFormat, SamplerConfig};

use crate::common::images::{elf64, elf_code_address, ElfFunction, ELF_CODE_OFFSET};
use crate::common::test_utils::create_temp_file;

/// `call f1; pxor; ret` at the entry, `f1: vzeroupper; ret`, and an
/// `aesenc; ret` body only a symbol points at.
fn code() -> Vec<u8> {
    let mut code = vec![0xCC; 0x1a];
    code[0x00..0x05].copy_from_slice(&[0xE8, 0x0B, 0x00, 0x00, 0x00]); // call +0x0b
    code[0x05..0x09].copy_from_slice(&[0x66, 0x0F, 0xEF, 0xC0]); // pxor xmm0, xmm0
    code[0x09] = 0xC3;
    code[0x10..0x13].copy_from_slice(&[0xC5, 0xF8, 0x77]); // vzeroupper
    code[0x13] = 0xC3;
    code[0x14..0x19].copy_from_slice(&[0x66, 0x0F, 0x38, 0xDC, 0xC1]); // aesenc xmm0, xmm1
    code[0x19] = 0xC3;
    code
}

#[test]
fn entry_point_reaches_called_function() {
    let image = elf64(&code(), &[]);
    let report = analyze_bytes(&image, &SamplerConfig::default(), &mut Control::default()).unwrap();

    assert_eq!(report.format, Some(ContainerFormat::Elf));
    assert_eq!(report.bitness, 64);
    assert_eq!(report.outcome, TraversalOutcome::Completed);
    // call, pxor, ret, vzeroupper, ret
    assert_eq!(report.instruction_count, 5);
    assert_eq!(report.invalid_instruction_count, 0);
    assert_eq!(report.bytes_decoded, 5 + 4 + 1 + 3 + 1);
    assert_eq!(report.bytes_sampled, ELF_CODE_OFFSET + 0x1a);
    assert!(report.feature_usage.contains_key("SSE2"));
    assert!(report.feature_usage.contains_key("AVX"));
    // the aesenc body is unreachable without its symbol
    assert!(!report.feature_usage.contains_key("AES"));
    assert_eq!(report.seed_summary.accepted, 1);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
}

#[test]
fn function_symbols_seed_unreachable_code() {
    let functions = [
        ElfFunction { name: "main", offset: 0 },
        ElfFunction { name: "encrypt", offset: 0x14 },
    ];
    let image = elf64(&code(), &functions);
    let report = analyze_bytes(&image, &SamplerConfig::default(), &mut Control::default()).unwrap();

    assert_eq!(report.instruction_count, 7);
    assert_eq!(report.feature_usage.get("AES"), Some(&1));

    let symtab = report.seed_summary.source(".symtab").unwrap();
    assert_eq!(symtab.candidates, 2);
    assert_eq!(symtab.added, 1);
    assert_eq!(symtab.skipped_duplicate, 1);
    assert_eq!(report.seed_summary.accepted, 2);
}

#[test]
fn disabled_symbol_source_is_not_consulted() {
    let functions = [ElfFunction { name: "encrypt", offset: 0x14 }];
    let image = elf64(&code(), &functions);
    let mut config = SamplerConfig::default();
    config.sources.symbols = false;
    let report = analyze_bytes(&image, &config, &mut Control::default()).unwrap();

    assert_eq!(report.instruction_count, 5);
    assert!(report.seed_summary.source(".symtab").is_none());
}

#[test]
fn extra_entry_points_are_honoured() {
    let image = elf64(&code(), &[]);
    let config = SamplerConfig::default().with_entry_point(elf_code_address(0x14));
    let report = analyze_bytes(&image, &config, &mut Control::default()).unwrap();

    assert_eq!(report.instruction_count, 7);
    let extra = report.seed_summary.source("extra_entry_points").unwrap();
    assert_eq!(extra.added, 1);
}

#[test]
fn extra_entry_outside_code_is_skipped() {
    let image = elf64(&code(), &[]);
    let config = SamplerConfig::default().with_entry_point(0xdead_0000);
    let report = analyze_bytes(&image, &config, &mut Control::default()).unwrap();

    let extra = report.seed_summary.source("extra_entry_points").unwrap();
    assert_eq!(extra.added, 0);
    assert_eq!(extra.skipped_not_executable, 1);
    assert_eq!(report.instruction_count, 5);
}

#[test]
fn instruction_budget_yields_partial_report() {
    let image = elf64(&code(), &[]);
    let config = SamplerConfig::default().with_max_instructions(2);
    let report = analyze_bytes(&image, &config, &mut Control::default()).unwrap();

    assert_eq!(report.instruction_count, 2);
    assert_eq!(report.outcome, TraversalOutcome::BudgetExhausted);
    assert!(report.is_partial());
}

#[test]
fn progress_observer_sees_running_totals() {
    let image = elf64(&code(), &[]);
    let mut config = SamplerConfig::default();
    config.yield_interval = 1;
    let mut seen = Vec::new();
    let mut observer = |s: &isa_sampler::sampler::ProgressSnapshot| seen.push(s.instruction_count);
    let report = {
        let mut control = Control::new().with_observer(&mut observer);
        analyze_bytes(&image, &config, &mut control).unwrap()
    };
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert_eq!(report.instruction_count, 5);
}

#[test]
fn same_file_gives_identical_reports() {
    let functions = [ElfFunction { name: "encrypt", offset: 0x14 }];
    let image = elf64(&code(), &functions);
    let file = create_temp_file(&image);

    let config = SamplerConfig::default();
    let a = analyze_path(file.path(), &config, &mut Control::default()).unwrap();
    let b = analyze_path(file.path(), &config, &mut Control::default()).unwrap();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());

    let from_memory = analyze_bytes(&image, &config, &mut Control::default()).unwrap();
    assert_eq!(a.to_json().unwrap(), from_memory.to_json().unwrap());
}

#[test]
fn report_serializes_feature_counts() {
    let image = elf64(&code(), &[]);
    let report = analyze_bytes(&image, &SamplerConfig::default(), &mut Control::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(value["instruction_count"], 5);
    assert_eq!(value["feature_usage"]["AVX"], 1);
    assert!(value["seed_summary"]["sources"].is_array());
}

#[test]
fn truncated_image_is_rejected_or_degrades() {
    let image = elf64(&code(), &[]);
    // Headers intact, code cut off: the segment reads short.
    let cut = &image[..ELF_CODE_OFFSET as usize + 4];
    match analyze_bytes(cut, &SamplerConfig::default(), &mut Control::default()) {
        Ok(report) => assert!(report.bytes_sampled < ELF_CODE_OFFSET + 0x1a),
        Err(e) => assert!(matches!(e, isa_sampler::SamplerError::InvalidFormat(_)), "{e}"),
    }
}

#[test]
fn entry_point_seeds_even_with_every_source_disabled() {
    let functions = [ElfFunction { name: "encrypt", offset: 0x14 }];
    let image = elf64(&code(), &functions);
    let mut config = SamplerConfig::default().with_entry_point(elf_code_address(0x14));
    config.sources.pointer_arrays = false;
    config.sources.symbols = false;
    config.sources.unwind_tables = false;
    config.sources.extra_entry_points = false;
    let report = analyze_bytes(&image, &config, &mut Control::default()).unwrap();

    assert_eq!(report.seed_summary.accepted, 1);
    assert_eq!(report.seed_summary.source("entry_point").map(|s| s.added), Some(1));
    assert_eq!(report.instruction_count, 5);
}
