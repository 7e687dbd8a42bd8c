use isa_sampler::io::IOLimits;
use isa_sampler::{analyze_path, Control, SamplerConfig, SamplerError};

use crate::common::images::elf64;
use crate::common::test_utils::create_temp_file;

#[test]
fn config_file_round_trips_through_disk() {
    let file = create_temp_file(
        br#"{
            "max_instructions": 3,
            "extra_entry_points": [4198400],
            "sources": { "symbols": false }
        }"#,
    );
    let config = SamplerConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.max_instructions, Some(3));
    assert_eq!(config.extra_entry_points, vec![0x401000]);
    assert!(!config.sources.symbols);
    assert!(config.sources.pointer_arrays);
    assert_eq!(config.max_issues, SamplerConfig::default().max_issues);
}

#[test]
fn malformed_config_is_a_config_error() {
    let file = create_temp_file(b"{ not json");
    let err = SamplerConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, SamplerError::Config(_)), "{err}");
}

#[test]
fn file_size_limit_is_enforced() {
    let image = elf64(&[0x90, 0xC3], &[]);
    let file = create_temp_file(&image);
    let mut config = SamplerConfig::default();
    config.io.max_file_size = 16;

    let err = analyze_path(file.path(), &config, &mut Control::default()).unwrap_err();
    assert!(matches!(err, SamplerError::Io(_)), "{err}");
}

#[test]
fn io_limits_follow_config() {
    let config = SamplerConfig::default();
    let limits = IOLimits::from(&config.io);
    assert_eq!(limits.max_file_size, config.io.max_file_size);
    assert_eq!(limits.max_read_bytes, config.io.max_read_bytes);
}

#[test]
fn region_cap_limits_bytes_sampled() {
    let image = elf64(&[0x90; 64], &[]);
    let mut config = SamplerConfig::default();
    config.max_region_bytes = 100;
    let file = create_temp_file(&image);

    let report = analyze_path(file.path(), &config, &mut Control::default()).unwrap();
    assert_eq!(report.bytes_sampled, 100);
}
