#![no_main]
use isa_sampler::{analyze_bytes, Control, SamplerConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let config = SamplerConfig::default().with_max_instructions(100_000);
    let _ = analyze_bytes(data, &config, &mut Control::default());
});
