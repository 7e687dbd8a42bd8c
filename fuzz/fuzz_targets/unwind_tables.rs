#![no_main]
use isa_sampler::container::Endianness;
use isa_sampler::sampler::unwind::{eh_frame_hdr_starts, runtime_function_starts};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = eh_frame_hdr_starts(data, 0x1000, Endianness::Little, 8, 4096);
    let _ = eh_frame_hdr_starts(data, 0x1000, Endianness::Big, 4, 4096);
    let _ = runtime_function_starts(data, 4096);
});
