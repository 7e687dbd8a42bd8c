//! Common test utilities and helpers.
//!
//! Synthetic images live in [`images`]; real binaries under `samples/` are
//! optional and tests that use them skip when absent.

#![allow(dead_code)]

pub mod images;

use std::path::{Path, PathBuf};

/// Test helper for checking if sample files exist
pub fn sample_file_exists<P: AsRef<Path>>(relative_path: P) -> bool {
    sample_file_path(relative_path).exists()
}

/// Get the full path to a sample file
pub fn sample_file_path<P: AsRef<Path>>(relative_path: P) -> PathBuf {
    Path::new("samples").join(relative_path)
}

/// Paths of optional real-world samples, relative to `samples/`.
pub mod test_data {
    /// Sample ELF file (GCC compiled)
    pub const SAMPLE_ELF_GCC: &str =
        "binaries/platforms/linux/amd64/export/native/gcc/O0/hello-gcc-O0";

    /// Sample ELF file (Clang compiled)
    pub const SAMPLE_ELF_CLANG: &str =
        "binaries/platforms/linux/amd64/export/native/clang/O0/hello-clang-O0";

    /// Sample PE file (MinGW cross-compiled)
    pub const SAMPLE_PE_EXE: &str =
        "binaries/platforms/linux/amd64/export/cross/windows-x86_64/hello-c-x86_64-mingw.exe";
}
