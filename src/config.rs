//! Configuration for the sampler.
//!
//! Centralizes every tunable with sensible defaults. The whole tree is
//! serde-serializable so callers can keep it in a JSON file; missing
//! fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::IOLimits;

/// Master configuration for one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// I/O limits applied when reading from a file.
    pub io: IoConfig,
    /// Upper bound on bytes read for a single executable region (default: 64MB).
    pub max_region_bytes: u64,
    /// Diagnostic entries kept before further ones are only counted (default: 200).
    pub max_issues: usize,
    /// Instructions decoded between progress snapshots (default: 4096).
    pub yield_interval: u64,
    /// Optional global instruction budget; `None` means unbounded.
    pub max_instructions: Option<u64>,
    /// Entries read from one constructor/TLS pointer array (default: 65536).
    pub max_pointer_array_entries: usize,
    /// Entries read from one unwind start-PC table (default: 1048576).
    pub max_unwind_entries: usize,
    /// Caller-supplied seeds, in the container's address domain.
    pub extra_entry_points: Vec<u64>,
    /// Individual seed sources can be switched off.
    pub sources: SeedSourceToggles,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            io: IoConfig::default(),
            max_region_bytes: 64 * 1024 * 1024,
            max_issues: 200,
            yield_interval: 4096,
            max_instructions: None,
            max_pointer_array_entries: 65_536,
            max_unwind_entries: 1 << 20,
            extra_entry_points: Vec::new(),
            sources: SeedSourceToggles::default(),
        }
    }
}

impl SamplerConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Add a caller-supplied entry point.
    pub fn with_entry_point(mut self, address: u64) -> Self {
        self.extra_entry_points.push(address);
        self
    }

    /// Cap the number of decoded instructions.
    pub fn with_max_instructions(mut self, limit: u64) -> Self {
        self.max_instructions = Some(limit);
        self
    }
}

/// I/O configuration for file reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Maximum file size to process (default: 512MB).
    pub max_file_size: u64,
    /// Maximum bytes read from a file across the whole run (default: 1GB).
    pub max_read_bytes: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        let limits = IOLimits::default();
        Self {
            max_file_size: limits.max_file_size,
            max_read_bytes: limits.max_read_bytes,
        }
    }
}

impl From<&IoConfig> for IOLimits {
    fn from(cfg: &IoConfig) -> Self {
        IOLimits {
            max_file_size: cfg.max_file_size,
            max_read_bytes: cfg.max_read_bytes,
        }
    }
}

/// Per-source switches for seed collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSourceToggles {
    pub pointer_arrays: bool,
    pub symbols: bool,
    pub unwind_tables: bool,
    pub extra_entry_points: bool,
}

impl Default for SeedSourceToggles {
    fn default() -> Self {
        Self {
            pointer_arrays: true,
            symbols: true,
            unwind_tables: true,
            extra_entry_points: true,
        }
    }
}
