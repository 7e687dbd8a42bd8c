//! Bounded file access for the sampler.
//!
//! The sampler never assumes the whole input fits in memory: it asks a
//! [`ByteSource`] for the windows it needs (executable regions, pointer
//! arrays, unwind tables). [`SafeReader`] serves those windows from a
//! read-only memory map while enforcing [`IOLimits`]; [`MemorySource`]
//! serves them from a buffer the caller already holds.

pub mod error;

use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Random access to the bytes of one input file.
///
/// Reads that run past the end of the file are truncated, not rejected;
/// a read starting at or beyond EOF returns an empty buffer.
pub trait ByteSource {
    /// Total size of the input in bytes.
    fn size(&self) -> u64;

    /// Read up to `len` bytes starting at `start`.
    fn read_range(&mut self, start: u64, len: u64) -> Result<Bytes>;
}

/// Defines the resource limits for I/O operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
    /// The maximum total number of bytes that can be read from the file across all operations.
    pub max_read_bytes: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024,   // 512MB
            max_read_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// A memory-mapped, budgeted file reader.
pub struct SafeReader {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    limits: IOLimits,
    bytes_read: u64,
    file_size: u64,
}

impl SafeReader {
    /// Opens a file and memory-maps it.
    ///
    /// Fails if the file size exceeds `limits.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, limits: IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening file for sampling"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only mapping of a regular file opened above.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            limits,
            bytes_read: 0,
            file_size,
        })
    }

    /// Returns the total number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Returns the `IOLimits` enforced by this reader.
    pub fn limits(&self) -> &IOLimits {
        &self.limits
    }

    /// Borrow the whole mapping, used to hand the container parser its input.
    ///
    /// Not counted against the read budget: the parser only touches headers
    /// and tables, and the mapping is shared rather than copied.
    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl ByteSource for SafeReader {
    fn size(&self) -> u64 {
        self.file_size
    }

    fn read_range(&mut self, start: u64, len: u64) -> Result<Bytes> {
        let map = match &self.mmap {
            Some(m) => m,
            None => return Ok(Bytes::new()),
        };
        let (offset, end) = clamp_range(start, len, map.len())?;
        if offset >= end {
            return Ok(Bytes::new());
        }
        let actual_len = (end - offset) as u64;

        if self.bytes_read.saturating_add(actual_len) > self.limits.max_read_bytes {
            warn!(
                path = %self.path.display(),
                current_read = self.bytes_read,
                requested = actual_len,
                limit = self.limits.max_read_bytes,
                "Read limit exceeded"
            );
            return Err(IoError::ReadLimitExceeded {
                limit: self.limits.max_read_bytes,
                current: self.bytes_read,
            });
        }

        let out = Bytes::copy_from_slice(&map[offset..end]);
        self.bytes_read += actual_len;

        trace!(
            path = %self.path.display(),
            offset,
            len = actual_len,
            total_read = self.bytes_read,
            "Performed read"
        );

        Ok(out)
    }
}

/// A [`ByteSource`] over bytes already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&mut self, start: u64, len: u64) -> Result<Bytes> {
        let (offset, end) = clamp_range(start, len, self.data.len())?;
        if offset >= end {
            return Ok(Bytes::new());
        }
        Ok(self.data.slice(offset..end))
    }
}

/// Convert a `(start, len)` request into a `[offset, end)` pair bounded by `available`.
fn clamp_range(start: u64, len: u64, available: usize) -> Result<(usize, usize)> {
    let offset = usize::try_from(start).map_err(|_| IoError::OutOfBounds { start, len })?;
    let len_usize = usize::try_from(len).unwrap_or(usize::MAX);
    if offset >= available {
        return Ok((available, available));
    }
    let end = offset.saturating_add(len_usize).min(available);
    Ok((offset, end))
}
