//! Opens the binary data file read-only and memory-maps it. The
//! first [`HEADER_SIZE`] bytes are an opaque header; everything past that is
//! the row-major data region this crate's extractor gathers columns out of.
//!
//! Mapping beats a bulk read here because sidecar metadata may describe
//! hundreds of columns and a typical request only decodes a handful of
//! them — strided access naturally interleaves page touches across
//! columns, which the OS pager already serves well, unlike reading the
//! whole file up front.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Size, in bytes, of the opaque header preceding the first row.
pub const HEADER_SIZE: usize = 16;

/// A read-only memory-mapped binary data file, truncated to the largest
/// whole-row prefix of its post-header data region.
pub struct BinaryMapper {
    mmap: Mmap,
    sample_count: u64,
}

impl BinaryMapper {
    /// Open `path` read-only and map it into the address space. `row_size`
    /// must already be known (derived from [`crate::SignalSchema::bind`])
    /// so the sample count can be computed without a second pass over the
    /// file.
    ///
    /// If `file_size - HEADER_SIZE` is not a multiple of `row_size`, a
    /// warning is logged and the sample count is the floor of the
    /// division — the trailing partial row is simply never read.
    pub fn open<P: AsRef<Path>>(path: P, row_size: usize) -> std::io::Result<BinaryMapper> {
        assert!(
            row_size > 0,
            "row_size must be nonzero before mapping a binary file (call SignalSchema::bind first)"
        );

        let path = path.as_ref();
        let file = File::open(path)?;
        // Safety: the archive is treated as immutable for the lifetime of
        // the mapping; concurrent external writers are out of scope (the
        // on-disk format is a finished simulation output, never written to
        // while being read).
        let mmap = unsafe { Mmap::map(&file)? };

        let file_size = mmap.len();
        let data_size = file_size.saturating_sub(HEADER_SIZE);
        let sample_count = (data_size / row_size) as u64;
        let remainder = data_size % row_size;
        if remainder != 0 {
            tracing::warn!(
                path = %path.display(),
                file_size,
                row_size,
                remainder,
                "data region size is not a multiple of row_size; truncating to the largest \
                 whole-row prefix"
            );
        }

        Ok(BinaryMapper { mmap, sample_count })
    }

    /// The post-header data region: `file_size - HEADER_SIZE` bytes (zero
    /// if the file is smaller than the header).
    pub fn data(&self) -> &[u8] {
        let start = HEADER_SIZE.min(self.mmap.len());
        &self.mmap[start..]
    }

    /// Number of whole rows in the data region.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}
