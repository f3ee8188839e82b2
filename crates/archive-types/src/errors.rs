//! Error types shared across the archive-reading crates.
//!
//! Two error classes, matching the two failure kinds a request against an
//! archive can hit: `ArchiveError` covers the one boundary where a caller
//! should get a `Result` back (opening an archive that doesn't exist on
//! disk), while every other fatal condition (out of memory, a missing
//! required metadata key, an unsupported byte order, a zero row size) stays
//! a process abort via `panic!` at the point it's detected, not a variant
//! here. Query failures (signal not found, zero samples) are never errors at
//! all — they're `Option::None`.

use thiserror::Error;

/// Errors returned when opening an archive (`vdyn_archive::Archive::open`)
/// whose sidecar or binary file itself cannot be located or read. Does not
/// cover malformed archive
/// contents, which are unrecoverable programmer/environment errors and
/// abort the process per the fail-fast policy documented on the extractor.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("sidecar metadata file not found: {path}")]
    SidecarNotFound { path: String },

    #[error("binary data file not found: {path}")]
    BinaryNotFound { path: String },

    #[error("I/O error reading archive: {0}")]
    Io(#[from] std::io::Error),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
