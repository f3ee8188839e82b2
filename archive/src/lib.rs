//! Public facade over the vehicle-dynamics archive format: open an archive
//! (sidecar + binary data file pair), enumerate its signal schema, and
//! extract any signal as a typed column or as scaled `f64`s.
//!
//! A thin `pub mod archive; pub use archive::Archive;` re-export: all the
//! real engineering lives in `vdyn-info-parser` and `vdyn-signal-extractor`;
//! this crate only wires them together behind one owning handle and decides
//! the single policy call left up to the facade layer — `open()` returns a
//! `Result` instead of aborting on a missing file (see [`ArchiveError`]).

pub mod archive;

pub use archive::Archive;
pub use vdyn_archive_types::{ArchiveError, ArchiveResult, RowLayout, Signal, SignalType};
pub use vdyn_signal_extractor::Column;
pub use vdyn_simd::SimdLevel;
pub use vdyn_worker_pool::WorkerPool;
