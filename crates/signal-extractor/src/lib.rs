//! Metadata binding, binary mapping, and columnar signal extraction for the
//! vehicle-dynamics archive format.
//!
//! [`binding::SignalSchema::bind`] projects a parsed sidecar
//! ([`vdyn_info_parser::KvTable`]) onto an ordered signal schema and row
//! layout. [`mapper::BinaryMapper`] memory-maps the binary data file and
//! exposes its post-header data region. [`extractor::get_signal`] and
//! [`extractor::get_signal_as_double`] turn a signal name into a fresh typed
//! (or f64-widened) column, using [`vdyn_simd`]'s strided gather kernels and
//! optionally a [`vdyn_worker_pool::WorkerPool`] for multi-threaded
//! extraction.

pub mod binding;
pub mod extractor;
pub mod mapper;

pub use binding::SignalSchema;
pub use extractor::{
    get_signal, get_signal_as_double, get_signal_as_double_with_level, get_signal_with_level,
    Column, MIN_SAMPLES_PER_THREAD,
};
pub use mapper::{BinaryMapper, HEADER_SIZE};
