//! The archive handle itself: owns the bound signal schema and the mapped
//! binary data file for one `<path>` / `<path>.info` pair, and exposes the
//! read operations on top of them.

use std::path::{Path, PathBuf};

use vdyn_archive_types::{ArchiveError, ArchiveResult, Signal};
use vdyn_arena::DualArena;
use vdyn_info_parser::InfoParser;
use vdyn_signal_extractor::{
    get_signal_as_double_with_level, get_signal_with_level, BinaryMapper, Column, SignalSchema,
};
use vdyn_simd::SimdLevel;
use vdyn_worker_pool::WorkerPool;

/// An open vehicle-dynamics archive: a bound signal schema plus a
/// memory-mapped binary data file.
///
/// `name`-based accessors resolve the requested column by scanning the
/// schema (`O(signal count)`, at most once per call) and gather samples out
/// of the mapping fresh on every call — there is no decoded-column cache.
pub struct Archive {
    schema: SignalSchema,
    mapper: BinaryMapper,
    path: PathBuf,
    simd_level: SimdLevel,
}

impl Archive {
    /// Open the archive at `path`: read and parse `<path>.info` (the
    /// sidecar), bind it to a signal schema, and memory-map `<path>` (the
    /// binary data file) using the schema's derived row size.
    ///
    /// Unlike binding and mapping themselves, which fail fast with a
    /// `panic!` on a malformed archive, the two files' mere existence is a
    /// caller-recoverable condition: a typo'd path or a run that hasn't
    /// finished writing yet shouldn't abort the process, so those two
    /// lookups are the one boundary this facade turns into a `Result`.
    pub fn open<P: AsRef<Path>>(path: P) -> ArchiveResult<Archive> {
        Self::open_with_simd_level_inner(path, None)
    }

    /// Like [`Archive::open`], but pins every subsequent extraction to an
    /// explicit SIMD level instead of the process-wide detected one.
    /// Exists for tests that need to exercise a specific kernel
    /// (`SimdLevel::None`/`Sse2`/`Avx2`) regardless of the host CPU.
    pub fn open_with_simd_level<P: AsRef<Path>>(
        path: P,
        level: SimdLevel,
    ) -> ArchiveResult<Archive> {
        Self::open_with_simd_level_inner(path, Some(level))
    }

    fn open_with_simd_level_inner<P: AsRef<Path>>(
        path: P,
        level: Option<SimdLevel>,
    ) -> ArchiveResult<Archive> {
        let path = path.as_ref();
        let sidecar_path = sidecar_path_for(path);

        let text = std::fs::read(&sidecar_path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::SidecarNotFound {
                    path: sidecar_path.display().to_string(),
                }
            } else {
                ArchiveError::Io(err)
            }
        })?;

        // The arena backing the parsed key/value table only needs to live
        // long enough for `SignalSchema::bind` to copy everything it keeps
        // (every `Signal` field is an owned `String`/primitive) into the
        // schema; it can drop here rather than being carried inside
        // `Archive`. Pre-sized per the parser's own F/3 key-bytes,
        // 5F/3 value-bytes heuristic.
        let key_capacity = (text.len() / 3).max(64);
        let value_capacity = (text.len() * 5 / 3).max(64);
        let arena = DualArena::new(key_capacity, value_capacity);
        let table = InfoParser::parse(&arena, &text);
        let schema = SignalSchema::bind(&table);

        let mapper = match BinaryMapper::open(path, schema.layout.row_size) {
            Ok(mapper) => mapper,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::BinaryNotFound {
                    path: path.display().to_string(),
                });
            }
            Err(err) => return Err(ArchiveError::Io(err)),
        };

        let simd_level = level.unwrap_or_else(SimdLevel::current);
        tracing::info!(
            path = %path.display(),
            signal_count = schema.signals.len(),
            row_size = schema.layout.row_size,
            sample_count = mapper.sample_count(),
            simd_level = ?simd_level,
            "opened archive"
        );

        Ok(Archive {
            schema,
            mapper,
            path: path.to_path_buf(),
            simd_level,
        })
    }

    /// The schema row for `name`, or `None` if the archive has no such
    /// signal.
    pub fn signal_info(&self, name: &str) -> Option<&Signal> {
        self.schema.get(name)
    }

    /// Every signal in the archive, in declaration order.
    pub fn signals(&self) -> &[Signal] {
        &self.schema.signals
    }

    /// Number of rows (samples per signal) in the archive's data region.
    pub fn row_count(&self) -> u64 {
        self.mapper.sample_count()
    }

    /// Size in bytes of one row, per the bound schema.
    pub fn row_size(&self) -> usize {
        self.schema.layout.row_size
    }

    /// The SIMD level extraction calls on this archive dispatch through —
    /// either the process-wide detected level, or whatever
    /// [`Archive::open_with_simd_level`] pinned at open time.
    pub fn simd_level(&self) -> SimdLevel {
        self.simd_level
    }

    /// Extract `name` as a column in its native on-disk type, serially on
    /// the calling thread. Returns `None` if `name` is not a signal in this
    /// archive, or the archive has zero samples.
    pub fn get_signal(&self, name: &str) -> Option<Column> {
        get_signal_with_level(&self.schema, &self.mapper, name, None, Some(self.simd_level))
    }

    /// Like [`Archive::get_signal`], but partitions the gather across
    /// `pool` when the sample count clears the parallel threshold.
    pub fn get_signal_parallel(&self, name: &str, pool: &mut WorkerPool) -> Option<Column> {
        get_signal_with_level(
            &self.schema,
            &self.mapper,
            name,
            Some(pool),
            Some(self.simd_level),
        )
    }

    /// Extract `name` widened to `f64` with scaling applied in floating
    /// point. `None` for an unknown name, zero samples, or a signal with no
    /// arithmetic representation (`Bytes`/`Unknown`).
    pub fn get_signal_as_double(&self, name: &str) -> Option<Vec<f64>> {
        get_signal_as_double_with_level(
            &self.schema,
            &self.mapper,
            name,
            None,
            Some(self.simd_level),
        )
    }

    /// Like [`Archive::get_signal_as_double`], partitioned across `pool`.
    pub fn get_signal_as_double_parallel(
        &self,
        name: &str,
        pool: &mut WorkerPool,
    ) -> Option<Vec<f64>> {
        get_signal_as_double_with_level(
            &self.schema,
            &self.mapper,
            name,
            Some(pool),
            Some(self.simd_level),
        )
    }

    /// Release the archive. The memory mapping and schema are dropped here;
    /// calling this explicitly is equivalent to letting the `Archive` go
    /// out of scope, but gives callers a point to log the close at.
    pub fn close(self) {
        tracing::info!(path = %self.path.display(), "closed archive");
    }
}

fn sidecar_path_for(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".info");
    PathBuf::from(sidecar)
}
