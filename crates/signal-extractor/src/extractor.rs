//! Turns a signal name into a freshly allocated typed column: locate
//! the column's offset and width in the schema, gather every sample via
//! [`vdyn_simd::gather::gather_column`] (optionally partitioned across a
//! [`WorkerPool`]), then apply the signal's `factor`/`offset` scaling.
//!
//! Extraction is a pure transform of immutable inputs (the schema, the
//! mapped bytes) to a fresh owned buffer — there is no state machine and no
//! mutation of anything the caller didn't just allocate.

use vdyn_archive_types::{Signal, SignalType};
use vdyn_simd::gather::gather_column;
use vdyn_simd::SimdLevel;
use vdyn_worker_pool::WorkerPool;

use crate::binding::SignalSchema;
use crate::mapper::BinaryMapper;

/// Below this sample count, extraction always runs serially on the calling
/// thread — partitioning and synchronizing a worker pool costs more than a
/// tight scalar/SIMD loop saves at small sample counts.
pub const MIN_SAMPLES_PER_THREAD: usize = 10_000;

/// Upper bound on how many workers a single extraction fans out across,
/// regardless of pool size.
const MAX_PARALLEL_WORKERS: usize = 2;

/// A freshly extracted signal column, in the signal's native on-disk type.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    /// An opaque `<n>`-byte-wide blob column (or an unrecognized type
    /// token, `element_size == 0`). Never arithmetically scaled.
    Bytes { element_size: usize, data: Vec<u8> },
}

impl Column {
    /// Number of samples in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::F32(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::I8(v) => v.len(),
            Column::U8(v) => v.len(),
            Column::I16(v) => v.len(),
            Column::U16(v) => v.len(),
            Column::I32(v) => v.len(),
            Column::U32(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::U64(v) => v.len(),
            Column::Bytes { element_size, data } => {
                if *element_size == 0 {
                    0
                } else {
                    data.len() / element_size
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve `name` to a signal, gather every sample into a fresh buffer of
/// the signal's native type, and apply scaling in that native type (the
/// quirk documented on [`apply_scaling`]). Returns `None` if `name` is not
/// in the schema or the archive has zero samples — both are query
/// failures, not errors.
pub fn get_signal(
    schema: &SignalSchema,
    mapper: &BinaryMapper,
    name: &str,
    pool: Option<&mut WorkerPool>,
) -> Option<Column> {
    get_signal_with_level(schema, mapper, name, pool, None)
}

/// Like [`get_signal`], but with an explicit [`SimdLevel`] override instead
/// of the process-wide detected level — the facade's test-only
/// `Archive::open_with_simd_level` path threads its override through here.
pub fn get_signal_with_level(
    schema: &SignalSchema,
    mapper: &BinaryMapper,
    name: &str,
    pool: Option<&mut WorkerPool>,
    level: Option<SimdLevel>,
) -> Option<Column> {
    let (signal, raw) = gather_raw(schema, mapper, name, pool, level)?;
    let mut column = to_typed_column(signal.signal_type, raw);
    if signal.needs_scaling() {
        apply_scaling(&mut column, signal.factor, signal.offset);
    }
    Some(column)
}

/// Like [`get_signal`], but widens every sample to `f64` and applies
/// scaling in floating point rather than in the signal's native type —
/// unlike [`get_signal`], this never truncates, even for integer columns
/// with a fractional `factor`/`offset`.
///
/// A `Bytes`/`Unknown`-typed signal has no arithmetic representation and
/// returns `None` here (it is still reachable via [`get_signal`] as a raw
/// blob).
pub fn get_signal_as_double(
    schema: &SignalSchema,
    mapper: &BinaryMapper,
    name: &str,
    pool: Option<&mut WorkerPool>,
) -> Option<Vec<f64>> {
    get_signal_as_double_with_level(schema, mapper, name, pool, None)
}

/// Like [`get_signal_as_double`], but with an explicit [`SimdLevel`]
/// override. See [`get_signal_with_level`].
pub fn get_signal_as_double_with_level(
    schema: &SignalSchema,
    mapper: &BinaryMapper,
    name: &str,
    pool: Option<&mut WorkerPool>,
    level: Option<SimdLevel>,
) -> Option<Vec<f64>> {
    let (signal, raw) = gather_raw(schema, mapper, name, pool, level)?;
    if matches!(signal.signal_type, SignalType::Bytes(_) | SignalType::Unknown) {
        tracing::warn!(
            signal = %name,
            "signal has no arithmetic representation; get_signal_as_double returns none"
        );
        return None;
    }

    let column = to_typed_column(signal.signal_type, raw);
    let mut widened = widen_to_f64(&column);
    for x in widened.iter_mut() {
        *x = *x * signal.factor + signal.offset;
    }
    Some(widened)
}

/// Shared prefix of both entry points: resolve the signal, bail out on a
/// missing name or zero samples, and gather the raw little-endian bytes
/// for every sample of that column.
fn gather_raw<'s>(
    schema: &'s SignalSchema,
    mapper: &BinaryMapper,
    name: &str,
    pool: Option<&mut WorkerPool>,
    level: Option<SimdLevel>,
) -> Option<(&'s Signal, Vec<u8>)> {
    let index = schema.find(name)?;
    let signal = &schema.signals[index];

    let sample_count = mapper.sample_count();
    if sample_count == 0 {
        return None;
    }
    let count = sample_count as usize;
    let element_size = signal.type_size;
    let stride = schema.layout.row_size;
    let column_offset = schema.layout.column_offsets[index];

    let mut raw = vec![0u8; count * element_size];
    let level = level.unwrap_or_else(SimdLevel::current);
    dispatch_gather(
        pool,
        level,
        mapper.data(),
        stride,
        column_offset,
        element_size,
        count,
        &mut raw,
    );

    Some((signal, raw))
}

#[allow(clippy::too_many_arguments)]
fn dispatch_gather(
    pool: Option<&mut WorkerPool>,
    level: SimdLevel,
    src: &[u8],
    stride: usize,
    column_offset: usize,
    element_size: usize,
    count: usize,
    dst: &mut [u8],
) {
    match pool {
        Some(pool) if count >= MIN_SAMPLES_PER_THREAD && pool.size() > 1 => {
            let workers = pool.size().min(MAX_PARALLEL_WORKERS);
            tracing::debug!(count, workers, "extracting signal in parallel");
            extract_parallel(pool, level, src, stride, column_offset, element_size, count, dst);
        }
        _ => {
            tracing::debug!(count, "extracting signal serially");
            gather_column(level, src, stride, column_offset, element_size, count, dst);
        }
    }
}

/// Partition `count` samples contiguously across up to
/// [`MAX_PARALLEL_WORKERS`] workers (work item *i* pinned to worker *i*, no
/// stealing) and gather each partition's disjoint slice of `dst`
/// concurrently.
#[allow(clippy::too_many_arguments)]
fn extract_parallel(
    pool: &mut WorkerPool,
    level: SimdLevel,
    src: &[u8],
    stride: usize,
    column_offset: usize,
    element_size: usize,
    count: usize,
    dst: &mut [u8],
) {
    let t = pool.size().min(MAX_PARALLEL_WORKERS).max(1);
    if t <= 1 {
        gather_column(level, src, stride, column_offset, element_size, count, dst);
        return;
    }

    let per = count / t;
    let mut ranges = Vec::with_capacity(t);
    let mut start = 0usize;
    for i in 0..t {
        let len = if i == t - 1 { count - start } else { per };
        ranges.push((start, len));
        start += len;
    }

    let mut slices: Vec<&mut [u8]> = Vec::with_capacity(t);
    let mut rest = dst;
    for &(_, len) in &ranges {
        let (head, tail) = rest.split_at_mut(len * element_size);
        slices.push(head);
        rest = tail;
    }

    let jobs: Vec<Box<dyn FnOnce() + Send + '_>> = slices
        .into_iter()
        .zip(ranges.iter())
        .map(|(slice, &(row_start, len))| -> Box<dyn FnOnce() + Send + '_> {
            Box::new(move || {
                gather_column(
                    level,
                    src,
                    stride,
                    column_offset + row_start * stride,
                    element_size,
                    len,
                    slice,
                );
            })
        })
        .collect();

    // Safety: `wait()` is called before this function returns, and no job
    // closure is touched afterward — every closure only borrows `src` and
    // its own disjoint slice of `dst`, both of which outlive the call.
    unsafe { pool.submit(jobs) };
    pool.wait();
}

fn to_typed_column(signal_type: SignalType, raw: Vec<u8>) -> Column {
    match signal_type {
        SignalType::F32 => Column::F32(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::F64 => Column::F64(
            raw.chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::I8 => Column::I8(raw.iter().map(|&b| b as i8).collect()),
        SignalType::U8 => Column::U8(raw),
        SignalType::I16 => Column::I16(
            raw.chunks_exact(2)
                .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::U16 => Column::U16(
            raw.chunks_exact(2)
                .map(|c| u16::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::I32 => Column::I32(
            raw.chunks_exact(4)
                .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::U32 => Column::U32(
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::I64 => Column::I64(
            raw.chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::U64 => Column::U64(
            raw.chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        SignalType::Bytes(n) => Column::Bytes {
            element_size: n as usize,
            data: raw,
        },
        SignalType::Unknown => Column::Bytes {
            element_size: 0,
            data: raw,
        },
    }
}

/// Applies `out[i] <- out[i] * factor_native + offset_native` in the
/// column's native numeric type, where `factor_native`/`offset_native` are
/// `factor`/`offset` cast to that type first.
///
/// For integer columns this truncates any fractional part of a non-integral
/// `factor`/`offset` *before* the multiply-add runs, and the multiply-add
/// itself wraps on overflow rather than panicking. This is a known quirk of
/// casting the scale/offset into the column's own integer type ahead of
/// time, kept as documented, intentional behavior rather than "fixed"
/// silently — a caller who needs non-truncating scaling on an integer
/// column should use [`get_signal_as_double`] instead.
fn apply_scaling(column: &mut Column, factor: f64, offset: f64) {
    match column {
        Column::F32(v) => {
            let f = factor as f32;
            let o = offset as f32;
            for x in v.iter_mut() {
                *x = *x * f + o;
            }
        }
        Column::F64(v) => {
            for x in v.iter_mut() {
                *x = *x * factor + offset;
            }
        }
        Column::I8(v) => {
            let f = factor as i8;
            let o = offset as i8;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::U8(v) => {
            let f = factor as u8;
            let o = offset as u8;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::I16(v) => {
            let f = factor as i16;
            let o = offset as i16;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::U16(v) => {
            let f = factor as u16;
            let o = offset as u16;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::I32(v) => {
            let f = factor as i32;
            let o = offset as i32;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::U32(v) => {
            let f = factor as u32;
            let o = offset as u32;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::I64(v) => {
            let f = factor as i64;
            let o = offset as i64;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::U64(v) => {
            let f = factor as u64;
            let o = offset as u64;
            for x in v.iter_mut() {
                *x = x.wrapping_mul(f).wrapping_add(o);
            }
        }
        Column::Bytes { .. } => {}
    }
}

fn widen_to_f64(column: &Column) -> Vec<f64> {
    match column {
        Column::F32(v) => v.iter().map(|&x| x as f64).collect(),
        Column::F64(v) => v.clone(),
        Column::I8(v) => v.iter().map(|&x| x as f64).collect(),
        Column::U8(v) => v.iter().map(|&x| x as f64).collect(),
        Column::I16(v) => v.iter().map(|&x| x as f64).collect(),
        Column::U16(v) => v.iter().map(|&x| x as f64).collect(),
        Column::I32(v) => v.iter().map(|&x| x as f64).collect(),
        Column::U32(v) => v.iter().map(|&x| x as f64).collect(),
        Column::I64(v) => v.iter().map(|&x| x as f64).collect(),
        Column::U64(v) => v.iter().map(|&x| x as f64).collect(),
        Column::Bytes { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdyn_arena::DualArena;
    use vdyn_info_parser::InfoParser;
    use vdyn_worker_pool::WorkerPool;

    fn build(sidecar: &str, rows: &[u8]) -> (DualArena, SignalSchema, tempfile::TempDir, std::path::PathBuf) {
        let arena = DualArena::new(256, 256);
        let schema;
        {
            let table = InfoParser::parse(&arena, sidecar.as_bytes());
            schema = SignalSchema::bind(&table);
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.bin");
        let mut bytes = vec![0u8; crate::mapper::HEADER_SIZE];
        bytes.extend_from_slice(rows);
        std::fs::write(&path, &bytes).unwrap();
        (arena, schema, dir, path)
    }

    #[test]
    fn two_signal_binary_extraction_scenario_from_spec() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n\
             File.At.2.Name = B\n\
             File.At.2.Type = Double\n";
        let mut rows = Vec::new();
        for (a, b) in [(1i32, 10.0f64), (2, 20.0), (3, 30.0)] {
            rows.extend_from_slice(&a.to_le_bytes());
            rows.extend_from_slice(&b.to_le_bytes());
        }
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();

        match get_signal(&schema, &mapper, "A", None).unwrap() {
            Column::I32(v) => assert_eq!(v, vec![1, 2, 3]),
            other => panic!("expected I32, got {other:?}"),
        }
        match get_signal(&schema, &mapper, "B", None).unwrap() {
            Column::F64(v) => assert_eq!(v, vec![10.0, 20.0, 30.0]),
            other => panic!("expected F64, got {other:?}"),
        }
    }

    #[test]
    fn scaling_applied_scenario_from_spec() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = T\n\
             File.At.1.Type = Double\n\
             Quantity.T.Factor = 2.0\n\
             Quantity.T.Offset = 5.0\n";
        let mut rows = Vec::new();
        for v in [1.0f64, 2.0, 3.0] {
            rows.extend_from_slice(&v.to_le_bytes());
        }
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();

        match get_signal(&schema, &mapper, "T", None).unwrap() {
            Column::F64(v) => assert_eq!(v, vec![7.0, 9.0, 11.0]),
            other => panic!("expected F64, got {other:?}"),
        }
    }

    #[test]
    fn missing_signal_scenario_from_spec() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n\
             File.At.2.Name = B\n\
             File.At.2.Type = Int\n";
        let (_arena, schema, _dir, path) = build(sidecar, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();
        assert!(get_signal(&schema, &mapper, "C", None).is_none());
    }

    #[test]
    fn zero_samples_returns_none() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n";
        let (_arena, schema, _dir, path) = build(sidecar, &[]);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();
        assert!(get_signal(&schema, &mapper, "A", None).is_none());
        assert!(get_signal_as_double(&schema, &mapper, "A", None).is_none());
    }

    #[test]
    fn no_scaling_applied_when_factor_and_offset_are_identity() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n";
        let rows: Vec<u8> = [10i32, 20, 30]
            .iter()
            .flat_map(|x| x.to_le_bytes())
            .collect();
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();
        match get_signal(&schema, &mapper, "A", None).unwrap() {
            Column::I32(v) => assert_eq!(v, vec![10, 20, 30]),
            other => panic!("expected I32, got {other:?}"),
        }
    }

    #[test]
    fn integer_scaling_truncates_fractional_factor_as_a_documented_quirk() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n\
             Quantity.A.Factor = 2.75\n\
             Quantity.A.Offset = 0.9\n";
        let rows: Vec<u8> = [10i32, 20].iter().flat_map(|x| x.to_le_bytes()).collect();
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();
        // factor truncates to 2, offset truncates to 0 before the multiply-add.
        match get_signal(&schema, &mapper, "A", None).unwrap() {
            Column::I32(v) => assert_eq!(v, vec![20, 40]),
            other => panic!("expected I32, got {other:?}"),
        }
    }

    #[test]
    fn get_signal_as_double_never_truncates() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n\
             Quantity.A.Factor = 2.75\n\
             Quantity.A.Offset = 0.9\n";
        let rows: Vec<u8> = [10i32, 20].iter().flat_map(|x| x.to_le_bytes()).collect();
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();
        let doubles = get_signal_as_double(&schema, &mapper, "A", None).unwrap();
        assert_eq!(doubles, vec![10.0 * 2.75 + 0.9, 20.0 * 2.75 + 0.9]);
    }

    #[test]
    fn bytes_column_returned_as_raw_blob_and_excluded_from_as_double() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = Raw\n\
             File.At.1.Type = 3 Bytes\n";
        let rows: Vec<u8> = vec![1, 2, 3, 4, 5, 6];
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();
        match get_signal(&schema, &mapper, "Raw", None).unwrap() {
            Column::Bytes { element_size, data } => {
                assert_eq!(element_size, 3);
                assert_eq!(data, rows);
            }
            other => panic!("expected Bytes, got {other:?}"),
        }
        assert!(get_signal_as_double(&schema, &mapper, "Raw", None).is_none());
    }

    #[test]
    fn parallel_extraction_matches_serial_for_large_sample_counts() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n\
             File.At.2.Name = B\n\
             File.At.2.Type = Double\n";
        let n = MIN_SAMPLES_PER_THREAD * 2 + 7;
        let mut rows = Vec::with_capacity(n * 12);
        for i in 0..n {
            rows.extend_from_slice(&(i as i32).to_le_bytes());
            rows.extend_from_slice(&(i as f64 * 0.5).to_le_bytes());
        }
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();

        let serial = get_signal(&schema, &mapper, "B", None).unwrap();

        let mut pool = WorkerPool::new(4);
        let parallel = get_signal(&schema, &mapper, "B", Some(&mut pool)).unwrap();

        assert_eq!(serial, parallel);
    }

    #[test]
    fn single_worker_pool_falls_back_to_serial_dispatch() {
        let sidecar = "File.ByteOrder = LittleEndian\n\
             File.At.1.Name = A\n\
             File.At.1.Type = Int\n";
        let n = MIN_SAMPLES_PER_THREAD + 1;
        let rows: Vec<u8> = (0..n).flat_map(|i| (i as i32).to_le_bytes()).collect();
        let (_arena, schema, _dir, path) = build(sidecar, &rows);
        let mapper = BinaryMapper::open(&path, schema.layout.row_size).unwrap();

        let mut pool = WorkerPool::new(1);
        let with_pool = get_signal(&schema, &mapper, "A", Some(&mut pool)).unwrap();
        let without_pool = get_signal(&schema, &mapper, "A", None).unwrap();
        assert_eq!(with_pool, without_pool);
    }

    #[test]
    fn column_len_reports_sample_count() {
        let c = Column::I32(vec![1, 2, 3]);
        assert_eq!(c.len(), 3);
        assert!(!c.is_empty());

        let bytes = Column::Bytes {
            element_size: 4,
            data: vec![0; 16],
        };
        assert_eq!(bytes.len(), 4);
    }
}
