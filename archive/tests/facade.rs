use std::io::Write;
use std::path::{Path, PathBuf};

use vdyn_archive::{Archive, ArchiveError, Column, SimdLevel, WorkerPool};

const SIDECAR: &str = "File.ByteOrder=LittleEndian\n\
     File.At.1.Name=yaw_rate\n\
     File.At.1.Type=Float\n\
     Quantity.yaw_rate.Unit=deg/s\n\
     Quantity.yaw_rate.Factor=0.01\n\
     Quantity.yaw_rate.Offset=0.0\n\
     File.At.2.Name=gear\n\
     File.At.2.Type=Char\n\
     Quantity.gear.Unit=\n";

fn write_archive(dir: &Path, rows: &[(f32, i8)]) -> PathBuf {
    let data_path = dir.join("session.bin");
    let info_path = dir.join("session.bin.info");
    std::fs::write(&info_path, SIDECAR).unwrap();

    let mut file = std::fs::File::create(&data_path).unwrap();
    file.write_all(&[0u8; 16]).unwrap();
    for (yaw, gear) in rows {
        file.write_all(&yaw.to_le_bytes()).unwrap();
        file.write_all(&gear.to_le_bytes()).unwrap();
    }
    data_path
}

#[test]
fn reads_two_signals_of_different_native_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_archive(dir.path(), &[(100.0, 1), (200.0, 2), (300.0, 3)]);

    let archive = Archive::open(&path).unwrap();
    assert_eq!(archive.row_count(), 3);
    assert_eq!(archive.signals().len(), 2);

    match archive.get_signal("yaw_rate").unwrap() {
        Column::F32(values) => assert_eq!(values, vec![100.0, 200.0, 300.0]),
        other => panic!("expected F32 column, got {other:?}"),
    }
    match archive.get_signal("gear").unwrap() {
        Column::I8(values) => assert_eq!(values, vec![1, 2, 3]),
        other => panic!("expected I8 column, got {other:?}"),
    }

    let scaled = archive.get_signal_as_double("yaw_rate").unwrap();
    assert_eq!(scaled, vec![1.0, 2.0, 3.0]);

    assert!(archive.get_signal("does_not_exist").is_none());
    archive.close();
}

#[test]
fn sidecar_not_found_is_reported_not_panicked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.bin");
    std::fs::write(&path, [0u8; 16]).unwrap();

    let err = Archive::open(&path).unwrap_err();
    assert!(matches!(err, ArchiveError::SidecarNotFound { .. }));
}

#[test]
fn binary_not_found_is_reported_not_panicked() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("session.bin.info"), SIDECAR).unwrap();

    let err = Archive::open(dir.path().join("session.bin")).unwrap_err();
    assert!(matches!(err, ArchiveError::BinaryNotFound { .. }));
}

#[test]
fn pinned_simd_level_extracts_the_same_values_as_auto_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_archive(dir.path(), &[(10.0, 1), (20.0, 2)]);

    let auto = Archive::open(&path).unwrap();
    let pinned = Archive::open_with_simd_level(&path, SimdLevel::None).unwrap();
    assert_eq!(pinned.simd_level(), SimdLevel::None);

    assert_eq!(
        auto.get_signal_as_double("yaw_rate").unwrap(),
        pinned.get_signal_as_double("yaw_rate").unwrap()
    );
}

#[test]
fn parallel_extraction_over_a_large_column_matches_serial() {
    let rows: Vec<(f32, i8)> = (0..50_000).map(|i| (i as f32, (i % 7) as i8)).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = write_archive(dir.path(), &rows);

    let archive = Archive::open(&path).unwrap();
    let mut pool = WorkerPool::new(2);

    let serial = archive.get_signal_as_double("yaw_rate").unwrap();
    let parallel = archive
        .get_signal_as_double_parallel("yaw_rate", &mut pool)
        .unwrap();
    assert_eq!(serial, parallel);
    assert_eq!(serial.len(), 50_000);
}
