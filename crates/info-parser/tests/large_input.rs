use vdyn_arena::DualArena;
use vdyn_info_parser::InfoParser;

#[test]
fn pre_sizing_avoids_growth_for_the_common_case() {
    let mut text = String::new();
    for i in 0..50_000 {
        text.push_str(&format!("Key.{i} = value-{i}\n"));
    }

    let arena = DualArena::new(16, 16);
    let table = InfoParser::parse(&arena, text.as_bytes());

    assert_eq!(table.len(), 50_000);
    assert_eq!(table.get("Key.0"), Some("value-0"));
    assert_eq!(table.get("Key.49999"), Some("value-49999"));
}

#[test]
fn mixed_single_and_multiline_entries_at_scale() {
    let mut text = String::new();
    for i in 0..10_000 {
        text.push_str(&format!("Name.{i} = value-{i}\n"));
        text.push_str(&format!("Desc.{i}:\n\tline one {i}\n\tline two {i}\n"));
    }

    let arena = DualArena::new(16, 16);
    let table = InfoParser::parse(&arena, text.as_bytes());

    assert_eq!(table.len(), 20_000);
    assert_eq!(
        table.get("Desc.500"),
        Some("line one 500\nline two 500")
    );
}

#[test]
fn file_read_from_disk_via_tempfile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.info");
    std::fs::write(&path, b"File.ByteOrder = LittleEndian\nFile.At.1.Name = Car.v\n")
        .expect("write sidecar");

    let bytes = std::fs::read(&path).expect("read sidecar");
    let arena = DualArena::new(64, 64);
    let table = InfoParser::parse(&arena, &bytes);

    assert_eq!(table.get("File.ByteOrder"), Some("LittleEndian"));
    assert_eq!(table.get("File.At.1.Name"), Some("Car.v"));
}
