use super::*;
use chrono::Utc;
use tempfile::TempDir;

#[test]
fn snapshot_serialize_deserialize_roundtrip() {
    let original = Snapshot::new(vec!["asset-1".to_string(), "asset-2".to_string()], 12345);

    let json = serde_json::to_string(&original).unwrap();
    let decoded: Snapshot<Vec<String>> = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded.sequence_number, 12345);
    assert_eq!(decoded.payload, original.payload);
}

#[test]
fn save_and_load_round_trip_gzip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("catalog-seq1.json.gz");

    let snapshot = Snapshot::new(vec![1u32, 2, 3], 1);
    snapshot.save_to_file(&path).unwrap();

    let loaded = Snapshot::<Vec<u32>>::load_from_file(&path).unwrap();
    assert_eq!(loaded.payload, vec![1, 2, 3]);
    assert_eq!(loaded.sequence_number, 1);
}

#[test]
fn load_falls_back_to_uncompressed_legacy_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("catalog-seq1.json");

    let snapshot = Snapshot::new(vec!["legacy".to_string()], 7);
    let json = serde_json::to_string_pretty(&snapshot).unwrap();
    std::fs::write(&path, json).unwrap();

    let loaded = Snapshot::<Vec<String>>::load_from_file(&path).unwrap();
    assert_eq!(loaded.payload, vec!["legacy".to_string()]);
}

#[test]
fn save_is_atomic_no_tmp_file_left_behind() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("catalog-seq1.json.gz");

    let snapshot = Snapshot::new(0u8, 1);
    snapshot.save_to_file(&path).unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
    let _ = Utc::now();
}
