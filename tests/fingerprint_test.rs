//! Tests for item fingerprints

use gphotos_uploader::upload::{fingerprint, fingerprint_parts, BytesItem, FileItem};
use tempfile::TempDir;

#[test]
fn test_fingerprint_is_deterministic() {
    assert_eq!(
        fingerprint_parts("IMG_0001.jpg", 1024, Some(1_700_000_000)),
        fingerprint_parts("IMG_0001.jpg", 1024, Some(1_700_000_000))
    );
}

#[test]
fn test_fingerprint_changes_with_identity() {
    let base = fingerprint_parts("IMG_0001.jpg", 1024, Some(1_700_000_000));
    assert_ne!(base, fingerprint_parts("IMG_0002.jpg", 1024, Some(1_700_000_000)));
    assert_ne!(base, fingerprint_parts("IMG_0001.jpg", 1025, Some(1_700_000_000)));
    assert_ne!(base, fingerprint_parts("IMG_0001.jpg", 1024, Some(1_700_000_001)));
    assert_ne!(base, fingerprint_parts("IMG_0001.jpg", 1024, None));
}

#[test]
fn test_fingerprint_fields_do_not_run_together() {
    assert_ne!(fingerprint_parts("a1", 23, None), fingerprint_parts("a", 123, None));
}

#[test]
fn test_empty_name_is_still_deterministic() {
    let a = fingerprint(&BytesItem::new("", vec![1, 2, 3]));
    let b = fingerprint(&BytesItem::new("", vec![4, 5, 6]));
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
}

#[tokio::test]
async fn test_file_fingerprint_follows_modification() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("photo.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();

    let first = FileItem::from_path(&path).await.unwrap();
    let again = FileItem::from_path(&path).await.unwrap();
    assert_eq!(fingerprint(&first), fingerprint(&again));

    std::fs::write(&path, b"longer jpeg bytes").unwrap();
    let rewritten = FileItem::from_path(&path).await.unwrap();
    assert_ne!(fingerprint(&first), fingerprint(&rewritten));
}
