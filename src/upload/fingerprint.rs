//! Upload fingerprints - the resumability key

use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use super::item::UploadItem;

/// Fingerprint of an item from its name, size and modification time
pub fn fingerprint(item: &dyn UploadItem) -> String {
    let mtime_secs = item
        .modified()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    fingerprint_parts(item.name(), item.size(), mtime_secs)
}

/// SHA-256 hex over NUL-separated parts.
///
/// An empty name still yields a stable value; such items collide whenever
/// their sizes match.
pub fn fingerprint_parts(name: &str, size: u64, mtime_secs: Option<u64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(size.to_string().as_bytes());
    if let Some(mtime) = mtime_secs {
        hasher.update([0u8]);
        hasher.update(mtime.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::item::BytesItem;

    #[test]
    fn test_fingerprint_of_bytes_item_ignores_content() {
        let a = BytesItem::new("a.jpg", vec![1, 2, 3]);
        let b = BytesItem::new("a.jpg", vec![9, 9, 9]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), fingerprint_parts("a.jpg", 3, None));
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        assert_ne!(
            fingerprint_parts("a1", 23, None),
            fingerprint_parts("a", 123, None)
        );
    }
}
