//! Upload items - what gets uploaded

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

/// Fallback MIME type when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Seekable async byte source
pub trait ByteSource: AsyncRead + AsyncSeek + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send + Sync> ByteSource for T {}

/// One logical unit to upload.
///
/// The engine borrows an item for a single upload call and may open it more
/// than once; every opened source must support absolute seeks within
/// `[0, size]`.
#[async_trait]
pub trait UploadItem: Send + Sync {
    async fn open(&self) -> std::io::Result<Box<dyn ByteSource>>;

    /// Display name, sent as the uploaded file name
    fn name(&self) -> &str;

    /// Total size in bytes
    fn size(&self) -> u64;

    /// Last modification time, when the source has one
    fn modified(&self) -> Option<SystemTime> {
        None
    }

    /// Explicit MIME type; guessed from the name when None
    fn content_type(&self) -> Option<&str> {
        None
    }
}

/// Declared MIME type for an item
pub fn content_type_of(item: &dyn UploadItem) -> String {
    if let Some(explicit) = item.content_type() {
        return explicit.to_string();
    }
    mime_guess::from_path(item.name())
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// A file on local disk
#[derive(Debug, Clone)]
pub struct FileItem {
    path: PathBuf,
    name: String,
    size: u64,
    modified: Option<SystemTime>,
}

impl FileItem {
    /// Snapshot size and modification time from the file's metadata
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            path,
        })
    }
}

#[async_trait]
impl UploadItem for FileItem {
    async fn open(&self) -> std::io::Result<Box<dyn ByteSource>> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

/// An in-memory payload
#[derive(Debug, Clone)]
pub struct BytesItem {
    name: String,
    data: Vec<u8>,
    content_type: Option<String>,
}

impl BytesItem {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[async_trait]
impl UploadItem for BytesItem {
    async fn open(&self) -> std::io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_content_type_guessed_from_name() {
        assert_eq!(content_type_of(&BytesItem::new("IMG_0001.JPG", vec![])), "image/jpeg");
        assert_eq!(content_type_of(&BytesItem::new("clip.mp4", vec![])), "video/mp4");
        assert_eq!(
            content_type_of(&BytesItem::new("no-extension", vec![])),
            DEFAULT_CONTENT_TYPE
        );
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let item = BytesItem::new("photo.jpg", vec![]).with_content_type("image/heic");
        assert_eq!(content_type_of(&item), "image/heic");
    }

    #[tokio::test]
    async fn test_file_item_reads_metadata_and_content() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello photos").unwrap();

        let item = FileItem::from_path(file.path()).await.unwrap();
        assert_eq!(item.size(), 12);
        assert!(item.modified().is_some());
        assert!(!item.name().is_empty());

        let mut source = item.open().await.unwrap();
        let mut content = Vec::new();
        source.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello photos");
    }

    #[tokio::test]
    async fn test_file_item_rejects_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FileItem::from_path(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
