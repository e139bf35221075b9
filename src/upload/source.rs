//! Byte sources
//!
//! The coordinator only asks for a size and for byte ranges; where the bytes
//! live is up to the source.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::types::{ByteRange, UploadError};

/// Random-access provider of upload bytes
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total size in bytes
    fn size(&self) -> u64;

    /// Name reported to the platform for single-file uploads
    fn file_name(&self) -> &str;

    /// Read exactly the bytes of `range`
    async fn read_range(&self, range: ByteRange) -> Result<Vec<u8>, UploadError>;
}

/// A file on local disk
///
/// Every read opens its own handle so concurrent chunk reads never share a
/// cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    file_name: String,
    size: u64,
}

impl FileSource {
    /// Stat the file and remember its size
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;

        if !metadata.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        Ok(Self {
            path,
            file_name,
            size: metadata.len(),
        })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn read_range(&self, range: ByteRange) -> Result<Vec<u8>, UploadError> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.offset)).await?;

        let mut buf = vec![0u8; range.length as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// In-memory bytes, used for generated payloads and tests
#[derive(Debug, Clone)]
pub struct MemorySource {
    file_name: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn read_range(&self, range: ByteRange) -> Result<Vec<u8>, UploadError> {
        let start = range.offset as usize;
        let end = range.end() as usize;
        self.data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                UploadError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("range {}..{} beyond {} bytes", start, end, self.data.len()),
                ))
            })
    }
}
