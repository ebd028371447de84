//! Request bodies: in-memory payloads and rewindable file streams.

use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio_util::io::ReaderStream;

use crate::error::Result;

/// A request payload.
#[derive(Debug, Clone)]
pub enum Body {
    Bytes(Bytes),
    Stream(FileStream),
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<FileStream> for Body {
    fn from(value: FileStream) -> Self {
        Self::Stream(value)
    }
}

/// A file streamed as a request body.
///
/// One open handle backs every request that uses it; the handle is rewound
/// to the start before each send. Clones share the handle.
#[derive(Debug, Clone)]
pub struct FileStream {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl FileStream {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seek back to the start, returning the stream's length.
    pub fn rewind(&self) -> io::Result<u64> {
        let mut file = self.lock();
        file.seek(SeekFrom::Start(0))?;
        Ok(file.metadata()?.len())
    }

    /// A fresh reqwest body reading the whole file, plus its length.
    pub(crate) fn reqwest_body(&self) -> io::Result<(reqwest::Body, u64)> {
        let len = self.rewind()?;
        let file = self.lock().try_clone()?;
        let stream = ReaderStream::new(tokio::fs::File::from_std(file));
        Ok((reqwest::Body::wrap_stream(stream), len))
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn rewind_returns_to_start() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello stream").unwrap();

        let stream = FileStream::open(tmp.path()).unwrap();
        let mut first = String::new();
        stream.lock().read_to_string(&mut first).unwrap();
        assert_eq!(first, "hello stream");

        assert_eq!(stream.rewind().unwrap(), 12);
        let mut second = String::new();
        stream.lock().read_to_string(&mut second).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn clones_share_the_handle() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();

        let stream = FileStream::open(tmp.path()).unwrap();
        let clone = stream.clone();
        let mut buf = [0u8; 2];
        stream.lock().read_exact(&mut buf).unwrap();

        clone.rewind().unwrap();
        let mut all = String::new();
        stream.lock().read_to_string(&mut all).unwrap();
        assert_eq!(all, "abc");
    }

    #[test]
    fn missing_files_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileStream::open(dir.path().join("absent")).is_err());
    }

    #[test]
    fn body_conversions() {
        assert!(matches!(Body::from("x"), Body::Bytes(b) if b == "x"));
        assert!(matches!(Body::from(vec![1u8, 2]), Body::Bytes(b) if b.len() == 2));
    }
}
