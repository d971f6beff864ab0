//! In-memory backend

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::{ByteStream, FileSystem, FsError};

/// In-memory filesystem under the `mem://` scheme.
///
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` at `path`, replacing any previous contents
    pub fn insert(&self, path: &str, bytes: Vec<u8>) -> Result<(), FsError> {
        let mut files = self
            .files
            .write()
            .map_err(|e| FsError::Lock(e.to_string()))?;
        debug!("Storing {} bytes at {}", bytes.len(), path);
        files.insert(path.to_string(), bytes);
        Ok(())
    }

    /// Remove `path`, returning whether it existed
    pub fn remove(&self, path: &str) -> Result<bool, FsError> {
        let mut files = self
            .files
            .write()
            .map_err(|e| FsError::Lock(e.to_string()))?;
        Ok(files.remove(path).is_some())
    }
}

impl FileSystem for MemoryFileSystem {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    fn open(&self, path: &str) -> Result<ByteStream, FsError> {
        let files = self
            .files
            .read()
            .map_err(|e| FsError::Lock(e.to_string()))?;
        let bytes = files
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn exists(&self, path: &str) -> Result<bool, FsError> {
        let files = self
            .files
            .read()
            .map_err(|e| FsError::Lock(e.to_string()))?;
        Ok(files.contains_key(path))
    }
}
