//! Storage Abstraction
//!
//! Opens byte streams for paths such as `/models/m.bin` or `mem://m.bin`.
//! The scheme prefix selects the backend; paths without one go to local disk.

mod local;
mod memory;
mod registry;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;
pub use registry::FileSystems;

use std::io::Read;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No filesystem registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Filesystem lock poisoned: {0}")]
    Lock(String),
}

/// Readable byte stream returned by [`FileSystem::open`]
pub type ByteStream = Box<dyn Read + Send>;

/// A storage backend
pub trait FileSystem: Send + Sync {
    /// Scheme handled by this backend, e.g. `"file"` or `"mem"`
    fn scheme(&self) -> &'static str;

    /// Open `path` for reading
    fn open(&self, path: &str) -> Result<ByteStream, FsError>;

    /// Whether `path` exists
    fn exists(&self, path: &str) -> Result<bool, FsError>;
}

/// Split `scheme://rest` into its scheme, if any
pub fn split_scheme(path: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = path.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-') {
        return None;
    }
    Some((scheme, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_scheme() {
        assert_eq!(split_scheme("mem://a/b.bin"), Some(("mem", "a/b.bin")));
        assert_eq!(split_scheme("/tmp/model.bin"), None);
        assert_eq!(split_scheme("weird path://x"), None);
    }
}
