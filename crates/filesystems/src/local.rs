//! Local disk backend

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use crate::{split_scheme, ByteStream, FileSystem, FsError};

/// Reads from the local filesystem. Accepts plain paths and `file://` paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    fn strip(path: &str) -> &str {
        match split_scheme(path) {
            Some(("file", rest)) => rest,
            _ => path,
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn open(&self, path: &str) -> Result<ByteStream, FsError> {
        let path = Self::strip(path);
        debug!("Opening local file {}", path);
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn exists(&self, path: &str) -> Result<bool, FsError> {
        Ok(Path::new(Self::strip(path)).exists())
    }
}
