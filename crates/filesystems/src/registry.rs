//! Scheme registry

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{split_scheme, ByteStream, FileSystem, FsError, LocalFileSystem};

/// Dispatches paths to the backend registered for their scheme
#[derive(Clone)]
pub struct FileSystems {
    backends: HashMap<&'static str, Arc<dyn FileSystem>>,
}

impl FileSystems {
    /// Registry with only the local disk backend
    pub fn new() -> Self {
        let mut registry = Self {
            backends: HashMap::new(),
        };
        registry.register(Arc::new(LocalFileSystem));
        registry
    }

    /// Register a backend, replacing any previous one for its scheme
    pub fn register(&mut self, backend: Arc<dyn FileSystem>) {
        info!("Registering filesystem for scheme '{}'", backend.scheme());
        self.backends.insert(backend.scheme(), backend);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, backend: Arc<dyn FileSystem>) -> Self {
        self.register(backend);
        self
    }

    fn backend_for(&self, path: &str) -> Result<&Arc<dyn FileSystem>, FsError> {
        let scheme = split_scheme(path).map(|(s, _)| s).unwrap_or("file");
        self.backends
            .get(scheme)
            .ok_or_else(|| FsError::UnknownScheme(scheme.to_string()))
    }

    /// Open `path` with the backend for its scheme
    pub fn open(&self, path: &str) -> Result<ByteStream, FsError> {
        let backend = self.backend_for(path)?;
        debug!("Opening {} via '{}' filesystem", path, backend.scheme());
        backend.open(path)
    }

    pub fn exists(&self, path: &str) -> Result<bool, FsError> {
        self.backend_for(path)?.exists(path)
    }
}

impl Default for FileSystems {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileSystems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.backends.keys().collect();
        schemes.sort();
        f.debug_struct("FileSystems").field("schemes", &schemes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFileSystem;

    #[test]
    fn test_dispatch_by_scheme() {
        let mem = MemoryFileSystem::new();
        mem.insert("mem://m.bin", vec![7]).unwrap();
        let registry = FileSystems::new().with(Arc::new(mem));

        assert!(registry.exists("mem://m.bin").unwrap());
        assert!(!registry.exists("/no/such/file").unwrap());
    }

    #[test]
    fn test_unknown_scheme() {
        let registry = FileSystems::new();
        assert!(matches!(
            registry.open("gs://bucket/m.bin"),
            Err(FsError::UnknownScheme(s)) if s == "gs"
        ));
    }
}
