use indexmap::IndexMap;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, trace};

/// Cache of opened result files keyed by absolute path.
///
/// Readers can be large, so the cache holds at most `capacity` of them and
/// evicts the oldest first. Reads should go through a [`CacheScope`], which
/// releases everything it loaded once the read operation is over.
#[derive(Debug)]
pub struct ReaderCache {
    capacity: usize,
    readers: IndexMap<PathBuf, Arc<str>>,
}

impl ReaderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            readers: IndexMap::new(),
        }
    }

    /// return the cached reader for `path`, opening it if necessary
    pub fn load(&mut self, path: &Path) -> io::Result<Arc<str>> {
        let key = fs::canonicalize(path)?;

        if let Some(reader) = self.readers.get(&key) {
            trace!(path = ?key, "Reader cache hit");
            return Ok(reader.clone());
        }

        let reader: Arc<str> = Arc::from(fs::read_to_string(&key)?);

        while self.readers.len() >= self.capacity {
            if let Some((evicted, _)) = self.readers.shift_remove_index(0) {
                debug!(path = ?evicted, "Evicted reader from cache");
            }
        }

        self.readers.insert(key, reader.clone());

        Ok(reader)
    }

    /// release the reader for `path`, returns whether one was cached
    pub fn unload(&mut self, path: &Path) -> bool {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        self.readers.shift_remove(&key).is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        fs::canonicalize(path)
            .map(|key| self.readers.contains_key(&key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    pub fn scope(&mut self) -> CacheScope<'_> {
        CacheScope {
            cache: self,
            loaded: Vec::new(),
        }
    }
}

/// Scoped access to a [`ReaderCache`], unloads every reader it opened on drop
#[derive(Debug)]
pub struct CacheScope<'a> {
    cache: &'a mut ReaderCache,
    loaded: Vec<PathBuf>,
}

impl CacheScope<'_> {
    pub fn read(&mut self, path: &Path) -> io::Result<Arc<str>> {
        let reader = self.cache.load(path)?;
        self.loaded.push(path.to_path_buf());

        Ok(reader)
    }
}

impl Drop for CacheScope<'_> {
    fn drop(&mut self) {
        for path in self.loaded.drain(..) {
            if self.cache.unload(&path) {
                trace!(path = ?path, "Unloaded reader");
            }
        }
    }
}
