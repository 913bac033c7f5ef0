use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};

use super::FileStore;

type Files = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// In-memory file store. Clones share the same contents.
#[derive(Default)]
pub struct MemoryStore {
    files: Files,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.read().ok().map(|f| f.len()).unwrap_or(0)
    }

    /// Check if the store holds no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all stored files, sorted
    pub fn names(&self) -> Vec<String> {
        self.files
            .read()
            .ok()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of a stored file's contents
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().ok()?.get(name).cloned()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        MemoryStore {
            files: Arc::clone(&self.files),
        }
    }
}

impl FileStore for MemoryStore {
    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.insert(name.to_string(), Vec::new());
        Ok(Box::new(MemoryFile {
            files: Arc::clone(&self.files),
            name: name.to_string(),
        }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        match files.get(name) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file in store: {name}"),
            )),
        }
    }
}

/// Write stream appending straight into the shared map
struct MemoryFile {
    files: Files,
    name: String,
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn poisoned() -> io::Error {
    io::Error::other("memory store lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_open() {
        let store = MemoryStore::new();
        let mut w = store.create("a/b").unwrap();
        w.write_all(b"hello ").unwrap();
        w.write_all(b"store").unwrap();
        w.flush().unwrap();
        drop(w);

        let mut out = String::new();
        store.open("a/b").unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello store");
        assert_eq!(store.len(), 1);
        assert_eq!(store.names(), vec!["a/b".to_string()]);
    }

    #[test]
    fn test_create_truncates() {
        let store = MemoryStore::new();
        store.create("x").unwrap().write_all(b"old contents").unwrap();
        store.create("x").unwrap().write_all(b"new").unwrap();
        assert_eq!(store.get("x"), Some(b"new".to_vec()));
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.open("missing").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_contents() {
        let store = MemoryStore::new();
        let other = store.clone();
        other.create("shared").unwrap();
        assert_eq!(store.len(), 1);
    }
}
