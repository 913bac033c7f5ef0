use log::debug;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use super::FileStore;

/// File store backed by a directory on the local file system.
///
/// Names containing `/` map to nested directories, created on demand.
#[derive(Clone)]
pub struct DirStore {
    root: PathBuf,
    /// Keeps a temporary root alive until the last clone is dropped
    _temp: Option<Arc<TempDir>>,
}

impl DirStore {
    /// Use an existing directory as the store root
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(DirStore { root, _temp: None })
    }

    /// Create a store in a fresh temporary directory, removed on drop
    pub fn temp() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("tarstore-").tempdir()?;
        debug!("spill directory {}", dir.path().display());
        Ok(DirStore {
            root: dir.path().to_path_buf(),
            _temp: Some(Arc::new(dir)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store name to a path under the root, refusing anything that escapes it
    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let mut normal = 0;
        for component in relative.components() {
            match component {
                Component::Normal(_) => normal += 1,
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("store name escapes the store root: {name}"),
                    ));
                }
            }
        }
        if normal == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid store name: {name:?}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for DirStore {
    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let path = self.resolve(name)?;
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}
