//! Key-addressed byte storage used for spilled entries and staged writes.

pub mod dir;
pub mod memory;

use std::io::{self, Read, Write};

pub use dir::DirStore;
pub use memory::MemoryStore;

/// Flat name to byte-stream storage.
///
/// Write streams returned by `create` are closed by flushing and dropping
/// them; implementations must make the data visible to `open` by then.
pub trait FileStore: Send + Sync {
    /// Create (or truncate) the named file
    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Open the named file, failing with `io::ErrorKind::NotFound` when absent
    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;
}
