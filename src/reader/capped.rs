use log::debug;
use std::io::{Cursor, Read};
use std::sync::Arc;

use super::{ArchiveReader, LazyMemReader, SpillOptions, SpillReader};
use crate::entry::Entry;
use crate::error::Result;
use crate::store::FileStore;

/// Reader chosen by archive size: small archives stay in memory, large ones
/// are spilled to a file store.
pub enum CappedReader {
    Memory(LazyMemReader),
    Spilled(SpillReader),
}

impl CappedReader {
    /// Read up to `threshold` bytes from `source`.
    ///
    /// If the source ends first, the buffered archive is served from memory
    /// and the store is never touched. Otherwise the buffered prefix is
    /// chained in front of the unread remainder and the whole archive is
    /// spilled into `store`. An archive of exactly `threshold` bytes spills.
    pub fn new<R: Read>(
        mut source: R,
        threshold: u64,
        store: Arc<dyn FileStore>,
        options: &SpillOptions,
    ) -> Result<Self> {
        let mut prefix = Vec::new();
        let buffered = (&mut source).take(threshold).read_to_end(&mut prefix)? as u64;

        if buffered < threshold {
            debug!("archive is {buffered} bytes, below the {threshold} byte threshold; keeping it in memory");
            return Ok(CappedReader::Memory(LazyMemReader::new(prefix)));
        }

        debug!("archive reached the {threshold} byte threshold; spilling to the file store");
        let full = Cursor::new(prefix).chain(source);
        Ok(CappedReader::Spilled(SpillReader::from_reader(
            full, store, options,
        )?))
    }

    /// Whether the archive was spilled to the file store
    pub fn is_spilled(&self) -> bool {
        matches!(self, CappedReader::Spilled(_))
    }
}

impl ArchiveReader for CappedReader {
    fn open(&self, name: &str) -> Result<Entry> {
        match self {
            CappedReader::Memory(r) => r.open(name),
            CappedReader::Spilled(r) => r.open(name),
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        match self {
            CappedReader::Memory(r) => r.for_each(f),
            CappedReader::Spilled(r) => r.for_each(f),
        }
    }
}
