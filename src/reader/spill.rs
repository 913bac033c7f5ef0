use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, trace};
use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::sync::Arc;

use super::{ArchiveReader, DuplicatePolicy, SpillOptions};
use crate::codec::TarDecoder;
use crate::entry::{Entry, LazyGzDecoder};
use crate::error::{Error, Result};
use crate::sniff::sniff;
use crate::store::FileStore;

/// Unpacks the archive into a file store once, then serves members from there.
///
/// The store layout is one file per member, named after the member, with a
/// `.gz` suffix when per-entry compression is enabled. Nothing else is
/// persisted, so the gzip flag is part of how the store has to be read.
pub struct SpillReader {
    store: Arc<dyn FileStore>,
    gzip: bool,
    /// Member names in archive order
    names: Vec<String>,
}

impl SpillReader {
    pub fn from_reader<R: Read>(
        source: R,
        store: Arc<dyn FileStore>,
        options: &SpillOptions,
    ) -> Result<Self> {
        let mut decoder = TarDecoder::new(sniff(source)?);
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut total = 0u64;

        while let Some(header) = decoder.next_entry()? {
            if seen.insert(header.name.clone()) {
                names.push(header.name.clone());
            } else if options.duplicates == DuplicatePolicy::Reject {
                return Err(Error::DuplicateEntry(header.name));
            } else {
                debug!("overwriting spilled entry {:?}", header.name);
            }

            let stored = stored_name(&header.name, options.gzip);
            total += spill_entry(&*store, &stored, &mut decoder, options.gzip)?;
        }

        debug!(
            "spilled {} entries ({total} bytes, gzip: {})",
            names.len(),
            options.gzip
        );
        Ok(SpillReader {
            store,
            gzip: options.gzip,
            names,
        })
    }

    /// Whether members are stored gzip-compressed
    pub fn is_gzipped(&self) -> bool {
        self.gzip
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ArchiveReader for SpillReader {
    fn open(&self, name: &str) -> Result<Entry> {
        let file = self.store.open(&stored_name(name, self.gzip))?;
        if self.gzip {
            Ok(Entry::new(name, None, LazyGzDecoder::new(file)))
        } else {
            Ok(Entry::new(name, None, file))
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        for name in &self.names {
            let mut entry = self.open(name)?;
            f(name, &mut entry)?;
        }
        Ok(())
    }
}

/// Name under which a member is kept in the store
pub fn stored_name(name: &str, gzip: bool) -> Cow<'_, str> {
    if gzip {
        Cow::Owned(format!("{name}.gz"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Copy one member into the store, closing the compressor before the file
fn spill_entry<R: Read>(
    store: &dyn FileStore,
    name: &str,
    payload: &mut R,
    gzip: bool,
) -> Result<u64> {
    let file = store.create(name)?;
    let (copied, mut file) = if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        let copied = io::copy(payload, &mut encoder)?;
        (copied, encoder.finish()?)
    } else {
        let mut file = file;
        (io::copy(payload, &mut file)?, file)
    };
    file.flush()?;
    trace!("spilled {name:?} ({copied} bytes)");
    Ok(copied)
}
