use log::debug;
use std::io::{self, Read};

use super::ArchiveReader;
use crate::codec::TarDecoder;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::sniff::{Sniffed, sniff};

type Source = Box<dyn Read + Send>;
type Reopen = dyn Fn() -> io::Result<Source> + Send + Sync;

/// Reader that re-opens its source from scratch for every request and scans
/// the archive until it reaches the requested member.
///
/// Thread safety is that of the reopen function: each call must produce an
/// independent stream.
pub struct StreamReader {
    reopen: Box<Reopen>,
}

impl StreamReader {
    pub fn new<F, R>(reopen: F) -> Self
    where
        F: Fn() -> io::Result<R> + Send + Sync + 'static,
        R: Read + Send + 'static,
    {
        StreamReader {
            reopen: Box::new(move || Ok(Box::new(reopen()?) as Source)),
        }
    }

    fn decoder(&self) -> Result<TarDecoder<Sniffed<Source>>> {
        let source = (self.reopen)()?;
        Ok(TarDecoder::new(sniff(source)?))
    }
}

impl ArchiveReader for StreamReader {
    fn open(&self, name: &str) -> Result<Entry> {
        let mut decoder = self.decoder()?;
        while let Some(header) = decoder.next_entry()? {
            if header.name == name {
                // the handle now owns the cursor and, through it, the source
                return Ok(Entry::new(header.name, Some(header.size), decoder));
            }
        }
        debug!("entry {name:?} not found after scanning the whole archive");
        Err(Error::NotFound(name.to_string()))
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        let mut decoder = self.decoder()?;
        while let Some(header) = decoder.next_entry()? {
            f(&header.name, &mut decoder)?;
        }
        Ok(())
    }
}
