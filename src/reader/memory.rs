use bytes::Bytes;
use log::debug;
use std::collections::HashMap;
use std::io::{Cursor, Read};

use super::{ArchiveReader, DuplicatePolicy, StreamReader};
use crate::codec::TarDecoder;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::sniff::sniff;

/// Keeps the raw archive bytes in memory and decodes them on every request.
pub struct LazyMemReader {
    len: usize,
    stream: StreamReader,
}

impl LazyMemReader {
    /// Wrap archive bytes that are already in memory
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let len = data.len();
        LazyMemReader {
            len,
            stream: StreamReader::new(move || Ok(Cursor::new(data.clone()))),
        }
    }

    /// Buffer the whole source without decoding it
    pub fn from_reader<R: Read>(mut source: R) -> Result<Self> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Size of the buffered (possibly compressed) archive
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ArchiveReader for LazyMemReader {
    fn open(&self, name: &str) -> Result<Entry> {
        self.stream.open(name)
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        self.stream.for_each(f)
    }
}

/// Decodes the archive once into memory and serves members by name.
pub struct EagerMemReader {
    /// Members in archive order
    entries: Vec<(String, Bytes)>,
    index: HashMap<String, usize>,
}

impl EagerMemReader {
    pub fn from_reader<R: Read>(source: R, duplicates: DuplicatePolicy) -> Result<Self> {
        let mut decoder = TarDecoder::new(sniff(source)?);
        let mut entries: Vec<(String, Bytes)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        while let Some(header) = decoder.next_entry()? {
            let mut data = Vec::with_capacity(header.size.min(1 << 20) as usize);
            decoder.read_to_end(&mut data)?;

            match index.get(&header.name) {
                Some(&at) => match duplicates {
                    DuplicatePolicy::Reject => return Err(Error::DuplicateEntry(header.name)),
                    DuplicatePolicy::LastWins => {
                        debug!("replacing earlier entry {:?}", header.name);
                        entries[at].1 = Bytes::from(data);
                    }
                },
                None => {
                    index.insert(header.name.clone(), entries.len());
                    entries.push((header.name, Bytes::from(data)));
                }
            }
        }

        debug!("decoded {} entries into memory", entries.len());
        Ok(EagerMemReader { entries, index })
    }

    /// Number of distinct members
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArchiveReader for EagerMemReader {
    fn open(&self, name: &str) -> Result<Entry> {
        let &at = self
            .index
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let (name, data) = &self.entries[at];
        Ok(Entry::new(
            name.clone(),
            Some(data.len() as u64),
            Cursor::new(data.clone()),
        ))
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        for (name, data) in &self.entries {
            let mut view: &[u8] = data;
            f(name, &mut view)?;
        }
        Ok(())
    }
}
