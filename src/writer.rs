//! Tar archive writer.
//!
//! Entries are either written in one go with [`TarWriter::write`] or produced
//! incrementally through [`TarWriter::create`]. Incremental entries are
//! buffered in memory, or, when a file store is attached, staged in the store
//! and only copied into the archive by [`TarWriter::close`].

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tar::{Builder, EntryType, Header};

use crate::error::Result;
use crate::store::FileStore;

/// Output stream, optionally gzip-compressed
enum Sink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Sink<W> {
    fn new(inner: W, gzip: bool) -> Self {
        if gzip {
            Sink::Gzip(GzEncoder::new(inner, Compression::default()))
        } else {
            Sink::Plain(inner)
        }
    }

    /// Write the gzip trailer, if any, and hand back the inner writer
    fn finish(self) -> io::Result<W> {
        match self {
            Sink::Plain(inner) => Ok(inner),
            Sink::Gzip(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

/// Header recorded for an entry staged in the file store
#[derive(Debug)]
struct StagedEntry {
    name: String,
    /// Store file holding the payload
    stored: String,
    size: u64,
}

/// Store file for the `index`-th staged entry. Repeated member names get
/// distinct files.
fn staged_name(index: usize, name: &str) -> String {
    format!("{index}/{name}")
}

/// Reads exactly `remaining` bytes, failing if the source ends first
struct Exact<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for Exact<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("staged file ended {} bytes short", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Serializes named payloads into a tar stream.
///
/// Nothing reaches the sink until the first entry is written or the writer
/// is closed. `close` must be called to emit the archive trailer.
pub struct TarWriter<W: Write> {
    state: State<W>,
    store: Option<Arc<dyn FileStore>>,
    gzip: bool,
    staged: Vec<StagedEntry>,
}

enum State<W: Write> {
    /// No entry written yet
    Idle(W),
    Encoding(Builder<Sink<W>>),
    /// Only observable if building the encoder panicked
    Poisoned,
}

impl<W: Write> TarWriter<W> {
    /// Write a tar stream to `sink`, gzip-compressed when `gzip` is set
    pub fn new(sink: W, gzip: bool) -> Self {
        TarWriter {
            state: State::Idle(sink),
            store: None,
            gzip,
            staged: Vec::new(),
        }
    }

    /// Stage entries produced by [`create`](Self::create) in `store`
    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Append an entry whose full payload is known. Returns the payload length.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<u64> {
        let size = data.len() as u64;
        let mut header = entry_header(size);
        self.encoder()?.append_data(&mut header, name, data)?;
        Ok(size)
    }

    /// The tar encoder, built on first use
    fn encoder(&mut self) -> io::Result<&mut Builder<Sink<W>>> {
        if let State::Idle(_) = self.state {
            if let State::Idle(sink) = std::mem::replace(&mut self.state, State::Poisoned) {
                self.state = State::Encoding(Builder::new(Sink::new(sink, self.gzip)));
            }
        }
        match &mut self.state {
            State::Encoding(builder) => Ok(builder),
            _ => Err(io::Error::other("tar encoder failed to initialize")),
        }
    }

    /// Start an entry whose length is not known up front.
    ///
    /// The entry is only recorded when [`EntryWriter::close`] succeeds.
    pub fn create(&mut self, name: &str) -> Result<EntryWriter<'_, W>> {
        let target = match &self.store {
            None => Target::Memory(Vec::new()),
            Some(store) => {
                let stored = staged_name(self.staged.len(), name);
                debug!("staging entry {name:?} in the file store as {stored:?}");
                let file = store.create(&stored)?;
                Target::Staged {
                    stored,
                    sink: Sink::new(file, self.gzip),
                }
            }
        };
        Ok(EntryWriter {
            owner: self,
            name: name.to_string(),
            target,
            written: 0,
        })
    }

    /// Replay staged entries, write the archive trailer and return the sink.
    ///
    /// Staged entries are emitted in the order they were created. The first
    /// failure aborts; output already written is not rolled back.
    pub fn close(mut self) -> Result<W> {
        self.encoder()?;
        let staged = std::mem::take(&mut self.staged);
        if let Some(store) = self.store.take() {
            if !staged.is_empty() {
                debug!("replaying {} staged entries", staged.len());
            }
            for entry in &staged {
                self.replay(&*store, entry)?;
            }
        }
        match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Encoding(builder) => Ok(builder.into_inner()?.finish()?),
            _ => Err(io::Error::other("tar encoder failed to initialize").into()),
        }
    }

    fn replay(&mut self, store: &dyn FileStore, entry: &StagedEntry) -> Result<()> {
        let file = store.open(&entry.stored)?;
        let inner: Box<dyn Read> = if self.gzip {
            Box::new(GzDecoder::new(file))
        } else {
            file
        };
        let payload = Exact {
            inner,
            remaining: entry.size,
        };
        let mut header = entry_header(entry.size);
        self.encoder()?
            .append_data(&mut header, &entry.name, payload)?;
        Ok(())
    }
}

fn entry_header(size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header
}

enum Target {
    Memory(Vec<u8>),
    Staged {
        stored: String,
        sink: Sink<Box<dyn Write + Send>>,
    },
}

/// Write stream for one entry started with [`TarWriter::create`].
///
/// Dropping it without calling [`close`](Self::close) discards the entry.
pub struct EntryWriter<'a, W: Write> {
    owner: &'a mut TarWriter<W>,
    name: String,
    target: Target,
    written: u64,
}

impl<W: Write> EntryWriter<'_, W> {
    /// Bytes written to this entry so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Finish the entry and record it in the archive
    pub fn close(self) -> Result<()> {
        match self.target {
            Target::Memory(buf) => {
                self.owner.write(&self.name, &buf)?;
            }
            Target::Staged { stored, sink } => {
                let mut file = sink.finish()?;
                file.flush()?;
                self.owner.staged.push(StagedEntry {
                    name: self.name,
                    stored,
                    size: self.written,
                });
            }
        }
        Ok(())
    }
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match &mut self.target {
            Target::Memory(data) => data.write(buf)?,
            Target::Staged { sink, .. } => sink.write(buf)?,
        };
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.target {
            Target::Memory(_) => Ok(()),
            Target::Staged { sink, .. } => sink.flush(),
        }
    }
}
