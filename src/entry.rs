use flate2::read::GzDecoder;
use std::fmt;
use std::io::{self, Read};

const MAX_SIZE_HINT: u64 = 1 << 20;

/// A readable view over one archive member's uncompressed bytes.
///
/// The handle owns everything it reads from (decode cursor, decompressor,
/// source stream or store file). Dropping it releases those resources.
pub struct Entry {
    name: String,
    size: Option<u64>,
    reader: Box<dyn Read + Send>,
}

impl Entry {
    pub fn new<R>(name: impl Into<String>, size: Option<u64>, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Entry {
            name: name.into(),
            size,
            reader: Box::new(reader),
        }
    }

    /// Name of the member inside the archive
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size, when the backing representation knows it up front
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Read the remaining payload into a vector
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        // sizes come from archive headers, so only trust them as a hint
        let hint = self.size.unwrap_or(0).min(MAX_SIZE_HINT);
        let mut buf = Vec::with_capacity(hint as usize);
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for Entry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

enum LazyState<R: Read> {
    /// Nothing read yet
    Pending(R),
    Decoding(GzDecoder<R>),
    /// Only observable if building the decoder panicked
    Poisoned,
}

/// Gzip decompressing view that defers all work until the first read.
///
/// `GzDecoder::new` starts parsing the gzip header straight away, so
/// constructing it at open time would read from the store even for handles
/// that are never read.
pub struct LazyGzDecoder<R: Read> {
    state: LazyState<R>,
}

impl<R: Read> LazyGzDecoder<R> {
    pub fn new(inner: R) -> Self {
        LazyGzDecoder {
            state: LazyState::Pending(inner),
        }
    }

    /// Whether the decompressor has been built
    pub fn is_started(&self) -> bool {
        matches!(self.state, LazyState::Decoding(_))
    }
}

impl<R: Read> Read for LazyGzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let LazyState::Pending(_) = self.state {
            if let LazyState::Pending(inner) = std::mem::replace(&mut self.state, LazyState::Poisoned)
            {
                self.state = LazyState::Decoding(GzDecoder::new(inner));
            }
        }
        match &mut self.state {
            LazyState::Decoding(decoder) => decoder.read(buf),
            _ => Err(io::Error::other("gzip decoder failed to initialize")),
        }
    }
}
