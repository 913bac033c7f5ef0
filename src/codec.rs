//! Incremental tar decoding.
//!
//! `TarDecoder` walks a (decompressed) tar stream header by header and exposes
//! the payload of the current entry through `Read`. Unlike `tar::Archive`, the
//! decoder owns its input, so a partially consumed entry can be handed out as
//! an owned value together with everything it reads from.

use log::trace;
use std::io::{self, Read};
use tar::{EntryType, Header};

use crate::error::{Error, Result};

const TAR_BLOCK: u64 = 512;

/// Upper bound for GNU long-name and PAX records, which are buffered in memory
const MAX_META_SIZE: u64 = 1024 * 1024;

/// Header fields of one archive member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: String,
    pub size: u64,
    pub kind: EntryType,
}

/// Streaming cursor over the members of a tar archive
pub struct TarDecoder<R> {
    inner: R,
    /// Unread payload bytes of the current entry
    remaining: u64,
    /// Padding after the current entry's payload
    padding: u64,
    done: bool,
}

impl<R: Read> TarDecoder<R> {
    pub fn new(inner: R) -> Self {
        TarDecoder {
            inner,
            remaining: 0,
            padding: 0,
            done: false,
        }
    }

    /// Advance to the next member, skipping whatever is left of the current one.
    ///
    /// Returns `Ok(None)` at the end-of-archive marker or when the stream ends
    /// cleanly on a block boundary.
    pub fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.done {
            return Ok(None);
        }
        self.skip_payload()?;

        let mut long_name: Option<Vec<u8>> = None;
        loop {
            let mut header = Header::new_old();
            if !read_block(&mut self.inner, header.as_mut_bytes())? {
                self.done = true;
                return Ok(None);
            }

            if header.as_bytes().iter().all(|&b| b == 0) {
                self.done = true;
                return Ok(None);
            }

            verify_checksum(&header)?;

            let size = header
                .entry_size()
                .map_err(|e| Error::Format(format!("bad size field: {e}")))?;
            if size > u64::MAX - (TAR_BLOCK - 1) {
                return Err(Error::Format(format!("entry size out of range ({size} bytes)")));
            }
            let kind = header.entry_type();

            if kind.is_gnu_longname() {
                let mut name = self.read_meta(size)?;
                while name.last() == Some(&0) {
                    name.pop();
                }
                long_name = Some(name);
                continue;
            }
            if kind.is_pax_local_extensions() {
                let record = self.read_meta(size)?;
                if let Some(path) = pax_path(&record)? {
                    long_name = Some(path);
                }
                continue;
            }
            if kind.is_dir() {
                trace!("skipping directory entry");
                long_name = None;
                self.remaining = size;
                self.padding = padding(size);
                self.skip_payload()?;
                continue;
            }
            if kind.is_pax_global_extensions() || kind.is_gnu_longlink() {
                self.remaining = size;
                self.padding = padding(size);
                self.skip_payload()?;
                continue;
            }

            let name = match long_name.take() {
                Some(name) => String::from_utf8_lossy(&name).into_owned(),
                None => String::from_utf8_lossy(&header.path_bytes()).into_owned(),
            };
            trace!("tar entry {name:?} ({size} bytes)");

            self.remaining = size;
            self.padding = padding(size);
            return Ok(Some(EntryHeader { name, size, kind }));
        }
    }

    fn skip_payload(&mut self) -> io::Result<()> {
        let n = self.remaining + self.padding;
        if n == 0 {
            return Ok(());
        }
        let skipped = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())?;
        if skipped < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside entry payload",
            ));
        }
        self.remaining = 0;
        self.padding = 0;
        Ok(())
    }

    fn read_meta(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > MAX_META_SIZE {
            return Err(Error::Format(format!(
                "extended header record too large ({size} bytes)"
            )));
        }
        let mut data = vec![0u8; size as usize];
        self.inner.read_exact(&mut data)?;
        self.padding = padding(size);
        self.skip_payload()?;
        Ok(data)
    }
}

impl<R: Read> Read for TarDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside entry payload",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Fill `buf` completely, or report a clean end of stream when nothing was read
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated tar header",
        )),
    }
}

fn verify_checksum(header: &Header) -> Result<()> {
    let stored = header
        .cksum()
        .map_err(|e| Error::Format(format!("bad checksum field: {e}")))?;
    let bytes = header.as_bytes();
    // the checksum field itself counts as eight spaces
    let computed: u32 = bytes[..148]
        .iter()
        .chain(&[b' '; 8])
        .chain(&bytes[156..])
        .map(|&b| u32::from(b))
        .sum();
    if stored != computed {
        return Err(Error::Format(format!(
            "header checksum mismatch (stored {stored}, computed {computed})"
        )));
    }
    Ok(())
}

/// Padding needed to round `size` up to the next 512-byte boundary
fn padding(size: u64) -> u64 {
    (TAR_BLOCK - size % TAR_BLOCK) % TAR_BLOCK
}

/// Extract the `path` key from a PAX extended header record set
fn pax_path(mut data: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut path = None;
    while !data.is_empty() && data[0] != 0 {
        let space = data
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::Format("pax record without length".into()))?;
        let len: usize = std::str::from_utf8(&data[..space])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Format("pax record with invalid length".into()))?;
        if len <= space + 1 || len > data.len() {
            return Err(Error::Format("pax record length out of range".into()));
        }

        let record = &data[space + 1..len];
        let record = record.strip_suffix(b"\n").unwrap_or(record);
        if let Some(value) = record.strip_prefix(b"path=") {
            path = Some(value.to_vec());
        }
        data = &data[len..];
    }
    Ok(path)
}
