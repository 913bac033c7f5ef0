//! Transparent gzip detection.
//!
//! Archives may arrive either as plain tar or gzip-compressed tar. Rather than
//! relying on a file extension, the first two bytes of the stream are checked
//! against the gzip magic number. The bytes consumed for the check are
//! replayed in front of the remaining stream, so no seeking is required.

use flate2::read::MultiGzDecoder;
use log::trace;
use std::io::{self, Chain, Cursor, Read};

/// Leading bytes of every gzip member
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

type Replay<R> = Chain<Cursor<[u8; 2]>, R>;

/// A stream whose compression framing has been detected
pub enum Sniffed<R: Read> {
    /// Plain bytes, replayed unchanged
    Plain(Replay<R>),
    /// Gzip framing, decompressed on the fly
    Gzip(MultiGzDecoder<Replay<R>>),
}

impl<R: Read> Sniffed<R> {
    /// Whether the stream was detected as gzip
    pub fn is_gzip(&self) -> bool {
        matches!(self, Sniffed::Gzip(_))
    }
}

impl<R: Read> Read for Sniffed<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Sniffed::Plain(r) => r.read(buf),
            Sniffed::Gzip(r) => r.read(buf),
        }
    }
}

/// Peek at the first two bytes of `reader` and return a decompressing or
/// pass-through stream over the whole input.
///
/// Fails with `UnexpectedEof` when fewer than two bytes are available.
pub fn sniff<R: Read>(mut reader: R) -> io::Result<Sniffed<R>> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic)?;

    let replay = Cursor::new(magic).chain(reader);
    if magic == GZIP_MAGIC {
        trace!("gzip framing detected");
        Ok(Sniffed::Gzip(MultiGzDecoder::new(replay)))
    } else {
        trace!("no compression framing detected");
        Ok(Sniffed::Plain(replay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_plain_stream_is_replayed() {
        let mut sniffed = sniff(&b"hello world"[..]).unwrap();
        assert!(!sniffed.is_gzip());

        let mut out = Vec::new();
        sniffed.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_gzip_stream_is_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"compressed payload").unwrap();
        let data = encoder.finish().unwrap();

        let mut sniffed = sniff(data.as_slice()).unwrap();
        assert!(sniffed.is_gzip());

        let mut out = Vec::new();
        sniffed.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"compressed payload");
    }

    #[test]
    fn test_exactly_two_bytes() {
        let mut sniffed = sniff(&[7u8, 9][..]).unwrap();
        let mut out = Vec::new();
        sniffed.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![7, 9]);
    }

    #[test]
    fn test_short_input_fails() {
        let err = sniff(&[0x1fu8][..]).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = sniff(io::empty()).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
