pub mod capped;
pub mod memory;
pub mod spill;
pub mod stream;

use std::io::Read;

use crate::entry::Entry;
use crate::error::Result;

pub use capped::CappedReader;
pub use memory::{EagerMemReader, LazyMemReader};
pub use spill::SpillReader;
pub use stream::StreamReader;

/// Threshold used when the caller does not pick one (32 MiB)
pub const DEFAULT_THRESHOLD: u64 = 32 * 1024 * 1024;

/// Trait for the different archive backing strategies
pub trait ArchiveReader: Send + Sync {
    /// Open the named member. Fails with `Error::NotFound` when it is absent.
    fn open(&self, name: &str) -> Result<Entry>;

    /// Visit every member in archive order.
    ///
    /// The first error returned by `f` stops the iteration and is returned
    /// unchanged.
    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()>;

    /// Read a whole member into memory
    fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.open(name)?.into_bytes()?)
    }

    /// Names of all members, in archive order
    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.for_each(&mut |name, _| {
            names.push(name.to_string());
            Ok(())
        })?;
        Ok(names)
    }
}

impl<T: ArchiveReader + ?Sized> ArchiveReader for Box<T> {
    fn open(&self, name: &str) -> Result<Entry> {
        (**self).open(name)
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &mut dyn Read) -> Result<()>) -> Result<()> {
        (**self).for_each(f)
    }
}

/// What to do when an archive holds two members with the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail construction with `Error::DuplicateEntry`
    #[default]
    Reject,
    /// Keep the position of the first occurrence and the payload of the last
    LastWins,
}

/// Settings for readers that materialize the archive at construction
#[derive(Debug, Clone, Default)]
pub struct SpillOptions {
    /// Gzip every spilled member independently, stored as `<name>.gz`
    pub gzip: bool,
    pub duplicates: DuplicatePolicy,
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for the reader strategy tests.

    use std::io::{self, Read};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::ArchiveReader;
    use crate::error::Error;
    use crate::writer::TarWriter;

    pub const FILES: [(&str, &[u8]); 3] = [
        ("A", &[1, 2, 3]),
        ("B", &[2, 3, 4, 5]),
        ("C", &[3, 4, 5, 6, 7]),
    ];

    pub fn sample_archive(gzip: bool) -> Vec<u8> {
        let mut writer = TarWriter::new(Vec::new(), gzip);
        for (name, data) in FILES {
            writer.write(name, data).unwrap();
        }
        writer.close().unwrap()
    }

    pub fn collect(reader: &dyn ArchiveReader) -> Vec<(String, Vec<u8>)> {
        let mut got = Vec::new();
        reader
            .for_each(&mut |name, r| {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf)?;
                got.push((name.to_string(), buf));
                Ok(())
            })
            .unwrap();
        got
    }

    pub fn expected() -> Vec<(String, Vec<u8>)> {
        FILES
            .iter()
            .map(|(name, data)| (name.to_string(), data.to_vec()))
            .collect()
    }

    #[derive(Debug, thiserror::Error)]
    #[error("want error")]
    pub struct WantError;

    /// Runs the behaviour every strategy shares against `reader`
    pub fn check_reader(reader: &dyn ArchiveReader) {
        for (name, data) in FILES {
            let entry = reader.open(name).unwrap();
            assert_eq!(entry.into_bytes().unwrap(), data, "contents of {name}");
        }

        assert_eq!(collect(reader), expected());

        let err = reader.open("missing").unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err:?}");

        // a failing handler stops the walk and its error comes back as-is
        let mut seen = Vec::new();
        let err = reader
            .for_each(&mut |name, _| {
                seen.push(name.to_string());
                if seen.len() == 2 {
                    return Err(Error::handler(WantError));
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
        match err {
            Error::Handler(inner) => assert!(inner.downcast_ref::<WantError>().is_some()),
            other => panic!("wrong error returned: {other:?}"),
        }
    }

    /// Shared open/close counters for `Tracked` streams
    #[derive(Default)]
    pub struct Tracker {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl Tracker {
        pub fn track<R: Read>(self: &Arc<Self>, inner: R) -> Tracked<R> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Tracked {
                inner,
                tracker: Arc::clone(self),
            }
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        /// Streams opened but not yet dropped
        pub fn live(&self) -> usize {
            self.opened() - self.closed.load(Ordering::SeqCst)
        }
    }

    /// Stream double that records when it is released
    pub struct Tracked<R> {
        inner: R,
        tracker: Arc<Tracker>,
    }

    impl<R: Read> Read for Tracked<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R> Drop for Tracked<R> {
        fn drop(&mut self) {
            self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
