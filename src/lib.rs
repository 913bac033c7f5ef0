//! Uniform access to tar archives, optionally gzip-compressed, whatever their
//! backing representation.
//!
//! Every strategy implements [`ArchiveReader`]: open a member by name, or
//! visit all members in archive order.
//!
//! - [`StreamReader`] re-opens its source for every request.
//! - [`LazyMemReader`] keeps the raw archive bytes and decodes on demand.
//! - [`EagerMemReader`] decodes once into a name to bytes map.
//! - [`SpillReader`] unpacks members into a [`FileStore`].
//! - [`CappedReader`] picks memory or spilling based on a size threshold.
//!
//! [`TarWriter`] produces archives these readers consume.

pub mod cli;
pub mod codec;
pub mod entry;
pub mod error;
pub mod reader;
pub mod sniff;
pub mod store;
pub mod writer;

pub use entry::Entry;
pub use error::{Error, Result};
pub use reader::{
    ArchiveReader, CappedReader, DuplicatePolicy, EagerMemReader, LazyMemReader, SpillOptions,
    SpillReader, StreamReader,
};
pub use store::{DirStore, FileStore, MemoryStore};
pub use writer::{EntryWriter, TarWriter};
