pub mod commands;
pub mod output;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::reader::{
    ArchiveReader, CappedReader, DEFAULT_THRESHOLD, DuplicatePolicy, EagerMemReader,
    LazyMemReader, SpillOptions, SpillReader, StreamReader,
};
use crate::store::{DirStore, FileStore};

/// tarstore
#[derive(Debug, Parser)]
#[command(name = "tarstore", version, about = "Inspect and build tar archives")]
pub struct App {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the members of an archive with their sizes
    Ls {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Write archive members to stdout
    Cat {
        #[command(flatten)]
        source: SourceArgs,
        /// Members to print, in order
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Build an archive from local files
    Pack {
        /// Output path, or `-` for stdout
        output: PathBuf,
        /// Files to add; their paths become the member names
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Gzip-compress the archive
        #[arg(long)]
        gzip: bool,
        /// Stage members in this directory before assembling the archive.
        /// The staged copies are left in place afterwards
        #[arg(long)]
        stage_dir: Option<PathBuf>,
    },
}

/// How the archive is held while it is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Keep small archives in memory and spill large ones
    Auto,
    /// Re-read the archive file for every request
    Stream,
    /// Buffer the archive and decode on every request
    Lazy,
    /// Decode the whole archive into memory up front
    Eager,
    /// Unpack every member into the spill directory
    Spill,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Archive path, or `-` for stdin
    pub archive: PathBuf,
    #[arg(long, value_enum, default_value_t = Strategy::Auto)]
    pub strategy: Strategy,
    /// Archives of at least this many bytes are spilled (auto strategy)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: u64,
    /// Directory for spilled members (default: a temporary directory)
    #[arg(long)]
    pub spill_dir: Option<PathBuf>,
    /// Gzip each spilled member
    #[arg(long)]
    pub gzip_entries: bool,
    /// Accept duplicate member names, keeping the last one
    #[arg(long)]
    pub allow_duplicates: bool,
}

impl SourceArgs {
    fn spill_options(&self) -> SpillOptions {
        SpillOptions {
            gzip: self.gzip_entries,
            duplicates: if self.allow_duplicates {
                DuplicatePolicy::LastWins
            } else {
                DuplicatePolicy::Reject
            },
        }
    }

    fn is_stdin(&self) -> bool {
        self.archive.as_os_str() == "-"
    }

    fn source(&self) -> Result<Box<dyn Read>> {
        if self.is_stdin() {
            return Ok(Box::new(io::stdin()));
        }
        let file = File::open(&self.archive)
            .with_context(|| format!("Failed to open {}", self.archive.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn store(&self) -> Result<Arc<dyn FileStore>> {
        match &self.spill_dir {
            Some(dir) => {
                let store = DirStore::new(dir)
                    .with_context(|| format!("Failed to use spill directory {}", dir.display()))?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(DeferredTempStore::default())),
        }
    }

    /// Build the reader selected on the command line
    pub fn open(&self) -> Result<Box<dyn ArchiveReader>> {
        let options = self.spill_options();
        let reader: Box<dyn ArchiveReader> = match self.strategy {
            Strategy::Stream => {
                if self.is_stdin() {
                    return Err(anyhow!("The stream strategy needs a file, not stdin"));
                }
                let path = self.archive.clone();
                Box::new(StreamReader::new(move || File::open(&path).map(BufReader::new)))
            }
            Strategy::Lazy => Box::new(LazyMemReader::from_reader(self.source()?)?),
            Strategy::Eager => Box::new(EagerMemReader::from_reader(
                self.source()?,
                options.duplicates,
            )?),
            Strategy::Spill => Box::new(SpillReader::from_reader(
                self.source()?,
                self.store()?,
                &options,
            )?),
            Strategy::Auto => {
                let reader =
                    CappedReader::new(self.source()?, self.threshold, self.store()?, &options)?;
                debug!("auto strategy selected spilling: {}", reader.is_spilled());
                Box::new(reader)
            }
        };
        Ok(reader)
    }
}

/// Temporary directory store that only touches the disk once something is
/// written to it.
#[derive(Default)]
struct DeferredTempStore {
    inner: Mutex<Option<DirStore>>,
}

impl DeferredTempStore {
    fn get(&self, create: bool) -> io::Result<Option<DirStore>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("spill store lock poisoned"))?;
        if inner.is_none() && create {
            *inner = Some(DirStore::temp()?);
        }
        Ok(inner.clone())
    }
}

impl FileStore for DeferredTempStore {
    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        match self.get(true)? {
            Some(store) => store.create(name),
            None => Err(io::Error::other("spill directory unavailable")),
        }
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.get(false)? {
            Some(store) => store.open(name),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file in store: {name}"),
            )),
        }
    }
}

/// Run a parsed command line
pub fn run(app: App) -> Result<()> {
    match app.cmd {
        Command::Ls { source } => commands::ls(&source),
        Command::Cat { source, names } => commands::cat(&source, &names),
        Command::Pack {
            output,
            files,
            gzip,
            stage_dir,
        } => commands::pack(&output, &files, gzip, stage_dir.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let app = App::try_parse_from(["tarstore", "ls", "archive.tar"]).unwrap();
        match app.cmd {
            Command::Ls { source } => {
                assert_eq!(source.strategy, Strategy::Auto);
                assert_eq!(source.threshold, DEFAULT_THRESHOLD);
                assert!(!source.gzip_entries);
                assert_eq!(source.spill_options().duplicates, DuplicatePolicy::Reject);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_strategy_flags() {
        let app = App::try_parse_from([
            "tarstore",
            "cat",
            "--strategy",
            "spill",
            "--gzip-entries",
            "--allow-duplicates",
            "archive.tgz",
            "a",
            "b",
        ])
        .unwrap();
        match app.cmd {
            Command::Cat { source, names } => {
                assert_eq!(source.strategy, Strategy::Spill);
                assert!(source.spill_options().gzip);
                assert_eq!(source.spill_options().duplicates, DuplicatePolicy::LastWins);
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_deferred_store_stays_off_disk_until_written() {
        let store = DeferredTempStore::default();
        let err = store.open("A").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(store.get(false).unwrap().is_none());

        let mut w = store.create("A").unwrap();
        w.write_all(b"spilled").unwrap();
        w.flush().unwrap();
        drop(w);
        let mut out = String::new();
        store.open("A").unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "spilled");
    }
}
