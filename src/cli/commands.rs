use anyhow::{Context, Result};
use humansize::{DECIMAL, format_size};
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::SourceArgs;
use super::output::copy_out;
use crate::error::Error;
use crate::reader::ArchiveReader;
use crate::store::DirStore;
use crate::writer::TarWriter;

/// Raised from the listing callback once stdout has gone away
#[derive(Debug, thiserror::Error)]
#[error("output closed")]
struct OutputClosed;

/// List member names and sizes in archive order
pub fn ls(source: &SourceArgs) -> Result<()> {
    let reader = source.open()?;
    list(&*reader, io::stdout().lock())
}

/// Write one line per member to `out`, stopping early on a broken pipe
fn list(reader: &dyn ArchiveReader, mut out: impl Write) -> Result<()> {
    let result = reader.for_each(&mut |name, payload| {
        let size = io::copy(payload, &mut io::sink())?;
        match writeln!(out, "{:>10}  {}", format_size(size, DECIMAL), name) {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                Err(Error::handler(OutputClosed))
            }
            other => Ok(other?),
        }
    });
    match result {
        Err(Error::Handler(e)) if e.is::<OutputClosed>() => {
            debug!("stdout closed, listing stopped");
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Copy the named members to stdout
pub fn cat(source: &SourceArgs, names: &[String]) -> Result<()> {
    let reader = source.open()?;
    for name in names {
        let mut entry = reader
            .open(name)
            .with_context(|| format!("Failed to open {name}"))?;
        copy_out!(&mut entry);
    }
    Ok(())
}

/// Archive name for a local path: leading `/` and any `.` or `..`
/// components are dropped, as tar does.
pub fn member_name(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `files` into a new archive at `output`
pub fn pack(
    output: &Path,
    files: &[PathBuf],
    gzip: bool,
    stage_dir: Option<&Path>,
) -> Result<()> {
    let sink: Box<dyn Write> = if output.as_os_str() == "-" {
        Box::new(io::stdout().lock())
    } else {
        let file = File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        Box::new(BufWriter::new(file))
    };

    let mut writer = TarWriter::new(sink, gzip);
    if let Some(dir) = stage_dir {
        let store = DirStore::new(dir)
            .with_context(|| format!("Failed to use staging directory {}", dir.display()))?;
        writer = writer.with_store(Arc::new(store));
    }

    for path in files {
        let name = member_name(path);
        let mut file = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        let mut entry = writer.create(&name)?;
        io::copy(&mut file, &mut entry)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!("added {name} ({} bytes)", entry.written());
        entry.close()?;
    }

    let mut sink = writer.close()?;
    sink.flush()?;
    Ok(())
}
