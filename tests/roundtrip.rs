use std::ffi::OsStr;
use std::io::{Read, Write};
use std::sync::Arc;

use clap::Parser;
use tarstore::cli::{self, App};
use tarstore::{
    ArchiveReader, CappedReader, DirStore, DuplicatePolicy, EagerMemReader, LazyMemReader,
    MemoryStore, SpillOptions, SpillReader, StreamReader, TarWriter,
};

/// Test entries, including an empty member and one spanning several blocks
fn files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("A".to_string(), vec![1, 2, 3]),
        ("B".to_string(), vec![2, 3, 4, 5]),
        ("C".to_string(), vec![3, 4, 5, 6, 7]),
        ("dir/empty".to_string(), vec![]),
        (
            "dir/large.bin".to_string(),
            (0..5000u32).map(|i| (i % 251) as u8).collect(),
        ),
    ]
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Write,
    Create,
    Staged,
}

fn build(gzip: bool, mode: Mode) -> Vec<u8> {
    let mut writer = TarWriter::new(Vec::new(), gzip);
    if let Mode::Staged = mode {
        writer = writer.with_store(Arc::new(MemoryStore::new()));
    }
    for (name, data) in files() {
        match mode {
            Mode::Write => {
                writer.write(&name, &data).unwrap();
            }
            Mode::Create | Mode::Staged => {
                let mut entry = writer.create(&name).unwrap();
                for chunk in data.chunks(700) {
                    entry.write_all(chunk).unwrap();
                }
                entry.close().unwrap();
            }
        }
    }
    writer.close().unwrap()
}

fn readers(data: &[u8]) -> Vec<(&'static str, Box<dyn ArchiveReader>)> {
    let owned = Arc::new(data.to_vec());
    let spill_gz = SpillOptions {
        gzip: true,
        ..Default::default()
    };

    let mut out: Vec<(&'static str, Box<dyn ArchiveReader>)> = Vec::new();
    out.push((
        "stream",
        Box::new(StreamReader::new(move || {
            Ok(std::io::Cursor::new(owned.to_vec()))
        })),
    ));
    out.push(("lazy", Box::new(LazyMemReader::from_reader(data).unwrap())));
    out.push((
        "eager",
        Box::new(EagerMemReader::from_reader(data, DuplicatePolicy::Reject).unwrap()),
    ));
    out.push((
        "spill",
        Box::new(
            SpillReader::from_reader(data, Arc::new(MemoryStore::new()), &SpillOptions::default())
                .unwrap(),
        ),
    ));
    out.push((
        "spill-gz",
        Box::new(
            SpillReader::from_reader(data, Arc::new(DirStore::temp().unwrap()), &spill_gz)
                .unwrap(),
        ),
    ));
    out.push((
        "capped-memory",
        Box::new(
            CappedReader::new(
                data,
                u64::MAX,
                Arc::new(MemoryStore::new()),
                &SpillOptions::default(),
            )
            .unwrap(),
        ),
    ));
    out.push((
        "capped-spill",
        Box::new(
            CappedReader::new(
                data,
                data.len() as u64 / 2,
                Arc::new(MemoryStore::new()),
                &spill_gz,
            )
            .unwrap(),
        ),
    ));
    out
}

#[test]
fn test_every_writer_mode_reads_back_through_every_reader() {
    for gzip in [false, true] {
        for mode in [Mode::Write, Mode::Create, Mode::Staged] {
            let data = build(gzip, mode);
            for (strategy, reader) in readers(&data) {
                let context = format!("{strategy} reader, {mode:?} mode, gzip {gzip}");

                for (name, want) in files() {
                    let got = reader.read(&name).unwrap();
                    assert_eq!(got, want, "{context}: contents of {name}");
                }

                let mut seen = Vec::new();
                reader
                    .for_each(&mut |name, payload| {
                        let mut buf = Vec::new();
                        payload.read_to_end(&mut buf)?;
                        seen.push((name.to_string(), buf));
                        Ok(())
                    })
                    .unwrap();
                assert_eq!(seen, files(), "{context}");

                let err = reader.open("not/in/archive").unwrap_err();
                assert!(err.is_not_found(), "{context}: {err:?}");
            }
        }
    }
}

#[test]
fn test_capped_reader_with_directory_store() {
    let data = build(true, Mode::Write);
    let dir = tempfile::tempdir().unwrap();
    let store = DirStore::new(dir.path()).unwrap();

    let reader = CappedReader::new(
        data.as_slice(),
        0,
        Arc::new(store),
        &SpillOptions::default(),
    )
    .unwrap();
    assert!(reader.is_spilled());
    assert_eq!(
        std::fs::read(dir.path().join("dir/large.bin")).unwrap(),
        files()[4].1
    );
    assert_eq!(reader.read("B").unwrap(), vec![2, 3, 4, 5]);
}

#[test]
fn test_cli_pack_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hello.txt");
    std::fs::write(&input, b"hello from tarstore").unwrap();
    let output = dir.path().join("out.tar.gz");
    let stage = dir.path().join("stage");

    let app = App::try_parse_from([
        OsStr::new("tarstore"),
        OsStr::new("pack"),
        output.as_os_str(),
        input.as_os_str(),
        OsStr::new("--gzip"),
        OsStr::new("--stage-dir"),
        stage.as_os_str(),
    ])
    .unwrap();
    cli::run(app).unwrap();

    let archive = std::fs::read(&output).unwrap();
    assert_eq!(&archive[..2], &[0x1f, 0x8b]);

    let reader = LazyMemReader::new(archive);
    let name = cli::commands::member_name(&input);
    assert!(!name.starts_with('/'));
    assert_eq!(reader.read(&name).unwrap(), b"hello from tarstore");

    // staged copies stay behind in the staging directory, gzip-framed
    let staged = std::fs::read(stage.join("0").join(&name)).unwrap();
    assert_eq!(&staged[..2], &[0x1f, 0x8b]);
}

/// Archive laid out like `tar cf x.tar dir/`: a directory record first
fn archive_with_directory() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_size(0);
    dir.set_mode(0o755);
    builder
        .append_data(&mut dir, "dir/", std::io::empty())
        .unwrap();
    let mut file = tar::Header::new_gnu();
    file.set_size(4);
    file.set_mode(0o644);
    builder
        .append_data(&mut file, "dir/file", &b"data"[..])
        .unwrap();
    builder.into_inner().unwrap()
}

#[test]
fn test_directory_records_are_skipped_by_every_strategy() {
    let data = archive_with_directory();

    let spilled = CappedReader::new(
        data.as_slice(),
        0,
        Arc::new(DirStore::temp().unwrap()),
        &SpillOptions::default(),
    )
    .unwrap();
    assert!(spilled.is_spilled());

    let in_memory = LazyMemReader::new(data.clone());
    for reader in [&spilled as &dyn ArchiveReader, &in_memory] {
        assert_eq!(reader.names().unwrap(), vec!["dir/file"]);
        assert_eq!(reader.read("dir/file").unwrap(), b"data");
    }
}
