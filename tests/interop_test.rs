//! Archives written here must read back with the `tar` crate, and archives the
//! `tar` crate writes (GNU long names, PAX records, duplicates) must index correctly.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tarseek::{build_index, pack, unpack::unpack, ExclusionList, SilentObserver};
use tempfile::tempdir;

fn append(builder: &mut tar::Builder<File>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(1_700_000_000);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}

fn read_at(archive: &Path, offset: u64, size: u64) -> Vec<u8> {
    let bytes = fs::read(archive).unwrap();
    bytes[offset as usize..(offset + size) as usize].to_vec()
}

#[test]
fn tar_crate_reads_our_archives() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("hello.txt"), b"hello world").unwrap();
    fs::create_dir_all(src.path().join("deep/er")).unwrap();
    fs::write(src.path().join("deep/er/data.bin"), vec![42u8; 4096]).unwrap();

    let out = tempdir().unwrap();
    let archive = out.path().join("ours.tar");
    let index = pack(src.path(), &archive, &ExclusionList::default(), &SilentObserver).unwrap();

    let mut reader = tar::Archive::new(File::open(&archive).unwrap());
    let mut seen = Vec::new();
    for entry in reader.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let recorded = index.info(&path).unwrap();
        assert_eq!(entry.raw_file_position(), recorded.offset);
        assert_eq!(entry.header().size().unwrap(), recorded.size);
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len() as u64, recorded.size);
        seen.push(path);
    }
    seen.sort();
    assert_eq!(seen, vec!["deep/er/data.bin".to_string(), "hello.txt".to_string()]);
}

#[test]
fn tar_crate_reads_our_long_paths() {
    let src = tempdir().unwrap();
    let dir = src.path().join("d".repeat(150)).join("e".repeat(150));
    fs::create_dir_all(&dir).unwrap();
    let name = format!("{}.bin", "f".repeat(110));
    fs::write(dir.join(&name), b"long path payload").unwrap();

    let out = tempdir().unwrap();
    let archive = out.path().join("long.tar");
    let index = pack(src.path(), &archive, &ExclusionList::default(), &SilentObserver).unwrap();
    let expected = format!("{}/{}/{}", "d".repeat(150), "e".repeat(150), name);

    let mut reader = tar::Archive::new(File::open(&archive).unwrap());
    let mut entries = reader.entries().unwrap();
    let mut entry = entries.next().unwrap().unwrap();
    assert_eq!(entry.path().unwrap().to_string_lossy(), expected);
    assert_eq!(entry.raw_file_position(), index.info(&expected).unwrap().offset);
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"long path payload");
}

#[test]
fn indexes_tar_crate_archives_with_long_names() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("theirs.tar");
    let long = format!("{}/{}/file.txt", "a".repeat(90), "b".repeat(90));
    {
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        append(&mut builder, "short.txt", b"short");
        append(&mut builder, &long, b"long contents");
        builder.finish().unwrap();
    }

    let index = build_index(&archive, &SilentObserver).unwrap();
    assert_eq!(index.len(), 2);
    let entry = index.info(&long).unwrap();
    assert_eq!(read_at(&archive, entry.offset, entry.size), b"long contents");
    assert_eq!(entry.mtime, Some(1_700_000_000));
}

#[test]
fn pax_path_records_override_header_names() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("pax.tar");
    {
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        builder
            .append_pax_extensions([("path", "renamed/by/pax.txt".as_bytes())])
            .unwrap();
        append(&mut builder, "placeholder.txt", b"pax payload");
        builder.finish().unwrap();
    }

    let index = build_index(&archive, &SilentObserver).unwrap();
    assert_eq!(index.list_paths(), vec!["renamed/by/pax.txt"]);
    let entry = index.info("renamed/by/pax.txt").unwrap();
    assert_eq!(read_at(&archive, entry.offset, entry.size), b"pax payload");
}

#[test]
fn duplicate_paths_keep_the_last_record() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("dup.tar");
    {
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        append(&mut builder, "dup.txt", b"first");
        append(&mut builder, "other.txt", b"other");
        append(&mut builder, "dup.txt", b"second version");
        builder.finish().unwrap();
    }

    let index = build_index(&archive, &SilentObserver).unwrap();
    assert_eq!(index.list_paths(), vec!["dup.txt", "other.txt"]);
    let entry = index.info("dup.txt").unwrap();
    assert_eq!(read_at(&archive, entry.offset, entry.size), b"second version");
}

#[test]
fn directory_entries_are_not_indexed() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("dots.tar");
    {
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "./sub/", std::io::empty()).unwrap();
        append(&mut builder, "./sub/inner.txt", b"inner");
        builder.finish().unwrap();
    }

    let index = build_index(&archive, &SilentObserver).unwrap();
    assert_eq!(index.list_paths(), vec!["sub/inner.txt"]);

    let root = unpack(&archive, dir.path(), &SilentObserver).unwrap();
    assert_eq!(fs::read(root.join("sub/inner.txt")).unwrap(), b"inner");
}
