//! End-to-end exercise of the three pieces a publish walks through in
//! sequence: resolving an upload target under a project root, extracting
//! an uploaded archive into staging, and checksumming the result —
//! against real files on disk rather than in-memory buffers.

use std::fs::{self, File};
use std::io::Write;

use pifs_store::archive::{extract_archive, sanitise_extracted_tree};
use pifs_store::checksum::digest;
use pifs_store::path::resolve;
use tempfile::tempdir;

#[test]
fn resolved_upload_path_stays_inside_project_root() {
    let project = tempdir().unwrap();
    let target = resolve(project.path(), "reports/q1.pdf").unwrap();
    assert!(target.starts_with(project.path()));

    let err = resolve(project.path(), "../../etc/passwd").unwrap_err();
    assert_eq!(err.to_string(), "path escapes project root: ../../etc/passwd");
}

#[test]
fn archive_extracts_into_staging_and_checksums_match_content() {
    let root = tempdir().unwrap();
    let archive_path = root.path().join("upload.zip");
    {
        let file = File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("docs/readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"pre-ingest file storage").unwrap();
        writer.finish().unwrap();
    }

    let staging = root.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    let entries = extract_archive(&archive_path, &staging).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].relative_path.to_str().unwrap(), "docs/readme.txt");

    sanitise_extracted_tree(&staging).unwrap();

    let extracted_path = staging.join("docs/readme.txt");
    let digests = digest(File::open(&extracted_path).unwrap(), None).unwrap();
    let expected = digest(std::io::Cursor::new(b"pre-ingest file storage"), None).unwrap();
    assert_eq!(digests.md5, expected.md5);
}

#[test]
fn archive_member_escaping_staging_dir_is_rejected_before_any_write() {
    let root = tempdir().unwrap();
    let archive_path = root.path().join("evil.zip");
    {
        let file = File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("../../outside.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"x").unwrap();
        writer.finish().unwrap();
    }

    let staging = root.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    assert!(extract_archive(&archive_path, &staging).is_err());
    assert!(!root.path().join("outside.txt").exists());
}
