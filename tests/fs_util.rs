use std::fs::File;
use std::io::Write;

use zip::write::SimpleFileOptions;

use datavault_explorer::fs_util::{extract_zip, validate_zip};

fn write_archive(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn extract_returns_unpacked_file_paths() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("dataset.zip");
    write_archive(
        &archive,
        &[
            ("scrubbed.csv", b"a,b\n1,2\n"),
            ("nested/readme.txt", b"notes"),
        ],
    );

    validate_zip(&archive).unwrap();
    let extracted = extract_zip(&archive, dir.path()).unwrap();

    let mut names: Vec<&str> = extracted
        .iter()
        .filter_map(|path| path.file_name())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["readme.txt", "scrubbed.csv"]);
    assert_eq!(
        std::fs::read(dir.path().join("scrubbed.csv")).unwrap(),
        b"a,b\n1,2\n"
    );
}

#[test]
fn corrupt_archive_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("dataset.zip");
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    assert!(validate_zip(&archive).is_err());
}
