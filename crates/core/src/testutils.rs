use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// An unsorted drop directory: one assignment, one image, and a report that
/// already has a copy in `Reports/`.
pub fn create_test_inbox() -> TempDir {
    let dir = TempDir::new().unwrap();

    write_file(
        dir.path(),
        "assignment_joe.txt",
        b"Student: Joe Smith\nHomework 1",
    );
    write_file(dir.path(), "photo.png", &PNG_HEADER);
    write_file(dir.path(), "report.txt", b"Quarterly numbers");

    fs::create_dir(dir.path().join("Reports")).unwrap();
    write_file(dir.path().join("Reports"), "report.txt", b"Last quarter");

    dir
}

fn write_file(dir: impl AsRef<Path>, name: &str, content: &[u8]) {
    fs::write(dir.as_ref().join(name), content).unwrap();
}
