use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARCHIVE_EXTENSION: &str = ".tar.zst";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error(transparent)]
    Name(#[from] clerk_core::ResolveError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `<parent>/<name>.tar.zst`, or `<name>_N.tar.zst` when that already exists.
pub fn archive_path_for(dir: &Path) -> Result<PathBuf, ArchiveError> {
    let parent = dir.parent().unwrap_or(Path::new("."));
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::NotADirectory(dir.to_path_buf()))?;

    let free = clerk_core::naming::first_free(name, ARCHIVE_EXTENSION, None, |candidate| {
        parent.join(candidate).exists()
    })?;
    Ok(parent.join(free))
}

/// Pack `dir` into a zstd-compressed tarball next to it. Returns the archive path
/// and its size. The directory itself is left in place.
pub fn pack_directory(dir: &Path, level: i32) -> Result<(PathBuf, u64), ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::NotADirectory(dir.to_path_buf()));
    }
    let archive = archive_path_for(dir)?;
    let root_name = dir
        .file_name()
        .ok_or_else(|| ArchiveError::NotADirectory(dir.to_path_buf()))?;

    let output = File::create(&archive).map_err(io_err(&archive))?;
    let encoder = zstd::Encoder::new(BufWriter::new(output), level).map_err(io_err(&archive))?;

    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(root_name, dir)
        .map_err(io_err(dir))?;
    let encoder = builder.into_inner().map_err(io_err(&archive))?;
    encoder.finish().map_err(io_err(&archive))?;

    let size = std::fs::metadata(&archive).map_err(io_err(&archive))?.len();
    Ok((archive, size))
}

/// Pack `dir`, then remove it. The directory is only removed once the archive is complete.
pub fn archive_directory(dir: &Path, level: i32) -> Result<PathBuf, ArchiveError> {
    let (archive, _size) = pack_directory(dir, level)?;
    std::fs::remove_dir_all(dir).map_err(io_err(dir))?;
    Ok(archive)
}

/// Extract an archive produced by [`pack_directory`] into `dest`.
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let input = File::open(archive).map_err(io_err(archive))?;
    let decoder = zstd::Decoder::new(BufReader::new(input)).map_err(io_err(archive))?;
    std::fs::create_dir_all(dest).map_err(io_err(dest))?;
    tar::Archive::new(decoder)
        .unpack(dest)
        .map_err(io_err(archive))
}

pub fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(ARCHIVE_EXTENSION))
}
