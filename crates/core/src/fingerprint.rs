use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// Content digest of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDigest {
    pub hash: String,
    pub size: u64,
}

/// Hash a file in fixed-size chunks so large inputs never load fully into memory.
pub fn digest_file(path: &Path) -> io::Result<FileDigest> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(FileDigest {
        hash: hasher.finalize().to_hex().to_string(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hex(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    #[test]
    fn file_digest_matches_content_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"Homework 1").unwrap();

        let digest = digest_file(&path).unwrap();

        assert_eq!(digest.hash, hex(b"Homework 1"));
        assert_eq!(digest.size, 10);
    }

    #[test]
    fn digest_spans_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let content = vec![7u8; READ_CHUNK * 2 + 13];
        std::fs::write(&path, &content).unwrap();

        let digest = digest_file(&path).unwrap();

        assert_eq!(digest.size, content.len() as u64);
        assert_eq!(digest.hash, hex(&content));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(digest_file(Path::new("/nonexistent/file.bin")).is_err());
    }
}
