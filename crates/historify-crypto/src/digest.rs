//! Streaming `(sha256, blake3)` file digests.
//!
//! Every tracked file and every chain element carries both digests,
//! computed in a single pass through one reusable buffer. Symlinks are
//! never followed by callers; this module digests whatever regular file
//! it is handed.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Read buffer size for streaming hashing (1 MiB).
const BUF_LEN: usize = 1024 * 1024;

/// The digest pair recorded for every file: lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDigests {
    /// SHA-256 digest, lowercase hex (64 chars).
    pub sha256: String,
    /// BLAKE3 digest, lowercase hex (64 chars).
    pub blake3: String,
}

impl FileDigests {
    /// Digest an in-memory byte slice (used for chain elements in tests
    /// and for small derived files).
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            sha256: hex::encode(Sha256::digest(data)),
            blake3: blake3::hash(data).to_hex().to_string(),
        }
    }
}

/// Compute both digests of a regular file in a single streamed pass.
///
/// Zero-length files yield the canonical empty-input digests of each
/// algorithm. A transient open failure is retried once.
///
/// # Errors
///
/// Returns [`CryptoError::Io`] if the file cannot be opened or read.
pub fn digest_file(path: &Path) -> CryptoResult<FileDigests> {
    let mut file = open_retry(path).map_err(|e| CryptoError::io(path, e))?;
    digest_reader(&mut file).map_err(|e| CryptoError::io(path, e))
}

/// Open for reading, retrying once when the failure looks transient.
fn open_retry(path: &Path) -> std::io::Result<std::fs::File> {
    use std::io::ErrorKind;

    match std::fs::File::open(path) {
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ) =>
        {
            std::fs::File::open(path)
        },
        other => other,
    }
}

/// Compute both digests from any reader.
///
/// # Errors
///
/// Returns the underlying I/O error on read failure.
pub fn digest_reader(reader: &mut impl Read) -> std::io::Result<FileDigests> {
    let mut sha256 = Sha256::new();
    let mut blake3 = blake3::Hasher::new();
    let mut buf = vec![0u8; BUF_LEN];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sha256.update(&buf[..n]);
        blake3.update(&buf[..n]);
    }

    Ok(FileDigests {
        sha256: hex::encode(sha256.finalize()),
        blake3: blake3.finalize().to_hex().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn known_digests() {
        let digests = FileDigests::of_bytes(b"hello\n");
        assert_eq!(
            digests.sha256,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        assert_eq!(
            digests.blake3,
            "8e4c7c1b99dbfd50e7a95185fead5ee1448fa904a2fdd778eaf5f2dbfd629a99"
        );
    }

    #[test]
    fn empty_input_canonical() {
        let digests = FileDigests::of_bytes(b"");
        assert_eq!(
            digests.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            digests.blake3,
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let payload = b"some file content\nwith two lines\n";
        std::fs::File::create(&path)
            .unwrap()
            .write_all(payload)
            .unwrap();

        assert_eq!(digest_file(&path).unwrap(), FileDigests::of_bytes(payload));
    }

    #[test]
    fn large_file_spans_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one read buffer so the loop streams.
        let payload = vec![0xabu8; BUF_LEN + 4096];
        std::fs::write(&path, &payload).unwrap();

        assert_eq!(digest_file(&path).unwrap(), FileDigests::of_bytes(&payload));
    }

    #[test]
    fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = digest_file(&dir.path().join("absent"));
        assert!(matches!(result, Err(CryptoError::Io { .. })));
    }
}
