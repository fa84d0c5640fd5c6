//! Archive of public keys under `db/keys/`.
//!
//! Every public key used for signing is copied into the archive on first
//! use, keyed by its hex fingerprint. The verifier resolves keys from here
//! by the fingerprint embedded in each signature, so signatures made under
//! rotated-out keys remain verifiable.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{SignerError, SignerResult};
use crate::format::PublicKeyFile;

/// The public key archive directory.
#[derive(Debug, Clone)]
pub struct KeyArchive {
    dir: PathBuf,
}

impl KeyArchive {
    /// Open (or designate) the archive at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path a key with this fingerprint would be archived at.
    #[must_use]
    pub fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.pub"))
    }

    /// Archive a public key, keyed by its fingerprint.
    ///
    /// Idempotent: an identical archived copy is left untouched. A
    /// *different* key under the same fingerprint is an error.
    ///
    /// # Errors
    ///
    /// I/O errors, or [`SignerError::MalformedKey`] on fingerprint collision.
    pub fn archive(&self, key: &PublicKeyFile) -> SignerResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SignerError::io(&self.dir, e))?;

        let path = self.path_for(&key.fingerprint());
        let text = key.to_text();

        match std::fs::read_to_string(&path) {
            Ok(existing) => {
                let existing_key = PublicKeyFile::parse(&path, &existing)?;
                if existing_key.key != key.key {
                    return Err(SignerError::MalformedKey {
                        path,
                        reason: "different key already archived under this fingerprint"
                            .to_string(),
                    });
                }
                debug!(fingerprint = key.fingerprint(), "key already archived");
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::write(&path, text).map_err(|e| SignerError::io(&path, e))?;
                info!(fingerprint = key.fingerprint(), path = %path.display(), "archived public key");
            },
            Err(e) => return Err(SignerError::io(&path, e)),
        }

        Ok(path)
    }

    /// Find an archived key by fingerprint.
    ///
    /// # Errors
    ///
    /// I/O errors while probing the archive.
    pub fn find(&self, fingerprint: &str) -> SignerResult<Option<PathBuf>> {
        let path = self.path_for(fingerprint);
        if path.exists() {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    /// All archived keys as `(fingerprint, path)`, sorted by fingerprint.
    ///
    /// # Errors
    ///
    /// I/O errors while listing the archive.
    pub fn list(&self) -> SignerResult<Vec<(String, PathBuf)>> {
        let mut keys = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(SignerError::io(&self.dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| SignerError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "pub") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push((stem.to_string(), path.clone()));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Resolve the public key for a signature file from the archive.
///
/// # Errors
///
/// Returns [`SignerError::KeyMissing`] when no key with the signature's
/// fingerprint is archived.
pub fn key_for_signature(
    archive: &KeyArchive,
    sig_path: &Path,
) -> SignerResult<PathBuf> {
    let sig = crate::format::SignatureFile::read_from(sig_path)?;
    archive
        .find(&sig.fingerprint())?
        .ok_or_else(|| SignerError::KeyMissing {
            path: archive.path_for(&sig.fingerprint()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySigner;
    use crate::Signer as _;

    #[test]
    fn archive_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let archive = KeyArchive::new(dir.path().join("keys"));
        let signer = MemorySigner::generate();
        let key = signer.public_key_file();

        let path = archive.archive(&key).unwrap();
        assert!(path.exists());
        assert_eq!(
            archive.find(&key.fingerprint()).unwrap(),
            Some(path.clone())
        );

        // Idempotent.
        assert_eq!(archive.archive(&key).unwrap(), path);
        assert_eq!(archive.list().unwrap().len(), 1);
    }

    #[test]
    fn missing_fingerprint_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = KeyArchive::new(dir.path().join("keys"));
        assert_eq!(archive.find("0011223344556677").unwrap(), None);
    }

    #[test]
    fn key_for_signature_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let archive = KeyArchive::new(dir.path().join("keys"));
        let signer = MemorySigner::generate();
        archive.archive(&signer.public_key_file()).unwrap();

        let file = dir.path().join("target");
        std::fs::write(&file, "data").unwrap();
        let sig = signer.sign(&file).unwrap();

        let resolved = key_for_signature(&archive, &sig).unwrap();
        assert_eq!(
            resolved,
            archive.path_for(&signer.public_key_file().fingerprint())
        );
    }

    #[test]
    fn key_for_signature_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let archive = KeyArchive::new(dir.path().join("keys"));
        let signer = MemorySigner::generate();

        let file = dir.path().join("target");
        std::fs::write(&file, "data").unwrap();
        let sig = signer.sign(&file).unwrap();

        assert!(matches!(
            key_for_signature(&archive, &sig),
            Err(SignerError::KeyMissing { .. })
        ));
    }
}
