//! Built-in signer: a fixed Ed25519 keypair producing the same detached
//! format as the external tool.
//!
//! Serves as the test double for everything that takes a [`Signer`], and
//! keeps the on-disk format honest: signatures written here verify with the
//! external tool and vice versa.

use std::path::{Path, PathBuf};

use chrono::Utc;
use historify_crypto::KeyPair;
use tracing::debug;

use crate::error::{SignerError, SignerResult};
use crate::format::{PublicKeyFile, SignatureFile};
use crate::{Signer, sig_path_for};

/// In-memory signer keyed by a fixed Ed25519 keypair.
#[derive(Debug)]
pub struct MemorySigner {
    keypair: KeyPair,
}

impl MemorySigner {
    /// Wrap an existing keypair.
    #[must_use]
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Generate a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    /// The public key file for this signer.
    #[must_use]
    pub fn public_key_file(&self) -> PublicKeyFile {
        PublicKeyFile::for_key(self.keypair.public_key())
    }
}

impl Signer for MemorySigner {
    fn sign(&self, file: &Path) -> SignerResult<PathBuf> {
        let content = std::fs::read(file).map_err(|e| SignerError::io(file, e))?;
        let signature = self.keypair.sign(&content);

        let name = file
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let trusted_comment = format!("timestamp:{}\tfile:{}", Utc::now().timestamp(), name);

        let mut global_input = Vec::with_capacity(64 + trusted_comment.len());
        global_input.extend_from_slice(&signature);
        global_input.extend_from_slice(trusted_comment.as_bytes());

        let sig = SignatureFile {
            untrusted_comment: "signature from historify built-in signer".to_string(),
            key_id: self.keypair.key_id(),
            signature,
            trusted_comment,
            global_signature: self.keypair.sign(&global_input),
        };

        let sig_path = sig_path_for(file);
        sig.write_to(&sig_path)?;
        debug!(file = %file.display(), "signed with built-in signer");
        Ok(sig_path)
    }

    fn verify(&self, file: &Path, sig: &Path, public_key: &Path) -> SignerResult<()> {
        let sig_file = SignatureFile::read_from(sig)?;
        let key_file = PublicKeyFile::read_from(public_key)?;

        if sig_file.key_id != key_file.key_id {
            return Err(SignerError::BadSignature {
                file: file.to_path_buf(),
            });
        }

        let content = std::fs::read(file).map_err(|e| SignerError::io(file, e))?;
        key_file
            .key
            .verify(&content, &sig_file.signature)
            .map_err(|_| SignerError::BadSignature {
                file: file.to_path_buf(),
            })?;
        key_file
            .key
            .verify(&sig_file.global_signed_bytes(), &sig_file.global_signature)
            .map_err(|_| SignerError::BadSignature {
                file: file.to_path_buf(),
            })?;
        Ok(())
    }

    fn public_key(&self) -> SignerResult<PublicKeyFile> {
        Ok(self.public_key_file())
    }
}
