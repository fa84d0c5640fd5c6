//! Minisign wire format: detached signatures and public key files.
//!
//! A signature file carries four lines:
//!
//! ```text
//! untrusted comment: <free text>
//! base64("Ed" || key_id(8) || signature(64))
//! trusted comment: <free text>
//! base64(global_signature(64))
//! ```
//!
//! The global signature covers `signature || trusted_comment`. A public key
//! file carries a comment line and `base64("Ed" || key_id || public_key)`.
//! The 8-byte key id, hex-encoded, is the fingerprint under which keys are
//! archived and by which the verifier selects them.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use historify_crypto::PublicKey;

use crate::error::{SignerError, SignerResult};

/// Signature algorithm tag: legacy Ed25519 over the raw file content.
const ALG: &[u8; 2] = b"Ed";

const UNTRUSTED_PREFIX: &str = "untrusted comment: ";
const TRUSTED_PREFIX: &str = "trusted comment: ";

/// A parsed detached signature file.
#[derive(Debug, Clone)]
pub struct SignatureFile {
    /// Free-text comment, not covered by any signature.
    pub untrusted_comment: String,
    /// Key id of the signing key (the fingerprint bytes).
    pub key_id: [u8; 8],
    /// Ed25519 signature over the file content.
    pub signature: [u8; 64],
    /// Free-text comment covered by the global signature.
    pub trusted_comment: String,
    /// Ed25519 signature over `signature || trusted_comment`.
    pub global_signature: [u8; 64],
}

impl SignatureFile {
    /// Parse the four-line signature format.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MalformedSignature`] on any structural problem.
    pub fn parse(path: &Path, text: &str) -> SignerResult<Self> {
        let malformed = |reason: &str| SignerError::MalformedSignature {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut lines = text.lines();
        let untrusted = lines
            .next()
            .and_then(|l| l.strip_prefix(UNTRUSTED_PREFIX))
            .ok_or_else(|| malformed("missing untrusted comment line"))?
            .to_string();

        let blob = BASE64
            .decode(lines.next().ok_or_else(|| malformed("missing signature line"))?)
            .map_err(|_| malformed("signature line is not valid base64"))?;
        if blob.len() != 2 + 8 + 64 {
            return Err(malformed("signature blob has wrong length"));
        }
        if &blob[..2] != ALG {
            return Err(malformed("unsupported signature algorithm"));
        }
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&blob[2..10]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&blob[10..74]);

        let trusted = lines
            .next()
            .and_then(|l| l.strip_prefix(TRUSTED_PREFIX))
            .ok_or_else(|| malformed("missing trusted comment line"))?
            .to_string();

        let global = BASE64
            .decode(
                lines
                    .next()
                    .ok_or_else(|| malformed("missing global signature line"))?,
            )
            .map_err(|_| malformed("global signature is not valid base64"))?;
        let global_signature: [u8; 64] = global
            .try_into()
            .map_err(|_| malformed("global signature has wrong length"))?;

        Ok(Self {
            untrusted_comment: untrusted,
            key_id,
            signature,
            trusted_comment: trusted,
            global_signature,
        })
    }

    /// Read and parse a signature file from disk.
    ///
    /// # Errors
    ///
    /// I/O errors plus the failures of [`SignatureFile::parse`].
    pub fn read_from(path: &Path) -> SignerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SignerError::io(path, e))?;
        Self::parse(path, &text)
    }

    /// Serialize to the four-line on-disk format.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut blob = Vec::with_capacity(2 + 8 + 64);
        blob.extend_from_slice(ALG);
        blob.extend_from_slice(&self.key_id);
        blob.extend_from_slice(&self.signature);

        format!(
            "{UNTRUSTED_PREFIX}{}\n{}\n{TRUSTED_PREFIX}{}\n{}\n",
            self.untrusted_comment,
            BASE64.encode(&blob),
            self.trusted_comment,
            BASE64.encode(self.global_signature),
        )
    }

    /// Write the signature file to disk.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from writing.
    pub fn write_to(&self, path: &Path) -> SignerResult<()> {
        std::fs::write(path, self.to_text()).map_err(|e| SignerError::io(path, e))
    }

    /// The hex fingerprint of the signing key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(self.key_id)
    }

    /// The bytes covered by the global signature.
    #[must_use]
    pub fn global_signed_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64 + self.trusted_comment.len());
        data.extend_from_slice(&self.signature);
        data.extend_from_slice(self.trusted_comment.as_bytes());
        data
    }
}

/// A parsed public key file.
#[derive(Debug, Clone)]
pub struct PublicKeyFile {
    /// Free-text comment line.
    pub comment: String,
    /// Key id (fingerprint bytes) as embedded in the file.
    pub key_id: [u8; 8],
    /// The Ed25519 public key.
    pub key: PublicKey,
}

impl PublicKeyFile {
    /// Build a key file for a public key, deriving the key id from the key.
    #[must_use]
    pub fn for_key(key: PublicKey) -> Self {
        Self {
            comment: format!("historify public key {}", key.fingerprint()),
            key_id: key.key_id(),
            key,
        }
    }

    /// Parse the two-line public key format.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MalformedKey`] on any structural problem.
    pub fn parse(path: &Path, text: &str) -> SignerResult<Self> {
        let malformed = |reason: &str| SignerError::MalformedKey {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut lines = text.lines();
        let comment = lines
            .next()
            .and_then(|l| l.strip_prefix(UNTRUSTED_PREFIX))
            .ok_or_else(|| malformed("missing comment line"))?
            .to_string();

        let blob = BASE64
            .decode(lines.next().ok_or_else(|| malformed("missing key line"))?)
            .map_err(|_| malformed("key line is not valid base64"))?;
        if blob.len() != 2 + 8 + 32 {
            return Err(malformed("key blob has wrong length"));
        }
        if &blob[..2] != ALG {
            return Err(malformed("unsupported key algorithm"));
        }
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&blob[2..10]);
        let key = PublicKey::try_from_slice(&blob[10..42])?;

        Ok(Self {
            comment,
            key_id,
            key,
        })
    }

    /// Read and parse a public key file from disk.
    ///
    /// # Errors
    ///
    /// I/O errors plus the failures of [`PublicKeyFile::parse`].
    pub fn read_from(path: &Path) -> SignerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SignerError::io(path, e))?;
        Self::parse(path, &text)
    }

    /// Serialize to the two-line on-disk format.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut blob = Vec::with_capacity(2 + 8 + 32);
        blob.extend_from_slice(ALG);
        blob.extend_from_slice(&self.key_id);
        blob.extend_from_slice(self.key.as_bytes());

        format!("{UNTRUSTED_PREFIX}{}\n{}\n", self.comment, BASE64.encode(&blob))
    }

    /// Write the key file to disk.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from writing.
    pub fn write_to(&self, path: &Path) -> SignerResult<()> {
        std::fs::write(path, self.to_text()).map_err(|e| SignerError::io(path, e))
    }

    /// The hex fingerprint of this key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(self.key_id)
    }
}
