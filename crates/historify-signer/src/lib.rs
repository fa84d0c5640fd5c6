//! Historify Signer - detached signatures over chain files.
//!
//! Every closed changelog and the repository seed carry a sibling `.sig`
//! file in minisign's detached format. Signing goes through the [`Signer`]
//! trait with two implementations:
//!
//! - [`CommandSigner`]: spawns the external `minisign` binary, feeding the
//!   key password over stdin and enforcing a timeout
//! - [`MemorySigner`]: a built-in Ed25519 signer producing the same on-disk
//!   format natively; the test double, and proof the formats interoperate
//!
//! Public keys seen in use are archived under `db/keys/<fingerprint>.pub`
//! so signatures stay verifiable across key rotation.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod command;
mod error;
mod format;
mod keyring;
mod memory;
mod password;

use std::path::{Path, PathBuf};

pub use command::CommandSigner;
pub use error::{SignerError, SignerResult};
pub use format::{PublicKeyFile, SignatureFile};
pub use keyring::{KeyArchive, key_for_signature};
pub use memory::MemorySigner;
pub use password::{PASSWORD_ENV, PasswordSource};

/// Suffix of detached signature files.
pub const SIG_SUFFIX: &str = "sig";

/// The detached signature path for a target file (`<name>.sig`).
#[must_use]
pub fn sig_path_for(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push('.');
    name.push_str(SIG_SUFFIX);
    file.with_file_name(name)
}

/// Abstraction over the external signing tool.
///
/// Implementations produce and validate detached signatures in minisign's
/// format. Verification code uses this interface uniformly, so the chain
/// never cares whether signatures come from the external binary or the
/// built-in signer.
pub trait Signer {
    /// Sign `file`, writing the detached signature as `<file>.sig`.
    ///
    /// Returns the path of the signature file.
    ///
    /// # Errors
    ///
    /// [`SignerError::KeyMissing`], [`SignerError::PasswordRequired`],
    /// [`SignerError::PasswordIncorrect`], [`SignerError::SignerUnavailable`]
    /// or I/O errors.
    fn sign(&self, file: &Path) -> SignerResult<PathBuf>;

    /// Verify the detached signature `sig` over `file` against the public
    /// key stored at `public_key`.
    ///
    /// # Errors
    ///
    /// [`SignerError::BadSignature`] on any mismatch, plus the failure modes
    /// of [`Signer::sign`].
    fn verify(&self, file: &Path, sig: &Path, public_key: &Path) -> SignerResult<()>;

    /// The signer's current public key, for archiving on first use.
    ///
    /// # Errors
    ///
    /// [`SignerError::KeyMissing`] or parse errors on the configured key.
    fn public_key(&self) -> SignerResult<PublicKeyFile>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sig_path_appends_suffix() {
        assert_eq!(
            sig_path_for(Path::new("/repo/changes/changelog-2026-08-02.csv")),
            PathBuf::from("/repo/changes/changelog-2026-08-02.csv.sig")
        );
        assert_eq!(
            sig_path_for(Path::new("seed.bin")),
            PathBuf::from("seed.bin.sig")
        );
    }
}
