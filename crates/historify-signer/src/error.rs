//! Signer error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while signing or verifying.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The configured signing key does not exist.
    #[error("signing key not found: {path}")]
    KeyMissing {
        /// The missing key path.
        path: PathBuf,
    },

    /// The key is encrypted and no password was available.
    #[error("signing key is encrypted and no password was provided")]
    PasswordRequired,

    /// The supplied password did not decrypt the key.
    #[error("incorrect password for signing key")]
    PasswordIncorrect,

    /// A signature failed to verify.
    #[error("bad signature for {file}")]
    BadSignature {
        /// The file whose signature failed.
        file: PathBuf,
    },

    /// The external signing tool could not be run.
    #[error("signer unavailable: {reason}")]
    SignerUnavailable {
        /// Why the signer could not be used.
        reason: String,
    },

    /// The external signing tool did not finish in time.
    #[error("signer timed out after {seconds}s")]
    Timeout {
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// A signature file could not be parsed.
    #[error("malformed signature file {path}: {reason}")]
    MalformedSignature {
        /// The signature file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// A public key file could not be parsed.
    #[error("malformed public key file {path}: {reason}")]
    MalformedKey {
        /// The key file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Underlying cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] historify_crypto::CryptoError),

    /// I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path the operation touched.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl SignerError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for signer operations.
pub type SignerResult<T> = Result<T, SignerError>;
