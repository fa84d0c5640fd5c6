//! Scan error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The category's data root does not exist or is not a directory.
    #[error("data root for category {category:?} is not a directory: {path}")]
    RootMissing {
        /// The category being scanned.
        category: String,
        /// The resolved root path.
        path: PathBuf,
    },

    /// The walker failed on an entry.
    #[error("walk error under {root}: {source}")]
    Walk {
        /// The data root being walked.
        root: PathBuf,
        /// The underlying walkdir error.
        #[source]
        source: walkdir::Error,
    },

    /// Digest computation failed.
    #[error(transparent)]
    Crypto(#[from] historify_crypto::CryptoError),

    /// Log access failed.
    #[error(transparent)]
    Chain(#[from] historify_chain::ChainError),

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

/// Result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;
