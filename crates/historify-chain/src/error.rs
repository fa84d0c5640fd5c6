//! Chain error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur on the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The chain structure is unusable (no open log, broken linkage).
    #[error("chain broken: {reason}")]
    ChainBroken {
        /// Why the chain is unusable.
        reason: String,
    },

    /// A changelog file is damaged (partial row, unparseable content).
    #[error("corrupt changelog {file}: {reason}")]
    LogCorrupt {
        /// The damaged file.
        file: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Replaying the logs produced an impossible state transition.
    #[error("inconsistent log: {kind} event for {category}/{path}: {reason}")]
    LogInconsistent {
        /// The event kind that could not be applied.
        kind: String,
        /// The event's category.
        category: String,
        /// The event's path.
        path: String,
        /// Why the transition is impossible.
        reason: String,
    },

    /// A row carried an event type this build does not know.
    #[error("unknown event type {value:?} in {file}")]
    UnknownEventType {
        /// The unrecognized `type` column value.
        value: String,
        /// The file the row came from.
        file: PathBuf,
    },

    /// The derived integrity index is damaged (recoverable by rebuild).
    #[error("integrity index corrupt: {reason}")]
    IndexCorrupt {
        /// What was wrong with the index.
        reason: String,
    },

    /// No log is open for appending.
    #[error("no open changelog: run start/closing first")]
    NoOpenLog,

    /// A signing or signature-verification failure.
    #[error(transparent)]
    Signer(#[from] historify_signer::SignerError),

    /// A digest computation failure.
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

impl ChainError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
