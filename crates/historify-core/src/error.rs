//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from repository layout and locking operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The path is not an initialized historify repository.
    #[error("not a historify repository: {path}")]
    NotARepository {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The path already contains an initialized repository.
    #[error("repository already initialized: {path}")]
    AlreadyInitialized {
        /// The repository path.
        path: PathBuf,
    },

    /// Another process holds the repository lock.
    #[error("repository busy: another historify process holds the lock on {path}")]
    Busy {
        /// Path of the lockfile that could not be acquired.
        path: PathBuf,
    },

    /// The random seed is missing or has the wrong size.
    #[error("seed file invalid: {reason}")]
    SeedInvalid {
        /// Why the seed was rejected.
        reason: String,
    },

    /// Configuration problem while opening or initializing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error while touching repository files.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path the operation touched.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The key is not in `section.option` form.
    #[error("invalid config key {key:?}: use section.option format")]
    InvalidKey {
        /// The offending key.
        key: String,
    },

    /// The category name contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid category name {name:?}: allowed characters are [A-Za-z0-9_-]")]
    InvalidCategoryName {
        /// The offending name.
        name: String,
    },

    /// No category with this name is configured.
    #[error("unknown category: {name}")]
    UnknownCategory {
        /// The requested category name.
        name: String,
    },

    /// A category with this name already exists.
    #[error("category already exists: {name}")]
    DuplicateCategory {
        /// The duplicated name.
        name: String,
    },

    /// No categories are configured (scanning requires at least one).
    #[error("no categories configured: add one with add-category")]
    NoCategories,

    /// The config file could not be parsed.
    #[error("malformed config at {path} line {line}: {reason}")]
    Malformed {
        /// Path of the config file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// I/O error while reading or writing configuration.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path the operation touched.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
