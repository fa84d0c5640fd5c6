//! Historify Core - repository layout, configuration and locking.
//!
//! A historify repository is a directory with a `db/` metadata area
//! (config, seed, archived public keys, derived index) and a changes
//! directory holding the dated changelog files that form the hash chain.
//!
//! This crate provides:
//! - [`Repository`]: the explicit handle every operation receives,
//!   constructed once per command
//! - [`ConfigStore`]: the INI-style `db/config` store with its CSV mirror
//! - [`Category`]: named views over data roots that scans operate on
//! - [`RepoLock`]: the advisory lock serializing write commands

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod category;
mod config;
mod error;
mod lock;
mod repo;

pub use category::Category;
pub use config::{ConfigIssue, ConfigStore};
pub use error::{ConfigError, ConfigResult, RepoError, RepoResult};
pub use lock::{LockMode, RepoLock};
pub use repo::{Repository, SEED_LEN};
