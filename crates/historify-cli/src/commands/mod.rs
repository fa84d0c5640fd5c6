//! Command implementations and shared plumbing.

pub(crate) mod category;
pub(crate) mod comment;
pub(crate) mod config;
pub(crate) mod duplicates;
pub(crate) mod init;
pub(crate) mod lifecycle;
pub(crate) mod log;
pub(crate) mod scan;
pub(crate) mod snapshot;
pub(crate) mod status;
pub(crate) mod verify;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use historify_chain::{ChainResult, EventPayload, LogStore};
use historify_core::Repository;
use historify_signer::{CommandSigner, KeyArchive, PasswordSource};

/// Errors that exist only to carry an exit code out of a command.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    /// Verification finished with failures.
    #[error("verification failed with {failures} issue(s)")]
    VerificationFailed {
        /// Number of failures in the report.
        failures: usize,
    },

    /// check-config found problems.
    #[error("configuration has {count} issue(s)")]
    ConfigIssues {
        /// Number of issues found.
        count: usize,
    },
}

/// Open the repository at `path`.
pub(crate) fn open_repo(path: &Path) -> anyhow::Result<Repository> {
    Repository::open(path).with_context(|| format!("opening repository at {}", path.display()))
}

/// The log store over the repository's changes directory.
pub(crate) fn store_for(repo: &Repository) -> LogStore {
    LogStore::new(repo.changes_dir())
}

/// The public key archive under `db/keys/`.
pub(crate) fn archive_for(repo: &Repository) -> KeyArchive {
    KeyArchive::new(repo.keys_dir())
}

/// Build the external signer from the `minisign.*` configuration.
///
/// Relative key paths resolve against the repository root. Missing keys
/// surface as `KeyMissing` when signing is actually attempted.
pub(crate) fn signer_for(repo: &Repository) -> CommandSigner {
    let resolve = |value: Option<&str>| -> PathBuf {
        let path = PathBuf::from(value.unwrap_or_default());
        if path.is_absolute() || value.is_none() {
            path
        } else {
            repo.root().join(path)
        }
    };

    let secret = resolve(repo.config().get("minisign.key"));
    let public = resolve(repo.config().get("minisign.pub"));
    CommandSigner::new(secret, public, PasswordSource::EnvThenPrompt)
}

/// Resolved data roots per category, optionally filtered.
pub(crate) fn resolved_roots(
    repo: &Repository,
    category: Option<&str>,
) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let mut roots = BTreeMap::new();
    if let Some(name) = category {
        let cat = repo.config().category(name)?;
        roots.insert(cat.name().to_string(), cat.resolve_root(repo.root()));
    } else {
        for cat in repo.config().categories()? {
            roots.insert(cat.name().to_string(), cat.resolve_root(repo.root()));
        }
    }
    Ok(roots)
}

/// Relative paths of non-regular files already noted per category,
/// collected from prior `comment` rows.
pub(crate) fn noted_special(store: &LogStore) -> ChainResult<BTreeMap<String, BTreeSet<String>>> {
    let mut noted: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for log in store.logs()? {
        store.for_each_event(&log.path, |event| {
            if let EventPayload::Comment { message } = &event.payload {
                if let Some(rest) = message.strip_prefix("skipped non-regular file: ") {
                    if let Some((category, rel)) = rest.split_once('/') {
                        noted
                            .entry(category.to_string())
                            .or_default()
                            .insert(rel.to_string());
                    }
                }
            }
            Ok(())
        })?;
    }
    Ok(noted)
}
