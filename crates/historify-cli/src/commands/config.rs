//! `config` and `check-config` - configuration management.

use std::path::Path;

use historify_chain::{ChangeEvent, EventPayload};
use historify_core::LockMode;

use super::{CommandError, open_repo, store_for};
use crate::theme;

/// Set a configuration value and record it in the open log.
pub(crate) fn set(repo_path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let mut repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Exclusive)?;

    repo.config_mut().set(key, value)?;

    // Administrative events land in the log only when one is open; before
    // the first start the config file alone carries the change.
    let store = store_for(&repo);
    if let Some(open) = store.open_log()? {
        store.append(
            &open.path,
            &[ChangeEvent::new(EventPayload::Config {
                key: key.to_string(),
                value: value.to_string(),
            })],
        )?;
    }

    println!("{}", theme::success(&format!("set {key} = {value}")));
    Ok(())
}

/// Check the configuration and report problems.
pub(crate) fn check(repo_path: &Path) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Shared)?;

    let issues = repo.config().check(repo.root());
    if issues.is_empty() {
        println!("{}", theme::success("configuration is consistent"));
        return Ok(());
    }

    println!("{}", theme::header("Configuration issues"));
    for issue in &issues {
        println!("  {}", theme::warning(&issue.to_string()));
    }
    Err(CommandError::ConfigIssues {
        count: issues.len(),
    }
    .into())
}
