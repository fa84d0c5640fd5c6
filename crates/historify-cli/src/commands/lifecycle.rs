//! `start` / `closing` - sign the current state and open the next log.

use std::path::Path;

use historify_chain::ChainManager;
use historify_core::LockMode;

use super::{archive_for, open_repo, signer_for, store_for};
use crate::theme;

pub(crate) fn run(repo_path: &Path) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Exclusive)?;

    let store = store_for(&repo);
    let signer = signer_for(&repo);
    let archive = archive_for(&repo);
    let manager = ChainManager::new(&store, &signer, &archive, repo.seed_path());

    if store.logs()?.is_empty() {
        let first = manager.bootstrap()?;
        println!(
            "{}",
            theme::success(&format!(
                "signed seed and opened first changelog {}",
                first.file_name().unwrap_or_default().to_string_lossy()
            ))
        );
        return Ok(());
    }

    let outcome = manager.close_and_open()?;
    match &outcome.closed {
        Some(closed) => println!(
            "{}",
            theme::success(&format!("closed {closed}, opened {}", outcome.opened))
        ),
        None => println!(
            "{}",
            theme::success(&format!(
                "resumed interrupted closing, opened {}",
                outcome.opened
            ))
        ),
    }
    Ok(())
}
