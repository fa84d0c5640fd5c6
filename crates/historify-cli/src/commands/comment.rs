//! `comment` - append an administrative note.

use std::path::Path;

use historify_chain::{ChainError, ChangeEvent, EventPayload};
use historify_core::LockMode;

use super::{open_repo, store_for};
use crate::theme;

pub(crate) fn run(repo_path: &Path, message: &str) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Exclusive)?;

    let store = store_for(&repo);
    let open = store.open_log()?.ok_or(ChainError::NoOpenLog)?;

    store.append(
        &open.path,
        &[ChangeEvent::new(EventPayload::Comment {
            message: message.to_string(),
        })],
    )?;

    println!("{}", theme::success(&format!("noted in {}", open.name)));
    Ok(())
}
