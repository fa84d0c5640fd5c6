//! `add-category` - register a data root.

use std::path::Path;

use historify_chain::{ChangeEvent, EventPayload};
use historify_core::{Category, LockMode};

use super::{open_repo, store_for};
use crate::theme;

pub(crate) fn add(
    repo_path: &Path,
    name: &str,
    data_path: &Path,
    description: Option<String>,
) -> anyhow::Result<()> {
    let mut repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Exclusive)?;

    let category = Category::new(name, data_path, description)?;
    repo.config_mut().add_category(&category)?;

    let store = store_for(&repo);
    if let Some(open) = store.open_log()? {
        store.append(
            &open.path,
            &[ChangeEvent::new(EventPayload::Config {
                key: format!("category.{name}.path"),
                value: data_path.to_string_lossy().into_owned(),
            })],
        )?;
    }

    let kind = if category.is_external() {
        "external"
    } else {
        "internal"
    };
    println!(
        "{}",
        theme::success(&format!(
            "added {kind} category {name} at {}",
            data_path.display()
        ))
    );
    Ok(())
}
