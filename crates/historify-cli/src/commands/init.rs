//! `init` - create a new repository.

use std::path::Path;

use historify_core::Repository;

use crate::theme;

pub(crate) fn run(path: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let repo = Repository::init(path, name)?;
    println!(
        "{}",
        theme::success(&format!(
            "initialized repository {:?} at {}",
            repo.config().get("repository.name").unwrap_or("?"),
            repo.root().display()
        ))
    );
    println!(
        "{}",
        theme::info("next: add-category, configure minisign keys, then start")
    );
    Ok(())
}
