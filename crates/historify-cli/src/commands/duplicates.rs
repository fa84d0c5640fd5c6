//! `duplicates` - report live files with identical content.

use std::path::Path;

use historify_chain::reconstruct;
use historify_core::LockMode;
use historify_scan::find_duplicates;

use super::{open_repo, store_for};
use crate::theme;

pub(crate) fn run(repo_path: &Path, category: Option<&str>) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Shared)?;

    if let Some(name) = category {
        // Fail early on unknown categories instead of reporting nothing.
        repo.config().category(name)?;
    }

    let store = store_for(&repo);
    let outcome = reconstruct(&store, category, false)?;
    let groups = find_duplicates(&outcome.state);

    if groups.is_empty() {
        println!("{}", theme::success("no duplicate content found"));
        return Ok(());
    }

    println!("{}", theme::header("Duplicate content"));
    for group in &groups {
        println!(
            "  {} ({} bytes, {} copies)",
            &group.blake3[..16],
            group.size,
            group.files.len()
        );
        for (cat, path) in &group.files {
            println!("    {cat}/{path}");
        }
    }
    Ok(())
}
