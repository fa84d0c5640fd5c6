//! `snapshot` - package a copy of the repository state.
//!
//! Produces a plain directory copy of the metadata and change logs
//! (optionally the category data too). Turning the copy into ISO or other
//! media formats is the job of external packaging tooling.

use std::path::Path;

use anyhow::{Context, bail};
use chrono::Utc;
use historify_core::LockMode;
use tracing::debug;
use walkdir::WalkDir;

use super::open_repo;
use crate::theme;

pub(crate) fn run(
    repo_path: &Path,
    outdir: &Path,
    name: Option<&str>,
    full: bool,
) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Exclusive)?;

    let default_name = format!(
        "{}-{}",
        repo.config().get("repository.name").unwrap_or("historify"),
        Utc::now().format("%Y-%m-%d")
    );
    let dest = outdir.join(name.unwrap_or(&default_name));
    if dest.exists() {
        bail!("snapshot target already exists: {}", dest.display());
    }

    copy_tree(&repo.db_dir(), &dest.join("db"))?;
    copy_tree(&repo.changes_dir(), &dest.join("changes"))?;

    if full {
        for category in repo.config().categories()? {
            if category.is_external() {
                println!(
                    "{}",
                    theme::warning(&format!(
                        "skipping external category {} (outside the repository)",
                        category.name()
                    ))
                );
                continue;
            }
            let src = category.resolve_root(repo.root());
            if src.is_dir() {
                copy_tree(&src, &dest.join(category.path()))?;
            }
        }
    }

    println!(
        "{}",
        theme::success(&format!("snapshot written to {}", dest.display()))
    );
    Ok(())
}

/// Recursive copy preserving the tree layout; symlinks are not followed.
fn copy_tree(src: &Path, dest: &Path) -> anyhow::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("stripping {}", src.display()))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("copying to {}", target.display()))?;
        } else {
            debug!(path = %entry.path().display(), "snapshot skips non-regular file");
        }
    }
    Ok(())
}
