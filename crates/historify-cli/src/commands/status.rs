//! `status` - repository overview.

use std::path::Path;

use chrono::{Duration, Utc};
use historify_core::LockMode;
use walkdir::WalkDir;

use super::{open_repo, resolved_roots, store_for};
use crate::theme;

pub(crate) fn run(repo_path: &Path, category: Option<&str>) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Shared)?;

    println!(
        "{}",
        theme::header(&format!(
            "Repository {}",
            repo.config().get("repository.name").unwrap_or("?")
        ))
    );
    println!("  path: {}", repo.root().display());
    if let Some(created) = repo.config().get("repository.created") {
        println!("  created: {created}");
    }

    let roots = resolved_roots(&repo, category)?;
    if !roots.is_empty() {
        println!("\n{}", theme::header("Categories"));
    }
    for (name, root) in &roots {
        let location = if root.starts_with(repo.root()) {
            "internal"
        } else {
            "external"
        };
        println!("  {name} ({location})");
        println!("    path: {}", root.display());
        if root.is_dir() {
            let (files, bytes) = category_totals(root);
            println!("    files: {files} ({})", human_size(bytes));
        } else {
            println!("    {}", theme::warning("data root does not exist"));
        }
    }

    let store = store_for(&repo);
    let logs = store.logs()?;
    let signed = logs.iter().filter(|l| l.signed).count();

    println!("\n{}", theme::header("Changelog"));
    println!("  total logs: {}", logs.len());
    println!("  signed logs: {signed}");

    match store.open_log()? {
        Some(open) => {
            println!("  open log: {}", open.name);
            let events = store.read_events(&open.path)?;
            if let Some(last) = events.last() {
                println!("  last activity: {}", last.timestamp.format("%Y-%m-%dT%H:%M:%SZ"));
            }
            let cutoff = Utc::now() - Duration::hours(24);
            let recent = events.iter().filter(|e| e.timestamp > cutoff).count();
            println!("  changes in last 24h: {recent}");
        },
        None => {
            println!(
                "  {}",
                theme::info("no open changelog - run start to open one")
            );
        },
    }

    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["bytes", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} bytes")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `(file_count, total_bytes)` for a category root.
fn category_totals(root: &Path) -> (u64, u64) {
    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in WalkDir::new(root).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map_or(0, |m| m.len());
        }
    }
    (files, bytes)
}
