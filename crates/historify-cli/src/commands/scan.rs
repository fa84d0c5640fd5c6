//! `scan` - classify changes across categories and append them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Utc;
use historify_chain::{ChainError, ChangeEvent, EventKind, TrackedFile, reconstruct, write_index};
use historify_core::{ConfigError, LockMode};
use historify_scan::{ScanConfig, scan_category};

use super::{noted_special, open_repo, resolved_roots, store_for};
use crate::theme;

pub(crate) fn run(repo_path: &Path, category: Option<&str>) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Exclusive)?;

    let store = store_for(&repo);
    let open = store.open_log()?.ok_or(ChainError::NoOpenLog)?;

    let roots = resolved_roots(&repo, category)?;
    if roots.is_empty() {
        return Err(ConfigError::NoCategories.into());
    }

    let prior = reconstruct(&store, category, true)?;
    let noted = noted_special(&store)?;
    let empty = BTreeSet::new();
    let exclude = vec![repo.db_dir(), repo.changes_dir()];

    // One timestamp for the whole scan.
    let started = Utc::now();

    let mut events: Vec<ChangeEvent> = Vec::new();
    for (name, root) in &roots {
        let category_prior: BTreeMap<String, TrackedFile> = prior
            .state
            .iter()
            .filter(|((c, _), _)| c == name)
            .map(|((_, p), record)| (p.clone(), record.clone()))
            .collect();

        let batch = scan_category(
            &ScanConfig {
                category: name,
                root,
                prior: &category_prior,
                exclude: &exclude,
                noted_special: noted.get(name).unwrap_or(&empty),
            },
            started,
        )?;
        events.extend(batch);
    }
    events.sort_by_key(ChangeEvent::sort_key);

    // Buffered until here; one append makes the scan all-or-nothing.
    store.append(&open.path, &events)?;

    // Refresh the derived index to match the logs.
    let state = reconstruct(&store, None, false)?.state;
    write_index(&repo.integrity_path(), &state)?;

    let count = |kind: EventKind| events.iter().filter(|e| e.kind() == kind).count();
    println!(
        "{}",
        theme::success(&format!(
            "scan complete: {} new, {} changed, {} moved, {} deleted",
            count(EventKind::New),
            count(EventKind::Changed),
            count(EventKind::Move),
            count(EventKind::Deleted),
        ))
    );
    Ok(())
}
