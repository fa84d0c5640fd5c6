//! `log` - display change history.

use std::path::Path;

use anyhow::bail;
use historify_chain::{ChainError, EventPayload};
use historify_core::LockMode;

use super::{open_repo, store_for};
use crate::theme;

pub(crate) fn run(
    repo_path: &Path,
    file: Option<&str>,
    category: Option<&str>,
) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Shared)?;
    let store = store_for(&repo);

    let log = match file {
        Some(selector) => {
            // Accept either a bare date or a full changelog file name.
            let name = if selector.ends_with(".csv") {
                selector.to_string()
            } else {
                format!("changelog-{selector}.csv")
            };
            let path = store.changes_dir().join(&name);
            if !path.exists() {
                bail!("no such changelog: {name}");
            }
            path
        },
        None => store.open_log()?.ok_or(ChainError::NoOpenLog)?.path,
    };

    println!(
        "{}",
        theme::header(&log.file_name().unwrap_or_default().to_string_lossy())
    );

    let mut shown = 0usize;
    store.for_each_event(&log, |event| {
        if category.is_some_and(|c| event.category() != Some(c)) {
            return Ok(());
        }
        shown += 1;

        let when = event.timestamp.format("%Y-%m-%dT%H:%M:%SZ");
        let line = match &event.payload {
            EventPayload::Closing { prev, .. } => format!("closing   prev={prev}"),
            EventPayload::New { category, path, .. } => format!("new       {category}/{path}"),
            EventPayload::Changed { category, path, .. } => {
                format!("changed   {category}/{path}")
            },
            EventPayload::Move {
                category,
                path,
                from,
                ..
            } => format!("move      {category}/{path} (from {from})"),
            EventPayload::Deleted { category, path, .. } => {
                format!("deleted   {category}/{path}")
            },
            EventPayload::Config { key, value } => format!("config    {key}={value}"),
            EventPayload::Comment { message } => format!("comment   {message}"),
            EventPayload::Verify { result, scope } => format!("verify    {result} ({scope})"),
        };
        println!("  {when}  {line}");
        Ok(())
    })?;

    if shown == 0 {
        println!("{}", theme::info("no matching entries"));
    }
    Ok(())
}
