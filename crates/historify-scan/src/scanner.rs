//! The category scanner: walk, classify, detect moves, order events.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use historify_chain::{ChangeEvent, EventPayload, FileMeta, TrackedFile};
use historify_crypto::{FileDigests, digest_file};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ScanError, ScanResult};

/// Inputs for scanning one category.
#[derive(Debug)]
pub struct ScanConfig<'a> {
    /// The category name.
    pub category: &'a str,
    /// The resolved data root.
    pub root: &'a Path,
    /// Prior state for this category, keyed by relative path.
    pub prior: &'a BTreeMap<String, TrackedFile>,
    /// Absolute paths the walker must not descend into (the repository's
    /// metadata and changes directories when nested inside the root).
    pub exclude: &'a [PathBuf],
    /// Relative paths of non-regular files already noted in earlier scans.
    pub noted_special: &'a BTreeSet<String>,
}

struct NewCandidate {
    rel: String,
    meta: FileMeta,
    digests: FileDigests,
}

/// Scan one category against its prior state.
///
/// Returns the ordered batch of events, all stamped with `started`. The
/// walk is depth-first with a stable order; hashing is deferred until a
/// `(size, mtime)` comparison demands it. Candidate `new`/`deleted` pairs
/// with identical blake3 coalesce into `move` events before anything is
/// emitted.
///
/// # Errors
///
/// [`ScanError::RootMissing`] when the data root is absent, walk and
/// digest errors. On error nothing has been written anywhere.
pub fn scan_category(
    config: &ScanConfig<'_>,
    started: DateTime<Utc>,
) -> ScanResult<Vec<ChangeEvent>> {
    if !config.root.is_dir() {
        return Err(ScanError::RootMissing {
            category: config.category.to_string(),
            path: config.root.to_path_buf(),
        });
    }

    let mut events: Vec<ChangeEvent> = Vec::new();
    let mut news: Vec<NewCandidate> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    let exclude = config.exclude;
    let walker = WalkDir::new(config.root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path() == x.as_path()));

    for entry in walker {
        let entry = entry.map_err(|e| ScanError::Walk {
            root: config.root.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().is_dir() {
            continue;
        }

        let rel = rel_posix(entry.path(), config.root);

        if !entry.file_type().is_file() {
            // Symlinks, fifos, sockets, devices are not tracked; note the
            // skip the first time the path shows up.
            if !config.noted_special.contains(&rel) {
                debug!(category = config.category, path = rel, "skipping non-regular file");
                events.push(ChangeEvent::at(
                    started,
                    EventPayload::Comment {
                        message: format!(
                            "skipped non-regular file: {}/{rel}",
                            config.category
                        ),
                    },
                ));
            }
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            // Transient stat failures get one retry before the scan aborts.
            Err(e) if is_transient_walk_error(&e) => entry
                .path()
                .symlink_metadata()
                .map_err(|io| ScanError::Io {
                    path: entry.path().to_path_buf(),
                    source: io,
                })?,
            Err(e) => {
                return Err(ScanError::Walk {
                    root: config.root.to_path_buf(),
                    source: e,
                });
            },
        };
        let (mtime, ctime) = file_times(&metadata);
        let meta = FileMeta {
            size: metadata.len(),
            ctime,
            mtime,
        };

        seen.insert(rel.clone());

        match config.prior.get(&rel) {
            None => {
                // Candidate new: this is the point where hashing becomes
                // unavoidable.
                let digests = digest_file(entry.path())?;
                news.push(NewCandidate { rel, meta, digests });
            },
            Some(record) => {
                if record.size == meta.size && record.mtime == meta.mtime {
                    // Unchanged by metadata; not hashed.
                    continue;
                }
                let digests = digest_file(entry.path())?;
                if digests == record.digests {
                    // Touched but content-identical: no event.
                    continue;
                }
                events.push(ChangeEvent::at(
                    started,
                    EventPayload::Changed {
                        category: config.category.to_string(),
                        path: rel,
                        meta,
                        digests,
                    },
                ));
            },
        }
    }

    // Whatever the walk did not encounter is a candidate deletion.
    let deleted: Vec<(&String, &TrackedFile)> = config
        .prior
        .iter()
        .filter(|(rel, _)| !seen.contains(*rel))
        .collect();
    let mut claimed = vec![false; deleted.len()];

    // Move detection: pair candidate news with candidate deletions by
    // identical blake3 before emitting either side.
    news.sort_by(|a, b| a.rel.cmp(&b.rel));
    for candidate in news {
        let mut best: Option<usize> = None;
        for (idx, (old_rel, old_record)) in deleted.iter().enumerate() {
            if claimed[idx] || old_record.digests.blake3 != candidate.digests.blake3 {
                continue;
            }
            // Longest shared path prefix wins; deleted iterates in path
            // order, so the first maximum also settles ties.
            let better = match best {
                None => true,
                Some(current) => {
                    common_prefix_len(old_rel, &candidate.rel)
                        > common_prefix_len(deleted[current].0, &candidate.rel)
                },
            };
            if better {
                best = Some(idx);
            }
        }

        match best {
            Some(idx) => {
                claimed[idx] = true;
                let (old_rel, old_record) = deleted[idx];
                events.push(ChangeEvent::at(
                    started,
                    EventPayload::Move {
                        category: config.category.to_string(),
                        path: candidate.rel,
                        meta: candidate.meta,
                        digests: old_record.digests.clone(),
                        from: old_rel.clone(),
                    },
                ));
            },
            None => {
                events.push(ChangeEvent::at(
                    started,
                    EventPayload::New {
                        category: config.category.to_string(),
                        path: candidate.rel,
                        meta: candidate.meta,
                        digests: candidate.digests,
                    },
                ));
            },
        }
    }

    for (idx, (old_rel, old_record)) in deleted.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        events.push(ChangeEvent::at(
            started,
            EventPayload::Deleted {
                category: config.category.to_string(),
                path: (*old_rel).clone(),
                meta: FileMeta {
                    size: old_record.size,
                    ctime: None,
                    mtime: old_record.mtime,
                },
                digests: old_record.digests.clone(),
            },
        ));
    }

    events.sort_by_key(ChangeEvent::sort_key);
    info!(
        category = config.category,
        events = events.len(),
        "scan classified changes"
    );
    Ok(events)
}

/// Relative path in POSIX form (forward slashes).
fn rel_posix(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Byte length of the shared prefix of two paths.
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Whether a walk error wraps a transient I/O failure worth one retry.
fn is_transient_walk_error(error: &walkdir::Error) -> bool {
    use std::io::ErrorKind;

    error.io_error().is_some_and(|io| {
        matches!(
            io.kind(),
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
        )
    })
}

#[cfg(unix)]
fn file_times(metadata: &std::fs::Metadata) -> (i64, Option<i64>) {
    use std::os::unix::fs::MetadataExt;
    (metadata.mtime(), Some(metadata.ctime()))
}

#[cfg(not(unix))]
fn file_times(metadata: &std::fs::Metadata) -> (i64, Option<i64>) {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64);
    (mtime, None)
}
