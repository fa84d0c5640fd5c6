//! Prior-state reconstruction: replaying the chain into the last known
//! file state.

use std::collections::BTreeMap;

use historify_crypto::FileDigests;
use tracing::{debug, warn};

use crate::error::{ChainError, ChainResult};
use crate::event::{ChangeEvent, EventPayload};
use crate::store::LogStore;

/// Last known state of one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Content digests.
    pub digests: FileDigests,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

/// `(category, relative path)` to last known state.
pub type StateMap = BTreeMap<(String, String), TrackedFile>;

/// One link of the closing chain: what a log claims about its predecessor.
#[derive(Debug, Clone)]
pub struct ClosingLink {
    /// The log whose `closing` row this is.
    pub log: String,
    /// The previous file named by the row (`seed.bin` or a changelog).
    pub prev: String,
    /// The digests the row records for the previous file.
    pub digests: FileDigests,
}

/// Result of a replay.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// The reconstructed last-known state.
    pub state: StateMap,
    /// The closing chain, one link per log that has a `closing` row.
    pub closings: Vec<ClosingLink>,
    /// Inconsistencies downgraded to warnings (non-strict mode only).
    pub warnings: Vec<ChainError>,
}

/// Replay all change logs in chronological order.
///
/// `category` restricts the reconstructed state (the closing chain is
/// always complete). With `strict` set, an impossible state transition
/// aborts with [`ChainError::LogInconsistent`]; otherwise it is recorded
/// as a warning and replay continues, never silently dropped.
///
/// # Errors
///
/// Log enumeration/parse errors, and inconsistencies in strict mode.
pub fn reconstruct(
    store: &LogStore,
    category: Option<&str>,
    strict: bool,
) -> ChainResult<ReplayOutcome> {
    let mut outcome = ReplayOutcome::default();

    for log in store.logs()? {
        let log_name = log.name.clone();
        store.for_each_event(&log.path, |event| {
            apply(&mut outcome, &log_name, event, category, strict)
        })?;
    }

    debug!(
        files = outcome.state.len(),
        closings = outcome.closings.len(),
        warnings = outcome.warnings.len(),
        "reconstructed state"
    );
    Ok(outcome)
}

fn apply(
    outcome: &mut ReplayOutcome,
    log_name: &str,
    event: ChangeEvent,
    category: Option<&str>,
    strict: bool,
) -> ChainResult<()> {
    if let EventPayload::Closing { digests, prev } = &event.payload {
        outcome.closings.push(ClosingLink {
            log: log_name.to_string(),
            prev: prev.clone(),
            digests: digests.clone(),
        });
        return Ok(());
    }

    let Some(event_category) = event.category() else {
        // config/comment/verify rows carry no file state.
        return Ok(());
    };
    if category.is_some_and(|c| c != event_category) {
        return Ok(());
    }

    let kind = event.kind();
    match event.payload {
        EventPayload::New {
            category,
            path,
            meta,
            digests,
        } => {
            let key = (category.clone(), path.clone());
            if outcome.state.contains_key(&key) {
                return note_inconsistency(
                    outcome,
                    strict,
                    kind,
                    &category,
                    &path,
                    "new event for a live path".to_string(),
                );
            }
            outcome.state.insert(
                key,
                TrackedFile {
                    digests,
                    size: meta.size,
                    mtime: meta.mtime,
                },
            );
        },
        EventPayload::Changed {
            category,
            path,
            meta,
            digests,
        } => {
            let key = (category.clone(), path.clone());
            if !outcome.state.contains_key(&key) {
                return note_inconsistency(
                    outcome,
                    strict,
                    kind,
                    &category,
                    &path,
                    "changed event for an unknown path".to_string(),
                );
            }
            outcome.state.insert(
                key,
                TrackedFile {
                    digests,
                    size: meta.size,
                    mtime: meta.mtime,
                },
            );
        },
        EventPayload::Move {
            category,
            path,
            meta,
            digests,
            from,
        } => {
            let old_key = (category.clone(), from.clone());
            if outcome.state.remove(&old_key).is_none() {
                return note_inconsistency(
                    outcome,
                    strict,
                    kind,
                    &category,
                    &path,
                    format!("move from unknown path {from:?}"),
                );
            }
            outcome.state.insert(
                (category, path),
                TrackedFile {
                    digests,
                    size: meta.size,
                    mtime: meta.mtime,
                },
            );
        },
        EventPayload::Deleted { category, path, .. } => {
            let key = (category.clone(), path.clone());
            if outcome.state.remove(&key).is_none() {
                return note_inconsistency(
                    outcome,
                    strict,
                    kind,
                    &category,
                    &path,
                    "deleted event for an unknown path".to_string(),
                );
            }
        },
        EventPayload::Closing { .. }
        | EventPayload::Config { .. }
        | EventPayload::Comment { .. }
        | EventPayload::Verify { .. } => {},
    }

    Ok(())
}

/// Record or raise an impossible state transition, depending on `strict`.
fn note_inconsistency(
    outcome: &mut ReplayOutcome,
    strict: bool,
    kind: crate::event::EventKind,
    category: &str,
    path: &str,
    reason: String,
) -> ChainResult<()> {
    let error = ChainError::LogInconsistent {
        kind: kind.to_string(),
        category: category.to_string(),
        path: path.to_string(),
        reason,
    };
    if strict {
        Err(error)
    } else {
        warn!(%error, "continuing past log inconsistency");
        outcome.warnings.push(error);
        Ok(())
    }
}
