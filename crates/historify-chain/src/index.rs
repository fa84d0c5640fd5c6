//! Derived integrity index: `db/integrity.csv`.
//!
//! A flat serialization of the reconstructed state for fast status/log
//! queries, one `category,path,size,mtime,sha256,blake3` row per live
//! file. Never a source of truth: it is rebuilt from the logs whenever it
//! is missing, stale or damaged, and conflicts always resolve in favor of
//! the logs.

use std::io::Write;
use std::path::Path;

use historify_crypto::FileDigests;
use tracing::info;

use crate::error::{ChainError, ChainResult};
use crate::replay::{StateMap, TrackedFile, reconstruct};
use crate::store::LogStore;

/// Write the index atomically (temp file + rename).
///
/// # Errors
///
/// I/O errors from writing or renaming.
pub fn write_index(path: &Path, state: &StateMap) -> ChainResult<()> {
    let mut content = String::new();
    for ((category, rel_path), file) in state {
        let fields = [
            category.as_str(),
            rel_path.as_str(),
            &file.size.to_string(),
            &file.mtime.to_string(),
            &file.digests.sha256,
            &file.digests.blake3,
        ];
        let line = fields.map(quote_field).join(",");
        content.push_str(&line);
        content.push('\n');
    }

    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| ChainError::io(parent, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| ChainError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| ChainError::io(path, e.error))?;
    Ok(())
}

/// Load the index.
///
/// # Errors
///
/// [`ChainError::IndexCorrupt`] when the file cannot be read or parsed.
pub fn load_index(path: &Path) -> ChainResult<StateMap> {
    let file = std::fs::File::open(path).map_err(|e| ChainError::IndexCorrupt {
        reason: format!("cannot open {}: {e}", path.display()),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut state = StateMap::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ChainError::IndexCorrupt {
            reason: format!("row {}: {e}", idx + 1),
        })?;
        let fields: Vec<&str> = record.iter().collect();
        if fields.len() != 6 {
            return Err(ChainError::IndexCorrupt {
                reason: format!("row {}: expected 6 columns, got {}", idx + 1, fields.len()),
            });
        }
        let size = fields[2].parse::<u64>().map_err(|_| ChainError::IndexCorrupt {
            reason: format!("row {}: bad size {:?}", idx + 1, fields[2]),
        })?;
        let mtime = fields[3].parse::<i64>().map_err(|_| ChainError::IndexCorrupt {
            reason: format!("row {}: bad mtime {:?}", idx + 1, fields[3]),
        })?;
        state.insert(
            (fields[0].to_string(), fields[1].to_string()),
            TrackedFile {
                digests: FileDigests {
                    sha256: fields[4].to_string(),
                    blake3: fields[5].to_string(),
                },
                size,
                mtime,
            },
        );
    }
    Ok(state)
}

/// Rebuild the index from the logs and write it.
///
/// # Errors
///
/// Replay and I/O errors.
pub fn rebuild_index(store: &LogStore, path: &Path) -> ChainResult<StateMap> {
    let outcome = reconstruct(store, None, false)?;
    write_index(path, &outcome.state)?;
    info!(path = %path.display(), files = outcome.state.len(), "rebuilt integrity index");
    Ok(outcome.state)
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"']) || field.contains(char::is_whitespace) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
