//! Append-only store of daily changelog files.
//!
//! Logs are named `changelog-YYYY-MM-DD[-N].csv` and enumerate in
//! chronological order. The single *open* log is the most recent file
//! without a `.sig` sibling; every older log must be signed. Appends are
//! line-atomic: rows are fully formatted in memory and written with one
//! `write_all`, so a trailing partial line on disk means the log is
//! corrupt.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::error::{ChainError, ChainResult};
use crate::event::{ChangeEvent, EventPayload};

/// One changelog file in the changes directory.
#[derive(Debug, Clone)]
pub struct LogFile {
    /// Full path of the log.
    pub path: PathBuf,
    /// Basename (`changelog-YYYY-MM-DD[-N].csv`).
    pub name: String,
    /// Whether a `.sig` sibling exists (closed).
    pub signed: bool,
}

impl LogFile {
    /// Path of the sibling signature file.
    #[must_use]
    pub fn sig_path(&self) -> PathBuf {
        historify_signer::sig_path_for(&self.path)
    }
}

/// Reader/writer over the changes directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    changes_dir: PathBuf,
}

impl LogStore {
    /// Create a store over the given changes directory.
    #[must_use]
    pub fn new(changes_dir: impl Into<PathBuf>) -> Self {
        Self {
            changes_dir: changes_dir.into(),
        }
    }

    /// The changes directory.
    #[must_use]
    pub fn changes_dir(&self) -> &Path {
        &self.changes_dir
    }

    /// All changelog files in chronological order.
    ///
    /// # Errors
    ///
    /// I/O errors while listing the directory.
    pub fn logs(&self) -> ChainResult<Vec<LogFile>> {
        let entries = match std::fs::read_dir(&self.changes_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChainError::io(&self.changes_dir, e)),
        };

        let mut logs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ChainError::io(&self.changes_dir, e))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = log_sort_key(name) else {
                continue;
            };
            let signed = historify_signer::sig_path_for(&path).exists();
            logs.push((
                key,
                LogFile {
                    path: path.clone(),
                    name: name.to_string(),
                    signed,
                },
            ));
        }

        logs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(logs.into_iter().map(|(_, l)| l).collect())
    }

    /// The single open (unsigned) log, if any.
    ///
    /// # Errors
    ///
    /// [`ChainError::ChainBroken`] if an unsigned log exists that is not
    /// the most recent, or if more than one log is unsigned.
    pub fn open_log(&self) -> ChainResult<Option<LogFile>> {
        let logs = self.logs()?;
        let unsigned: Vec<&LogFile> = logs.iter().filter(|l| !l.signed).collect();

        match unsigned.as_slice() {
            [] => Ok(None),
            [single] => {
                // The open log must be the chain tail.
                let is_last = logs.last().is_some_and(|l| l.name == single.name);
                if is_last {
                    Ok(Some((*single).clone()))
                } else {
                    Err(ChainError::ChainBroken {
                        reason: format!("unsigned log {} is not the most recent", single.name),
                    })
                }
            },
            many => Err(ChainError::ChainBroken {
                reason: format!(
                    "multiple open logs: {}",
                    many.iter()
                        .map(|l| l.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }

    /// A log name for `date` that does not collide with an existing file
    /// (`-2`, `-3`, ... suffixes on collision).
    #[must_use]
    pub fn unique_log_name(&self, date: NaiveDate) -> String {
        let base = format!("changelog-{}.csv", date.format("%Y-%m-%d"));
        if !self.changes_dir.join(&base).exists() {
            return base;
        }
        let mut counter = 2u32;
        loop {
            let name = format!("changelog-{}-{counter}.csv", date.format("%Y-%m-%d"));
            if !self.changes_dir.join(&name).exists() {
                return name;
            }
            counter += 1;
        }
    }

    /// Stream all events of a log through a callback.
    ///
    /// # Errors
    ///
    /// [`ChainError::LogCorrupt`] for partial trailing lines or unparseable
    /// rows, plus whatever the callback returns.
    pub fn for_each_event(
        &self,
        log: &Path,
        mut f: impl FnMut(ChangeEvent) -> ChainResult<()>,
    ) -> ChainResult<()> {
        check_complete(log)?;

        let file = open_retry(log).map_err(|e| ChainError::io(log, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        for record in reader.records() {
            let record = record.map_err(|e| ChainError::LogCorrupt {
                file: log.to_path_buf(),
                reason: format!("CSV parse error: {e}"),
            })?;
            let fields: Vec<String> = record.iter().map(str::to_string).collect();
            f(ChangeEvent::decode(log, &fields)?)?;
        }
        Ok(())
    }

    /// Read all events of a log into memory.
    ///
    /// # Errors
    ///
    /// See [`LogStore::for_each_event`].
    pub fn read_events(&self, log: &Path) -> ChainResult<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        self.for_each_event(log, |event| {
            events.push(event);
            Ok(())
        })?;
        Ok(events)
    }

    /// The timestamp of the last row, if the log has any.
    ///
    /// # Errors
    ///
    /// See [`LogStore::for_each_event`].
    pub fn last_timestamp(&self, log: &Path) -> ChainResult<Option<DateTime<Utc>>> {
        let mut last = None;
        self.for_each_event(log, |event| {
            last = Some(event.timestamp);
            Ok(())
        })?;
        Ok(last)
    }

    /// Append a batch of events to a log.
    ///
    /// The batch is formatted fully in memory and written with a single
    /// `write_all`. Timestamps must not go backwards relative to the last
    /// row: a batch stamped earlier is clamped to the last value, and a
    /// `comment` row documenting the clamp is prepended (never silently).
    ///
    /// # Errors
    ///
    /// [`ChainError::LogCorrupt`] if the log has a partial trailing line,
    /// plus I/O errors.
    pub fn append(&self, log: &Path, events: &[ChangeEvent]) -> ChainResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut floor = if log.exists() {
            self.last_timestamp(log)?
        } else {
            None
        };
        let mut buffer = String::new();
        let mut clamp_noted = false;

        for event in events {
            let mut event = event.clone();
            if let Some(floor) = floor {
                if event.timestamp < floor {
                    if !clamp_noted {
                        warn!(
                            log = %log.display(),
                            "wall clock moved backwards; clamping event timestamps"
                        );
                        let note = ChangeEvent::at(
                            floor,
                            EventPayload::Comment {
                                message: format!(
                                    "timestamp clamp: clock reported {} before last row {}",
                                    event.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                                    floor.format("%Y-%m-%dT%H:%M:%SZ"),
                                ),
                            },
                        );
                        buffer.push_str(&note.encode());
                        clamp_noted = true;
                    }
                    event.timestamp = floor;
                }
            }
            floor = Some(event.timestamp);
            buffer.push_str(&event.encode());
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .map_err(|e| ChainError::io(log, e))?;
        file.write_all(buffer.as_bytes())
            .map_err(|e| ChainError::io(log, e))?;
        file.sync_data().map_err(|e| ChainError::io(log, e))?;

        debug!(log = %log.display(), count = events.len(), "appended events");
        Ok(())
    }
}

/// Sort key for a changelog name: `(date, suffix)` with the base (no `-N`)
/// file ordering before its `-2`, `-3`, ... collision successors.
fn log_sort_key(name: &str) -> Option<(String, u32)> {
    let stem = name.strip_prefix("changelog-")?.strip_suffix(".csv")?;
    if stem.len() < 10 {
        return None;
    }
    let (date, rest) = stem.split_at(10);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;

    let seq = if rest.is_empty() {
        1
    } else {
        rest.strip_prefix('-')?.parse::<u32>().ok()?
    };
    Some((date.to_string(), seq))
}

/// Open a log for reading, retrying once when the failure looks transient.
fn open_retry(log: &Path) -> std::io::Result<std::fs::File> {
    use std::io::ErrorKind;

    match std::fs::File::open(log) {
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ) =>
        {
            std::fs::File::open(log)
        },
        other => other,
    }
}

/// A log must end with a newline (or be empty); a trailing partial line
/// means a crashed append.
fn check_complete(log: &Path) -> ChainResult<()> {
    use std::io::{Read, Seek, SeekFrom};

    let mut file = open_retry(log).map_err(|e| ChainError::io(log, e))?;
    let len = file
        .metadata()
        .map_err(|e| ChainError::io(log, e))?
        .len();
    if len == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1))
        .map_err(|e| ChainError::io(log, e))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)
        .map_err(|e| ChainError::io(log, e))?;

    if last[0] != b'\n' {
        return Err(ChainError::LogCorrupt {
            file: log.to_path_buf(),
            reason: "trailing partial row (missing newline)".to_string(),
        });
    }
    Ok(())
}
