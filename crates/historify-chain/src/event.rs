//! Change events and their CSV encoding.
//!
//! Rows have a fixed column order:
//!
//! ```text
//! timestamp,type,category,path,size,ctime,mtime,sha256,blake3,extra
//! ```
//!
//! The dialect is strict: `,` separator, `"` quote, doubled-quote escape,
//! LF terminator. A field is quoted when it contains the separator, a quote
//! or any whitespace. Additional digest columns (config-extended algorithm
//! sets) append after `extra` and are preserved verbatim on replay; an
//! unknown `type` value is an error.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use historify_crypto::FileDigests;

use crate::error::{ChainError, ChainResult};

/// Number of fixed columns in a row.
const BASE_COLUMNS: usize = 10;

/// The kind of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Binds a log to the previous chain element; first row of every log.
    Closing,
    /// A file appeared.
    New,
    /// A file's content changed.
    Changed,
    /// A file moved or was renamed.
    Move,
    /// A file disappeared.
    Deleted,
    /// A configuration value was changed.
    Config,
    /// A free-text administrative note.
    Comment,
    /// A verification run was recorded.
    Verify,
}

impl EventKind {
    /// The wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closing => "closing",
            Self::New => "new",
            Self::Changed => "changed",
            Self::Move => "move",
            Self::Deleted => "deleted",
            Self::Config => "config",
            Self::Comment => "comment",
            Self::Verify => "verify",
        }
    }

    /// Ordering rank used as the tiebreak within one scan's events.
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Changed => 1,
            Self::Move => 2,
            Self::Deleted => 3,
            Self::Closing | Self::Config | Self::Comment | Self::Verify => 4,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-system metadata captured with a file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Size in bytes.
    pub size: u64,
    /// Inode change time, seconds since the Unix epoch. Absent for
    /// `deleted` events (the file is gone).
    pub ctime: Option<i64>,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

/// Result recorded by a `verify` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Verification passed.
    Ok,
    /// Verification failed.
    Fail,
}

impl VerifyOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of a change event, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Chain link: digests of the previous chain element.
    Closing {
        /// Digests of the previous file (seed or prior changelog).
        digests: FileDigests,
        /// Basename of the previous file.
        prev: String,
    },
    /// A file appeared in a category.
    New {
        /// Category name.
        category: String,
        /// Category-relative POSIX path.
        path: String,
        /// File metadata at observation time.
        meta: FileMeta,
        /// Content digests.
        digests: FileDigests,
    },
    /// A file's content changed.
    Changed {
        /// Category name.
        category: String,
        /// Category-relative POSIX path.
        path: String,
        /// File metadata at observation time.
        meta: FileMeta,
        /// The new content digests.
        digests: FileDigests,
    },
    /// A file moved; digests equal the source record.
    Move {
        /// Category name.
        category: String,
        /// The new category-relative path.
        path: String,
        /// File metadata at observation time.
        meta: FileMeta,
        /// Digests (unchanged from the source record).
        digests: FileDigests,
        /// The old category-relative path.
        from: String,
    },
    /// A file disappeared; digests equal the last known record.
    Deleted {
        /// Category name.
        category: String,
        /// Category-relative POSIX path.
        path: String,
        /// Last known metadata.
        meta: FileMeta,
        /// Last known digests, kept so the event stays self-describing.
        digests: FileDigests,
    },
    /// A configuration value was changed.
    Config {
        /// The `section.option` key.
        key: String,
        /// The new value.
        value: String,
    },
    /// An administrative note.
    Comment {
        /// The note text.
        message: String,
    },
    /// A verification run.
    Verify {
        /// Overall result.
        result: VerifyOutcome,
        /// What was verified (e.g. `default`, `full-chain`).
        scope: String,
    },
}

/// A change event: timestamp, typed payload, and any trailing columns
/// preserved from an extended algorithm set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Event time, UTC. Monotonically non-decreasing within a log.
    pub timestamp: DateTime<Utc>,
    /// The typed payload.
    pub payload: EventPayload,
    /// Trailing columns beyond the base set, preserved verbatim.
    pub extra_columns: Vec<String>,
}

impl ChangeEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self::at(Utc::now(), payload)
    }

    /// Create an event with an explicit timestamp.
    #[must_use]
    pub fn at(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            timestamp,
            payload,
            extra_columns: Vec::new(),
        }
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::Closing { .. } => EventKind::Closing,
            EventPayload::New { .. } => EventKind::New,
            EventPayload::Changed { .. } => EventKind::Changed,
            EventPayload::Move { .. } => EventKind::Move,
            EventPayload::Deleted { .. } => EventKind::Deleted,
            EventPayload::Config { .. } => EventKind::Config,
            EventPayload::Comment { .. } => EventKind::Comment,
            EventPayload::Verify { .. } => EventKind::Verify,
        }
    }

    /// The category, for file events.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::New { category, .. }
            | EventPayload::Changed { category, .. }
            | EventPayload::Move { category, .. }
            | EventPayload::Deleted { category, .. } => Some(category),
            _ => None,
        }
    }

    /// The path, for file events.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::New { path, .. }
            | EventPayload::Changed { path, .. }
            | EventPayload::Move { path, .. }
            | EventPayload::Deleted { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The digests, for events that carry them.
    #[must_use]
    pub fn digests(&self) -> Option<&FileDigests> {
        match &self.payload {
            EventPayload::Closing { digests, .. }
            | EventPayload::New { digests, .. }
            | EventPayload::Changed { digests, .. }
            | EventPayload::Move { digests, .. }
            | EventPayload::Deleted { digests, .. } => Some(digests),
            _ => None,
        }
    }

    /// Key for the `(category, path)` scan ordering with kind tiebreak.
    #[must_use]
    pub fn sort_key(&self) -> (String, String, u8) {
        (
            self.category().unwrap_or_default().to_string(),
            self.path().unwrap_or_default().to_string(),
            self.kind().rank(),
        )
    }

    /// Encode as one LF-terminated CSV line.
    #[must_use]
    pub fn encode(&self) -> String {
        let (category, path, meta, digests, extra) = match &self.payload {
            EventPayload::Closing { digests, prev } => (
                String::new(),
                String::new(),
                None,
                Some(digests),
                format!("prev={prev}"),
            ),
            EventPayload::New {
                category,
                path,
                meta,
                digests,
            }
            | EventPayload::Changed {
                category,
                path,
                meta,
                digests,
            }
            | EventPayload::Deleted {
                category,
                path,
                meta,
                digests,
            } => (
                category.clone(),
                path.clone(),
                Some(*meta),
                Some(digests),
                String::new(),
            ),
            EventPayload::Move {
                category,
                path,
                meta,
                digests,
                from,
            } => (
                category.clone(),
                path.clone(),
                Some(*meta),
                Some(digests),
                format!("from={from}"),
            ),
            EventPayload::Config { key, value } => (
                String::new(),
                String::new(),
                None,
                None,
                format!("key={key};value={value}"),
            ),
            EventPayload::Comment { message } => (
                String::new(),
                String::new(),
                None,
                None,
                format!("msg={message}"),
            ),
            EventPayload::Verify { result, scope } => (
                String::new(),
                String::new(),
                None,
                None,
                format!("result={};scope={scope}", result.as_str()),
            ),
        };

        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        let size = meta.map_or_else(String::new, |m| m.size.to_string());
        let ctime = meta
            .and_then(|m| m.ctime)
            .map_or_else(String::new, |c| c.to_string());
        let mtime = meta.map_or_else(String::new, |m| m.mtime.to_string());
        let (sha256, blake3) = digests.map_or_else(
            || (String::new(), String::new()),
            |d| (d.sha256.clone(), d.blake3.clone()),
        );

        let mut fields = vec![
            timestamp,
            self.kind().as_str().to_string(),
            category,
            path,
            size,
            ctime,
            mtime,
            sha256,
            blake3,
            extra,
        ];
        fields.extend(self.extra_columns.iter().cloned());

        let mut line = fields
            .iter()
            .map(|f| quote_field(f))
            .collect::<Vec<_>>()
            .join(",");
        line.push('\n');
        line
    }

    /// Decode a parsed CSV record into an event.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownEventType`] for unrecognized kinds,
    /// [`ChainError::LogCorrupt`] for structurally invalid rows.
    pub fn decode(file: &Path, fields: &[String]) -> ChainResult<Self> {
        let corrupt = |reason: String| ChainError::LogCorrupt {
            file: file.to_path_buf(),
            reason,
        };

        if fields.len() < BASE_COLUMNS {
            return Err(corrupt(format!(
                "expected at least {BASE_COLUMNS} columns, got {}",
                fields.len()
            )));
        }

        let timestamp = DateTime::parse_from_rfc3339(&fields[0])
            .map_err(|e| corrupt(format!("bad timestamp {:?}: {e}", fields[0])))?
            .with_timezone(&Utc);

        let kind = &fields[1];
        let category = fields[2].clone();
        let path = fields[3].clone();
        let extra = &fields[9];

        let meta = || -> ChainResult<FileMeta> {
            let size = fields[4]
                .parse::<u64>()
                .map_err(|_| corrupt(format!("bad size {:?}", fields[4])))?;
            let ctime = if fields[5].is_empty() {
                None
            } else {
                Some(
                    fields[5]
                        .parse::<i64>()
                        .map_err(|_| corrupt(format!("bad ctime {:?}", fields[5])))?,
                )
            };
            let mtime = fields[6]
                .parse::<i64>()
                .map_err(|_| corrupt(format!("bad mtime {:?}", fields[6])))?;
            Ok(FileMeta { size, ctime, mtime })
        };
        let digests = || FileDigests {
            sha256: fields[7].clone(),
            blake3: fields[8].clone(),
        };

        let payload = match kind.as_str() {
            "closing" => {
                let prev = extra
                    .strip_prefix("prev=")
                    .ok_or_else(|| corrupt(format!("closing row without prev=: {extra:?}")))?;
                EventPayload::Closing {
                    digests: digests(),
                    prev: prev.to_string(),
                }
            },
            "new" => EventPayload::New {
                category,
                path,
                meta: meta()?,
                digests: digests(),
            },
            "changed" => EventPayload::Changed {
                category,
                path,
                meta: meta()?,
                digests: digests(),
            },
            "move" => {
                let from = extra
                    .strip_prefix("from=")
                    .ok_or_else(|| corrupt(format!("move row without from=: {extra:?}")))?;
                EventPayload::Move {
                    category,
                    path,
                    meta: meta()?,
                    digests: digests(),
                    from: from.to_string(),
                }
            },
            "deleted" => EventPayload::Deleted {
                category,
                path,
                meta: meta()?,
                digests: digests(),
            },
            "config" => {
                let rest = extra
                    .strip_prefix("key=")
                    .ok_or_else(|| corrupt(format!("config row without key=: {extra:?}")))?;
                let (key, value) = rest
                    .split_once(";value=")
                    .ok_or_else(|| corrupt(format!("config row without value=: {extra:?}")))?;
                EventPayload::Config {
                    key: key.to_string(),
                    value: value.to_string(),
                }
            },
            "comment" => {
                let message = extra
                    .strip_prefix("msg=")
                    .ok_or_else(|| corrupt(format!("comment row without msg=: {extra:?}")))?;
                EventPayload::Comment {
                    message: message.to_string(),
                }
            },
            "verify" => {
                let rest = extra
                    .strip_prefix("result=")
                    .ok_or_else(|| corrupt(format!("verify row without result=: {extra:?}")))?;
                let (result, scope) = rest
                    .split_once(";scope=")
                    .ok_or_else(|| corrupt(format!("verify row without scope=: {extra:?}")))?;
                let result = match result {
                    "ok" => VerifyOutcome::Ok,
                    "fail" => VerifyOutcome::Fail,
                    other => return Err(corrupt(format!("bad verify result {other:?}"))),
                };
                EventPayload::Verify {
                    result,
                    scope: scope.to_string(),
                }
            },
            _ => {
                return Err(ChainError::UnknownEventType {
                    value: kind.clone(),
                    file: file.to_path_buf(),
                });
            },
        };

        Ok(Self {
            timestamp,
            payload,
            extra_columns: fields[BASE_COLUMNS..].to_vec(),
        })
    }
}

/// Quote a field per the dialect: quoted when it contains the separator,
/// a quote, or any whitespace; quotes escape by doubling.
fn quote_field(field: &str) -> String {
    if field.contains([',', '"']) || field.contains(char::is_whitespace) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap()
    }

    fn digests() -> FileDigests {
        FileDigests::of_bytes(b"payload")
    }

    fn parse_line(line: &str) -> Vec<String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        record.iter().map(str::to_string).collect()
    }

    fn round_trip(event: &ChangeEvent) -> ChangeEvent {
        let line = event.encode();
        ChangeEvent::decode(Path::new("test.csv"), &parse_line(&line)).unwrap()
    }

    #[test]
    fn new_event_round_trip() {
        let event = ChangeEvent::at(
            ts(),
            EventPayload::New {
                category: "docs".to_string(),
                path: "b/c.txt".to_string(),
                meta: FileMeta {
                    size: 6,
                    ctime: Some(1_754_000_000),
                    mtime: 1_754_000_000,
                },
                digests: digests(),
            },
        );
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn closing_row_layout() {
        let event = ChangeEvent::at(
            ts(),
            EventPayload::Closing {
                digests: digests(),
                prev: "seed.bin".to_string(),
            },
        );
        let line = event.encode();
        assert!(line.starts_with("2026-08-02T12:00:00Z,closing,,,,,,"));
        assert!(line.trim_end().ends_with("prev=seed.bin"));
        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn move_round_trip_keeps_from() {
        let event = ChangeEvent::at(
            ts(),
            EventPayload::Move {
                category: "docs".to_string(),
                path: "b/a.txt".to_string(),
                meta: FileMeta {
                    size: 6,
                    ctime: Some(1),
                    mtime: 2,
                },
                digests: digests(),
                from: "a.txt".to_string(),
            },
        );
        let decoded = round_trip(&event);
        assert!(
            matches!(decoded.payload, EventPayload::Move { ref from, .. } if from == "a.txt")
        );
    }

    #[test]
    fn whitespace_paths_are_quoted() {
        let event = ChangeEvent::at(
            ts(),
            EventPayload::New {
                category: "docs".to_string(),
                path: "my file.txt".to_string(),
                meta: FileMeta {
                    size: 1,
                    ctime: None,
                    mtime: 0,
                },
                digests: digests(),
            },
        );
        let line = event.encode();
        assert!(line.contains("\"my file.txt\""));
        assert_eq!(round_trip(&event).path(), Some("my file.txt"));
    }

    #[test]
    fn quotes_are_doubled() {
        let event = ChangeEvent::at(
            ts(),
            EventPayload::Comment {
                message: "say \"hi\"".to_string(),
            },
        );
        let line = event.encode();
        assert!(line.contains(r#""msg=say ""hi""""#));
        let decoded = round_trip(&event);
        assert!(
            matches!(decoded.payload, EventPayload::Comment { ref message } if message == "say \"hi\"")
        );
    }

    #[test]
    fn config_and_verify_round_trip() {
        let config = ChangeEvent::at(
            ts(),
            EventPayload::Config {
                key: "hash.algorithms".to_string(),
                value: "blake3,sha256".to_string(),
            },
        );
        assert_eq!(round_trip(&config), config);

        let verify = ChangeEvent::at(
            ts(),
            EventPayload::Verify {
                result: VerifyOutcome::Fail,
                scope: "full-chain".to_string(),
            },
        );
        assert_eq!(round_trip(&verify), verify);
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut fields: Vec<String> = vec![String::new(); BASE_COLUMNS];
        fields[0] = "2026-08-02T12:00:00Z".to_string();
        fields[1] = "duplicate".to_string();

        let result = ChangeEvent::decode(Path::new("x.csv"), &fields);
        assert!(matches!(result, Err(ChainError::UnknownEventType { .. })));
    }

    #[test]
    fn trailing_columns_preserved() {
        let mut event = ChangeEvent::at(
            ts(),
            EventPayload::Comment {
                message: "note".to_string(),
            },
        );
        event.extra_columns = vec!["deadbeef".to_string()];

        let decoded = round_trip(&event);
        assert_eq!(decoded.extra_columns, vec!["deadbeef".to_string()]);

        // The base prefix is byte-identical with or without the extension.
        let bare = ChangeEvent::at(
            ts(),
            EventPayload::Comment {
                message: "note".to_string(),
            },
        );
        let extended_line = event.encode();
        let bare_line = bare.encode();
        assert!(extended_line.starts_with(bare_line.trim_end()));
    }

    #[test]
    fn short_row_rejected() {
        let fields = vec!["2026-08-02T12:00:00Z".to_string(), "new".to_string()];
        let result = ChangeEvent::decode(Path::new("x.csv"), &fields);
        assert!(matches!(result, Err(ChainError::LogCorrupt { .. })));
    }

    #[test]
    fn scan_ordering_ranks() {
        assert!(EventKind::New.rank() < EventKind::Changed.rank());
        assert!(EventKind::Changed.rank() < EventKind::Move.rank());
        assert!(EventKind::Move.rank() < EventKind::Deleted.rank());
    }
}
