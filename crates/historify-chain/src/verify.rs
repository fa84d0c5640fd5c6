//! Chain verification.
//!
//! Two depths: the default pass re-checks the most recent closed log and
//! its link backward; the full pass walks seed → log → log, re-verifying
//! every signature and every closing link. Verification never rewrites or
//! deletes logs; its only side effect is a `verify` row appended to the
//! open log (and an index rebuild when only the derived index is damaged,
//! which leaves the result "ok").

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use historify_crypto::digest_file;
use historify_signer::{KeyArchive, SignatureFile, Signer, sig_path_for};
use tracing::{debug, info};

use crate::error::ChainResult;
use crate::event::{ChangeEvent, EventKind, EventPayload, VerifyOutcome};
use crate::index::{load_index, rebuild_index};
use crate::replay::{StateMap, reconstruct};
use crate::store::{LogFile, LogStore};

/// What failed during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A signature is missing, unresolvable or invalid.
    Signature,
    /// A closing link does not match the actual previous file.
    Chain,
    /// A live file on disk no longer matches its recorded digests.
    FileIntegrity,
    /// The on-disk structure itself is wrong (ordering, missing rows).
    Structural,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signature => "signature",
            Self::Chain => "chain",
            Self::FileIntegrity => "file-integrity",
            Self::Structural => "structural",
        };
        f.write_str(name)
    }
}

/// One verification failure.
#[derive(Debug, Clone)]
pub struct VerifyFailure {
    /// The failure category.
    pub kind: FailureKind,
    /// What the failure concerns (a log name, `seed.bin`, a file path).
    pub subject: String,
    /// Human-readable detail.
    pub detail: String,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.detail)
    }
}

/// Structured result of a verification run.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Scope string recorded in the `verify` row.
    pub scope: String,
    /// All failures, in discovery order.
    pub failures: Vec<VerifyFailure>,
    /// Number of logs whose signatures/links were checked.
    pub logs_checked: usize,
    /// Number of live files re-hashed (with `check_files`).
    pub files_checked: usize,
    /// Whether the derived index was rebuilt during this run.
    pub index_rebuilt: bool,
}

impl VerifyReport {
    /// Whether verification passed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Verification depth and extras.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Walk the whole chain from the seed instead of the tail.
    pub full_chain: bool,
    /// Re-hash every live file in the reconstructed state.
    pub check_files: bool,
}

/// Validates signatures, chain continuity and (optionally) file content.
pub struct Verifier<'a> {
    store: &'a LogStore,
    signer: &'a dyn Signer,
    archive: &'a KeyArchive,
    seed_path: PathBuf,
    index_path: PathBuf,
    roots: BTreeMap<String, PathBuf>,
}

impl<'a> Verifier<'a> {
    /// Create a verifier.
    #[must_use]
    pub fn new(
        store: &'a LogStore,
        signer: &'a dyn Signer,
        archive: &'a KeyArchive,
        seed_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            signer,
            archive,
            seed_path: seed_path.into(),
            index_path: index_path.into(),
            roots: BTreeMap::new(),
        }
    }

    /// Provide resolved category roots (needed for `check_files`).
    #[must_use]
    pub fn with_roots(mut self, roots: BTreeMap<String, PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    /// Run verification and record the outcome.
    ///
    /// Appends a `verify` row to the open log when one exists; a repaired
    /// index additionally gets a `comment` row documenting the rebuild.
    ///
    /// # Errors
    ///
    /// I/O and store errors. Verification *failures* are reported in the
    /// returned [`VerifyReport`], not as errors.
    pub fn run(&self, opts: VerifyOptions) -> ChainResult<VerifyReport> {
        let mut report = self.check(opts)?;

        let scope = match (opts.full_chain, opts.check_files) {
            (false, false) => "default",
            (false, true) => "default+files",
            (true, false) => "full-chain",
            (true, true) => "full-chain+files",
        };
        report.scope = scope.to_string();

        // Record the outcome in the open log, when the structure leaves
        // one unambiguously identifiable.
        if let Ok(Some(open)) = self.store.open_log() {
            let mut rows = Vec::new();
            if report.index_rebuilt {
                rows.push(ChangeEvent::new(EventPayload::Comment {
                    message: "rebuilt integrity index from change logs".to_string(),
                }));
            }
            rows.push(ChangeEvent::new(EventPayload::Verify {
                result: if report.ok() {
                    VerifyOutcome::Ok
                } else {
                    VerifyOutcome::Fail
                },
                scope: report.scope.clone(),
            }));
            self.store.append(&open.path, &rows)?;
        }

        if report.ok() {
            info!(scope, logs = report.logs_checked, "verification passed");
        } else {
            info!(
                scope,
                failures = report.failures.len(),
                "verification failed"
            );
        }
        Ok(report)
    }

    /// Pure verification: compute the report without touching the logs.
    fn check(&self, opts: VerifyOptions) -> ChainResult<VerifyReport> {
        let mut report = VerifyReport::default();

        let (mut failures, logs_checked) = chain_failures_inner(
            self.store,
            self.signer,
            self.archive,
            &self.seed_path,
            opts.full_chain,
        )?;
        report.failures.append(&mut failures);
        report.logs_checked = logs_checked;

        if opts.full_chain || opts.check_files {
            match reconstruct(self.store, None, false) {
                Ok(outcome) => {
                    for warning in &outcome.warnings {
                        report.failures.push(VerifyFailure {
                            kind: FailureKind::Structural,
                            subject: "replay".to_string(),
                            detail: warning.to_string(),
                        });
                    }

                    if opts.full_chain {
                        self.check_index(&outcome.state, &mut report);
                    }
                    if opts.check_files {
                        self.check_files(&outcome.state, &mut report);
                    }
                },
                Err(e) => {
                    report.failures.push(VerifyFailure {
                        kind: FailureKind::Structural,
                        subject: "replay".to_string(),
                        detail: e.to_string(),
                    });
                },
            }
        }

        Ok(report)
    }

    /// Compare the derived index against the replayed state; rebuild it
    /// when it alone is damaged. The logs always win.
    fn check_index(&self, state: &StateMap, report: &mut VerifyReport) {
        if !self.index_path.exists() {
            return;
        }
        let stale = match load_index(&self.index_path) {
            Ok(index) => index != *state,
            Err(e) => {
                debug!(error = %e, "integrity index unreadable; rebuilding");
                true
            },
        };
        if stale {
            match rebuild_index(self.store, &self.index_path) {
                Ok(_) => report.index_rebuilt = true,
                Err(e) => report.failures.push(VerifyFailure {
                    kind: FailureKind::Structural,
                    subject: "integrity.csv".to_string(),
                    detail: format!("index rebuild failed: {e}"),
                }),
            }
        }
    }

    /// Re-hash every live file; mismatches are reported per file without
    /// aborting.
    fn check_files(&self, state: &StateMap, report: &mut VerifyReport) {
        for ((category, rel_path), record) in state {
            report.files_checked += 1;
            let subject = format!("{category}/{rel_path}");

            let Some(root) = self.roots.get(category) else {
                report.failures.push(VerifyFailure {
                    kind: FailureKind::FileIntegrity,
                    subject,
                    detail: "category root not configured".to_string(),
                });
                continue;
            };

            match digest_file(&root.join(rel_path)) {
                Ok(actual) => {
                    if actual != record.digests {
                        report.failures.push(VerifyFailure {
                            kind: FailureKind::FileIntegrity,
                            subject,
                            detail: format!(
                                "content mismatch: recorded blake3 {}, found {}",
                                record.digests.blake3, actual.blake3
                            ),
                        });
                    }
                },
                Err(e) => {
                    report.failures.push(VerifyFailure {
                        kind: FailureKind::FileIntegrity,
                        subject,
                        detail: e.to_string(),
                    });
                },
            }
        }
    }
}

/// Closed-chain validation used by the chain manager before it signs.
pub(crate) fn closed_chain_failures(
    store: &LogStore,
    signer: &dyn Signer,
    archive: &KeyArchive,
    seed_path: &Path,
) -> ChainResult<Vec<VerifyFailure>> {
    chain_failures_inner(store, signer, archive, seed_path, true).map(|(failures, _)| failures)
}

/// Signature and linkage checks over the chain.
///
/// With `full` set, every element from the seed forward is checked;
/// otherwise only the most recent closed log and the open log's link.
fn chain_failures_inner(
    store: &LogStore,
    signer: &dyn Signer,
    archive: &KeyArchive,
    seed_path: &Path,
    full: bool,
) -> ChainResult<(Vec<VerifyFailure>, usize)> {
    let mut failures = Vec::new();
    let logs = store.logs()?;

    if logs.is_empty() {
        failures.push(VerifyFailure {
            kind: FailureKind::Structural,
            subject: "changes".to_string(),
            detail: "no changelogs exist".to_string(),
        });
        return Ok((failures, 0));
    }

    // Every log but the tail must be signed; the tail may be open.
    for log in &logs[..logs.len() - 1] {
        if !log.signed {
            failures.push(VerifyFailure {
                kind: FailureKind::Signature,
                subject: log.name.clone(),
                detail: "missing signature on a non-tail log".to_string(),
            });
        }
    }

    if full {
        check_seed(signer, archive, seed_path, &mut failures);
    }

    let mut logs_checked = 0usize;
    for (idx, log) in logs.iter().enumerate() {
        let expected_prev = if idx == 0 {
            "seed.bin".to_string()
        } else {
            logs[idx - 1].name.clone()
        };

        // Default depth: only the last closed log and the open tail.
        let is_tail = idx == logs.len() - 1;
        let is_last_closed = log.signed && logs[idx + 1..].iter().all(|l| !l.signed);
        if !full && !is_tail && !is_last_closed {
            continue;
        }

        logs_checked += 1;
        if log.signed {
            check_log_signature(signer, archive, log, &mut failures);
        }
        check_closing_link(store, seed_path, log, &expected_prev, full, &mut failures);
    }

    Ok((failures, logs_checked))
}

/// Verify the seed's mandatory signature against the archived key chosen
/// by the fingerprint embedded in the signature.
fn check_seed(
    signer: &dyn Signer,
    archive: &KeyArchive,
    seed_path: &Path,
    failures: &mut Vec<VerifyFailure>,
) {
    if !seed_path.exists() {
        failures.push(VerifyFailure {
            kind: FailureKind::Structural,
            subject: "seed.bin".to_string(),
            detail: "seed file missing".to_string(),
        });
        return;
    }
    let sig = sig_path_for(seed_path);
    if !sig.exists() {
        failures.push(VerifyFailure {
            kind: FailureKind::Signature,
            subject: "seed.bin".to_string(),
            detail: "mandatory seed signature missing".to_string(),
        });
        return;
    }
    verify_with_archive(signer, archive, seed_path, &sig, "seed.bin", failures);
}

fn check_log_signature(
    signer: &dyn Signer,
    archive: &KeyArchive,
    log: &LogFile,
    failures: &mut Vec<VerifyFailure>,
) {
    verify_with_archive(
        signer,
        archive,
        &log.path,
        &log.sig_path(),
        &log.name,
        failures,
    );
}

fn verify_with_archive(
    signer: &dyn Signer,
    archive: &KeyArchive,
    file: &Path,
    sig: &Path,
    subject: &str,
    failures: &mut Vec<VerifyFailure>,
) {
    let fingerprint = match SignatureFile::read_from(sig) {
        Ok(parsed) => parsed.fingerprint(),
        Err(e) => {
            failures.push(VerifyFailure {
                kind: FailureKind::Signature,
                subject: subject.to_string(),
                detail: e.to_string(),
            });
            return;
        },
    };

    let key = match archive.find(&fingerprint) {
        Ok(Some(key)) => key,
        Ok(None) => {
            failures.push(VerifyFailure {
                kind: FailureKind::Signature,
                subject: subject.to_string(),
                detail: format!("no archived public key for fingerprint {fingerprint}"),
            });
            return;
        },
        Err(e) => {
            failures.push(VerifyFailure {
                kind: FailureKind::Signature,
                subject: subject.to_string(),
                detail: e.to_string(),
            });
            return;
        },
    };

    if let Err(e) = signer.verify(file, sig, &key) {
        failures.push(VerifyFailure {
            kind: FailureKind::Signature,
            subject: subject.to_string(),
            detail: e.to_string(),
        });
    }
}

/// Check a log's `closing` first row against the actual previous file.
fn check_closing_link(
    store: &LogStore,
    seed_path: &Path,
    log: &LogFile,
    expected_prev: &str,
    check_row_position: bool,
    failures: &mut Vec<VerifyFailure>,
) {
    let events = match store.read_events(&log.path) {
        Ok(events) => events,
        Err(e) => {
            failures.push(VerifyFailure {
                kind: FailureKind::Structural,
                subject: log.name.clone(),
                detail: e.to_string(),
            });
            return;
        },
    };

    let Some(first) = events.first() else {
        failures.push(VerifyFailure {
            kind: FailureKind::Structural,
            subject: log.name.clone(),
            detail: "log is empty: missing closing row".to_string(),
        });
        return;
    };

    let EventPayload::Closing { digests, prev } = &first.payload else {
        failures.push(VerifyFailure {
            kind: FailureKind::Structural,
            subject: log.name.clone(),
            detail: format!("first row is {}, expected closing", first.kind()),
        });
        return;
    };

    if check_row_position {
        let stray = events
            .iter()
            .skip(1)
            .any(|e| e.kind() == EventKind::Closing);
        if stray {
            failures.push(VerifyFailure {
                kind: FailureKind::Structural,
                subject: log.name.clone(),
                detail: "closing row found past the first entry".to_string(),
            });
        }
    }

    if prev != expected_prev {
        failures.push(VerifyFailure {
            kind: FailureKind::Chain,
            subject: log.name.clone(),
            detail: format!("closing row references {prev:?}, expected {expected_prev:?}"),
        });
        return;
    }

    let prev_path = if prev == "seed.bin" {
        seed_path.to_path_buf()
    } else {
        store.changes_dir().join(prev)
    };

    match digest_file(&prev_path) {
        Ok(actual) => {
            if actual != *digests {
                failures.push(VerifyFailure {
                    kind: FailureKind::Chain,
                    subject: log.name.clone(),
                    detail: format!(
                        "digest mismatch for {prev}: closing row has blake3 {}, file has {}",
                        digests.blake3, actual.blake3
                    ),
                });
            }
        },
        Err(e) => {
            failures.push(VerifyFailure {
                kind: FailureKind::Chain,
                subject: log.name.clone(),
                detail: format!("previous file {prev} unreadable: {e}"),
            });
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainManager;
    use crate::event::FileMeta;
    use crate::index::write_index;
    use crate::replay::TrackedFile;
    use historify_crypto::FileDigests;
    use historify_signer::MemorySigner;

    struct Fixture {
        dir: tempfile::TempDir,
        store: LogStore,
        signer: MemorySigner,
        archive: KeyArchive,
        seed: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let changes = dir.path().join("changes");
        std::fs::create_dir_all(&changes).unwrap();
        let seed = dir.path().join("seed.bin");
        std::fs::write(&seed, vec![7u8; 4096]).unwrap();

        Fixture {
            store: LogStore::new(changes),
            signer: MemorySigner::generate(),
            archive: KeyArchive::new(dir.path().join("keys")),
            seed,
            dir,
        }
    }

    impl Fixture {
        fn bootstrap(&self) -> PathBuf {
            ChainManager::new(&self.store, &self.signer, &self.archive, &self.seed)
                .bootstrap()
                .unwrap()
        }

        fn close_and_open(&self) {
            ChainManager::new(&self.store, &self.signer, &self.archive, &self.seed)
                .close_and_open()
                .unwrap();
        }

        fn verifier(&self) -> Verifier<'_> {
            Verifier::new(
                &self.store,
                &self.signer,
                &self.archive,
                &self.seed,
                self.dir.path().join("integrity.csv"),
            )
        }
    }

    #[test]
    fn fresh_chain_verifies() {
        let fx = fixture();
        fx.bootstrap();
        fx.close_and_open();

        let report = fx.verifier().run(VerifyOptions::default()).unwrap();
        assert!(report.ok(), "failures: {:?}", report.failures);
    }

    #[test]
    fn full_chain_verifies_and_records_row() {
        let fx = fixture();
        fx.bootstrap();
        fx.close_and_open();
        fx.close_and_open();

        let report = fx
            .verifier()
            .run(VerifyOptions {
                full_chain: true,
                check_files: false,
            })
            .unwrap();
        assert!(report.ok(), "failures: {:?}", report.failures);
        assert_eq!(report.logs_checked, 3);

        // A verify row landed in the open log.
        let open = fx.store.open_log().unwrap().unwrap();
        let events = fx.store.read_events(&open.path).unwrap();
        assert!(matches!(
            events.last().unwrap().payload,
            EventPayload::Verify {
                result: VerifyOutcome::Ok,
                ..
            }
        ));
    }

    #[test]
    fn tampered_log_reports_signature_and_chain() {
        let fx = fixture();
        let first = fx.bootstrap();
        fx.close_and_open();

        let mut content = std::fs::read(&first).unwrap();
        let last = content.len() - 2;
        content[last] ^= 0xff;
        std::fs::write(&first, content).unwrap();

        let report = fx
            .verifier()
            .run(VerifyOptions {
                full_chain: true,
                check_files: false,
            })
            .unwrap();
        assert!(!report.ok());
        assert!(
            report
                .failures
                .iter()
                .any(|f| f.kind == FailureKind::Signature)
        );
        assert!(report.failures.iter().any(|f| f.kind == FailureKind::Chain));

        // The failed run still recorded a verify row.
        let open = fx.store.open_log().unwrap().unwrap();
        let events = fx.store.read_events(&open.path).unwrap();
        assert!(matches!(
            events.last().unwrap().payload,
            EventPayload::Verify {
                result: VerifyOutcome::Fail,
                ..
            }
        ));
    }

    #[test]
    fn missing_signature_on_closed_log_fails() {
        let fx = fixture();
        let first = fx.bootstrap();
        fx.close_and_open();

        std::fs::remove_file(historify_signer::sig_path_for(&first)).unwrap();

        let report = fx.verifier().run(VerifyOptions::default()).unwrap();
        assert!(!report.ok());
        assert!(
            report
                .failures
                .iter()
                .any(|f| f.kind == FailureKind::Signature && f.detail.contains("missing"))
        );
    }

    #[test]
    fn corrupt_index_is_rebuilt_and_result_stays_ok() {
        let fx = fixture();
        fx.bootstrap();
        fx.close_and_open();

        let index_path = fx.dir.path().join("integrity.csv");
        std::fs::write(&index_path, "garbage,row\n").unwrap();

        let report = fx
            .verifier()
            .run(VerifyOptions {
                full_chain: true,
                check_files: false,
            })
            .unwrap();
        assert!(report.ok(), "failures: {:?}", report.failures);
        assert!(report.index_rebuilt);

        // The rebuild was documented in the open log.
        let open = fx.store.open_log().unwrap().unwrap();
        let events = fx.store.read_events(&open.path).unwrap();
        assert!(events.iter().any(|e| matches!(
            &e.payload,
            EventPayload::Comment { message } if message.contains("rebuilt integrity index")
        )));
    }

    #[test]
    fn stale_index_is_refreshed() {
        let fx = fixture();
        fx.bootstrap();

        let index_path = fx.dir.path().join("integrity.csv");
        let mut bogus = StateMap::new();
        bogus.insert(
            ("docs".to_string(), "ghost.txt".to_string()),
            TrackedFile {
                digests: FileDigests::of_bytes(b"ghost"),
                size: 5,
                mtime: 0,
            },
        );
        write_index(&index_path, &bogus).unwrap();

        let report = fx
            .verifier()
            .run(VerifyOptions {
                full_chain: true,
                check_files: false,
            })
            .unwrap();
        assert!(report.ok());
        assert!(report.index_rebuilt);
        assert!(load_index(&index_path).unwrap().is_empty());
    }

    #[test]
    fn file_integrity_mismatch_reported_per_file() {
        let fx = fixture();
        fx.bootstrap();

        // Record a file, then change it on disk without rescanning.
        let root = fx.dir.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello\n").unwrap();

        let open = fx.store.open_log().unwrap().unwrap();
        let event = ChangeEvent::new(EventPayload::New {
            category: "docs".to_string(),
            path: "a.txt".to_string(),
            meta: FileMeta {
                size: 6,
                ctime: Some(0),
                mtime: 0,
            },
            digests: FileDigests::of_bytes(b"hello\n"),
        });
        fx.store.append(&open.path, &[event]).unwrap();

        std::fs::write(root.join("a.txt"), "tampered\n").unwrap();

        let mut roots = BTreeMap::new();
        roots.insert("docs".to_string(), root);
        let report = fx
            .verifier()
            .with_roots(roots)
            .run(VerifyOptions {
                full_chain: false,
                check_files: true,
            })
            .unwrap();

        assert_eq!(report.files_checked, 1);
        assert!(
            report
                .failures
                .iter()
                .any(|f| f.kind == FailureKind::FileIntegrity && f.subject == "docs/a.txt")
        );
    }

    #[test]
    fn verification_is_repeatable() {
        let fx = fixture();
        fx.bootstrap();
        fx.close_and_open();

        let a = fx.verifier().run(VerifyOptions::default()).unwrap();
        let b = fx.verifier().run(VerifyOptions::default()).unwrap();
        assert_eq!(a.ok(), b.ok());
        assert_eq!(a.logs_checked, b.logs_checked);
    }
}
