//! The hash-chain-of-closings protocol: seed → log → log → ...
//!
//! Closing a log signs it; the next log's first row carries the digests of
//! the file just closed, so every log's identity is bound forward. The two
//! operations here are [`ChainManager::bootstrap`] (first log, rooted in
//! the seed) and [`ChainManager::close_and_open`].

use std::path::{Path, PathBuf};

use chrono::Utc;
use historify_crypto::{FileDigests, digest_file};
use historify_signer::{KeyArchive, Signer, key_for_signature, sig_path_for};
use tracing::{info, warn};

use crate::error::{ChainError, ChainResult};
use crate::event::{ChangeEvent, EventPayload};
use crate::store::LogStore;
use crate::verify::closed_chain_failures;

/// Result of a close-and-open cycle.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    /// The log that was signed by this run (`None` when a previous run
    /// already signed it and this run only resumed).
    pub closed: Option<String>,
    /// The newly opened log.
    pub opened: String,
}

/// Drives the open/closed log lifecycle.
pub struct ChainManager<'a> {
    store: &'a LogStore,
    signer: &'a dyn Signer,
    archive: &'a KeyArchive,
    seed_path: PathBuf,
}

impl<'a> ChainManager<'a> {
    /// Create a manager over the given store, signer and key archive.
    #[must_use]
    pub fn new(
        store: &'a LogStore,
        signer: &'a dyn Signer,
        archive: &'a KeyArchive,
        seed_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            signer,
            archive,
            seed_path: seed_path.into(),
        }
    }

    /// Create the first log, rooted in the signed seed.
    ///
    /// Only valid when no logs exist. If the seed has no signature yet it
    /// is signed now; either way the signature must verify before the
    /// first log is written.
    ///
    /// # Errors
    ///
    /// [`ChainError::ChainBroken`] when logs already exist or the seed is
    /// missing, signer errors, I/O errors.
    pub fn bootstrap(&self) -> ChainResult<PathBuf> {
        if !self.store.logs()?.is_empty() {
            return Err(ChainError::ChainBroken {
                reason: "cannot bootstrap: changelogs already exist".to_string(),
            });
        }
        if !self.seed_path.exists() {
            return Err(ChainError::ChainBroken {
                reason: format!("seed missing: {}", self.seed_path.display()),
            });
        }

        // Archive the public key first so the fingerprint in the fresh
        // signature resolves.
        self.archive.archive(&self.signer.public_key()?)?;

        let seed_sig = sig_path_for(&self.seed_path);
        if !seed_sig.exists() {
            info!(seed = %self.seed_path.display(), "signing seed");
            self.signer.sign(&self.seed_path)?;
        }

        let key = key_for_signature(self.archive, &seed_sig)?;
        self.signer.verify(&self.seed_path, &seed_sig, &key)?;

        let digests = digest_file(&self.seed_path)?;
        let name = self.open_next("seed.bin", digests)?;
        info!(log = name, "bootstrapped chain from seed");
        Ok(self.store.changes_dir().join(name))
    }

    /// Close the open log (verify chain, sign) and open the next one.
    ///
    /// Idempotent across the signing boundary: if a previous run signed
    /// the log but crashed before creating its successor, the rerun
    /// detects "no open log, all logs signed" and resumes by creating the
    /// new log. A failure before signing leaves the repository unchanged.
    ///
    /// # Errors
    ///
    /// [`ChainError::ChainBroken`] when the closed chain does not verify
    /// or no logs exist, signer errors, I/O errors.
    pub fn close_and_open(&self) -> ChainResult<CloseOutcome> {
        let logs = self.store.logs()?;
        if logs.is_empty() {
            return Err(ChainError::ChainBroken {
                reason: "no changelogs exist: bootstrap first".to_string(),
            });
        }

        match self.store.open_log()? {
            Some(open) => {
                let failures =
                    closed_chain_failures(self.store, self.signer, self.archive, &self.seed_path)?;
                if !failures.is_empty() {
                    return Err(ChainError::ChainBroken {
                        reason: failures
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; "),
                    });
                }

                self.archive.archive(&self.signer.public_key()?)?;
                self.signer.sign(&open.path)?;
                info!(log = open.name, "closed changelog");

                let digests = digest_file(&open.path)?;
                let opened = self.open_next(&open.name, digests)?;
                Ok(CloseOutcome {
                    closed: Some(open.name),
                    opened,
                })
            },
            None => {
                // A previous run signed the log and crashed before
                // creating its successor. Resume from the signed tail.
                let Some(last) = logs.last().cloned() else {
                    return Err(ChainError::ChainBroken {
                        reason: "no changelogs exist: bootstrap first".to_string(),
                    });
                };
                warn!(
                    log = last.name,
                    "no open log but chain is signed: resuming interrupted closing"
                );
                let digests = digest_file(&last.path)?;
                let opened = self.open_next(&last.name, digests)?;
                Ok(CloseOutcome {
                    closed: None,
                    opened,
                })
            },
        }
    }

    /// Create the next log with its `closing` first row.
    fn open_next(&self, prev_name: &str, digests: FileDigests) -> ChainResult<String> {
        std::fs::create_dir_all(self.store.changes_dir())
            .map_err(|e| ChainError::io(self.store.changes_dir(), e))?;

        let name = self.store.unique_log_name(Utc::now().date_naive());
        let path = self.store.changes_dir().join(&name);
        let closing = ChangeEvent::new(EventPayload::Closing {
            digests,
            prev: prev_name.to_string(),
        });
        self.store.append(&path, &[closing])?;
        info!(log = name, prev = prev_name, "opened changelog");
        Ok(name)
    }

    /// The seed path this manager roots the chain in.
    #[must_use]
    pub fn seed_path(&self) -> &Path {
        &self.seed_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use historify_signer::MemorySigner;

    struct Fixture {
        _dir: tempfile::TempDir,
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
        std::fs::write(&seed, vec![0u8; 4096]).unwrap();

        Fixture {
            store: LogStore::new(changes),
            signer: MemorySigner::generate(),
            archive: KeyArchive::new(dir.path().join("keys")),
            seed,
            _dir: dir,
        }
    }

    impl Fixture {
        fn manager(&self) -> ChainManager<'_> {
            ChainManager::new(&self.store, &self.signer, &self.archive, &self.seed)
        }
    }

    #[test]
    fn bootstrap_signs_seed_and_creates_first_log() {
        let fx = fixture();
        let first = fx.manager().bootstrap().unwrap();

        assert!(sig_path_for(&fx.seed).exists());

        let events = fx.store.read_events(&first).unwrap();
        assert_eq!(events.len(), 1);
        let EventPayload::Closing { digests, prev } = &events[0].payload else {
            panic!("first row must be closing");
        };
        assert_eq!(prev, "seed.bin");
        assert_eq!(digests, &digest_file(&fx.seed).unwrap());

        // The signing key was archived.
        assert_eq!(fx.archive.list().unwrap().len(), 1);
    }

    #[test]
    fn bootstrap_twice_rejected() {
        let fx = fixture();
        fx.manager().bootstrap().unwrap();
        assert!(matches!(
            fx.manager().bootstrap(),
            Err(ChainError::ChainBroken { .. })
        ));
    }

    #[test]
    fn close_and_open_links_chain() {
        let fx = fixture();
        let first = fx.manager().bootstrap().unwrap();

        let outcome = fx.manager().close_and_open().unwrap();
        let first_name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(outcome.closed.as_deref(), Some(first_name.as_str()));

        // The old log is signed; the new log's closing row points at it.
        assert!(sig_path_for(&first).exists());
        let new_log = fx.store.changes_dir().join(&outcome.opened);
        let events = fx.store.read_events(&new_log).unwrap();
        let EventPayload::Closing { digests, prev } = &events[0].payload else {
            panic!("first row must be closing");
        };
        assert_eq!(prev, &first_name);
        assert_eq!(digests, &digest_file(&first).unwrap());
    }

    #[test]
    fn second_closing_references_first_new_log() {
        let fx = fixture();
        fx.manager().bootstrap().unwrap();
        let first_cycle = fx.manager().close_and_open().unwrap();
        let second_cycle = fx.manager().close_and_open().unwrap();

        assert_eq!(
            second_cycle.closed.as_deref(),
            Some(first_cycle.opened.as_str())
        );
        let new_log = fx.store.changes_dir().join(&second_cycle.opened);
        let events = fx.store.read_events(&new_log).unwrap();
        let EventPayload::Closing { prev, .. } = &events[0].payload else {
            panic!("first row must be closing");
        };
        assert_eq!(prev, &first_cycle.opened);
    }

    #[test]
    fn resume_after_crash_between_sign_and_create() {
        let fx = fixture();
        let first = fx.manager().bootstrap().unwrap();

        // Simulate the crash: the open log got signed but no successor
        // was created.
        fx.signer.sign(&first).unwrap();

        let outcome = fx.manager().close_and_open().unwrap();
        assert_eq!(outcome.closed, None);

        let new_log = fx.store.changes_dir().join(&outcome.opened);
        let events = fx.store.read_events(&new_log).unwrap();
        let EventPayload::Closing { prev, .. } = &events[0].payload else {
            panic!("first row must be closing");
        };
        assert_eq!(
            prev,
            &first.file_name().unwrap().to_string_lossy().into_owned()
        );
    }

    #[test]
    fn close_without_logs_rejected() {
        let fx = fixture();
        assert!(matches!(
            fx.manager().close_and_open(),
            Err(ChainError::ChainBroken { .. })
        ));
    }

    #[test]
    fn tampered_closed_log_blocks_closing() {
        let fx = fixture();
        let first = fx.manager().bootstrap().unwrap();
        fx.manager().close_and_open().unwrap();

        // Flip a byte in the now-closed first log.
        let mut content = std::fs::read(&first).unwrap();
        content[10] ^= 0xff;
        std::fs::write(&first, content).unwrap();

        assert!(matches!(
            fx.manager().close_and_open(),
            Err(ChainError::ChainBroken { .. })
        ));
    }
}
