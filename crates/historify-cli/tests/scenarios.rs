//! End-to-end scenarios over a temporary repository.
//!
//! These exercise the full bootstrap → scan → closing → verify lifecycle
//! with the built-in signer standing in for the external tool.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use historify_chain::{
    ChainManager, ChangeEvent, EventKind, EventPayload, LogStore, TrackedFile, Verifier,
    VerifyOptions, VerifyOutcome, reconstruct,
};
use historify_core::{Category, Repository};
use historify_scan::{ScanConfig, scan_category};
use historify_signer::{KeyArchive, MemorySigner, sig_path_for};

const BLAKE3_HELLO: &str = "8e4c7c1b99dbfd50e7a95185fead5ee1448fa904a2fdd778eaf5f2dbfd629a99";
const BLAKE3_WORLD: &str = "26e70f0a438787ee143979a9b519a4a330ea21e0a23d31fcb47051e70b8fe5ad";
const SHA256_HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

struct TestRepo {
    _dir: tempfile::TempDir,
    repo: Repository,
    signer: MemorySigner,
}

impl TestRepo {
    /// Initialize a repository with a 1 MiB zero seed and a `docs`
    /// category holding `a.txt` and `b/c.txt`.
    fn bootstrap() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut repo =
            Repository::init_with_seed(dir.path(), Some("test"), &vec![0u8; 1024 * 1024]).unwrap();

        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("b")).unwrap();
        std::fs::write(docs.join("a.txt"), "hello\n").unwrap();
        std::fs::write(docs.join("b/c.txt"), "world\n").unwrap();
        repo.config_mut()
            .add_category(&Category::new("docs", "docs", None).unwrap())
            .unwrap();

        let this = Self {
            _dir: dir,
            repo,
            signer: MemorySigner::generate(),
        };
        this.manager_bootstrap();
        this
    }

    fn store(&self) -> LogStore {
        LogStore::new(self.repo.changes_dir())
    }

    fn archive(&self) -> KeyArchive {
        KeyArchive::new(self.repo.keys_dir())
    }

    fn manager_bootstrap(&self) {
        let store = self.store();
        let archive = self.archive();
        ChainManager::new(&store, &self.signer, &archive, self.repo.seed_path())
            .bootstrap()
            .unwrap();
    }

    fn closing(&self) {
        let store = self.store();
        let archive = self.archive();
        ChainManager::new(&store, &self.signer, &archive, self.repo.seed_path())
            .close_and_open()
            .unwrap();
    }

    /// Run one scan over the `docs` category, flushing into the open log.
    /// Returns the events that were appended.
    fn scan(&self) -> Vec<ChangeEvent> {
        let store = self.store();
        let open = store.open_log().unwrap().expect("an open log");

        let outcome = reconstruct(&store, Some("docs"), true).unwrap();
        let prior: BTreeMap<String, TrackedFile> = outcome
            .state
            .iter()
            .map(|((_, path), record)| (path.clone(), record.clone()))
            .collect();

        let exclude = vec![self.repo.db_dir(), self.repo.changes_dir()];
        let noted = BTreeSet::new();
        let events = scan_category(
            &ScanConfig {
                category: "docs",
                root: &self.repo.root().join("docs"),
                prior: &prior,
                exclude: &exclude,
                noted_special: &noted,
            },
            Utc::now(),
        )
        .unwrap();

        store.append(&open.path, &events).unwrap();
        events
    }

    fn verify(&self, full_chain: bool) -> historify_chain::VerifyReport {
        let store = self.store();
        let archive = self.archive();
        Verifier::new(
            &store,
            &self.signer,
            &archive,
            self.repo.seed_path(),
            self.repo.integrity_path(),
        )
        .run(VerifyOptions {
            full_chain,
            check_files: false,
        })
        .unwrap()
    }

    fn open_log_path(&self) -> PathBuf {
        self.store().open_log().unwrap().expect("an open log").path
    }

    fn docs(&self) -> PathBuf {
        self.repo.root().join("docs")
    }
}

fn read_events(repo: &TestRepo, log: &Path) -> Vec<ChangeEvent> {
    repo.store().read_events(log).unwrap()
}

#[test]
fn bootstrap_and_first_scan() {
    let repo = TestRepo::bootstrap();
    repo.scan();

    let log = repo.open_log_path();
    let events = read_events(&repo, &log);
    assert_eq!(events.len(), 3);

    // First row binds to the seed.
    let EventPayload::Closing { digests, prev } = &events[0].payload else {
        panic!("first row must be closing");
    };
    assert_eq!(prev, "seed.bin");
    assert_eq!(
        digests,
        &historify_crypto::digest_file(&repo.repo.seed_path()).unwrap()
    );

    // Then exactly two new rows in lexicographic order with the literal
    // digests of the payloads.
    assert_eq!(events[1].kind(), EventKind::New);
    assert_eq!(events[1].path(), Some("a.txt"));
    assert_eq!(events[1].digests().unwrap().blake3, BLAKE3_HELLO);
    assert_eq!(events[1].digests().unwrap().sha256, SHA256_HELLO);

    assert_eq!(events[2].kind(), EventKind::New);
    assert_eq!(events[2].path(), Some("b/c.txt"));
    assert_eq!(events[2].digests().unwrap().blake3, BLAKE3_WORLD);
}

#[test]
fn rescan_without_changes_is_silent() {
    let repo = TestRepo::bootstrap();
    repo.scan();
    let second = repo.scan();
    assert!(second.is_empty(), "unexpected events: {second:?}");
}

#[test]
fn move_detection_emits_single_move() {
    let repo = TestRepo::bootstrap();
    repo.scan();

    std::fs::rename(
        repo.docs().join("a.txt"),
        repo.docs().join("b").join("a.txt"),
    )
    .unwrap();

    let events = repo.scan();
    assert_eq!(events.len(), 1, "expected one move, got {events:?}");
    let EventPayload::Move {
        ref path,
        ref from,
        ref digests,
        ..
    } = events[0].payload
    else {
        panic!("expected move, got {:?}", events[0]);
    };
    assert_eq!(path, "b/a.txt");
    assert_eq!(from, "a.txt");
    assert_eq!(digests.blake3, BLAKE3_HELLO);
    assert_eq!(digests.sha256, SHA256_HELLO);
}

#[test]
fn change_and_delete() {
    let repo = TestRepo::bootstrap();
    repo.scan();
    std::fs::rename(
        repo.docs().join("a.txt"),
        repo.docs().join("b").join("a.txt"),
    )
    .unwrap();
    repo.scan();

    std::fs::write(repo.docs().join("b/c.txt"), "WORLD\n").unwrap();
    std::fs::remove_file(repo.docs().join("b/a.txt")).unwrap();

    let events = repo.scan();
    assert_eq!(events.len(), 2, "got {events:?}");

    // Ordering: changed b/a... no - (category, path): b/a.txt (deleted)
    // sorts before b/c.txt (changed).
    let EventPayload::Deleted {
        ref path,
        ref digests,
        ..
    } = events[0].payload
    else {
        panic!("expected deleted first, got {:?}", events[0]);
    };
    assert_eq!(path, "b/a.txt");
    assert_eq!(digests.blake3, BLAKE3_HELLO);

    let EventPayload::Changed {
        ref path,
        ref digests,
        ..
    } = events[1].payload
    else {
        panic!("expected changed, got {:?}", events[1]);
    };
    assert_eq!(path, "b/c.txt");
    assert_ne!(digests.blake3, BLAKE3_WORLD);
}

#[test]
fn chain_closure_links_consecutive_logs() {
    let repo = TestRepo::bootstrap();
    repo.scan();

    let first_log = repo.open_log_path();
    repo.closing();

    assert!(sig_path_for(&first_log).exists());
    let second_log = repo.open_log_path();
    let events = read_events(&repo, &second_log);
    let EventPayload::Closing { digests, prev } = &events[0].payload else {
        panic!("first row must be closing");
    };
    assert_eq!(
        prev,
        &first_log
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    );
    assert_eq!(
        digests,
        &historify_crypto::digest_file(&first_log).unwrap()
    );

    // Closing again with no intervening events: the third log references
    // the second.
    repo.closing();
    let third_log = repo.open_log_path();
    let events = read_events(&repo, &third_log);
    let EventPayload::Closing { prev, .. } = &events[0].payload else {
        panic!("first row must be closing");
    };
    assert_eq!(
        prev,
        &second_log
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    );
}

#[test]
fn tamper_detection_full_chain() {
    let repo = TestRepo::bootstrap();
    repo.scan();
    let tampered_log = repo.open_log_path();
    repo.closing();

    // Flip one byte in the now-closed log.
    let mut content = std::fs::read(&tampered_log).unwrap();
    let idx = content.len() / 2;
    content[idx] ^= 0x01;
    std::fs::write(&tampered_log, content).unwrap();

    let report = repo.verify(true);
    assert!(!report.ok());
    let name = tampered_log.file_name().unwrap().to_string_lossy();
    assert!(
        report.failures.iter().any(|f| f.subject == name),
        "no failure names {name}: {:?}",
        report.failures
    );

    // A verify row with result=fail landed in the open log.
    let open = repo.open_log_path();
    let events = read_events(&repo, &open);
    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::Verify {
            result: VerifyOutcome::Fail,
            ..
        }
    ));
}

#[test]
fn missing_signature_on_last_closed_log() {
    let repo = TestRepo::bootstrap();
    repo.scan();
    let closed_log = repo.open_log_path();
    repo.closing();

    let before = std::fs::read_dir(repo.repo.changes_dir()).unwrap().count();
    std::fs::remove_file(sig_path_for(&closed_log)).unwrap();

    let report = repo.verify(false);
    assert!(!report.ok());
    assert!(
        report
            .failures
            .iter()
            .any(|f| f.kind == historify_chain::FailureKind::Signature)
    );

    // No log was rewritten or deleted; the only missing file is the
    // signature this test removed.
    let after = std::fs::read_dir(repo.repo.changes_dir()).unwrap().count();
    assert_eq!(after, before - 1);
}

#[test]
fn verification_result_is_stable() {
    let repo = TestRepo::bootstrap();
    repo.scan();
    repo.closing();

    let a = repo.verify(true);
    let b = repo.verify(true);
    assert!(a.ok() && b.ok());
    assert_eq!(a.logs_checked, b.logs_checked);
}
