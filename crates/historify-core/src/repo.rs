//! Repository handle and initialization.
//!
//! # Layout
//!
//! ```text
//! <repo>/
//! ├── db/
//! │   ├── config            (INI-style key/value)
//! │   ├── config.csv        (derived CSV mirror)
//! │   ├── integrity.csv     (derived index, regeneratable)
//! │   ├── seed.bin          (1 MiB CSPRNG output, immutable)
//! │   ├── seed.bin.sig      (detached signature, mandatory before scans)
//! │   ├── keys/             (archived public keys, <fingerprint>.pub)
//! │   └── .lock             (advisory lockfile)
//! └── changes/
//!     ├── changelog-YYYY-MM-DD[-N].csv
//!     └── changelog-YYYY-MM-DD[-N].csv.sig
//! ```

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::config::ConfigStore;
use crate::error::{RepoError, RepoResult};
use crate::lock::{LockMode, RepoLock};

/// Size of the random seed file (1 MiB).
pub const SEED_LEN: usize = 1024 * 1024;

/// An opened historify repository.
///
/// The handle carries the root path and the loaded configuration; every
/// operation receives it explicitly, constructed once per command.
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    config: ConfigStore,
}

impl Repository {
    /// Initialize a new repository at `root`.
    ///
    /// Creates the directory structure, a fresh 1 MiB random seed, and the
    /// default configuration. The seed is not yet signed; signing happens at
    /// the first `start`/`closing`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::AlreadyInitialized`] if a repository already
    /// exists at `root`, or I/O errors from scaffolding.
    pub fn init(root: impl Into<PathBuf>, name: Option<&str>) -> RepoResult<Self> {
        let mut seed = vec![0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);
        Self::init_with_seed(root, name, &seed)
    }

    /// Initialize with caller-provided seed bytes.
    ///
    /// Exists so tests can build deterministic repositories; production use
    /// goes through [`Repository::init`].
    ///
    /// # Errors
    ///
    /// Same as [`Repository::init`], plus [`RepoError::SeedInvalid`] if the
    /// seed is empty.
    pub fn init_with_seed(
        root: impl Into<PathBuf>,
        name: Option<&str>,
        seed: &[u8],
    ) -> RepoResult<Self> {
        let root = root.into();
        if seed.is_empty() {
            return Err(RepoError::SeedInvalid {
                reason: "seed must not be empty".to_string(),
            });
        }

        let db_dir = root.join("db");
        if db_dir.join("config").exists() {
            return Err(RepoError::AlreadyInitialized { path: root });
        }

        let name = name
            .map(str::to_string)
            .or_else(|| {
                root.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "repository".to_string());

        info!(root = %root.display(), name, "initializing repository");

        for dir in [&db_dir, &db_dir.join("keys"), &root.join("changes")] {
            std::fs::create_dir_all(dir).map_err(|e| RepoError::io(dir, e))?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&db_dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| RepoError::io(&db_dir, e))?;
        }

        let seed_path = db_dir.join("seed.bin");
        std::fs::write(&seed_path, seed).map_err(|e| RepoError::io(&seed_path, e))?;
        debug!(path = %seed_path.display(), len = seed.len(), "wrote seed");

        let mut config = ConfigStore::empty(db_dir.join("config"), db_dir.join("config.csv"));
        config.insert("repository.name", name.as_str())?;
        config.insert(
            "repository.created",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        // ctime/mtime resolution is fixed for the life of the repository.
        config.insert("repository.time_resolution", "seconds")?;
        config.insert("hash.algorithms", "blake3,sha256")?;
        config.insert("changes.directory", "changes")?;
        config.save()?;

        Ok(Self { root, config })
    }

    /// Open an existing repository at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotARepository`] if the layout is missing, or
    /// configuration errors from loading `db/config`.
    pub fn open(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let root = root.into();
        let db_dir = root.join("db");
        if !db_dir.join("config").exists() || !db_dir.join("seed.bin").exists() {
            return Err(RepoError::NotARepository { path: root });
        }

        let config = ConfigStore::load(db_dir.join("config"), db_dir.join("config.csv"))?;
        Ok(Self { root, config })
    }

    /// Repository root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `db/` metadata directory.
    #[must_use]
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Path to the random seed.
    #[must_use]
    pub fn seed_path(&self) -> PathBuf {
        self.db_dir().join("seed.bin")
    }

    /// Path to the seed's detached signature.
    #[must_use]
    pub fn seed_sig_path(&self) -> PathBuf {
        self.db_dir().join("seed.bin.sig")
    }

    /// Directory of archived public keys.
    #[must_use]
    pub fn keys_dir(&self) -> PathBuf {
        self.db_dir().join("keys")
    }

    /// Path to the derived integrity index.
    #[must_use]
    pub fn integrity_path(&self) -> PathBuf {
        self.db_dir().join("integrity.csv")
    }

    /// The changes directory (honors the `changes.directory` override).
    #[must_use]
    pub fn changes_dir(&self) -> PathBuf {
        self.root
            .join(self.config.get_or("changes.directory", "changes"))
    }

    /// Path of the advisory lockfile.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.db_dir().join(".lock")
    }

    /// Acquire the repository lock in the given mode.
    ///
    /// # Errors
    ///
    /// See [`RepoLock::acquire`].
    pub fn lock(&self, mode: LockMode) -> RepoResult<RepoLock> {
        RepoLock::acquire(&self.lock_path(), mode)
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_scaffolds_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_with_seed(dir.path(), Some("test"), &[0u8; 64]).unwrap();

        assert!(repo.seed_path().exists());
        assert!(repo.keys_dir().is_dir());
        assert!(repo.changes_dir().is_dir());
        assert_eq!(repo.config().get("repository.name"), Some("test"));
        assert_eq!(
            repo.config().get("hash.algorithms"),
            Some("blake3,sha256")
        );
        assert_eq!(
            repo.config().get("repository.time_resolution"),
            Some("seconds")
        );
    }

    #[test]
    fn init_name_defaults_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("vault");
        std::fs::create_dir(&root).unwrap();

        let repo = Repository::init_with_seed(&root, None, &[1u8; 16]).unwrap();
        assert_eq!(repo.config().get("repository.name"), Some("vault"));
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init_with_seed(dir.path(), None, &[0u8; 16]).unwrap();
        let result = Repository::init_with_seed(dir.path(), None, &[0u8; 16]);
        assert!(matches!(result, Err(RepoError::AlreadyInitialized { .. })));
    }

    #[test]
    fn open_requires_layout() {
        let dir = tempfile::tempdir().unwrap();
        let result = Repository::open(dir.path());
        assert!(matches!(result, Err(RepoError::NotARepository { .. })));
    }

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init_with_seed(dir.path(), Some("rt"), &[9u8; 32]).unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.config().get("repository.name"), Some("rt"));
    }

    #[test]
    fn changes_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init_with_seed(dir.path(), None, &[0u8; 16]).unwrap();
        repo.config_mut()
            .set("changes.directory", "journal")
            .unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.changes_dir(), dir.path().join("journal"));
    }

    #[cfg(unix)]
    #[test]
    fn db_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_with_seed(dir.path(), None, &[0u8; 16]).unwrap();

        let perms = std::fs::metadata(repo.db_dir()).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700);
    }
}
