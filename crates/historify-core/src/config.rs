//! INI-style configuration store with a derived CSV mirror.
//!
//! The store lives at `db/config` in `section.option` key form. Every write
//! regenerates `db/config.csv`, a flat `key,value` mirror kept for external
//! tooling. The INI file is the source of truth.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::category::{self, Category};
use crate::error::{ConfigError, ConfigResult};

/// Algorithms the digest pipeline actually computes.
const SUPPORTED_ALGORITHMS: [&str; 2] = ["blake3", "sha256"];

/// Keys that must be present in any usable repository.
const REQUIRED_KEYS: [&str; 2] = ["repository.name", "hash.algorithms"];

/// The repository configuration store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    ini_path: PathBuf,
    csv_path: PathBuf,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

/// A problem found by [`ConfigStore::check`].
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    /// The key (or key prefix) the issue concerns.
    pub key: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl ConfigStore {
    /// Create an empty store that will persist to the given paths.
    #[must_use]
    pub fn empty(ini_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            ini_path: ini_path.into(),
            csv_path: csv_path.into(),
            sections: BTreeMap::new(),
        }
    }

    /// Load the store from its INI file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] on unparseable lines and
    /// [`ConfigError::Io`] when the file cannot be read.
    pub fn load(ini_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let ini_path = ini_path.into();
        let content = std::fs::read_to_string(&ini_path).map_err(|e| ConfigError::Io {
            path: ini_path.clone(),
            source: e,
        })?;

        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = Some(name.trim().to_string());
                sections.entry(name.trim().to_string()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Malformed {
                    path: ini_path,
                    line: idx + 1,
                    reason: format!("expected key = value, got {line:?}"),
                });
            };
            let Some(section) = current.clone() else {
                return Err(ConfigError::Malformed {
                    path: ini_path,
                    line: idx + 1,
                    reason: "option outside any [section]".to_string(),
                });
            };
            sections
                .entry(section)
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            ini_path,
            csv_path: csv_path.into(),
            sections,
        })
    }

    /// Get a value by `section.option` key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let (section, option) = key.split_once('.')?;
        self.sections
            .get(section)
            .and_then(|s| s.get(option))
            .map(String::as_str)
    }

    /// Get a value, falling back to a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Set a value in memory without persisting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] if the key is not `section.option`.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> ConfigResult<()> {
        let Some((section, option)) = key.split_once('.') else {
            return Err(ConfigError::InvalidKey {
                key: key.to_string(),
            });
        };
        if section.is_empty() || option.is_empty() {
            return Err(ConfigError::InvalidKey {
                key: key.to_string(),
            });
        }
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(option.to_string(), value.into());
        Ok(())
    }

    /// Set a value and persist both the INI file and the CSV mirror.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] for malformed keys and
    /// [`ConfigError::Io`] when persisting fails.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> ConfigResult<()> {
        self.insert(key, value)?;
        self.save()
    }

    /// Persist the store: INI file plus CSV mirror.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when either file cannot be written.
    pub fn save(&self) -> ConfigResult<()> {
        let mut ini = String::new();
        for (section, options) in &self.sections {
            ini.push_str(&format!("[{section}]\n"));
            for (option, value) in options {
                ini.push_str(&format!("{option} = {value}\n"));
            }
            ini.push('\n');
        }
        std::fs::write(&self.ini_path, ini).map_err(|e| ConfigError::Io {
            path: self.ini_path.clone(),
            source: e,
        })?;

        let mut csv = String::new();
        for (key, value) in self.list() {
            csv.push_str(&format!("{},{}\n", csv_field(&key), csv_field(&value)));
        }
        std::fs::write(&self.csv_path, csv).map_err(|e| ConfigError::Io {
            path: self.csv_path.clone(),
            source: e,
        })?;

        debug!(path = %self.ini_path.display(), "saved repository config");
        Ok(())
    }

    /// All keys and values, flattened to `section.option` form, sorted.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (section, options) in &self.sections {
            for (option, value) in options {
                out.insert(format!("{section}.{option}"), value.clone());
            }
        }
        out
    }

    /// All configured categories, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCategoryName`] if a stored name fails
    /// validation (hand-edited config).
    pub fn categories(&self) -> ConfigResult<Vec<Category>> {
        let Some(options) = self.sections.get("category") else {
            return Ok(Vec::new());
        };

        let mut categories = Vec::new();
        for (option, value) in options {
            let Some(name) = option.strip_suffix(".path") else {
                continue;
            };
            let description = options.get(&format!("{name}.description")).cloned();
            categories.push(Category::new(name, value, description)?);
        }
        Ok(categories)
    }

    /// Look up one category by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCategory`] if the name is not configured.
    pub fn category(&self, name: &str) -> ConfigResult<Category> {
        self.categories()?
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| ConfigError::UnknownCategory {
                name: name.to_string(),
            })
    }

    /// Add a category and persist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateCategory`] if the name is taken,
    /// plus the usual validation and I/O errors.
    pub fn add_category(&mut self, category: &Category) -> ConfigResult<()> {
        if self.get(&format!("category.{}.path", category.name())).is_some() {
            return Err(ConfigError::DuplicateCategory {
                name: category.name().to_string(),
            });
        }
        self.insert(
            &format!("category.{}.path", category.name()),
            category.path().to_string_lossy(),
        )?;
        if let Some(desc) = category.description() {
            self.insert(&format!("category.{}.description", category.name()), desc)?;
        }
        self.save()
    }

    /// The ordered hash algorithm list (`hash.algorithms`, first is primary).
    #[must_use]
    pub fn hash_algorithms(&self) -> Vec<String> {
        self.get_or("hash.algorithms", "blake3,sha256")
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Check the configuration for problems.
    ///
    /// Returns an empty list when everything looks consistent. Paths in
    /// `minisign.*` are resolved against `repo_root` when relative.
    #[must_use]
    pub fn check(&self, repo_root: &Path) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for key in REQUIRED_KEYS {
            if self.get(key).is_none() {
                issues.push(ConfigIssue {
                    key: key.to_string(),
                    message: "required key is not set".to_string(),
                });
            }
        }

        let algorithms = self.hash_algorithms();
        if !algorithms.iter().any(|a| a == "blake3") {
            issues.push(ConfigIssue {
                key: "hash.algorithms".to_string(),
                message: "blake3 must be included".to_string(),
            });
        }
        for algo in &algorithms {
            if !SUPPORTED_ALGORITHMS.contains(&algo.as_str()) {
                issues.push(ConfigIssue {
                    key: "hash.algorithms".to_string(),
                    message: format!("unsupported algorithm {algo:?}"),
                });
            }
        }

        if let Some(options) = self.sections.get("category") {
            for (option, value) in options {
                let Some(name) = option.strip_suffix(".path") else {
                    continue;
                };
                if !category::is_valid_name(name) {
                    issues.push(ConfigIssue {
                        key: format!("category.{name}.path"),
                        message: "invalid category name".to_string(),
                    });
                }
                if value.is_empty() {
                    issues.push(ConfigIssue {
                        key: format!("category.{name}.path"),
                        message: "empty path".to_string(),
                    });
                }
            }
        }

        let key = self.get("minisign.key");
        let pub_key = self.get("minisign.pub");
        for (config_key, value) in [("minisign.key", key), ("minisign.pub", pub_key)] {
            if let Some(value) = value {
                let path = resolve(repo_root, value);
                if !path.exists() {
                    issues.push(ConfigIssue {
                        key: config_key.to_string(),
                        message: format!("file not found: {}", path.display()),
                    });
                }
            }
        }
        if key.is_some() != pub_key.is_some() {
            issues.push(ConfigIssue {
                key: "minisign".to_string(),
                message: "both minisign.key and minisign.pub must be set".to_string(),
            });
        }

        issues
    }
}

fn resolve(repo_root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}

/// Quote a CSV mirror field when it contains the separator, a quote,
/// or whitespace.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"']) || value.contains(char::is_whitespace) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> ConfigStore {
        ConfigStore::empty(dir.join("config"), dir.join("config.csv"))
    }

    #[test]
    fn set_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        store.set("repository.name", "test").unwrap();
        store.set("hash.algorithms", "blake3,sha256").unwrap();

        assert_eq!(store.get("repository.name"), Some("test"));

        let reloaded =
            ConfigStore::load(dir.path().join("config"), dir.path().join("config.csv")).unwrap();
        assert_eq!(reloaded.get("repository.name"), Some("test"));
        assert_eq!(reloaded.get("hash.algorithms"), Some("blake3,sha256"));
    }

    #[test]
    fn csv_mirror_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.set("repository.name", "my repo").unwrap();

        let csv = std::fs::read_to_string(dir.path().join("config.csv")).unwrap();
        assert_eq!(csv, "repository.name,\"my repo\"\n");
    }

    #[test]
    fn invalid_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        assert!(matches!(
            store.set("nodot", "x"),
            Err(ConfigError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.set(".leading", "x"),
            Err(ConfigError::InvalidKey { .. })
        ));
    }

    #[test]
    fn malformed_ini_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "[repo]\nnot a pair\n").unwrap();

        let result = ConfigStore::load(&path, dir.path().join("config.csv"));
        assert!(matches!(result, Err(ConfigError::Malformed { line: 2, .. })));
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "# header\n\n[repository]\n; note\nname = x\n").unwrap();

        let store = ConfigStore::load(&path, dir.path().join("config.csv")).unwrap();
        assert_eq!(store.get("repository.name"), Some("x"));
    }

    #[test]
    fn categories_parsed_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store
            .add_category(&Category::new("photos", "data/photos", None).unwrap())
            .unwrap();
        store
            .add_category(
                &Category::new("docs", "data/docs", Some("documents".to_string())).unwrap(),
            )
            .unwrap();

        let cats = store.categories().unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].name(), "docs");
        assert_eq!(cats[0].description(), Some("documents"));
        assert_eq!(cats[1].name(), "photos");
    }

    #[test]
    fn duplicate_category_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let cat = Category::new("docs", "data/docs", None).unwrap();
        store.add_category(&cat).unwrap();
        assert!(matches!(
            store.add_category(&cat),
            Err(ConfigError::DuplicateCategory { .. })
        ));
    }

    #[test]
    fn check_reports_missing_required() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let issues = store.check(dir.path());
        assert!(issues.iter().any(|i| i.key == "repository.name"));
        assert!(issues.iter().any(|i| i.key == "hash.algorithms"));
    }

    #[test]
    fn check_requires_blake3() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.set("repository.name", "t").unwrap();
        store.set("hash.algorithms", "sha256").unwrap();

        let issues = store.check(dir.path());
        assert!(
            issues
                .iter()
                .any(|i| i.key == "hash.algorithms" && i.message.contains("blake3"))
        );
    }

    #[test]
    fn check_minisign_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("minisign.key");
        std::fs::write(&key_path, "stub").unwrap();

        let mut store = store_in(dir.path());
        store.set("repository.name", "t").unwrap();
        store.set("hash.algorithms", "blake3,sha256").unwrap();
        store
            .set("minisign.key", key_path.to_string_lossy())
            .unwrap();

        let issues = store.check(dir.path());
        assert!(issues.iter().any(|i| i.key == "minisign"));
    }
}
