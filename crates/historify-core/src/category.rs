//! Categories: named views over data roots.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

/// A named data root that scans operate on.
///
/// The root is either repository-relative or absolute ("external").
/// Change events are scoped to the category they were observed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    path: PathBuf,
    description: Option<String>,
}

impl Category {
    /// Create a category, validating the name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCategoryName`] if the name is empty or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        description: Option<String>,
    ) -> ConfigResult<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ConfigError::InvalidCategoryName { name });
        }
        Ok(Self {
            name,
            path: path.into(),
            description,
        })
    }

    /// The category name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured root path, as stored (relative or absolute).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Optional human description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether the root lives outside the repository (absolute path).
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.path.is_absolute()
    }

    /// Resolve the data root against the repository root.
    #[must_use]
    pub fn resolve_root(&self, repo_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            repo_root.join(&self.path)
        }
    }
}

/// Check whether a string is a valid category name (`[A-Za-z0-9_-]+`).
#[must_use]
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
