//! Job configuration values and their type-erased cached form

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Job definitions a repository carries in its own tree.
///
/// The default value, with no jobs, is what lookups return for repositories
/// that have in-repo configuration disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Jobs run against proposed changes
    pub presubmits: Vec<Presubmit>,
    /// Jobs run after changes merge
    pub postsubmits: Vec<Postsubmit>,
}

impl JobConfig {
    /// Parse the in-repo YAML job file
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobConfig`] if the content is not a valid job file
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|source| Error::JobConfig { source })
    }

    /// Returns true if no jobs are defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presubmits.is_empty() && self.postsubmits.is_empty()
    }
}

/// A job triggered by proposed changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presubmit {
    /// Job name
    pub name: String,
    /// Run on every change regardless of which files changed
    #[serde(default)]
    pub always_run: bool,
    /// Regex over changed paths that triggers the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if_changed: Option<String>,
    /// Branches the job applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

impl Presubmit {
    /// Create a presubmit with only a name set
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A job triggered after changes merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postsubmit {
    /// Job name
    pub name: String,
    /// Branches the job applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

impl Postsubmit {
    /// Create a postsubmit with only a name set
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Type-erased value stored in a shared configuration cache.
///
/// Remembers the concrete type name so that a mismatched read can report
/// what was actually stored.
#[derive(Clone)]
pub struct CachedValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl CachedValue {
    /// Wrap a value
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value
    #[must_use]
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            type_name: type_name::<T>(),
            value,
        }
    }

    /// Name of the stored type
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the stored value as `T`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] naming both types if the stored value is
    /// not a `T`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        Arc::clone(&self.value)
            .downcast::<T>()
            .map_err(|_| Error::Corrupted {
                expected: type_name::<T>(),
                actual: self.type_name,
            })
    }
}

impl fmt::Debug for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
