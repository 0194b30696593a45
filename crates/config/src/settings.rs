//! Settings for cached in-repo configuration lookups
//!
//! Settings are read from TOML:
//!
//! ```toml
//! [in_repo_config.enabled]
//! "*" = true
//! "kubernetes" = false
//! "kubernetes/test-infra" = true
//!
//! [cache]
//! size = 100
//!
//! [[presubmits."kubernetes/test-infra"]]
//! name = "verify"
//! always_run = true
//! ```

use crate::error::{Error, Result};
use crate::value::{Postsubmit, Presubmit};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Default capacity of the configuration cache
pub const DEFAULT_CACHE_SIZE: i64 = 100;

/// Wildcard key in the enablement map matching every repository
pub const WILDCARD: &str = "*";

/// Root settings structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-repository enablement of in-repo configuration
    pub in_repo_config: InRepoConfig,

    /// Configuration cache settings
    pub cache: CacheSettings,

    /// Statically configured presubmits, keyed by repository identifier
    pub presubmits: HashMap<String, Vec<Presubmit>>,

    /// Statically configured postsubmits, keyed by repository identifier
    pub postsubmits: HashMap<String, Vec<Postsubmit>>,
}

impl Config {
    /// Parse settings from a TOML string
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the content is not valid settings TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::settings(None, e.to_string()))
    }

    /// Load settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Settings`] if it cannot be parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| Error::settings(Some(path), e.to_string()))?;

        debug!(
            path = %path.display(),
            enablement_entries = config.in_repo_config.enabled.len(),
            cache_size = config.cache.size,
            "Loaded settings"
        );
        Ok(config)
    }

    /// Statically configured presubmits for `identifier`
    #[must_use]
    pub fn presubmits_static(&self, identifier: &str) -> &[Presubmit] {
        self.presubmits.get(identifier).map(Vec::as_slice).unwrap_or_default()
    }

    /// Statically configured postsubmits for `identifier`
    #[must_use]
    pub fn postsubmits_static(&self, identifier: &str) -> &[Postsubmit] {
        self.postsubmits.get(identifier).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Per-repository enablement of in-repo configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InRepoConfig {
    /// Explicit flags keyed by `org/repo`, `org`, or `*`
    pub enabled: HashMap<String, bool>,
}

impl InRepoConfig {
    /// Most specific explicit flag for `identifier`.
    ///
    /// Checks the full identifier, then its organisation, then the wildcard.
    #[must_use]
    pub fn explicit_flag(&self, identifier: &str) -> Option<bool> {
        if let Some(&flag) = self.enabled.get(identifier) {
            return Some(flag);
        }
        if let Some((org, _)) = identifier.split_once('/')
            && let Some(&flag) = self.enabled.get(org)
        {
            return Some(flag);
        }
        self.enabled.get(WILDCARD).copied()
    }

    /// Whether in-repo configuration is enabled for `identifier`.
    ///
    /// Repositories without any matching flag are enabled.
    #[must_use]
    pub fn is_enabled(&self, identifier: &str) -> bool {
        self.explicit_flag(identifier).unwrap_or(true)
    }
}

/// Configuration cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of cached configurations; must be positive
    pub size: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_CACHE_SIZE,
        }
    }
}
