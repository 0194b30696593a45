//! Cache key derivation from a repository identifier and git references
//!
//! A lookup is identified by the repository plus the commits it is evaluated
//! at. References are resolved lazily through [`RefGetter`]s, each invoked
//! exactly once per derivation, in the order given.

use crate::error::{Error, Result};
use inrepo_memo::BoxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Resolves a git reference to a commit SHA.
///
/// Implementations may perform I/O and may fail. They are not memoized.
pub trait RefGetter {
    /// Resolve the reference
    ///
    /// # Errors
    ///
    /// Returns whatever error prevented the reference from being resolved
    fn resolve(&self) -> std::result::Result<String, BoxError>;
}

impl<F> RefGetter for F
where
    F: Fn() -> std::result::Result<String, BoxError>,
{
    fn resolve(&self) -> std::result::Result<String, BoxError> {
        self()
    }
}

/// A reference that is already known to point at a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedRef(String);

impl ResolvedRef {
    /// Wrap a known commit SHA
    #[must_use]
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }
}

impl RefGetter for ResolvedRef {
    fn resolve(&self) -> std::result::Result<String, BoxError> {
        Ok(self.0.clone())
    }
}

/// Resolved identity of a configuration lookup.
///
/// `head_shas` is `None` when no head references were supplied, which is
/// distinct from `Some(vec![])`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKeyParts {
    /// Repository identifier, e.g. `org/repo`
    #[serde(rename = "identifier")]
    pub identifier: String,
    /// Commit the base reference resolved to
    #[serde(rename = "baseSHA")]
    pub base_sha: String,
    /// Commits the head references resolved to, in the order supplied
    #[serde(rename = "headSHAs")]
    pub head_shas: Option<Vec<String>>,
}

impl CacheKeyParts {
    /// Resolve the base and head references for `identifier`.
    ///
    /// No getter is invoked when the identifier is empty. Head getters run in
    /// order and resolution stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyIdentifier`], [`Error::BaseRef`] or
    /// [`Error::HeadRef`].
    pub fn resolve(
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> Result<Self> {
        if identifier.is_empty() {
            return Err(Error::EmptyIdentifier);
        }

        let base_sha = base.resolve().map_err(|source| Error::BaseRef { source })?;

        let head_shas = if heads.is_empty() {
            None
        } else {
            let shas = heads
                .iter()
                .map(|head| head.resolve().map_err(|source| Error::HeadRef { source }))
                .collect::<Result<Vec<_>>>()?;
            Some(shas)
        };

        trace!(identifier, base_sha = %base_sha, ?head_shas, "Resolved cache key parts");

        Ok(Self {
            identifier: identifier.to_string(),
            base_sha,
            head_shas,
        })
    }
}

/// Canonical encoding of [`CacheKeyParts`].
///
/// The encoding is a JSON object with the fields in a fixed order:
/// `identifier`, `baseSHA`, then `headSHAs`. Equal parts always produce
/// equal keys, across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Encode key parts
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyEncoding`] if serialization fails, which does not
    /// happen for well-formed parts.
    pub fn from_parts(parts: &CacheKeyParts) -> Result<Self> {
        serde_json::to_string(parts)
            .map(Self)
            .map_err(|source| Error::KeyEncoding { source })
    }

    /// Returns the encoded key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
