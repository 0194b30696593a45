//! Cached lookup of in-repo job configuration
//!
//! Lookups consult the per-repository enablement policy first; disabled
//! repositories get an empty [`JobConfig`] without touching the cache or
//! resolving any reference. Enabled lookups derive a [`CacheKey`] from the
//! resolved references and let the [`ConfigCache`] decide whether the
//! expensive constructor has to run.

use crate::error::Result;
use crate::key::{CacheKey, CacheKeyParts, RefGetter};
use crate::settings::Config;
use crate::value::{CachedValue, JobConfig, Postsubmit, Presubmit};
use inrepo_memo::{BoxError, MemoCache};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Cache shared by configuration lookups.
///
/// Values are stored type-erased so one instance can be shared by callers
/// that cache different kinds of values; reads check the stored type.
pub type ConfigCache = MemoCache<CacheKey, CachedValue>;

/// Create a configuration cache holding at most `size` entries
///
/// Sizes beyond the platform's address range are clamped to `usize::MAX`.
///
/// # Errors
///
/// Returns the memo cache's capacity error if `size` is not positive
pub fn new_config_cache(size: i64) -> Result<ConfigCache> {
    if size <= 0 {
        return Err(inrepo_memo::Error::NonPositiveCapacity.into());
    }
    let capacity = usize::try_from(size).unwrap_or(usize::MAX);
    Ok(ConfigCache::new(capacity)?)
}

impl Config {
    /// Create a configuration cache sized from these settings
    ///
    /// # Errors
    ///
    /// Returns the memo cache's capacity error if `cache.size` is not positive
    pub fn new_cache(&self) -> Result<ConfigCache> {
        new_config_cache(self.cache.size)
    }

    /// Returns the in-repo job configuration for `identifier` at the given
    /// references, constructing it at most once per distinct key.
    ///
    /// `construct` receives `clients` untouched along with the identifier and
    /// getters, and is only called on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns key derivation errors unchanged, the constructor's error on a
    /// failed miss, or [`Error::Corrupted`](crate::Error::Corrupted) if the cache holds a value of
    /// another type under this key.
    pub fn job_config_cached<G, C>(
        &self,
        cache: &ConfigCache,
        construct: C,
        clients: &G,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> Result<Arc<JobConfig>>
    where
        G: ?Sized,
        C: FnOnce(&G, &str, &dyn RefGetter, &[&dyn RefGetter]) -> std::result::Result<JobConfig, BoxError>,
    {
        if !self.in_repo_config.is_enabled(identifier) {
            debug!(identifier, "In-repo config disabled, skipping cache");
            return Ok(Arc::new(JobConfig::default()));
        }

        let parts = CacheKeyParts::resolve(identifier, base, heads)?;
        let key = CacheKey::from_parts(&parts)?;
        trace!(%key, "Looking up job config");

        let value = cache.get_or_add(key, || {
            construct(clients, identifier, base, heads).map(CachedValue::new)
        })?;

        value.downcast::<JobConfig>().inspect_err(|err| {
            error!(identifier, error = %err, "Config cache returned a value of the wrong type");
        })
    }

    /// Static presubmits for `identifier` followed by those from its cached
    /// in-repo configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Config::job_config_cached`]
    pub fn presubmits_cached<G, C>(
        &self,
        cache: &ConfigCache,
        construct: C,
        clients: &G,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> Result<Vec<Presubmit>>
    where
        G: ?Sized,
        C: FnOnce(&G, &str, &dyn RefGetter, &[&dyn RefGetter]) -> std::result::Result<JobConfig, BoxError>,
    {
        let in_repo = self.job_config_cached(cache, construct, clients, identifier, base, heads)?;

        let mut jobs = self.presubmits_static(identifier).to_vec();
        jobs.extend(in_repo.presubmits.iter().cloned());
        Ok(jobs)
    }

    /// Static postsubmits for `identifier` followed by those from its cached
    /// in-repo configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Config::job_config_cached`]
    pub fn postsubmits_cached<G, C>(
        &self,
        cache: &ConfigCache,
        construct: C,
        clients: &G,
        identifier: &str,
        base: &dyn RefGetter,
        heads: &[&dyn RefGetter],
    ) -> Result<Vec<Postsubmit>>
    where
        G: ?Sized,
        C: FnOnce(&G, &str, &dyn RefGetter, &[&dyn RefGetter]) -> std::result::Result<JobConfig, BoxError>,
    {
        let in_repo = self.job_config_cached(cache, construct, clients, identifier, base, heads)?;

        let mut jobs = self.postsubmits_static(identifier).to_vec();
        jobs.extend(in_repo.postsubmits.iter().cloned());
        Ok(jobs)
    }
}
