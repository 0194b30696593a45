//! Memoized lookup of in-repo CI job configuration
//!
//! Deriving a repository's job configuration from its git tree is expensive.
//! This crate caches the result per repository and set of resolved commits:
//!
//! - [`key`] turns an identifier plus lazily resolved base/head references
//!   into a canonical [`CacheKey`]
//! - [`cached`] consults the per-repository [`InRepoConfig`] policy and then
//!   a shared [`ConfigCache`], which runs the constructor at most once per key
//! - [`settings`] loads the policy and cache size from TOML

pub mod cached;
mod error;
pub mod key;
pub mod settings;
pub mod value;

pub use cached::{ConfigCache, new_config_cache};
pub use error::{Error, Result};
pub use inrepo_memo::{BoxError, CacheStats};
pub use key::{CacheKey, CacheKeyParts, RefGetter, ResolvedRef};
pub use settings::{CacheSettings, Config, DEFAULT_CACHE_SIZE, InRepoConfig};
pub use value::{CachedValue, JobConfig, Postsubmit, Presubmit};
