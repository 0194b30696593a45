//! Bounded memoizing cache with singleflight construction
//!
//! [`MemoCache`] stores up to a fixed number of values, evicting the least
//! recently used entry when full, and guarantees that concurrent lookups for
//! the same missing key run the expensive constructor only once. Lookups for
//! different keys never wait on each other's constructors.
//!
//! ```
//! use inrepo_memo::{BoxError, MemoCache};
//!
//! let cache = MemoCache::new(1).unwrap();
//! let first = cache.get_or_add("A", || Ok::<_, BoxError>(10)).unwrap();
//! let second = cache.get_or_add("A", || Ok::<_, BoxError>(20)).unwrap();
//! assert_eq!((first, second), (10, 10));
//! ```

mod cache;
mod error;
mod flight;
mod stats;

pub use cache::MemoCache;
pub use error::{BoxError, Error, Result};
pub use stats::CacheStats;
