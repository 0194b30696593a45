//! Error types for the memo cache

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by value constructors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by [`MemoCache`](crate::MemoCache)
///
/// The type is `Clone` so that a single construction outcome can be handed
/// to every caller that was waiting on it.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// The cache was created with a capacity that is not positive
    #[error("Must provide a positive size")]
    #[diagnostic(
        code(inrepo::memo::capacity),
        help("Configure a cache size of at least 1")
    )]
    NonPositiveCapacity,

    /// The value constructor failed; nothing was stored
    #[error(transparent)]
    #[diagnostic(code(inrepo::memo::construction))]
    Construction(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wrap a constructor failure
    #[must_use]
    pub fn construction(source: impl Into<BoxError>) -> Self {
        Self::Construction(Arc::from(source.into()))
    }

    /// Returns true if this error came from a value constructor
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(self, Self::Construction(_))
    }
}

/// Result type for memo cache operations
pub type Result<T> = std::result::Result<T, Error>;
