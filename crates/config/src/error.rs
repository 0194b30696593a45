//! Error types for cached configuration lookups

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use inrepo_memo::BoxError;
use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while deriving keys or looking up cached configuration
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The repository identifier was empty
    #[error("identifier cannot be empty")]
    #[diagnostic(
        code(inrepo::config::identifier),
        help("Pass the repository identifier, e.g. 'org/repo'")
    )]
    EmptyIdentifier,

    /// Resolving the base reference failed
    #[error("failed to get baseSHA: {source}")]
    #[diagnostic(code(inrepo::config::base_ref))]
    BaseRef {
        /// Error returned by the base reference getter
        #[source]
        source: BoxError,
    },

    /// Resolving one of the head references failed
    #[error("failed to get headRef: {source}")]
    #[diagnostic(code(inrepo::config::head_ref))]
    HeadRef {
        /// Error returned by the failing head reference getter
        #[source]
        source: BoxError,
    },

    /// The cache key could not be serialized
    #[error("failed to encode cache key: {source}")]
    #[diagnostic(code(inrepo::config::key_encoding))]
    KeyEncoding {
        /// Serializer error
        #[source]
        source: serde_json::Error,
    },

    /// The cache returned a value of a different type than requested
    #[error("Programmer error: expected value type '{expected}', got '{actual}'")]
    #[diagnostic(
        code(inrepo::config::corrupted),
        help("Another caller stored a different kind of value in this cache instance")
    )]
    Corrupted {
        /// Type name the caller asked for
        expected: &'static str,
        /// Type name of the stored value
        actual: &'static str,
    },

    /// The in-repo job configuration could not be parsed
    #[error("failed to parse job config: {source}")]
    #[diagnostic(code(inrepo::config::job_config))]
    JobConfig {
        /// YAML parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// Memo cache error, including value construction failures
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] inrepo_memo::Error),

    /// The settings file is invalid
    #[error("Invalid settings{}: {message}", path.as_ref().map_or(String::new(), |p| format!(" in {}", p.display())))]
    #[diagnostic(
        code(inrepo::config::settings),
        help("Check the settings file against the documented keys")
    )]
    Settings {
        /// Settings file path, if the settings came from a file
        path: Option<Box<Path>>,
        /// Parser message
        message: String,
    },

    /// I/O error while reading settings
    #[error("I/O {operation} failed: {}", path.display())]
    #[diagnostic(
        code(inrepo::config::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error
        path: Box<Path>,
        /// Operation that failed
        operation: String,
    },
}

impl Error {
    /// Create a settings error
    #[must_use]
    pub fn settings(path: Option<&Path>, message: impl Into<String>) -> Self {
        Self::Settings {
            path: path.map(Into::into),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.as_ref().into(),
            operation: operation.into(),
        }
    }

    /// Returns true for the corruption error, which signals a contract
    /// violation elsewhere in the process and must not be recovered from.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

/// Result type for configuration lookups
pub type Result<T> = std::result::Result<T, Error>;
