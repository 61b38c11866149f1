//! Error types and result handling for barman-conf.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Declaration errors (`InvalidIdentifier`, `MissingRequiredField`,
//! `MultilineValue`, `EmptyConninfo`, `ConninfoConflict`) abort a producer's compilation before
//! anything is rendered or published. `IdentifierConflict` is reported by the
//! broker on the consumer side and never aborts a collection.
//!
//! # Example
//!
//! ```rust
//! use barman_conf::{Error, ServerName};
//!
//! match ServerName::new("server!@#%") {
//!     Err(Error::InvalidIdentifier { value }) => assert_eq!(value, "server!@#%"),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use thiserror::Error;

/// The main error type for barman-conf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Server name does not match `^[0-9A-Za-z][0-9A-Za-z_-]*$`.
    #[error("invalid server name '{value}': expected a match for ^[0-9A-Za-z][0-9A-Za-z_-]*$")]
    InvalidIdentifier {
        /// The rejected input
        value: String,
    },

    /// Producer identity is empty or not usable as a path segment.
    #[error("invalid producer id '{value}'")]
    InvalidProducerId {
        /// The rejected input
        value: String,
    },

    /// A declaration omitted a field that has no default.
    #[error("missing required field '{field}'")]
    MissingRequiredField {
        /// Name of the missing field
        field: &'static str,
    },

    /// A single-line field contains a line break, which would let the value
    /// spill into further keys or sections of the rendered file.
    #[error("field '{field}' must be a single line, got {value:?}")]
    MultilineValue {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value
        value: String,
    },

    /// The connection string resolved to nothing.
    #[error("conninfo is empty")]
    EmptyConninfo,

    /// A full `conninfo` was supplied together with structured fields that
    /// it does not agree with.
    #[error("conninfo conflict on '{field}': structured value '{structured}', conninfo has '{conninfo}'")]
    ConninfoConflict {
        /// Structured field name (`user`, `dbname`, `host`, `port`, `conninfo_options`)
        field: String,
        /// Value supplied through the structured field
        structured: String,
        /// Value found in the full conninfo, empty when absent
        conninfo: String,
    },

    /// Two producers published the same server name to one selector.
    #[error("server '{identifier}' published by several producers: kept '{kept}', rejected {rejected:?}")]
    IdentifierConflict {
        /// The contested server name
        identifier: String,
        /// Producer whose record was kept
        kept: String,
        /// Producers whose records were dropped
        rejected: Vec<String>,
    },

    /// Selector expression could not be parsed.
    #[error("invalid selector '{value}': expected key=value[,key=value...]")]
    InvalidSelector {
        /// The rejected expression
        value: String,
    },

    /// Configuration error, typically a missing section.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while loading layered settings.
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// JSON serialization error for the exchange store or snapshot.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from store or config file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Exchange store failure not covered by I/O or serialization.
    #[error("Store error: {message}")]
    Store {
        /// Description of the failure
        message: String,
    },
}

/// A convenient Result type alias for barman-conf operations.
///
/// This is equivalent to `std::result::Result<T, barman_conf::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
