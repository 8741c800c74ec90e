//! Errors returned by this crate

use std::path::PathBuf;
use thiserror::Error;

/// Enum for errors in this crate
#[derive(Error, Debug)]
pub enum UmbrellaError {
    /// Error returned when a builder's build() was called improperly
    #[error("Could not build: {0}")]
    BuilderError(String),

    /// Error returned when a file could not be opened, read or written
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        source: std::io::Error,
    },

    /// Error returned when reading or writing a stream fails
    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    /// Error returned when the run configuration is not valid TOML for the schema
    #[error("Could not parse run configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Error returned when the run configuration parses but describes an impossible run
    #[error("Invalid run configuration: {0}")]
    Config(String),

    /// Error returned when a statistics file header does not carry a step size
    #[error("Malformed header in {} (line {line}): {reason}", .path.display())]
    MalformedHeader {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        line: usize,
        #[allow(missing_docs)]
        reason: String,
    },

    /// Error returned when two statistics files disagree on the step size
    #[error(
        "Step size {found} in {} does not match step size {expected} of the first window",
        .path.display()
    )]
    StepSizeMismatch {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        expected: f64,
        #[allow(missing_docs)]
        found: f64,
    },

    /// Error returned when a window has an unpopulated cell inside the effective cycle range
    #[error(
        "Window {window} (xi = {coordinate:.4}) has no usable statistics for cycle {cycle} of \
         {effective_cycles} in {}",
        .path.display()
    )]
    IncompleteWindow {
        #[allow(missing_docs)]
        window: usize,
        #[allow(missing_docs)]
        coordinate: f64,
        #[allow(missing_docs)]
        cycle: usize,
        #[allow(missing_docs)]
        effective_cycles: usize,
        #[allow(missing_docs)]
        path: PathBuf,
    },

    /// Error returned when there are no cycles common to every window
    #[error("No cycles are common to every window; there is nothing to integrate")]
    EmptyRange,

    /// Error returned when a cycle outside the effective range is requested
    #[error("Cycle {cycle} is outside the {effective_cycles} cycles common to every window")]
    CycleOutOfRange {
        #[allow(missing_docs)]
        cycle: usize,
        #[allow(missing_docs)]
        effective_cycles: usize,
    },

    /// Error returned when a cycle no window recorded is requested
    #[error("Cycle {cycle} is beyond the {max_cycles} cycles recorded by any window")]
    CycleNotRecorded {
        #[allow(missing_docs)]
        cycle: usize,
        #[allow(missing_docs)]
        max_cycles: usize,
    },

    /// Error returned when a window index is not in the registry
    #[error("Window {window} does not exist; there are {windows} windows")]
    WindowOutOfRange {
        #[allow(missing_docs)]
        window: usize,
        #[allow(missing_docs)]
        windows: usize,
    },

    /// Error returned when an array is the wrong length
    #[error("Array of length {0} is incorrect; length should be {1}")]
    ArrayLengthMismatch(usize, usize),

    /// Error returned when a PMF table row cannot be read back
    #[error("Malformed PMF table row {line}: {content:?}")]
    MalformedTableRow {
        #[allow(missing_docs)]
        line: usize,
        #[allow(missing_docs)]
        content: String,
    },
}

impl From<String> for UmbrellaError {
    fn from(s: String) -> Self {
        Self::BuilderError(s)
    }
}

impl UmbrellaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for the umbrella-rs crate
pub type Result<T> = std::result::Result<T, UmbrellaError>;
