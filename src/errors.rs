//! Centralized error handling for insitu_stats
//!
//! Every failure in the engine is a configuration error, a protocol violation
//! or a broken invariant. None of them is recoverable: operations return the
//! error immediately and callers propagate it with `?`.

use thiserror::Error;

/// Main error type for insitu_stats operations
#[derive(Debug, Error)]
pub enum StatsError {
    /// Malformed layout (zero extent, name/extent count mismatch, duplicate names)
    #[error("Invalid layout: {message}")]
    InvalidLayout { message: String },

    /// A dimension name is absent from (or ambiguous in) a layout
    #[error("Dimension '{dim}' not found in layout {layout}")]
    DimensionNotFound { dim: String, layout: String },

    /// Field used out of order (read before commit, double set, re-commit, ...)
    #[error("Field '{field}': {message}")]
    FieldProtocol { field: String, message: String },

    /// Typed access with the wrong data type tag
    #[error("Data type mismatch for field '{field}': stored {stored}, requested {requested}")]
    DataTypeMismatch {
        field: String,
        stored: String,
        requested: String,
    },

    /// Partition extents/counts inconsistent with the layout
    #[error("Partition mismatch in field '{field}': {message}")]
    PartitionMismatch { field: String, message: String },

    /// Two partitions share the same storage
    #[error("Field '{field}': partitions {first} and {second} alias the same storage")]
    AliasedPartitions {
        field: String,
        first: usize,
        second: usize,
    },

    /// Stat kernel not available for this rank
    #[error("Stat '{stat}': unsupported rank {rank} for field '{field}'")]
    UnsupportedRank {
        stat: String,
        field: String,
        rank: usize,
    },

    /// Stat kernel not available for this data type
    #[error("Stat '{stat}': unsupported data type '{data_type}' for field '{field}'")]
    UnsupportedDataType {
        stat: String,
        field: String,
        data_type: String,
    },

    /// A required auxiliary field was not provided
    #[error("Stat '{stat}': missing required auxiliary field '{aux}'")]
    MissingAuxField { stat: String, aux: String },

    /// An auxiliary field does not match the input field
    #[error("Stat '{stat}': incompatible auxiliary field '{aux}': {message}")]
    IncompatibleAuxField {
        stat: String,
        aux: String,
        message: String,
    },

    /// Stat used out of order (compute before create_stat_field, ...)
    #[error("Stat '{stat}': {message}")]
    StatProtocol { stat: String, message: String },

    /// Stat configured with inconsistent parameters
    #[error("Stat '{stat}': invalid configuration: {message}")]
    StatConfig { stat: String, message: String },

    /// Integer result does not fit the field's element type
    #[error("Stat '{stat}': integer overflow while computing {op}")]
    IntegerOverflow { stat: String, op: String },

    /// No constructor registered under this name
    #[error("Unknown stat type '{stat_type}' (not registered in the stat factory)")]
    UnknownStatType { stat_type: String },

    /// Parameter lookup failure
    #[error("Missing parameter '{param}' in parameter list '{list}'")]
    MissingParameter { list: String, param: String },

    /// Parameter present but of the wrong type
    #[error("Invalid parameter '{param}' in parameter list '{list}': {message}")]
    InvalidParameter {
        list: String,
        param: String,
        message: String,
    },

    /// Collective operation failure (mismatched buffers, bad root, ...)
    #[error("Communication error: {0}")]
    Comm(String),

    /// Malformed YYYYMMDD/time-of-day pair
    #[error("Invalid time stamp: {0}")]
    InvalidTimeStamp(String),

    /// A storage lock was poisoned by a panicking thread
    #[error("Storage lock poisoned for field '{field}'")]
    LockPoisoned { field: String },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Variable not found in a netCDF file
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// Session-level misuse (unknown field, duplicate registration, ...)
    #[error("Session error: {0}")]
    Session(String),

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatsError {
    pub(crate) fn field(field: &str, message: impl Into<String>) -> Self {
        StatsError::FieldProtocol {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn stat(stat: &str, message: impl Into<String>) -> Self {
        StatsError::StatProtocol {
            stat: stat.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn config(stat: &str, message: impl Into<String>) -> Self {
        StatsError::StatConfig {
            stat: stat.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for insitu_stats operations
pub type Result<T> = std::result::Result<T, StatsError>;
