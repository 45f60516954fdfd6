//! Error types for storehook operations
//!
//! Codec failures are represented by [`RecordError`]; everything a plugin
//! entry point or the host harness can report is a [`PluginError`] or a
//! [`StoreError`]. None of these conditions terminate the host: every
//! contract violation is surfaced to the immediate caller.

use std::path::PathBuf;

use thiserror::Error;

/// Command record codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Buffer failed structural validation; the decoder refused to interpret it
    #[error("malformed command record: {reason}")]
    MalformedRecord {
        /// What check failed
        reason: String,
    },

    /// Display label does not fit in the fixed label region
    #[error("record label too long: {len} bytes exceeds capacity of {capacity} bytes")]
    LabelTooLong {
        /// Label length in bytes
        len: usize,
        /// Fixed capacity of the header label region
        capacity: usize,
    },

    /// Encoded record would not be addressable with 32-bit offsets
    #[error("record too large: {total} bytes exceeds limit of {limit} bytes")]
    RecordTooLarge {
        /// Header plus payload size
        total: u64,
        /// Largest encodable record
        limit: u64,
    },
}

impl RecordError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RecordError::MalformedRecord { reason: reason.into() }
    }
}

/// Errors reported by plugin entry points and the loader
#[derive(Debug, Error)]
pub enum PluginError {
    /// `initialize` returned false; the plugin is inert for the rest of its load
    #[error("plugin initialization failed")]
    InitializationFailure,

    /// An entry point was called before `initialize`
    #[error("plugin not initialized")]
    NotInitialized,

    /// `initialize` was called on a plugin that already went through it
    #[error("plugin already initialized")]
    AlreadyInitialized,

    /// `update` was called with an empty key or value
    #[error("{entry} rejected input: {reason}")]
    RejectedInput {
        /// Entry point that rejected the call
        entry: &'static str,
        /// Which input was unacceptable
        reason: &'static str,
    },

    /// Command record handed to `trans` failed to decode
    #[error(transparent)]
    MalformedRecord(#[from] RecordError),

    /// Sink could not be opened or appended to
    #[error("sink write failed in {}: {message} ({kind})", path_label(.path))]
    SinkWriteFailure {
        /// Sink path, `None` for the default output channel
        path: Option<PathBuf>,
        /// Underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Control options were absent or out of bounds; state left unchanged
    #[error("invalid control request: {reason}")]
    InvalidControlRequest {
        /// Why the request was refused
        reason: String,
    },

    /// `trans` reached a plugin whose capture is disabled
    #[error("transaction capture is disabled")]
    CaptureDisabled,

    /// The loaded artifact does not provide this entry point
    #[error("entry point {entry} not offered by plugin")]
    NotOffered {
        /// Entry point name
        entry: &'static str,
    },

    /// No plugin is registered under this path
    #[error("no plugin registered at {}", .path.display())]
    NotFound {
        /// Requested plugin path
        path: PathBuf,
    },

    /// Shared library could not be loaded
    #[error("plugin load failed: {message}")]
    Load {
        /// Loader diagnostic
        message: String,
    },
}

fn path_label(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<stdout>".to_string(),
    }
}

impl PluginError {
    pub(crate) fn sink(path: Option<PathBuf>, err: &std::io::Error, what: &str) -> Self {
        PluginError::SinkWriteFailure {
            path,
            kind: err.kind(),
            message: format!("{}: {}", what, err),
        }
    }

    pub(crate) fn invalid_control(reason: impl Into<String>) -> Self {
        PluginError::InvalidControlRequest { reason: reason.into() }
    }
}

/// Errors from the in-memory harness store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Host configuration failed validation
    #[error("invalid host configuration: {0}")]
    InvalidConfig(String),

    /// Keys must be non-empty
    #[error("empty key")]
    EmptyKey,

    /// `replace`/`append`/`remove` on a missing key
    #[error("key not found")]
    KeyNotFound,

    /// `add` on a key that already exists
    #[error("key already exists")]
    KeyExists,

    /// Entry size exceeds the configured maximum
    #[error("entry {component} too large: {entry_size} bytes exceeds limit of {max_size} bytes")]
    OversizedEntry {
        /// Size of the oversized component
        entry_size: u64,
        /// Maximum allowed size
        max_size: u64,
        /// Whether it's the key or value that's oversized
        component: &'static str,
    },

    /// Command record for the mutation could not be built
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Result type alias for codec operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Result type alias for plugin entry points
pub type PluginResult<T> = Result<T, PluginError>;

/// Result type alias for harness store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecordError::malformed("buffer too short");
        assert_eq!(format!("{}", err), "malformed command record: buffer too short");

        let err = PluginError::SinkWriteFailure {
            path: Some(PathBuf::from("/tmp/trans.log")),
            kind: std::io::ErrorKind::PermissionDenied,
            message: "open failed".into(),
        };
        let display = format!("{}", err);
        assert!(display.contains("/tmp/trans.log"));
        assert!(display.contains("open failed"));
    }

    #[test]
    fn test_default_sink_label() {
        let io_err = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        let err = PluginError::sink(None, &io_err, "write");
        assert!(format!("{}", err).contains("<stdout>"));
    }

    #[test]
    fn test_record_error_conversion() {
        let err: PluginError = RecordError::malformed("bad magic").into();
        assert!(matches!(err, PluginError::MalformedRecord(RecordError::MalformedRecord { .. })));
    }
}
