//! STOWAGE - Error Types
//! Two layers: `StorageError` for the engine, `StoreError` for callers of a `Store`.

use serde::Serialize;
use thiserror::Error;

/// Result type for engine-level operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by a storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O errors from file operations (WAL, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (CRC mismatch).
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// WAL recovery failure.
    #[error("WAL recovery failed: {0}")]
    RecoveryFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine is not open.
    #[error("Engine is closed")]
    Closed,

    /// The engine's data has been destroyed.
    #[error("Engine has been destroyed")]
    Destroyed,
}

impl StorageError {
    /// Numeric code surfaced to callers.
    pub fn code(&self) -> u16 {
        match self {
            StorageError::Io(_)
            | StorageError::Corruption(_)
            | StorageError::RecoveryFailed(_) => 500,
            StorageError::Serialization(_) | StorageError::Config(_) => 400,
            StorageError::Closed => 503,
            StorageError::Destroyed => 410,
        }
    }
}

/// Structured `{code, message}` form of a `StoreError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

/// Failures returned by `Store` operations.
///
/// A missing key is not an error: `Store::get` succeeds with an empty value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Missing or invalid caller input.
    #[error("validation error ({code}): {message}")]
    Validation { code: u16, message: String },

    #[error("read error ({code}): {message}")]
    Read { code: u16, message: String },

    #[error("write error ({code}): {message}")]
    Write { code: u16, message: String },

    #[error("delete error ({code}): {message}")]
    Delete { code: u16, message: String },

    #[error("scan error ({code}): {message}")]
    Scan { code: u16, message: String },

    #[error("import error ({code}): {message}")]
    Import { code: u16, message: String },

    /// Open, close or destroy failure.
    #[error("engine error ({code}): {message}")]
    Engine { code: u16, message: String },
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            code: 400,
            message: message.into(),
        }
    }

    pub(crate) fn read(err: StorageError) -> Self {
        StoreError::Read {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(err: StorageError) -> Self {
        StoreError::Write {
            code: err.code(),
            message: format!("Failed to write data to key: {err}"),
        }
    }

    pub(crate) fn delete(err: StorageError) -> Self {
        StoreError::Delete {
            code: err.code(),
            message: format!("Failed to delete key: {err}"),
        }
    }

    pub(crate) fn scan(err: StorageError) -> Self {
        StoreError::Scan {
            code: err.code(),
            message: format!("Error listing keys: {err}"),
        }
    }

    pub(crate) fn import(err: StorageError) -> Self {
        StoreError::Import {
            code: err.code(),
            message: format!("Failed to import records: {err}"),
        }
    }

    pub(crate) fn engine(context: &str, err: StorageError) -> Self {
        StoreError::Engine {
            code: err.code(),
            message: format!("{context} - {err}"),
        }
    }

    /// Numeric code of the failure.
    pub fn code(&self) -> u16 {
        match self {
            StoreError::Validation { code, .. }
            | StoreError::Read { code, .. }
            | StoreError::Write { code, .. }
            | StoreError::Delete { code, .. }
            | StoreError::Scan { code, .. }
            | StoreError::Import { code, .. }
            | StoreError::Engine { code, .. } => *code,
        }
    }

    /// Human-readable message of the failure.
    pub fn message(&self) -> &str {
        match self {
            StoreError::Validation { message, .. }
            | StoreError::Read { message, .. }
            | StoreError::Write { message, .. }
            | StoreError::Delete { message, .. }
            | StoreError::Scan { message, .. }
            | StoreError::Import { message, .. }
            | StoreError::Engine { message, .. } => message,
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.message().to_string(),
        }
    }
}
