use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for NexusNote core operations
#[derive(Debug, Error)]
pub enum NexusError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // Storage errors
    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    // CRDT errors
    #[error("CRDT error: {0}")]
    Crdt(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with status {status}: {message}")]
    Http { status: u16, message: String },

    // Runtime errors
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Connection error for document '{document_id}': {message}")]
    Connection {
        document_id: String,
        message: String,
    },
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for NexusError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => NexusError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => NexusError::Network(err.to_string()),
        }
    }
}

/// Result type alias for NexusNote core operations
pub type Result<T> = std::result::Result<T, NexusError>;

/// A serializable representation of NexusError for IPC with the web shell
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&NexusError> for SerializableError {
    fn from(err: &NexusError) -> Self {
        let kind = match err {
            NexusError::Io(_) => "Io",
            NexusError::FileRead { .. } => "FileRead",
            #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
            NexusError::Database(_) => "Database",
            NexusError::Storage(_) => "Storage",
            NexusError::Crdt(_) => "Crdt",
            NexusError::Json(_) => "Json",
            NexusError::Base64(_) => "Base64",
            NexusError::ConfigParse(_) => "ConfigParse",
            NexusError::ConfigSerialize(_) => "ConfigSerialize",
            NexusError::Network(_) => "Network",
            NexusError::Http { .. } => "Http",
            NexusError::Connection { .. } => "Connection",
            NexusError::Runtime(_) => "Runtime",
        }
        .to_string();

        let path = match err {
            NexusError::FileRead { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<NexusError> for SerializableError {
    fn from(err: NexusError) -> Self {
        SerializableError::from(&err)
    }
}

impl NexusError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether this error came from talking to a remote peer or API.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            NexusError::Network(_) | NexusError::Http { .. } | NexusError::Connection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializable_kind_and_message() {
        let err = NexusError::Http {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let ser = err.to_serializable();
        assert_eq!(ser.kind, "Http");
        assert!(ser.message.contains("502"));
        assert!(ser.path.is_none());
    }

    #[test]
    fn test_is_network() {
        assert!(NexusError::Network("reset".into()).is_network());
        assert!(!NexusError::Crdt("bad update".into()).is_network());
    }
}
