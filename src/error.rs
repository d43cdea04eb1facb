//! Error types for Rustible event capture.
//!
//! The capture path adds no failure modes of its own: it surfaces whatever
//! the serializer or the output stream raises. The remaining variants cover
//! configuration loading, artifact persistence and the consumer-side decoder.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for event capture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Rustible event capture.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// IO error, usually a closed or broken output stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record on the event stream could not be decoded.
    #[error("Malformed event frame at byte {offset}: {message}")]
    Framing {
        /// Byte offset of the frame within the consumed stream
        offset: usize,
        /// Error message
        message: String,
    },

    /// Base64 payload could not be decoded.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON encoding or parsing error.
    #[error("JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Artifact Errors
    // ========================================================================
    /// Writing a run artifact failed.
    #[error("Failed to write artifact '{path}': {message}")]
    Artifact {
        /// Artifact path
        path: PathBuf,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a new framing error.
    pub fn framing(offset: usize, message: impl Into<String>) -> Self {
        Self::Framing {
            offset,
            message: message.into(),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new artifact error.
    pub fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if the consumer went away (broken pipe).
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Framing { .. } | Error::Base64(_) | Error::JsonParse(_) => 2,
            Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::YamlParse(_)
            | Error::TomlParse(_) => 3,
            Error::Io(_) => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_broken_pipe_detection() {
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(err.is_broken_pipe());

        let err: Error = io::Error::new(io::ErrorKind::Other, "other").into();
        assert!(!err.is_broken_pipe());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::framing(10, "bad").exit_code(), 2);
        assert_eq!(Error::Config("x".into()).exit_code(), 3);
        assert_eq!(Error::artifact("/tmp/custom", "denied").exit_code(), 1);
        assert_eq!(Error::Io(io::ErrorKind::Other.into()).exit_code(), 4);
    }
}
