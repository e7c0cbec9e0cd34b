//! Error types and result aliases for the nodetracer library.
//!
//! This module defines the core error type [`NodetracerError`] and the [`Result`] type alias
//! used throughout the library. Structural and configuration failures surface here as typed
//! errors. Errors raised by traced work are never wrapped in this type: they are recorded on
//! the node and handed back to the caller unchanged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodetracerError {
    #[error("Unknown edge source node id: {0}")]
    UnknownEdgeSource(String),

    #[error("Unknown edge target node id: {0}")]
    UnknownEdgeTarget(String),

    #[error("Node stored under key {key} has id {id}")]
    NodeIdMismatch { key: String, id: String },

    #[error("Node {0} has the largest possible sequence number; no further nodes can be allocated")]
    SequenceOverflow(String),

    #[error("No active trace in the current context")]
    NoActiveTrace,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, NodetracerError>;
