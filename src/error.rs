//! Error types for Pagepulse
//!
//! Nothing on the interactive tracking path returns these. They surface only at
//! the edges: configuration loading, recorded-session replay, FFI and the CLI.

use thiserror::Error;

/// Errors that can occur outside the fire-and-forget tracking path
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Failed to parse recorded session: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid event {action}: {reason}")]
    InvalidEvent { action: String, reason: String },

    #[error("Invalid replay record: {0}")]
    InvalidRecord(String),

    #[error("Unknown content unit: {0}")]
    UnknownContentUnit(String),
}
