//! Sync error types.

use std::time::Duration;

use thiserror::Error;

use super::record::SyncCategory;
use super::seed::SeedError;
use crate::models::IdError;

/// Errors surfaced by the sync engine façade.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Device pairing timed out after {0:?}")]
    PairingTimeout(Duration),

    #[error("Sync group was left before the operation could run")]
    Cancelled,

    #[error("Not in a sync group")]
    NotInGroup,
}

/// Errors from the relay transport.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Relay connection is not open")]
    NotConnected,

    #[error("Relay connection closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors decoding or encoding relay frames and records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    #[error("Unknown record action: {0}")]
    UnknownAction(u8),

    #[error("Record carries '{found}' data, expected '{expected}'")]
    UnexpectedObjectData {
        expected: &'static str,
        found: String,
    },

    #[error("Category {0} is not synchronized")]
    UnsupportedCategory(SyncCategory),
}
