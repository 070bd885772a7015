//! Common types and errors for Depot
//!
//! This crate provides the entity snapshots, error type and listener
//! registry shared by the store, sync and realtime crates.

pub mod entities;
pub mod listeners;
pub mod telemetry;

pub use entities::{
    Client, Collection, Entity, MovementKind, Product, RecordedBy, Sale, SaleLine, StockMovement,
};
pub use listeners::{ListenerRegistry, SubscriptionId, Topic, ANY_TOPIC};

use thiserror::Error;

/// Core error types for Depot operations
#[derive(Error, Debug)]
pub enum DepotError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Entity not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    #[error("Remote rejected mutation: {0}")]
    RemoteError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DepotError {
    /// Whether a later attempt of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DepotError::NetworkError(_) | DepotError::RemoteError(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DepotError>;

/// Exit code constants
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 101;
