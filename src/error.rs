//! Error types for the slot planner
//!
//! Capacity problems are never errors: an over-full layer is reported as a
//! [`crate::constraints::ConstraintViolation`]. Only calling-contract
//! violations and outer-surface failures (files, JSON, config) end up here.

use thiserror::Error;

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Planner errors
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate color id: {0}")]
    DuplicateColor(String),

    #[error("Unknown color referenced by {context}: {color}")]
    ReferentialInconsistency { color: String, context: String },

    #[error("Invalid hex color: {0}")]
    InvalidHexColor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
