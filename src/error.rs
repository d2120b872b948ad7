//! Error types for MeruMap.

use thiserror::Error;

/// MeruMap error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeruError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, MeruError>;
