use crate::analytics::AnalyticsError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Authorization errors
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Peer data source errors
    #[error("Peer data error: {0}")]
    PeerData(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Analytics engine errors
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Authorization(_) => "AUTHORIZATION_ERROR",
            AppError::PeerData(_) => "PEER_DATA_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Analytics(AnalyticsError::InvalidInput(_)) => "INVALID_INPUT",
            AppError::Analytics(AnalyticsError::InvalidConfiguration(_)) => "INVALID_CONFIGURATION",
            AppError::Analytics(AnalyticsError::CalculationError(_)) => "CALCULATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller sent something the service cannot accept
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::Authorization(_)
                | AppError::Analytics(AnalyticsError::InvalidInput(_))
                | AppError::Analytics(AnalyticsError::InvalidConfiguration(_))
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from reqwest::Error
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::PeerData(err.to_string())
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
