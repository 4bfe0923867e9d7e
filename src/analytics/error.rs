//! Error types for analytics operations

use serde::{Deserialize, Serialize};

/// Result type for analytics operations
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

/// Errors that can occur in analytics operations.
///
/// Only malformed call contracts surface here. Samples that are too small for a
/// given analysis are reported in-band through [`SubResult::Insufficient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyticsError {
    /// Empty or malformed input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Calculation error
    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Marker returned in place of a sub-analysis whose minimum sample size is not met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientData {
    /// Always `true`; lets JSON consumers test for the marker by field.
    pub insufficient_data: bool,
    pub minimum_required: usize,
    pub available: usize,
    pub message: String,
}

impl InsufficientData {
    pub fn new(minimum_required: usize, available: usize, analysis: &str) -> Self {
        Self {
            insufficient_data: true,
            minimum_required,
            available,
            message: format!(
                "{} requires at least {} data points, {} available",
                analysis, minimum_required, available
            ),
        }
    }
}

/// Outcome of a sub-analysis that degrades gracefully on small samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubResult<T> {
    Ready(T),
    Insufficient(InsufficientData),
}

impl<T> SubResult<T> {
    /// Check the sample size and either run `compute` or return the marker.
    pub fn require(
        minimum_required: usize,
        available: usize,
        analysis: &str,
        compute: impl FnOnce() -> T,
    ) -> Self {
        if available < minimum_required {
            SubResult::Insufficient(InsufficientData::new(minimum_required, available, analysis))
        } else {
            SubResult::Ready(compute())
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            SubResult::Ready(value) => Some(value),
            SubResult::Insufficient(_) => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, SubResult::Insufficient(_))
    }
}
