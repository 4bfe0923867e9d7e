//! Teacher performance analytics
//!
//! Statistical analysis of teacher evaluation ratings for a performance
//! dashboard: descriptive statistics, trend and seasonality, forecasting,
//! peer comparison, anomaly detection and sub-score correlation.
//!
//! [`analytics`] holds the stateless engine. [`orchestration`] wraps it with
//! access control, peer sample lookup, caching, audit and batch fan-out.

pub mod analytics;
pub mod config;
pub mod error;
pub mod orchestration;

pub use error::{AppError, Result};
