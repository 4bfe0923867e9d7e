//! Statistical performance analytics
//!
//! A stateless engine that turns a teacher's evaluation ratings into one
//! [`StatisticsReport`]. Each call owns its input; nothing persists between calls
//! and the engine performs no I/O or logging.
//!
//! # Analyses
//!
//! - **Descriptive statistics**: moments, quartiles, Tukey outliers, t-based mean interval
//! - **Trend**: OLS trend, moving averages, monthly seasonality, decomposition, change rates
//! - **Forecast**: linear, exponential smoothing and AR(1)-on-differences models, an averaged
//!   ensemble and a holdout backtest of each
//! - **Peer comparison**: Welch's t-test, Cohen's d, percentile rank against a supplied sample
//! - **Anomalies**: leave-one-out z-score and isolation-score detectors
//! - **Correlation**: Pearson matrix over the overall rating and its sub-scores
//!
//! Analyses whose minimum sample size is not met return [`SubResult::Insufficient`]
//! rather than an error; only an empty or malformed call fails.
//!
//! # Example
//!
//! ```no_run
//! use teacher_performance_analytics::analytics::{
//!     AnalysisOptions, AnalyticsEngine, PeerSample, RatingRecord,
//! };
//! use chrono::Utc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AnalyticsEngine::with_defaults();
//!     let records = vec![
//!         RatingRecord::new(4.5, Utc::now()),
//!         RatingRecord::new(4.2, Utc::now()),
//!     ];
//!     let peers = PeerSample::new("department", vec![3.9, 4.1, 4.4, 3.7]);
//!
//!     let report = engine.analyze(&records, &AnalysisOptions::default(), Some(&peers))?;
//!     println!("{}", report.headline());
//!
//!     Ok(())
//! }
//! ```

mod anomaly;
mod correlation;
mod engine;
mod error;
mod forecast;
mod models;
mod peer;
mod reports;
mod statistics;
mod trend;

pub use anomaly::{
    Anomaly, AnomalyDetector, AnomalyReport, AnomalySeverity, AnomalySummary, DetectorSettings,
    SeverityBreakdown, DEFAULT_ISOLATION_SCORE_THRESHOLD,
};
pub use correlation::{
    CorrelationAnalyzer, CorrelationDirection, CorrelationPair, CorrelationReport,
    CorrelationStrength, ExcludedVariable, RatingVariable,
};
pub use engine::{AnalyticsConfig, AnalyticsEngine};
pub use error::{AnalyticsError, AnalyticsResult, InsufficientData, SubResult};
pub use forecast::{
    EnsemblePrediction, ForecastEngine, ForecastModel, ForecastSettings, ModelAccuracy,
    ModelEvaluation, ModelForecast, ModelPrediction, Predictions, DEFAULT_BACKTEST_HOLDOUT,
};
pub use models::{
    AnalysisOptions, DetectionMethod, PeerSample, RatingRecord, SubScoreHandling, TimeFrame,
    TimeSeriesPoint, DEFAULT_COMPARISON_GROUP, DEFAULT_CONFIDENCE_LEVEL,
    DEFAULT_DETECTION_THRESHOLD, DEFAULT_FORECAST_PERIODS,
};
pub use peer::{
    EffectMagnitude, EffectSize, PeerComparator, PeerComparison, PeerComparisonResult,
    PerformanceCategory, WelchTest,
};
pub use reports::{AnalysisMetadata, DateRange, StatisticsReport, ALGORITHM_VERSION};
pub use statistics::{
    BasicStatistics, ConfidenceInterval, DistributionShape, OutlierKind, OutlierPoint,
    OutlierSummary, Quartiles, Reliability, StatisticsCore,
};
pub use trend::{
    ChangeRate, ChangeRateSummary, ChangeRates, Decomposition, DecompositionQuality, FitQuality,
    LinearTrend, MonthlyIndex, MovingAverage, Seasonality, SeasonalityLevel, TrendAnalysis,
    TrendDirection, TrendEngine, TrendStrength, TrendSummary, VolatilityLevel,
};
