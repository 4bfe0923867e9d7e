//! Report types produced by the analytics engine

use crate::analytics::anomaly::AnomalyReport;
use crate::analytics::correlation::CorrelationReport;
use crate::analytics::error::SubResult;
use crate::analytics::forecast::Predictions;
use crate::analytics::models::{DetectionMethod, SubScoreHandling, TimeFrame};
use crate::analytics::peer::PeerComparison;
use crate::analytics::statistics::BasicStatistics;
use crate::analytics::trend::TrendAnalysis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version tag stamped on every report
pub const ALGORITHM_VERSION: &str = "2.0.0";

/// Observed span of the evaluation timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Run metadata attached to a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub report_id: Uuid,
    pub algorithm_version: String,
    pub generated_at: DateTime<Utc>,
    pub record_count: usize,
    pub date_range: DateRange,
    pub confidence_level: f64,
    pub time_frame: TimeFrame,
    pub comparison_group: String,
    pub detection_method: DetectionMethod,
    pub sub_score_handling: SubScoreHandling,
}

/// Complete statistical report for one teacher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub basic_statistics: BasicStatistics,
    pub trend_analysis: SubResult<TrendAnalysis>,
    pub peer_comparison: PeerComparison,
    pub predictions: SubResult<Predictions>,
    pub anomalies: AnomalyReport,
    pub correlations: SubResult<CorrelationReport>,
    pub metadata: AnalysisMetadata,
}

impl StatisticsReport {
    /// One-line digest for logs and CLI output
    pub fn headline(&self) -> String {
        let trend = match self.trend_analysis.ready() {
            Some(analysis) => analysis.summary.description.clone(),
            None => "Not enough ratings for trend analysis".to_string(),
        };
        format!(
            "{} ratings, mean {:.2}, {} anomalies. {}",
            self.metadata.record_count,
            self.basic_statistics.mean,
            self.anomalies.summary.anomaly_count,
            trend
        )
    }
}
