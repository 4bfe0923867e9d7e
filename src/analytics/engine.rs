//! Report composer: validates input, fans out to every engine and merges the results

use crate::analytics::anomaly::{
    AnomalyDetector, DetectorSettings, DEFAULT_ISOLATION_SCORE_THRESHOLD,
};
use crate::analytics::correlation::CorrelationAnalyzer;
use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::analytics::forecast::{ForecastEngine, ForecastSettings, DEFAULT_BACKTEST_HOLDOUT};
use crate::analytics::models::{
    AnalysisOptions, PeerSample, RatingRecord, SubScoreHandling, TimeSeriesPoint,
};
use crate::analytics::peer::{PeerComparator, PeerComparison};
use crate::analytics::reports::{AnalysisMetadata, DateRange, StatisticsReport, ALGORITHM_VERSION};
use crate::analytics::statistics::StatisticsCore;
use crate::analytics::trend::TrendEngine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Configuration for the analytics engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Score cutoff for the isolation heuristic
    pub isolation_score_threshold: f64,

    /// How absent sub-scores enter the correlation matrix
    pub sub_score_handling: SubScoreHandling,

    /// Trailing points held out when scoring forecast models
    pub backtest_holdout: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            isolation_score_threshold: DEFAULT_ISOLATION_SCORE_THRESHOLD,
            sub_score_handling: SubScoreHandling::Exclude,
            backtest_holdout: DEFAULT_BACKTEST_HOLDOUT,
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> AnalyticsResult<()> {
        if !(0.0..=1.0).contains(&self.isolation_score_threshold) {
            return Err(AnalyticsError::InvalidConfiguration(format!(
                "isolation_score_threshold must be within [0, 1], got {}",
                self.isolation_score_threshold
            )));
        }
        if self.backtest_holdout == 0 {
            return Err(AnalyticsError::InvalidConfiguration(
                "backtest_holdout must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stateless analytics engine. Holds configuration only; every call owns its data.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    /// Create a new analytics engine
    pub fn new(config: AnalyticsConfig) -> AnalyticsResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Build the full report for one teacher.
    ///
    /// `peer` is the comparator sample for `options.compare_with`; without one the
    /// report carries an unavailable peer comparison instead of failing.
    pub fn analyze(
        &self,
        records: &[RatingRecord],
        options: &AnalysisOptions,
        peer: Option<&PeerSample>,
    ) -> AnalyticsResult<StatisticsReport> {
        if records.is_empty() {
            return Err(AnalyticsError::InvalidInput(
                "No evaluation data provided".to_string(),
            ));
        }
        if let Some((index, field)) = records
            .iter()
            .enumerate()
            .find_map(|(i, r)| r.non_finite_field().map(|field| (i, field)))
        {
            return Err(AnalyticsError::InvalidInput(format!(
                "{} of record {} is not a finite number",
                field, index
            )));
        }
        options
            .validate()
            .map_err(|e| AnalyticsError::InvalidConfiguration(e.to_string()))?;

        let ratings: Vec<f64> = records.iter().map(|r| r.overall_rating).collect();
        let series = TimeSeriesPoint::series_from(records);

        let basic_statistics = StatisticsCore::describe(&ratings, options.confidence_level)?;

        let anomalies = AnomalyDetector::detect(
            &ratings,
            &DetectorSettings {
                method: options.detection_method,
                z_threshold: options.detection_threshold,
                isolation_score_threshold: self.config.isolation_score_threshold,
            },
        );

        let correlations = CorrelationAnalyzer::analyze(records, self.config.sub_score_handling);

        let trend_analysis = TrendEngine::analyze(&series, options.include_seasonality);
        let predictions = ForecastEngine::forecast(
            &series,
            trend_analysis.ready().map(|t| &t.linear_trend),
            &ForecastSettings {
                periods: options.forecast_periods,
                confidence_level: options.confidence_level,
                backtest_holdout: self.config.backtest_holdout,
            },
        );

        let peer_comparison = Self::compare_with_peers(&ratings, options, peer);

        let metadata = AnalysisMetadata {
            report_id: Uuid::new_v4(),
            algorithm_version: ALGORITHM_VERSION.to_string(),
            generated_at: Utc::now(),
            record_count: records.len(),
            date_range: DateRange {
                start: series[0].date,
                end: series[series.len() - 1].date,
            },
            confidence_level: options.confidence_level,
            time_frame: options.time_frame,
            comparison_group: options.compare_with.clone(),
            detection_method: options.detection_method,
            sub_score_handling: self.config.sub_score_handling,
        };

        Ok(StatisticsReport {
            basic_statistics,
            trend_analysis,
            peer_comparison,
            predictions,
            anomalies,
            correlations,
            metadata,
        })
    }

    fn compare_with_peers(
        ratings: &[f64],
        options: &AnalysisOptions,
        peer: Option<&PeerSample>,
    ) -> PeerComparison {
        let Some(peer) = peer else {
            return PeerComparison::Unavailable {
                reason: format!("No peer sample supplied for group '{}'", options.compare_with),
            };
        };

        match PeerComparator::compare(ratings, peer) {
            Ok(result) => PeerComparison::Compared(result),
            Err(e) => PeerComparison::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}
