//! Outlier flagging over a rating sample
//!
//! Every detector measures a point against the mean and standard deviation of
//! the *other* points (leave-one-out). Against the whole sample a single extreme
//! value inflates the deviation it is measured with, and in small samples it can
//! never exceed the cutoff: with n=5 the largest attainable |z| is about 1.79.

use crate::analytics::models::{DetectionMethod, DEFAULT_DETECTION_THRESHOLD};
use serde::{Deserialize, Serialize};

/// Default score cutoff for the isolation heuristic
pub const DEFAULT_ISOLATION_SCORE_THRESHOLD: f64 = 0.6;

/// |z| that maps to a z-score anomaly score of 1.0
const Z_SCORE_SCALE: f64 = 4.0;

/// Distance in standard deviations where the isolation score crosses 0.5
const ISOLATION_MIDPOINT: f64 = 2.0;

const RELATIVE_SPREAD_EPSILON: f64 = 1e-12;

/// Tolerance for telling a point apart from identical neighbours
const VALUE_EPSILON: f64 = 1e-9;

/// z reported for a point that differs from a set of otherwise identical ratings
const ISOLATED_Z_SCORE: f64 = 1.0e6;

const NO_ANOMALY_RECOMMENDATION: &str =
    "No anomalies detected. Rating pattern is consistent with the teacher's typical performance.";
const ANOMALY_RECOMMENDATION: &str = "Review flagged evaluations for data entry errors or \
    exceptional circumstances before drawing conclusions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            AnomalySeverity::High
        } else if score > 0.5 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }
}

/// Detector parameters for one analysis call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub method: DetectionMethod,
    /// |z| cutoff used by the statistical and z_score methods
    pub z_threshold: f64,
    /// Score cutoff used by the isolation heuristic
    pub isolation_score_threshold: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Statistical,
            z_threshold: DEFAULT_DETECTION_THRESHOLD,
            isolation_score_threshold: DEFAULT_ISOLATION_SCORE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    pub value: f64,
    /// Deviation from the other ratings, in their standard deviations
    pub z_score: f64,
    pub score: f64,
    pub severity: AnomalySeverity,
    pub detected_by: Vec<DetectionMethod>,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_points: usize,
    pub anomaly_count: usize,
    /// Flagged share of the sample, in percent
    pub anomaly_rate: f64,
    pub severity_breakdown: SeverityBreakdown,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub method: DetectionMethod,
    pub threshold: f64,
    pub anomalies: Vec<Anomaly>,
    pub summary: AnomalySummary,
}

/// Deviation of one point from the rest of the sample
#[derive(Debug, Clone, Copy)]
struct PointDeviation {
    z: f64,
    rest_mean: f64,
    /// The other points have no spread and this one differs from them
    isolated: bool,
}

struct Candidate {
    method: DetectionMethod,
    score: f64,
}

/// Anomaly detection provider
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn detect(data: &[f64], settings: &DetectorSettings) -> AnomalyReport {
        let deviations = leave_one_out_deviations(data);

        let mut anomalies = Vec::new();
        for (index, (&value, deviation)) in data.iter().zip(&deviations).enumerate() {
            let candidates = Self::candidates(deviation.z, settings);
            if candidates.is_empty() {
                continue;
            }

            let score = candidates.iter().map(|c| c.score).sum::<f64>() / candidates.len() as f64;
            anomalies.push(Anomaly {
                index,
                value,
                z_score: deviation.z,
                score,
                severity: AnomalySeverity::from_score(score),
                detected_by: candidates.iter().map(|c| c.method).collect(),
                explanation: explain(value, deviation),
            });
        }

        let summary = summarize(data.len(), &anomalies);
        let threshold = match settings.method {
            DetectionMethod::IsolationForest => settings.isolation_score_threshold,
            _ => settings.z_threshold,
        };

        AnomalyReport {
            method: settings.method,
            threshold,
            anomalies,
            summary,
        }
    }

    fn candidates(z: f64, settings: &DetectorSettings) -> Vec<Candidate> {
        let z_candidate = |method| {
            (z.abs() > settings.z_threshold).then(|| Candidate {
                method,
                score: z_score_anomaly_score(z),
            })
        };
        let isolation_candidate = || {
            let score = isolation_score(z);
            (score > settings.isolation_score_threshold).then_some(Candidate {
                method: DetectionMethod::IsolationForest,
                score,
            })
        };

        match settings.method {
            DetectionMethod::Statistical => {
                z_candidate(DetectionMethod::Statistical).into_iter().collect()
            }
            DetectionMethod::ZScore => z_candidate(DetectionMethod::ZScore).into_iter().collect(),
            DetectionMethod::IsolationForest => isolation_candidate().into_iter().collect(),
            DetectionMethod::Combined => z_candidate(DetectionMethod::Statistical)
                .into_iter()
                .chain(isolation_candidate())
                .collect(),
        }
    }
}

/// min(|z| / 4, 1)
pub fn z_score_anomaly_score(z: f64) -> f64 {
    (z.abs() / Z_SCORE_SCALE).min(1.0)
}

/// Sigmoid of the distance beyond two standard deviations. A heuristic, not an isolation forest.
pub fn isolation_score(z: f64) -> f64 {
    1.0 / (1.0 + (-(z.abs() - ISOLATION_MIDPOINT)).exp())
}

/// z of each point against the mean and sample standard deviation of the others.
///
/// Uses SS₋ᵢ = SS − n/(n−1)·(xᵢ − x̄)², so the whole pass is O(n).
fn leave_one_out_deviations(data: &[f64]) -> Vec<PointDeviation> {
    let n = data.len();
    if n < 3 {
        return data
            .iter()
            .map(|&value| PointDeviation {
                z: 0.0,
                rest_mean: value,
                isolated: false,
            })
            .collect();
    }

    let nf = n as f64;
    let sum: f64 = data.iter().sum();
    let mean = sum / nf;
    let ss: f64 = data.iter().map(|x| (x - mean).powi(2)).sum();

    data.iter()
        .map(|&x| {
            let rest_mean = (sum - x) / (nf - 1.0);
            let rest_ss = ss - nf / (nf - 1.0) * (x - mean).powi(2);
            // Cancellation leaves rounding noise when the other points are all equal
            if rest_ss > ss * RELATIVE_SPREAD_EPSILON {
                return PointDeviation {
                    z: (x - rest_mean) / (rest_ss / (nf - 2.0)).sqrt(),
                    rest_mean,
                    isolated: false,
                };
            }

            let difference = x - rest_mean;
            let isolated = difference.abs() > VALUE_EPSILON * rest_mean.abs().max(1.0);
            PointDeviation {
                z: if isolated {
                    ISOLATED_Z_SCORE.copysign(difference)
                } else {
                    0.0
                },
                rest_mean,
                isolated,
            }
        })
        .collect()
}

fn explain(value: f64, deviation: &PointDeviation) -> String {
    let direction = if deviation.z < 0.0 { "below" } else { "above" };
    if deviation.isolated {
        return format!(
            "Rating {:.2} is {} every other rating, which are all {:.2}",
            value, direction, deviation.rest_mean
        );
    }
    format!(
        "Rating {:.2} is {:.2} standard deviations {} the mean of the other ratings ({:.2})",
        value,
        deviation.z.abs(),
        direction,
        deviation.rest_mean
    )
}

fn summarize(total_points: usize, anomalies: &[Anomaly]) -> AnomalySummary {
    let mut severity_breakdown = SeverityBreakdown::default();
    for anomaly in anomalies {
        match anomaly.severity {
            AnomalySeverity::High => severity_breakdown.high += 1,
            AnomalySeverity::Medium => severity_breakdown.medium += 1,
            AnomalySeverity::Low => severity_breakdown.low += 1,
        }
    }

    let anomaly_rate = if total_points > 0 {
        anomalies.len() as f64 / total_points as f64 * 100.0
    } else {
        0.0
    };

    let recommendation = if anomalies.is_empty() {
        NO_ANOMALY_RECOMMENDATION
    } else {
        ANOMALY_RECOMMENDATION
    };

    AnomalySummary {
        total_points,
        anomaly_count: anomalies.len(),
        anomaly_rate,
        severity_breakdown,
        recommendation: recommendation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(method: DetectionMethod) -> DetectorSettings {
        DetectorSettings {
            method,
            ..Default::default()
        }
    }

    #[test]
    fn test_extreme_value_in_tight_cluster() {
        let data = vec![4.5, 4.6, 4.4, 4.7, 1.0];
        let report = AnomalyDetector::detect(&data, &settings(DetectionMethod::Statistical));

        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.index, 4);
        assert_eq!(anomaly.severity, AnomalySeverity::High);
        assert!(anomaly.z_score < -2.5);
        assert!(anomaly.explanation.contains("below"));
        assert_eq!(report.summary.severity_breakdown.high, 1);
        assert!((report.summary.anomaly_rate - 20.0).abs() < 1e-9);
        assert_eq!(report.summary.recommendation, ANOMALY_RECOMMENDATION);
    }

    #[test]
    fn test_z_score_method_matches_statistical() {
        let data = vec![4.5, 4.6, 4.4, 4.7, 1.0];
        let report = AnomalyDetector::detect(&data, &settings(DetectionMethod::ZScore));
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].detected_by, vec![DetectionMethod::ZScore]);
    }

    #[test]
    fn test_consistent_ratings_have_no_anomalies() {
        let data = vec![4.5, 4.6, 4.4, 4.7, 4.5];
        let report = AnomalyDetector::detect(&data, &settings(DetectionMethod::Statistical));
        assert!(report.anomalies.is_empty());
        assert_eq!(report.summary.anomaly_rate, 0.0);
        assert_eq!(report.summary.recommendation, NO_ANOMALY_RECOMMENDATION);
    }

    #[test]
    fn test_constant_sample_never_flags() {
        let data = vec![3.0; 8];
        for method in [
            DetectionMethod::Statistical,
            DetectionMethod::IsolationForest,
            DetectionMethod::Combined,
        ] {
            let report = AnomalyDetector::detect(&data, &settings(method));
            assert!(report.anomalies.is_empty());
        }
    }

    #[test]
    fn test_point_against_identical_others_is_flagged() {
        for method in [
            DetectionMethod::Statistical,
            DetectionMethod::ZScore,
            DetectionMethod::IsolationForest,
            DetectionMethod::Combined,
        ] {
            let report = AnomalyDetector::detect(&[4.0, 4.0, 4.0, 4.0, 1.0], &settings(method));

            assert_eq!(report.anomalies.len(), 1, "method {}", method);
            let anomaly = &report.anomalies[0];
            assert_eq!(anomaly.index, 4);
            assert!(anomaly.z_score < 0.0 && anomaly.z_score.is_finite());
            assert_eq!(anomaly.severity, AnomalySeverity::High);
            assert!(anomaly.explanation.contains("below every other rating"));
        }
    }


    #[test]
    fn test_isolation_heuristic() {
        let data = vec![4.5, 4.6, 4.4, 4.7, 1.0];
        let report = AnomalyDetector::detect(&data, &settings(DetectionMethod::IsolationForest));
        assert_eq!(report.threshold, DEFAULT_ISOLATION_SCORE_THRESHOLD);
        assert_eq!(report.anomalies.len(), 1);
        assert!(report.anomalies[0].score > 0.99);
        assert_eq!(report.anomalies[0].detected_by, vec![DetectionMethod::IsolationForest]);

        assert!((isolation_score(2.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_combined_averages_scores_when_both_flag() {
        let data = vec![4.5, 4.6, 4.4, 4.7, 1.0];
        let report = AnomalyDetector::detect(&data, &settings(DetectionMethod::Combined));
        let anomaly = &report.anomalies[0];
        assert_eq!(
            anomaly.detected_by,
            vec![DetectionMethod::Statistical, DetectionMethod::IsolationForest]
        );
        let expected =
            (z_score_anomaly_score(anomaly.z_score) + isolation_score(anomaly.z_score)) / 2.0;
        assert!((anomaly.score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_combined_keeps_single_method_hits() {
        // z is about -27.5, below this cutoff but far past the isolation one
        let settings = DetectorSettings {
            method: DetectionMethod::Combined,
            z_threshold: 30.0,
            isolation_score_threshold: 0.6,
        };
        let data = vec![4.5, 4.6, 4.4, 4.7, 1.0];
        let report = AnomalyDetector::detect(&data, &settings);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].detected_by, vec![DetectionMethod::IsolationForest]);
    }

    #[test]
    fn test_small_samples_are_never_flagged() {
        let report = AnomalyDetector::detect(&[1.0, 5.0], &settings(DetectionMethod::Combined));
        assert!(report.anomalies.is_empty());
        assert_eq!(report.summary.total_points, 2);
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(AnomalySeverity::from_score(0.9), AnomalySeverity::High);
        assert_eq!(AnomalySeverity::from_score(0.8), AnomalySeverity::Medium);
        assert_eq!(AnomalySeverity::from_score(0.6), AnomalySeverity::Medium);
        assert_eq!(AnomalySeverity::from_score(0.5), AnomalySeverity::Low);
    }
}
