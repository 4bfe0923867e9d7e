//! Two-sample comparison of a teacher's ratings against a peer group

use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::analytics::models::PeerSample;
use crate::analytics::statistics::{mean, sample_variance, student_t_two_tailed_p};
use serde::{Deserialize, Serialize};

/// Significance level for the two-tailed test
pub const SIGNIFICANCE_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceCategory {
    Exceptional,
    AboveAverage,
    Average,
    BelowAverage,
    NeedsImprovement,
}

impl PerformanceCategory {
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile >= 90.0 {
            PerformanceCategory::Exceptional
        } else if percentile >= 75.0 {
            PerformanceCategory::AboveAverage
        } else if percentile >= 25.0 {
            PerformanceCategory::Average
        } else if percentile >= 10.0 {
            PerformanceCategory::BelowAverage
        } else {
            PerformanceCategory::NeedsImprovement
        }
    }
}

/// Welch's unequal-variance t-test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelchTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub significant: bool,
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMagnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSize {
    /// Mean difference over the equal-weight pooled standard deviation
    pub cohens_d: f64,
    pub magnitude: EffectMagnitude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerComparisonResult {
    pub comparison_group: String,
    pub teacher_mean: f64,
    pub teacher_count: usize,
    pub peer_mean: f64,
    pub peer_std_dev: f64,
    pub peer_count: usize,
    pub mean_difference: f64,
    pub t_test: WelchTest,
    pub effect_size: EffectSize,
    /// Teacher mean in peer standard deviations
    pub z_score: f64,
    /// Share of peer ratings strictly below the teacher mean, in percent
    pub percentile_rank: f64,
    pub category: PerformanceCategory,
}

/// Peer comparison as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeerComparison {
    Compared(PeerComparisonResult),
    Unavailable { reason: String },
}

impl PeerComparison {
    pub fn result(&self) -> Option<&PeerComparisonResult> {
        match self {
            PeerComparison::Compared(result) => Some(result),
            PeerComparison::Unavailable { .. } => None,
        }
    }
}

/// Peer comparison provider
pub struct PeerComparator;

impl PeerComparator {
    pub fn compare(teacher: &[f64], peers: &PeerSample) -> AnalyticsResult<PeerComparisonResult> {
        if teacher.is_empty() {
            return Err(AnalyticsError::InvalidInput(
                "Teacher sample is empty".to_string(),
            ));
        }
        if peers.ratings.is_empty() {
            return Err(AnalyticsError::InvalidInput(format!(
                "Peer sample for '{}' is empty",
                peers.group
            )));
        }

        let teacher_mean = mean(teacher);
        let peer_mean = mean(&peers.ratings);
        let teacher_var = sample_variance(teacher);
        let peer_var = sample_variance(&peers.ratings);
        let peer_std_dev = peer_var.sqrt();
        let mean_difference = teacher_mean - peer_mean;

        let t_test = Self::welch_t_test(
            teacher_mean,
            teacher_var,
            teacher.len(),
            peer_mean,
            peer_var,
            peers.ratings.len(),
        );

        let pooled_sd = ((teacher_var + peer_var) / 2.0).sqrt();
        let cohens_d = if pooled_sd > f64::EPSILON {
            mean_difference / pooled_sd
        } else {
            0.0
        };

        let z_score = if peer_std_dev > f64::EPSILON {
            mean_difference / peer_std_dev
        } else {
            0.0
        };

        let below = peers.ratings.iter().filter(|&&r| r < teacher_mean).count();
        let percentile_rank = below as f64 / peers.ratings.len() as f64 * 100.0;

        Ok(PeerComparisonResult {
            comparison_group: peers.group.clone(),
            teacher_mean,
            teacher_count: teacher.len(),
            peer_mean,
            peer_std_dev,
            peer_count: peers.ratings.len(),
            mean_difference,
            t_test,
            effect_size: EffectSize {
                cohens_d,
                magnitude: effect_magnitude(cohens_d),
            },
            z_score,
            percentile_rank,
            category: PerformanceCategory::from_percentile(percentile_rank),
        })
    }

    /// t = (m1 - m2) / √(v1/n1 + v2/n2) with Welch–Satterthwaite degrees of freedom.
    pub fn welch_t_test(
        mean1: f64,
        var1: f64,
        n1: usize,
        mean2: f64,
        var2: f64,
        n2: usize,
    ) -> WelchTest {
        let a = var1 / n1 as f64;
        let b = var2 / n2 as f64;
        let standard_error = (a + b).sqrt();

        let fallback_df = (n1 + n2).saturating_sub(2).max(1) as f64;
        let denominator = satterthwaite_term(a, n1) + satterthwaite_term(b, n2);
        let degrees_of_freedom = if denominator > 0.0 {
            (a + b).powi(2) / denominator
        } else {
            fallback_df
        };

        if standard_error <= f64::EPSILON {
            return WelchTest {
                t_statistic: 0.0,
                degrees_of_freedom,
                p_value: 1.0,
                significant: false,
                alpha: SIGNIFICANCE_ALPHA,
            };
        }

        let t_statistic = (mean1 - mean2) / standard_error;
        let p_value = student_t_two_tailed_p(t_statistic, degrees_of_freedom);

        WelchTest {
            t_statistic,
            degrees_of_freedom,
            p_value,
            significant: p_value < SIGNIFICANCE_ALPHA,
            alpha: SIGNIFICANCE_ALPHA,
        }
    }
}

fn satterthwaite_term(scaled_variance: f64, n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    scaled_variance.powi(2) / (n - 1) as f64
}

fn effect_magnitude(d: f64) -> EffectMagnitude {
    let d = d.abs();
    if d < 0.2 {
        EffectMagnitude::Negligible
    } else if d < 0.5 {
        EffectMagnitude::Small
    } else if d < 0.8 {
        EffectMagnitude::Medium
    } else {
        EffectMagnitude::Large
    }
}
