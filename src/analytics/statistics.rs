//! Descriptive statistics on a single rating sample

use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::erf::erf_inv;
use std::collections::BTreeMap;

/// Tukey fence multiplier for mild outliers
const MILD_FENCE: f64 = 1.5;

/// Tukey fence multiplier for extreme outliers
const EXTREME_FENCE: f64 = 3.0;

/// |skewness| and |excess kurtosis| below this read as "normal" shape
const SHAPE_TOLERANCE: f64 = 0.5;

/// Quartiles computed by linear interpolation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub iqr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierKind {
    Mild,
    Extreme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierPoint {
    /// Position in the input sample
    pub index: usize,
    pub value: f64,
    pub kind: OutlierKind,
}

/// Tukey-fence outlier scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSummary {
    pub lower_fence: f64,
    pub upper_fence: f64,
    pub extreme_lower_fence: f64,
    pub extreme_upper_fence: f64,
    pub points: Vec<OutlierPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Low,
    Moderate,
    High,
}

/// Student-t confidence interval for the mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
    pub margin_of_error: f64,
    pub degrees_of_freedom: usize,
    /// Single-observation sample: the interval collapses to the point value
    pub degenerate: bool,
    pub reliability: Reliability,
}

/// Textual reading of skewness and kurtosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionShape {
    pub symmetry: String,
    pub tails: String,
    pub description: String,
}

impl DistributionShape {
    pub fn interpret(skewness: f64, kurtosis: f64) -> Self {
        let symmetry = if skewness.abs() < SHAPE_TOLERANCE {
            "approximately symmetric"
        } else if skewness > 0.0 {
            "right-skewed"
        } else {
            "left-skewed"
        };

        let tails = if kurtosis.abs() < SHAPE_TOLERANCE {
            "normal tail behavior"
        } else if kurtosis > 0.0 {
            "heavy-tailed"
        } else {
            "light-tailed"
        };

        Self {
            symmetry: symmetry.to_string(),
            tails: tails.to_string(),
            description: format!("Distribution is {} with {}", symmetry, tails),
        }
    }
}

/// Descriptive statistics for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicStatistics {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    /// Most frequent value at 0.01 resolution; `None` when no value repeats
    pub mode: Option<f64>,
    /// Sample variance (divisor n-1), 0 for a single observation
    pub variance: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub skewness: f64,
    /// Excess kurtosis (normal = 0)
    pub kurtosis: f64,
    pub quartiles: Quartiles,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub outliers: OutlierSummary,
    pub confidence_interval: ConfidenceInterval,
    pub distribution: DistributionShape,
}

/// Descriptive statistics provider
pub struct StatisticsCore;

impl StatisticsCore {
    /// Describe a sample of ratings.
    pub fn describe(data: &[f64], confidence_level: f64) -> AnalyticsResult<BasicStatistics> {
        if data.is_empty() {
            return Err(AnalyticsError::InvalidInput(
                "Cannot describe an empty sample".to_string(),
            ));
        }

        let count = data.len();
        let sum: f64 = data.iter().sum();
        let mean = sum / count as f64;

        let sorted = sorted_copy(data);
        let median = percentile(&sorted, 50.0);
        let variance = sample_variance(data);
        let std_dev = variance.sqrt();
        let coefficient_of_variation = if mean.abs() > f64::EPSILON {
            std_dev / mean
        } else {
            0.0
        };

        let (skewness, kurtosis) = shape_moments(data, mean);
        let quartiles = Self::quartiles(&sorted);
        let outliers = Self::tukey_outliers(data, &quartiles);
        let confidence_interval =
            Self::mean_confidence_interval(mean, std_dev, count, confidence_level)?;

        let min = sorted[0];
        let max = sorted[count - 1];

        Ok(BasicStatistics {
            count,
            sum,
            mean,
            median,
            mode: calculate_mode(data),
            variance,
            std_dev,
            coefficient_of_variation,
            skewness,
            kurtosis,
            quartiles,
            min,
            max,
            range: max - min,
            outliers,
            confidence_interval,
            distribution: DistributionShape::interpret(skewness, kurtosis),
        })
    }

    /// Q1/Q2/Q3 of an already-sorted sample
    pub fn quartiles(sorted: &[f64]) -> Quartiles {
        let q1 = percentile(sorted, 25.0);
        let q2 = percentile(sorted, 50.0);
        let q3 = percentile(sorted, 75.0);
        Quartiles {
            q1,
            q2,
            q3,
            iqr: q3 - q1,
        }
    }

    /// Flag points outside the 1.5·IQR fences, classifying those past 3·IQR as extreme.
    pub fn tukey_outliers(data: &[f64], quartiles: &Quartiles) -> OutlierSummary {
        let lower_fence = quartiles.q1 - MILD_FENCE * quartiles.iqr;
        let upper_fence = quartiles.q3 + MILD_FENCE * quartiles.iqr;
        let extreme_lower_fence = quartiles.q1 - EXTREME_FENCE * quartiles.iqr;
        let extreme_upper_fence = quartiles.q3 + EXTREME_FENCE * quartiles.iqr;

        let points = data
            .iter()
            .enumerate()
            .filter(|(_, &value)| value < lower_fence || value > upper_fence)
            .map(|(index, &value)| {
                let kind = if value < extreme_lower_fence || value > extreme_upper_fence {
                    OutlierKind::Extreme
                } else {
                    OutlierKind::Mild
                };
                OutlierPoint { index, value, kind }
            })
            .collect();

        OutlierSummary {
            lower_fence,
            upper_fence,
            extreme_lower_fence,
            extreme_upper_fence,
            points,
        }
    }

    /// Mean ± t·(s/√n) at n-1 degrees of freedom.
    pub fn mean_confidence_interval(
        mean: f64,
        std_dev: f64,
        count: usize,
        level: f64,
    ) -> AnalyticsResult<ConfidenceInterval> {
        if count < 2 {
            return Ok(ConfidenceInterval {
                level,
                lower: mean,
                upper: mean,
                margin_of_error: 0.0,
                degrees_of_freedom: 0,
                degenerate: true,
                reliability: Reliability::Low,
            });
        }

        let df = count - 1;
        let t = student_t_critical(level, df as f64)?;
        let margin = t * std_dev / (count as f64).sqrt();

        let reliability = if count < 10 {
            Reliability::Low
        } else if count < 30 {
            Reliability::Moderate
        } else {
            Reliability::High
        };

        Ok(ConfidenceInterval {
            level,
            lower: mean - margin,
            upper: mean + margin,
            margin_of_error: margin,
            degrees_of_freedom: df,
            degenerate: false,
            reliability,
        })
    }
}

// Helper functions shared by the other engines

pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Bessel-corrected variance; 0 for fewer than two values
pub(crate) fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

pub(crate) fn sample_std_dev(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

pub(crate) fn sorted_copy(data: &[f64]) -> Vec<f64> {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

pub(crate) fn percentile(sorted_data: &[f64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}

/// Two-sided critical value of Student's t for `level` confidence
pub(crate) fn student_t_critical(level: f64, df: f64) -> AnalyticsResult<f64> {
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| AnalyticsError::CalculationError(format!("t-distribution: {}", e)))?;
    Ok(dist.inverse_cdf(1.0 - (1.0 - level) / 2.0))
}

/// Two-tailed p-value of a t statistic
pub(crate) fn student_t_two_tailed_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { 1.0 } else { 0.0 };
    }
    if !df.is_finite() || df <= 0.0 {
        return 1.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Two-sided standard normal quantile, e.g. 1.96 for 0.95
pub(crate) fn normal_critical(level: f64) -> f64 {
    std::f64::consts::SQRT_2 * erf_inv(level.clamp(0.0, 0.999_999))
}

/// Third and fourth standardized moments (skewness, excess kurtosis)
fn shape_moments(data: &[f64], mean: f64) -> (f64, f64) {
    let n = data.len() as f64;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    if m2 <= f64::EPSILON {
        return (0.0, 0.0);
    }
    let m3 = data.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
    let m4 = data.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n;
    (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
}

fn calculate_mode(data: &[f64]) -> Option<f64> {
    let mut frequency: BTreeMap<i64, usize> = BTreeMap::new();

    // Count at hundredth resolution so 4.5 and 4.50000001 agree
    for &value in data {
        let rounded = (value * 100.0).round() as i64;
        *frequency.entry(rounded).or_insert(0) += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (value, count) in frequency {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }

    best.filter(|(_, count)| *count > 1)
        .map(|(value, _)| value as f64 / 100.0)
}
