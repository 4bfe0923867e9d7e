//! Pairwise Pearson correlation between the overall rating and its sub-scores

use crate::analytics::error::{InsufficientData, SubResult};
use crate::analytics::models::{RatingRecord, SubScoreHandling};
use crate::analytics::statistics::student_t_two_tailed_p;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Observations a sub-score needs before it enters the matrix
pub const MIN_VARIABLE_OBSERVATIONS: usize = 3;

/// Variables needed for a matrix
pub const MIN_CORRELATION_VARIABLES: usize = 2;

/// |r| above which two variables are flagged as collinear
pub const MULTICOLLINEARITY_THRESHOLD: f64 = 0.8;

const TOP_PAIRS: usize = 5;
const SIGNIFICANCE_ALPHA: f64 = 0.05;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RatingVariable {
    OverallRating,
    TeachingQuality,
    CourseContent,
    Availability,
}

impl RatingVariable {
    fn extract(self, record: &RatingRecord) -> Option<f64> {
        match self {
            RatingVariable::OverallRating => Some(record.overall_rating),
            RatingVariable::TeachingQuality => record.teaching_quality,
            RatingVariable::CourseContent => record.course_content,
            RatingVariable::Availability => record.availability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Negligible,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl CorrelationStrength {
    pub fn from_coefficient(r: f64) -> Self {
        let r = r.abs();
        if r < 0.1 {
            CorrelationStrength::Negligible
        } else if r < 0.3 {
            CorrelationStrength::Weak
        } else if r < 0.5 {
            CorrelationStrength::Moderate
        } else if r < 0.7 {
            CorrelationStrength::Strong
        } else {
            CorrelationStrength::VeryStrong
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub first: RatingVariable,
    pub second: RatingVariable,
    pub coefficient: f64,
    /// Records where both variables are present
    pub observations: usize,
    /// `None` when undefined: |r| = 1 or fewer than three observations
    pub t_statistic: Option<f64>,
    pub p_value: f64,
    pub significant: bool,
    pub strength: CorrelationStrength,
    pub direction: CorrelationDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedVariable {
    pub variable: RatingVariable,
    pub available: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub variables: Vec<RatingVariable>,
    /// Symmetric, unit diagonal, indexed like `variables`
    pub matrix: Vec<Vec<f64>>,
    pub pairs: Vec<CorrelationPair>,
    pub strongest_pairs: Vec<CorrelationPair>,
    pub multicollinearity: bool,
    pub sub_score_handling: SubScoreHandling,
    pub excluded_variables: Vec<ExcludedVariable>,
}

impl CorrelationReport {
    pub fn coefficient(&self, a: RatingVariable, b: RatingVariable) -> Option<f64> {
        let i = self.variables.iter().position(|&v| v == a)?;
        let j = self.variables.iter().position(|&v| v == b)?;
        Some(self.matrix[i][j])
    }
}

/// Correlation analysis provider
pub struct CorrelationAnalyzer;

impl CorrelationAnalyzer {
    pub fn analyze(
        records: &[RatingRecord],
        handling: SubScoreHandling,
    ) -> SubResult<CorrelationReport> {
        // One column per variable; None marks an absent sub-score
        let mut variables = Vec::new();
        let mut columns: Vec<Vec<Option<f64>>> = Vec::new();
        let mut excluded_variables = Vec::new();

        for variable in RatingVariable::iter() {
            let column: Vec<Option<f64>> = records
                .iter()
                .map(|record| match handling {
                    SubScoreHandling::Exclude => variable.extract(record),
                    SubScoreHandling::SubstituteOverall => {
                        variable.extract(record).or(Some(record.overall_rating))
                    }
                })
                .collect();

            let available = column.iter().flatten().count();
            if available < MIN_VARIABLE_OBSERVATIONS {
                excluded_variables.push(ExcludedVariable { variable, available });
                continue;
            }
            variables.push(variable);
            columns.push(column);
        }

        if variables.len() < MIN_CORRELATION_VARIABLES {
            return SubResult::Insufficient(InsufficientData {
                insufficient_data: true,
                minimum_required: MIN_CORRELATION_VARIABLES,
                available: variables.len(),
                message: format!(
                    "Correlation analysis requires at least {} variables with {} or more \
                     values, {} available",
                    MIN_CORRELATION_VARIABLES,
                    MIN_VARIABLE_OBSERVATIONS,
                    variables.len()
                ),
            });
        }

        let k = variables.len();
        let mut matrix = vec![vec![0.0; k]; k];
        let mut pairs = Vec::new();

        for i in 0..k {
            matrix[i][i] = 1.0;
            for j in (i + 1)..k {
                let (xs, ys): (Vec<f64>, Vec<f64>) = columns[i]
                    .iter()
                    .zip(&columns[j])
                    .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                    .unzip();

                let pair = Self::pair(variables[i], variables[j], &xs, &ys);
                matrix[i][j] = pair.coefficient;
                matrix[j][i] = pair.coefficient;
                pairs.push(pair);
            }
        }

        let mut strongest_pairs = pairs.clone();
        strongest_pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
        strongest_pairs.truncate(TOP_PAIRS);

        let multicollinearity = pairs
            .iter()
            .any(|p| p.coefficient.abs() > MULTICOLLINEARITY_THRESHOLD);

        SubResult::Ready(CorrelationReport {
            variables,
            matrix,
            pairs,
            strongest_pairs,
            multicollinearity,
            sub_score_handling: handling,
            excluded_variables,
        })
    }

    fn pair(
        first: RatingVariable,
        second: RatingVariable,
        xs: &[f64],
        ys: &[f64],
    ) -> CorrelationPair {
        let r = pearson(xs, ys);
        let n = xs.len();
        let (t_statistic, p_value) = significance(r, n);

        CorrelationPair {
            first,
            second,
            coefficient: r,
            observations: n,
            t_statistic,
            p_value,
            significant: p_value < SIGNIFICANCE_ALPHA,
            strength: CorrelationStrength::from_coefficient(r),
            direction: if r < 0.0 {
                CorrelationDirection::Negative
            } else {
                CorrelationDirection::Positive
            },
        }
    }
}

/// Pearson's r; 0 when either variable has no spread
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }

    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut ss_x = 0.0;
    let mut ss_y = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        ss_x += dx * dx;
        ss_y += dy * dy;
    }

    let denominator = (ss_x * ss_y).sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    (covariance / denominator).clamp(-1.0, 1.0)
}

/// t = r·√((n−2)/(1−r²)) and its two-tailed p-value
fn significance(r: f64, n: usize) -> (Option<f64>, f64) {
    if n <= 2 {
        return (None, 1.0);
    }
    let one_minus_r2 = 1.0 - r * r;
    if one_minus_r2 <= f64::EPSILON {
        return (None, 0.0);
    }
    let df = (n - 2) as f64;
    let t = r * (df / one_minus_r2).sqrt();
    (Some(t), student_t_two_tailed_p(t, df))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn records(rows: &[(f64, Option<f64>, Option<f64>, Option<f64>)]) -> Vec<RatingRecord> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(overall, tq, cc, av))| {
                RatingRecord::new(overall, start + Duration::days(i as i64 * 7))
                    .with_sub_scores(tq, cc, av)
            })
            .collect()
    }

    #[test]
    fn test_substitution_pins_legacy_behavior() {
        let data = records(&[
            (4.0, None, Some(3.5), Some(4.0)),
            (3.5, None, Some(3.0), Some(4.5)),
            (4.8, None, Some(4.2), Some(3.9)),
            (2.9, None, Some(3.1), Some(4.1)),
        ]);

        let report = CorrelationAnalyzer::analyze(&data, SubScoreHandling::SubstituteOverall);
        let report = report.ready().unwrap();
        let r = report
            .coefficient(RatingVariable::OverallRating, RatingVariable::TeachingQuality)
            .unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert!(report.multicollinearity);
    }

    #[test]
    fn test_exclusion_drops_absent_sub_score() {
        let data = records(&[
            (4.0, None, Some(3.5), Some(4.0)),
            (3.5, None, Some(3.0), Some(4.5)),
            (4.8, None, Some(4.2), Some(3.9)),
            (2.9, None, Some(3.1), Some(4.1)),
        ]);

        let report = CorrelationAnalyzer::analyze(&data, SubScoreHandling::Exclude);
        let report = report.ready().unwrap();
        assert!(!report.variables.contains(&RatingVariable::TeachingQuality));
        assert_eq!(
            report.excluded_variables,
            vec![ExcludedVariable {
                variable: RatingVariable::TeachingQuality,
                available: 0
            }]
        );
        assert!(report
            .coefficient(RatingVariable::OverallRating, RatingVariable::TeachingQuality)
            .is_none());
    }

    #[test]
    fn test_pairwise_complete_observations() {
        let data = records(&[
            (4.0, Some(4.1), None, None),
            (3.0, Some(3.2), None, None),
            (5.0, None, None, None),
            (2.0, Some(2.1), None, None),
            (4.5, Some(4.4), None, None),
        ]);

        let report = CorrelationAnalyzer::analyze(&data, SubScoreHandling::Exclude);
        let report = report.ready().unwrap();
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.pairs[0].observations, 4);
        assert!(report.pairs[0].coefficient > 0.95);
    }

    #[test]
    fn test_matrix_symmetric_with_unit_diagonal() {
        let data = records(&[
            (4.0, Some(3.8), Some(3.5), Some(2.0)),
            (3.5, Some(3.6), Some(4.0), Some(4.5)),
            (4.8, Some(4.5), Some(4.2), Some(3.0)),
            (2.9, Some(3.0), Some(3.1), Some(4.9)),
            (4.1, Some(4.0), Some(2.8), Some(3.3)),
        ]);

        let report = CorrelationAnalyzer::analyze(&data, SubScoreHandling::Exclude);
        let report = report.ready().unwrap();
        assert_eq!(report.variables.len(), 4);
        assert_eq!(report.pairs.len(), 6);
        assert_eq!(report.strongest_pairs.len(), 5);
        for i in 0..4 {
            assert_eq!(report.matrix[i][i], 1.0);
            for j in 0..4 {
                assert_eq!(report.matrix[i][j], report.matrix[j][i]);
            }
        }
        let top = report.strongest_pairs[0].coefficient.abs();
        assert!(report.pairs.iter().all(|p| p.coefficient.abs() <= top));
    }

    #[test]
    fn test_only_overall_rating_is_insufficient() {
        let data = records(&[
            (4.0, None, None, None),
            (3.0, None, None, None),
            (5.0, None, None, None),
        ]);
        match CorrelationAnalyzer::analyze(&data, SubScoreHandling::Exclude) {
            SubResult::Insufficient(marker) => {
                assert_eq!(marker.minimum_required, 2);
                assert_eq!(marker.available, 1);
            }
            SubResult::Ready(_) => panic!("expected insufficient marker"),
        }
    }

    #[test]
    fn test_constant_variable_correlates_as_zero() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]), 0.0);
        let (t, p) = significance(0.0, 3);
        assert_eq!(t, Some(0.0));
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_strength_labels_and_perfect_significance() {
        assert_eq!(CorrelationStrength::from_coefficient(-0.05), CorrelationStrength::Negligible);
        assert_eq!(CorrelationStrength::from_coefficient(0.25), CorrelationStrength::Weak);
        assert_eq!(CorrelationStrength::from_coefficient(-0.45), CorrelationStrength::Moderate);
        assert_eq!(CorrelationStrength::from_coefficient(0.65), CorrelationStrength::Strong);
        assert_eq!(CorrelationStrength::from_coefficient(0.95), CorrelationStrength::VeryStrong);
        assert_eq!(significance(1.0, 10), (None, 0.0));
        assert_eq!(significance(0.5, 2), (None, 1.0));
    }
}
