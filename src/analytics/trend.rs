//! Trend, seasonality, decomposition and change-rate analysis over the rating series

use crate::analytics::error::SubResult;
use crate::analytics::models::TimeSeriesPoint;
use crate::analytics::statistics::{mean, sample_std_dev};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum points for any trend analysis
pub const MIN_TREND_POINTS: usize = 3;

/// Minimum points for monthly seasonality
pub const MIN_SEASONALITY_POINTS: usize = 12;

/// Trailing moving-average windows, each computed only when the series is long enough
pub const MOVING_AVERAGE_WINDOWS: [usize; 3] = [3, 6, 12];

/// Year-over-year lag in points
const YEAR_LAG: usize = 12;

/// Slopes smaller than this are treated as flat
const SLOPE_EPSILON: f64 = 1e-10;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl TrendStrength {
    pub fn from_r_squared(r_squared: f64) -> Self {
        if r_squared < 0.25 {
            TrendStrength::Weak
        } else if r_squared < 0.5 {
            TrendStrength::Moderate
        } else if r_squared < 0.75 {
            TrendStrength::Strong
        } else {
            TrendStrength::VeryStrong
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TrendStrength::Weak => "weak",
            TrendStrength::Moderate => "moderate",
            TrendStrength::Strong => "strong",
            TrendStrength::VeryStrong => "very strong",
        }
    }
}

/// Ordinary least squares of value against the sequential index 1..n
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
}

impl LinearTrend {
    pub fn fit(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean_x = (n + 1.0) / 2.0;
        let mean_y = mean(values);

        let mut numerator = 0.0;
        let mut denominator = 0.0;

        for (i, y) in values.iter().enumerate() {
            let x_diff = (i + 1) as f64 - mean_x;
            numerator += x_diff * (y - mean_y);
            denominator += x_diff * x_diff;
        }

        let slope = if denominator != 0.0 {
            numerator / denominator
        } else {
            0.0
        };
        let intercept = mean_y - slope * mean_x;

        let mut ss_tot = 0.0;
        let mut ss_res = 0.0;
        for (i, y) in values.iter().enumerate() {
            let y_pred = slope * (i + 1) as f64 + intercept;
            ss_tot += (y - mean_y).powi(2);
            ss_res += (y - y_pred).powi(2);
        }

        let r_squared = if ss_tot != 0.0 {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let direction = if slope > SLOPE_EPSILON {
            TrendDirection::Increasing
        } else if slope < -SLOPE_EPSILON {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        Self {
            slope,
            intercept,
            r_squared,
            direction,
            strength: TrendStrength::from_r_squared(r_squared),
        }
    }

    /// Value of the fitted line at a 1-based index
    pub fn predict(&self, index: f64) -> f64 {
        self.slope * index + self.intercept
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverage {
    pub window: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyIndex {
    pub month: u32,
    pub month_name: String,
    pub observations: usize,
    pub average: f64,
    pub seasonal_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityLevel {
    None,
    Weak,
    Moderate,
    Strong,
}

impl SeasonalityLevel {
    pub fn from_strength(strength: f64) -> Self {
        if strength < 0.05 {
            SeasonalityLevel::None
        } else if strength < 0.15 {
            SeasonalityLevel::Weak
        } else if strength < 0.25 {
            SeasonalityLevel::Moderate
        } else {
            SeasonalityLevel::Strong
        }
    }
}

/// Calendar-month seasonality across all years in the series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    /// One entry per month present in the data, January first
    pub monthly_indices: Vec<MonthlyIndex>,
    /// Standard deviation of the seasonal indices
    pub strength: f64,
    pub level: SeasonalityLevel,
    /// Up to three months with the highest index, highest first
    pub peak_months: Vec<MonthlyIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitQuality {
    Excellent,
    Good,
    Fair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionQuality {
    pub rmse: f64,
    pub explained_variance: f64,
    pub rating: FitQuality,
}

/// Additive decomposition: original = trend + seasonal + residual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    pub quality: DecompositionQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRate {
    pub from_period: String,
    pub to_period: String,
    /// Percent change
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRateSummary {
    pub average_rate: f64,
    /// Standard deviation of the period-over-period rates
    pub volatility: f64,
    pub max_increase: f64,
    pub max_decrease: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRates {
    pub period_over_period: Vec<ChangeRate>,
    pub year_over_year: SubResult<Vec<ChangeRate>>,
    pub summary: ChangeRateSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Low,
    Moderate,
    High,
}

impl VolatilityLevel {
    pub fn from_volatility(volatility: f64) -> Self {
        if volatility < 5.0 {
            VolatilityLevel::Low
        } else if volatility < 15.0 {
            VolatilityLevel::Moderate
        } else {
            VolatilityLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub volatility: VolatilityLevel,
    pub description: String,
    pub recommendation: String,
}

impl TrendSummary {
    /// Rule table combining direction, strength and volatility.
    pub fn synthesize(trend: &LinearTrend, volatility: f64) -> Self {
        let volatility_level = VolatilityLevel::from_volatility(volatility);
        let marked = trend.strength >= TrendStrength::Strong;

        let description = match trend.direction {
            TrendDirection::Stable => format!(
                "Ratings are flat over the observed period (R² = {:.2})",
                trend.r_squared
            ),
            TrendDirection::Increasing | TrendDirection::Decreasing => format!(
                "{} {} trend of {:+.3} points per evaluation (R² = {:.2})",
                capitalize(trend.strength.label()),
                if trend.direction == TrendDirection::Increasing {
                    "upward"
                } else {
                    "downward"
                },
                trend.slope,
                trend.r_squared
            ),
        };

        let mut recommendation = match (trend.direction, marked) {
            (TrendDirection::Decreasing, true) => {
                "Performance is declining consistently; schedule a review and targeted support."
            }
            (TrendDirection::Decreasing, false) => {
                "Slight downward movement; monitor upcoming evaluations."
            }
            (TrendDirection::Increasing, true) => {
                "Sustained improvement; recognize and share the practices behind it."
            }
            (TrendDirection::Increasing, false) => {
                "Modest improvement; continue the current approach."
            }
            (TrendDirection::Stable, _) => "Performance is stable; maintain current practices.",
        }
        .to_string();

        if volatility_level == VolatilityLevel::High {
            recommendation.push_str(" Ratings are volatile; investigate sources of inconsistency.");
        }

        Self {
            direction: trend.direction,
            strength: trend.strength,
            volatility: volatility_level,
            description,
            recommendation,
        }
    }
}

/// Complete trend analysis of one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub time_series: Vec<TimeSeriesPoint>,
    pub linear_trend: LinearTrend,
    pub moving_averages: Vec<MovingAverage>,
    /// `None` when seasonality was not requested
    pub seasonality: Option<SubResult<Seasonality>>,
    pub decomposition: Decomposition,
    pub change_rates: ChangeRates,
    pub summary: TrendSummary,
}

/// Trend analysis provider
pub struct TrendEngine;

impl TrendEngine {
    /// Analyze an ascending series; fewer than three points yield the insufficient marker.
    pub fn analyze(
        series: &[TimeSeriesPoint],
        include_seasonality: bool,
    ) -> SubResult<TrendAnalysis> {
        SubResult::require(MIN_TREND_POINTS, series.len(), "Trend analysis", || {
            let values: Vec<f64> = series.iter().map(|p| p.value).collect();
            let linear_trend = LinearTrend::fit(&values);

            let moving_averages = MOVING_AVERAGE_WINDOWS
                .iter()
                .filter(|&&window| values.len() >= window)
                .map(|&window| MovingAverage {
                    window,
                    values: Self::moving_average(&values, window),
                })
                .collect();

            let seasonality = include_seasonality.then(|| Self::seasonality(series));
            let decomposition = Self::decompose(series, &linear_trend, include_seasonality);
            let change_rates = Self::change_rates(series);
            let summary = TrendSummary::synthesize(&linear_trend, change_rates.summary.volatility);

            TrendAnalysis {
                time_series: series.to_vec(),
                linear_trend,
                moving_averages,
                seasonality,
                decomposition,
                change_rates,
                summary,
            }
        })
    }

    /// Trailing simple moving average
    pub fn moving_average(data: &[f64], window_size: usize) -> Vec<f64> {
        if window_size == 0 || data.len() < window_size {
            return vec![];
        }

        data.windows(window_size)
            .map(|window| window.iter().sum::<f64>() / window_size as f64)
            .collect()
    }

    /// Monthly seasonal indices; requires twelve points.
    pub fn seasonality(series: &[TimeSeriesPoint]) -> SubResult<Seasonality> {
        SubResult::require(MIN_SEASONALITY_POINTS, series.len(), "Seasonality analysis", || {
            let mut by_month: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
            for point in series {
                let entry = by_month.entry(point.month()).or_insert((0.0, 0));
                entry.0 += point.value;
                entry.1 += 1;
            }

            let month_averages: Vec<(u32, usize, f64)> = by_month
                .into_iter()
                .map(|(month, (sum, count))| (month, count, sum / count as f64))
                .collect();

            let overall = mean(&month_averages.iter().map(|(_, _, avg)| *avg).collect::<Vec<_>>());

            let monthly_indices: Vec<MonthlyIndex> = month_averages
                .into_iter()
                .map(|(month, observations, average)| MonthlyIndex {
                    month,
                    month_name: MONTH_NAMES[(month - 1) as usize].to_string(),
                    observations,
                    average,
                    seasonal_index: if overall.abs() > f64::EPSILON {
                        average / overall
                    } else {
                        1.0
                    },
                })
                .collect();

            let indices: Vec<f64> = monthly_indices.iter().map(|m| m.seasonal_index).collect();
            let strength = sample_std_dev(&indices);

            let mut peak_months = monthly_indices.clone();
            // Highest index first; earlier month wins ties
            peak_months.sort_by(|a, b| {
                b.seasonal_index
                    .total_cmp(&a.seasonal_index)
                    .then(a.month.cmp(&b.month))
            });
            peak_months.truncate(3);

            Seasonality {
                monthly_indices,
                strength,
                level: SeasonalityLevel::from_strength(strength),
                peak_months,
            }
        })
    }

    /// Split the series into fitted line, monthly seasonal effect and residual.
    pub fn decompose(
        series: &[TimeSeriesPoint],
        trend: &LinearTrend,
        include_seasonality: bool,
    ) -> Decomposition {
        let n = series.len();
        let trend_component: Vec<f64> = (1..=n).map(|i| trend.predict(i as f64)).collect();

        let seasonal: Vec<f64> = if include_seasonality && n >= MIN_SEASONALITY_POINTS {
            let mut by_month: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
            for (point, fitted) in series.iter().zip(&trend_component) {
                let entry = by_month.entry(point.month()).or_insert((0.0, 0));
                entry.0 += point.value - fitted;
                entry.1 += 1;
            }
            series
                .iter()
                .map(|p| {
                    by_month
                        .get(&p.month())
                        .map(|(sum, count)| sum / *count as f64)
                        .unwrap_or(0.0)
                })
                .collect()
        } else {
            vec![0.0; n]
        };

        let residual: Vec<f64> = series
            .iter()
            .zip(trend_component.iter())
            .zip(seasonal.iter())
            .map(|((p, t), s)| p.value - t - s)
            .collect();

        let mse = residual.iter().map(|r| r * r).sum::<f64>() / n.max(1) as f64;
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        let m = mean(&values);
        let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n.max(1) as f64;

        let explained_variance = if variance > f64::EPSILON {
            1.0 - mse / variance
        } else if mse <= f64::EPSILON {
            1.0
        } else {
            0.0
        };

        let rating = if explained_variance > 0.8 {
            FitQuality::Excellent
        } else if explained_variance > 0.6 {
            FitQuality::Good
        } else {
            FitQuality::Fair
        };

        Decomposition {
            trend: trend_component,
            seasonal,
            residual,
            quality: DecompositionQuality {
                rmse: mse.sqrt(),
                explained_variance,
                rating,
            },
        }
    }

    /// Percent changes between consecutive points and, with a year of data, at lag 12.
    pub fn change_rates(series: &[TimeSeriesPoint]) -> ChangeRates {
        let period_over_period = lagged_changes(series, 1);
        let year_over_year = SubResult::require(
            MIN_SEASONALITY_POINTS,
            series.len(),
            "Year-over-year change",
            || lagged_changes(series, YEAR_LAG),
        );

        let rates: Vec<f64> = period_over_period.iter().map(|c| c.rate).collect();
        let summary = ChangeRateSummary {
            average_rate: mean(&rates),
            volatility: sample_std_dev(&rates),
            max_increase: rates.iter().copied().fold(0.0, f64::max),
            max_decrease: rates.iter().copied().fold(0.0, f64::min),
        };

        ChangeRates {
            period_over_period,
            year_over_year,
            summary,
        }
    }
}

/// Percent change at `lag`, skipping zero baselines
fn lagged_changes(series: &[TimeSeriesPoint], lag: usize) -> Vec<ChangeRate> {
    if series.len() <= lag {
        return vec![];
    }
    series
        .iter()
        .zip(series.iter().skip(lag))
        .filter(|(prev, _)| prev.value.abs() > f64::EPSILON)
        .map(|(prev, curr)| ChangeRate {
            from_period: prev.period_label.clone(),
            to_period: curr.period_label.clone(),
            rate: (curr.value - prev.value) / prev.value * 100.0,
        })
        .collect()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
