//! Input records, time-series points and per-call analysis options

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

/// Default confidence level for intervals and prediction bands
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Default number of future periods to forecast
pub const DEFAULT_FORECAST_PERIODS: usize = 6;

/// Default |z| cutoff for the z-score detectors
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 2.5;

/// Default peer group used for comparison
pub const DEFAULT_COMPARISON_GROUP: &str = "department";

/// A single evaluation of a teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    #[serde(deserialize_with = "deserialize_rating")]
    pub overall_rating: f64,

    #[serde(default, deserialize_with = "deserialize_optional_rating")]
    pub teaching_quality: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_optional_rating")]
    pub course_content: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_optional_rating")]
    pub availability: Option<f64>,

    pub created_at: DateTime<Utc>,
}

impl RatingRecord {
    pub fn new(overall_rating: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            overall_rating,
            teaching_quality: None,
            course_content: None,
            availability: None,
            created_at,
        }
    }

    pub fn with_sub_scores(
        mut self,
        teaching_quality: Option<f64>,
        course_content: Option<f64>,
        availability: Option<f64>,
    ) -> Self {
        self.teaching_quality = teaching_quality;
        self.course_content = course_content;
        self.availability = availability;
        self
    }

    /// Name of the first rating field holding NaN or an infinity
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("overall_rating", Some(self.overall_rating)),
            ("teaching_quality", self.teaching_quality),
            ("course_content", self.course_content),
            ("availability", self.availability),
        ]
        .into_iter()
        .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        .map(|(name, _)| name)
    }
}

/// Ratings arrive from form posts as either JSON numbers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            NumberOrString::Number(value) => Ok(value),
            NumberOrString::Text(text) => match text.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(E::custom(format!("rating '{}' is not a finite number", text))),
            },
        }
    }
}

fn deserialize_rating<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?.into_f64()
}

fn deserialize_optional_rating<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_f64)
        .transpose()
}

/// One rating placed on the time axis. Records are not aggregated by period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    /// Calendar month of the point, formatted `YYYY-MM`
    pub period_label: String,
}

impl TimeSeriesPoint {
    pub fn new(date: DateTime<Utc>, value: f64) -> Self {
        Self {
            date,
            value,
            period_label: format!("{:04}-{:02}", date.year(), date.month()),
        }
    }

    /// Calendar month number, 1-12
    pub fn month(&self) -> u32 {
        self.date.month()
    }

    /// Build the ascending-by-date series, one point per record.
    pub fn series_from(records: &[RatingRecord]) -> Vec<TimeSeriesPoint> {
        let mut points: Vec<TimeSeriesPoint> = records
            .iter()
            .map(|r| TimeSeriesPoint::new(r.created_at, r.overall_rating))
            .collect();
        // Stable sort keeps same-instant records in input order
        points.sort_by_key(|p| p.date);
        points
    }
}

/// Reporting window requested by the dashboard; echoed in report metadata.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeFrame {
    #[default]
    All,
    Month,
    Quarter,
    Semester,
    Year,
}

/// Outlier flagging strategy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMethod {
    #[default]
    Statistical,
    IsolationForest,
    ZScore,
    Combined,
}

/// How missing sub-scores enter the correlation analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubScoreHandling {
    /// Missing sub-scores are left out of that variable's sample
    #[default]
    Exclude,
    /// Legacy dashboard behavior: a missing sub-score takes the overall rating
    SubstituteOverall,
}

/// Per-call options from the dashboard request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub time_frame: TimeFrame,

    #[validate(length(min = 1, max = 64))]
    pub compare_with: String,

    #[validate(range(min = 0.5, max = 0.999))]
    pub confidence_level: f64,

    pub include_seasonality: bool,

    #[validate(range(min = 1, max = 24))]
    pub forecast_periods: usize,

    pub detection_method: DetectionMethod,

    #[validate(range(min = 0.0))]
    pub detection_threshold: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            time_frame: TimeFrame::All,
            compare_with: DEFAULT_COMPARISON_GROUP.to_string(),
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            include_seasonality: true,
            forecast_periods: DEFAULT_FORECAST_PERIODS,
            detection_method: DetectionMethod::Statistical,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
        }
    }
}

/// Comparator ratings for one comparison call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSample {
    pub group: String,
    pub ratings: Vec<f64>,
}

impl PeerSample {
    pub fn new(group: impl Into<String>, ratings: Vec<f64>) -> Self {
        Self {
            group: group.into(),
            ratings,
        }
    }
}
