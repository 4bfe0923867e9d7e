//! Multi-model forecasting with an averaging ensemble and holdout backtesting

use crate::analytics::error::{InsufficientData, SubResult};
use crate::analytics::models::TimeSeriesPoint;
use crate::analytics::statistics::{mean, normal_critical, sample_std_dev};
use crate::analytics::trend::LinearTrend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum points before any model is fitted
pub const MIN_FORECAST_POINTS: usize = 3;

/// Default number of trailing points withheld for backtesting
pub const DEFAULT_BACKTEST_HOLDOUT: usize = 3;

/// Smoothing constant for single exponential smoothing
const SMOOTHING_ALPHA: f64 = 0.3;

const SMOOTHING_CONFIDENCE: f64 = 0.7;
const ARIMA_CONFIDENCE: f64 = 0.6;

/// Weight of the previous difference in the AR(1)-on-differences step
const AR_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    LinearRegression,
    ExponentialSmoothing,
    ArimaSimplified,
    Ensemble,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    /// Steps ahead of the last observation, starting at 1
    pub period: usize,
    pub value: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    pub model: ForecastModel,
    pub predictions: Vec<ModelPrediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub period: usize,
    pub value: f64,
    pub confidence: f64,
    /// Normal-approximation band from the spread of model predictions
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub contributing_models: Vec<ForecastModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub model: ForecastModel,
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error over non-zero actuals
    pub mape: Option<f64>,
    /// 1 - MAPE/100, floored at zero
    pub accuracy: Option<f64>,
}

/// Leave-last-k-out backtest of every model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub holdout_points: usize,
    pub training_points: usize,
    pub models: Vec<ModelAccuracy>,
    pub best_model: ForecastModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub periods: usize,
    pub confidence_level: f64,
    pub models: Vec<ModelForecast>,
    pub ensemble: Vec<EnsemblePrediction>,
    pub evaluation: SubResult<ModelEvaluation>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSettings {
    pub periods: usize,
    pub confidence_level: f64,
    pub backtest_holdout: usize,
}

/// Forecast provider
pub struct ForecastEngine;

impl ForecastEngine {
    /// Forecast `settings.periods` steps ahead. Uses `trend` when the caller already fitted it.
    pub fn forecast(
        series: &[TimeSeriesPoint],
        trend: Option<&LinearTrend>,
        settings: &ForecastSettings,
    ) -> SubResult<Predictions> {
        SubResult::require(MIN_FORECAST_POINTS, series.len(), "Forecasting", || {
            let values: Vec<f64> = series.iter().map(|p| p.value).collect();
            let fitted;
            let trend = match trend {
                Some(trend) => trend,
                None => {
                    fitted = LinearTrend::fit(&values);
                    &fitted
                }
            };

            let models = vec![
                ModelForecast {
                    model: ForecastModel::LinearRegression,
                    predictions: with_confidence(
                        linear_regression(trend, values.len(), settings.periods),
                        trend.r_squared,
                    ),
                },
                ModelForecast {
                    model: ForecastModel::ExponentialSmoothing,
                    predictions: with_confidence(
                        exponential_smoothing(&values, settings.periods),
                        SMOOTHING_CONFIDENCE,
                    ),
                },
                ModelForecast {
                    model: ForecastModel::ArimaSimplified,
                    predictions: with_confidence(
                        arima_simplified(&values, settings.periods),
                        ARIMA_CONFIDENCE,
                    ),
                },
            ];

            let ensemble = Self::ensemble(&models, settings.confidence_level);
            let evaluation = Self::backtest(&values, settings.backtest_holdout);

            Predictions {
                periods: settings.periods,
                confidence_level: settings.confidence_level,
                models,
                ensemble,
                evaluation,
            }
        })
    }

    /// Average the models that produced a value for each period.
    pub fn ensemble(models: &[ModelForecast], confidence_level: f64) -> Vec<EnsemblePrediction> {
        let z = normal_critical(confidence_level);

        let mut by_period: BTreeMap<usize, Vec<(ForecastModel, f64, f64)>> = BTreeMap::new();
        for forecast in models {
            for prediction in &forecast.predictions {
                by_period.entry(prediction.period).or_default().push((
                    forecast.model,
                    prediction.value,
                    prediction.confidence,
                ));
            }
        }

        by_period
            .into_iter()
            .map(|(period, contributions)| {
                let values: Vec<f64> = contributions.iter().map(|(_, v, _)| *v).collect();
                let confidences: Vec<f64> = contributions.iter().map(|(_, _, c)| *c).collect();
                let value = mean(&values);
                let spread = z * sample_std_dev(&values);

                EnsemblePrediction {
                    period,
                    value,
                    confidence: mean(&confidences),
                    lower_bound: value - spread,
                    upper_bound: value + spread,
                    contributing_models: contributions.iter().map(|(m, _, _)| *m).collect(),
                }
            })
            .collect()
    }

    /// Refit every model on all but the last `k` points and score it on them.
    pub fn backtest(values: &[f64], holdout: usize) -> SubResult<ModelEvaluation> {
        let k = holdout.min(values.len().saturating_sub(MIN_FORECAST_POINTS));
        if k == 0 {
            return SubResult::Insufficient(InsufficientData::new(
                MIN_FORECAST_POINTS + 1,
                values.len(),
                "Model backtesting",
            ));
        }

        let split = values.len() - k;
        let (training, actual) = values.split_at(split);
        let trend = LinearTrend::fit(training);

        let base: Vec<(ForecastModel, Vec<f64>)> = vec![
            (ForecastModel::LinearRegression, linear_regression(&trend, training.len(), k)),
            (ForecastModel::ExponentialSmoothing, exponential_smoothing(training, k)),
            (ForecastModel::ArimaSimplified, arima_simplified(training, k)),
        ];
        let ensemble: Vec<f64> = (0..k)
            .map(|step| mean(&base.iter().map(|(_, preds)| preds[step]).collect::<Vec<_>>()))
            .collect();

        let mut models: Vec<ModelAccuracy> = base
            .iter()
            .map(|(model, predicted)| score(*model, predicted, actual))
            .collect();
        models.push(score(ForecastModel::Ensemble, &ensemble, actual));

        let mut best_model = models[0].model;
        let mut best_rmse = models[0].rmse;
        for accuracy in &models[1..] {
            if accuracy.rmse < best_rmse {
                best_rmse = accuracy.rmse;
                best_model = accuracy.model;
            }
        }

        SubResult::Ready(ModelEvaluation {
            holdout_points: k,
            training_points: split,
            models,
            best_model,
        })
    }
}

fn with_confidence(values: Vec<f64>, confidence: f64) -> Vec<ModelPrediction> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| ModelPrediction {
            period: i + 1,
            value,
            confidence,
        })
        .collect()
}

/// Extend the fitted line to indices n+1..n+periods
pub(crate) fn linear_regression(trend: &LinearTrend, n: usize, periods: usize) -> Vec<f64> {
    (1..=periods).map(|i| trend.predict((n + i) as f64)).collect()
}

/// Flat forecast at the final smoothed level
pub(crate) fn exponential_smoothing(values: &[f64], periods: usize) -> Vec<f64> {
    let Some((&first, rest)) = values.split_first() else {
        return vec![];
    };
    let level = rest
        .iter()
        .fold(first, |level, &v| SMOOTHING_ALPHA * v + (1.0 - SMOOTHING_ALPHA) * level);
    vec![level; periods]
}

/// AR(1) on first differences, pulled toward the mean difference, integrated from the last value
pub(crate) fn arima_simplified(values: &[f64], periods: usize) -> Vec<f64> {
    let Some(&last) = values.last() else {
        return vec![];
    };
    let differences: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let mean_difference = mean(&differences);
    let mut previous_difference = differences.last().copied().unwrap_or(0.0);

    let mut level = last;
    let mut forecast = Vec::with_capacity(periods);
    for _ in 0..periods {
        let increment = AR_WEIGHT * previous_difference + (1.0 - AR_WEIGHT) * mean_difference;
        level += increment;
        previous_difference = increment;
        forecast.push(level);
    }
    forecast
}

fn score(model: ForecastModel, predicted: &[f64], actual: &[f64]) -> ModelAccuracy {
    let errors: Vec<f64> = predicted.iter().zip(actual).map(|(p, a)| a - p).collect();
    let mae = mean(&errors.iter().map(|e| e.abs()).collect::<Vec<_>>());
    let rmse = mean(&errors.iter().map(|e| e * e).collect::<Vec<_>>()).sqrt();

    let percentage: Vec<f64> = errors
        .iter()
        .zip(actual)
        .filter(|(_, a)| a.abs() > f64::EPSILON)
        .map(|(e, a)| (e / a).abs() * 100.0)
        .collect();
    let mape = (!percentage.is_empty()).then(|| mean(&percentage));

    ModelAccuracy {
        model,
        mae,
        rmse,
        mape,
        accuracy: mape.map(|m| (1.0 - m / 100.0).max(0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<TimeSeriesPoint> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| TimeSeriesPoint::new(start + Duration::days(7 * i as i64), v))
            .collect()
    }

    fn settings(periods: usize) -> ForecastSettings {
        ForecastSettings {
            periods,
            confidence_level: 0.95,
            backtest_holdout: DEFAULT_BACKTEST_HOLDOUT,
        }
    }

    #[test]
    fn test_short_series_never_fails() {
        for n in 0..3 {
            let values: Vec<f64> = (0..n).map(|i| 4.0 + i as f64).collect();
            let result = ForecastEngine::forecast(&series(&values), None, &settings(3));
            match result {
                SubResult::Insufficient(marker) => {
                    assert_eq!(marker.minimum_required, 3);
                    assert_eq!(marker.available, n);
                }
                SubResult::Ready(_) => panic!("expected insufficient marker for n={}", n),
            }
        }
    }

    #[test]
    fn test_linear_series_forecast() {
        let data = [3.0, 3.2, 3.4, 3.6, 3.8, 4.0];
        let result = ForecastEngine::forecast(&series(&data), None, &settings(3));
        let predictions = result.ready().unwrap();

        let linear = &predictions.models[0];
        assert_eq!(linear.model, ForecastModel::LinearRegression);
        let expected = [4.2, 4.4, 4.6];
        for (p, e) in linear.predictions.iter().zip(expected) {
            assert!((p.value - e).abs() < 1e-9);
            assert!(p.confidence > 0.999);
        }

        for (ensemble, e) in predictions.ensemble.iter().zip(expected) {
            assert!(ensemble.value < e);
            assert!(
                ensemble.lower_bound <= ensemble.value && ensemble.value <= ensemble.upper_bound
            );
        }
    }

    #[test]
    fn test_ensemble_is_mean_of_models() {
        let data = [4.1, 3.9, 4.4, 4.0, 4.6, 4.3, 4.8];
        let predictions = ForecastEngine::forecast(&series(&data), None, &settings(4));
        let predictions = predictions.ready().unwrap();
        for ensemble in &predictions.ensemble {
            let values: Vec<f64> = predictions
                .models
                .iter()
                .map(|m| m.predictions[ensemble.period - 1].value)
                .collect();
            let expected = values.iter().sum::<f64>() / values.len() as f64;
            assert!((ensemble.value - expected).abs() < 1e-12);
            assert_eq!(ensemble.contributing_models.len(), 3);
        }
    }

    #[test]
    fn test_exponential_smoothing_is_flat() {
        let forecast = exponential_smoothing(&[3.0, 4.0], 3);
        // 0.3 * 4 + 0.7 * 3
        assert!(forecast.iter().all(|v| (v - 3.3).abs() < 1e-12));
    }

    #[test]
    fn test_arima_on_constant_steps() {
        let forecast = arima_simplified(&[1.0, 2.0, 3.0], 2);
        assert!((forecast[0] - 4.0).abs() < 1e-12);
        assert!((forecast[1] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_backtest_scores_models() {
        let data = [3.0, 3.2, 3.4, 3.6, 3.8, 4.0, 4.2];
        let evaluation = ForecastEngine::backtest(&data, 3);
        let evaluation = evaluation.ready().unwrap();
        assert_eq!(evaluation.holdout_points, 3);
        assert_eq!(evaluation.training_points, 4);
        assert_eq!(evaluation.models.len(), 4);
        let linear = &evaluation.models[0];
        assert!(linear.rmse < 1e-9);
        assert!(matches!(
            evaluation.best_model,
            ForecastModel::LinearRegression | ForecastModel::ArimaSimplified
        ));
    }

    #[test]
    fn test_backtest_needs_four_points() {
        let evaluation = ForecastEngine::backtest(&[4.0, 4.1, 4.2], 3);
        match evaluation {
            SubResult::Insufficient(marker) => {
                assert_eq!(marker.minimum_required, 4);
                assert_eq!(marker.available, 3);
            }
            SubResult::Ready(_) => panic!("expected insufficient marker"),
        }
    }
}
