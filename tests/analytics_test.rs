//! End-to-end tests for the analytics engine

mod common;

use common::{monthly_records, records_every, synthetic_ratings};
use teacher_performance_analytics::analytics::*;

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() < tolerance,
        "expected {} to be within {} of {}",
        actual,
        tolerance,
        expected
    );
}

fn analyze(values: &[f64], options: &AnalysisOptions) -> StatisticsReport {
    AnalyticsEngine::with_defaults()
        .analyze(&records_every(7, values), options, None)
        .unwrap()
}

#[test]
fn test_stable_ratings_report() {
    let report = analyze(&[4.5, 4.6, 4.4, 4.7, 4.5], &AnalysisOptions::default());

    let stats = &report.basic_statistics;
    assert_close(stats.mean, 4.54, 1e-9);
    assert_close(stats.median, 4.5, 1e-9);
    assert!(stats.outliers.points.is_empty());

    let trend = report.trend_analysis.ready().expect("five points are enough for a trend");
    let seasonality = trend.seasonality.as_ref().expect("seasonality was requested");
    match seasonality {
        SubResult::Insufficient(marker) => {
            assert_eq!(marker.minimum_required, 12);
            assert_eq!(marker.available, 5);
        }
        SubResult::Ready(_) => panic!("seasonality should need twelve points"),
    }

    assert_eq!(report.metadata.record_count, 5);
    assert_eq!(report.metadata.algorithm_version, ALGORITHM_VERSION);
}

#[test]
fn test_sudden_drop_is_high_severity_anomaly() {
    let report = analyze(&[4.5, 4.6, 4.4, 4.7, 1.0], &AnalysisOptions::default());

    assert_eq!(report.anomalies.method, DetectionMethod::Statistical);
    assert_eq!(report.anomalies.anomalies.len(), 1);

    let anomaly = &report.anomalies.anomalies[0];
    assert_eq!(anomaly.index, 4);
    assert_eq!(anomaly.value, 1.0);
    assert!(anomaly.z_score < -20.0);
    assert_eq!(anomaly.severity, AnomalySeverity::High);
    assert_eq!(report.anomalies.summary.severity_breakdown.high, 1);
}

#[test]
fn test_linear_forecast_and_smoothed_ensemble() {
    let options = AnalysisOptions {
        forecast_periods: 3,
        ..Default::default()
    };
    let report = analyze(&[3.0, 3.2, 3.4, 3.6, 3.8, 4.0], &options);

    let trend = report.trend_analysis.ready().unwrap();
    assert!(trend.linear_trend.slope > 0.0);
    assert_close(trend.linear_trend.r_squared, 1.0, 1e-9);

    let predictions = report.predictions.ready().expect("six points are enough to forecast");
    assert_eq!(predictions.periods, 3);

    let linear = predictions
        .models
        .iter()
        .find(|m| m.model == ForecastModel::LinearRegression)
        .unwrap();
    let linear_values: Vec<f64> = linear.predictions.iter().map(|p| p.value).collect();
    for (actual, expected) in linear_values.iter().zip([4.2, 4.4, 4.6]) {
        assert_close(*actual, expected, 1e-9);
    }

    assert_eq!(predictions.ensemble.len(), 3);
    for (ensemble, linear_value) in predictions.ensemble.iter().zip(&linear_values) {
        assert!(ensemble.value < *linear_value);
        assert!(ensemble.lower_bound <= ensemble.value);
        assert!(ensemble.value <= ensemble.upper_bound);
    }
}

#[test]
fn test_ensemble_is_mean_of_contributing_models() {
    let values = [3.9, 4.1, 4.0, 4.3, 4.2, 4.4, 4.1, 4.5];
    let series = TimeSeriesPoint::series_from(&records_every(14, &values));
    let settings = ForecastSettings {
        periods: 4,
        confidence_level: 0.95,
        backtest_holdout: DEFAULT_BACKTEST_HOLDOUT,
    };

    let predictions = ForecastEngine::forecast(&series, None, &settings);
    let predictions = predictions.ready().unwrap();

    for (step, ensemble) in predictions.ensemble.iter().enumerate() {
        let contributing: Vec<f64> = predictions
            .models
            .iter()
            .filter(|m| ensemble.contributing_models.contains(&m.model))
            .map(|m| m.predictions[step].value)
            .collect();
        assert!(!contributing.is_empty());

        let mean = contributing.iter().sum::<f64>() / contributing.len() as f64;
        assert_close(ensemble.value, mean, 1e-9);
    }
}

#[test]
fn test_forecast_needs_three_points() {
    let series = TimeSeriesPoint::series_from(&records_every(7, &[4.0, 4.2]));
    let settings = ForecastSettings {
        periods: 3,
        confidence_level: 0.95,
        backtest_holdout: DEFAULT_BACKTEST_HOLDOUT,
    };

    let predictions = ForecastEngine::forecast(&series, None, &settings);
    assert!(predictions.is_insufficient());
}

#[test]
fn test_two_ratings_still_produce_a_report() {
    let report = analyze(&[4.0, 4.2], &AnalysisOptions::default());

    assert_eq!(report.basic_statistics.count, 2);
    assert!(report.trend_analysis.is_insufficient());
    assert!(report.predictions.is_insufficient());
    assert!(report.correlations.is_insufficient());
    assert!(!report.headline().is_empty());
}

#[test]
fn test_matching_peer_distribution_is_average() {
    let teacher: Vec<f64> = [4.3, 4.7].repeat(5);
    let peers = PeerSample::new("department", [4.3, 4.7].repeat(15));

    let report = AnalyticsEngine::with_defaults()
        .analyze(
            &records_every(7, &teacher),
            &AnalysisOptions::default(),
            Some(&peers),
        )
        .unwrap();

    let comparison = report.peer_comparison.result().expect("peer sample was supplied");
    assert_close(comparison.teacher_mean, 4.5, 1e-9);
    assert_close(comparison.t_test.t_statistic, 0.0, 1e-9);
    assert_close(comparison.t_test.p_value, 1.0, 1e-6);
    assert!(!comparison.t_test.significant);
    assert_close(comparison.percentile_rank, 50.0, 1e-9);
    assert_eq!(comparison.category, PerformanceCategory::Average);
    assert_eq!(comparison.effect_size.magnitude, EffectMagnitude::Negligible);
}

#[test]
fn test_stronger_teacher_against_synthetic_peers() {
    let teacher = [4.8, 4.9, 4.7, 4.9, 4.8, 4.6, 4.9, 4.8];
    let peers = PeerSample::new("department", synthetic_ratings(3.6, 0.4, 60, 7));

    let result = PeerComparator::compare(&teacher, &peers).unwrap();
    assert!(result.mean_difference > 0.0);
    assert!(result.t_test.significant);
    assert!(result.percentile_rank >= 90.0);
    assert_eq!(result.category, PerformanceCategory::Exceptional);
    assert_eq!(result.effect_size.magnitude, EffectMagnitude::Large);
}

#[test]
fn test_report_without_peers_marks_comparison_unavailable() {
    let report = analyze(&[4.1, 4.3, 4.2], &AnalysisOptions::default());
    assert!(matches!(
        report.peer_comparison,
        PeerComparison::Unavailable { .. }
    ));
}

#[test]
fn test_substituted_sub_scores_correlate_perfectly() {
    let records: Vec<RatingRecord> = records_every(7, &[4.0, 3.5, 4.8, 2.9, 4.4])
        .into_iter()
        .zip([3.5, 3.0, 4.2, 3.1, 3.9])
        .map(|(record, content)| record.with_sub_scores(None, Some(content), None))
        .collect();

    let legacy = AnalyticsEngine::new(AnalyticsConfig {
        sub_score_handling: SubScoreHandling::SubstituteOverall,
        ..Default::default()
    })
    .unwrap()
    .analyze(&records, &AnalysisOptions::default(), None)
    .unwrap();

    let correlations = legacy.correlations.ready().unwrap();
    let r = correlations
        .coefficient(RatingVariable::OverallRating, RatingVariable::TeachingQuality)
        .unwrap();
    assert_close(r, 1.0, 1e-12);

    let current = AnalyticsEngine::with_defaults()
        .analyze(&records, &AnalysisOptions::default(), None)
        .unwrap();
    let correlations = current.correlations.ready().unwrap();
    assert!(correlations
        .coefficient(RatingVariable::OverallRating, RatingVariable::TeachingQuality)
        .is_none());
    assert_eq!(current.metadata.sub_score_handling, SubScoreHandling::Exclude);
}

#[test]
fn test_correlation_matrix_is_symmetric() {
    let records: Vec<RatingRecord> = records_every(7, &[4.0, 3.5, 4.8, 2.9, 4.4, 3.8])
        .into_iter()
        .zip([
            (3.8, 3.5, 4.0),
            (3.2, 3.0, 4.5),
            (4.6, 4.2, 3.9),
            (3.0, 3.1, 4.1),
            (4.1, 4.0, 4.2),
            (3.7, 3.3, 3.6),
        ])
        .map(|(record, (tq, cc, av))| record.with_sub_scores(Some(tq), Some(cc), Some(av)))
        .collect();

    let report = CorrelationAnalyzer::analyze(&records, SubScoreHandling::Exclude);
    let report = report.ready().unwrap();
    assert_eq!(report.variables.len(), 4);

    for (i, row) in report.matrix.iter().enumerate() {
        assert_close(row[i], 1.0, 1e-12);
        for (j, value) in row.iter().enumerate() {
            assert_close(*value, report.matrix[j][i], 1e-12);
            assert!((-1.0..=1.0).contains(value));
        }
    }
    assert_eq!(report.pairs.len(), 6);
    assert!(report.strongest_pairs.len() <= 5);
}

#[test]
fn test_sum_and_quartile_properties() {
    let data = synthetic_ratings(4.0, 0.6, 40, 11);
    let stats = StatisticsCore::describe(&data, 0.95).unwrap();

    assert_close(stats.mean * stats.count as f64, stats.sum, 1e-9);
    assert!(stats.quartiles.q1 <= stats.quartiles.q2);
    assert!(stats.quartiles.q2 <= stats.quartiles.q3);
    assert!(stats.min <= stats.quartiles.q1 && stats.quartiles.q3 <= stats.max);

    for point in &stats.outliers.points {
        assert!(point.value < stats.quartiles.q1 || point.value > stats.quartiles.q3);
    }
}

#[test]
fn test_single_rating_has_zero_variance() {
    let stats = StatisticsCore::describe(&[4.2], 0.95).unwrap();
    assert_eq!(stats.variance, 0.0);
    assert_eq!(stats.std_dev, 0.0);
    assert!(stats.confidence_interval.degenerate);
}

#[test]
fn test_far_value_is_extreme_outlier() {
    let data = [4.0, 4.1, 4.2, 4.3, 4.4, 4.5, 4.6, 4.7, 20.0];
    let stats = StatisticsCore::describe(&data, 0.95).unwrap();

    let far = stats
        .outliers
        .points
        .iter()
        .find(|p| p.index == 8)
        .expect("20.0 lies beyond the outer fence");
    assert_eq!(far.kind, OutlierKind::Extreme);
    assert!(far.value > stats.quartiles.q3 + 3.0 * stats.quartiles.iqr);
    assert_eq!(stats.outliers.points.len(), 1);
}

#[test]
fn test_increasing_series_trend() {
    let series =
        TimeSeriesPoint::series_from(&records_every(7, &[3.0, 3.25, 3.5, 3.75, 4.0, 4.25]));
    let analysis = TrendEngine::analyze(&series, false);
    let analysis = analysis.ready().unwrap();

    assert!(analysis.linear_trend.slope > 0.0);
    assert_close(analysis.linear_trend.r_squared, 1.0, 1e-9);
    assert_eq!(analysis.linear_trend.direction, TrendDirection::Increasing);
    assert!(analysis.seasonality.is_none());
}

#[test]
fn test_monthly_seasonality_finds_december_peak() {
    let values: Vec<f64> = (0..24)
        .map(|i| if i % 12 == 11 { 4.8 } else { 4.0 })
        .collect();
    let series = TimeSeriesPoint::series_from(&monthly_records(&values));

    let analysis = TrendEngine::analyze(&series, true);
    let analysis = analysis.ready().unwrap();
    let seasonality = analysis
        .seasonality
        .as_ref()
        .and_then(|s| s.ready())
        .expect("24 monthly points support seasonality");

    assert_eq!(seasonality.monthly_indices.len(), 12);
    assert_eq!(seasonality.monthly_indices[0].month, 1);
    assert_eq!(seasonality.peak_months[0].month, 12);
    assert!(seasonality.strength > 0.0);
}

#[test]
fn test_isolation_method_uses_engine_threshold() {
    let options = AnalysisOptions {
        detection_method: DetectionMethod::IsolationForest,
        ..Default::default()
    };
    let report = analyze(&[4.5, 4.6, 4.4, 4.7, 1.0], &options);

    assert_eq!(report.anomalies.method, DetectionMethod::IsolationForest);
    assert_eq!(report.anomalies.threshold, DEFAULT_ISOLATION_SCORE_THRESHOLD);
    assert_eq!(report.anomalies.anomalies.len(), 1);
    assert_eq!(report.anomalies.anomalies[0].index, 4);
}

#[test]
fn test_invalid_calls_are_rejected() {
    let engine = AnalyticsEngine::with_defaults();

    let empty = engine.analyze(&[], &AnalysisOptions::default(), None);
    assert!(matches!(empty, Err(AnalyticsError::InvalidInput(_))));

    let bad_options = AnalysisOptions {
        confidence_level: 1.5,
        ..Default::default()
    };
    let result = engine.analyze(&records_every(7, &[4.0, 4.1, 4.2]), &bad_options, None);
    assert!(matches!(result, Err(AnalyticsError::InvalidConfiguration(_))));
}

#[test]
fn test_report_serializes_insufficient_markers_inline() {
    let report = analyze(&[4.0, 4.2], &AnalysisOptions::default());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["trend_analysis"]["insufficient_data"], true);
    assert_eq!(json["trend_analysis"]["minimum_required"], 3);
    assert_eq!(json["peer_comparison"]["status"], "unavailable");
}

#[test]
fn test_drop_below_identical_ratings_is_flagged_and_fenced() {
    let report = analyze(&[4.0, 4.0, 4.0, 4.0, 1.0], &AnalysisOptions::default());

    let fenced: Vec<usize> = report
        .basic_statistics
        .outliers
        .points
        .iter()
        .map(|p| p.index)
        .collect();
    let flagged: Vec<usize> = report.anomalies.anomalies.iter().map(|a| a.index).collect();
    assert_eq!(fenced, vec![4]);
    assert_eq!(flagged, vec![4]);
    assert_eq!(report.anomalies.anomalies[0].severity, AnomalySeverity::High);

    // The report must stay valid JSON with a finite z-score
    let json = serde_json::to_value(&report).unwrap();
    assert!(json["anomalies"]["anomalies"][0]["z_score"].is_f64());
}

#[test]
fn test_non_finite_sub_scores_never_reach_correlations() {
    let json = r#"[
        {"overall_rating": 4.0, "teaching_quality": "NaN", "created_at": "2024-01-10T00:00:00Z"},
        {"overall_rating": 4.2, "teaching_quality": 4.1, "created_at": "2024-02-10T00:00:00Z"}
    ]"#;
    assert!(serde_json::from_str::<Vec<RatingRecord>>(json).is_err());

    let mut records = records_every(7, &[4.0, 4.2, 3.8, 4.4]);
    for (record, quality) in records.iter_mut().zip([3.9, f64::NAN, 3.7, 4.3]) {
        record.teaching_quality = Some(quality);
    }
    let result =
        AnalyticsEngine::with_defaults().analyze(&records, &AnalysisOptions::default(), None);
    assert!(matches!(
        result,
        Err(AnalyticsError::InvalidInput(msg)) if msg.contains("teaching_quality")
    ));
}
