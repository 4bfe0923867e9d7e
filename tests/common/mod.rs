//! Shared fixtures for integration tests
//!
//! Synthetic peer ratings are generated here and nowhere in the library.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand::distributions::Distribution;
use statrs::distribution::Normal;
use std::io::Write;
use teacher_performance_analytics::analytics::RatingRecord;
use teacher_performance_analytics::orchestration::Caller;

pub fn start_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 15, 9, 0, 0).unwrap()
}

/// One record per value, `step_days` apart
pub fn records_every(step_days: i64, values: &[f64]) -> Vec<RatingRecord> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| RatingRecord::new(v, start_date() + Duration::days(step_days * i as i64)))
        .collect()
}

/// One record per calendar month starting January 2023
pub fn monthly_records(values: &[f64]) -> Vec<RatingRecord> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let month0 = i as u32;
            let date = Utc
                .with_ymd_and_hms(2023 + (month0 / 12) as i32, month0 % 12 + 1, 15, 9, 0, 0)
                .unwrap();
            RatingRecord::new(v, date)
        })
        .collect()
}

/// Normally distributed ratings clamped to the 1-5 scale
pub fn synthetic_ratings(mean: f64, std_dev: f64, count: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(mean, std_dev).unwrap();
    (0..count)
        .map(|_| normal.sample(&mut rng).clamp(1.0, 5.0))
        .collect()
}

pub fn admin() -> Caller {
    Caller::new("admin-1", "admin")
}

pub fn write_temp_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
