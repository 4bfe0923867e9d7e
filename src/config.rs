use crate::analytics::{
    AnalysisOptions, AnalyticsConfig, DetectionMethod, SubScoreHandling, TimeFrame,
    DEFAULT_COMPARISON_GROUP,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine defaults
    pub analytics: AnalyticsSettings,

    /// Service fan-out and timeouts
    pub orchestration: OrchestrationConfig,

    /// Report cache
    pub cache: CacheConfig,

    /// Peer sample source
    pub peer_data: PeerDataConfig,

    /// Access rule overrides
    #[serde(default)]
    pub access: AccessConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("TPA_CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (TPA_ANALYTICS__CONFIDENCE_LEVEL=0.9)
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file over the defaults. A missing file is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Configuration(format!(
                "config file {} not found",
                path.display()
            )));
        }

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path.to_path_buf()))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("TPA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<()> {
        self.analytics.engine_config().validate()?;

        if self.orchestration.max_concurrent_analyses == 0 {
            return Err(AppError::Configuration(
                "orchestration.max_concurrent_analyses must be at least 1".to_string(),
            ));
        }
        if self.orchestration.analysis_timeout_secs == 0
            || self.orchestration.peer_fetch_timeout_secs == 0
        {
            return Err(AppError::Configuration(
                "orchestration timeouts must be at least 1 second".to_string(),
            ));
        }

        match self.peer_data.backend {
            PeerBackend::Static if self.peer_data.static_path.is_none() => {
                Err(AppError::Configuration(
                    "peer_data.static_path is required for the static backend".to_string(),
                ))
            }
            PeerBackend::Http if self.peer_data.base_url.is_none() => Err(AppError::Configuration(
                "peer_data.base_url is required for the http backend".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSettings {
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    #[serde(default = "default_forecast_periods")]
    pub forecast_periods: usize,

    #[serde(default = "default_true")]
    pub include_seasonality: bool,

    #[serde(default)]
    pub detection_method: DetectionMethod,

    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,

    #[serde(default = "default_isolation_score_threshold")]
    pub isolation_score_threshold: f64,

    /// Missing sub-score treatment in correlations
    #[serde(default)]
    pub sub_score_handling: SubScoreHandling,

    /// Trailing points held out when backtesting forecasts
    #[serde(default = "default_backtest_holdout")]
    pub backtest_holdout: usize,
}

impl AnalyticsSettings {
    pub fn engine_config(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            isolation_score_threshold: self.isolation_score_threshold,
            sub_score_handling: self.sub_score_handling,
            backtest_holdout: self.backtest_holdout,
        }
    }

    /// Options applied when a request carries none
    pub fn default_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            time_frame: TimeFrame::All,
            compare_with: DEFAULT_COMPARISON_GROUP.to_string(),
            confidence_level: self.confidence_level,
            include_seasonality: self.include_seasonality,
            forecast_periods: self.forecast_periods,
            detection_method: self.detection_method,
            detection_threshold: self.detection_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Upper bound on analyses running at once in a batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_analyses: usize,

    /// Engine run timeout (seconds)
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,

    /// Peer sample fetch timeout (seconds)
    #[serde(default = "default_peer_fetch_timeout")]
    pub peer_fetch_timeout_secs: u64,
}

impl OrchestrationConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn peer_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Report time-to-live (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeerBackend {
    /// Groups read from a JSON file
    Static,
    /// Remote peer-group service
    Http,
    /// No peer comparison
    #[default]
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDataConfig {
    #[serde(default)]
    pub backend: PeerBackend,

    /// JSON file mapping group name to ratings
    pub static_path: Option<PathBuf>,

    /// Base URL of the peer-group service
    pub base_url: Option<String>,

    /// HTTP client timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    /// Role name to access rule name, e.g. `teacher = "own_records"`
    #[serde(default)]
    pub role_rules: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_true() -> bool {
    true
}

fn default_confidence_level() -> f64 {
    0.95
}

fn default_forecast_periods() -> usize {
    6
}

fn default_detection_threshold() -> f64 {
    2.5
}

fn default_isolation_score_threshold() -> f64 {
    0.6
}

fn default_backtest_holdout() -> usize {
    3
}

fn default_max_concurrent() -> usize {
    8
}

fn default_analysis_timeout() -> u64 {
    30
}

fn default_peer_fetch_timeout() -> u64 {
    5
}

fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "teacher-performance-analytics".to_string()
}
