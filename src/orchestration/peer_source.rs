//! Peer rating sources: static files and an HTTP service

use crate::analytics::PeerSample;
use crate::config::{PeerBackend, PeerDataConfig};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Supplies comparator ratings for a peer group
#[async_trait]
pub trait PeerDataSource: Send + Sync + 'static {
    /// Source name for logs
    fn name(&self) -> &str;

    /// Ratings of `group`, excluding the teacher under analysis where the source
    /// can tell them apart
    async fn fetch_peer_sample(&self, group: &str, teacher_id: &str) -> Result<PeerSample>;
}

/// Build the source selected in configuration; `None` disables peer comparison.
pub fn build_peer_source(config: &PeerDataConfig) -> Result<Option<Arc<dyn PeerDataSource>>> {
    match config.backend {
        PeerBackend::Disabled => Ok(None),
        PeerBackend::Static => {
            let path = config.static_path.as_ref().ok_or_else(|| {
                AppError::Configuration("peer_data.static_path is not set".to_string())
            })?;
            Ok(Some(Arc::new(StaticPeerDataSource::from_file(path)?)))
        }
        PeerBackend::Http => {
            let base_url = config.base_url.as_ref().ok_or_else(|| {
                AppError::Configuration("peer_data.base_url is not set".to_string())
            })?;
            Ok(Some(Arc::new(HttpPeerDataSource::new(
                base_url,
                Duration::from_secs(config.timeout_secs),
            )?)))
        }
    }
}

/// A peer rating, optionally attributed so the analyzed teacher can be left out
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PeerEntry {
    Rating(f64),
    Attributed { teacher_id: String, rating: f64 },
}

impl PeerEntry {
    fn rating(&self) -> f64 {
        match self {
            PeerEntry::Rating(rating) => *rating,
            PeerEntry::Attributed { rating, .. } => *rating,
        }
    }

    fn belongs_to(&self, teacher_id: &str) -> bool {
        matches!(self, PeerEntry::Attributed { teacher_id: id, .. } if id == teacher_id)
    }
}

/// Peer groups held in memory, usually loaded from a JSON file:
///
/// ```json
/// { "department": [4.1, 3.8, {"teacher_id": "t-17", "rating": 4.6}] }
/// ```
pub struct StaticPeerDataSource {
    groups: BTreeMap<String, Vec<PeerEntry>>,
}

impl StaticPeerDataSource {
    pub fn new(groups: BTreeMap<String, Vec<PeerEntry>>) -> Self {
        Self { groups }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let groups: BTreeMap<String, Vec<PeerEntry>> = serde_json::from_str(&content)?;
        debug!(
            path = %path.as_ref().display(),
            groups = groups.len(),
            "Loaded static peer groups"
        );
        Ok(Self::new(groups))
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

#[async_trait]
impl PeerDataSource for StaticPeerDataSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_peer_sample(&self, group: &str, teacher_id: &str) -> Result<PeerSample> {
        let entries = self
            .groups
            .get(group)
            .ok_or_else(|| AppError::PeerData(format!("unknown peer group '{}'", group)))?;

        let ratings: Vec<f64> = entries
            .iter()
            .filter(|entry| !entry.belongs_to(teacher_id))
            .map(PeerEntry::rating)
            .collect();

        non_empty(PeerSample::new(group, ratings))
    }
}

/// Peer-group service client: `GET {base_url}/peer-groups/{group}/ratings?exclude={teacher_id}`
pub struct HttpPeerDataSource {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct PeerRatingsResponse {
    ratings: Vec<f64>,
}

impl HttpPeerDataSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Configuration(format!("invalid peer_data.base_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration(format!(
                "peer_data.base_url {} cannot be a base URL",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn ratings_url(&self, group: &str, teacher_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["peer-groups", group, "ratings"]);
        }
        url.query_pairs_mut().append_pair("exclude", teacher_id);
        url
    }
}

#[async_trait]
impl PeerDataSource for HttpPeerDataSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_peer_sample(&self, group: &str, teacher_id: &str) -> Result<PeerSample> {
        let url = self.ratings_url(group, teacher_id);
        debug!(%url, "Fetching peer ratings");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::PeerData(format!(
                "peer service returned {} for group '{}'",
                response.status(),
                group
            )));
        }

        let body: PeerRatingsResponse = response.json().await?;
        non_empty(PeerSample::new(group, body.ratings))
    }
}

fn non_empty(sample: PeerSample) -> Result<PeerSample> {
    if sample.ratings.is_empty() {
        return Err(AppError::PeerData(format!(
            "peer group '{}' has no ratings",
            sample.group
        )));
    }
    Ok(sample)
}
