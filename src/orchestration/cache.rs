//! Report cache keyed by teacher and request digest

use crate::analytics::{AnalysisOptions, RatingRecord, StatisticsReport};
use crate::config::CacheConfig;
use crate::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Identifies a computed report: the teacher plus a digest of options and ratings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub teacher_id: String,
    pub options_hash: String,
}

impl CacheKey {
    pub fn for_request(
        teacher_id: &str,
        options: &AnalysisOptions,
        records: &[RatingRecord],
    ) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(options)?);
        hasher.update(serde_json::to_vec(records)?);

        Ok(Self {
            teacher_id: teacher_id.to_string(),
            options_hash: format!("{:x}", hasher.finalize()),
        })
    }
}

#[async_trait]
pub trait ReportCache: Send + Sync + 'static {
    async fn get(&self, key: &CacheKey) -> Option<Arc<StatisticsReport>>;

    async fn put(&self, key: CacheKey, report: Arc<StatisticsReport>);
}

/// Build the cache selected in configuration
pub fn build_report_cache(config: &CacheConfig) -> Arc<dyn ReportCache> {
    if config.enabled {
        Arc::new(MokaReportCache::new(
            config.max_capacity,
            Duration::from_secs(config.ttl_secs),
        ))
    } else {
        Arc::new(NoopReportCache)
    }
}

/// In-process report cache with TTL and bounded capacity
#[derive(Clone)]
pub struct MokaReportCache {
    cache: Cache<CacheKey, Arc<StatisticsReport>>,
}

impl MokaReportCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key).await;
    }
}

#[async_trait]
impl ReportCache for MokaReportCache {
    async fn get(&self, key: &CacheKey) -> Option<Arc<StatisticsReport>> {
        self.cache.get(key).await
    }

    async fn put(&self, key: CacheKey, report: Arc<StatisticsReport>) {
        self.cache.insert(key, report).await;
    }
}

/// Cache that never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReportCache;

#[async_trait]
impl ReportCache for NoopReportCache {
    async fn get(&self, _key: &CacheKey) -> Option<Arc<StatisticsReport>> {
        None
    }

    async fn put(&self, _key: CacheKey, _report: Arc<StatisticsReport>) {}
}
