//! Analysis service: authorization, caching, peer lookup and batch fan-out

use crate::analytics::{
    AnalysisOptions, AnalyticsEngine, PeerComparison, PeerSample, RatingRecord, StatisticsReport,
};
use crate::config::{Config, OrchestrationConfig};
use crate::error::{AppError, Result};
use crate::orchestration::access::{AccessPolicy, Caller, RoleBasedPolicy};
use crate::orchestration::audit::{AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::orchestration::cache::{build_report_cache, CacheKey, NoopReportCache, ReportCache};
use crate::orchestration::peer_source::{build_peer_source, PeerDataSource};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use validator::Validate;

/// One teacher's analysis request as received from the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnalysisRequest {
    #[validate(length(min = 1, max = 128))]
    pub teacher_id: String,

    pub evaluation_data: Vec<RatingRecord>,

    /// Falls back to the configured defaults when absent
    #[serde(default)]
    pub options: Option<AnalysisOptions>,
}

impl AnalysisRequest {
    pub fn new(teacher_id: impl Into<String>, evaluation_data: Vec<RatingRecord>) -> Self {
        Self {
            teacher_id: teacher_id.into(),
            evaluation_data,
            options: None,
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Per-item result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub teacher_id: String,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed { report: Box<StatisticsReport> },
    Failed { error_code: String, message: String },
}

impl BatchOutcome {
    fn from_result(result: Result<StatisticsReport>) -> Self {
        match result {
            Ok(report) => BatchOutcome::Completed {
                report: Box::new(report),
            },
            Err(e) => BatchOutcome::Failed {
                error_code: e.error_code().to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn report(&self) -> Option<&StatisticsReport> {
        match self {
            BatchOutcome::Completed { report } => Some(&**report),
            BatchOutcome::Failed { .. } => None,
        }
    }
}

/// Runs the analytics engine behind authorization, caching, peer lookup and audit
#[derive(Clone)]
pub struct AnalysisService {
    engine: Arc<AnalyticsEngine>,
    default_options: AnalysisOptions,
    orchestration: OrchestrationConfig,
    access: Arc<dyn AccessPolicy>,
    peers: Option<Arc<dyn PeerDataSource>>,
    cache: Arc<dyn ReportCache>,
    audit: Arc<dyn AuditSink>,
}

impl AnalysisService {
    /// Service with role-based access, no peer source, no cache and tracing audit
    pub fn new(
        engine: AnalyticsEngine,
        default_options: AnalysisOptions,
        orchestration: OrchestrationConfig,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            default_options,
            orchestration,
            access: Arc::new(RoleBasedPolicy::default()),
            peers: None,
            cache: Arc::new(NoopReportCache),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Wire every collaborator from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = AnalyticsEngine::new(config.analytics.engine_config())?;
        let mut service = Self::new(
            engine,
            config.analytics.default_options(),
            config.orchestration.clone(),
        )
        .with_access_policy(Arc::new(RoleBasedPolicy::from_config(&config.access)?))
        .with_cache(build_report_cache(&config.cache));

        if let Some(peers) = build_peer_source(&config.peer_data)? {
            service = service.with_peer_source(peers);
        }

        info!(
            peer_source = service.peers.as_ref().map(|p| p.name()).unwrap_or("none"),
            cache_enabled = config.cache.enabled,
            sub_score_handling = %service.engine.config().sub_score_handling,
            max_concurrent = config.orchestration.max_concurrent_analyses,
            "Analysis service initialized"
        );
        Ok(service)
    }

    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    pub fn with_peer_source(mut self, peers: Arc<dyn PeerDataSource>) -> Self {
        self.peers = Some(peers);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ReportCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Authorize, validate, serve from cache or compute, then audit.
    pub async fn analyze(
        &self,
        caller: &Caller,
        request: AnalysisRequest,
    ) -> Result<StatisticsReport> {
        let start = Instant::now();
        let teacher_id = request.teacher_id.clone();
        let record_count = request.evaluation_data.len();
        let audit = |outcome: AuditOutcome| {
            AuditEvent::new(&caller.user_id, &caller.role, &teacher_id, outcome)
                .with_record_count(record_count)
                .with_elapsed_ms(start.elapsed().as_millis() as u64)
        };

        if let Err(e) = self.access.authorize(caller, &teacher_id) {
            warn!(teacher_id = %teacher_id, user_id = %caller.user_id, "Analysis denied");
            self.audit.record(audit(AuditOutcome::Denied).with_detail(e.to_string()));
            return Err(e);
        }

        match self.run(request, start).await {
            Ok((report, cache_hit)) => {
                let outcome = if cache_hit {
                    AuditOutcome::CacheHit
                } else {
                    AuditOutcome::Completed
                };
                self.audit.record(audit(outcome));
                Ok(report)
            }
            Err(e) => {
                if e.is_client_error() {
                    warn!(
                        teacher_id = %teacher_id,
                        error_code = e.error_code(),
                        error = %e,
                        "Analysis rejected"
                    );
                } else {
                    error!(
                        teacher_id = %teacher_id,
                        error_code = e.error_code(),
                        error = %e,
                        "Analysis failed"
                    );
                }
                self.audit.record(audit(AuditOutcome::Failed).with_detail(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: AnalysisRequest,
        start: Instant,
    ) -> Result<(StatisticsReport, bool)> {
        request.validate()?;
        let options = request
            .options
            .unwrap_or_else(|| self.default_options.clone());
        options.validate()?;

        let teacher_id = request.teacher_id;
        let records = request.evaluation_data;

        let key = CacheKey::for_request(&teacher_id, &options, &records)?;
        if let Some(report) = self.cache.get(&key).await {
            info!(
                teacher_id = %teacher_id,
                records = records.len(),
                cache_hit = true,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Analysis served from cache"
            );
            return Ok((report.as_ref().clone(), true));
        }

        let peer = if records.is_empty() {
            Ok(None)
        } else {
            self.fetch_peers(&options.compare_with, &teacher_id).await
        };

        let engine = Arc::clone(&self.engine);
        let record_count = records.len();
        let engine_options = options.clone();
        let peer_sample = peer.as_ref().ok().cloned().flatten();
        let task = tokio::task::spawn_blocking(move || {
            engine.analyze(&records, &engine_options, peer_sample.as_ref())
        });

        let mut report = match timeout(self.orchestration.analysis_timeout(), task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(AppError::Internal(format!(
                    "analysis task aborted: {}",
                    join_error
                )))
            }
            Err(_) => {
                return Err(AppError::Timeout(format!(
                    "analysis of teacher {} exceeded {}s",
                    teacher_id, self.orchestration.analysis_timeout_secs
                )))
            }
        };

        // A report degraded by a failed peer fetch is not cached, so the next
        // request asks the source again
        match peer {
            Ok(_) => self.cache.put(key, Arc::new(report.clone())).await,
            Err(reason) => report.peer_comparison = PeerComparison::Unavailable { reason },
        }

        info!(
            teacher_id = %teacher_id,
            records = record_count,
            cache_hit = false,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis completed"
        );
        Ok((report, false))
    }

    /// `Ok(None)` without a configured source; `Err` carries the reason the sample is missing.
    async fn fetch_peers(
        &self,
        group: &str,
        teacher_id: &str,
    ) -> std::result::Result<Option<PeerSample>, String> {
        let Some(source) = &self.peers else {
            return Ok(None);
        };

        match timeout(
            self.orchestration.peer_fetch_timeout(),
            source.fetch_peer_sample(group, teacher_id),
        )
        .await
        {
            Ok(Ok(sample)) => {
                debug!(
                    group,
                    ratings = sample.ratings.len(),
                    source = source.name(),
                    "Peer sample fetched"
                );
                Ok(Some(sample))
            }
            Ok(Err(e)) => {
                warn!(group, source = source.name(), error = %e, "Peer fetch failed");
                Err(format!("Peer data unavailable: {}", e))
            }
            Err(_) => {
                warn!(
                    group,
                    source = source.name(),
                    timeout_secs = self.orchestration.peer_fetch_timeout_secs,
                    "Peer fetch timed out"
                );
                Err(format!(
                    "Peer data unavailable: fetch timed out after {}s",
                    self.orchestration.peer_fetch_timeout_secs
                ))
            }
        }
    }

    /// Analyze many teachers concurrently. Each item completes on its own and
    /// results come back in input order.
    pub async fn analyze_batch(
        &self,
        caller: &Caller,
        requests: Vec<AnalysisRequest>,
    ) -> Vec<BatchItemResult> {
        let start = Instant::now();
        let total = requests.len();
        let teacher_ids: Vec<String> = requests.iter().map(|r| r.teacher_id.clone()).collect();
        let limiter = Arc::new(Semaphore::new(self.orchestration.max_concurrent_analyses.max(1)));

        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let service = self.clone();
            let caller = caller.clone();
            let limiter = Arc::clone(&limiter);

            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(async move {
                    let _permit = limiter
                        .acquire_owned()
                        .await
                        .map_err(|e| AppError::Internal(format!("batch limiter closed: {}", e)))?;
                    service.analyze(&caller, request).await
                })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(AppError::Internal("analysis panicked".to_string())));

                (index, BatchOutcome::from_result(outcome))
            });
        }

        let mut outcomes: Vec<Option<BatchOutcome>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!(error = %e, "Batch task aborted"),
            }
        }

        let results: Vec<BatchItemResult> = teacher_ids
            .into_iter()
            .zip(outcomes)
            .map(|(teacher_id, outcome)| BatchItemResult {
                teacher_id,
                outcome: outcome.unwrap_or_else(|| BatchOutcome::Failed {
                    error_code: "INTERNAL_ERROR".to_string(),
                    message: "analysis task aborted".to_string(),
                }),
            })
            .collect();

        let failed = results
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Failed { .. }))
            .count();
        info!(
            total,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch analysis finished"
        );
        results
    }
}
