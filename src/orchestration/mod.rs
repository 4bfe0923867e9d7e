//! Orchestration around the analytics engine
//!
//! The engine is pure computation. Everything with side effects lives here:
//! access control, peer sample lookup, report caching, audit and batch fan-out.

pub mod access;
pub mod audit;
pub mod cache;
pub mod peer_source;
pub mod service;

pub use access::{AccessPolicy, AccessRule, Caller, RoleBasedPolicy};
pub use audit::{AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use cache::{build_report_cache, CacheKey, MokaReportCache, NoopReportCache, ReportCache};
pub use peer_source::{
    build_peer_source, HttpPeerDataSource, PeerDataSource, PeerEntry, StaticPeerDataSource,
};
pub use service::{AnalysisRequest, AnalysisService, BatchItemResult, BatchOutcome};
