//! Audit trail of analysis requests

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Completed,
    CacheHit,
    Denied,
    Failed,
}

/// Record that an analysis was requested and how it ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub role: String,
    pub teacher_id: String,
    pub outcome: AuditOutcome,
    pub record_count: usize,
    pub elapsed_ms: u64,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(
        actor: impl Into<String>,
        role: impl Into<String>,
        teacher_id: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            role: role.into(),
            teacher_id: teacher_id.into(),
            outcome,
            record_count: 0,
            elapsed_ms: 0,
            detail: None,
        }
    }

    pub fn with_record_count(mut self, record_count: usize) -> Self {
        self.record_count = record_count;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events to the `audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            event_id = %event.id,
            actor = %event.actor,
            role = %event.role,
            teacher_id = %event.teacher_id,
            outcome = ?event.outcome,
            records = event.record_count,
            elapsed_ms = event.elapsed_ms,
            detail = event.detail.as_deref().unwrap_or(""),
            "analysis audit"
        );
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, outcome: AuditOutcome) -> usize {
        self.events.lock().iter().filter(|e| e.outcome == outcome).count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
