//! Audit trail for enrichment lookups.
//!
//! Every completed `enrich_by_tax_id` call produces one [`AuditRecord`].
//! Sinks may fail; the orchestrator logs the failure and returns the lookup
//! result regardless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracing target of [`TracingAuditSink`].
pub const AUDIT_TARGET: &str = "padron::audit";

/// The caller on whose behalf a lookup is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// How a lookup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Found,
    NotFound,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
        }
    }
}

/// One audited lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: String,
    pub tax_id: String,
    pub timestamp: DateTime<Utc>,
    /// `cache` or the name of the lookup strategy.
    pub source: String,
    pub outcome: AuditOutcome,
}

impl AuditRecord {
    pub fn new(
        actor: &Actor,
        tax_id: impl Into<String>,
        source: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor.id.clone(),
            tax_id: tax_id.into(),
            timestamp: Utc::now(),
            source: source.into(),
            outcome,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink error: {0}")]
pub struct AuditError(pub String);

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Emits each record as an `info` event on the `padron::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: AUDIT_TARGET,
            audit_id = %record.id,
            actor = %record.actor_id,
            cuit = %record.tax_id,
            source = %record.source,
            outcome = record.outcome.as_str(),
            at = %record.timestamp,
            "tax id lookup"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_actor_and_source() {
        let record = AuditRecord::new(
            &Actor::new("user-42"),
            "20304050609",
            "cache",
            AuditOutcome::Found,
        );
        assert_eq!(record.actor_id, "user-42");
        assert_eq!(record.source, "cache");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "found");
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        let record = AuditRecord::new(&Actor::new("a"), "1", "fixture", AuditOutcome::NotFound);
        assert!(TracingAuditSink.record(record).await.is_ok());
    }
}
