//! # Customer Enrichment
//!
//! [`Enricher::enrich_by_tax_id`] is the entry point the rest of the
//! application uses: give it a raw tax identifier, get back a
//! [`CustomerRecord`], `None` when the registry has no such taxpayer, or an
//! [`EnrichmentError`] carrying a 400 / 429 / 502 code.
//!
//! ## Stages
//!
//! ```text
//! VALIDATING -> CACHE_CHECK -> LOOKUP_ATTEMPT (x max_attempts) -> NORMALIZE -> CACHE_WRITE -> DONE
//!      |                               |
//!      v                               v
//!   REJECTED                      UNAVAILABLE
//! ```
//!
//! - An invalid identifier is rejected before any I/O and never retried.
//! - Results are cached under `padron:customer:<cuit>`; a hit is returned
//!   with `source = "cache"`.
//! - Each lookup attempt is bounded by a timeout. Failed attempts are
//!   retried with exponential backoff and jitter ([`RetryPolicy`]);
//!   `Ok(None)` is never retried and never cached.
//! - Once attempts run out the last error decides the code: 429 stays 429,
//!   everything else is 502. The underlying error only survives as text.
//! - Cache and audit failures are logged and otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use padron_core::{normalize_fiscal_status, Cuit, DocType, IvaCondition, ValidationError};
use serde::{Deserialize, Serialize};

use crate::audit::{Actor, AuditOutcome, AuditRecord, AuditSink, TracingAuditSink};
use crate::cache::{get_or_miss, set_or_log, CacheStore};
use crate::config::{ConfigError, PadronConfig};
use crate::error::LookupError;
use crate::padron::PersonaRecord;
use crate::retry::{Backoff, RetryPolicy, TokioBackoff};
use crate::signer::CmsSigner;
use crate::strategy::{LookupStrategy, TaxIdLookup};

/// Source label of a record served from the result cache.
pub const CACHE_SOURCE: &str = "cache";

/// Cache key of the enrichment result for `cuit`.
pub fn result_cache_key(cuit: &Cuit) -> String {
    format!("padron:customer:{}", cuit.as_str())
}

/// Errors surfaced to callers of [`Enricher::enrich_by_tax_id`].
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    /// The identifier failed format or checksum validation.
    #[error("invalid tax id {input:?}: {source}")]
    InvalidInput {
        input: String,
        source: ValidationError,
    },

    /// The provider was still throttling when attempts ran out.
    #[error("lookup of {tax_id} rate limited after {attempts} attempts")]
    RateLimited { tax_id: String, attempts: u32 },

    /// The provider could not answer.
    #[error("lookup of {tax_id} failed after {attempts} attempts: {reason}")]
    ProviderUnavailable {
        tax_id: String,
        attempts: u32,
        reason: String,
    },
}

impl EnrichmentError {
    /// HTTP-equivalent status code.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::RateLimited { .. } => 429,
            Self::ProviderUnavailable { .. } => 502,
        }
    }
}

/// Where a call is in the enrichment pipeline. Used as a tracing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStage {
    Validating,
    CacheCheck,
    LookupAttempt,
    Normalize,
    CacheWrite,
    Done,
    Rejected,
    Unavailable,
}

impl EnrichmentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::CacheCheck => "cache_check",
            Self::LookupAttempt => "lookup_attempt",
            Self::Normalize => "normalize",
            Self::CacheWrite => "cache_write",
            Self::Done => "done",
            Self::Rejected => "rejected",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for EnrichmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Postal address in the shape customer records use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Enriched customer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub doc_type: DocType,
    /// Normalized 11-digit identifier, always equal to the looked-up one.
    pub doc_number: String,
    pub name: String,
    pub iva_condition: IvaCondition,
    pub address: CustomerAddress,
    /// Strategy name, or `cache` when served from the result cache.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// Build from a registry record.
    ///
    /// The IVA condition falls back to consumidor final when the provider's
    /// text matches no known category.
    pub fn from_persona(
        cuit: &Cuit,
        persona: PersonaRecord,
        source: &str,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let iva_condition = normalize_fiscal_status(&persona.fiscal_status)
            .unwrap_or(IvaCondition::ConsumidorFinal);
        let a = persona.fiscal_address;
        let street = [a.street, a.number, a.floor, a.unit]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            doc_type: cuit.doc_type(),
            doc_number: cuit.as_str().to_string(),
            name: persona.legal_name,
            iva_condition,
            address: CustomerAddress {
                street,
                city: a.locality,
                state: a.province,
                zip: a.postal_code,
            },
            source: source.to_string(),
            fetched_at,
        }
    }
}

/// Cached, retrying lookup of customer identities by tax id.
pub struct Enricher {
    lookup: Arc<dyn TaxIdLookup>,
    cache: Arc<dyn CacheStore>,
    audit: Arc<dyn AuditSink>,
    backoff: Arc<dyn Backoff>,
    retry: RetryPolicy,
    result_ttl: Duration,
    attempt_timeout: Duration,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("lookup", &self.lookup.name())
            .field("retry", &self.retry)
            .field("result_ttl", &self.result_ttl)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl Enricher {
    /// Enricher with default retry, TTL (1h), attempt timeout (15s), tokio
    /// backoff and the tracing audit sink.
    pub fn new(lookup: Arc<dyn TaxIdLookup>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            lookup,
            cache,
            audit: Arc::new(TracingAuditSink),
            backoff: Arc::new(TokioBackoff),
            retry: RetryPolicy::default(),
            result_ttl: Duration::from_secs(3600),
            attempt_timeout: Duration::from_secs(15),
        }
    }

    /// Build the configured strategy and apply the configured tuning.
    pub fn from_config(
        config: &PadronConfig,
        cache: Arc<dyn CacheStore>,
        signer: Arc<dyn CmsSigner>,
    ) -> Result<Self, ConfigError> {
        let strategy = LookupStrategy::from_config(config, cache.clone(), signer)?;
        // One direct attempt may sign, log in and query, each with its own timeout.
        let attempt_timeout = config.timeout().saturating_mul(3);
        Ok(Self::new(Arc::new(strategy), cache)
            .with_retry(config.retry.clone())
            .with_result_ttl(Duration::from_secs(config.result_ttl_secs))
            .with_attempt_timeout(attempt_timeout))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Name of the lookup strategy in use.
    pub fn strategy_name(&self) -> &str {
        self.lookup.name()
    }

    /// Look up and normalize the taxpayer identified by `raw`.
    ///
    /// # Errors
    ///
    /// - [`EnrichmentError::InvalidInput`] (400) for a malformed identifier,
    ///   before any I/O.
    /// - [`EnrichmentError::RateLimited`] (429) when the last attempt was
    ///   throttled.
    /// - [`EnrichmentError::ProviderUnavailable`] (502) for every other
    ///   failure.
    pub async fn enrich_by_tax_id(
        &self,
        raw: &str,
        actor: &Actor,
    ) -> Result<Option<CustomerRecord>, EnrichmentError> {
        tracing::trace!(stage = %EnrichmentStage::Validating, actor = %actor.id);
        let cuit = Cuit::new(raw).map_err(|source| {
            tracing::debug!(stage = %EnrichmentStage::Rejected, "invalid tax id: {source}");
            EnrichmentError::InvalidInput {
                input: raw.to_string(),
                source,
            }
        })?;

        let key = result_cache_key(&cuit);
        tracing::trace!(stage = %EnrichmentStage::CacheCheck, cuit = %cuit);
        if let Some(mut hit) = self.cached(&key).await {
            hit.source = CACHE_SOURCE.to_string();
            self.audit(actor, &cuit, CACHE_SOURCE, AuditOutcome::Found).await;
            tracing::debug!(stage = %EnrichmentStage::Done, cuit = %cuit, "served from cache");
            return Ok(Some(hit));
        }

        let source = self.lookup.name().to_string();
        let persona = match self.lookup_with_retry(&cuit).await {
            Ok(Some(persona)) => persona,
            Ok(None) => {
                self.audit(actor, &cuit, &source, AuditOutcome::NotFound).await;
                tracing::info!(stage = %EnrichmentStage::Done, cuit = %cuit, "no registry record");
                return Ok(None);
            }
            Err(e) => {
                self.audit(actor, &cuit, &source, AuditOutcome::Failed).await;
                return Err(e);
            }
        };

        tracing::trace!(stage = %EnrichmentStage::Normalize, cuit = %cuit);
        let record = CustomerRecord::from_persona(&cuit, persona, &source, Utc::now());

        tracing::trace!(stage = %EnrichmentStage::CacheWrite, cuit = %cuit);
        match serde_json::to_string(&record) {
            Ok(json) => set_or_log(self.cache.as_ref(), &key, &json, self.result_ttl).await,
            Err(e) => tracing::warn!(cuit = %cuit, "cannot serialize customer record: {e}"),
        }

        self.audit(actor, &cuit, &source, AuditOutcome::Found).await;
        tracing::info!(
            stage = %EnrichmentStage::Done,
            cuit = %cuit,
            source = %source,
            iva = %record.iva_condition,
            "customer enriched"
        );
        Ok(Some(record))
    }

    async fn cached(&self, key: &str) -> Option<CustomerRecord> {
        let raw = get_or_miss(self.cache.as_ref(), key).await?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(key, "discarding unparseable cached record: {e}");
                None
            }
        }
    }

    async fn lookup_with_retry(
        &self,
        cuit: &Cuit,
    ) -> Result<Option<PersonaRecord>, EnrichmentError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            if attempts > 0 {
                self.backoff.pause(self.retry.delay_for(attempts - 1)).await;
            }
            attempts += 1;
            tracing::debug!(
                stage = %EnrichmentStage::LookupAttempt,
                cuit = %cuit,
                attempt = attempts,
                max_attempts
            );

            let result =
                match tokio::time::timeout(self.attempt_timeout, self.lookup.lookup_by_tax_id(cuit))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LookupError::Timeout {
                        endpoint: self.lookup.name().to_string(),
                        elapsed_ms: self.attempt_timeout.as_millis() as u64,
                    }),
                };

            match result {
                Ok(found) => return Ok(found),
                Err(LookupError::NotFound { .. }) => return Ok(None),
                Err(e) if !e.is_retryable() => {
                    tracing::error!(cuit = %cuit, attempt = attempts, "lookup failed, not retrying: {e}");
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        cuit = %cuit,
                        attempt = attempts,
                        max_attempts,
                        status = e.status(),
                        "lookup attempt failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        tracing::warn!(stage = %EnrichmentStage::Unavailable, cuit = %cuit, attempts);
        let tax_id = cuit.as_str().to_string();
        Err(match last_error {
            Some(e) if e.status() == 429 => EnrichmentError::RateLimited { tax_id, attempts },
            Some(e) => EnrichmentError::ProviderUnavailable {
                tax_id,
                attempts,
                reason: e.to_string(),
            },
            None => EnrichmentError::ProviderUnavailable {
                tax_id,
                attempts,
                reason: "no attempt was made".into(),
            },
        })
    }

    async fn audit(&self, actor: &Actor, cuit: &Cuit, source: &str, outcome: AuditOutcome) {
        let record = AuditRecord::new(actor, cuit.as_str(), source, outcome);
        if let Err(e) = self.audit.record(record).await {
            tracing::warn!(cuit = %cuit, "failed to record audit event: {e}");
        }
    }
}
