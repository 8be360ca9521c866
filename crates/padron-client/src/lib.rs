//! # padron-client -- Argentine taxpayer registry lookups
//!
//! Looks up taxpayer identity data by CUIT/CUIL and turns it into customer
//! records:
//! - **WSAA** trust tickets via a CMS-signed login request (`LoginCms`)
//! - **Padron A5** registry records via `getPersona`
//! - a **delegated** REST proxy, or **fixtures**, as drop-in alternatives
//!
//! ## Architecture
//!
//! ```text
//! Enricher ── result cache ── LookupStrategy
//!                               ├─ Direct:    TicketCache ── WsaaClient ── CmsSigner
//!                               │             RegistryClient
//!                               ├─ Delegated: DelegatedApiStrategy
//!                               └─ Fixture:   FixtureStrategy
//! ```
//!
//! Callers use [`Enricher::enrich_by_tax_id`] and only ever see
//! [`EnrichmentError`] (400 / 429 / 502). The shared key-value cache is
//! injected as an `Arc<dyn CacheStore>` and may be unavailable without
//! failing any lookup.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use padron_client::{Actor, Enricher, InMemoryCache, OpenSslCmsSigner, PadronConfig};
//!
//! let config = PadronConfig::from_env()?;
//! let signer = Arc::new(OpenSslCmsSigner::new(&config.openssl_bin, config.timeout()));
//! let enricher = Enricher::from_config(&config, Arc::new(InMemoryCache::new()), signer)?;
//! let _customer = enricher.enrich_by_tax_id("20-30405060-9", &Actor::new("ops")).await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod padron;
pub mod retry;
pub mod signer;
pub mod strategy;
pub mod ticket_cache;
pub mod wsaa;
pub(crate) mod xml;

pub use audit::{Actor, AuditOutcome, AuditRecord, AuditSink, TracingAuditSink};
pub use cache::{CacheError, CacheStore, InMemoryCache};
pub use config::{ConfigError, Environment, PadronConfig, Provider};
pub use enrichment::{CustomerAddress, CustomerRecord, EnrichmentError, EnrichmentStage, Enricher};
pub use error::LookupError;
pub use padron::{PersonaRecord, RegistryClient};
pub use retry::{Backoff, RetryPolicy, TokioBackoff};
pub use signer::{CmsSigner, OpenSslCmsSigner, SigningCredentials};
pub use strategy::{
    DelegatedApiStrategy, DirectRegistryStrategy, FixtureStrategy, LookupStrategy, TaxIdLookup,
};
pub use ticket_cache::{TicketCache, TicketSource};
pub use wsaa::{TrustTicket, WsaaClient};
