//! # Lookup CLI -- enrich a customer by tax ID.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use padron_client::{Actor, Enricher, InMemoryCache, PadronConfig};

/// Arguments for `padron lookup`.
#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Tax ID to look up.
    pub tax_id: String,

    /// Identity recorded in the audit trail for this lookup.
    #[arg(long, default_value = "cli")]
    pub actor: String,
}

/// Execute `padron lookup`.
///
/// Prints the customer record as pretty JSON. Exit codes: 0 found,
/// 2 unknown taxpayer; lookup failures surface as errors carrying their
/// 400/429/502 classification.
pub async fn run_lookup(args: &LookupArgs) -> Result<u8> {
    let config = PadronConfig::from_env().context("loading PADRON_* configuration")?;
    let signer = crate::signer_from_config(&config);
    let enricher = Enricher::from_config(&config, Arc::new(InMemoryCache::new()), signer)?;

    tracing::info!(strategy = enricher.strategy_name(), "looking up taxpayer");

    let actor = Actor::new(args.actor.clone());
    match enricher.enrich_by_tax_id(&args.tax_id, &actor).await {
        Ok(Some(record)) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        Ok(None) => {
            eprintln!("no taxpayer registered under {}", args.tax_id);
            Ok(2)
        }
        Err(e) => Err(anyhow::anyhow!("[{}] {e}", e.code())),
    }
}
