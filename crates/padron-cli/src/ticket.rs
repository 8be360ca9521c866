//! # Ticket CLI -- acquire a WSAA trust ticket.
//!
//! Useful for checking that the certificate, key, and `openssl` binary are
//! wired correctly before enabling the direct provider. The token and sign
//! values are never printed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use padron_client::{InMemoryCache, PadronConfig, TicketCache, WsaaClient};

/// Arguments for `padron ticket`.
#[derive(Args, Debug)]
pub struct TicketArgs {
    /// Override the WSAA service name (defaults to `PADRON_SERVICE`).
    #[arg(long)]
    pub service: Option<String>,
}

/// Execute `padron ticket`.
pub async fn run_ticket(args: &TicketArgs) -> Result<u8> {
    let mut config = PadronConfig::from_env().context("loading PADRON_* configuration")?;
    if let Some(service) = &args.service {
        config.service = service.clone();
    }

    let http = config.http_client()?;
    let wsaa = WsaaClient::from_config(&config, http, crate::signer_from_config(&config))?;
    let tickets = TicketCache::new(
        Arc::new(wsaa),
        Arc::new(InMemoryCache::new()),
        Duration::from_secs(config.ticket_margin_secs),
        Duration::from_secs(config.ticket_floor_secs),
    );

    let ticket = tickets
        .get_valid_ticket()
        .await
        .with_context(|| format!("acquiring ticket for service '{}'", config.service))?;

    println!(
        "ticket for {} ({}) valid until {}",
        config.service,
        config.environment.as_str(),
        ticket.expires_at.to_rfc3339()
    );
    Ok(0)
}
