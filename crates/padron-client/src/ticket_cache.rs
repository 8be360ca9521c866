//! # Trust-Ticket Cache
//!
//! Keeps the current WSAA ticket in the shared cache under
//! `wsaa:ticket:<service>` and renews it on demand.
//!
//! ## Safe TTL
//!
//! A ticket is cached for `max(expires_at - now - margin, floor)`: the
//! margin (60s by default) keeps a ticket from being served right up to its
//! expiry, and the floor (30s) keeps a nearly-expired ticket cached briefly
//! instead of renewing on every call.
//!
//! ## Single Flight
//!
//! Each acquisition runs the external signer and a remote login, so at most
//! one acquisition per key is in flight. Cold-cache callers queue on an
//! async mutex and re-check the cache after taking it; only the first one
//! reaches the [`TicketSource`]. An in-process memo of the last ticket and
//! its deadline keeps the guarantee when the shared cache is down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::cache::{get_or_miss, set_or_log, CacheStore};
use crate::error::LookupError;
use crate::wsaa::TrustTicket;

/// Shared-cache value overwriting an invalidated ticket until renewal.
const TOMBSTONE: &str = "";
const TOMBSTONE_TTL: Duration = Duration::from_secs(5);

/// Something that can mint a fresh trust ticket.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// WSAA service the tickets are issued for.
    fn service(&self) -> &str;

    /// Perform one upstream acquisition.
    async fn acquire(&self) -> Result<TrustTicket, LookupError>;
}

/// Cache lifetime for a ticket expiring at `expires_at`.
pub fn safe_ttl(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    margin: Duration,
    floor: Duration,
) -> Duration {
    let remaining = (expires_at - now).num_seconds() - margin.as_secs() as i64;
    Duration::from_secs(remaining.max(floor.as_secs() as i64).max(0) as u64)
}

/// Shared-cache front for a [`TicketSource`].
pub struct TicketCache {
    source: Arc<dyn TicketSource>,
    cache: Arc<dyn CacheStore>,
    key: String,
    margin: Duration,
    floor: Duration,
    memo: Mutex<Option<(TrustTicket, DateTime<Utc>)>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TicketCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketCache")
            .field("key", &self.key)
            .field("margin", &self.margin)
            .field("floor", &self.floor)
            .finish_non_exhaustive()
    }
}

impl TicketCache {
    pub fn new(
        source: Arc<dyn TicketSource>,
        cache: Arc<dyn CacheStore>,
        margin: Duration,
        floor: Duration,
    ) -> Self {
        let key = format!("wsaa:ticket:{}", source.service());
        Self {
            source,
            cache,
            key,
            margin,
            floor,
            memo: Mutex::new(None),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Cache key the ticket is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Return a usable ticket, acquiring a new one if none is cached.
    pub async fn get_valid_ticket(&self) -> Result<TrustTicket, LookupError> {
        if let Some(ticket) = self.cached().await {
            return Ok(ticket);
        }

        let _guard = self.in_flight.lock().await;
        if let Some(ticket) = self.cached().await {
            tracing::debug!(key = %self.key, "ticket renewed by a concurrent caller");
            return Ok(ticket);
        }

        let ticket = self.source.acquire().await?;
        let now = Utc::now();
        let ttl = safe_ttl(ticket.expires_at, now, self.margin, self.floor);
        let deadline = now + chrono::Duration::seconds(ttl.as_secs() as i64);
        *self.memo.lock() = Some((ticket.clone(), deadline));

        match serde_json::to_string(&ticket) {
            Ok(json) => set_or_log(self.cache.as_ref(), &self.key, &json, ttl).await,
            Err(e) => tracing::warn!(key = %self.key, "cannot serialize ticket: {e}"),
        }
        tracing::info!(key = %self.key, ttl_secs = ttl.as_secs(), "cached new WSAA ticket");
        Ok(ticket)
    }

    /// Drop a ticket the provider refused from the memo and the shared
    /// cache, so the next call acquires a fresh one. A newer ticket already
    /// in place is left alone.
    pub async fn invalidate(&self, rejected: &TrustTicket) {
        let _guard = self.in_flight.lock().await;
        {
            let mut memo = self.memo.lock();
            if memo.as_ref().is_some_and(|(t, _)| t.token == rejected.token) {
                *memo = None;
            }
        }

        let shared_is_rejected = get_or_miss(self.cache.as_ref(), &self.key)
            .await
            .and_then(|raw| serde_json::from_str::<TrustTicket>(&raw).ok())
            .is_some_and(|t| t.token == rejected.token);
        if shared_is_rejected {
            set_or_log(self.cache.as_ref(), &self.key, TOMBSTONE, TOMBSTONE_TTL).await;
        }
        tracing::info!(key = %self.key, "invalidated rejected WSAA ticket");
    }

    async fn cached(&self) -> Option<TrustTicket> {
        let now = Utc::now();
        if let Some(ticket) = self.memoized(now) {
            return Some(ticket);
        }

        let raw = get_or_miss(self.cache.as_ref(), &self.key).await?;
        if raw == TOMBSTONE {
            return None;
        }
        match serde_json::from_str::<TrustTicket>(&raw) {
            Ok(ticket) if ticket.is_usable_at(now) => Some(ticket),
            Ok(_) => {
                tracing::debug!(key = %self.key, "cached ticket unusable, renewing");
                None
            }
            Err(e) => {
                tracing::warn!(key = %self.key, "discarding unparseable cached ticket: {e}");
                None
            }
        }
    }

    fn memoized(&self, now: DateTime<Utc>) -> Option<TrustTicket> {
        let memo = self.memo.lock();
        memo.as_ref()
            .filter(|(ticket, deadline)| *deadline > now && ticket.is_usable_at(now))
            .map(|(ticket, _)| ticket.clone())
    }
}
