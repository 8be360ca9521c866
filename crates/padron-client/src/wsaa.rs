//! # WSAA Trust-Ticket Client
//!
//! Exchanges a signed login ticket request for a trust ticket (`token`,
//! `sign`, `expirationTime`) at the authority's `LoginCms` endpoint.
//!
//! ## Protocol
//!
//! 1. Build the TRA ([`LoginTicketRequest`]) and sign it through the
//!    configured [`CmsSigner`].
//! 2. Base64-encode the CMS envelope into `loginCms/in0` of a SOAP 1.1
//!    envelope and POST it as `text/xml` with `SOAPAction: loginCms`.
//! 3. A SOAP fault anywhere in the body is reported as
//!    [`LookupError::Fault`], whatever the HTTP status. The authority
//!    answers faults with HTTP 500, so the body is always read first.
//! 4. Otherwise `loginCmsReturn` holds an escaped XML document, parsed a
//!    second time to extract the credentials.
//!
//! ## Credential Shapes
//!
//! Three nestings have been seen in the wild and are all accepted:
//!
//! - `loginTicketResponse/credentials/{token,sign}` (current)
//! - a bare `credentials/{token,sign}` document
//! - `loginTicketResponse/{token,sign}` with no `credentials` wrapper
//!
//! `expirationTime` is read from wherever it appears (normally `header`).

use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigError, PadronConfig};
use crate::error::LookupError;
use crate::signer::{CmsSigner, LoginTicketRequest, SigningCredentials};
use crate::ticket_cache::TicketSource;
use crate::xml;

const ENDPOINT: &str = "loginCms";

/// WSAA service namespace.
const WSAA_NS: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";

/// Short-lived access ticket issued by WSAA.
///
/// Custom `Debug` implementation redacts `token` and `sign`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustTicket {
    pub token: String,
    pub sign: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl TrustTicket {
    /// Structurally valid: both token and sign are present.
    pub fn is_well_formed(&self) -> bool {
        !self.token.is_empty() && !self.sign.is_empty()
    }

    /// Well formed and not yet expired at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_well_formed() && self.expires_at > now
    }
}

impl std::fmt::Debug for TrustTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustTicket")
            .field("token", &"[REDACTED]")
            .field("sign", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("generated_at", &self.generated_at)
            .finish()
    }
}

/// Client for the WSAA `LoginCms` endpoint.
#[derive(Clone)]
pub struct WsaaClient {
    http: reqwest::Client,
    url: Url,
    service: String,
    signer: Arc<dyn CmsSigner>,
    credentials: SigningCredentials,
    timeout_ms: u64,
}

impl std::fmt::Debug for WsaaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsaaClient")
            .field("url", &self.url)
            .field("service", &self.service)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl WsaaClient {
    pub fn new(
        http: reqwest::Client,
        url: Url,
        service: impl Into<String>,
        signer: Arc<dyn CmsSigner>,
        credentials: SigningCredentials,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http,
            url,
            service: service.into(),
            signer,
            credentials,
            timeout_ms,
        }
    }

    /// Build from configuration, sharing `http` with the registry client.
    pub fn from_config(
        config: &PadronConfig,
        http: reqwest::Client,
        signer: Arc<dyn CmsSigner>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            http,
            config.wsaa_url.clone(),
            config.service.clone(),
            signer,
            config.signing_credentials()?,
            config.timeout().as_millis() as u64,
        ))
    }

    /// Request a fresh trust ticket.
    pub async fn login(&self) -> Result<TrustTicket, LookupError> {
        let tra = LoginTicketRequest::new(&self.service, Utc::now());
        let cms = self.signer.sign(&tra.to_xml(), &self.credentials).await?;
        let envelope = login_envelope(&BASE64_STANDARD.encode(cms));

        tracing::debug!(service = %self.service, url = %self.url, "requesting WSAA ticket");

        let resp = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", ENDPOINT)
            .body(envelope)
            .send()
            .await
            .map_err(|e| LookupError::from_send(ENDPOINT, self.timeout_ms, e))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| LookupError::from_send(ENDPOINT, self.timeout_ms, e))?;

        let ticket = parse_login_response(status, &body)?;
        tracing::info!(
            service = %self.service,
            expires_at = %ticket.expires_at,
            "acquired WSAA ticket"
        );
        Ok(ticket)
    }
}

#[async_trait]
impl TicketSource for WsaaClient {
    fn service(&self) -> &str {
        &self.service
    }

    async fn acquire(&self) -> Result<TrustTicket, LookupError> {
        self.login().await
    }
}

/// Render the `loginCms` SOAP envelope around a base64 CMS payload.
pub(crate) fn login_envelope(cms_base64: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{env}" xmlns:wsaa="{ns}">
  <soapenv:Header/>
  <soapenv:Body>
    <wsaa:loginCms>
      <wsaa:in0>{payload}</wsaa:in0>
    </wsaa:loginCms>
  </soapenv:Body>
</soapenv:Envelope>"#,
        env = xml::SOAP_ENV_NS,
        ns = WSAA_NS,
        payload = xml::escape(cms_base64),
    )
}

/// Interpret a `loginCms` response body.
pub fn parse_login_response(status: u16, body: &str) -> Result<TrustTicket, LookupError> {
    let doc = xml::parse_response(ENDPOINT, status, body)?;

    match xml::find(doc.root_element(), &["loginCmsReturn"]) {
        Some(ret) => {
            let inner = xml::text(ret).ok_or_else(|| LookupError::MalformedResponse {
                endpoint: ENDPOINT.into(),
                reason: "empty loginCmsReturn".into(),
            })?;
            let inner_doc = xml::parse(ENDPOINT, &inner)?;
            extract_ticket(inner_doc.root_element())
        }
        None => extract_ticket(doc.root_element()),
    }
}

fn extract_ticket(root: roxmltree::Node<'_, '_>) -> Result<TrustTicket, LookupError> {
    let credentials = xml::child(root, "credentials")
        .or_else(|| (root.tag_name().name() == "credentials").then_some(root))
        .or_else(|| xml::find(root, &["credentials"]))
        .unwrap_or(root);

    let token = xml::first_text(credentials, &["token"]).ok_or(LookupError::MissingCredentials {
        endpoint: ENDPOINT.into(),
        missing: "token",
    })?;
    let sign = xml::first_text(credentials, &["sign"]).ok_or(LookupError::MissingCredentials {
        endpoint: ENDPOINT.into(),
        missing: "sign",
    })?;

    let expires_at = xml::first_text(root, &["expirationTime"])
        .ok_or_else(|| LookupError::MalformedResponse {
            endpoint: ENDPOINT.into(),
            reason: "missing expirationTime".into(),
        })
        .and_then(|raw| parse_timestamp(&raw))?;
    let generated_at = xml::first_text(root, &["generationTime"])
        .and_then(|raw| parse_timestamp(&raw).ok());

    Ok(TrustTicket {
        token,
        sign,
        expires_at,
        generated_at,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LookupError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LookupError::MalformedResponse {
            endpoint: ENDPOINT.into(),
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}
