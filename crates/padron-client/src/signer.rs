//! # Login Ticket Request and CMS Signing
//!
//! WSAA authenticates callers with a *login ticket request* (TRA): a small
//! XML document naming the target service and a validity window, signed as
//! a CMS (PKCS#7) envelope with the caller's X.509 certificate.
//!
//! ## Validity Window
//!
//! `generationTime` is set 60 seconds in the past to tolerate clock skew
//! between this host and the authority; `expirationTime` is 12 hours
//! ahead. `uniqueId` is the current Unix time in seconds.
//!
//! ## Signing Capability
//!
//! Signing is behind the [`CmsSigner`] trait. [`OpenSslCmsSigner`] shells
//! out to `openssl cms`; tests substitute a fake. A failing signer is a
//! configuration problem, reported as [`LookupError::Signing`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;

use crate::error::LookupError;
use crate::xml::escape;

/// Clock-skew allowance applied to `generationTime`, in seconds.
pub const GENERATION_SKEW_SECS: i64 = 60;

/// Requested lifetime of the login ticket, in seconds.
pub const REQUEST_LIFETIME_SECS: i64 = 12 * 60 * 60;

/// The TRA document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicketRequest {
    pub unique_id: u32,
    pub generation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub service: String,
}

impl LoginTicketRequest {
    /// Build a request for `service` anchored at `now`.
    pub fn new(service: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            unique_id: now.timestamp().clamp(0, i64::from(u32::MAX)) as u32,
            generation_time: now - chrono::Duration::seconds(GENERATION_SKEW_SECS),
            expiration_time: now + chrono::Duration::seconds(REQUEST_LIFETIME_SECS),
            service: service.into(),
        }
    }

    /// Render the TRA as XML.
    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<loginTicketRequest version="1.0">
  <header>
    <uniqueId>{unique_id}</uniqueId>
    <generationTime>{generation}</generationTime>
    <expirationTime>{expiration}</expirationTime>
  </header>
  <service>{service}</service>
</loginTicketRequest>
"#,
            unique_id = self.unique_id,
            generation = self.generation_time.to_rfc3339_opts(SecondsFormat::Secs, false),
            expiration = self.expiration_time.to_rfc3339_opts(SecondsFormat::Secs, false),
            service = escape(&self.service),
        )
    }
}

/// Certificate and private key used to sign the TRA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCredentials {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Produces a CMS signature envelope over a document.
#[async_trait]
pub trait CmsSigner: Send + Sync {
    /// Sign `document`, returning the DER-encoded CMS envelope.
    async fn sign(
        &self,
        document: &str,
        credentials: &SigningCredentials,
    ) -> Result<Vec<u8>, LookupError>;
}

/// [`CmsSigner`] that runs `openssl cms -sign` as a child process.
///
/// The document is written to the child's stdin and the DER envelope read
/// from stdout. The child is killed if the call times out or is dropped.
#[derive(Debug, Clone)]
pub struct OpenSslCmsSigner {
    binary: PathBuf,
    timeout: Duration,
}

impl OpenSslCmsSigner {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(
        &self,
        document: &str,
        credentials: &SigningCredentials,
    ) -> Result<Vec<u8>, LookupError> {
        let mut child = tokio::process::Command::new(&self.binary)
            .arg("cms")
            .arg("-sign")
            .arg("-signer")
            .arg(&credentials.cert_path)
            .arg("-inkey")
            .arg(&credentials.key_path)
            .args(["-nodetach", "-binary", "-outform", "DER"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LookupError::Signing {
                reason: format!("cannot start {}: {e}", self.binary.display()),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(document.as_bytes())
                .await
                .map_err(|e| LookupError::Signing {
                    reason: format!("writing TRA to signer: {e}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LookupError::Signing {
                reason: format!("waiting for signer: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LookupError::Signing {
                reason: format!("signer exited with {}: {}", output.status, stderr.trim()),
            });
        }
        if output.stdout.is_empty() {
            return Err(LookupError::Signing {
                reason: "signer produced no output".into(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl CmsSigner for OpenSslCmsSigner {
    async fn sign(
        &self,
        document: &str,
        credentials: &SigningCredentials,
    ) -> Result<Vec<u8>, LookupError> {
        match tokio::time::timeout(self.timeout, self.run(document, credentials)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Signing {
                reason: format!("signer timed out after {}ms", self.timeout.as_millis()),
            }),
        }
    }
}
