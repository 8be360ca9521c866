//! Lookup error types.
//!
//! [`LookupError`] is the internal error of every remote step (signing,
//! ticket login, registry query, delegated API). Each variant maps onto an
//! HTTP-equivalent status via [`LookupError::status`] and declares whether
//! the orchestrator may retry it. Callers of the public entry point only
//! ever see [`crate::enrichment::EnrichmentError`].

/// Errors from a single remote lookup step.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The external signing step failed or is not available.
    #[error("CMS signing failed: {reason}")]
    Signing { reason: String },

    /// HTTP transport error with no usable response.
    #[error("HTTP error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The remote call did not complete in time.
    #[error("{endpoint} timed out after {elapsed_ms}ms")]
    Timeout { endpoint: String, elapsed_ms: u64 },

    /// The provider answered with a SOAP fault.
    #[error("{endpoint} returned a SOAP fault: {message}")]
    Fault { endpoint: String, message: String },

    /// The login response parsed but carried no token or sign.
    #[error("{endpoint} response is missing {missing}")]
    MissingCredentials {
        endpoint: String,
        missing: &'static str,
    },

    /// The response body could not be interpreted.
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// The provider returned a non-success status without a fault body.
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The provider throttled the request.
    #[error("{endpoint} rate limited the request")]
    RateLimited { endpoint: String },

    /// The registry has no record for the identifier.
    #[error("no registry record for {tax_id}")]
    NotFound { tax_id: String },
}

impl LookupError {
    /// HTTP-equivalent status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Signing { .. } => 500,
            Self::RateLimited { .. } => 429,
            Self::NotFound { .. } => 404,
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::Fault { .. }
            | Self::MissingCredentials { .. }
            | Self::MalformedResponse { .. }
            | Self::Api { .. } => 502,
        }
    }

    /// Whether a later attempt could succeed.
    ///
    /// Signing failures need operator action; a missing
    /// record is an answer, not a failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Signing { .. } | Self::NotFound { .. })
    }

    /// Map a `reqwest` send error onto `Timeout` or `Transport`.
    pub(crate) fn from_send(endpoint: &str, timeout_ms: u64, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
                elapsed_ms: timeout_ms,
            }
        } else {
            Self::Transport {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }
}
