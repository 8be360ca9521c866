//! # padron-cli -- command-line front end for taxpayer lookups
//!
//! Provides the `padron` binary:
//!
//! - `padron validate` -- checksum-validate and classify a CUIT/CUIL offline.
//! - `padron ticket` -- acquire a WSAA trust ticket with the configured
//!   certificate and report its expiry.
//! - `padron lookup` -- run the full enrichment pipeline and print the
//!   customer record as JSON.
//!
//! Every remote setting comes from `PADRON_*` environment variables, see
//! [`padron_client::PadronConfig::from_env`].
//!
//! ```bash
//! padron validate 20-30405060-9
//! PADRON_PROVIDER=fixture padron lookup 30712345671 --actor ops
//! ```

pub mod lookup;
pub mod ticket;
pub mod validate;

use std::sync::Arc;

use padron_client::{OpenSslCmsSigner, PadronConfig};

/// Build the OpenSSL-backed signer described by `config`.
pub fn signer_from_config(config: &PadronConfig) -> Arc<OpenSslCmsSigner> {
    Arc::new(OpenSslCmsSigner::new(&config.openssl_bin, config.timeout()))
}
