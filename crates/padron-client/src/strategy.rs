//! # Lookup Strategies
//!
//! The orchestrator talks to [`TaxIdLookup`], never to a transport. Three
//! implementations exist:
//!
//! - [`DirectRegistryStrategy`]: WSAA ticket (through [`TicketCache`]) plus
//!   the Padron A5 SOAP call.
//! - [`DelegatedApiStrategy`]: a third-party REST proxy keyed by an API key.
//! - [`FixtureStrategy`]: canned records for offline environments and tests.
//!
//! [`LookupStrategy`] is the closed set of the three, built once from the
//! configured [`Provider`]. `Ok(None)` means the registry has no such
//! taxpayer; it is an answer, not a failure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use padron_core::Cuit;
use serde::Deserialize;

use crate::cache::CacheStore;
use crate::config::{ConfigError, PadronConfig, Provider};
use crate::error::LookupError;
use crate::padron::{Activity, FiscalAddress, PersonaRecord, RegistryClient};
use crate::signer::CmsSigner;
use crate::ticket_cache::TicketCache;
use crate::wsaa::WsaaClient;
use crate::xml::excerpt;

/// Look up a taxpayer by validated identifier.
#[async_trait]
pub trait TaxIdLookup: Send + Sync {
    /// Short label recorded as the result source.
    fn name(&self) -> &str;

    /// Fetch the record, `Ok(None)` when the provider does not know it.
    async fn lookup_by_tax_id(&self, tax_id: &Cuit) -> Result<Option<PersonaRecord>, LookupError>;
}

// ── Direct registry ─────────────────────────────────────────────────────

/// WSAA + Padron A5.
#[derive(Debug)]
pub struct DirectRegistryStrategy {
    tickets: Arc<TicketCache>,
    registry: RegistryClient,
}

impl DirectRegistryStrategy {
    pub fn new(tickets: Arc<TicketCache>, registry: RegistryClient) -> Self {
        Self { tickets, registry }
    }

    /// Wire the ticket client, ticket cache and registry client from config.
    pub fn from_config(
        config: &PadronConfig,
        http: reqwest::Client,
        cache: Arc<dyn CacheStore>,
        signer: Arc<dyn CmsSigner>,
    ) -> Result<Self, ConfigError> {
        let represented = config
            .represented_cuit
            .clone()
            .ok_or(ConfigError::Missing("PADRON_REPRESENTED_CUIT"))?;
        let wsaa = WsaaClient::from_config(config, http.clone(), signer)?;
        let tickets = TicketCache::new(
            Arc::new(wsaa),
            cache,
            std::time::Duration::from_secs(config.ticket_margin_secs),
            std::time::Duration::from_secs(config.ticket_floor_secs),
        );
        let registry = RegistryClient::new(
            http,
            config.registry_url.clone(),
            represented,
            config.timeout().as_millis() as u64,
        );
        Ok(Self::new(Arc::new(tickets), registry))
    }

    /// The ticket cache backing this strategy.
    pub fn tickets(&self) -> &Arc<TicketCache> {
        &self.tickets
    }
}

#[async_trait]
impl TaxIdLookup for DirectRegistryStrategy {
    fn name(&self) -> &str {
        "padron-a5"
    }

    async fn lookup_by_tax_id(&self, tax_id: &Cuit) -> Result<Option<PersonaRecord>, LookupError> {
        let ticket = self.tickets.get_valid_ticket().await?;
        match self.registry.get_persona(&ticket, tax_id).await {
            Ok(record) => Ok(Some(record)),
            Err(LookupError::NotFound { .. }) => Ok(None),
            Err(e) => {
                if rejects_ticket(&e) {
                    tracing::warn!(cuit = %tax_id, "registry refused the trust ticket: {e}");
                    self.tickets.invalidate(&ticket).await;
                }
                Err(e)
            }
        }
    }
}

/// Whether a registry failure means the ticket itself was refused.
fn rejects_ticket(err: &LookupError) -> bool {
    match err {
        LookupError::Api {
            status: 401 | 403, ..
        } => true,
        LookupError::Fault { message, .. } => {
            let message = message.to_lowercase();
            ["token", "sign", "firma", "ticket"]
                .iter()
                .any(|word| message.contains(word))
        }
        _ => false,
    }
}

// ── Delegated REST proxy ────────────────────────────────────────────────

const DELEGATED_ENDPOINT: &str = "GET /persona";

/// Third-party REST proxy in front of the registry.
///
/// `GET {base}/persona/{cuit}` with the key in `X-Api-Key`. 404 is
/// "not found", 429 is [`LookupError::RateLimited`], any other failure is
/// a 502-class error.
#[derive(Debug, Clone)]
pub struct DelegatedApiStrategy {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl DelegatedApiStrategy {
    /// Build a client that sends `api_key` on every request.
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, ConfigError> {
        let mut key = reqwest::header::HeaderValue::from_str(api_key).map_err(|_| {
            ConfigError::InvalidValue {
                var: "PADRON_DELEGATED_API_KEY".into(),
                value: "[REDACTED]".into(),
            }
        })?;
        key.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert("X-Api-Key", key);
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn from_config(config: &PadronConfig) -> Result<Self, ConfigError> {
        let base = config
            .delegated_url
            .as_ref()
            .ok_or(ConfigError::Missing("PADRON_DELEGATED_URL"))?;
        let key = config
            .delegated_api_key
            .as_ref()
            .ok_or(ConfigError::Missing("PADRON_DELEGATED_API_KEY"))?;
        Self::new(base.as_str(), key.as_str(), config.timeout())
    }
}

#[async_trait]
impl TaxIdLookup for DelegatedApiStrategy {
    fn name(&self) -> &str {
        "delegated-api"
    }

    async fn lookup_by_tax_id(&self, tax_id: &Cuit) -> Result<Option<PersonaRecord>, LookupError> {
        let url = format!("{}/persona/{}", self.base_url, tax_id.as_str());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::from_send(DELEGATED_ENDPOINT, self.timeout_ms, e))?;

        let status = resp.status();
        match status.as_u16() {
            404 => return Ok(None),
            429 => {
                return Err(LookupError::RateLimited {
                    endpoint: DELEGATED_ENDPOINT.into(),
                })
            }
            _ if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(LookupError::Api {
                    endpoint: DELEGATED_ENDPOINT.into(),
                    status: status.as_u16(),
                    body: excerpt(&body),
                });
            }
            _ => {}
        }

        let body = resp
            .text()
            .await
            .map_err(|e| LookupError::from_send(DELEGATED_ENDPOINT, self.timeout_ms, e))?;
        let parsed: Option<DelegatedPersona> =
            serde_json::from_str(&body).map_err(|e| LookupError::MalformedResponse {
                endpoint: DELEGATED_ENDPOINT.into(),
                reason: format!("invalid JSON: {e}"),
            })?;
        let record = parsed.and_then(|p| p.into_record(tax_id));
        if record.is_none() {
            tracing::debug!(cuit = %tax_id, body = %excerpt(&body), "delegated API returned no taxpayer");
        }
        Ok(record)
    }
}

/// Proxy payload. Field names vary between proxy vendors.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DelegatedPersona {
    #[serde(alias = "cuit", alias = "idPersona", alias = "taxId")]
    tax_id: Option<String>,
    #[serde(alias = "razonSocial", alias = "razon_social", alias = "name")]
    legal_name: Option<String>,
    #[serde(
        alias = "condicionIva",
        alias = "condicion_iva",
        alias = "ivaCondition",
        alias = "iva_condition"
    )]
    fiscal_status: Option<String>,
    #[serde(alias = "estadoClave", alias = "estado")]
    key_status: Option<String>,
    #[serde(alias = "domicilioFiscal", alias = "domicilio", alias = "address")]
    fiscal_address: DelegatedAddress,
    #[serde(alias = "actividades")]
    activities: Vec<DelegatedActivity>,
    #[serde(alias = "impuestos")]
    taxes: Vec<String>,
    #[serde(alias = "regimenes")]
    regimes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DelegatedAddress {
    #[serde(alias = "calle", alias = "direccion")]
    street: String,
    #[serde(alias = "numero")]
    number: String,
    #[serde(alias = "piso")]
    floor: String,
    #[serde(alias = "depto", alias = "oficinaDptoLocal")]
    unit: String,
    #[serde(alias = "localidad", alias = "city")]
    locality: String,
    #[serde(alias = "provincia", alias = "descripcionProvincia", alias = "state")]
    province: String,
    #[serde(alias = "codPostal", alias = "codigoPostal", alias = "zip")]
    postal_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DelegatedActivity {
    #[serde(alias = "codigo", alias = "idActividad", alias = "id")]
    code: String,
    #[serde(alias = "descripcion", alias = "descripcionActividad")]
    description: String,
}

impl DelegatedPersona {
    /// `None` when the payload names no taxpayer at all, such as `{}` or an
    /// error object served with a 200.
    fn into_record(self, requested: &Cuit) -> Option<PersonaRecord> {
        if self.is_blank() {
            return None;
        }
        let a = self.fiscal_address;
        Some(PersonaRecord {
            tax_id: self
                .tax_id
                .and_then(|raw| padron_core::normalize(&raw))
                .unwrap_or_else(|| requested.as_str().to_string()),
            legal_name: self.legal_name.unwrap_or_default(),
            fiscal_status: self.fiscal_status.unwrap_or_default(),
            key_status: self.key_status.unwrap_or_default(),
            fiscal_address: FiscalAddress {
                street: a.street,
                number: a.number,
                floor: a.floor,
                unit: a.unit,
                locality: a.locality,
                province: a.province,
                postal_code: a.postal_code,
            },
            activities: self
                .activities
                .into_iter()
                .map(|act| Activity {
                    code: act.code,
                    description: act.description,
                })
                .collect(),
            taxes: self.taxes,
            regimes: self.regimes,
        })
    }

    fn is_blank(&self) -> bool {
        let a = &self.fiscal_address;
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        !filled(&self.tax_id)
            && !filled(&self.legal_name)
            && [&a.street, &a.number, &a.locality, &a.province, &a.postal_code]
                .iter()
                .all(|f| f.trim().is_empty())
            && self.activities.is_empty()
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────

/// Canned records keyed by the 11-digit identifier.
#[derive(Debug, Clone)]
pub struct FixtureStrategy {
    records: HashMap<String, PersonaRecord>,
}

impl Default for FixtureStrategy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FixtureStrategy {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// The built-in sample taxpayers.
    pub fn builtin() -> Self {
        builtin_records()
            .into_iter()
            .fold(Self::empty(), |table, record| table.with_record(record))
    }

    /// Built-in records overlaid with a JSON array of [`PersonaRecord`]s.
    ///
    /// Every record's `tax_id` must be a valid CUIT/CUIL.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let fail = |reason: String| ConfigError::Fixtures {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let records: Vec<PersonaRecord> =
            serde_json::from_str(&raw).map_err(|e| fail(e.to_string()))?;

        let mut table = Self::builtin();
        for mut record in records {
            let cuit = Cuit::new(&record.tax_id)
                .map_err(|e| fail(format!("record {:?}: {e}", record.tax_id)))?;
            record.tax_id = cuit.as_str().to_string();
            table = table.with_record(record);
        }
        tracing::debug!(path = %path.display(), records = table.len(), "fixture table loaded");
        Ok(table)
    }

    /// Add or replace one record.
    pub fn with_record(mut self, record: PersonaRecord) -> Self {
        self.records.insert(record.tax_id.clone(), record);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TaxIdLookup for FixtureStrategy {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn lookup_by_tax_id(&self, tax_id: &Cuit) -> Result<Option<PersonaRecord>, LookupError> {
        Ok(self.records.get(tax_id.as_str()).cloned())
    }
}

fn builtin_records() -> Vec<PersonaRecord> {
    let address = |street: &str, number: &str, locality: &str, province: &str, zip: &str| {
        FiscalAddress {
            street: street.into(),
            number: number.into(),
            locality: locality.into(),
            province: province.into(),
            postal_code: zip.into(),
            ..FiscalAddress::default()
        }
    };
    vec![
        PersonaRecord {
            tax_id: "20304050609".into(),
            legal_name: "PEREZ JUAN".into(),
            fiscal_status: "MONOTRIBUTO".into(),
            key_status: "ACTIVO".into(),
            fiscal_address: address("SAN MARTIN", "250", "CORDOBA", "CORDOBA", "5000"),
            activities: vec![Activity {
                code: "749009".into(),
                description: "SERVICIOS PROFESIONALES N.C.P.".into(),
            }],
            taxes: vec!["MONOTRIBUTO".into()],
            regimes: vec![],
        },
        PersonaRecord {
            tax_id: "30712345671".into(),
            legal_name: "EJEMPLO SERVICIOS SA".into(),
            fiscal_status: "IVA RESPONSABLE INSCRIPTO".into(),
            key_status: "ACTIVO".into(),
            fiscal_address: address(
                "AV CORRIENTES",
                "1234",
                "CIUDAD AUTONOMA BUENOS AIRES",
                "CIUDAD AUTONOMA BUENOS AIRES",
                "1043",
            ),
            activities: vec![Activity {
                code: "620200".into(),
                description: "SERVICIOS DE CONSULTORES EN INFORMATICA".into(),
            }],
            taxes: vec!["GANANCIAS SOCIEDADES".into(), "IVA".into()],
            regimes: vec![],
        },
        PersonaRecord {
            tax_id: "30500010912".into(),
            legal_name: "FUNDACION EJEMPLO".into(),
            fiscal_status: "IVA EXENTO".into(),
            key_status: "ACTIVO".into(),
            fiscal_address: address("BELGRANO", "845", "ROSARIO", "SANTA FE", "2000"),
            activities: vec![],
            taxes: vec!["IVA EXENTO".into()],
            regimes: vec![],
        },
        PersonaRecord {
            tax_id: "27123456780".into(),
            legal_name: "GOMEZ MARIA".into(),
            fiscal_status: String::new(),
            key_status: "ACTIVO".into(),
            fiscal_address: address("MITRE", "77", "MENDOZA", "MENDOZA", "5500"),
            activities: vec![],
            taxes: vec![],
            regimes: vec![],
        },
    ]
}

// ── Closed strategy set ─────────────────────────────────────────────────

/// The configured strategy, resolved once at construction.
#[derive(Debug)]
pub enum LookupStrategy {
    Direct(DirectRegistryStrategy),
    Delegated(DelegatedApiStrategy),
    Fixture(FixtureStrategy),
}

impl LookupStrategy {
    /// Build the strategy named by `config.provider`.
    ///
    /// `cache` backs the ticket cache and `signer` signs login requests;
    /// both are only used by the direct strategy.
    pub fn from_config(
        config: &PadronConfig,
        cache: Arc<dyn CacheStore>,
        signer: Arc<dyn CmsSigner>,
    ) -> Result<Self, ConfigError> {
        let strategy = match config.provider {
            Provider::Direct => Self::Direct(DirectRegistryStrategy::from_config(
                config,
                config.http_client()?,
                cache,
                signer,
            )?),
            Provider::Delegated => Self::Delegated(DelegatedApiStrategy::from_config(config)?),
            Provider::Fixture => Self::Fixture(match &config.fixtures_path {
                Some(path) => FixtureStrategy::from_file(path)?,
                None => FixtureStrategy::builtin(),
            }),
        };
        tracing::info!(strategy = strategy.name(), "lookup strategy selected");
        Ok(strategy)
    }

    fn inner(&self) -> &dyn TaxIdLookup {
        match self {
            Self::Direct(s) => s,
            Self::Delegated(s) => s,
            Self::Fixture(s) => s,
        }
    }
}

#[async_trait]
impl TaxIdLookup for LookupStrategy {
    fn name(&self) -> &str {
        self.inner().name()
    }

    async fn lookup_by_tax_id(&self, tax_id: &Cuit) -> Result<Option<PersonaRecord>, LookupError> {
        self.inner().lookup_by_tax_id(tax_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::signer::SigningCredentials;
    use std::io::Write;

    struct NoSigner;

    #[async_trait]
    impl CmsSigner for NoSigner {
        async fn sign(&self, _: &str, _: &SigningCredentials) -> Result<Vec<u8>, LookupError> {
            Err(LookupError::Signing {
                reason: "not available in tests".into(),
            })
        }
    }

    fn cuit(raw: &str) -> Cuit {
        Cuit::new(raw).unwrap()
    }

    #[test]
    fn builtin_fixture_ids_are_valid() {
        for record in builtin_records() {
            assert!(padron_core::is_valid(&record.tax_id), "{}", record.tax_id);
        }
    }

    #[tokio::test]
    async fn fixture_known_and_unknown() {
        let fixtures = FixtureStrategy::builtin();
        let hit = fixtures.lookup_by_tax_id(&cuit("20304050609")).await.unwrap();
        assert_eq!(hit.unwrap().legal_name, "PEREZ JUAN");
        let miss = fixtures.lookup_by_tax_id(&cuit("20999999999")).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn fixture_file_overlays_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"tax_id": "20-99999999-9", "legal_name": "NUEVO CONTRIBUYENTE", "fiscal_status": "RESPONSABLE INSCRIPTO"}}]"#
        )
        .unwrap();

        let fixtures = FixtureStrategy::from_file(file.path()).unwrap();
        assert_eq!(fixtures.len(), builtin_records().len() + 1);
        let record = fixtures
            .lookup_by_tax_id(&cuit("20999999999"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.tax_id, "20999999999");
        assert_eq!(record.fiscal_address, FiscalAddress::default());
    }

    #[test]
    fn fixture_file_rejects_bad_identifier() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"tax_id": "20304050600"}}]"#).unwrap();
        let err = FixtureStrategy::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Fixtures { .. }));
    }

    #[test]
    fn delegated_payload_accepts_aliases() {
        let json = r#"{
            "cuit": "30-71234567-1",
            "razonSocial": "EJEMPLO SERVICIOS SA",
            "condicionIva": "IVA RESPONSABLE INSCRIPTO",
            "domicilioFiscal": {"calle": "AV CORRIENTES", "numero": "1234", "codPostal": "1043"},
            "actividades": [{"codigo": "620200", "descripcion": "CONSULTORIA"}]
        }"#;
        let parsed: DelegatedPersona = serde_json::from_str(json).unwrap();
        let record = parsed.into_record(&cuit("30712345671")).unwrap();
        assert_eq!(record.tax_id, "30712345671");
        assert_eq!(record.legal_name, "EJEMPLO SERVICIOS SA");
        assert_eq!(record.fiscal_address.street, "AV CORRIENTES");
        assert_eq!(record.fiscal_address.postal_code, "1043");
        assert_eq!(record.activities[0].code, "620200");
    }

    #[test]
    fn delegated_blank_payload_is_no_record() {
        for json in [r#"{}"#, r#"{"error": "persona inexistente"}"#, r#"{"razonSocial": "  "}"#] {
            let parsed: DelegatedPersona = serde_json::from_str(json).unwrap();
            assert!(parsed.into_record(&cuit("20304050609")).is_none(), "{json}");
        }
    }

    #[test]
    fn ticket_refusals_are_recognized() {
        let fault = |message: &str| LookupError::Fault {
            endpoint: "getPersona".into(),
            message: message.into(),
        };
        assert!(rejects_ticket(&fault("Token expirado")));
        assert!(rejects_ticket(&fault("Firma inválida")));
        assert!(!rejects_ticket(&fault("No existe persona con ese Id")));
        assert!(rejects_ticket(&LookupError::Api {
            endpoint: "getPersona".into(),
            status: 401,
            body: String::new(),
        }));
        assert!(!rejects_ticket(&LookupError::Timeout {
            endpoint: "getPersona".into(),
            elapsed_ms: 10,
        }));
    }

    #[test]
    fn strategy_follows_provider() {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
        let signer: Arc<dyn CmsSigner> = Arc::new(NoSigner);

        let cfg = PadronConfig::local_mock("http://127.0.0.1:9", Provider::Fixture).unwrap();
        let s = LookupStrategy::from_config(&cfg, cache.clone(), signer.clone()).unwrap();
        assert_eq!(s.name(), "fixture");

        let cfg = PadronConfig::local_mock("http://127.0.0.1:9", Provider::Delegated).unwrap();
        let s = LookupStrategy::from_config(&cfg, cache.clone(), signer.clone()).unwrap();
        assert_eq!(s.name(), "delegated-api");

        let cfg = PadronConfig::local_mock("http://127.0.0.1:9", Provider::Direct).unwrap();
        let s = LookupStrategy::from_config(&cfg, cache, signer).unwrap();
        assert_eq!(s.name(), "padron-a5");
        match s {
            LookupStrategy::Direct(direct) => {
                assert_eq!(direct.tickets().key(), "wsaa:ticket:ws_sr_padron_a5")
            }
            other => panic!("expected direct strategy, got {other:?}"),
        }
    }

    #[test]
    fn direct_requires_represented_cuit() {
        let mut cfg = PadronConfig::local_mock("http://127.0.0.1:9", Provider::Direct).unwrap();
        cfg.represented_cuit = None;
        let err = LookupStrategy::from_config(
            &cfg,
            Arc::new(InMemoryCache::new()),
            Arc::new(NoSigner),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PADRON_REPRESENTED_CUIT")));
    }

    #[tokio::test]
    async fn signing_failure_surfaces_from_direct_strategy() {
        let cfg = PadronConfig::local_mock("http://127.0.0.1:9", Provider::Direct).unwrap();
        let direct = DirectRegistryStrategy::from_config(
            &cfg,
            cfg.http_client().unwrap(),
            Arc::new(InMemoryCache::new()),
            Arc::new(NoSigner),
        )
        .unwrap();
        let err = direct.lookup_by_tax_id(&cuit("20304050609")).await.unwrap_err();
        assert!(matches!(err, LookupError::Signing { .. }));
    }
}
