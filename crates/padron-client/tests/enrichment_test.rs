//! End-to-end tests for Enricher built from configuration, with every
//! remote endpoint served by wiremock.

use std::sync::Arc;

use async_trait::async_trait;
use padron_client::{
    Actor, CmsSigner, Enricher, InMemoryCache, LookupError, PadronConfig, Provider,
    SigningCredentials,
};
use padron_core::{DocType, IvaCondition};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FakeSigner;

#[async_trait]
impl CmsSigner for FakeSigner {
    async fn sign(&self, _: &str, _: &SigningCredentials) -> Result<Vec<u8>, LookupError> {
        Ok(b"cms".to_vec())
    }
}

struct MissingOpenSsl;

#[async_trait]
impl CmsSigner for MissingOpenSsl {
    async fn sign(&self, _: &str, _: &SigningCredentials) -> Result<Vec<u8>, LookupError> {
        Err(LookupError::Signing {
            reason: "cannot start openssl: No such file or directory".into(),
        })
    }
}

fn enricher(server: &MockServer, provider: Provider, signer: Arc<dyn CmsSigner>) -> Enricher {
    let config = PadronConfig::local_mock(&server.uri(), provider).unwrap();
    Enricher::from_config(&config, Arc::new(InMemoryCache::new()), signer).unwrap()
}

fn actor() -> Actor {
    Actor::new("backoffice-1")
}

#[tokio::test]
async fn delegated_recovers_after_two_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/persona/20304050609"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/persona/20304050609"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cuit": "20304050609",
            "razonSocial": "PEREZ JUAN",
            "condicionIva": "RESPONSABLE MONOTRIBUTO",
            "domicilio": {"calle": "SAN MARTIN", "numero": "250", "localidad": "CORDOBA",
                          "provincia": "CORDOBA", "codPostal": "5000"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let enricher = enricher(&server, Provider::Delegated, Arc::new(FakeSigner));
    let record = enricher
        .enrich_by_tax_id("20-30405060-9", &actor())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.doc_type, DocType::Cuil);
    assert_eq!(record.doc_number, "20304050609");
    assert_eq!(record.iva_condition, IvaCondition::Monotributo);
    assert_eq!(record.address.street, "SAN MARTIN 250");
    assert_eq!(record.address.city, "CORDOBA");
    assert_eq!(record.address.zip, "5000");
    assert_eq!(record.source, "delegated-api");

    // Served from the result cache; the mocks' expectations stay satisfied.
    let again = enricher
        .enrich_by_tax_id("20304050609", &actor())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.source, "cache");
}

#[tokio::test]
async fn delegated_rate_limit_exhaustion_is_429() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/persona/20304050609"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = enricher(&server, Provider::Delegated, Arc::new(FakeSigner))
        .enrich_by_tax_id("20304050609", &actor())
        .await
        .unwrap_err();
    assert_eq!(err.code(), 429);
}

#[tokio::test]
async fn delegated_unknown_taxpayer_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/persona/20304050609"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let enricher = enricher(&server, Provider::Delegated, Arc::new(FakeSigner));
    for _ in 0..2 {
        let result = enricher
            .enrich_by_tax_id("20304050609", &actor())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}

#[tokio::test]
async fn invalid_input_makes_no_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = enricher(&server, Provider::Delegated, Arc::new(FakeSigner))
        .enrich_by_tax_id("123", &actor())
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
}

#[tokio::test]
async fn direct_provider_end_to_end() {
    let server = MockServer::start().await;

    let expires = (chrono::Utc::now() + chrono::Duration::hours(12)).to_rfc3339();
    let ticket = format!(
        "&lt;loginTicketResponse&gt;&lt;header&gt;&lt;expirationTime&gt;{expires}&lt;/expirationTime&gt;\
         &lt;/header&gt;&lt;credentials&gt;&lt;token&gt;T&lt;/token&gt;&lt;sign&gt;S&lt;/sign&gt;\
         &lt;/credentials&gt;&lt;/loginTicketResponse&gt;"
    );
    Mock::given(method("POST"))
        .and(path("/ws/services/LoginCms"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<Envelope><Body><loginCmsResponse><loginCmsReturn>{ticket}</loginCmsReturn>\
             </loginCmsResponse></Body></Envelope>"
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sr-padron/webservices/personaServiceA5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<Envelope><Body><getPersonaResponse><personaReturn><datosGenerales>\
             <idPersona>30712345671</idPersona><razonSocial>EJEMPLO SERVICIOS SA</razonSocial>\
             <domicilioFiscal><direccion>AV CORRIENTES 1234</direccion><codPostal>1043</codPostal>\
             </domicilioFiscal></datosGenerales><datosRegimenGeneral><impuesto>\
             <descripcionImpuesto>IVA</descripcionImpuesto></impuesto></datosRegimenGeneral>\
             </personaReturn></getPersonaResponse></Body></Envelope>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let record = enricher(&server, Provider::Direct, Arc::new(FakeSigner))
        .enrich_by_tax_id("30712345671", &actor())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.doc_type, DocType::Cuit);
    assert_eq!(record.name, "EJEMPLO SERVICIOS SA");
    assert_eq!(record.iva_condition, IvaCondition::ResponsableInscripto);
    assert_eq!(record.address.street, "AV CORRIENTES 1234");
    assert_eq!(record.source, "padron-a5");
}

#[tokio::test]
async fn direct_provider_without_signer_is_502_after_one_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = enricher(&server, Provider::Direct, Arc::new(MissingOpenSsl))
        .enrich_by_tax_id("30712345671", &actor())
        .await
        .unwrap_err();
    assert_eq!(err.code(), 502);
    assert!(err.to_string().contains("after 1 attempts"));
}

#[tokio::test]
async fn fixture_provider_needs_no_network() {
    let server = MockServer::start().await;
    let enricher = enricher(&server, Provider::Fixture, Arc::new(FakeSigner));

    let record = enricher
        .enrich_by_tax_id("30500010912", &actor())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.iva_condition, IvaCondition::Exento);
    assert_eq!(record.source, "fixture");

    let unknown = enricher
        .enrich_by_tax_id("20999999999", &actor())
        .await
        .unwrap();
    assert!(unknown.is_none());
}
