//! # Padron A5 Registry Client
//!
//! Queries the taxpayer registry's `getPersona` operation with a WSAA
//! ticket and normalizes the answer into a [`PersonaRecord`].
//!
//! ## Request
//!
//! SOAP 1.1 envelope carrying `token`, `sign`, `cuitRepresentada` (the
//! party the query is made on behalf of) and `idPersona`, POSTed with
//! `SOAPAction: getPersona`.
//!
//! ## Response Handling
//!
//! - A SOAP fault is [`LookupError::Fault`] regardless of HTTP status.
//! - A missing or empty `personaReturn` is [`LookupError::NotFound`], as is
//!   a return that only carries `errorConstancia`.
//! - Anything else is read into a [`RawPersonaRecord`] and normalized.
//!
//! ## Field Variants
//!
//! The provider has shipped several names for the same logical field over
//! the years (`calle` / `descCalle` / `direccion` for the street, and so
//! on). Each logical field has a [`FieldAliases`] list that is tried in
//! order; the first non-empty element wins.

use chrono::Utc;
use padron_core::Cuit;
use roxmltree::Node;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LookupError;
use crate::wsaa::TrustTicket;
use crate::xml;

const ENDPOINT: &str = "getPersona";

/// Padron A5 service namespace.
const A5_NS: &str = "http://a5.soap.ws.server.puc.sr/";

/// Ordered candidate element names for one logical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAliases(pub &'static [&'static str]);

impl FieldAliases {
    /// First non-empty value at or below `node`.
    pub(crate) fn read(&self, node: Node<'_, '_>) -> Option<String> {
        xml::first_text(node, self.0)
    }
}

pub const TAX_ID: FieldAliases = FieldAliases(&["idPersona", "cuit"]);
pub const LEGAL_NAME: FieldAliases = FieldAliases(&["razonSocial", "denominacion"]);
pub const SURNAME: FieldAliases = FieldAliases(&["apellido"]);
pub const GIVEN_NAME: FieldAliases = FieldAliases(&["nombre"]);
pub const KEY_STATUS: FieldAliases = FieldAliases(&["estadoClave", "estado"]);
pub const IVA_CONDITION: FieldAliases =
    FieldAliases(&["condicionIva", "descripcionCondicionIva"]);
pub const STREET: FieldAliases = FieldAliases(&["calle", "descCalle", "direccion"]);
pub const STREET_NUMBER: FieldAliases = FieldAliases(&["numero", "nroPuerta"]);
pub const FLOOR: FieldAliases = FieldAliases(&["piso"]);
pub const UNIT: FieldAliases = FieldAliases(&["oficinaDptoLocal", "depto", "dpto"]);
pub const LOCALITY: FieldAliases =
    FieldAliases(&["localidad", "descripcionLocalidad", "descLocalidad"]);
pub const PROVINCE: FieldAliases = FieldAliases(&["descripcionProvincia", "provincia"]);
pub const POSTAL_CODE: FieldAliases = FieldAliases(&["codPostal", "codigoPostal", "cp"]);
pub const ACTIVITY_CODE: FieldAliases = FieldAliases(&["idActividad", "codigo"]);
pub const ACTIVITY_DESCRIPTION: FieldAliases =
    FieldAliases(&["descripcionActividad", "descripcion"]);
pub const TAX_DESCRIPTION: FieldAliases = FieldAliases(&["descripcionImpuesto", "descripcion"]);
pub const REGIME_DESCRIPTION: FieldAliases =
    FieldAliases(&["descripcionRegimen", "descripcion"]);

/// Fiscal address of a taxpayer. Missing parts are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalAddress {
    pub street: String,
    pub number: String,
    pub floor: String,
    pub unit: String,
    pub locality: String,
    pub province: String,
    pub postal_code: String,
}

/// One registered economic activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub code: String,
    pub description: String,
}

/// Normalized registry record, independent of the provider that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaRecord {
    pub tax_id: String,
    pub legal_name: String,
    /// Provider fiscal-status text, before canonicalization.
    pub fiscal_status: String,
    pub key_status: String,
    pub fiscal_address: FiscalAddress,
    pub activities: Vec<Activity>,
    pub taxes: Vec<String>,
    pub regimes: Vec<String>,
}

/// Registry answer as found in the response, every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPersonaRecord {
    pub tax_id: Option<String>,
    pub legal_name: Option<String>,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub key_status: Option<String>,
    pub iva_condition: Option<String>,
    pub monotributo: bool,
    pub address: RawAddress,
    pub activities: Vec<(Option<String>, Option<String>)>,
    pub taxes: Vec<String>,
    pub regimes: Vec<String>,
}

/// Address fields as found in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAddress {
    pub street: Option<String>,
    pub number: Option<String>,
    pub floor: Option<String>,
    pub unit: Option<String>,
    pub locality: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
}

impl RawPersonaRecord {
    /// Read a `personaReturn` element.
    pub fn from_node(ret: Node<'_, '_>) -> Self {
        let general = xml::find(ret, &["datosGenerales", "persona"]).unwrap_or(ret);

        let address = address_node(ret)
            .map(|node| RawAddress {
                street: STREET.read(node),
                number: STREET_NUMBER.read(node),
                floor: FLOOR.read(node),
                unit: UNIT.read(node),
                locality: LOCALITY.read(node),
                province: PROVINCE.read(node),
                postal_code: POSTAL_CODE.read(node),
            })
            .unwrap_or_default();

        let activities = xml::find_all(ret, &["actividad", "actividadMonotributista"])
            .into_iter()
            .map(|node| (ACTIVITY_CODE.read(node), ACTIVITY_DESCRIPTION.read(node)))
            .filter(|(code, description)| code.is_some() || description.is_some())
            .collect();
        let taxes = xml::find_all(ret, &["impuesto"])
            .into_iter()
            .filter_map(|node| TAX_DESCRIPTION.read(node))
            .collect();
        let regimes = xml::find_all(ret, &["regimen"])
            .into_iter()
            .filter_map(|node| REGIME_DESCRIPTION.read(node))
            .collect();

        Self {
            tax_id: TAX_ID.read(general),
            legal_name: LEGAL_NAME.read(general),
            surname: SURNAME.read(general),
            given_name: GIVEN_NAME.read(general),
            key_status: KEY_STATUS.read(general),
            iva_condition: IVA_CONDITION.read(ret),
            monotributo: xml::find(ret, &["datosMonotributo"])
                .is_some_and(|node| node.children().any(|c| c.is_element())),
            address,
            activities,
            taxes,
            regimes,
        }
    }

    /// Whether the return carried any taxpayer data at all.
    pub fn is_empty(&self) -> bool {
        self.tax_id.is_none()
            && self.legal_name.is_none()
            && self.surname.is_none()
            && self.given_name.is_none()
            && self.address == RawAddress::default()
            && self.activities.is_empty()
            && self.taxes.is_empty()
            && self.regimes.is_empty()
    }

    /// Collapse into a [`PersonaRecord`] for `requested`.
    pub fn normalize(self, requested: &Cuit) -> PersonaRecord {
        let legal_name = self.legal_name.clone().unwrap_or_else(|| {
            [self.surname.as_deref(), self.given_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        });
        let fiscal_status = self
            .iva_condition
            .clone()
            .unwrap_or_else(|| derive_fiscal_status(self.monotributo, &self.taxes, &self.regimes));
        let a = self.address;

        PersonaRecord {
            tax_id: self
                .tax_id
                .unwrap_or_else(|| requested.as_str().to_string()),
            legal_name,
            fiscal_status,
            key_status: self.key_status.unwrap_or_default(),
            fiscal_address: FiscalAddress {
                street: a.street.unwrap_or_default(),
                number: a.number.unwrap_or_default(),
                floor: a.floor.unwrap_or_default(),
                unit: a.unit.unwrap_or_default(),
                locality: a.locality.unwrap_or_default(),
                province: a.province.unwrap_or_default(),
                postal_code: a.postal_code.unwrap_or_default(),
            },
            activities: self
                .activities
                .into_iter()
                .map(|(code, description)| Activity {
                    code: code.unwrap_or_default(),
                    description: description.unwrap_or_default(),
                })
                .collect(),
            taxes: self.taxes,
            regimes: self.regimes,
        }
    }
}

/// `domicilioFiscal`, else the `domicilio` typed FISCAL, else the first one.
fn address_node<'a, 'i>(ret: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    if let Some(node) = xml::find(ret, &["domicilioFiscal"]) {
        return Some(node);
    }
    let candidates = xml::find_all(ret, &["domicilio"]);
    candidates
        .iter()
        .copied()
        .find(|node| {
            xml::child(*node, "tipoDomicilio")
                .and_then(xml::text)
                .is_some_and(|kind| kind.eq_ignore_ascii_case("FISCAL"))
        })
        .or_else(|| candidates.first().copied())
}

/// Fiscal-status text when the record has no explicit IVA condition.
fn derive_fiscal_status(monotributo: bool, taxes: &[String], regimes: &[String]) -> String {
    let descriptions: Vec<String> = taxes
        .iter()
        .chain(regimes)
        .map(|d| d.to_uppercase())
        .collect();
    let has_word = |word: &str| {
        descriptions.iter().any(|d| {
            d.split(|c: char| !c.is_alphanumeric())
                .any(|w| w == word)
        })
    };

    if monotributo || descriptions.iter().any(|d| d.contains("MONOTRIBUTO")) {
        "MONOTRIBUTO".to_string()
    } else if descriptions.iter().any(|d| d.contains("IVA EXENTO")) {
        "IVA EXENTO".to_string()
    } else if has_word("IVA") {
        "IVA RESPONSABLE INSCRIPTO".to_string()
    } else {
        String::new()
    }
}

/// Client for the Padron A5 `getPersona` operation.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    url: Url,
    represented: Cuit,
    timeout_ms: u64,
}

impl RegistryClient {
    pub fn new(http: reqwest::Client, url: Url, represented: Cuit, timeout_ms: u64) -> Self {
        Self {
            http,
            url,
            represented,
            timeout_ms,
        }
    }

    /// Fetch and normalize the record for `tax_id`.
    pub async fn get_persona(
        &self,
        ticket: &TrustTicket,
        tax_id: &Cuit,
    ) -> Result<PersonaRecord, LookupError> {
        let envelope = persona_envelope(ticket, &self.represented, tax_id);
        let started = Utc::now();

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

        let record = parse_persona_response(status, &body, tax_id)?;
        tracing::debug!(
            cuit = %tax_id,
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "registry record fetched"
        );
        Ok(record)
    }
}

pub(crate) fn persona_envelope(ticket: &TrustTicket, represented: &Cuit, tax_id: &Cuit) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{env}" xmlns:a5="{ns}">
  <soapenv:Header/>
  <soapenv:Body>
    <a5:getPersona>
      <token>{token}</token>
      <sign>{sign}</sign>
      <cuitRepresentada>{represented}</cuitRepresentada>
      <idPersona>{id}</idPersona>
    </a5:getPersona>
  </soapenv:Body>
</soapenv:Envelope>"#,
        env = xml::SOAP_ENV_NS,
        ns = A5_NS,
        token = xml::escape(&ticket.token),
        sign = xml::escape(&ticket.sign),
        represented = represented.as_str(),
        id = tax_id.as_str(),
    )
}

/// Interpret a `getPersona` response body.
pub fn parse_persona_response(
    status: u16,
    body: &str,
    requested: &Cuit,
) -> Result<PersonaRecord, LookupError> {
    let doc = xml::parse_response(ENDPOINT, status, body)?;
    let not_found = || LookupError::NotFound {
        tax_id: requested.as_str().to_string(),
    };

    let ret = xml::find(doc.root_element(), &["personaReturn", "return"]).ok_or_else(not_found)?;
    if xml::find(ret, &["datosGenerales", "persona"]).is_none() {
        if let Some(error) = xml::find(ret, &["errorConstancia"]) {
            let reason = xml::first_text(error, &["error"]).unwrap_or_default();
            tracing::debug!(cuit = %requested, reason = %reason, "registry returned errorConstancia only");
            return Err(not_found());
        }
    }

    let raw = RawPersonaRecord::from_node(ret);
    if raw.is_empty() {
        return Err(not_found());
    }
    Ok(raw.normalize(requested))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuit(raw: &str) -> Cuit {
        Cuit::new(raw).unwrap()
    }

    fn wrap(ret: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
<soap:Body><ns2:getPersonaResponse xmlns:ns2="{A5_NS}">{ret}</ns2:getPersonaResponse></soap:Body>
</soap:Envelope>"#
        )
    }

    const COMPANY: &str = r#"<personaReturn>
  <datosGenerales>
    <domicilioFiscal>
      <codPostal>1043</codPostal>
      <descripcionProvincia>CIUDAD AUTONOMA BUENOS AIRES</descripcionProvincia>
      <direccion>AV CORRIENTES 1234</direccion>
      <localidad>SAN NICOLAS</localidad>
    </domicilioFiscal>
    <estadoClave>ACTIVO</estadoClave>
    <idPersona>30712345671</idPersona>
    <razonSocial>EJEMPLO SERVICIOS SA</razonSocial>
    <tipoPersona>JURIDICA</tipoPersona>
  </datosGenerales>
  <datosRegimenGeneral>
    <actividad><descripcionActividad>SERVICIOS DE CONSULTORES EN INFORMATICA</descripcionActividad><idActividad>620200</idActividad></actividad>
    <impuesto><descripcionImpuesto>GANANCIAS SOCIEDADES</descripcionImpuesto><idImpuesto>10</idImpuesto></impuesto>
    <impuesto><descripcionImpuesto>IVA</descripcionImpuesto><idImpuesto>30</idImpuesto></impuesto>
    <regimen><descripcionRegimen>RETENCIONES IVA</descripcionRegimen></regimen>
  </datosRegimenGeneral>
</personaReturn>"#;

    #[test]
    fn parses_company_record() {
        let record = parse_persona_response(200, &wrap(COMPANY), &cuit("30712345671")).unwrap();
        assert_eq!(record.tax_id, "30712345671");
        assert_eq!(record.legal_name, "EJEMPLO SERVICIOS SA");
        assert_eq!(record.key_status, "ACTIVO");
        assert_eq!(record.fiscal_address.street, "AV CORRIENTES 1234");
        assert_eq!(record.fiscal_address.postal_code, "1043");
        assert_eq!(record.fiscal_address.locality, "SAN NICOLAS");
        assert_eq!(record.activities.len(), 1);
        assert_eq!(record.activities[0].code, "620200");
        assert_eq!(record.taxes, vec!["GANANCIAS SOCIEDADES", "IVA"]);
        assert_eq!(record.regimes, vec!["RETENCIONES IVA"]);
        assert_eq!(record.fiscal_status, "IVA RESPONSABLE INSCRIPTO");
    }

    #[test]
    fn alternate_field_names_populate_address() {
        let ret = r#"<return><persona>
            <idPersona>20304050609</idPersona><apellido>PEREZ</apellido><nombre>JUAN</nombre>
            <domicilio><tipoDomicilio>LEGAL/REAL</tipoDomicilio><descCalle>OTRA</descCalle></domicilio>
            <domicilio><tipoDomicilio>FISCAL</tipoDomicilio><descCalle>SAN MARTIN</descCalle>
              <nroPuerta>250</nroPuerta><codigoPostal>5000</codigoPostal><provincia>CORDOBA</provincia></domicilio>
        </persona></return>"#;
        let record = parse_persona_response(200, &wrap(ret), &cuit("20304050609")).unwrap();
        assert_eq!(record.fiscal_address.street, "SAN MARTIN");
        assert_eq!(record.fiscal_address.number, "250");
        assert_eq!(record.fiscal_address.postal_code, "5000");
        assert_eq!(record.fiscal_address.province, "CORDOBA");
        assert_eq!(record.legal_name, "PEREZ JUAN");
        assert_eq!(record.fiscal_status, "");
    }

    #[test]
    fn first_domicilio_used_without_fiscal_marker() {
        let ret = "<personaReturn><datosGenerales><idPersona>20304050609</idPersona>\
                   <domicilio><calle>BELGRANO</calle></domicilio>\
                   <domicilio><calle>RIVADAVIA</calle></domicilio></datosGenerales></personaReturn>";
        let record = parse_persona_response(200, &wrap(ret), &cuit("20304050609")).unwrap();
        assert_eq!(record.fiscal_address.street, "BELGRANO");
    }

    #[test]
    fn monotributo_block_sets_status() {
        let ret = "<personaReturn><datosGenerales><idPersona>20304050609</idPersona>\
                   <apellido>GOMEZ</apellido></datosGenerales>\
                   <datosMonotributo><categoriaMonotributo><descripcionCategoria>A LOCACIONES</descripcionCategoria>\
                   </categoriaMonotributo></datosMonotributo></personaReturn>";
        let record = parse_persona_response(200, &wrap(ret), &cuit("20304050609")).unwrap();
        assert_eq!(record.fiscal_status, "MONOTRIBUTO");
    }

    #[test]
    fn explicit_condition_wins() {
        let ret = "<personaReturn><datosGenerales><idPersona>30712345671</idPersona></datosGenerales>\
                   <condicionIva>IVA EXENTO</condicionIva>\
                   <impuesto><descripcionImpuesto>IVA</descripcionImpuesto></impuesto></personaReturn>";
        let record = parse_persona_response(200, &wrap(ret), &cuit("30712345671")).unwrap();
        assert_eq!(record.fiscal_status, "IVA EXENTO");
    }

    #[test]
    fn iva_word_match_ignores_substrings() {
        let status = derive_fiscal_status(false, &["ENTIDAD PRIVADA".into()], &[]);
        assert_eq!(status, "");
        let status = derive_fiscal_status(false, &["IVA EXENTO".into()], &[]);
        assert_eq!(status, "IVA EXENTO");
    }

    #[test]
    fn fault_is_502_whatever_the_status() {
        let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
<soap:Fault><faultcode>soap:Server</faultcode><faultstring>No existe persona con ese Id</faultstring></soap:Fault>
</soap:Body></soap:Envelope>"#;
        for status in [200, 500] {
            let err = parse_persona_response(status, body, &cuit("20304050609")).unwrap_err();
            assert_eq!(err.status(), 502);
            assert!(matches!(err, LookupError::Fault { .. }));
        }
    }

    #[test]
    fn missing_or_empty_return_is_not_found() {
        let err = parse_persona_response(200, &wrap(""), &cuit("20304050609")).unwrap_err();
        assert!(matches!(err, LookupError::NotFound { .. }));
        let err =
            parse_persona_response(200, &wrap("<personaReturn/>"), &cuit("20304050609")).unwrap_err();
        assert!(matches!(err, LookupError::NotFound { .. }));
    }

    #[test]
    fn error_constancia_only_is_not_found() {
        let ret = "<personaReturn><errorConstancia><error>La clave se encuentra inactiva</error>\
                   <idPersona>20304050609</idPersona></errorConstancia></personaReturn>";
        let err = parse_persona_response(200, &wrap(ret), &cuit("20304050609")).unwrap_err();
        assert!(matches!(err, LookupError::NotFound { ref tax_id } if tax_id == "20304050609"));
    }

    #[test]
    fn envelope_carries_ticket_and_ids() {
        let ticket = TrustTicket {
            token: "tok&en".into(),
            sign: "sig".into(),
            expires_at: Utc::now(),
            generated_at: None,
        };
        let env = persona_envelope(&ticket, &cuit("30712345671"), &cuit("20304050609"));
        assert!(env.contains("<token>tok&amp;en</token>"));
        assert!(env.contains("<cuitRepresentada>30712345671</cuitRepresentada>"));
        assert!(env.contains("<idPersona>20304050609</idPersona>"));
        roxmltree::Document::parse(&env).expect("well-formed envelope");
    }
}
