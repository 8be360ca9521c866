//! SOAP envelope helpers.
//!
//! Envelopes are rendered with `format!` and [`escape`]. Responses are read
//! with `roxmltree` and matched by *local* element name so that the
//! namespace prefixes the provider happens to emit (`soap:`, `soapenv:`,
//! `ns2:`, none at all) never matter.

use roxmltree::{Document, Node};

use crate::error::LookupError;

/// SOAP 1.1 envelope namespace.
pub(crate) const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Escape a string for safe inclusion in XML text content.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse a response body, mapping syntax errors to `MalformedResponse`.
pub(crate) fn parse<'i>(endpoint: &str, body: &'i str) -> Result<Document<'i>, LookupError> {
    Document::parse(body).map_err(|e| LookupError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: format!("invalid XML: {e}"),
    })
}

/// First element at or below `node` whose local name is one of `names`.
///
/// Names are tried in order, so earlier aliases win over later ones even
/// when the later one appears first in document order.
pub(crate) fn find<'a, 'i>(node: Node<'a, 'i>, names: &[&str]) -> Option<Node<'a, 'i>> {
    names.iter().find_map(|name| {
        node.descendants()
            .find(|n| n.is_element() && n.tag_name().name() == *name)
    })
}

/// Every element at or below `node` whose local name is one of `names`,
/// in document order.
pub(crate) fn find_all<'a, 'i>(node: Node<'a, 'i>, names: &[&str]) -> Vec<Node<'a, 'i>> {
    node.descendants()
        .filter(|n| n.is_element() && names.contains(&n.tag_name().name()))
        .collect()
}

/// Direct child element with the given local name.
pub(crate) fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Trimmed, non-empty text content of an element.
pub(crate) fn text(node: Node<'_, '_>) -> Option<String> {
    let joined: String = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Text of the first element matching any alias, trying aliases in order
/// and skipping elements that are present but empty.
pub(crate) fn first_text(node: Node<'_, '_>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|name| {
        node.descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == *name)
            .find_map(text)
    })
}

/// Parse a SOAP response and reject faults and non-success statuses.
///
/// The body is inspected before the status: providers answer faults with
/// HTTP 500, and a fault is reported as [`LookupError::Fault`] whatever the
/// status. A non-success status without a fault is [`LookupError::Api`].
pub(crate) fn parse_response<'i>(
    endpoint: &str,
    status: u16,
    body: &'i str,
) -> Result<Document<'i>, LookupError> {
    let success = (200..300).contains(&status);
    let api_error = || LookupError::Api {
        endpoint: endpoint.to_string(),
        status,
        body: excerpt(body),
    };
    if body.trim().is_empty() {
        return Err(if success {
            LookupError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: "empty body".into(),
            }
        } else {
            api_error()
        });
    }

    let doc = match parse(endpoint, body) {
        Ok(doc) => doc,
        Err(_) if !success => return Err(api_error()),
        Err(e) => return Err(e),
    };
    if let Some(message) = fault_message(&doc) {
        tracing::warn!(endpoint, status, "SOAP fault: {message}");
        return Err(LookupError::Fault {
            endpoint: endpoint.to_string(),
            message,
        });
    }
    if !success {
        return Err(api_error());
    }
    Ok(doc)
}

/// Leading part of a response body, for error messages.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(512).collect()
}

/// Message of a SOAP fault anywhere in the document, if one is present.
///
/// Handles SOAP 1.1 (`faultstring`) and SOAP 1.2 (`Reason/Text`) shapes.
pub(crate) fn fault_message(doc: &Document<'_>) -> Option<String> {
    let fault = find(doc.root_element(), &["Fault"])?;
    let message = first_text(fault, &["faultstring", "Text", "faultcode", "Value"])
        .unwrap_or_else(|| "unspecified SOAP fault".to_string());
    Some(message)
}
