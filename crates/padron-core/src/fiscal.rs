//! # IVA Condition
//!
//! Taxpayers are registered under one of four value-added-tax categories.
//! Providers report the category as free text ("IVA RESPONSABLE INSCRIPTO",
//! "Responsable Monotributo", "iva exento", ...); [`normalize_fiscal_status`]
//! maps that text onto [`IvaCondition`] and returns `None` when nothing
//! matches. Callers decide the fallback.

use serde::{Deserialize, Serialize};

/// Canonical IVA registration category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IvaCondition {
    /// Registered VAT taxpayer (responsable inscripto).
    #[serde(rename = "RI")]
    ResponsableInscripto,
    /// Simplified regime taxpayer.
    #[serde(rename = "MONOTRIBUTO")]
    Monotributo,
    /// VAT-exempt taxpayer.
    #[serde(rename = "EXENTO")]
    Exento,
    /// Final consumer, no special fiscal regime.
    #[serde(rename = "CF")]
    ConsumidorFinal,
}

impl IvaCondition {
    /// Canonical short label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResponsableInscripto => "RI",
            Self::Monotributo => "MONOTRIBUTO",
            Self::Exento => "EXENTO",
            Self::ConsumidorFinal => "CF",
        }
    }
}

impl std::fmt::Display for IvaCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map provider fiscal-status text onto an [`IvaCondition`].
///
/// Matching is case-insensitive and whitespace-insensitive. Patterns are
/// checked in order: monotributo before inscripto, since "RESPONSABLE
/// MONOTRIBUTO" also contains "RESPONSABLE".
pub fn normalize_fiscal_status(raw: &str) -> Option<IvaCondition> {
    let text = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();

    if text.is_empty() {
        return None;
    }
    if text.contains("MONOTRIBUT") || text.contains("REGIMEN SIMPLIFICADO") {
        return Some(IvaCondition::Monotributo);
    }
    if text.contains("EXENT") || text.contains("NO ALCANZADO") {
        return Some(IvaCondition::Exento);
    }
    if text.contains("RESPONSABLE INSCRIPTO")
        || text.contains("IVA INSCRIPTO")
        || text == "RI"
        || text == "IVA"
    {
        return Some(IvaCondition::ResponsableInscripto);
    }
    if text.contains("CONSUMIDOR FINAL") || text == "CF" {
        return Some(IvaCondition::ConsumidorFinal);
    }
    None
}
