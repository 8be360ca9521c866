//! # CUIT / CUIL Identifiers
//!
//! Argentine tax identifiers are 11 digits: a two-digit holder prefix, an
//! eight-digit body, and a mod-11 check digit. They are commonly written as
//! `XX-XXXXXXXX-X`; any separator is accepted on input and the canonical
//! storage form is the bare 11 digits.
//!
//! ## Check Digit
//!
//! The first ten digits are weighted by `[5, 4, 3, 2, 7, 6, 5, 4, 3, 2]`.
//! The expected check digit is `11 - (sum % 11)`, with `11` mapped to `0`
//! and `10` mapped to `9`.
//!
//! ## Holder Classification
//!
//! Prefixes `20`, `23`, `24` and `27` are issued to individuals ([`DocType::Cuil`]).
//! Every other prefix denotes an organization ([`DocType::Cuit`]).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Weights applied to the first ten digits.
const WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Prefixes issued to individual holders.
const INDIVIDUAL_PREFIXES: [&str; 4] = ["20", "23", "24", "27"];

/// Holder type derived from the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocType {
    /// Organization (legal entity) identifier.
    Cuit,
    /// Individual (natural person) identifier.
    Cuil,
}

impl DocType {
    /// Canonical uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuit => "CUIT",
            Self::Cuil => "CUIL",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip every non-digit character and return the digits only when exactly
/// eleven remain.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 11).then_some(digits)
}

/// Compute the mod-11 check digit for the first ten digits.
fn check_digit(first_ten: &[u8]) -> u8 {
    let sum: u32 = first_ten
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(d, w)| u32::from(*d) * w)
        .sum();
    match 11 - (sum % 11) {
        11 => 0,
        10 => 9,
        n => n as u8,
    }
}

/// Validate a raw identifier: eleven digits after normalization, not all
/// zeros, and a matching check digit.
pub fn is_valid(raw: &str) -> bool {
    validate(raw).is_ok()
}

/// Classify a normalized identifier by its two-digit prefix.
pub fn classify(normalized: &str) -> DocType {
    if INDIVIDUAL_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
        DocType::Cuil
    } else {
        DocType::Cuit
    }
}

fn validate(raw: &str) -> Result<String, ValidationError> {
    let digits = normalize(raw).ok_or_else(|| ValidationError::InvalidFormat(raw.to_string()))?;
    let values: Vec<u8> = digits.bytes().map(|b| b - b'0').collect();

    if values.iter().all(|d| *d == 0) {
        return Err(ValidationError::AllZeros(digits));
    }

    let expected = check_digit(&values[..10]);
    if values[10] != expected {
        return Err(ValidationError::CheckDigit {
            input: digits,
            expected,
        });
    }
    Ok(digits)
}

/// A validated CUIT or CUIL.
///
/// # Validation
///
/// - Exactly 11 digits once separators are stripped
/// - Not all zeros
/// - 11th digit matches the mod-11 check digit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cuit(String);

impl<'de> Deserialize<'de> for Cuit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl Cuit {
    /// Parse and validate a raw identifier, storing the canonical 11 digits.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first failed check.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate(value.as_ref()).map(Self)
    }

    /// Access the canonical 11-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Holder type derived from the prefix.
    pub fn doc_type(&self) -> DocType {
        classify(&self.0)
    }

    /// Render as `XX-XXXXXXXX-X`.
    pub fn formatted(&self) -> String {
        format!("{}-{}-{}", &self.0[..2], &self.0[2..10], &self.0[10..])
    }
}

impl std::fmt::Display for Cuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Cuit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separators() {
        assert_eq!(normalize("20-30405060-9").as_deref(), Some("20304050609"));
        assert_eq!(normalize(" 20.30405060/9 ").as_deref(), Some("20304050609"));
    }

    #[test]
    fn normalize_rejects_wrong_length() {
        assert!(normalize("123").is_none());
        assert!(normalize("203040506091").is_none());
        assert!(normalize("").is_none());
    }

    #[test]
    fn valid_identifiers() {
        assert!(is_valid("20304050609"));
        assert!(is_valid("20-30405060-9"));
        assert!(is_valid("30712345671"));
        assert!(is_valid("20123456786"));
    }

    #[test]
    fn remainder_zero_maps_to_zero() {
        // Weighted sum 22, remainder 0.
        assert!(is_valid("20000003000"));
        assert!(!is_valid("20000003001"));
    }

    #[test]
    fn remainder_one_maps_to_nine() {
        // Weighted sum 12, remainder 1.
        assert!(is_valid("20000000019"));
        assert!(!is_valid("20000000010"));
    }

    #[test]
    fn rejects_bad_check_digit() {
        let err = Cuit::new("20304050608").unwrap_err();
        assert_eq!(
            err,
            ValidationError::CheckDigit {
                input: "20304050608".into(),
                expected: 9
            }
        );
    }

    #[test]
    fn rejects_all_zeros() {
        assert!(!is_valid("00000000000"));
        assert!(matches!(
            Cuit::new("00-00000000-0"),
            Err(ValidationError::AllZeros(_))
        ));
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(
            Cuit::new("123"),
            Err(ValidationError::InvalidFormat(_))
        ));
    }

    #[test]
    fn classify_by_prefix() {
        assert_eq!(classify("20304050609"), DocType::Cuil);
        assert_eq!(classify("23000000000"), DocType::Cuil);
        assert_eq!(classify("24000000000"), DocType::Cuil);
        assert_eq!(classify("27000000000"), DocType::Cuil);
        assert_eq!(classify("30712345671"), DocType::Cuit);
        assert_eq!(classify("33000000000"), DocType::Cuit);
    }

    #[test]
    fn cuit_formatted_and_display() {
        let cuit = Cuit::new("20304050609").unwrap();
        assert_eq!(cuit.formatted(), "20-30405060-9");
        assert_eq!(cuit.to_string(), "20304050609");
        assert_eq!(cuit.doc_type(), DocType::Cuil);
    }

    #[test]
    fn cuit_deserialize_validates() {
        let ok: Cuit = serde_json::from_str("\"30-71234567-1\"").unwrap();
        assert_eq!(ok.as_str(), "30712345671");
        assert!(serde_json::from_str::<Cuit>("\"30712345670\"").is_err());
    }

    #[test]
    fn doc_type_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&DocType::Cuil).unwrap(), "\"CUIL\"");
        assert_eq!(DocType::Cuit.to_string(), "CUIT");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Independent rendition of the mod-11 rule used as an oracle.
    fn reference_is_valid(s: &str) -> bool {
        if s.len() != 11 || !s.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        if s.chars().all(|c| c == '0') {
            return false;
        }
        let d: Vec<u32> = s.chars().map(|c| c.to_digit(10).unwrap_or(0)).collect();
        let w = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];
        let sum: u32 = (0..10).map(|i| d[i] * w[i]).sum();
        let mut expected = 11 - (sum % 11);
        if expected == 11 {
            expected = 0;
        }
        if expected == 10 {
            expected = 9;
        }
        d[10] == expected
    }

    proptest! {
        #[test]
        fn agrees_with_reference(s in "[0-9]{11}") {
            prop_assert_eq!(is_valid(&s), reference_is_valid(&s));
        }

        #[test]
        fn wrong_length_is_invalid(s in "[0-9]{0,10}|[0-9]{12,20}") {
            prop_assert!(!is_valid(&s));
        }

        #[test]
        fn classify_matches_prefix(s in "[0-9]{11}") {
            let expected = match &s[..2] {
                "20" | "23" | "24" | "27" => DocType::Cuil,
                _ => DocType::Cuit,
            };
            prop_assert_eq!(classify(&s), expected);
        }

        #[test]
        fn valid_cuit_round_trips(s in "[0-9]{10}") {
            let values: Vec<u8> = s.bytes().map(|b| b - b'0').collect();
            let full = format!("{s}{}", check_digit(&values));
            if full.chars().any(|c| c != '0') {
                let cuit = Cuit::new(&full).unwrap();
                prop_assert_eq!(cuit.as_str(), full.as_str());
                prop_assert_eq!(Cuit::new(cuit.formatted()).unwrap(), cuit);
            }
        }
    }
}
