//! Identifier canonicalization.
//!
//! Every function returns the canonical form or [`Value::Null`] when the
//! input does not validate. Canonical forms validate again unchanged.

use crate::record::Value;
use regex::Regex;
use std::sync::LazyLock;

static DOI: LazyLock<Regex> = LazyLock::new(|| compile(r"^10\.\d{4,9}/\S+$"));
static CHEMBL_ID: LazyLock<Regex> = LazyLock::new(|| compile(r"^CHEMBL\d+$"));
static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{1,10}$"));
static BAO_ID: LazyLock<Regex> = LazyLock::new(|| compile(r"^BAO_\d+$"));
static UNIPROT: LazyLock<Regex> = LazyLock::new(|| {
    compile(concat!(
        r"^[OPQ][0-9][A-Z0-9]{3}[0-9]$",
        r"|^[A-NR-Z][0-9][A-Z][A-Z0-9]{2}[0-9]$",
        r"|^[A-NR-Z][0-9][A-Z][A-Z0-9]{2}[0-9][A-Z][A-Z0-9]{2}[0-9]$",
    ))
});

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("identifier pattern is valid")
}

const DOI_PREFIXES: &[&str] = &["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"];

/// Text form of a scalar identifier; integral floats lose their `.0`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.trim().to_string()),
        Value::Int(i) => Some(i.to_string()),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some((*f as i64).to_string()),
        _ => None,
    }
}

/// Lower-cased DOI without resolver prefixes, e.g. `10.1021/jm00123a001`.
#[must_use]
pub fn normalize_doi(value: &Value) -> Value {
    let Some(text) = scalar_text(value) else {
        return Value::Null;
    };
    let mut doi = text.to_lowercase();
    for prefix in DOI_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim().to_string();
            break;
        }
    }
    if DOI.is_match(&doi) {
        Value::Str(doi)
    } else {
        Value::Null
    }
}

/// Upper-cased `CHEMBL<digits>`.
#[must_use]
pub fn normalize_chembl_id(value: &Value) -> Value {
    match_upper(value, &CHEMBL_ID)
}

/// PubMed ID as an integer.
#[must_use]
pub fn normalize_pubmed_id(value: &Value) -> Value {
    numeric_id(value)
}

/// PubChem CID as an integer.
#[must_use]
pub fn normalize_pubchem_cid(value: &Value) -> Value {
    numeric_id(value)
}

/// Upper-cased UniProt accession.
#[must_use]
pub fn normalize_uniprot_id(value: &Value) -> Value {
    match_upper(value, &UNIPROT)
}

/// Upper-cased `BAO_<digits>`; the `BAO:` spelling is accepted.
#[must_use]
pub fn normalize_bao_id(value: &Value) -> Value {
    let Some(text) = scalar_text(value) else {
        return Value::Null;
    };
    let candidate = text.to_uppercase().replacen("BAO:", "BAO_", 1);
    if BAO_ID.is_match(&candidate) {
        Value::Str(candidate)
    } else {
        Value::Null
    }
}

fn match_upper(value: &Value, pattern: &Regex) -> Value {
    let Some(text) = scalar_text(value) else {
        return Value::Null;
    };
    let candidate = text.to_uppercase();
    if pattern.is_match(&candidate) {
        Value::Str(candidate)
    } else {
        Value::Null
    }
}

fn numeric_id(value: &Value) -> Value {
    scalar_text(value)
        .filter(|text| NUMERIC_ID.is_match(text))
        .and_then(|text| text.parse::<i64>().ok())
        .map_or(Value::Null, Value::Int)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi() {
        assert_eq!(
            normalize_doi(&Value::from("  10.1021/JM00123A001 ")),
            Value::from("10.1021/jm00123a001")
        );
        assert_eq!(
            normalize_doi(&Value::from("https://doi.org/10.1016/j.bmc.2004.01.001")),
            Value::from("10.1016/j.bmc.2004.01.001")
        );
        assert_eq!(normalize_doi(&Value::from("not-a-doi")), Value::Null);
        assert_eq!(normalize_doi(&Value::Null), Value::Null);
    }

    #[test]
    fn test_chembl_id() {
        assert_eq!(normalize_chembl_id(&Value::from(" chembl25 ")), Value::from("CHEMBL25"));
        assert_eq!(normalize_chembl_id(&Value::from("CHEMBL")), Value::Null);
        assert_eq!(normalize_chembl_id(&Value::Int(25)), Value::Null);
    }

    #[test]
    fn test_numeric_ids() {
        assert_eq!(normalize_pubmed_id(&Value::from(" 12345 ")), Value::Int(12345));
        assert_eq!(normalize_pubmed_id(&Value::Int(12345)), Value::Int(12345));
        assert_eq!(normalize_pubmed_id(&Value::Float(2244.0)), Value::Int(2244));
        assert_eq!(normalize_pubchem_cid(&Value::from("12345678901")), Value::Null);
        assert_eq!(normalize_pubchem_cid(&Value::from("12a")), Value::Null);
    }

    #[test]
    fn test_uniprot_disjuncts() {
        for accession in ["P12345", "q9h0h5", "A0A023GPI8", "A2BC19"] {
            assert!(
                !normalize_uniprot_id(&Value::from(accession)).is_null(),
                "{accession} should be valid"
            );
        }
        assert_eq!(normalize_uniprot_id(&Value::from("P1234")), Value::Null);
        assert_eq!(normalize_uniprot_id(&Value::from("12345P")), Value::Null);
    }

    #[test]
    fn test_bao_id() {
        assert_eq!(normalize_bao_id(&Value::from("bao_0000019")), Value::from("BAO_0000019"));
        assert_eq!(normalize_bao_id(&Value::from("BAO:0000357")), Value::from("BAO_0000357"));
        assert_eq!(normalize_bao_id(&Value::from("0000019")), Value::Null);
    }

    #[test]
    fn test_identifier_normalizers_are_idempotent() {
        let inputs = [
            Value::from("https://doi.org/10.1000/XYZ"),
            Value::from("chembl1"),
            Value::from("0042"),
            Value::from("p12345"),
            Value::from("bao:1"),
        ];
        let fns: [fn(&Value) -> Value; 5] = [
            normalize_doi,
            normalize_chembl_id,
            normalize_pubmed_id,
            normalize_uniprot_id,
            normalize_bao_id,
        ];
        for (f, input) in fns.iter().zip(&inputs) {
            let once = f(input);
            assert_eq!(f(&once), once);
        }
    }
}
