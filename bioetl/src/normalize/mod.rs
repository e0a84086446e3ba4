//! Field-level normalization.
//!
//! This module provides:
//! - identifier canonicalization (DOI, ChEMBL, PubMed, PubChem, UniProt, BAO)
//! - generic scalar modes (id, text, trim, float)
//! - deterministic flattening of nested mappings and lists
//! - `NormalizationService`, which applies them in schema order

mod identifiers;
mod scalar;
mod service;
mod structural;

pub use identifiers::{
    normalize_bao_id, normalize_chembl_id, normalize_doi, normalize_pubchem_cid,
    normalize_pubmed_id, normalize_uniprot_id,
};
pub use scalar::{
    normalize_float, normalize_id, normalize_text, normalize_trim, round_to, FLOAT_DECIMALS,
};
pub use service::NormalizationService;
pub use structural::{flatten_list, flatten_mapping, ITEM_SEPARATOR};

use crate::record::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalizer that can be bound to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldNormalizer {
    /// DOI canonicalization.
    Doi,
    /// `CHEMBL<digits>`.
    ChemblId,
    /// PubMed ID to integer.
    PubmedId,
    /// PubChem CID to integer.
    PubchemCid,
    /// UniProt accession.
    UniprotId,
    /// `BAO_<digits>`.
    BaoId,
    /// Trim and upper-case.
    Id,
    /// Trim and lower-case.
    #[serde(alias = "default")]
    Text,
    /// Trim only.
    Trim,
    /// Round to three decimals.
    Float,
    /// Flatten a mapping.
    FlattenMap,
    /// Flatten a list.
    FlattenList,
    /// Leave the value untouched.
    Passthrough,
}

impl FieldNormalizer {
    /// Applies the normalizer to one value.
    #[must_use]
    pub fn apply(self, value: &Value) -> Value {
        match self {
            Self::Doi => normalize_doi(value),
            Self::ChemblId => normalize_chembl_id(value),
            Self::PubmedId => normalize_pubmed_id(value),
            Self::PubchemCid => normalize_pubchem_cid(value),
            Self::UniprotId => normalize_uniprot_id(value),
            Self::BaoId => normalize_bao_id(value),
            Self::Id => normalize_id(value),
            Self::Text => normalize_text(value),
            Self::Trim => normalize_trim(value),
            Self::Float => normalize_float(value),
            Self::FlattenMap => flatten_mapping(value),
            Self::FlattenList => flatten_list(value),
            Self::Passthrough => value.clone(),
        }
    }

    /// Snake-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::ChemblId => "chembl_id",
            Self::PubmedId => "pubmed_id",
            Self::PubchemCid => "pubchem_cid",
            Self::UniprotId => "uniprot_id",
            Self::BaoId => "bao_id",
            Self::Id => "id",
            Self::Text => "text",
            Self::Trim => "trim",
            Self::Float => "float",
            Self::FlattenMap => "flatten_map",
            Self::FlattenList => "flatten_list",
            Self::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for FieldNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
