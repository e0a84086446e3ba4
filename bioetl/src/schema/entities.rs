//! Built-in ChEMBL entity schemas.

use super::column::{ColumnSpec, DataType};
use super::{DATABASE_VERSION, EXTRACTED_AT, HASH_BUSINESS_KEY, HASH_ROW, INDEX};
use crate::normalize::FieldNormalizer;

const CHEMBL_ID: &str = r"^CHEMBL\d+$";

/// Schema of one entity: typed columns, key fields and normalizer bindings.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    /// Entity name, e.g. `assay`.
    pub entity: String,
    /// Schema version recorded in metadata.
    pub version: String,
    /// API endpoint, e.g. `assay` for `/assay.json`.
    pub endpoint: String,
    /// Key holding the record array in API responses.
    pub records_key: String,
    /// Primary identifier column.
    pub id_column: String,
    /// Declared data columns in output order.
    pub columns: Vec<ColumnSpec>,
    /// Fields forming the business key.
    pub business_key: Vec<String>,
    /// Normalizer bound to each field.
    pub normalizers: Vec<(String, FieldNormalizer)>,
}

impl EntitySchema {
    /// Names of the declared data columns.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Data columns followed by the hash and provenance tail.
    #[must_use]
    pub fn output_view(&self) -> Vec<String> {
        let mut view = self.column_names();
        view.extend(
            [HASH_ROW, HASH_BUSINESS_KEY, INDEX, DATABASE_VERSION, EXTRACTED_AT]
                .iter()
                .map(|c| (*c).to_string()),
        );
        view
    }

    /// `output_view` paired with each column's type; `index` is int64 and the
    /// hash and provenance text columns are strings.
    #[must_use]
    pub fn output_types(&self) -> Vec<(String, DataType)> {
        self.output_view()
            .into_iter()
            .map(|name| {
                let dtype = match self.column(&name) {
                    Some(spec) => spec.dtype,
                    None if name == INDEX => DataType::Int64,
                    None => DataType::String,
                };
                (name, dtype)
            })
            .collect()
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Batch filter key, `<id_column>__in`.
    #[must_use]
    pub fn filter_key(&self) -> String {
        format!("{}__in", self.id_column)
    }

    /// Normalizer bound to `field`, if any.
    #[must_use]
    pub fn normalizer_for(&self, field: &str) -> Option<FieldNormalizer> {
        self.normalizers
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, n)| *n)
    }

    /// Declared type of `field`.
    #[must_use]
    pub fn dtype(&self, field: &str) -> Option<DataType> {
        self.column(field).map(|c| c.dtype)
    }
}

fn bind(pairs: &[(&str, FieldNormalizer)]) -> Vec<(String, FieldNormalizer)> {
    pairs.iter().map(|(k, n)| ((*k).to_string(), *n)).collect()
}

fn chembl_id(name: &str) -> ColumnSpec {
    ColumnSpec::string(name).pattern(CHEMBL_ID)
}

/// Activity measurements (`/activity`).
#[must_use]
pub fn activity() -> EntitySchema {
    use FieldNormalizer as N;
    EntitySchema {
        entity: "activity".into(),
        version: "1.2.0".into(),
        endpoint: "activity".into(),
        records_key: "activities".into(),
        id_column: "activity_id".into(),
        columns: vec![
            ColumnSpec::int("activity_id").required(),
            chembl_id("assay_chembl_id"),
            chembl_id("molecule_chembl_id"),
            chembl_id("target_chembl_id"),
            chembl_id("document_chembl_id"),
            ColumnSpec::string("standard_type"),
            ColumnSpec::string("standard_relation").domain(&["=", "<", ">", "<=", ">=", "~"]),
            ColumnSpec::float("standard_value"),
            ColumnSpec::string("standard_units"),
            ColumnSpec::float("pchembl_value").range(0.0, 15.0),
            ColumnSpec::string("data_validity_comment"),
            ColumnSpec::boolean("potential_duplicate"),
            ColumnSpec::string("ligand_efficiency"),
            ColumnSpec::string("activity_properties"),
        ],
        business_key: vec!["activity_id".into()],
        normalizers: bind(&[
            ("assay_chembl_id", N::ChemblId),
            ("molecule_chembl_id", N::ChemblId),
            ("target_chembl_id", N::ChemblId),
            ("document_chembl_id", N::ChemblId),
            ("standard_type", N::Id),
            ("standard_relation", N::Trim),
            ("standard_value", N::Float),
            ("standard_units", N::Trim),
            ("pchembl_value", N::Float),
            ("data_validity_comment", N::Trim),
            ("ligand_efficiency", N::FlattenMap),
            ("activity_properties", N::FlattenList),
        ]),
    }
}

/// Assay descriptions (`/assay`).
#[must_use]
pub fn assay() -> EntitySchema {
    use FieldNormalizer as N;
    EntitySchema {
        entity: "assay".into(),
        version: "1.1.0".into(),
        endpoint: "assay".into(),
        records_key: "assays".into(),
        id_column: "assay_chembl_id".into(),
        columns: vec![
            chembl_id("assay_chembl_id").required(),
            ColumnSpec::string("assay_type").domain(&["B", "F", "A", "T", "P", "U"]),
            ColumnSpec::string("description"),
            ColumnSpec::string("assay_organism"),
            ColumnSpec::int("assay_tax_id"),
            ColumnSpec::int("confidence_score").range(0.0, 9.0),
            chembl_id("document_chembl_id"),
            chembl_id("target_chembl_id"),
            ColumnSpec::string("bao_format").pattern(r"^BAO_\d+$"),
            ColumnSpec::string("assay_parameters"),
            ColumnSpec::string("assay_classifications"),
        ],
        business_key: vec!["assay_chembl_id".into()],
        normalizers: bind(&[
            ("assay_chembl_id", N::ChemblId),
            ("assay_type", N::Id),
            ("description", N::Trim),
            ("assay_organism", N::Trim),
            ("document_chembl_id", N::ChemblId),
            ("target_chembl_id", N::ChemblId),
            ("bao_format", N::BaoId),
            ("assay_parameters", N::FlattenList),
            ("assay_classifications", N::FlattenList),
        ]),
    }
}

/// Publications (`/document`).
#[must_use]
pub fn document() -> EntitySchema {
    use FieldNormalizer as N;
    EntitySchema {
        entity: "document".into(),
        version: "1.0.0".into(),
        endpoint: "document".into(),
        records_key: "documents".into(),
        id_column: "document_chembl_id".into(),
        columns: vec![
            chembl_id("document_chembl_id").required(),
            ColumnSpec::string("doc_type").domain(&["PUBLICATION", "BOOK", "PATENT", "DATASET"]),
            ColumnSpec::string("title"),
            ColumnSpec::string("journal"),
            ColumnSpec::int("year").range(1800.0, 2100.0),
            ColumnSpec::string("volume"),
            ColumnSpec::string("issue"),
            ColumnSpec::string("first_page"),
            ColumnSpec::string("last_page"),
            ColumnSpec::string("doi").pattern(r"^10\.\d{4,9}/\S+$"),
            ColumnSpec::int("pubmed_id").range(1.0, 9_999_999_999.0),
            ColumnSpec::string("authors"),
        ],
        business_key: vec!["document_chembl_id".into()],
        normalizers: bind(&[
            ("document_chembl_id", N::ChemblId),
            ("doc_type", N::Id),
            ("title", N::Trim),
            ("journal", N::Trim),
            ("doi", N::Doi),
            ("pubmed_id", N::PubmedId),
            ("authors", N::Trim),
        ]),
    }
}

/// Molecular targets (`/target`).
#[must_use]
pub fn target() -> EntitySchema {
    use FieldNormalizer as N;
    EntitySchema {
        entity: "target".into(),
        version: "1.0.0".into(),
        endpoint: "target".into(),
        records_key: "targets".into(),
        id_column: "target_chembl_id".into(),
        columns: vec![
            chembl_id("target_chembl_id").required(),
            ColumnSpec::string("pref_name"),
            ColumnSpec::string("target_type"),
            ColumnSpec::string("organism"),
            ColumnSpec::int("tax_id"),
            ColumnSpec::boolean("species_group_flag"),
            ColumnSpec::string("uniprot_accession").pattern(concat!(
                r"^[OPQ][0-9][A-Z0-9]{3}[0-9]$",
                r"|^[A-NR-Z][0-9][A-Z][A-Z0-9]{2}[0-9]$",
                r"|^[A-NR-Z][0-9][A-Z][A-Z0-9]{2}[0-9][A-Z][A-Z0-9]{2}[0-9]$",
            )),
            ColumnSpec::string("target_components"),
            ColumnSpec::string("cross_references"),
        ],
        business_key: vec!["target_chembl_id".into()],
        normalizers: bind(&[
            ("target_chembl_id", N::ChemblId),
            ("pref_name", N::Trim),
            ("target_type", N::Id),
            ("organism", N::Trim),
            ("uniprot_accession", N::UniprotId),
            ("target_components", N::FlattenList),
            ("cross_references", N::FlattenList),
        ]),
    }
}

/// Test items, i.e. molecules (`/molecule`).
#[must_use]
pub fn testitem() -> EntitySchema {
    use FieldNormalizer as N;
    EntitySchema {
        entity: "testitem".into(),
        version: "1.0.0".into(),
        endpoint: "molecule".into(),
        records_key: "molecules".into(),
        id_column: "molecule_chembl_id".into(),
        columns: vec![
            chembl_id("molecule_chembl_id").required(),
            ColumnSpec::string("pref_name"),
            ColumnSpec::string("molecule_type"),
            ColumnSpec::float("max_phase").range(-1.0, 4.0),
            ColumnSpec::boolean("therapeutic_flag"),
            ColumnSpec::string("structure_type"),
            ColumnSpec::int("pubchem_cid"),
            ColumnSpec::string("molecule_properties"),
            ColumnSpec::string("molecule_structures"),
            ColumnSpec::string("molecule_synonyms"),
        ],
        business_key: vec!["molecule_chembl_id".into()],
        normalizers: bind(&[
            ("molecule_chembl_id", N::ChemblId),
            ("pref_name", N::Trim),
            ("molecule_type", N::Trim),
            ("max_phase", N::Float),
            ("structure_type", N::Id),
            ("pubchem_cid", N::PubchemCid),
            ("molecule_properties", N::FlattenMap),
            ("molecule_structures", N::FlattenMap),
            ("molecule_synonyms", N::FlattenList),
        ]),
    }
}

/// All built-in schemas.
#[must_use]
pub fn builtin() -> Vec<EntitySchema> {
    vec![activity(), assay(), document(), target(), testitem()]
}
