//! Applies field normalizers in schema order.

use super::FieldNormalizer;
use crate::record::{Record, Table};
use crate::schema::EntitySchema;
use std::collections::BTreeMap;

/// Ordered field to normalizer bindings for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationService {
    bindings: Vec<(String, FieldNormalizer)>,
}

impl NormalizationService {
    /// Binds the schema's normalizers, with `overrides` taking precedence.
    ///
    /// Bindings follow the schema's column order; override fields that the
    /// schema does not declare are appended in name order.
    #[must_use]
    pub fn for_schema(schema: &EntitySchema, overrides: &BTreeMap<String, FieldNormalizer>) -> Self {
        let mut bindings: Vec<(String, FieldNormalizer)> = schema
            .columns
            .iter()
            .filter_map(|column| {
                overrides
                    .get(&column.name)
                    .copied()
                    .or_else(|| schema.normalizer_for(&column.name))
                    .map(|n| (column.name.clone(), n))
            })
            .collect();

        for (field, normalizer) in overrides {
            if schema.column(field).is_none() {
                bindings.push((field.clone(), *normalizer));
            }
        }

        Self { bindings }
    }

    /// Bindings in application order.
    #[must_use]
    pub fn bindings(&self) -> &[(String, FieldNormalizer)] {
        &self.bindings
    }

    /// Normalizes one record in place. Absent fields stay absent.
    pub fn normalize_record(&self, record: &mut Record) {
        for (field, normalizer) in &self.bindings {
            if let Some(value) = record.get_mut(field) {
                *value = normalizer.apply(value);
            }
        }
    }

    /// Normalizes every row.
    #[must_use]
    pub fn normalize_table(&self, mut table: Table) -> Table {
        for row in table.rows_mut() {
            self.normalize_record(row);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{record_from_json, Value};
    use crate::schema::entities;
    use serde_json::json;

    #[test]
    fn test_document_record() {
        let service = NormalizationService::for_schema(&entities::document(), &BTreeMap::new());
        let mut record = record_from_json(json!({
            "document_chembl_id": " chembl1139451 ",
            "doi": "not-a-doi",
            "pubmed_id": "14695813",
            "title": "  Title  "
        }))
        .unwrap();

        service.normalize_record(&mut record);
        assert_eq!(record["document_chembl_id"], Value::from("CHEMBL1139451"));
        assert_eq!(record["doi"], Value::Null);
        assert_eq!(record["pubmed_id"], Value::Int(14_695_813));
        assert_eq!(record["title"], Value::from("Title"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = BTreeMap::from([
            ("description".to_string(), FieldNormalizer::Text),
            ("custom".to_string(), FieldNormalizer::Id),
        ]);
        let service = NormalizationService::for_schema(&entities::assay(), &overrides);

        let mut record = record_from_json(json!({"description": " MIXED Case ", "custom": " ab "})).unwrap();
        service.normalize_record(&mut record);
        assert_eq!(record["description"], Value::from("mixed case"));
        assert_eq!(record["custom"], Value::from("AB"));
        assert_eq!(service.bindings().last().map(|(f, _)| f.as_str()), Some("custom"));
    }

    #[test]
    fn test_normalization_is_idempotent_for_every_entity() {
        let raw = json!({
            "activity_id": 31863,
            "assay_chembl_id": "chembl663853",
            "standard_type": " ic50 ",
            "standard_value": "12.34567",
            "ligand_efficiency": {"bei": "18.5", "le": 0.34, "lle": null},
            "activity_properties": [{"type": "x", "value": 1}],
            "doi": "10.1021/JM0001",
            "pubmed_id": 123,
            "bao_format": "bao:0000357",
            "target_components": [{"accession": "P12345"}],
            "uniprot_accession": "p12345",
            "molecule_properties": {"alogp": "2.11"},
            "molecule_synonyms": ["a", "b"],
            "max_phase": "4.0"
        });

        for schema in entities::builtin() {
            let service = NormalizationService::for_schema(&schema, &BTreeMap::new());
            let mut once = record_from_json(raw.clone()).unwrap();
            service.normalize_record(&mut once);
            let mut twice = once.clone();
            service.normalize_record(&mut twice);
            assert_eq!(once, twice, "{} normalization is not idempotent", schema.entity);
        }
    }
}
