//! Response parsing: record array plus page cursor.

use crate::errors::{EtlError, Result};
use crate::record::{record_from_json, Record};
use serde::{Deserialize, Serialize};

/// Pagination block returned alongside every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Offset of the first record in this page.
    #[serde(default)]
    pub offset: u64,
    /// Page size the server applied.
    #[serde(default)]
    pub limit: u64,
    /// Server-reported total, informational only.
    #[serde(default)]
    pub total_count: Option<u64>,
    /// Link to the next page, null on the last page.
    #[serde(default)]
    pub next: Option<String>,
    /// Link to the previous page.
    #[serde(default)]
    pub previous: Option<String>,
}

impl PageMeta {
    /// True iff `next` is non-null.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    /// `offset + limit`.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.offset + self.limit
    }
}

/// One parsed page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Key the records were found under.
    pub records_key: Option<String>,
    /// Records in server order.
    pub records: Vec<Record>,
    /// Pagination block; absent for single-shot responses.
    pub meta: Option<PageMeta>,
}

impl Page {
    /// True iff the page carries a `page_meta.next` link.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.meta.as_ref().is_some_and(PageMeta::has_more)
    }
}

fn is_record_array(value: &serde_json::Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| !items.is_empty() && items.iter().all(serde_json::Value::is_object))
}

/// Parses a page payload.
///
/// The records live under `preferred_key` when given and present; otherwise
/// under the first key (in key order) holding a non-empty array of objects.
/// A payload with no such array yields an empty page.
///
/// # Errors
///
/// Returns `PARSE_ERROR` if the payload is not an object, the preferred
/// key is not an array of objects, or `page_meta` is malformed.
pub fn parse_page(payload: serde_json::Value, preferred_key: Option<&str>) -> Result<Page> {
    let serde_json::Value::Object(mut map) = payload else {
        return Err(EtlError::parse("response payload is not a JSON object"));
    };

    let meta = match map.remove("page_meta") {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<PageMeta>(raw)
                .map_err(|e| EtlError::parse(format!("malformed page_meta: {e}")))?,
        ),
    };

    let key = match preferred_key {
        Some(key) if map.contains_key(key) => Some(key.to_string()),
        _ => map
            .iter()
            .find(|(_, value)| is_record_array(value))
            .map(|(key, _)| key.clone()),
    };

    let records = match key.as_deref().and_then(|k| map.remove(k)) {
        None => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                record_from_json(item)
                    .ok_or_else(|| EtlError::parse("record array contains a non-object element"))
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(EtlError::parse(format!(
                "field '{}' is not an array of records",
                key.unwrap_or_default()
            )))
        }
    };

    Ok(Page {
        records_key: key,
        records,
        meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use serde_json::json;

    #[test]
    fn test_parses_records_and_meta() {
        let page = parse_page(
            json!({
                "activities": [{"activity_id": 1}, {"activity_id": 2}],
                "page_meta": {"offset": 0, "limit": 2, "total_count": 5, "next": "/next"}
            }),
            None,
        )
        .unwrap();

        assert_eq!(page.records_key.as_deref(), Some("activities"));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1]["activity_id"], Value::Int(2));
        assert!(page.has_more());
        assert_eq!(page.meta.unwrap().next_offset(), 2);
    }

    #[test]
    fn test_last_page_has_no_more() {
        let page = parse_page(
            json!({"assays": [{"a": 1}], "page_meta": {"offset": 4, "limit": 2, "next": null}}),
            Some("assays"),
        )
        .unwrap();
        assert!(!page.has_more());
    }

    #[test]
    fn test_empty_preferred_key_yields_empty_page() {
        let page = parse_page(json!({"targets": [], "page_meta": {"next": null}}), Some("targets")).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.records_key.as_deref(), Some("targets"));
    }

    #[test]
    fn test_skips_scalar_arrays_when_guessing() {
        let page = parse_page(
            json!({"a_tags": ["x", "y"], "documents": [{"doi": "10.1/x"}]}),
            None,
        )
        .unwrap();
        assert_eq!(page.records_key.as_deref(), Some("documents"));
    }

    #[test]
    fn test_rejects_non_object_payload() {
        assert!(parse_page(json!([1, 2]), None).is_err());
        assert!(parse_page(json!({"assays": [1]}), Some("assays")).is_err());
    }
}
