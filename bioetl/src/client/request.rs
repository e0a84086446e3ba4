//! URL construction for the remote data service.

use crate::errors::{EtlError, Result};
use crate::record::Value;
use std::collections::BTreeMap;

/// Query parameters; the map keeps keys sorted so URLs are deterministic.
pub type QueryParams = BTreeMap<String, Value>;

/// Builds `<base>/<endpoint>.json?<sorted params>` URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBuilder {
    base_url: String,
    max_url_length: usize,
}

impl RequestBuilder {
    /// Creates a builder; a trailing `/` on the base URL is ignored.
    #[must_use]
    pub fn new(base_url: impl Into<String>, max_url_length: usize) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            max_url_length,
        }
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Maximum URL length.
    #[must_use]
    pub fn max_url_length(&self) -> usize {
        self.max_url_length
    }

    /// Builds the URL for `endpoint` with `params`, skipping null values.
    ///
    /// # Errors
    ///
    /// Returns `URL_TOO_LONG` when the result exceeds `max_url_length`.
    pub fn build(&self, endpoint: &str, params: &QueryParams) -> Result<String> {
        let url = self.render(endpoint, params);
        if url.len() > self.max_url_length {
            return Err(EtlError::UrlTooLong {
                length: url.len(),
                max: self.max_url_length,
            });
        }
        Ok(url)
    }

    /// Renders the URL without checking its length.
    #[must_use]
    pub fn render(&self, endpoint: &str, params: &QueryParams) -> String {
        let endpoint = endpoint.trim_matches('/');
        let mut url = format!("{}/{}.json", self.base_url, endpoint);

        let query = params
            .iter()
            .filter_map(|(key, value)| {
                value.to_cell().map(|text| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(&text))
                })
            })
            .collect::<Vec<_>>()
            .join("&");

        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, Value)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_sorted_params_and_null_skipping() {
        let builder = RequestBuilder::new("https://www.ebi.ac.uk/chembl/api/data/", 2000);
        let url = builder
            .build(
                "activity",
                &params(&[
                    ("offset", Value::Int(0)),
                    ("limit", Value::Int(1000)),
                    ("assay_type", Value::Null),
                ]),
            )
            .unwrap();
        assert_eq!(
            url,
            "https://www.ebi.ac.uk/chembl/api/data/activity.json?limit=1000&offset=0"
        );
    }

    #[test]
    fn test_no_query_string_without_params() {
        let builder = RequestBuilder::new("http://host/api", 100);
        assert_eq!(builder.build("status", &QueryParams::new()).unwrap(), "http://host/api/status.json");
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let builder = RequestBuilder::new("http://host", 200);
        let url = builder
            .build(
                "assay",
                &params(&[("assay_chembl_id__in", Value::from("CHEMBL1,CHEMBL2"))]),
            )
            .unwrap();
        assert!(url.ends_with("assay_chembl_id__in=CHEMBL1%2CCHEMBL2"));
    }

    #[test]
    fn test_url_too_long() {
        let builder = RequestBuilder::new("http://host", 30);
        let err = builder
            .build("assay", &params(&[("q", Value::from("x".repeat(40)))]))
            .unwrap_err();
        assert!(matches!(err, EtlError::UrlTooLong { max: 30, .. }));
    }
}
