//! Payload builders, CSV writers and preconfigured services.

use super::mocks::ScriptedTransport;
use crate::client::{HttpClient, RequestBuilder};
use crate::config::PipelineConfig;
use crate::extract::{ExtractionService, ExtractionSettings};
use crate::resilience::{CircuitBreaker, RateLimiter, RetryPolicy};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Base URL used by scripted services and test configs.
pub const TEST_BASE_URL: &str = "http://chembl.test/api";

/// A page payload: `{<key>: records, page_meta: {...}}`.
#[must_use]
pub fn page_payload(
    records_key: &str,
    records: Vec<serde_json::Value>,
    offset: u64,
    limit: u64,
    total_count: Option<u64>,
    has_next: bool,
) -> serde_json::Value {
    let next = has_next.then(|| format!("/chembl/api/data/{records_key}.json?offset={}", offset + limit));
    json!({
        records_key: records,
        "page_meta": {
            "offset": offset,
            "limit": limit,
            "total_count": total_count,
            "next": next,
            "previous": null,
        }
    })
}

/// Writes a CSV with a header row and returns its path.
///
/// # Panics
///
/// Panics when the file cannot be written.
#[allow(clippy::expect_used)]
pub fn write_csv(dir: &Path, name: &str, header: &[&str], rows: &[&[&str]]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = csv::Writer::from_path(&path).expect("create csv");
    writer.write_record(header).expect("write header");
    for row in rows {
        writer.write_record(*row).expect("write row");
    }
    writer.flush().expect("flush csv");
    path
}

/// Extraction service over `transport` with a generous limiter and no retries.
#[must_use]
#[allow(clippy::expect_used)]
pub fn scripted_service(transport: Arc<ScriptedTransport>) -> ExtractionService {
    let client = HttpClient::new(
        transport,
        Arc::new(RateLimiter::new(1000.0, 1000.0).expect("valid limiter")),
        Arc::new(CircuitBreaker::new("scripted", 5, Duration::from_secs(60))),
        RetryPolicy::no_retry(),
        Duration::from_secs(5),
    );
    ExtractionService::new(
        client,
        RequestBuilder::new(TEST_BASE_URL, 2000),
        ExtractionSettings::default(),
    )
}

/// Config for `entity` against [`TEST_BASE_URL`], writing to `output`, with
/// a frozen `extracted_at`.
#[must_use]
pub fn test_config(entity: &str, output: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::new("chembl", entity);
    config.output_path = output.to_path_buf();
    config.provider_config.base_url = Some(TEST_BASE_URL.to_string());
    config.provider_config.rate_limit.rate = 1000.0;
    config.provider_config.rate_limit.capacity = 1000.0;
    config.features.determinism.frozen_extracted_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
    config
}
