//! Paginated and batched extraction over the resilient client.

use crate::cancellation::CancellationToken;
use crate::client::{parse_page, HttpClient, Page, QueryParams, RequestBuilder, Transport};
use crate::config::PipelineConfig;
use crate::errors::{EtlError, Result};
use crate::observability::PipelineMetrics;
use crate::record::{Record, Value};
use crate::resilience::{CircuitBreaker, RateLimiter};
use crate::schema::EntitySchema;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Paging and batching knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSettings {
    /// Records per page.
    pub page_size: usize,
    /// IDs per batched request before URL-length shrinking.
    pub batch_size: usize,
    /// Batches in flight at once.
    pub max_concurrent_batches: usize,
    /// Release probe endpoint.
    pub status_endpoint: String,
    /// Release identifier key in the probe payload.
    pub release_key: String,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            page_size: 1000,
            batch_size: 25,
            max_concurrent_batches: 1,
            status_endpoint: "status".to_string(),
            release_key: "chembl_db_version".to_string(),
        }
    }
}

/// Pulls entity records from the remote service.
#[derive(Debug)]
pub struct ExtractionService {
    client: HttpClient,
    requests: RequestBuilder,
    settings: ExtractionSettings,
    release: OnceCell<Option<String>>,
    cancel: CancellationToken,
}

fn as_param(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

impl ExtractionService {
    /// Creates a service.
    #[must_use]
    pub fn new(client: HttpClient, requests: RequestBuilder, settings: ExtractionSettings) -> Self {
        Self {
            client,
            requests,
            settings,
            release: OnceCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Wires limiter, breaker and client from a pipeline config.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` for invalid provider settings.
    pub fn from_config(
        config: &PipelineConfig,
        transport: Arc<dyn Transport>,
        metrics: Option<Arc<PipelineMetrics>>,
    ) -> Result<Self> {
        let source = config.resolved_source()?;
        let pc = &config.provider_config;

        let limiter = Arc::new(RateLimiter::from_config(&pc.rate_limit)?);
        let breaker = Arc::new(CircuitBreaker::from_config(
            format!("{}:{}", config.provider, source.base_url),
            &pc.circuit_breaker,
        ));
        let mut client = HttpClient::new(transport, limiter, breaker, pc.retries.clone(), pc.timeout());
        for (name, value) in &pc.headers {
            client = client.with_header(name.clone(), value.clone());
        }
        if let Some(metrics) = metrics {
            client = client.with_metrics(metrics);
        }

        let settings = ExtractionSettings {
            page_size: pc.page_size,
            batch_size: config.batch_size,
            max_concurrent_batches: pc.max_concurrent_batches,
            status_endpoint: source.status_endpoint,
            release_key: source.release_key,
        };
        Ok(Self::new(
            client,
            RequestBuilder::new(source.base_url, pc.max_url_length),
            settings,
        ))
    }

    /// Observes `token` between pages and batches.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Fetches one page of `schema`'s endpoint.
    ///
    /// # Errors
    ///
    /// Propagates URL, client and parse errors.
    pub async fn fetch_page(&self, schema: &EntitySchema, params: &QueryParams) -> Result<Page> {
        let url = self.requests.build(&schema.endpoint, params)?;
        let payload = self.client.get_json(&schema.endpoint, &url).await?;
        parse_page(payload, Some(&schema.records_key))
    }

    /// Follows pagination until `page_meta.next` is null, an empty page
    /// arrives, or `limit` records were collected.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and `CANCELLED`.
    pub async fn extract_all(
        &self,
        schema: &EntitySchema,
        filters: &QueryParams,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let page_size = limit.map_or(self.settings.page_size, |l| l.clamp(1, self.settings.page_size));
        let mut params = filters.clone();
        let mut offset: usize = 0;
        let mut records: Vec<Record> = Vec::new();
        let mut reported_total: Option<u64> = None;
        let mut pages = 0usize;

        loop {
            self.cancel.check()?;
            params.insert("limit".to_string(), as_param(page_size));
            params.insert("offset".to_string(), as_param(offset));

            let page = self.fetch_page(schema, &params).await?;
            pages += 1;
            let received = page.records.len();
            if reported_total.is_none() {
                reported_total = page.meta.as_ref().and_then(|m| m.total_count);
            }
            let has_more = page.has_more();
            let next_offset = page
                .meta
                .as_ref()
                .filter(|m| m.limit > 0)
                .and_then(|m| usize::try_from(m.next_offset()).ok())
                .unwrap_or(offset + received);
            records.extend(page.records);
            debug!(entity = %schema.entity, offset, received, has_more, "Fetched page");

            if let Some(limit) = limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    break;
                }
            }
            if received == 0 || !has_more {
                break;
            }
            if next_offset <= offset {
                return Err(EtlError::parse(format!(
                    "page_meta for {} does not advance past offset {offset} (next offset {next_offset})",
                    schema.entity
                )));
            }
            offset = next_offset;
        }

        if limit.is_none() {
            if let Some(total) = reported_total {
                if usize::try_from(total).ok() != Some(records.len()) {
                    warn!(
                        entity = %schema.entity,
                        total_count = total,
                        received = records.len(),
                        "total_count disagrees with paginated record count"
                    );
                }
            }
        }
        info!(entity = %schema.entity, pages, records = records.len(), "Extraction complete");
        Ok(records)
    }

    /// Largest batch size `<= start` whose every chunk URL fits.
    fn fit_batch_size(&self, schema: &EntitySchema, ids: &[String], start: usize) -> Result<usize> {
        let filter_key = schema.filter_key();
        let mut size = start.max(1);
        loop {
            let fits = ids.chunks(size).all(|chunk| {
                let params = batch_params(&filter_key, chunk);
                self.requests.render(&schema.endpoint, &params).len() <= self.requests.max_url_length()
            });
            if fits {
                return Ok(size);
            }
            if size == 1 {
                // a single ID still overflows; surface the builder's error
                if let Some(longest) = ids.iter().max_by_key(|id| id.len()) {
                    let params = batch_params(&filter_key, std::slice::from_ref(longest));
                    self.requests.build(&schema.endpoint, &params)?;
                }
                return Ok(1);
            }
            size -= 1;
        }
    }

    /// Fetches records for `ids` with `<id>__in` filters.
    ///
    /// The batch size shrinks to respect `max_url_length` and `limit`.
    /// Results follow the order of `ids`.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and `CANCELLED`.
    pub async fn request_batch(
        &self,
        schema: &EntitySchema,
        ids: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = match limit {
            Some(limit) => &ids[..limit.min(ids.len())],
            None => ids,
        };
        let start = limit.map_or(self.settings.batch_size, |l| l.clamp(1, self.settings.batch_size));
        let batch_size = self.fit_batch_size(schema, ids, start)?;
        if batch_size < start {
            debug!(entity = %schema.entity, from = start, to = batch_size, "Shrunk batch to fit URL length");
        }

        let filter_key = schema.filter_key();
        let batches: Vec<Vec<Record>> = stream::iter(ids.chunks(batch_size))
            .map(|chunk| {
                let params = batch_params(&filter_key, chunk);
                async move {
                    self.cancel.check()?;
                    let page = self.fetch_page(schema, &params).await?;
                    Ok::<_, EtlError>(page.records)
                }
            })
            .buffered(self.settings.max_concurrent_batches.max(1))
            .try_collect()
            .await?;

        let mut records: Vec<Record> = batches.into_iter().flatten().collect();
        order_by_ids(&mut records, &schema.id_column, ids);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Release identifier from the status endpoint, fetched once.
    ///
    /// # Errors
    ///
    /// Propagates client errors from the first probe.
    pub async fn get_release_version(&self) -> Result<Option<String>> {
        let release = self
            .release
            .get_or_try_init(|| async {
                let url = self
                    .requests
                    .build(&self.settings.status_endpoint, &QueryParams::new())?;
                let payload = self
                    .client
                    .get_json(&self.settings.status_endpoint, &url)
                    .await?;
                let version = match payload.get(&self.settings.release_key) {
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                    _ => {
                        warn!(key = %self.settings.release_key, "Status payload has no release identifier");
                        None
                    }
                };
                info!(release = ?version, "Resolved release version");
                Ok::<_, EtlError>(version)
            })
            .await?;
        Ok(release.clone())
    }
}

fn batch_params(filter_key: &str, chunk: &[String]) -> QueryParams {
    let mut params = QueryParams::new();
    params.insert(filter_key.to_string(), Value::Str(chunk.join(",")));
    params.insert("limit".to_string(), as_param(chunk.len()));
    params
}

/// Stable reorder of `records` by the position of their ID in `ids`.
fn order_by_ids(records: &mut [Record], id_column: &str, ids: &[String]) {
    let position: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    records.sort_by_key(|record| {
        record
            .get(id_column)
            .and_then(Value::to_cell)
            .and_then(|id| position.get(id.as_str()).copied())
            .unwrap_or(usize::MAX)
    });
}
