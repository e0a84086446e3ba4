//! In-process counters and histograms for one pipeline run.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

/// Stage duration histogram.
pub const STAGE_DURATION: &str = "bioetl_stage_duration_seconds";
/// Stage count by outcome.
pub const STAGE_TOTAL: &str = "bioetl_stage_total";
/// HTTP request count.
pub const HTTP_REQUESTS_TOTAL: &str = "bioetl_http_requests_total";
/// HTTP latency histogram.
pub const HTTP_LATENCY: &str = "bioetl_http_latency_seconds";

const BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Sorted label set.
pub type Labels = BTreeMap<&'static str, String>;

type SeriesKey = (&'static str, Vec<(&'static str, String)>);

#[derive(Debug, Clone, Default)]
struct Histogram {
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        if self.buckets.is_empty() {
            self.buckets = vec![0; BUCKETS.len()];
        }
        for (slot, bound) in self.buckets.iter_mut().zip(BUCKETS) {
            if value <= *bound {
                *slot += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

/// Metric sink labelled with `pipeline`, `provider` and `entity`.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    base: Labels,
    counters: DashMap<SeriesKey, u64>,
    histograms: DashMap<SeriesKey, Histogram>,
}

/// Collapses a status code into `2xx`, `4xx`, ... ; `0` means no response.
#[must_use]
pub fn status_class(status: u16) -> String {
    if status == 0 {
        "error".to_string()
    } else {
        format!("{}xx", status / 100)
    }
}

impl PipelineMetrics {
    /// Creates a sink for one pipeline.
    #[must_use]
    pub fn new(pipeline: &str, provider: &str, entity: &str) -> Self {
        let mut base = Labels::new();
        base.insert("pipeline", pipeline.to_string());
        base.insert("provider", provider.to_string());
        base.insert("entity", entity.to_string());
        Self {
            base,
            counters: DashMap::new(),
            histograms: DashMap::new(),
        }
    }

    fn key(&self, name: &'static str, extra: &[(&'static str, &str)]) -> SeriesKey {
        let mut labels = self.base.clone();
        for (k, v) in extra {
            labels.insert(*k, (*v).to_string());
        }
        (name, labels.into_iter().collect())
    }

    /// Adds `by` to a counter.
    pub fn increment(&self, name: &'static str, labels: &[(&'static str, &str)], by: u64) {
        *self.counters.entry(self.key(name, labels)).or_insert(0) += by;
    }

    /// Records a histogram sample.
    pub fn observe(&self, name: &'static str, labels: &[(&'static str, &str)], value: f64) {
        self.histograms
            .entry(self.key(name, labels))
            .or_default()
            .observe(value);
    }

    /// Records a finished stage.
    pub fn record_stage(&self, stage: &str, success: bool, duration: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.increment(STAGE_TOTAL, &[("stage", stage), ("outcome", outcome)], 1);
        self.observe(STAGE_DURATION, &[("stage", stage)], duration.as_secs_f64());
    }

    /// Records an HTTP round-trip. `status` is `0` for transport failures.
    pub fn record_http(&self, endpoint: &str, method: &str, status: u16, latency: Duration) {
        let class = status_class(status);
        self.increment(
            HTTP_REQUESTS_TOTAL,
            &[("endpoint", endpoint), ("method", method), ("status_class", &class)],
            1,
        );
        self.observe(
            HTTP_LATENCY,
            &[("endpoint", endpoint), ("method", method)],
            latency.as_secs_f64(),
        );
    }

    /// Current value of a counter series.
    #[must_use]
    pub fn counter(&self, name: &'static str, labels: &[(&'static str, &str)]) -> u64 {
        self.counters
            .get(&self.key(name, labels))
            .map_or(0, |v| *v)
    }

    /// Sample count of a histogram series.
    #[must_use]
    pub fn histogram_count(&self, name: &'static str, labels: &[(&'static str, &str)]) -> u64 {
        self.histograms
            .get(&self.key(name, labels))
            .map_or(0, |h| h.count)
    }

    /// Renders all series in text exposition format, sorted by name and labels.
    #[must_use]
    pub fn render(&self) -> String {
        let mut counters: Vec<(SeriesKey, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));

        let mut histograms: Vec<(SeriesKey, Histogram)> = self
            .histograms
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        for ((name, labels), value) in counters {
            let _ = writeln!(out, "{name}{{{}}} {value}", render_labels(&labels, None));
        }
        for ((name, labels), hist) in histograms {
            for (bound, count) in BUCKETS.iter().zip(&hist.buckets) {
                let le = bound.to_string();
                let _ = writeln!(
                    out,
                    "{name}_bucket{{{}}} {count}",
                    render_labels(&labels, Some(&le))
                );
            }
            let _ = writeln!(
                out,
                "{name}_bucket{{{}}} {}",
                render_labels(&labels, Some("+Inf")),
                hist.count
            );
            let _ = writeln!(out, "{name}_sum{{{}}} {:.6}", render_labels(&labels, None), hist.sum);
            let _ = writeln!(out, "{name}_count{{{}}} {}", render_labels(&labels, None), hist.count);
        }
        out
    }
}

fn render_labels(labels: &[(&'static str, String)], le: Option<&str>) -> String {
    let mut parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    if let Some(le) = le {
        parts.push(format!("le=\"{le}\""));
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(429), "4xx");
        assert_eq!(status_class(0), "error");
    }

    #[test]
    fn test_http_counters_are_labelled() {
        let metrics = PipelineMetrics::new("activity_chembl", "chembl", "activity");
        metrics.record_http("activity", "GET", 200, Duration::from_millis(40));
        metrics.record_http("activity", "GET", 200, Duration::from_millis(60));
        metrics.record_http("activity", "GET", 503, Duration::from_millis(10));

        let ok = [("endpoint", "activity"), ("method", "GET"), ("status_class", "2xx")];
        assert_eq!(metrics.counter(HTTP_REQUESTS_TOTAL, &ok), 2);
        assert_eq!(
            metrics.histogram_count(HTTP_LATENCY, &[("endpoint", "activity"), ("method", "GET")]),
            3
        );
    }

    #[test]
    fn test_render_is_sorted_and_labelled() {
        let metrics = PipelineMetrics::new("assay_chembl", "chembl", "assay");
        metrics.record_stage("extract", true, Duration::from_millis(5));
        metrics.record_stage("write", false, Duration::from_millis(1));

        let text = metrics.render();
        let extract = text
            .find("bioetl_stage_total{entity=\"assay\",outcome=\"success\",pipeline=\"assay_chembl\",provider=\"chembl\",stage=\"extract\"} 1")
            .unwrap();
        let write = text.find("stage=\"write\"} 1").unwrap();
        assert!(extract < write);
        assert!(text.contains("bioetl_stage_duration_seconds_count{"));
        assert!(text.contains("le=\"+Inf\""));
    }
}
