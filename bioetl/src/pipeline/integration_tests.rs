//! End-to-end runs of the stage sequence over scripted upstreams.

#[cfg(test)]
mod tests {
    use crate::config::{ConfigLoader, InputMode, PipelineConfig};
    use crate::errors::{ErrorKind, EtlError};
    use crate::output::META_FILE;
    use crate::pipeline::{ErrorPolicy, Pipeline, RunOptions, Stage};
    use crate::resilience::RateLimiter;
    use crate::schema::{entities, HASH_ROW};
    use crate::testing::{
        assert_csv_header, page_payload, read_csv, test_config, write_csv, RecordingHooks, Reply,
        ScriptedTransport, TEST_BASE_URL,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokio::time::{Duration, Instant};

    const TARGET_HEADER: [&str; 4] = ["target_chembl_id", "pref_name", "target_type", "organism"];

    fn config_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs")
    }

    fn status_reply() -> Reply {
        Reply::json(json!({"chembl_db_version": "ChEMBL_34"}))
    }

    fn target_rows(n: usize) -> Vec<serde_json::Value> {
        (1..=n)
            .map(|i| {
                json!({
                    "target_chembl_id": format!("CHEMBL{i}"),
                    "pref_name": format!("Target {i}"),
                    "target_type": "SINGLE PROTEIN",
                    "organism": "Homo sapiens",
                })
            })
            .collect()
    }

    fn target_csv(dir: &Path, n: usize) -> PathBuf {
        let rows: Vec<Vec<String>> = (1..=n)
            .map(|i| {
                vec![
                    format!("CHEMBL{i}"),
                    format!("Target {i}"),
                    "SINGLE PROTEIN".to_string(),
                    "Homo sapiens".to_string(),
                ]
            })
            .collect();
        let refs: Vec<Vec<&str>> = rows.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
        let slices: Vec<&[&str]> = refs.iter().map(Vec::as_slice).collect();
        write_csv(dir, "targets.csv", &TARGET_HEADER, &slices)
    }

    fn read_meta(dir: &Path) -> serde_yaml::Value {
        let text = std::fs::read_to_string(dir.join(META_FILE)).unwrap();
        serde_yaml::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let ids = write_csv(
            input.path(),
            "activity_ids.csv",
            &["activity_id"],
            &[&["101"], &["102"], &["103"], &["104"], &["105"]],
        );

        let mut config = ConfigLoader::new(config_root()).load("activity_chembl").unwrap();
        config.input_mode = InputMode::Csv;
        config.input_path = Some(ids);
        config.output_path = output.path().join("activity");
        config.provider_config.base_url = Some(TEST_BASE_URL.to_string());

        let activities: Vec<serde_json::Value> = (101..=105)
            .map(|id| json!({"activity_id": id, "standard_type": "IC50", "standard_value": 12.5}))
            .collect();
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("/status", status_reply())
                .on(
                    "/activity.json",
                    Reply::json(page_payload("activities", activities, 0, 25, Some(5), false)),
                ),
        );

        let result = Pipeline::with_transport(config, transport.clone())
            .unwrap()
            .run(RunOptions::dry_run())
            .await
            .unwrap();

        assert!(result.success);
        let names: Vec<&str> = result.stages.iter().map(|s| s.stage_name.as_str()).collect();
        assert_eq!(names, vec!["extract", "transform", "validate", "hash"]);
        assert!(result.stages.iter().all(|s| s.success));
        assert_eq!(result.row_count, 5);
        assert!(result.output_path.is_none());
        assert!(!output.path().join("activity").exists());
        assert_eq!(transport.request_count("activity_id__in=101%2C102%2C103%2C104%2C105"), 1);
    }

    #[tokio::test]
    async fn test_full_csv_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config("target", &dir.path().join("out"));
        config.input_mode = InputMode::Csv;
        config.input_path = Some(target_csv(dir.path(), 10));
        let transport = Arc::new(ScriptedTransport::new());

        let result = Pipeline::with_transport(config, transport.clone())
            .unwrap()
            .run(RunOptions::default().with_limit(2))
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.errors);
        let output = dir.path().join("out").join("target.csv");
        assert_eq!(result.output_path.as_deref(), Some(output.as_path()));
        assert_csv_header(&output, &entities::target().output_view());

        let (header, rows) = read_csv(&output);
        assert_eq!(rows.len(), 2);
        let hash_at = header.iter().position(|c| c == HASH_ROW).unwrap();
        assert!(rows.iter().all(|r| r[hash_at].len() == 64));

        let meta = read_meta(&dir.path().join("out"));
        assert_eq!(meta["row_count"], serde_yaml::Value::from(2));
        assert_eq!(meta["source"]["source_type"], serde_yaml::Value::from("csv_full"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_id_only_csv_keeps_input_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let ids = write_csv(
            dir.path(),
            "target_ids.csv",
            &["target_chembl_id"],
            &[&["CHEMBL3"], &["CHEMBL1"], &["CHEMBL2"]],
        );
        let mut config = test_config("target", &dir.path().join("out"));
        config.input_mode = InputMode::CsvIds;
        config.input_path = Some(ids);
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("/status", status_reply())
                .on(
                    "/target.json",
                    Reply::json(page_payload("targets", target_rows(3), 0, 25, Some(3), false)),
                ),
        );

        let result = Pipeline::with_transport(config, transport)
            .unwrap()
            .run(RunOptions::default())
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.errors);
        let (header, rows) = read_csv(&dir.path().join("out").join("target.csv"));
        let id = header.iter().position(|c| c == "target_chembl_id").unwrap();
        let index = header.iter().position(|c| c == "index").unwrap();
        let order: Vec<(&str, &str)> = rows.iter().map(|r| (r[id].as_str(), r[index].as_str())).collect();
        assert_eq!(order, vec![("CHEMBL3", "0"), ("CHEMBL1", "1"), ("CHEMBL2", "2")]);
    }

    #[tokio::test]
    async fn test_invalid_doi_becomes_null() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new().on("/status", status_reply()).on(
                "/document.json",
                Reply::json(page_payload(
                    "documents",
                    vec![json!({
                        "document_chembl_id": "CHEMBL1139451",
                        "doc_type": "PUBLICATION",
                        "doi": "not-a-doi",
                        "year": 2004,
                    })],
                    0,
                    1000,
                    Some(1),
                    false,
                )),
            ),
        );

        let result = Pipeline::with_transport(test_config("document", dir.path()), transport)
            .unwrap()
            .run(RunOptions::default())
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.errors);

        let (header, rows) = read_csv(&dir.path().join("document.csv"));
        let doi = header.iter().position(|c| c == "doi").unwrap();
        let hash = header.iter().position(|c| c == HASH_ROW).unwrap();
        assert_eq!(rows[0][doi], "");
        assert_eq!(rows[0][hash].len(), 64);
    }

    #[tokio::test]
    async fn test_enum_violation_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new().on("/status", status_reply()).on(
                "/assay.json",
                Reply::json(page_payload(
                    "assays",
                    vec![json!({"assay_chembl_id": "CHEMBL1217643", "assay_type": "X"})],
                    0,
                    1000,
                    Some(1),
                    false,
                )),
            ),
        );
        let hooks = Arc::new(RecordingHooks::new());

        let err = Pipeline::with_transport(test_config("assay", dir.path()), transport)
            .unwrap()
            .with_hook(hooks.clone())
            .run(RunOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.root_kind(), ErrorKind::ValidationError);
        let EtlError::Stage(stage) = &err else {
            panic!("expected stage error, got {err:?}");
        };
        assert_eq!(stage.stage, "validate");
        let EtlError::Validation(validation) = &stage.cause else {
            panic!("expected validation cause");
        };
        let case = &validation.failures[0];
        assert_eq!(case.column, "assay_type");
        assert_eq!(case.value, "X");
        assert_eq!(case.check, "isin[B,F,A,T,P,U]");
        assert_eq!(hooks.error_count(), 1);
        assert!(!dir.path().join("assay.csv").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_network_failures_are_retried() {
        let page = || Reply::json(page_payload("targets", target_rows(3), 0, 1000, Some(3), false));

        let baseline_dir = tempfile::tempdir().unwrap();
        let baseline = Arc::new(ScriptedTransport::new().on("/status", status_reply()).on("/target.json", page()));
        let expected = Pipeline::with_transport(test_config("target", baseline_dir.path()), baseline)
            .unwrap()
            .run(RunOptions::default())
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let flaky = Arc::new(ScriptedTransport::new().on("/status", status_reply()).on_sequence(
            "/target.json",
            vec![Reply::network("connection reset"), Reply::network("connection reset"), page()],
        ));
        let config = test_config("target", dir.path());
        let retries = config.provider_config.retries.clone();

        let started = Instant::now();
        let result = Pipeline::with_transport(config, flaky.clone())
            .unwrap()
            .run(RunOptions::default())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(result.success);
        assert_eq!(flaky.request_count("/target.json"), 3);
        let minimum = Duration::from_secs_f64(retries.base_delay_seconds * (1.0 + retries.backoff_factor));
        assert!(elapsed >= minimum, "{elapsed:?} < {minimum:?}");
        assert_eq!(result.metadata["checksum"], expected.metadata["checksum"]);
        assert_eq!(
            std::fs::read(dir.path().join("target.csv")).unwrap(),
            std::fs::read(baseline_dir.path().join("target.csv")).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_throttles_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let pages: Vec<Reply> = (0..19u64)
            .map(|i| {
                let rows = vec![json!({"target_chembl_id": format!("CHEMBL{}", i + 1)})];
                Reply::json(page_payload("targets", rows, i, 1, Some(19), i < 18))
            })
            .collect();
        let transport = Arc::new(
            ScriptedTransport::new()
                .on("/status", status_reply())
                .on_sequence("/target.json", pages),
        );
        let mut config = test_config("target", dir.path());
        config.provider_config.page_size = 1;
        config.provider_config.rate_limit.rate = 5.0;
        config.provider_config.rate_limit.capacity = 5.0;

        let started = Instant::now();
        let result = Pipeline::with_transport(config, transport.clone())
            .unwrap()
            .run(RunOptions::dry_run())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        let requests = transport.requests().len();
        assert_eq!(requests, 20);
        assert_eq!(result.row_count, 19);
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        #[allow(clippy::cast_precision_loss)]
        let steady_rate = (requests - 5) as f64 / elapsed.as_secs_f64();
        assert!(steady_rate <= 5.0 + 1e-9, "{steady_rate}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_bound_holds_for_direct_acquires() {
        let limiter = RateLimiter::new(5.0, 5.0).unwrap();
        let started = Instant::now();
        for _ in 0..20 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_byte_identical() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let transport = || {
            Arc::new(
                ScriptedTransport::new()
                    .on("/status", status_reply())
                    .on("/target.json", Reply::json(page_payload("targets", target_rows(4), 0, 1000, Some(4), false))),
            )
        };

        let a = Pipeline::with_transport(test_config("target", first.path()), transport())
            .unwrap()
            .run(RunOptions::default())
            .await
            .unwrap();
        let b = Pipeline::with_transport(test_config("target", second.path()), transport())
            .unwrap()
            .run(RunOptions::default())
            .await
            .unwrap();

        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.metadata["checksum"], b.metadata["checksum"]);
        assert_eq!(
            std::fs::read(first.path().join("target.csv")).unwrap(),
            std::fs::read(second.path().join("target.csv")).unwrap()
        );
        let meta = read_meta(first.path());
        assert_eq!(meta["timestamp"], serde_yaml::Value::from("2024-01-01T00:00:00+00:00"));
        assert_eq!(meta["source"]["release_version"], serde_yaml::Value::from("ChEMBL_34"));
    }

    #[tokio::test]
    async fn test_retry_policy_reruns_failed_stage() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new().on("/status", status_reply()).on_sequence(
                "/target.json",
                vec![
                    Reply::status(400, json!({"error": "bad filter"})),
                    Reply::json(page_payload("targets", target_rows(2), 0, 1000, Some(2), false)),
                ],
            ),
        );
        let mut config: PipelineConfig = test_config("target", dir.path());
        config.provider_config.retries.base_delay_seconds = 0.01;
        let hooks = Arc::new(RecordingHooks::new());

        let result = Pipeline::with_transport(config, transport)
            .unwrap()
            .with_stage_policy(Stage::Extract, ErrorPolicy::Retry)
            .with_hook(hooks.clone())
            .run(RunOptions::dry_run())
            .await
            .unwrap();

        let extract = result.stage(Stage::Extract).unwrap();
        assert!(extract.success);
        assert_eq!(extract.attempts, 2);
        assert_eq!(hooks.error_count(), 1);
        assert_eq!(result.row_count, 2);
    }
}
