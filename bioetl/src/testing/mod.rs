//! Testing utilities for bioetl pipelines.
//!
//! This module provides:
//! - A scripted HTTP transport and recording hooks
//! - Payload and CSV fixtures
//! - Assertions over hashes and output files

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_csv_header, assert_hex64, read_csv};
pub use fixtures::{page_payload, scripted_service, test_config, write_csv, TEST_BASE_URL};
pub use mocks::{RecordingHooks, Reply, ScriptedTransport};
