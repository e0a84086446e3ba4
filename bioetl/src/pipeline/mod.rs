//! Stage orchestration.
//!
//! This module provides:
//! - The fixed stage sequence and per-stage error policies
//! - Run context, stage results and lifecycle hooks
//! - The [`Pipeline`] orchestrator

mod context;
mod hooks;
mod integration_tests;
mod orchestrator;
mod policy;
mod result;
mod stage;

pub use context::RunContext;
pub use hooks::{HookChain, LoggingHooks, PipelineHooks};
pub use orchestrator::{run_pipeline, stage_summary, Pipeline, RunOptions};
pub use policy::{ErrorPolicy, PolicyTable};
pub use result::{RunResult, StageResult};
pub use stage::{Stage, STAGES};
