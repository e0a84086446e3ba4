//! Lifecycle hooks around stage execution.

use super::context::RunContext;
use super::result::StageResult;
use super::stage::Stage;
use crate::errors::EtlError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// Observer of stage lifecycle events.
#[async_trait]
pub trait PipelineHooks: Send + Sync {
    /// Called before each attempt sequence of a stage.
    async fn on_stage_start(&self, _ctx: &RunContext, _stage: Stage) {}

    /// Called once a stage has a final result.
    async fn on_stage_end(&self, _ctx: &RunContext, _result: &StageResult) {}

    /// Called exactly once per failed attempt.
    async fn on_error(&self, _ctx: &RunContext, _stage: Stage, _error: &EtlError) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

#[async_trait]
impl PipelineHooks for LoggingHooks {
    async fn on_stage_start(&self, ctx: &RunContext, stage: Stage) {
        debug!(run_id = %ctx.run_id(), stage = %stage, "Stage starting");
    }

    async fn on_stage_end(&self, ctx: &RunContext, result: &StageResult) {
        debug!(
            run_id = %ctx.run_id(),
            stage = %result.stage_name,
            success = result.success,
            records = result.records_processed,
            duration_sec = result.duration_sec,
            "Stage finished"
        );
    }

    async fn on_error(&self, ctx: &RunContext, stage: Stage, err: &EtlError) {
        error!(
            run_id = %ctx.run_id(),
            stage = %stage,
            kind = %err.root_kind(),
            error = %err,
            "Stage error"
        );
    }
}

/// Hooks invoked in registration order.
#[derive(Default, Clone)]
pub struct HookChain {
    hooks: Vec<Arc<dyn PipelineHooks>>,
}

impl HookChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook.
    pub fn add(&mut self, hook: Arc<dyn PipelineHooks>) {
        self.hooks.push(hook);
    }

    /// Number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain").field("hooks", &self.hooks.len()).finish()
    }
}

#[async_trait]
impl PipelineHooks for HookChain {
    async fn on_stage_start(&self, ctx: &RunContext, stage: Stage) {
        for hook in &self.hooks {
            hook.on_stage_start(ctx, stage).await;
        }
    }

    async fn on_stage_end(&self, ctx: &RunContext, result: &StageResult) {
        for hook in &self.hooks {
            hook.on_stage_end(ctx, result).await;
        }
    }

    async fn on_error(&self, ctx: &RunContext, stage: Stage, err: &EtlError) {
        for hook in &self.hooks {
            hook.on_error(ctx, stage, err).await;
        }
    }
}
