//! Scripted transport and recording hooks.

use crate::client::{HttpRequest, HttpResponse, Transport};
use crate::errors::{EtlError, Result};
use crate::pipeline::{PipelineHooks, RunContext, Stage, StageResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A canned transport outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    /// An HTTP response.
    Response(HttpResponse),
    /// A transport failure.
    NetworkError(String),
}

impl Reply {
    /// 200 with a JSON body.
    #[must_use]
    pub fn json(body: serde_json::Value) -> Self {
        Self::Response(HttpResponse::json(200, &body))
    }

    /// Status with a JSON body.
    #[must_use]
    pub fn status(status: u16, body: serde_json::Value) -> Self {
        Self::Response(HttpResponse::json(status, &body))
    }

    /// Connection-level failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError(message.into())
    }

    fn into_result(self, url: &str) -> Result<HttpResponse> {
        match self {
            Self::Response(response) => Ok(response),
            Self::NetworkError(message) => Err(EtlError::Network {
                url: url.to_string(),
                message,
            }),
        }
    }
}

#[derive(Debug)]
struct Route {
    needle: String,
    replies: VecDeque<Reply>,
}

/// Transport answering from routes matched by URL substring.
///
/// The first route whose needle occurs in the URL answers. A route with
/// several replies hands them out in order and repeats the last one.
/// Unmatched requests get the fallback, or a 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    fallback: Mutex<Option<Reply>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Creates a transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers URLs containing `needle` with `reply`.
    #[must_use]
    pub fn on(self, needle: impl Into<String>, reply: Reply) -> Self {
        self.on_sequence(needle, vec![reply])
    }

    /// Answers URLs containing `needle` with `replies` in order.
    #[must_use]
    pub fn on_sequence(self, needle: impl Into<String>, replies: Vec<Reply>) -> Self {
        self.routes.lock().push(Route {
            needle: needle.into(),
            replies: replies.into(),
        });
        self
    }

    /// Answers unmatched URLs with `reply`.
    #[must_use]
    pub fn fallback(self, reply: Reply) -> Self {
        *self.fallback.lock() = Some(reply);
        self
    }

    /// URLs requested so far.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Requests whose URL contains `needle`.
    #[must_use]
    pub fn request_count(&self, needle: &str) -> usize {
        self.requests.lock().iter().filter(|u| u.contains(needle)).count()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.routes.lock();
        if let Some(route) = routes.iter_mut().find(|r| url.contains(&r.needle)) {
            if route.replies.len() > 1 {
                if let Some(reply) = route.replies.pop_front() {
                    return reply;
                }
            }
            if let Some(reply) = route.replies.front() {
                return reply.clone();
            }
        }
        drop(routes);
        self.fallback
            .lock()
            .clone()
            .unwrap_or_else(|| Reply::status(404, serde_json::json!({"error": "no route"})))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request.url.clone());
        self.next_reply(&request.url).into_result(&request.url)
    }
}

/// Hooks that record events as `start:<stage>`, `end:<stage>:<ok|failed>`
/// and `error:<stage>:<KIND>`.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl RecordingHooks {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Number of `error:` events.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.starts_with("error:")).count()
    }
}

#[async_trait]
impl PipelineHooks for RecordingHooks {
    async fn on_stage_start(&self, _ctx: &RunContext, stage: Stage) {
        self.events.lock().push(format!("start:{stage}"));
    }

    async fn on_stage_end(&self, _ctx: &RunContext, result: &StageResult) {
        let outcome = if result.success { "ok" } else { "failed" };
        self.events
            .lock()
            .push(format!("end:{}:{outcome}", result.stage_name));
    }

    async fn on_error(&self, _ctx: &RunContext, stage: Stage, error: &EtlError) {
        self.events
            .lock()
            .push(format!("error:{stage}:{}", error.root_kind()));
    }
}
