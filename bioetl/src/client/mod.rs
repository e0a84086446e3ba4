//! HTTP access to the remote data service.
//!
//! This module provides:
//! - `Transport`: one raw round-trip, backed by `reqwest` in production
//! - `HttpClient`: rate limiter, circuit breaker, deadline and retry around a transport
//! - `RequestBuilder`: deterministic URL construction
//! - `parse_page`: record array and `page_meta` extraction

mod http;
mod request;
mod response;
mod transport;

pub use http::{HttpClient, IDEMPOTENCY_HEADER};
pub use request::{QueryParams, RequestBuilder};
pub use response::{parse_page, Page, PageMeta};
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
