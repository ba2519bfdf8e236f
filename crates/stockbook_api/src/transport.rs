//! Pluggable HTTP transport seam.
//!
//! The dispatch stack is written against [`HttpService`], a boxed
//! `tower::Service`, so tests (and any embedder with its own HTTP stack) can
//! substitute the transport. [`ReqwestTransport`] is the production
//! implementation.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, Response as HttpResponse};
use snafu::Snafu;
use std::task::{Context, Poll};
use tower::Service;
use tower::util::BoxCloneService;

use crate::BoxError;

/// Wire request handed to the transport.
///
/// Deliberately a plain struct rather than `http::Request`: it is cheap to
/// clone, which the retry policy needs to re-issue an attempt.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Response shape produced by every transport. Carries any HTTP status;
/// classification is the retry policy's and the request builder's job.
pub type TransportResponse = HttpResponse<Bytes>;

/// Raised only when no usable HTTP response was obtained. A completed
/// exchange, whatever its status, is a `TransportResponse`, never one of
/// these.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("request timed out"))]
    Timeout,

    #[snafu(display("connection failure: {source}"))]
    Connect { source: BoxError },

    #[snafu(display("invalid request: {details}"))]
    InvalidRequest { details: String },

    #[snafu(display("transport failure: {source}"))]
    Other { source: BoxError },
}

/// Boxed transport the client stack is built over.
pub type HttpService = BoxCloneService<ApiRequest, TransportResponse, TransportError>;

/// Rate-limit signaling headers exposed by Stockbook on every response.
///
/// Parsed for diagnostics only: the fixed-rate bucket in
/// [`crate::admission`] does not read these back to adapt its rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests remaining in the server-side window.
    pub remaining: Option<u64>,
    /// Time until the server-side window resets.
    pub reset: Option<Duration>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let reset = headers
            .get("x-ratelimit-reset")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .map(Duration::from_millis);
        if remaining.is_none() && reset.is_none() {
            None
        } else {
            Some(Self { remaining, reset })
        }
    }
}

/// `tower::Service` wrapper for `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<ApiRequest> for ReqwestTransport {
    type Response = TransportResponse;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        let url = match reqwest::Url::parse(&request.url) {
            Ok(url) => url,
            Err(parse_err) => {
                let invalid = TransportError::InvalidRequest {
                    details: format!("invalid URL '{}': {parse_err}", request.url),
                };
                return Box::pin(async move { Err(invalid) });
            }
        };

        let mut builder = self.client.request(request.method, url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(payload) = request.body {
            builder = builder.body(payload);
        }

        let pending = builder.send();
        Box::pin(async move {
            let response = pending.await.map_err(classify_reqwest_error)?;
            let status = response.status();
            let headers = response.headers().clone();

            if let Some(info) = RateLimitInfo::from_headers(&headers) {
                debug!(
                    target: "stockbook_api::transport",
                    %status,
                    remaining = info.remaining,
                    reset_ms = info.reset.map(|d| d.as_millis() as u64),
                    "rate limit headers observed"
                );
            }

            let body = response
                .bytes()
                .await
                .map_err(|err| TransportError::Other { source: Box::new(err) })?;

            let mut mapped = HttpResponse::new(body);
            *mapped.status_mut() = status;
            *mapped.headers_mut() = headers;
            Ok(mapped)
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        warn!(target: "stockbook_api::transport", error = %err, "request timed out");
        TransportError::Timeout
    } else if err.is_connect() {
        error!(target: "stockbook_api::transport", error = %err, "connection error");
        TransportError::Connect {
            source: Box::new(err),
        }
    } else {
        error!(target: "stockbook_api::transport", error = %err, "transport error");
        TransportError::Other {
            source: Box::new(err),
        }
    }
}
