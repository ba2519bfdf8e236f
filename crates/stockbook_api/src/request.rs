use std::marker::PhantomData;

use bytes::Bytes;
use http::{HeaderValue, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::ApiClient;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::params::QueryParams;
use crate::task::DeferredTask;
use crate::transport::{ApiRequest, TransportResponse};

/// One typed HTTP operation against an endpoint.
///
/// Built fluently, consumed by exactly one terminal method. Every terminal
/// dispatches through the shared client's stack, so admission control and
/// retry apply uniformly — resource wrappers cannot skip them.
pub struct RequestBuilder<T> {
    client: ApiClient,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    _success: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> RequestBuilder<T> {
    pub(crate) fn new(endpoint: &Endpoint, relative_path: &str) -> Self {
        let relative = relative_path.trim_matches('/');
        let path = if relative.is_empty() {
            endpoint.base_path().to_string()
        } else {
            format!("{}/{}", endpoint.base_path(), relative)
        };
        Self {
            client: endpoint.client().clone(),
            path,
            query: Vec::new(),
            body: None,
            _success: PhantomData,
        }
    }

    /// Attaches the structured parameter object.
    pub fn query(mut self, params: &QueryParams) -> Self {
        self.query.extend(params.to_pairs());
        self
    }

    /// Attaches a single raw query pair.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Serializes `payload` as the JSON request body.
    pub fn json_body<B: Serialize>(mut self, payload: &B) -> Result<Self, Error> {
        let encoded = serde_json::to_vec(payload).map_err(|err| Error::RequestBuild {
            details: format!("failed to encode request body: {err}"),
        })?;
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    pub async fn get(self) -> Result<T, Error> {
        let response = self.execute(Method::GET).await?;
        decode_success(response)
    }

    pub async fn post(self) -> Result<T, Error> {
        let response = self.execute(Method::POST).await?;
        decode_success(response)
    }

    pub async fn put(self) -> Result<T, Error> {
        let response = self.execute(Method::PUT).await?;
        decode_success(response)
    }

    /// Deletes the resource. Delete responses carry no payload, so a
    /// 200-class status maps to plain boolean success; an application error
    /// is surfaced as [`Error::Api`] (the resource was not deleted).
    pub async fn delete(self) -> Result<bool, Error> {
        self.execute(Method::DELETE).await.map(|_| true)
    }

    /// Issues the request with the `async=true` marker and returns a handle
    /// to the server-side task instead of an inline result.
    ///
    /// A convenience for long-running imports/exports; the handle polls
    /// through the same admission-controlled path as everything else.
    pub async fn post_deferred(mut self) -> Result<DeferredTask, Error> {
        self.query.push(("async".to_string(), "true".to_string()));
        let client = self.client.clone();
        let response = self.execute(Method::POST).await?;
        DeferredTask::from_response(client, response)
    }

    /// Deferred variant of [`RequestBuilder::get`], for report exports.
    pub async fn get_deferred(mut self) -> Result<DeferredTask, Error> {
        self.query.push(("async".to_string(), "true".to_string()));
        let client = self.client.clone();
        let response = self.execute(Method::GET).await?;
        DeferredTask::from_response(client, response)
    }

    /// Runs the call and classifies the outcome: transport errors and
    /// non-success statuses become typed errors, success responses pass
    /// through for decoding.
    async fn execute(self, method: Method) -> Result<TransportResponse, Error> {
        let url = self.build_url()?;
        let mut headers = self.client.default_headers().clone();
        if self.body.is_some() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        debug!(target: "stockbook_api::request", %method, url = %url, "dispatching request");

        let request = ApiRequest {
            method,
            url: url.into(),
            headers,
            body: self.body,
        };
        let response = self.client.clone().dispatch(request).await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            debug!(
                target: "stockbook_api::request",
                %status,
                body_len = response.body().len(),
                "request rejected by the service"
            );
            Err(Error::from_failure_response(status.as_u16(), response.body()))
        }
    }

    fn build_url(&self) -> Result<Url, Error> {
        let base = self.client.base_url().trim_end_matches('/');
        let mut url =
            Url::parse(&format!("{base}/{}", self.path)).map_err(|err| Error::RequestBuild {
                details: format!("invalid request URL for path '{}': {err}", self.path),
            })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn decode_success<T: DeserializeOwned>(response: TransportResponse) -> Result<T, Error> {
    let status = response.status().as_u16();
    serde_json::from_slice(response.body()).map_err(|source| {
        error!(
            target: "stockbook_api::request",
            status,
            error = %source,
            "success response did not match the expected type"
        );
        Error::Decode { status, source }
    })
}
