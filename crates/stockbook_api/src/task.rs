//! Handles for server-side tasks started with the `async=true` marker.

use std::fmt;

use http::{Method, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::client::ApiClient;
use crate::error::{ApiError, Error};
use crate::transport::{ApiRequest, TransportResponse};

/// Execution state reported by the task status resource.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Error,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub state: TaskState,
    /// Where the finished payload can be fetched once `state` is `DONE`.
    #[serde(default, rename = "resultUrl")]
    pub result_url: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

/// Handle to a deferred server-side operation.
///
/// Returned instead of an inline result when a request is issued with the
/// `async=true` marker: the service answers 202 with a `Location` header
/// pointing at the task status resource. Polling and result download go
/// through the same admission-controlled dispatch path as any other call.
#[derive(Clone)]
pub struct DeferredTask {
    client: ApiClient,
    status_url: String,
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("status_url", &self.status_url)
            .finish_non_exhaustive()
    }
}

impl DeferredTask {
    pub(crate) fn from_response(
        client: ApiClient,
        response: TransportResponse,
    ) -> Result<Self, Error> {
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok());
        match location {
            Some(url) => {
                debug!(target: "stockbook_api::task", status, status_url = url, "deferred task accepted");
                Ok(Self {
                    client,
                    status_url: url.to_string(),
                })
            }
            None => {
                // The service accepted the async marker but did not say
                // where the task lives; that is a contract mismatch.
                Err(Error::Decode {
                    status,
                    source: serde::de::Error::custom(
                        "deferred dispatch response carried no Location header",
                    ),
                })
            }
        }
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// Fetches the current task state.
    pub async fn status(&self) -> Result<TaskStatus, Error> {
        let response = self.fetch(&self.status_url).await?;
        let status = response.status().as_u16();
        serde_json::from_slice(response.body()).map_err(|source| Error::Decode { status, source })
    }

    /// Downloads and decodes the finished payload.
    ///
    /// A task still pending or running surfaces as [`Error::Api`] carrying
    /// no vendor errors; a task that finished in error surfaces its error
    /// list the same way.
    pub async fn result<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let report = self.status().await?;
        match report.state {
            TaskState::Done => {
                let url = report.result_url.ok_or_else(|| Error::Decode {
                    status: 200,
                    source: serde::de::Error::custom("finished task carried no resultUrl"),
                })?;
                let response = self.fetch(&url).await?;
                let status = response.status().as_u16();
                serde_json::from_slice(response.body())
                    .map_err(|source| Error::Decode { status, source })
            }
            TaskState::Error => Err(Error::Api {
                status: 200,
                errors: report.errors,
            }),
            TaskState::Pending | TaskState::Running => Err(Error::Api {
                status: 200,
                errors: Vec::new(),
            }),
        }
    }

    async fn fetch(&self, url: &str) -> Result<TransportResponse, Error> {
        let request = ApiRequest {
            method: Method::GET,
            url: url.to_string(),
            headers: self.client.default_headers().clone(),
            body: None,
        };
        let response = self.client.clone().dispatch(request).await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::from_failure_response(status.as_u16(), response.body()))
        }
    }
}
