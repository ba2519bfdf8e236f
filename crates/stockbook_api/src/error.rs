use bytes::Bytes;
use serde::Deserialize;
use snafu::Snafu;

use crate::transport::TransportError;

/// A single structured error item from a Stockbook error response.
///
/// Failure bodies carry `{"errors": [ ... ]}` with one item per rejected
/// field or rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    /// Human-readable description of the rejection.
    pub message: String,
    /// Vendor error code, when the service assigns one.
    #[serde(default)]
    pub code: Option<u32>,
    /// Link to the vendor documentation for this error.
    #[serde(default, rename = "moreInfo")]
    pub more_info: Option<String>,
    /// Request parameter the error refers to, when field-level.
    #[serde(default)]
    pub parameter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    errors: Vec<ApiError>,
}

/// Failures surfaced to callers of the dispatch core.
///
/// The four variants match the four caller-visible outcomes: could not reach
/// the service, service rejected the request, service answered success with
/// a body that does not match the expected type, or the request could not be
/// assembled locally. Cancellation is not an error value; dropping a request
/// future aborts the call and releases its admission slot.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// No HTTP response was obtained (DNS, connection, timeout).
    #[snafu(display("transport failure: {source}"))]
    Transport { source: TransportError },

    /// The service answered with a non-success status. 429 and >= 502 land
    /// here only after the retry budget is exhausted.
    #[snafu(display("api rejected the request (status {status}): {}", first_message(errors)))]
    Api { status: u16, errors: Vec<ApiError> },

    /// A success response whose body did not match the expected type.
    #[snafu(display("failed to decode success response (status {status}): {source}"))]
    Decode {
        status: u16,
        source: serde_json::Error,
    },

    /// The request could not be built before dispatch.
    #[snafu(display("failed to build request: {details}"))]
    RequestBuild { details: String },
}

impl Error {
    /// HTTP status of the response this error was decoded from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } | Error::Decode { status, .. } => Some(*status),
            Error::Transport { .. } | Error::RequestBuild { .. } => None,
        }
    }

    /// Builds the application error for a completed non-success response.
    ///
    /// Bodies that do not parse as the vendor error list degrade to a single
    /// synthesized item carrying the raw body, so no detail is dropped.
    pub(crate) fn from_failure_response(status: u16, body: &Bytes) -> Self {
        let errors = match serde_json::from_slice::<ApiErrorBody>(body) {
            Ok(parsed) => parsed.errors,
            Err(_) if body.is_empty() => Vec::new(),
            Err(_) => vec![ApiError {
                message: String::from_utf8_lossy(body).into_owned(),
                code: None,
                more_info: None,
                parameter: None,
            }],
        };
        Error::Api { status, errors }
    }
}

fn first_message(errors: &[ApiError]) -> &str {
    errors.first().map_or("<no detail>", |e| e.message.as_str())
}
