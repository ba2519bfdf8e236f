use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use http::{HeaderMap, HeaderValue, header};
use tower::retry::{Retry, RetryLayer};
use tower::util::BoxCloneService;
use tower::{Service, ServiceBuilder, ServiceExt};

use crate::admission::{
    AdmissionController, AdmissionLimit, AdmissionLimitLayer, AdmissionSettings,
};
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::retries::{
    DispatchRetryLogic, ExponentialBackoff, ExponentialBackoffPolicy, JitterMode,
};
use crate::transport::{ApiRequest, HttpService, ReqwestTransport, TransportResponse};

/// Credentials attached as a default `Authorization` header on every
/// request issued through the client.
#[derive(Clone)]
pub enum Credential {
    Bearer(String),
    Basic { login: String, password: String },
}

impl Credential {
    fn to_header_value(&self) -> Result<HeaderValue, Error> {
        let rendered = match self {
            Credential::Bearer(token) => format!("Bearer {token}"),
            Credential::Basic { login, password } => {
                use base64::Engine as _;
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{login}:{password}"));
                format!("Basic {encoded}")
            }
        };
        let mut value = HeaderValue::from_str(&rendered).map_err(|err| Error::RequestBuild {
            details: format!("credential is not a valid header value: {err}"),
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Credential::Bearer(<redacted>)"),
            Credential::Basic { login, .. } => {
                write!(f, "Credential::Basic {{ login: {login:?}, password: <redacted> }}")
            }
        }
    }
}

/// Connection-level configuration for one logical account.
#[derive(Clone, Debug, Builder)]
pub struct ClientConfig {
    /// API root, e.g. `https://api.stockbook.io/api/v2`.
    #[builder(into)]
    pub base_url: String,

    pub credential: Credential,

    /// Applies to each HTTP call independently; a retried attempt gets a
    /// fresh budget.
    #[builder(default = Duration::from_secs(90))]
    pub timeout: Duration,

    #[builder(default = Duration::from_secs(10))]
    pub connect_timeout: Duration,

    #[builder(default)]
    pub admission: AdmissionSettings,

    /// Additional attempts after the first for 429/gateway failures.
    #[builder(default = 4)]
    pub retry_max_attempts: usize,

    #[builder(default = 500)]
    pub retry_initial_backoff_ms: u64,

    #[builder(default = 2)]
    pub retry_exp_base: u64,

    #[builder(default = Duration::from_secs(30))]
    pub retry_max_delay: Duration,

    pub user_agent: Option<String>,

    /// Merged into the default header set; an entry here can override
    /// `Accept` or the user agent, but never `Authorization`.
    #[builder(default)]
    pub extra_headers: HeaderMap,
}

type DispatchService = Retry<ExponentialBackoffPolicy<DispatchRetryLogic>, AdmissionLimit<HttpService>>;

/// Shared client every resource wrapper dispatches through.
///
/// Created once per logical connection to the Stockbook API. Cloning is
/// cheap and shallow: clones (and derived clients from
/// [`ApiClient::with_credential`]) share the transport, the retry policy,
/// and — critically — the admission controller, so rate and concurrency
/// limits stay global across all of them. The limiter and gate are never
/// duplicated by cloning; only request-level settings may differ.
#[derive(Clone)]
pub struct ApiClient {
    service: DispatchService,
    admission: Arc<AdmissionController>,
    default_headers: Arc<HeaderMap>,
    config: Arc<ClientConfig>,
}

impl ApiClient {
    /// Builds a client over the production `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| Error::RequestBuild {
                details: format!("failed to build http transport: {err}"),
            })?;
        Self::with_transport(config, BoxCloneService::new(ReqwestTransport::new(client)))
    }

    /// Builds a client over a caller-supplied transport.
    ///
    /// The transport only has to produce a response for every completed HTTP
    /// exchange and an error when none was obtained; admission control and
    /// retry are layered on top here.
    pub fn with_transport(config: ClientConfig, transport: HttpService) -> Result<Self, Error> {
        let admission = Arc::new(AdmissionController::new(config.admission));

        let backoff = ExponentialBackoff::new(
            config.retry_initial_backoff_ms,
            config.retry_exp_base,
            Some(config.retry_max_delay),
        );
        let policy = ExponentialBackoffPolicy::new(
            config.retry_max_attempts,
            backoff,
            DispatchRetryLogic,
            JitterMode::Full,
        );

        let service = ServiceBuilder::new()
            .layer(RetryLayer::new(policy))
            .layer(AdmissionLimitLayer::new(Arc::clone(&admission)))
            .service(transport);

        let default_headers = build_default_headers(&config)?;

        info!(
            target: "stockbook_api::client",
            base_url = %config.base_url,
            queries_per_second = config.admission.queries_per_second(),
            max_concurrent = config.admission.max_concurrent(),
            "api client initialized"
        );

        Ok(Self {
            service,
            admission,
            default_headers: Arc::new(default_headers),
            config: Arc::new(config),
        })
    }

    /// Derives a client that authenticates differently while sharing the
    /// transport, retry policy, and admission controller of `self`.
    ///
    /// Stockbook's limits are per account, not per process, so the shared
    /// controller is the point: traffic from every derived client counts
    /// against one budget. This is a deliberate sharing relationship — a
    /// future helper that deep-copies the gate would silently double the
    /// account's apparent allowance.
    pub fn with_credential(&self, credential: Credential) -> Result<Self, Error> {
        let mut config = (*self.config).clone();
        config.credential = credential;
        let default_headers = build_default_headers(&config)?;
        Ok(Self {
            service: self.service.clone(),
            admission: Arc::clone(&self.admission),
            default_headers: Arc::new(default_headers),
            config: Arc::new(config),
        })
    }

    /// Descriptor for one resource collection, e.g. `entity/product`.
    pub fn endpoint(&self, base_path: impl Into<String>) -> Endpoint {
        Endpoint::new(self.clone(), base_path)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Requests currently holding a concurrency slot. Diagnostic only.
    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    pub(crate) fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Sends one wire request through the full dispatch stack: retry around
    /// admission around transport. Every code path that talks to the network
    /// funnels through here.
    pub(crate) async fn dispatch(self, request: ApiRequest) -> Result<TransportResponse, Error> {
        let mut service = self.service.clone();
        service
            .ready()
            .await
            .map_err(|source| Error::Transport { source })?
            .call(request)
            .await
            .map_err(|source| Error::Transport { source })
    }
}

fn build_default_headers(config: &ClientConfig) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    let agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("stockbook-rs/{}", env!("CARGO_PKG_VERSION")));
    let agent = HeaderValue::from_str(&agent).map_err(|err| Error::RequestBuild {
        details: format!("user agent is not a valid header value: {err}"),
    })?;
    headers.insert(header::USER_AGENT, agent);
    for (name, value) in config.extra_headers.iter() {
        headers.insert(name, value.clone());
    }
    // Credentials go last; nothing in extra_headers may displace them.
    headers.insert(header::AUTHORIZATION, config.credential.to_header_value()?);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_credentials() {
        let bearer = format!("{:?}", Credential::Bearer("secret-token".into()));
        assert!(!bearer.contains("secret-token"));

        let basic = format!(
            "{:?}",
            Credential::Basic {
                login: "admin@firm".into(),
                password: "hunter2".into()
            }
        );
        assert!(basic.contains("admin@firm"));
        assert!(!basic.contains("hunter2"));
    }

    #[test]
    fn basic_credential_renders_rfc7617_header() {
        let value = Credential::Basic {
            login: "user".into(),
            password: "pass".into(),
        }
        .to_header_value()
        .expect("valid header");
        // "user:pass" in base64.
        assert_eq!(value.to_str().ok(), Some("Basic dXNlcjpwYXNz"));
    }
}
