use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT},
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    api::{BoxFuture, MediaApi},
    base_url_for_region,
    errors::{Error, Result, TransportError, TransportErrorKind},
    http::{parse_api_error_parts, request_id_from_headers, HeaderList},
    images::ImagesClient,
    poller::{PollConfig, TaskPoller},
    tasks::TasksClient,
    telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry},
    types::{GenerationRequest, GenerationTask, ImageOutput, ImageRequest, Modality},
    DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REGION, DEFAULT_REQUEST_TIMEOUT,
};

/// Environment variable holding the Ark API key.
pub const ENV_API_KEY: &str = "ARK_API_KEY";
/// Environment variable selecting the Ark region.
pub const ENV_REGION: &str = "ARK_REGION";
/// Environment variable overriding the full base URL.
pub const ENV_BASE_URL: &str = "ARK_BASE_URL";

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Bearer credential sent on every request.
    pub api_key: Option<String>,
    /// Ark region (defaults to `cn-beijing`). Ignored when `base_url` is set.
    pub region: Option<String>,
    pub base_url: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional metrics callbacks (HTTP latency, poll attempts).
    pub metrics: Option<MetricsCallbacks>,
}

impl Config {
    /// Reads `ARK_API_KEY`, `ARK_REGION` and `ARK_BASE_URL`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: var(ENV_API_KEY),
            region: var(ENV_REGION),
            base_url: var(ENV_BASE_URL),
            ..Default::default()
        }
    }

    pub(crate) fn resolved_base_url(&self) -> String {
        resolve_base_url(self.base_url.as_deref(), self.region.as_deref())
    }
}

/// An explicit base URL wins over the region; trailing slashes are dropped.
pub(crate) fn resolve_base_url(base_url: Option<&str>, region: Option<&str>) -> String {
    base_url
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| base_url_for_region(region.unwrap_or(DEFAULT_REGION)))
        .trim_end_matches('/')
        .to_string()
}

/// Async client for the Ark API.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    base_url: String,
    api_key: String,
    client_header: Option<String>,
    http: reqwest::Client,
    request_timeout: Duration,
    default_headers: Option<HeaderList>,
    pub(crate) telemetry: Telemetry,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base_url = cfg.resolved_base_url();
        reqwest::Url::parse(&base_url)
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let api_key = cfg
            .api_key
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                api_key,
                client_header,
                http,
                request_timeout,
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    /// Shorthand for a client built from the `ARK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn images(&self) -> ImagesClient {
        ImagesClient {
            inner: self.inner.clone(),
        }
    }

    pub fn tasks(&self) -> TasksClient {
        TasksClient {
            inner: self.inner.clone(),
        }
    }

    /// A poller that reports attempts to this client's metrics callbacks.
    pub fn poller(&self, config: PollConfig) -> TaskPoller {
        TaskPoller::new(config).with_telemetry(self.inner.telemetry.clone())
    }
}

impl MediaApi for Client {
    fn submit_image<'a>(
        &'a self,
        req: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<ImageOutput>> {
        Box::pin(async move {
            let resp = self
                .images()
                .generate(ImageRequest::from_generation(req))
                .await?;
            ImageOutput::from_response(resp)
        })
    }

    fn submit_task<'a>(
        &'a self,
        req: &'a GenerationRequest,
        modality: Modality,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.tasks().create(req, modality).await })
    }

    fn poll_task<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<GenerationTask>> {
        Box::pin(async move { self.tasks().get(task_id).await })
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

impl ClientInner {
    pub(crate) fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let url = reqwest::Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| Error::Config(format!("invalid path: {err}")))?;
        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout);
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header("X-Client-Name", client_header);
        }
        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        Ok(builder)
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<T> {
        let resp = self.send(builder, ctx).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| Error::Transport(TransportError::from(err)))?;
        let parsed = serde_json::from_slice::<T>(&bytes).map_err(Error::Serialization)?;
        Ok(parsed)
    }

    /// Sends exactly once; non-2xx replies become [`Error::Api`].
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        #[cfg(feature = "tracing")]
        {
            use tracing::Instrument;
            let span =
                tracing::debug_span!("arkmedia.http", method = %ctx.method, path = %ctx.path);
            self.send_once(builder, ctx).instrument(span).await
        }
        #[cfg(not(feature = "tracing"))]
        {
            self.send_once(builder, ctx).await
        }
    }

    async fn send_once(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        match builder.send().await {
            Ok(resp) => {
                let status = resp.status();
                let http_ctx = ctx.with_request_id(request_id_from_headers(resp.headers()));
                if status.is_success() {
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: Some(status.as_u16()),
                            error: None,
                            context: http_ctx,
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        status = %status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    return Ok(resp);
                }

                if self.telemetry.http_enabled() {
                    self.telemetry.record_http(HttpRequestMetrics {
                        latency: start.elapsed(),
                        status: Some(status.as_u16()),
                        error: Some(format!("http {}", status.as_u16())),
                        context: http_ctx,
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(status = %status, "request failed");
                let headers = resp.headers().clone();
                let body = resp.text().await.unwrap_or_default();
                Err(parse_api_error_parts(status, &headers, body))
            }
            Err(err) => {
                if self.telemetry.http_enabled() {
                    self.telemetry.record_http(HttpRequestMetrics {
                        latency: start.elapsed(),
                        status: None,
                        error: Some(err.to_string()),
                        context: ctx,
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "transport error");
                Err(Error::Transport(TransportError::from(err)))
            }
        }
    }
}
