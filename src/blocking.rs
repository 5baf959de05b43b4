use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use reqwest::{
    blocking::{Client as HttpClient, RequestBuilder, Response},
    header::{HeaderName, HeaderValue, ACCEPT},
    Method, Url,
};
use serde::de::DeserializeOwned;

use crate::{
    client::resolve_base_url,
    core::{PollState, PollStep},
    errors::{Error, Result, TransportError, TransportErrorKind, ValidationError},
    http::{parse_api_error_parts, request_id_from_headers, HeaderList},
    poller::{PollConfig, PollOutcome, PollProgress},
    tasks::TASKS_PATH,
    telemetry::{
        HttpRequestMetrics, MetricsCallbacks, PollAttemptMetrics, RequestContext, Telemetry,
    },
    types::{
        GenerationRequest, GenerationTask, ImageOutput, ImageRequest, ImageResponse, Modality,
        TaskCreateRequest, TaskCreateResponse, TaskStatusResponse,
    },
    DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};

const IMAGES_PATH: &str = "/images/generations";

#[derive(Clone, Debug, Default)]
pub struct BlockingConfig {
    pub api_key: Option<String>,
    /// Ark region (defaults to `cn-beijing`). Ignored when `base_url` is set.
    pub region: Option<String>,
    pub base_url: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<HttpClient>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    pub default_headers: Option<HeaderList>,
    pub metrics: Option<MetricsCallbacks>,
}

/// Blocking client for the Ark API. Every call is a single attempt.
#[derive(Clone)]
pub struct BlockingClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    api_key: String,
    client_header: Option<String>,
    http: HttpClient,
    request_timeout: Duration,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

impl BlockingClient {
    pub fn new(cfg: BlockingConfig) -> Result<Self> {
        let base_url = resolve_base_url(cfg.base_url.as_deref(), cfg.region.as_deref());
        Url::parse(&base_url).map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let api_key = cfg
            .api_key
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => HttpClient::builder()
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

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn generate_image(&self, req: ImageRequest) -> Result<ImageResponse> {
        if req.prompt.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("prompt is required").with_field("prompt"),
            ));
        }
        let builder = self.inner.request(Method::POST, IMAGES_PATH)?.json(&req);
        self.inner
            .execute_json(builder, RequestContext::new(Method::POST.as_str(), IMAGES_PATH))
    }

    /// First image of a generation, as base64 or URL depending on the
    /// requested response format.
    pub fn submit_image(&self, req: &GenerationRequest) -> Result<ImageOutput> {
        let resp = self.generate_image(ImageRequest::from_generation(req))?;
        ImageOutput::from_response(resp)
    }

    pub fn create_task(&self, req: &GenerationRequest, modality: Modality) -> Result<String> {
        let body = TaskCreateRequest::from_generation(req, modality)?;
        let builder = self.inner.request(Method::POST, TASKS_PATH)?.json(&body);
        let resp: TaskCreateResponse = self
            .inner
            .execute_json(builder, RequestContext::new(Method::POST.as_str(), TASKS_PATH))?;
        resp.id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingTaskId)
    }

    pub fn get_task(&self, task_id: &str) -> Result<GenerationTask> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("task id is required").with_field("task_id"),
            ));
        }
        let path = format!("{TASKS_PATH}/{task_id}");
        let builder = self.inner.request(Method::GET, &path)?;
        let resp: TaskStatusResponse = self
            .inner
            .execute_json(builder, RequestContext::new(Method::GET.as_str(), &path))?;
        Ok(GenerationTask::from_response(task_id, resp))
    }

    /// A poller that reports attempts to this client's metrics callbacks.
    pub fn poller(&self, config: PollConfig) -> BlockingTaskPoller {
        BlockingTaskPoller {
            config,
            telemetry: self.inner.telemetry.clone(),
        }
    }
}

impl ClientInner {
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = Url::parse(&format!("{}{}", self.base_url, path))
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
            for entry in defaults.iter().filter(|e| e.is_valid()) {
                let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
                    .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
                let val = HeaderValue::from_str(entry.value.trim())
                    .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
                builder = builder.header(name, val);
            }
        }
        Ok(builder)
    }

    fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        ctx: RequestContext,
    ) -> Result<T> {
        let resp = self.send(builder, ctx)?;
        let bytes = resp
            .bytes()
            .map_err(|err| Error::Transport(TransportError::from(err)))?;
        let parsed = serde_json::from_slice::<T>(&bytes).map_err(Error::Serialization)?;
        Ok(parsed)
    }

    fn send(&self, builder: RequestBuilder, ctx: RequestContext) -> Result<Response> {
        #[cfg(feature = "tracing")]
        let span = tracing::debug_span!("arkmedia.http", method = %ctx.method, path = %ctx.path);
        #[cfg(feature = "tracing")]
        let _guard = span.enter();

        let start = Instant::now();
        match builder.send() {
            Ok(resp) => {
                let status = resp.status();
                let http_ctx = ctx.with_request_id(request_id_from_headers(resp.headers()));
                self.telemetry.record_http(HttpRequestMetrics {
                    latency: start.elapsed(),
                    status: Some(status.as_u16()),
                    error: (!status.is_success()).then(|| format!("http {}", status.as_u16())),
                    context: http_ctx,
                });
                if status.is_success() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(status = %status, "request completed");
                    return Ok(resp);
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(status = %status, "request failed");
                let headers = resp.headers().clone();
                let body = resp.text().unwrap_or_default();
                Err(parse_api_error_parts(status, &headers, body))
            }
            Err(err) => {
                self.telemetry.record_http(HttpRequestMetrics {
                    latency: start.elapsed(),
                    status: None,
                    error: Some(err.to_string()),
                    context: ctx,
                });
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "transport error");
                Err(Error::Transport(TransportError::from(err)))
            }
        }
    }
}

/// Polls a task on the calling thread, sleeping between checks.
#[derive(Clone, Default)]
pub struct BlockingTaskPoller {
    config: PollConfig,
    telemetry: Telemetry,
}

impl BlockingTaskPoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            telemetry: Telemetry::default(),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn run<F>(
        &self,
        client: &BlockingClient,
        task_id: &str,
        on_progress: F,
    ) -> Result<PollOutcome>
    where
        F: FnMut(&PollProgress),
    {
        self.run_with(task_id, |id| client.get_task(id), on_progress)
    }

    /// Drives `task_id` with a caller-supplied status check.
    pub fn run_with<P, F>(
        &self,
        task_id: &str,
        mut poll: P,
        mut on_progress: F,
    ) -> Result<PollOutcome>
    where
        P: FnMut(&str) -> Result<GenerationTask>,
        F: FnMut(&PollProgress),
    {
        let mut state = PollState::new(task_id, &self.config)?;
        let task_id = state.task_id().to_string();
        let task_id = task_id.as_str();
        while state.can_poll() {
            thread::sleep(state.interval());
            let attempt = state.begin_attempt();
            let task = poll(task_id)?;
            #[cfg(feature = "tracing")]
            tracing::debug!(task_id, attempt, status = %task.status, "polled task");
            self.telemetry.record_poll(PollAttemptMetrics {
                task_id: task_id.to_string(),
                attempt,
                status: task.status,
                elapsed: state.elapsed(),
            });
            match state.observe(task) {
                PollStep::Continue(progress) => on_progress(&progress),
                PollStep::Done(outcome) => return Ok(outcome),
            }
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            task_id,
            attempts = state.attempts(),
            "task still pending after attempt budget"
        );
        Ok(state.timed_out())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::types::TaskStatus;

    fn quick(max_attempts: u32) -> BlockingTaskPoller {
        BlockingTaskPoller::new(PollConfig {
            max_attempts,
            interval: Duration::ZERO,
        })
    }

    fn task(status: TaskStatus) -> GenerationTask {
        GenerationTask {
            status,
            ..GenerationTask::submitted("t1")
        }
    }

    #[test]
    fn stops_on_first_terminal_status() {
        let mut replies = VecDeque::from(vec![
            task(TaskStatus::Pending),
            GenerationTask {
                result_uri: Some("https://x/video.mp4".into()),
                ..task(TaskStatus::Succeeded)
            },
            task(TaskStatus::Pending),
        ]);
        let mut progress = Vec::new();
        let outcome = quick(60)
            .run_with(
                "t1",
                |_| Ok(replies.pop_front().unwrap()),
                |p| progress.push(p.attempt),
            )
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Succeeded {
                result_uri: "https://x/video.mp4".into(),
                attempts: 2
            }
        );
        assert_eq!(progress, vec![1]);
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn padded_id_is_polled_trimmed_and_echoed_id_is_ignored() {
        let mut asked = Vec::new();
        let outcome = quick(3)
            .run_with(
                " t1 ",
                |id| {
                    asked.push(id.to_string());
                    Ok(GenerationTask {
                        task_id: "cgt-other".into(),
                        ..task(TaskStatus::Failed)
                    })
                },
                |_| {},
            )
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Failed { attempts: 1, .. }));
        assert_eq!(asked, vec!["t1"]);
    }

    #[test]
    fn pending_forever_times_out() {
        let mut calls = 0;
        let outcome = quick(4)
            .run_with(
                "t1",
                |_| {
                    calls += 1;
                    Ok(task(TaskStatus::Pending))
                },
                |_| {},
            )
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 4 });
        assert_eq!(calls, 4);
    }

    #[test]
    fn poll_error_propagates() {
        let err = quick(5)
            .run_with("t1", |_| Err(Error::MissingTaskId), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::MissingTaskId));
    }

    #[test]
    fn requires_api_key() {
        let err = BlockingClient::new(BlockingConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
