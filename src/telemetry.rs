use std::{fmt, sync::Arc, time::Duration};

use crate::types::TaskStatus;

/// User-provided callbacks for emitting metrics without taking on a tracing dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub poll_attempt: Option<Arc<dyn Fn(PollAttemptMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field(
                "poll_attempt",
                &self.poll_attempt.as_ref().map(|_| "callback"),
            )
            .finish()
    }
}

/// Common request metadata shared by all telemetry events.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }
}

/// Latency and outcome of one HTTP call.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub context: RequestContext,
}

/// One status check made by the task poller.
#[derive(Clone, Debug)]
pub struct PollAttemptMetrics {
    pub task_id: String,
    pub attempt: u32,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub(crate) fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub(crate) fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub(crate) fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub(crate) fn record_poll(&self, metrics: PollAttemptMetrics) {
        if let Some(cb) = &self.callbacks.poll_attempt {
            cb(metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn records_only_configured_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let telemetry = Telemetry::new(Some(MetricsCallbacks {
            poll_attempt: Some(Arc::new(move |m: PollAttemptMetrics| {
                sink.lock().unwrap().push(m.attempt)
            })),
            ..Default::default()
        }));

        assert!(!telemetry.http_enabled());
        telemetry.record_http(HttpRequestMetrics {
            latency: Duration::from_millis(3),
            status: Some(200),
            error: None,
            context: RequestContext::new("GET", "/x").with_request_id(Some(" ".into())),
        });
        telemetry.record_poll(PollAttemptMetrics {
            task_id: "t1".into(),
            attempt: 2,
            status: TaskStatus::Pending,
            elapsed: Duration::from_secs(10),
        });
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }
}
