//! Fixed-interval polling of asynchronous generation tasks.
//!
//! A submitted task is queried every [`POLL_INTERVAL`] until the service
//! reports `succeeded`, `failed` or `canceled`, or until [`MAX_POLL_ATTEMPTS`]
//! checks have been made. Terminal remote states are returned as
//! [`PollOutcome`] values rather than errors; only a broken status request is
//! an `Err`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    api::MediaApi,
    core::{PollState, PollStep},
    errors::{Error, Result},
    telemetry::{PollAttemptMetrics, Telemetry},
    MAX_POLL_ATTEMPTS, POLL_INTERVAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    /// Delay before every status check, including the first.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_POLL_ATTEMPTS,
            interval: POLL_INTERVAL,
        }
    }
}

/// Emitted after each status check that found the task still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollProgress {
    pub task_id: String,
    /// 1-based number of the check that was just made.
    pub attempt: u32,
    /// `attempt * interval`.
    pub elapsed: Duration,
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded { result_uri: String, attempts: u32 },
    /// The service reported the task as failed.
    Failed { message: String, attempts: u32 },
    /// The service reported the task as canceled.
    Canceled { attempts: u32 },
    /// Still pending when the attempt budget ran out.
    TimedOut { attempts: u32 },
    /// The caller's cancellation token fired.
    Aborted { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Succeeded { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::Canceled { attempts }
            | PollOutcome::TimedOut { attempts }
            | PollOutcome::Aborted { attempts } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }

    /// Result URI on success, otherwise the matching task error.
    pub fn into_result(self, task_id: &str) -> Result<String> {
        let task_id = task_id.to_string();
        match self {
            PollOutcome::Succeeded { result_uri, .. } => Ok(result_uri),
            PollOutcome::Failed { message, .. } => {
                Err(Error::RemoteTaskFailed { task_id, message })
            }
            PollOutcome::Canceled { .. } => Err(Error::RemoteTaskCanceled { task_id }),
            PollOutcome::TimedOut { attempts } => Err(Error::PollTimeout { task_id, attempts }),
            PollOutcome::Aborted { attempts } => Err(Error::PollAborted { task_id, attempts }),
        }
    }
}

/// Drives one task at a time to a terminal state.
#[derive(Clone, Default)]
pub struct TaskPoller {
    config: PollConfig,
    cancel: Option<CancellationToken>,
    telemetry: Telemetry,
}

impl TaskPoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: None,
            telemetry: Telemetry::default(),
        }
    }

    /// Stop waiting (without issuing further checks) once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls `task_id` until it is terminal, the budget is spent, or the
    /// cancellation token fires. `on_progress` runs after every pending check.
    ///
    /// Surrounding whitespace in `task_id` is ignored; a blank id is a
    /// validation error.
    pub async fn run<A, F>(
        &self,
        api: &A,
        task_id: &str,
        mut on_progress: F,
    ) -> Result<PollOutcome>
    where
        A: MediaApi + ?Sized,
        F: FnMut(&PollProgress),
    {
        let mut state = PollState::new(task_id, &self.config)?;
        let task_id = state.task_id().to_string();
        let task_id = task_id.as_str();
        while state.can_poll() {
            if !self.wait(state.interval()).await {
                #[cfg(feature = "tracing")]
                tracing::info!(task_id, attempts = state.attempts(), "polling aborted");
                return Ok(state.aborted());
            }
            let attempt = state.begin_attempt();
            let task = api.poll_task(task_id).await?;
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
                PollStep::Done(outcome) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        task_id,
                        attempts = outcome.attempts(),
                        success = outcome.is_success(),
                        "task reached terminal state"
                    );
                    return Ok(outcome);
                }
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

    /// Returns `false` when cancelled before the delay elapsed.
    async fn wait(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                if token.is_cancelled() {
                    return false;
                }
                tokio::select! {
                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(delay) => true,
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockConfig, MockMediaClient},
        types::{GenerationTask, TaskStatus},
    };

    fn task(status: TaskStatus) -> GenerationTask {
        GenerationTask {
            status,
            ..GenerationTask::submitted("t1")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pending_then_success_reports_one_progress() {
        let mut done = task(TaskStatus::Succeeded);
        done.result_uri = Some("https://x/video.mp4".into());
        let api = MockMediaClient::new(
            MockConfig::default()
                .with_task(task(TaskStatus::Pending))
                .with_task(done),
        );

        let mut progress = Vec::new();
        let outcome = TaskPoller::default()
            .run(&api, "t1", |p| progress.push(p.clone()))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Succeeded {
                result_uri: "https://x/video.mp4".into(),
                attempts: 2,
            }
        );
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].elapsed, Duration::from_secs(5));
        assert_eq!(api.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_times_out_after_budget() {
        let api = MockMediaClient::new(
            MockConfig::default().with_default_task(task(TaskStatus::Pending)),
        );

        let mut progress = 0;
        let outcome = TaskPoller::default()
            .run(&api, "t1", |_| progress += 1)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: MAX_POLL_ATTEMPTS });
        assert_eq!(progress, MAX_POLL_ATTEMPTS as usize);
        assert_eq!(api.poll_count(), MAX_POLL_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_on_third_attempt_stops_polling() {
        let mut failed = task(TaskStatus::Failed);
        failed.error_message = Some("quota exceeded".into());
        let api = MockMediaClient::new(
            MockConfig::default()
                .with_task(task(TaskStatus::Pending))
                .with_task(task(TaskStatus::Pending))
                .with_task(failed)
                .with_default_task(task(TaskStatus::Pending)),
        );

        let outcome = TaskPoller::default().run(&api, "t1", |_| {}).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                message: "quota exceeded".into(),
                attempts: 3,
            }
        );
        assert_eq!(api.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_task_is_distinct_outcome() {
        let api = MockMediaClient::new(MockConfig::default().with_task(task(TaskStatus::Canceled)));
        let outcome = TaskPoller::default().run(&api, "t1", |_| {}).await.unwrap();
        assert_eq!(outcome, PollOutcome::Canceled { attempts: 1 });
        assert!(matches!(
            outcome.into_result("t1"),
            Err(Error::RemoteTaskCanceled { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn status_request_error_propagates() {
        let api = MockMediaClient::new(
            MockConfig::default()
                .with_task(task(TaskStatus::Pending))
                .with_poll_error(Error::Api(crate::APIError::new(500, "boom"))),
        );
        let err = TaskPoller::default()
            .run(&api, "t1", |_| {})
            .await
            .unwrap_err();
        assert!(err.is_remote_request());
        assert_eq!(api.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_before_next_check() {
        let api = MockMediaClient::new(
            MockConfig::default().with_default_task(task(TaskStatus::Pending)),
        );
        let token = CancellationToken::new();
        let poller = TaskPoller::default().with_cancellation(token.clone());

        let outcome = poller
            .run(&api, "t1", |p| {
                if p.attempt == 2 {
                    token.cancel();
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Aborted { attempts: 2 });
        assert_eq!(api.poll_count(), 2);
    }

    #[tokio::test]
    async fn zero_budget_times_out_without_polling() {
        let api = MockMediaClient::new(MockConfig::default());
        let poller = TaskPoller::new(PollConfig {
            max_attempts: 0,
            interval: Duration::ZERO,
        });
        let outcome = poller.run(&api, "t1", |_| {}).await.unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 0 });
        assert_eq!(api.poll_count(), 0);
    }
}
