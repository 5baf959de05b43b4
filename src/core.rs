//! Shared runtime-agnostic logic for the async and blocking pollers.
//!
//! [`PollState`] owns the task being driven and the attempt counter. The
//! drivers only decide *how* to wait between attempts; what an observed
//! status means lives here so both renditions behave identically.

use std::time::Duration;

use crate::{
    errors::{Error, Result, ValidationError},
    poller::{PollConfig, PollOutcome, PollProgress},
    types::{GenerationTask, TaskStatus},
};

pub(crate) const UNKNOWN_TASK_ERROR: &str = "unknown error";
pub(crate) const MISSING_RESULT_URI: &str = "task succeeded without a result uri";

/// Result of observing one poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollStep {
    Continue(PollProgress),
    Done(PollOutcome),
}

#[derive(Debug)]
pub(crate) struct PollState {
    task: GenerationTask,
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
}

impl PollState {
    /// The id is trimmed once here; every status check uses the trimmed form.
    pub(crate) fn new(task_id: &str, config: &PollConfig) -> Result<Self> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("task id is required").with_field("task_id"),
            ));
        }
        Ok(Self {
            task: GenerationTask::submitted(task_id),
            attempts: 0,
            max_attempts: config.max_attempts,
            interval: config.interval,
        })
    }

    pub(crate) fn task_id(&self) -> &str {
        &self.task.task_id
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether another status check may be issued.
    pub(crate) fn can_poll(&self) -> bool {
        !self.task.is_terminal() && self.attempts < self.max_attempts
    }

    /// Counts the attempt about to be made and returns its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        debug_assert!(self.can_poll());
        self.attempts += 1;
        self.attempts
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }

    /// Applies the reply to the status check just made. The reply answers for
    /// this task whatever id it echoes back.
    pub(crate) fn observe(&mut self, update: GenerationTask) -> PollStep {
        let update = GenerationTask {
            task_id: self.task.task_id.clone(),
            ..update
        };
        let applied = self.task.absorb(update);
        debug_assert!(applied, "observe called on a terminal task");
        let attempts = self.attempts;
        match self.task.status {
            TaskStatus::Succeeded => match self.task.result_uri.clone() {
                Some(result_uri) => PollStep::Done(PollOutcome::Succeeded {
                    result_uri,
                    attempts,
                }),
                None => PollStep::Done(PollOutcome::Failed {
                    message: MISSING_RESULT_URI.to_string(),
                    attempts,
                }),
            },
            TaskStatus::Failed => PollStep::Done(PollOutcome::Failed {
                message: self
                    .task
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_TASK_ERROR.to_string()),
                attempts,
            }),
            TaskStatus::Canceled => PollStep::Done(PollOutcome::Canceled { attempts }),
            TaskStatus::Pending => PollStep::Continue(PollProgress {
                task_id: self.task.task_id.clone(),
                attempt: attempts,
                elapsed: self.elapsed(),
            }),
        }
    }

    pub(crate) fn timed_out(&self) -> PollOutcome {
        PollOutcome::TimedOut {
            attempts: self.attempts,
        }
    }

    pub(crate) fn aborted(&self) -> PollOutcome {
        PollOutcome::Aborted {
            attempts: self.attempts,
        }
    }
}
