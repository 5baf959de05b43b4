//! Content generation task endpoints (video).

use std::sync::Arc;

use reqwest::Method;

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    telemetry::RequestContext,
    types::{
        GenerationRequest, GenerationTask, Modality, TaskCreateRequest, TaskCreateResponse,
        TaskStatusResponse,
    },
};

pub(crate) const TASKS_PATH: &str = "/contents/generations/tasks";

#[derive(Clone)]
pub struct TasksClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl TasksClient {
    /// Creates a generation task and returns its remote id.
    pub async fn create(&self, req: &GenerationRequest, modality: Modality) -> Result<String> {
        let body = TaskCreateRequest::from_generation(req, modality)?;
        self.create_raw(&body).await
    }

    pub async fn create_raw(&self, body: &TaskCreateRequest) -> Result<String> {
        let builder = self.inner.request(Method::POST, TASKS_PATH)?.json(body);
        let ctx = RequestContext::new(Method::POST.as_str(), TASKS_PATH);
        let resp: TaskCreateResponse = self.inner.execute_json(builder, ctx).await?;
        resp.id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingTaskId)
    }

    /// Fetches the current status of a task.
    pub async fn get(&self, task_id: &str) -> Result<GenerationTask> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("task id is required").with_field("task_id"),
            ));
        }
        let path = format!("{TASKS_PATH}/{task_id}");
        let builder = self.inner.request(Method::GET, &path)?;
        let ctx = RequestContext::new(Method::GET.as_str(), &path);
        let resp: TaskStatusResponse = self.inner.execute_json(builder, ctx).await?;
        Ok(GenerationTask::from_response(task_id, resp))
    }
}
