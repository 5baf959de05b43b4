use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{
    api::{BoxFuture, MediaApi},
    errors::{Error, Result},
    types::{GenerationRequest, GenerationTask, ImageOutput, Modality, TaskCreateRequest},
};

/// In-memory mock configuration for offline tests.
#[derive(Default)]
pub struct MockConfig {
    pub image_outputs: Vec<Result<ImageOutput>>,
    pub task_ids: Vec<Result<String>>,
    pub task_statuses: Vec<Result<GenerationTask>>,
    /// Returned once `task_statuses` is drained.
    pub default_task: Option<GenerationTask>,
}

impl MockConfig {
    pub fn with_image(mut self, output: ImageOutput) -> Self {
        self.image_outputs.push(Ok(output));
        self
    }

    pub fn with_image_error(mut self, err: Error) -> Self {
        self.image_outputs.push(Err(err));
        self
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_ids.push(Ok(id.into()));
        self
    }

    pub fn with_submit_error(mut self, err: Error) -> Self {
        self.task_ids.push(Err(err));
        self
    }

    pub fn with_task(mut self, task: GenerationTask) -> Self {
        self.task_statuses.push(Ok(task));
        self
    }

    pub fn with_poll_error(mut self, err: Error) -> Self {
        self.task_statuses.push(Err(err));
        self
    }

    pub fn with_default_task(mut self, task: GenerationTask) -> Self {
        self.default_task = Some(task);
        self
    }
}

/// [`MediaApi`] backed by queued responses; records every call.
#[derive(Clone)]
pub struct MockMediaClient {
    inner: Arc<MockInner>,
}

struct MockInner {
    image_outputs: Mutex<VecDeque<Result<ImageOutput>>>,
    task_ids: Mutex<VecDeque<Result<String>>>,
    task_statuses: Mutex<VecDeque<Result<GenerationTask>>>,
    default_task: Option<GenerationTask>,
    image_requests: Mutex<Vec<GenerationRequest>>,
    task_requests: Mutex<Vec<TaskCreateRequest>>,
    polled: Mutex<Vec<String>>,
}

impl MockMediaClient {
    pub fn new(cfg: MockConfig) -> Self {
        Self {
            inner: Arc::new(MockInner {
                image_outputs: Mutex::new(VecDeque::from(cfg.image_outputs)),
                task_ids: Mutex::new(VecDeque::from(cfg.task_ids)),
                task_statuses: Mutex::new(VecDeque::from(cfg.task_statuses)),
                default_task: cfg.default_task,
                image_requests: Mutex::new(Vec::new()),
                task_requests: Mutex::new(Vec::new()),
                polled: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Image requests received so far.
    pub fn image_requests(&self) -> Vec<GenerationRequest> {
        self.inner.image_requests.lock().expect("lock poisoned").clone()
    }

    /// Task creation bodies received so far.
    pub fn task_requests(&self) -> Vec<TaskCreateRequest> {
        self.inner.task_requests.lock().expect("lock poisoned").clone()
    }

    pub fn poll_count(&self) -> usize {
        self.inner.polled.lock().expect("lock poisoned").len()
    }

    /// Total calls across all three operations.
    pub fn call_count(&self) -> usize {
        self.image_requests().len() + self.task_requests().len() + self.poll_count()
    }
}

impl MediaApi for MockMediaClient {
    fn submit_image<'a>(
        &'a self,
        req: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<ImageOutput>> {
        Box::pin(async move {
            self.inner
                .image_requests
                .lock()
                .expect("lock poisoned")
                .push(req.clone());
            self.inner
                .image_outputs
                .lock()
                .expect("lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(Error::Validation("no mock image output queued".into())))
        })
    }

    fn submit_task<'a>(
        &'a self,
        req: &'a GenerationRequest,
        modality: Modality,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let body = TaskCreateRequest::from_generation(req, modality)?;
            self.inner
                .task_requests
                .lock()
                .expect("lock poisoned")
                .push(body);
            self.inner
                .task_ids
                .lock()
                .expect("lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(Error::Validation("no mock task id queued".into())))
        })
    }

    fn poll_task<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<GenerationTask>> {
        Box::pin(async move {
            self.inner
                .polled
                .lock()
                .expect("lock poisoned")
                .push(task_id.to_string());
            let next = self
                .inner
                .task_statuses
                .lock()
                .expect("lock poisoned")
                .pop_front()
                .or_else(|| self.inner.default_task.clone().map(Ok))
                .unwrap_or_else(|| Err(Error::Validation("no mock task status queued".into())));
            next.map(|task| GenerationTask {
                task_id: task_id.to_string(),
                ..task
            })
        })
    }
}
