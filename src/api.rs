use std::{future::Future, pin::Pin};

use crate::{
    errors::Result,
    types::{GenerationRequest, GenerationTask, ImageOutput, Modality},
};

/// Boxed future used by object-safe async traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The three remote operations the adapters and the poller depend on.
///
/// [`crate::Client`] implements this against the Ark API; tests substitute
/// `MockMediaClient`.
pub trait MediaApi: Send + Sync {
    /// Single-attempt image synthesis.
    fn submit_image<'a>(&'a self, req: &'a GenerationRequest)
        -> BoxFuture<'a, Result<ImageOutput>>;

    /// Creates a generation task and returns the remote task id.
    fn submit_task<'a>(
        &'a self,
        req: &'a GenerationRequest,
        modality: Modality,
    ) -> BoxFuture<'a, Result<String>>;

    /// Fetches the current state of a task.
    fn poll_task<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<GenerationTask>>;
}
