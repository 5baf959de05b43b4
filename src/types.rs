use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    errors::{Error, Result, ValidationError},
    DEFAULT_IMAGE_SIZE,
};

/// Which generation pipeline a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    TextToImage,
    TextToVideo,
    ImageToVideo,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::TextToImage => "text_to_image",
            Modality::TextToVideo => "text_to_video",
            Modality::ImageToVideo => "image_to_video",
        }
    }

    /// True for the task-based (asynchronous) pipelines.
    pub fn is_video(&self) -> bool {
        !matches!(self, Modality::TextToImage)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a remote generation task.
///
/// Anything the service reports besides the three terminal states
/// (`queued`, `running`, ...) is treated as still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl From<&str> for TaskStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "succeeded" => TaskStatus::Succeeded,
            "failed" => TaskStatus::Failed,
            "canceled" | "cancelled" => TaskStatus::Canceled,
            _ => TaskStatus::Pending,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        TaskStatus::from(value.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated generation request. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    model: String,
    size_or_ratio: String,
    duration: Option<String>,
    seed: Option<i64>,
    image_url: Option<String>,
    extra: Map<String, Value>,
}

impl GenerationRequest {
    pub fn builder(
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            prompt: prompt.into(),
            model: model.into(),
            size_or_ratio: None,
            duration: None,
            seed: None,
            image_url: None,
            extra: Map::new(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn size_or_ratio(&self) -> &str {
        &self.size_or_ratio
    }

    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }

    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    /// Reference image (URL or `data:` URI) for image-to-video tasks.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequestBuilder {
    prompt: String,
    model: String,
    size_or_ratio: Option<String>,
    duration: Option<String>,
    seed: Option<i64>,
    image_url: Option<String>,
    extra: Map<String, Value>,
}

impl GenerationRequestBuilder {
    /// Image size (`1024x1024`) or aspect ratio (`16:9`).
    pub fn size_or_ratio(mut self, value: impl Into<String>) -> Self {
        self.size_or_ratio = Some(value.into());
        self
    }

    pub fn duration(mut self, value: impl Into<String>) -> Self {
        self.duration = Some(value.into());
        self
    }

    /// Random seed. `-1` means "let the service choose".
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = (seed != -1).then_some(seed);
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Additional request knob passed through to the service body.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<GenerationRequest> {
        if self.prompt.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("prompt is required").with_field("prompt"),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("model is required").with_field("model"),
            ));
        }
        Ok(GenerationRequest {
            prompt: self.prompt,
            model: self.model.trim().to_string(),
            size_or_ratio: self
                .size_or_ratio
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string()),
            duration: self.duration.filter(|s| !s.trim().is_empty()),
            seed: self.seed,
            image_url: self.image_url.filter(|s| !s.trim().is_empty()),
            extra: self.extra,
        })
    }
}

/// Image payload encoding requested from `/images/generations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Url,
    B64Json,
}

/// Body of `POST /images/generations`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub response_format: ResponseFormat,
    pub quality: String,
    pub n: u32,
    pub watermark: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageRequest {
    /// Maps a [`GenerationRequest`] onto the image body.
    ///
    /// The `response_format`, `quality`, `watermark` and `guidance_scale`
    /// knobs are lifted out of the extras; other extras are sent as-is.
    pub fn from_generation(req: &GenerationRequest) -> Self {
        let mut extra = req.extra().clone();
        let response_format = extra
            .remove("response_format")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let quality = extra
            .remove("quality")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "standard".to_string());
        let watermark = extra
            .remove("watermark")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let guidance_scale = extra.remove("guidance_scale").and_then(|v| v.as_f64());
        Self {
            model: req.model().to_string(),
            prompt: req.prompt().to_string(),
            size: req.size_or_ratio().to_string(),
            response_format,
            quality,
            n: 1,
            watermark,
            seed: req.seed(),
            guidance_scale,
            extra,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImageData {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub b64_json: Option<String>,
}

/// First image of an image generation reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutput {
    /// Base64 encoded image bytes.
    Base64(String),
    Url(String),
}

impl ImageOutput {
    pub(crate) fn from_response(resp: ImageResponse) -> Result<Self> {
        let first = resp.data.into_iter().next().ok_or(Error::EmptyResponse)?;
        if let Some(b64) = first.b64_json.filter(|s| !s.is_empty()) {
            return Ok(ImageOutput::Base64(b64));
        }
        if let Some(url) = first.url.filter(|s| !s.is_empty()) {
            return Ok(ImageOutput::Url(url));
        }
        Err(Error::EmptyResponse)
    }
}

/// One typed part of a task's `content` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Body of `POST /contents/generations/tasks`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskCreateRequest {
    pub model: String,
    pub content: Vec<ContentPart>,
}

impl TaskCreateRequest {
    pub fn from_generation(req: &GenerationRequest, modality: Modality) -> Result<Self> {
        let mut content = vec![ContentPart::Text {
            text: req.prompt().to_string(),
        }];
        match (modality, req.image_url()) {
            (Modality::ImageToVideo, Some(url)) => content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            }),
            (Modality::ImageToVideo, None) => {
                return Err(Error::Validation(
                    ValidationError::new("image is required for image-to-video")
                        .with_field("image_url"),
                ));
            }
            (Modality::TextToImage, _) => {
                return Err(Error::Validation(
                    ValidationError::new("text-to-image is not a task modality")
                        .with_field("modality"),
                ));
            }
            (Modality::TextToVideo, _) => {}
        }
        Ok(Self {
            model: req.model().to_string(),
            content,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskCreateResponse {
    #[serde(default)]
    pub(crate) id: Option<String>,
}

/// Reply of `GET /contents/generations/tasks/{id}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "pending")]
    pub status: TaskStatus,
    #[serde(default)]
    pub content: Option<TaskContent>,
    #[serde(default)]
    pub error: Option<TaskError>,
}

fn pending() -> TaskStatus {
    TaskStatus::Pending
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaskContent {
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaskError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client-side view of a remote generation task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub result_uri: Option<String>,
    pub error_message: Option<String>,
}

impl GenerationTask {
    /// A freshly submitted task.
    pub fn submitted(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            result_uri: None,
            error_message: None,
        }
    }

    pub fn from_response(task_id: impl Into<String>, resp: TaskStatusResponse) -> Self {
        Self {
            task_id: task_id.into(),
            status: resp.status,
            result_uri: resp
                .content
                .and_then(|c| c.video_url)
                .filter(|s| !s.is_empty()),
            error_message: resp.error.and_then(|e| e.message),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a newer poll result. Terminal tasks never change; returns
    /// whether the update was taken.
    pub fn absorb(&mut self, update: GenerationTask) -> bool {
        if self.is_terminal() || update.task_id != self.task_id {
            return false;
        }
        self.status = update.status;
        self.result_uri = update.result_uri;
        self.error_message = update.error_message;
        true
    }
}
