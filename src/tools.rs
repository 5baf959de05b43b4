//! Host-facing tool adapters for text-to-image, text-to-video and
//! image-to-video generation.
//!
//! Each tool takes host parameters, drives the [`MediaApi`] (and for video,
//! the [`TaskPoller`]) and streams [`ToolMessage`]s into a [`MessageSink`].
//! `invoke` never fails: missing parameters and collaborator errors become a
//! single text message.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    api::MediaApi,
    client::Client,
    errors::{Error, Result},
    media::{decode_base64, MediaFile, MediaPayload, MediaResolver},
    poller::{PollConfig, PollOutcome, TaskPoller},
    prompt::PromptDirectives,
    types::{GenerationRequest, ImageOutput, Modality},
    DEFAULT_IMAGE_MODEL, DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_TO_VIDEO_MODEL,
    DEFAULT_TEXT_TO_VIDEO_MODEL,
};

/// MIME type attached to generated images.
const GENERATED_IMAGE_MIME: &str = "image/png";
/// Ratio directive sent for image-to-video; the service follows the input image.
const ADAPTIVE_RATIO: &str = "adaptive";
const CREDENTIAL_CHECK_PROMPT: &str = "test image";
const CREDENTIAL_CHECK_SIZE: &str = "512x512";

const MSG_MISSING_PROMPT: &str = "please enter a prompt";
const MSG_MISSING_IMAGE: &str = "please upload an image file";
const MSG_NO_IMAGE_DATA: &str = "no image data received";
const MSG_UNREADABLE_IMAGE: &str =
    "could not read the image data; try uploading the image again or use a smaller file";
const MSG_VIDEO_TIMED_OUT: &str = "video generation timed out or failed, please try again later";
const MSG_LINK_VALIDITY: &str =
    "the video link above is valid for 24 hours; download the file within that window to keep it";

/// One message handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolMessage {
    Text(String),
    Blob { bytes: Vec<u8>, mime_type: String },
    Json(Value),
}

impl ToolMessage {
    pub fn text(text: impl Into<String>) -> Self {
        ToolMessage::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolMessage::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Receives tool messages as they are produced.
pub trait MessageSink {
    fn emit(&mut self, message: ToolMessage);
}

impl MessageSink for Vec<ToolMessage> {
    fn emit(&mut self, message: ToolMessage) {
        self.push(message);
    }
}

impl MessageSink for UnboundedSender<ToolMessage> {
    fn emit(&mut self, message: ToolMessage) {
        // A closed receiver means the host stopped listening.
        let _ = self.send(message);
    }
}

/// Adapts a closure into a [`MessageSink`].
pub struct FnSink<F>(pub F);

impl<F> MessageSink for FnSink<F>
where
    F: FnMut(ToolMessage),
{
    fn emit(&mut self, message: ToolMessage) {
        (self.0)(message)
    }
}

fn default_size() -> String {
    DEFAULT_IMAGE_SIZE.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_quality() -> String {
    "standard".to_string()
}

fn default_ratio() -> String {
    "16:9".to_string()
}

fn default_duration() -> String {
    "5".to_string()
}

fn default_t2v_model() -> String {
    DEFAULT_TEXT_TO_VIDEO_MODEL.to_string()
}

fn default_i2v_model() -> String {
    DEFAULT_IMAGE_TO_VIDEO_MODEL.to_string()
}

/// Parameters of [`Text2ImageTool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Text2ImageParams {
    pub prompt: String,
    pub size: String,
    pub model: String,
    /// `-1` lets the service pick.
    pub seed: Option<i64>,
    pub guidance_scale: Option<f64>,
    pub watermark: bool,
    pub quality: String,
}

impl Default for Text2ImageParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            size: default_size(),
            model: default_image_model(),
            seed: None,
            guidance_scale: None,
            watermark: false,
            quality: default_quality(),
        }
    }
}

impl Text2ImageParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    fn to_request(&self) -> Result<GenerationRequest> {
        let mut builder = GenerationRequest::builder(&self.model, &self.prompt)
            .size_or_ratio(&self.size)
            .extra("response_format", json!("b64_json"))
            .extra("quality", json!(self.quality))
            .extra("watermark", json!(self.watermark));
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(scale) = self.guidance_scale {
            builder = builder.extra("guidance_scale", json!(scale));
        }
        builder.build()
    }
}

/// Parameters of [`Text2VideoTool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Text2VideoParams {
    pub prompt: String,
    pub ratio: String,
    pub duration: String,
    pub model: String,
}

impl Default for Text2VideoParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            ratio: default_ratio(),
            duration: default_duration(),
            model: default_t2v_model(),
        }
    }
}

impl Text2VideoParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Parameters of [`Image2VideoTool`].
#[derive(Debug)]
pub struct Image2VideoParams {
    pub prompt: String,
    pub image: Option<MediaFile>,
    /// Any non-empty value requests an adaptive ratio.
    pub ratio: String,
    pub duration: String,
    pub model: String,
}

impl Image2VideoParams {
    pub fn new(prompt: impl Into<String>, image: MediaFile) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
            ratio: default_ratio(),
            duration: default_duration(),
            model: default_i2v_model(),
        }
    }
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Generates one image and returns it as a PNG blob.
#[derive(Clone)]
pub struct Text2ImageTool<A> {
    api: A,
}

impl<A: MediaApi> Text2ImageTool<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Requests a base64 image and decodes it. A URL-only reply is
    /// [`Error::EmptyResponse`].
    pub async fn generate(&self, params: &Text2ImageParams) -> Result<MediaPayload> {
        let req = params.to_request()?;
        match self.api.submit_image(&req).await? {
            ImageOutput::Base64(b64) => Ok(MediaPayload::new(
                decode_base64(&b64)?,
                GENERATED_IMAGE_MIME,
            )),
            ImageOutput::Url(_) => Err(Error::EmptyResponse),
        }
    }

    pub async fn invoke<S>(&self, params: Text2ImageParams, sink: &mut S)
    where
        S: MessageSink + ?Sized,
    {
        if !has_text(&params.prompt) {
            sink.emit(ToolMessage::text(MSG_MISSING_PROMPT));
            return;
        }
        sink.emit(ToolMessage::text("generating image with the Doubao API..."));
        match self.generate(&params).await {
            Ok(payload) => {
                sink.emit(ToolMessage::Blob {
                    bytes: payload.bytes,
                    mime_type: payload.mime_type,
                });
                sink.emit(ToolMessage::text("image generated successfully"));
            }
            Err(Error::EmptyResponse) => sink.emit(ToolMessage::text(MSG_NO_IMAGE_DATA)),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "image generation failed");
                sink.emit(ToolMessage::text(format!("error while generating image: {err}")));
            }
        }
    }
}

/// Submits a text-to-video task and waits for the video URL.
#[derive(Clone)]
pub struct Text2VideoTool<A> {
    api: A,
    poller: TaskPoller,
}

impl<A: MediaApi> Text2VideoTool<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poller: TaskPoller::default(),
        }
    }

    pub fn with_poller(mut self, poller: TaskPoller) -> Self {
        self.poller = poller;
        self
    }

    pub async fn invoke<S>(&self, params: Text2VideoParams, sink: &mut S)
    where
        S: MessageSink + ?Sized,
    {
        if !has_text(&params.prompt) {
            sink.emit(ToolMessage::text(MSG_MISSING_PROMPT));
            return;
        }
        let prompt = PromptDirectives::new()
            .ratio(&params.ratio)
            .duration(&params.duration)
            .apply(&params.prompt);

        sink.emit(ToolMessage::text("generating video with the Doubao API..."));
        let submitted = GenerationRequest::builder(&params.model, &prompt)
            .size_or_ratio(&params.ratio)
            .duration(&params.duration)
            .build();
        let task_id = match submitted {
            Ok(req) => match self.api.submit_task(&req, Modality::TextToVideo).await {
                Ok(id) => id,
                Err(err) => {
                    sink.emit(ToolMessage::text(format!(
                        "failed to create video generation task: {err}"
                    )));
                    return;
                }
            },
            Err(err) => {
                sink.emit(ToolMessage::text(format!("invalid video request: {err}")));
                return;
            }
        };
        sink.emit(ToolMessage::text(format!(
            "video generation task created, task id: {task_id}; waiting for the video to finish..."
        )));

        if let Some(url) = drive_task(&self.api, &self.poller, &task_id, sink).await {
            sink.emit(ToolMessage::text("video generated successfully"));
            sink.emit(ToolMessage::text(format!("video link: {url}")));
            sink.emit(video_message(&url));
        }
    }
}

/// Animates an input image. The image is resolved and inlined as a `data:` URI.
#[derive(Clone)]
pub struct Image2VideoTool<A> {
    api: A,
    poller: TaskPoller,
    resolver: MediaResolver,
}

impl<A: MediaApi> Image2VideoTool<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poller: TaskPoller::default(),
            resolver: MediaResolver::default(),
        }
    }

    pub fn with_poller(mut self, poller: TaskPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_resolver(mut self, resolver: MediaResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub async fn invoke<S>(&self, params: Image2VideoParams, sink: &mut S)
    where
        S: MessageSink + ?Sized,
    {
        let Image2VideoParams {
            prompt,
            image,
            ratio,
            duration,
            model,
        } = params;
        if !has_text(&prompt) {
            sink.emit(ToolMessage::text(MSG_MISSING_PROMPT));
            return;
        }
        let mut image = match image {
            Some(image) if !image.is_empty() => image,
            _ => {
                sink.emit(ToolMessage::text(MSG_MISSING_IMAGE));
                return;
            }
        };

        let resolved = match self.resolver.resolve(&mut image).await {
            Ok(resolved) => resolved,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::info!(error = %_err, "image input could not be resolved");
                sink.emit(ToolMessage::text(MSG_UNREADABLE_IMAGE));
                return;
            }
        };
        let encoded = resolved.into_payload().into_encoded();
        sink.emit(ToolMessage::text(format!(
            "image encoded: raw size={:.2}KB, encoded size={:.2}KB",
            encoded.raw_kb(),
            encoded.encoded_kb()
        )));

        let mut directives = PromptDirectives::new().duration(&duration);
        if has_text(&ratio) {
            directives = directives.ratio(ADAPTIVE_RATIO);
        }
        let prompt = directives.apply(&prompt);

        sink.emit(ToolMessage::text(
            "generating video with the Doubao Seedance image-to-video model...",
        ));
        let submitted = GenerationRequest::builder(&model, &prompt)
            .size_or_ratio(ADAPTIVE_RATIO)
            .duration(&duration)
            .image_url(encoded.data_uri())
            .build();
        let task_id = match submitted {
            Ok(req) => match self.api.submit_task(&req, Modality::ImageToVideo).await {
                Ok(id) => id,
                Err(err) => {
                    sink.emit(ToolMessage::text(format!(
                        "failed to create video generation task: {err}"
                    )));
                    return;
                }
            },
            Err(err) => {
                sink.emit(ToolMessage::text(format!("invalid video request: {err}")));
                return;
            }
        };
        sink.emit(ToolMessage::text(format!(
            "video generation task created, task id: {task_id}"
        )));
        sink.emit(ToolMessage::text(format!("prompt: {prompt}")));
        sink.emit(ToolMessage::text("waiting for the video to finish..."));

        if let Some(url) = drive_task(&self.api, &self.poller, &task_id, sink).await {
            sink.emit(ToolMessage::text("video generated successfully"));
            sink.emit(video_message(&url));
            sink.emit(ToolMessage::text(MSG_LINK_VALIDITY));
        }
    }
}

fn video_message(url: &str) -> ToolMessage {
    ToolMessage::Json(json!({ "type": "video", "url": url }))
}

/// Polls `task_id` to completion, reporting progress. Returns the video URL
/// on success; every other ending has already been reported.
async fn drive_task<A, S>(
    api: &A,
    poller: &TaskPoller,
    task_id: &str,
    sink: &mut S,
) -> Option<String>
where
    A: MediaApi + ?Sized,
    S: MessageSink + ?Sized,
{
    let outcome = poller
        .run(api, task_id, |progress| {
            sink.emit(ToolMessage::text(format!(
                "video is still generating, waited {} seconds...",
                progress.elapsed.as_secs()
            )))
        })
        .await;
    let message = match outcome {
        Ok(PollOutcome::Succeeded { result_uri, .. }) => return Some(result_uri),
        Ok(PollOutcome::Failed { message, .. }) => {
            format!("video generation task failed: {message}")
        }
        Ok(PollOutcome::Canceled { .. }) => "video generation task was canceled".to_string(),
        Ok(PollOutcome::TimedOut { .. }) => MSG_VIDEO_TIMED_OUT.to_string(),
        Ok(PollOutcome::Aborted { attempts }) => {
            format!("video generation was stopped after {attempts} status checks")
        }
        Err(err) => format!("failed to query video generation task: {err}"),
    };
    sink.emit(ToolMessage::Text(message));
    None
}

/// Builds the three tools over one shared API handle.
#[derive(Clone)]
pub struct ToolProvider<A> {
    api: A,
    poller: TaskPoller,
    resolver: MediaResolver,
}

impl ToolProvider<Client> {
    /// Tools over `client`, polling with its metrics callbacks attached.
    pub fn for_client(client: Client) -> Self {
        let poller = client.poller(PollConfig::default());
        ToolProvider::new(client).with_poller(poller)
    }
}

impl<A: MediaApi + Clone> ToolProvider<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poller: TaskPoller::default(),
            resolver: MediaResolver::default(),
        }
    }

    pub fn with_poller(mut self, poller: TaskPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_resolver(mut self, resolver: MediaResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn text2image(&self) -> Text2ImageTool<A> {
        Text2ImageTool::new(self.api.clone())
    }

    pub fn text2video(&self) -> Text2VideoTool<A> {
        Text2VideoTool::new(self.api.clone()).with_poller(self.poller.clone())
    }

    pub fn image2video(&self) -> Image2VideoTool<A> {
        Image2VideoTool::new(self.api.clone())
            .with_poller(self.poller.clone())
            .with_resolver(self.resolver.clone())
    }

    /// Checks the API key with one small text-to-image generation.
    /// Video tools share the key and endpoint, so they are not exercised.
    pub async fn validate_credentials(&self) -> Result<()> {
        let params = Text2ImageParams {
            size: CREDENTIAL_CHECK_SIZE.to_string(),
            ..Text2ImageParams::new(CREDENTIAL_CHECK_PROMPT)
        };
        self.text2image()
            .generate(&params)
            .await
            .map(|_| ())
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "credential validation failed");
                Error::CredentialValidation(err.to_string())
            })
    }
}
