//! Rust SDK for the Volcengine Ark generative-media API, plus host tool
//! adapters for text-to-image, text-to-video and image-to-video.
//!
//! The [`Client`] talks to the Ark HTTP API, [`TaskPoller`] drives video
//! generation tasks to a terminal state, [`MediaResolver`] turns uploaded
//! files into bytes, and the adapters in [`tools`] stitch those together into
//! message-emitting host actions.
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::time::Duration;

/// Region used when neither a region nor a base URL is configured.
pub const DEFAULT_REGION: &str = "cn-beijing";

/// Default User-Agent style client header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("arkmedia-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for fetching remote input media (60 seconds).
pub const MEDIA_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Status checks made before a pending task is reported as timed out.
pub const MAX_POLL_ATTEMPTS: u32 = 60;

/// Fixed delay before each status check.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Image size used when a request does not name one.
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

pub const DEFAULT_IMAGE_MODEL: &str = "doubao-seedream-3-0-t2i-250415";
pub const DEFAULT_TEXT_TO_VIDEO_MODEL: &str = "doubao-seedance-1-0-lite-t2v-250428";
pub const DEFAULT_IMAGE_TO_VIDEO_MODEL: &str = "doubao-seedance-1-0-lite-i2v-250428";

/// Ark API base URL for a region, e.g. `https://ark.cn-beijing.volces.com/api/v3`.
pub fn base_url_for_region(region: &str) -> String {
    format!("https://ark.{}.volces.com/api/v3", region.trim())
}

mod api;
mod client;
mod core;
mod errors;
mod http;
mod images;
mod media;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod poller;
pub mod prompt;
mod tasks;
mod telemetry;
pub mod tools;
mod types;

#[cfg(feature = "blocking")]
mod blocking;

pub use api::{BoxFuture, MediaApi};
pub use client::{Client, Config, ENV_API_KEY, ENV_BASE_URL, ENV_REGION};
pub use errors::{
    APIError, Error, Result, TransportError, TransportErrorKind, ValidationError,
};
pub use http::{HeaderEntry, HeaderList, REQUEST_ID_HEADER};
pub use images::ImagesClient;
pub use media::{
    decode_base64, encode_base64, sniff_mime_type, EncodedMedia, MediaFile, MediaPayload,
    MediaResolver, MediaSource, MediaSourceKind, MediaStream, ReadSeek, ResolveAttempt,
    ResolvedMedia, FALLBACK_IMAGE_MIME,
};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockConfig, MockMediaClient};
pub use poller::{PollConfig, PollOutcome, PollProgress, TaskPoller};
pub use prompt::{DirectiveMatch, PromptDirectives};
pub use tasks::TasksClient;
pub use telemetry::{HttpRequestMetrics, MetricsCallbacks, PollAttemptMetrics, RequestContext};
pub use tools::{
    FnSink, Image2VideoParams, Image2VideoTool, MessageSink, Text2ImageParams, Text2ImageTool,
    Text2VideoParams, Text2VideoTool, ToolMessage, ToolProvider,
};
pub use types::{
    ContentPart, GenerationRequest, GenerationRequestBuilder, GenerationTask, ImageData,
    ImageOutput, ImageRequest, ImageResponse, ImageUrl, Modality, ResponseFormat,
    TaskContent, TaskCreateRequest, TaskError, TaskStatus, TaskStatusResponse,
};

#[cfg(feature = "blocking")]
pub use blocking::{BlockingClient, BlockingConfig, BlockingTaskPoller};
