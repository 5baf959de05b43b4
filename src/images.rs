//! Image generation API client.

use std::sync::Arc;

use reqwest::Method;

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    telemetry::RequestContext,
    types::{ImageRequest, ImageResponse},
};

const IMAGES_PATH: &str = "/images/generations";

/// Client for image generation operations.
///
/// # Example
///
/// ```rust,ignore
/// use arkmedia::{Client, GenerationRequest, ImageRequest};
///
/// let req = GenerationRequest::builder("doubao-seedream-3-0-t2i-250415", "A lighthouse at dusk")
///     .size_or_ratio("1024x1024")
///     .build()?;
/// let response = client.images().generate(ImageRequest::from_generation(&req)).await?;
/// println!("{}", response.data[0].url.as_deref().unwrap_or_default());
/// ```
#[derive(Clone)]
pub struct ImagesClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ImagesClient {
    /// Generate one image from a text prompt. Single attempt, no retry.
    pub async fn generate(&self, req: ImageRequest) -> Result<ImageResponse> {
        if req.prompt.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("prompt is required").with_field("prompt"),
            ));
        }

        let builder = self.inner.request(Method::POST, IMAGES_PATH)?.json(&req);
        let ctx = RequestContext::new(Method::POST.as_str(), IMAGES_PATH);
        self.inner.execute_json(builder, ctx).await
    }
}
