//! Input media resolution and transport encoding.
//!
//! Hosts hand files over in several shapes: a downloadable URL, an in-memory
//! blob, a readable stream, a path, or a path into a local cache. A
//! [`MediaFile`] carries whichever of these are available and
//! [`MediaResolver`] tries them in a fixed order until one yields bytes.

use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom},
    path::PathBuf,
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::CONTENT_TYPE;

use crate::{
    errors::{Error, Result, TransportError},
    MEDIA_FETCH_TIMEOUT,
};

/// MIME type assumed for uploads whose content cannot be identified.
pub const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A readable input. Seekable streams are rewound after being read.
pub enum MediaStream {
    Sequential(Box<dyn Read + Send>),
    Seekable(Box<dyn ReadSeek>),
}

impl MediaStream {
    pub fn sequential(reader: impl Read + Send + 'static) -> Self {
        MediaStream::Sequential(Box::new(reader))
    }

    pub fn seekable(reader: impl Read + Seek + Send + 'static) -> Self {
        MediaStream::Seekable(Box::new(reader))
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            MediaStream::Sequential(reader) => {
                reader.read_to_end(&mut buf)?;
            }
            MediaStream::Seekable(reader) => {
                reader.read_to_end(&mut buf)?;
                // The bytes are already read; a failed rewind only affects later reuse.
                if let Err(_err) = reader.seek(SeekFrom::Start(0)) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_err, "media stream could not be rewound");
                }
            }
        }
        Ok(buf)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaStream::Sequential(_) => f.write_str("MediaStream::Sequential"),
            MediaStream::Seekable(_) => f.write_str("MediaStream::Seekable"),
        }
    }
}

/// One way of getting at a file's bytes.
#[derive(Debug)]
pub enum MediaSource {
    RemoteRef(String),
    InMemory(Vec<u8>),
    Stream(MediaStream),
    PathRef(PathBuf),
    /// Path of a host-side cached copy.
    CachedPath(PathBuf),
}

impl MediaSource {
    pub fn kind(&self) -> MediaSourceKind {
        match self {
            MediaSource::RemoteRef(_) => MediaSourceKind::RemoteRef,
            MediaSource::InMemory(_) => MediaSourceKind::InMemory,
            MediaSource::Stream(_) => MediaSourceKind::Stream,
            MediaSource::PathRef(_) => MediaSourceKind::PathRef,
            MediaSource::CachedPath(_) => MediaSourceKind::CachedPath,
        }
    }
}

/// Source kinds in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaSourceKind {
    RemoteRef,
    InMemory,
    Stream,
    PathRef,
    CachedPath,
}

impl MediaSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSourceKind::RemoteRef => "url",
            MediaSourceKind::InMemory => "blob",
            MediaSourceKind::Stream => "stream",
            MediaSourceKind::PathRef => "path",
            MediaSourceKind::CachedPath => "cached path",
        }
    }
}

impl fmt::Display for MediaSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host-supplied file with every channel it was offered through.
#[derive(Debug, Default)]
pub struct MediaFile {
    sources: Vec<MediaSource>,
}

impl MediaFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new().with_url(url)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new().with_bytes(bytes)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new().with_path(path)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.sources.push(MediaSource::RemoteRef(url.into()));
        self
    }

    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.sources.push(MediaSource::InMemory(bytes.into()));
        self
    }

    pub fn with_stream(mut self, stream: MediaStream) -> Self {
        self.sources.push(MediaSource::Stream(stream));
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(MediaSource::PathRef(path.into()));
        self
    }

    pub fn with_cached_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(MediaSource::CachedPath(path.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[MediaSource] {
        &self.sources
    }
}

/// Report for one tried source, handed to the resolver's diagnostics callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveAttempt {
    pub kind: MediaSourceKind,
    /// Byte count on success, reason on failure.
    pub outcome: std::result::Result<usize, String>,
}

/// Bytes read from a [`MediaFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub bytes: Vec<u8>,
    pub size: usize,
    pub source: MediaSourceKind,
    /// `Content-Type` of a downloaded file.
    pub content_type: Option<String>,
}

impl ResolvedMedia {
    fn new(bytes: Vec<u8>, source: MediaSourceKind, content_type: Option<String>) -> Self {
        Self {
            size: bytes.len(),
            bytes,
            source,
            content_type,
        }
    }

    /// Tags the bytes with a MIME type: magic bytes first, then an
    /// `image/*` content type, then [`FALLBACK_IMAGE_MIME`].
    pub fn into_payload(self) -> MediaPayload {
        let mime_type = sniff_mime_type(&self.bytes)
            .map(|m| m.to_string())
            .or_else(|| {
                self.content_type
                    .as_deref()
                    .and_then(|ct| ct.split(';').next())
                    .map(|ct| ct.trim().to_lowercase())
                    .filter(|ct| ct.starts_with("image/"))
            })
            .unwrap_or_else(|| FALLBACK_IMAGE_MIME.to_string());
        MediaPayload {
            bytes: self.bytes,
            mime_type,
        }
    }
}

/// Raw bytes plus MIME type, consumed by the request encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaPayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn into_encoded(self) -> EncodedMedia {
        EncodedMedia {
            raw_size: self.bytes.len(),
            base64: encode_base64(&self.bytes),
            mime_type: self.mime_type,
        }
    }

    /// `data:<mime>;base64,<payload>`
    pub fn into_data_uri(self) -> String {
        self.into_encoded().data_uri()
    }
}

/// Base64 form of a [`MediaPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMedia {
    pub mime_type: String,
    pub base64: String,
    pub raw_size: usize,
}

impl EncodedMedia {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn raw_kb(&self) -> f64 {
        self.raw_size as f64 / 1024.0
    }

    pub fn encoded_kb(&self) -> f64 {
        self.base64.len() as f64 / 1024.0
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Identifies common image formats by their leading bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

/// Turns a [`MediaFile`] into bytes.
#[derive(Clone)]
pub struct MediaResolver {
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl Default for MediaResolver {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl MediaResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            fetch_timeout: MEDIA_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub async fn resolve(&self, file: &mut MediaFile) -> Result<ResolvedMedia> {
        self.resolve_reporting(file, |_| {}).await
    }

    /// Like [`MediaResolver::resolve`], reporting every source tried.
    ///
    /// Sources are tried url, blob, stream, path, cached path; a failing or
    /// empty source falls through to the next one.
    pub async fn resolve_reporting<F>(
        &self,
        file: &mut MediaFile,
        mut report: F,
    ) -> Result<ResolvedMedia>
    where
        F: FnMut(&ResolveAttempt),
    {
        let mut order: Vec<usize> = (0..file.sources.len()).collect();
        order.sort_by_key(|&idx| file.sources[idx].kind());

        for idx in order {
            let source = &mut file.sources[idx];
            let kind = source.kind();
            let attempt = self.read_source(source).await;
            match attempt {
                Ok((bytes, content_type)) if !bytes.is_empty() => {
                    report(&ResolveAttempt {
                        kind,
                        outcome: Ok(bytes.len()),
                    });
                    #[cfg(feature = "tracing")]
                    tracing::debug!(source = %kind, size = bytes.len(), "resolved media input");
                    return Ok(ResolvedMedia::new(bytes, kind, content_type));
                }
                Ok(_) => {
                    report(&ResolveAttempt {
                        kind,
                        outcome: Err("source was empty".to_string()),
                    });
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(source = %kind, error = %err, "media source unusable");
                    report(&ResolveAttempt {
                        kind,
                        outcome: Err(err.to_string()),
                    });
                }
            }
        }
        Err(Error::NoMediaData)
    }

    async fn read_source(&self, source: &mut MediaSource) -> Result<(Vec<u8>, Option<String>)> {
        match source {
            MediaSource::RemoteRef(url) => self.fetch(url).await,
            MediaSource::InMemory(bytes) => Ok((bytes.clone(), None)),
            MediaSource::Stream(stream) => {
                // Blocking read off the async worker; the stream is put back afterwards.
                let mut taken = std::mem::replace(stream, MediaStream::sequential(io::empty()));
                let (taken, read) = tokio::task::spawn_blocking(move || {
                    let read = taken.read_all();
                    (taken, read)
                })
                .await
                .map_err(|err| Error::Io(io::Error::other(err)))?;
                *stream = taken;
                Ok((read?, None))
            }
            MediaSource::PathRef(path) | MediaSource::CachedPath(path) => {
                let bytes = tokio::fs::read(&*path).await?;
                Ok((bytes, None))
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let resp = self
            .http
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|err| Error::Transport(TransportError::from(err)))?
            .error_for_status()
            .map_err(|err| Error::Transport(TransportError::from(err)))?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| Error::Transport(TransportError::from(err)))?;
        Ok((bytes.to_vec(), content_type))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn base64_round_trip_is_lossless() {
        let bytes: Vec<u8> = (0..=255u8).chain([0, 0, 255]).collect();
        let encoded = encode_base64(&bytes);
        assert_eq!(decode_base64(&encoded).unwrap(), bytes);
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn data_uri_carries_mime_type() {
        let payload = MediaPayload::new(b"hi".to_vec(), "image/png");
        assert_eq!(payload.into_data_uri(), "data:image/png;base64,aGk=");
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_mime_type(&PNG_HEADER), Some("image/png"));
        assert_eq!(sniff_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_mime_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_mime_type(b"plain"), None);
    }

    #[test]
    fn unknown_bytes_fall_back_to_jpeg() {
        let payload = ResolvedMedia::new(b"plain".to_vec(), MediaSourceKind::InMemory, None)
            .into_payload();
        assert_eq!(payload.mime_type, FALLBACK_IMAGE_MIME);

        let typed = ResolvedMedia::new(
            b"plain".to_vec(),
            MediaSourceKind::RemoteRef,
            Some("image/avif; charset=binary".into()),
        )
        .into_payload();
        assert_eq!(typed.mime_type, "image/avif");
    }

    #[tokio::test]
    async fn blob_wins_over_later_sources() {
        let mut file = MediaFile::new()
            .with_path("/definitely/not/here.png")
            .with_bytes(PNG_HEADER.to_vec());
        let resolved = MediaResolver::default().resolve(&mut file).await.unwrap();
        assert_eq!(resolved.source, MediaSourceKind::InMemory);
        assert_eq!(resolved.size, PNG_HEADER.len());
    }

    #[tokio::test]
    async fn seekable_stream_is_rewound_for_reuse() {
        let mut file =
            MediaFile::new().with_stream(MediaStream::seekable(Cursor::new(b"frame".to_vec())));
        let resolver = MediaResolver::default();
        let first = resolver.resolve(&mut file).await.unwrap();
        let second = resolver.resolve(&mut file).await.unwrap();
        assert_eq!(first.bytes, b"frame");
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.source, MediaSourceKind::Stream);
    }

    struct NoRewind(Cursor<Vec<u8>>);

    impl Read for NoRewind {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for NoRewind {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no rewind"))
        }
    }

    #[tokio::test]
    async fn failed_rewind_still_returns_bytes() {
        let mut file = MediaFile::new()
            .with_stream(MediaStream::seekable(NoRewind(Cursor::new(PNG_HEADER.to_vec()))))
            .with_path("/definitely/not/here.png");
        let resolved = MediaResolver::default().resolve(&mut file).await.unwrap();
        assert_eq!(resolved.source, MediaSourceKind::Stream);
        assert_eq!(resolved.bytes, PNG_HEADER);
    }

    #[tokio::test]
    async fn empty_sources_fall_through_to_path() {
        let dir = std::env::temp_dir().join(format!("arkmedia-media-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.png");
        std::fs::write(&path, PNG_HEADER).unwrap();

        let mut file = MediaFile::new()
            .with_bytes(Vec::new())
            .with_stream(MediaStream::sequential(io::empty()))
            .with_cached_path(&path);

        let mut tried = Vec::new();
        let resolved = MediaResolver::default()
            .resolve_reporting(&mut file, |a| tried.push(a.kind))
            .await
            .unwrap();
        assert_eq!(resolved.source, MediaSourceKind::CachedPath);
        assert_eq!(resolved.into_payload().mime_type, "image/png");
        assert_eq!(
            tried,
            vec![
                MediaSourceKind::InMemory,
                MediaSourceKind::Stream,
                MediaSourceKind::CachedPath
            ]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn nothing_usable_is_no_media_data() {
        let mut file = MediaFile::from_path("/definitely/not/here.png");
        let err = MediaResolver::default().resolve(&mut file).await.unwrap_err();
        assert!(matches!(err, Error::NoMediaData));

        let mut empty = MediaFile::new();
        assert!(matches!(
            MediaResolver::default().resolve(&mut empty).await,
            Err(Error::NoMediaData)
        ));
    }
}
