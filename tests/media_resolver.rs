//! Input resolution against a wiremock file server.

use std::io::Cursor;
use std::time::Duration;

use arkmedia::{
    Error, MediaFile, MediaResolver, MediaSourceKind, MediaStream, ResolveAttempt,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

#[tokio::test]
async fn url_resolution_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cat.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(JPEG),
        )
        .expect(2)
        .mount(&server)
        .await;

    let resolver = MediaResolver::default();
    let mut file = MediaFile::from_url(format!("{}/cat.jpg", server.uri()));
    let first = resolver.resolve(&mut file).await.unwrap();
    let second = resolver.resolve(&mut file).await.unwrap();

    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.size, JPEG.len());
    assert_eq!(first.source, MediaSourceKind::RemoteRef);
    assert_eq!(first.into_payload().mime_type, "image/jpeg");
}

#[tokio::test]
async fn missing_url_without_fallback_is_no_media_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut attempts: Vec<ResolveAttempt> = Vec::new();
    let mut file = MediaFile::from_url(format!("{}/gone.png", server.uri()));
    let err = MediaResolver::default()
        .resolve_reporting(&mut file, |a| attempts.push(a.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoMediaData));
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].kind, MediaSourceKind::RemoteRef);
    assert!(attempts[0].outcome.is_err());
}

#[tokio::test]
async fn failed_url_falls_back_to_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut file = MediaFile::from_url(format!("{}/slow.png", server.uri()))
        .with_stream(MediaStream::seekable(Cursor::new(JPEG.to_vec())));
    let resolved = MediaResolver::default()
        .with_fetch_timeout(Duration::from_millis(50))
        .resolve(&mut file)
        .await
        .unwrap();

    assert_eq!(resolved.source, MediaSourceKind::Stream);
    assert_eq!(resolved.bytes, JPEG);
}

#[tokio::test]
async fn path_source_reads_file() {
    let dir = std::env::temp_dir().join(format!("arkmedia-resolver-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file_path = dir.join("input.jpg");
    std::fs::write(&file_path, JPEG).unwrap();

    let mut file = MediaFile::from_path(dir.join("missing.jpg")).with_cached_path(&file_path);
    let resolved = MediaResolver::default().resolve(&mut file).await.unwrap();

    assert_eq!(resolved.source, MediaSourceKind::CachedPath);
    assert_eq!(resolved.size, JPEG.len());
    std::fs::remove_dir_all(&dir).unwrap();
}
