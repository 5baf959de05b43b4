//! Blocking client tests.

#![cfg(feature = "blocking")]

use std::time::Duration;

use arkmedia::{
    BlockingClient, BlockingConfig, Error, GenerationRequest, Modality, PollConfig, PollOutcome,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn blocking_task_round_trip() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime should start");
    let server = rt.block_on(async { MockServer::start().await });

    rt.block_on(async {
        Mock::given(method("POST"))
            .and(path("/api/v3/contents/generations/tasks"))
            .and(header("authorization", "Bearer ark-test-key"))
            .and(body_json(json!({
                "model": "doubao-seedance-1-0-lite-t2v-250428",
                "content": [{ "type": "text", "text": "a cat --ratio 16:9" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "t1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/contents/generations/tasks/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/contents/generations/tasks/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "succeeded",
                "content": { "video_url": "https://x/video.mp4" }
            })))
            .mount(&server)
            .await;
    });

    let client = BlockingClient::new(BlockingConfig {
        api_key: Some("ark-test-key".into()),
        base_url: Some(format!("{}/api/v3", server.uri())),
        ..Default::default()
    })
    .expect("client creation should succeed");

    let req =
        GenerationRequest::builder("doubao-seedance-1-0-lite-t2v-250428", "a cat --ratio 16:9")
            .build()
            .unwrap();
    let task_id = client
        .create_task(&req, Modality::TextToVideo)
        .expect("task creation should succeed");
    assert_eq!(task_id, "t1");

    let poller = client.poller(PollConfig {
        max_attempts: 3,
        interval: Duration::from_millis(5),
    });
    let outcome = poller.run(&client, &task_id, |_| {}).unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Succeeded {
            result_uri: "https://x/video.mp4".into(),
            attempts: 2
        }
    );
}

#[test]
fn blocking_image_error_keeps_status() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime should start");
    let server = rt.block_on(async { MockServer::start().await });
    rt.block_on(async {
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
    });

    let client = BlockingClient::new(BlockingConfig {
        api_key: Some("ark-test-key".into()),
        base_url: Some(server.uri()),
        ..Default::default()
    })
    .unwrap();
    let req = GenerationRequest::builder("m", "a fox").build().unwrap();
    let err = client.submit_image(&req).unwrap_err();

    assert_eq!(err.status(), Some(429));
    match err {
        Error::Api(api) => assert_eq!(api.message, "slow down"),
        other => panic!("expected api error, got {other:?}"),
    }
}
