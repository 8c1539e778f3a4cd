use std::time::Duration;

use serde_json::{json, Value};
use vidnarrator::{Error, GeminiConfig, GeminiSummarizer, PollConfig, Summarizer};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn file_json(server: &MockServer, state: &str) -> Value {
    json!({
        "name": "files/abc",
        "displayName": "talk.mp4",
        "mimeType": "video/mp4",
        "uri": format!("{}/v1beta/files/abc", server.uri()),
        "state": state
    })
}

async fn mount_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-api-key", "g-key"))
        .and(header("X-Goog-Upload-Command", "start"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-url", format!("{}/upload-session/1", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload-session/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": file_json(server, "PROCESSING")
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn config(server: &MockServer, max_attempts: u32) -> GeminiConfig {
    GeminiConfig::new("g-key")
        .with_base_url(server.uri())
        .with_poll(
            PollConfig::default()
                .with_initial_interval(Duration::from_millis(1))
                .with_max_attempts(max_attempts),
        )
}

fn video_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    std::io::Write::write_all(&mut file, b"not really a video").unwrap();
    file
}

#[tokio::test]
async fn summarizes_after_file_becomes_active() {
    let server = MockServer::start().await;
    mount_upload(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(&server, "PROCESSING")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(&server, "ACTIVE")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "В этом видео рассказывается о Rust."}]}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let video = video_file();
    let summary = GeminiSummarizer::new(config(&server, 5))
        .summarize(video.path())
        .await
        .unwrap();
    assert_eq!(summary, "В этом видео рассказывается о Rust.");

    let requests = server.received_requests().await.unwrap();
    let polls = requests
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(polls, 3);

    for request in &requests {
        assert!(
            !request.url.as_str().contains("g-key"),
            "key leaked into {}",
            request.url
        );
        let key = request
            .headers
            .get("x-goog-api-key")
            .and_then(|value| value.to_str().ok());
        assert_eq!(key, Some("g-key"), "{} sent without key header", request.url);
    }

    let generate = requests
        .iter()
        .find(|r| r.url.path().ends_with(":generateContent"))
        .unwrap();
    let body: Value = serde_json::from_slice(&generate.body).unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["parts"][0]["fileData"]["mimeType"], "video/mp4");
    assert_eq!(
        contents[2]["parts"][0]["text"],
        vidnarrator::summary::DETAILED_PROMPT
    );
    assert_eq!(body["generationConfig"]["topK"], 64);
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
}

#[tokio::test]
async fn stuck_processing_times_out_without_generating() {
    let server = MockServer::start().await;
    mount_upload(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(&server, "PROCESSING")))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let video = video_file();
    let err = GeminiSummarizer::new(config(&server, 3))
        .summarize(video.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProcessingTimeout { attempts: 3, .. }));
    assert!(err.to_string().contains("failed to process"));
}

#[tokio::test]
async fn failed_state_is_fatal() {
    let server = MockServer::start().await;
    mount_upload(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(&server, "FAILED")))
        .expect(1)
        .mount(&server)
        .await;

    let video = video_file();
    let err = GeminiSummarizer::new(config(&server, 5))
        .summarize(video.path())
        .await
        .unwrap_err();
    match err {
        Error::ProcessingFailed { name, state } => {
            assert_eq!(name, "files/abc");
            assert_eq!(state, "FAILED");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn api_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let video = video_file();
    let err = GeminiSummarizer::new(config(&server, 5))
        .summarize(video.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 403, .. }));
}

#[tokio::test]
async fn transport_error_does_not_expose_key() {
    let config = GeminiConfig::new("AIzaSECRET123").with_base_url("http://127.0.0.1:9");

    let video = video_file();
    let err = GeminiSummarizer::new(config)
        .summarize(video.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http(_)));
    assert!(!err.to_string().contains("AIzaSECRET123"), "{err}");
    assert!(!format!("{err:?}").contains("AIzaSECRET123"));
}
