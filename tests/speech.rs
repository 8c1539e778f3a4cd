use std::fs;

use serde_json::{json, Value};
use vidnarrator::{EdenAiConfig, EdenAiSynthesizer, Error, SpeechSynthesizer};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUDIO: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

#[tokio::test]
async fn writes_json_and_wav_with_shared_timestamp() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/v2/audio/text_to_speech"))
        .and(header("authorization", "Bearer ed-key"))
        .and(body_json(json!({
            "providers": "openai/ru_alloy",
            "language": "ru-RU",
            "option": "MALE",
            "text": "Привет, мир"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openai/ru_alloy": {
                "status": "success",
                "audio_resource_url": format!("{}/audio/narration.wav", server.uri())
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/audio/narration.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(AUDIO))
        .expect(1)
        .mount(&server)
        .await;

    let synth = EdenAiSynthesizer::new(
        EdenAiConfig::new("ed-key")
            .with_base_url(server.uri())
            .with_work_dir(dir.path()),
    );
    let result = synth.synthesize("Привет, мир").await.unwrap();

    assert_eq!(result.json_path.file_stem(), result.audio_path.file_stem());
    assert_eq!(result.json_path.extension().unwrap(), "json");
    assert_eq!(result.audio_path.extension().unwrap(), "wav");

    let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 2);

    assert_eq!(fs::read(&result.audio_path).unwrap(), AUDIO);
    let saved = fs::read_to_string(&result.json_path).unwrap();
    let saved: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved["openai/ru_alloy"]["status"], "success");
}

#[tokio::test]
async fn missing_provider_entry_is_an_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/v2/audio/text_to_speech"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "oops"})))
        .mount(&server)
        .await;

    let synth = EdenAiSynthesizer::new(
        EdenAiConfig::new("ed-key")
            .with_base_url(server.uri())
            .with_work_dir(dir.path()),
    );
    let err = synth.synthesize("текст").await.unwrap_err();
    assert!(matches!(err, Error::MissingField { .. }));
}

#[tokio::test]
async fn http_failure_propagates() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/v2/audio/text_to_speech"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let synth = EdenAiSynthesizer::new(
        EdenAiConfig::new("bad")
            .with_base_url(server.uri())
            .with_work_dir(dir.path()),
    );
    let err = synth.synthesize("текст").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
