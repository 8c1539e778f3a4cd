//! Narration synthesis and the intermediate files it leaves behind.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use tracing::info;

use crate::config::EdenAiConfig;
use crate::error::{Error, Result};

const SERVICE: &str = "Eden AI";

/// Paths of the `<ts>.json` / `<ts>.wav` pair written by one synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub json_path: PathBuf,
    pub audio_path: PathBuf,
}

impl SynthesisResult {
    /// Both paths share the timestamp stem.
    pub fn for_timestamp(dir: &Path, timestamp: u64) -> Self {
        Self {
            json_path: dir.join(format!("{timestamp}.json")),
            audio_path: dir.join(format!("{timestamp}.wav")),
        }
    }

    pub fn paths(&self) -> [&Path; 2] {
        [&self.json_path, &self.audio_path]
    }
}

/// Turns summary text into narration audio on disk.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesisResult>;
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Writes `value` with 4-space indentation, leaving non-ASCII text as is.
pub(crate) async fn write_pretty_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    tokio::fs::write(path, buf).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct EdenAiRequest<'a> {
    providers: &'a str,
    language: &'a str,
    option: &'a str,
    text: &'a str,
}

/// Eden AI text-to-speech with a fixed provider, language and voice.
#[derive(Debug, Clone)]
pub struct EdenAiSynthesizer {
    config: EdenAiConfig,
    client: Client,
}

impl EdenAiSynthesizer {
    pub fn new(config: EdenAiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn audio_url<'a>(&self, reply: &'a Value) -> Result<&'a str> {
        let provider = &self.config.provider;
        reply
            .get(provider)
            .ok_or_else(|| Error::missing_field(SERVICE, provider.clone()))?
            .get("audio_resource_url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::missing_field(SERVICE, format!("{provider}.audio_resource_url")))
    }
}

#[async_trait]
impl SpeechSynthesizer for EdenAiSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesisResult> {
        let url = format!(
            "{}/v2/audio/text_to_speech",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&EdenAiRequest {
                providers: &self.config.provider,
                language: &self.config.language,
                option: &self.config.option,
                text,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                service: SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let reply: Value = response.json().await?;

        let result = SynthesisResult::for_timestamp(&self.config.work_dir, unix_timestamp());
        write_pretty_json(&result.json_path, &reply).await?;

        let audio_url = self.audio_url(&reply)?;
        info!(provider = %self.config.provider, %audio_url, "downloading narration");
        let audio = self
            .client
            .get(audio_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(&result.audio_path, &audio).await?;
        info!(
            json = %result.json_path.display(),
            audio = %result.audio_path.display(),
            bytes = audio.len(),
            "narration saved"
        );
        Ok(result)
    }
}
