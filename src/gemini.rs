//! Gemini video summarization over the REST File API.
//!
//! The video is uploaded with the resumable upload protocol, polled until
//! the service marks it `ACTIVE`, and then referenced from a chat session
//! that asks for a detailed summary.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::poll::{self, Readiness};
use crate::summary::{Summarizer, DETAILED_PROMPT, SEED_PROMPT};

const SERVICE: &str = "Gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Processing state of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
    #[serde(other)]
    Unknown,
}

impl FileState {
    fn readiness(&self) -> Readiness {
        match self {
            FileState::Processing => Readiness::Pending,
            FileState::Active => Readiness::Ready,
            other => Readiness::Failed(other.as_str().to_owned()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::StateUnspecified => "STATE_UNSPECIFIED",
            FileState::Processing => "PROCESSING",
            FileState::Active => "ACTIVE",
            FileState::Failed => "FAILED",
            FileState::Unknown => "UNKNOWN",
        }
    }
}

/// Handle to a file stored by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, `files/<id>`.
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub mime_type: String,
    pub uri: String,
    #[serde(default = "default_state")]
    pub state: FileState,
}

fn default_state() -> FileState {
    FileState::StateUnspecified
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    file: UploadMetadataFile<'a>,
}

#[derive(Debug, Serialize)]
struct UploadMetadataFile<'a> {
    display_name: &'a str,
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_owned(),
            parts,
        }
    }

    fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::FileData { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn file(file: &RemoteFile) -> Self {
        Part::FileData {
            file_data: FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    generation_config: &'a crate::config::GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Thin client over the endpoints the summarizer needs.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Endpoint URL. The key travels in a header only, so request errors
    /// that echo the URL never carry it.
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Uploads local bytes and returns the new file's handle.
    pub async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile> {
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("video");

        let start = self
            .client
            .post(self.url("upload/v1beta/files"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadMetadata {
                file: UploadMetadataFile { display_name },
            })
            .send()
            .await?;
        let start = check_status(start).await?;
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::missing_field(SERVICE, "x-goog-upload-url"))?
            .to_owned();
        debug!(%upload_url, size = bytes.len(), "upload session opened");

        let finish = self
            .client
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("X-Goog-Upload-Offset", 0)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(finish).await?.json().await?;
        info!(
            name = %uploaded.file.name,
            display_name = %uploaded.file.display_name,
            uri = %uploaded.file.uri,
            "file uploaded"
        );
        Ok(uploaded.file)
    }

    pub async fn get_file(&self, name: &str) -> Result<RemoteFile> {
        let response = self
            .client
            .get(self.url(&format!("v1beta/{name}")))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Blocks until every file is `ACTIVE`, within the configured poll budget.
    pub async fn wait_until_active(&self, files: &[RemoteFile]) -> Result<()> {
        for file in files {
            poll::wait_until_ready(&self.config.poll, &file.name, move || async move {
                let current = self.get_file(&file.name).await?;
                Ok::<_, Error>(current.state.readiness())
            })
            .await?;
        }
        info!(count = files.len(), "all files ready");
        Ok(())
    }

    pub fn start_chat(&self, history: Vec<Content>) -> ChatSession<'_> {
        ChatSession {
            client: self,
            history,
        }
    }

    async fn generate(&self, contents: &[Content]) -> Result<Content> {
        let response = self
            .client
            .post(self.url(&format!("v1beta/models/{}:generateContent", self.config.model)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&GenerateRequest {
                contents,
                generation_config: &self.config.generation,
            })
            .send()
            .await?;
        let response: GenerateResponse = check_status(response).await?.json().await?;
        response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.content)
            .ok_or_else(|| Error::missing_field(SERVICE, "candidates"))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        service: SERVICE,
        status: status.as_u16(),
        body,
    })
}

/// Multi-turn conversation that carries its history between messages.
#[derive(Debug)]
pub struct ChatSession<'a> {
    client: &'a GeminiClient,
    history: Vec<Content>,
}

impl ChatSession<'_> {
    /// Sends a user turn and returns the model's reply text.
    pub async fn send_message(&mut self, text: &str) -> Result<String> {
        self.history.push(Content::user(vec![Part::text(text)]));
        let reply = self.client.generate(&self.history).await?;
        let text = reply.text();
        self.history.push(reply);
        Ok(text)
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }
}

/// Summarizer backed by Gemini's multimodal chat.
#[derive(Debug, Clone)]
pub struct GeminiSummarizer {
    client: GeminiClient,
}

impl GeminiSummarizer {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: GeminiClient::new(config),
        }
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, video_path: &Path) -> Result<String> {
        let file = self
            .client
            .upload_file(video_path, &self.client.config().mime_type)
            .await?;
        println!("File '{}' uploaded as: {}", file.display_name, file.uri);

        println!("Waiting for file processing...");
        self.client
            .wait_until_active(std::slice::from_ref(&file))
            .await?;
        println!("...all files ready");

        let mut chat = self.client.start_chat(vec![
            Content::user(vec![Part::file(&file)]),
            Content::user(vec![Part::text(SEED_PROMPT)]),
        ]);
        chat.send_message(DETAILED_PROMPT).await
    }
}
