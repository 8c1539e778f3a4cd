//! Per-component configuration passed explicitly at construction time.

use std::path::PathBuf;

use serde::Serialize;

use crate::poll::PollConfig;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const EDEN_AI_BASE_URL: &str = "https://api.edenai.run";

/// Sampling parameters sent with every Gemini request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// MIME type declared for uploaded videos.
    pub mime_type: String,
    pub generation: GenerationConfig,
    pub poll: PollConfig,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_owned(),
            model: "gemini-1.5-flash".to_owned(),
            mime_type: "video/mp4".to_owned(),
            generation: GenerationConfig::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EdenAiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Provider/voice key; also the key of the provider's entry in the reply.
    pub provider: String,
    pub language: String,
    pub option: String,
    /// Directory receiving the `<ts>.json` / `<ts>.wav` intermediates.
    pub work_dir: PathBuf,
}

impl EdenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: EDEN_AI_BASE_URL.to_owned(),
            provider: "openai/ru_alloy".to_owned(),
            language: "ru-RU".to_owned(),
            option: "MALE".to_owned(),
            work_dir: PathBuf::from("."),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}
