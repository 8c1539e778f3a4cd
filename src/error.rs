//! Error types for the narration pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("credential file not found: {0}")]
    CredentialsNotFound(PathBuf),

    #[error("malformed credential line {line}: expected `name=value`")]
    MalformedCredential { line: usize },

    #[error("required credential `{0}` is missing")]
    MissingCredential(&'static str),

    #[error("file {name} failed to process (state {state})")]
    ProcessingFailed { name: String, state: String },

    #[error("file {name} failed to process: still PROCESSING after {attempts} status checks")]
    ProcessingTimeout { name: String, attempts: u32 },

    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("response from {service} is missing `{field}`")]
    MissingField {
        service: &'static str,
        field: String,
    },

    #[error("narration ({audio_secs:.2}s) is longer than the source video ({video_secs:.2}s)")]
    NarrationTooLong { audio_secs: f64, video_secs: f64 },

    #[error("media error: {0}")]
    Media(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

impl Error {
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media(message.into())
    }

    pub fn missing_field(service: &'static str, field: impl Into<String>) -> Self {
        Self::MissingField {
            service,
            field: field.into(),
        }
    }
}
