//! Summarize a video with a multimodal model, narrate the summary with a
//! text-to-speech service and splice the narration back into the video.

pub mod cleanup;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod pipeline;
pub mod poll;
pub mod speech;
pub mod summary;
pub mod video;

pub use config::{EdenAiConfig, GeminiConfig};
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use gemini::GeminiSummarizer;
pub use pipeline::{Outcome, Pipeline};
pub use poll::PollConfig;
pub use speech::{EdenAiSynthesizer, SpeechSynthesizer, SynthesisResult};
pub use summary::Summarizer;
pub use video::{Composer, VideoComposer};
