use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Seed turn placed in the conversation right after the video.
pub const SEED_PROMPT: &str = "Сделайте объемную сводку этого видео.\n";

/// The question actually answered by the model.
pub const DETAILED_PROMPT: &str = "Сделайте объемную сводку этого видео. Объясните все в деталях.";

/// Produces a textual summary of a local video.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, video_path: &Path) -> Result<String>;
}
