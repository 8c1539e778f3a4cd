//! Summarize, narrate, splice, clean up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::cleanup;
use crate::error::{Error, Result};
use crate::speech::SpeechSynthesizer;
use crate::summary::Summarizer;
use crate::video::{self, Composer};

/// How a run ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The input path does not exist; nothing was done.
    InputNotFound(PathBuf),
    Completed { summary: String, output: PathBuf },
}

pub struct Pipeline {
    summarizer: Box<dyn Summarizer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    composer: Arc<dyn Composer>,
    output_dir: PathBuf,
    keep_intermediates: bool,
}

impl Pipeline {
    pub fn new(
        summarizer: Box<dyn Summarizer>,
        synthesizer: Box<dyn SpeechSynthesizer>,
        composer: Box<dyn Composer>,
    ) -> Self {
        Self {
            summarizer,
            synthesizer,
            composer: Arc::from(composer),
            output_dir: PathBuf::from("."),
            keep_intermediates: false,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    /// Runs every stage in order. Errors abort the run and leave any
    /// intermediates already written on disk.
    pub async fn run(&self, video_path: &Path) -> Result<Outcome> {
        if !video_path.exists() {
            println!("Video file not found. Please check the file path.");
            return Ok(Outcome::InputNotFound(video_path.to_path_buf()));
        }

        println!("Uploading video and requesting a summary...");
        let summary = self.summarizer.summarize(video_path).await?;
        println!("Video summary:");
        println!("{summary}");

        println!("Synthesizing narration...");
        let narration = self.synthesizer.synthesize(&summary).await?;
        info!(
            json = %narration.json_path.display(),
            audio = %narration.audio_path.display(),
            "narration ready"
        );

        let output = video::output_path_for(video_path, &self.output_dir);
        println!(
            "Replacing the audio track and saving as {}...",
            output.display()
        );
        self.compose(video_path, &narration.audio_path, &output)
            .await?;
        println!("Done! Video saved as {}", output.display());

        if self.keep_intermediates {
            info!("keeping intermediate files");
        } else {
            cleanup::delete_files(&narration.paths());
        }

        Ok(Outcome::Completed { summary, output })
    }

    /// Rendering is CPU-bound, so it runs on the blocking pool.
    async fn compose(&self, video_path: &Path, audio_path: &Path, output: &Path) -> Result<()> {
        let composer = Arc::clone(&self.composer);
        let (video_path, audio_path, output) = (
            video_path.to_path_buf(),
            audio_path.to_path_buf(),
            output.to_path_buf(),
        );
        tokio::task::spawn_blocking(move || composer.compose(&video_path, &audio_path, &output))
            .await
            .map_err(|e| Error::media(format!("compose task failed: {e}")))?
    }
}
