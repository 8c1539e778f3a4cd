use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vidnarrator::{
    Credentials, EdenAiConfig, EdenAiSynthesizer, GeminiConfig, GeminiSummarizer, Outcome,
    Pipeline, PollConfig, VideoComposer,
};

#[derive(Parser)]
#[command(name = "vidnarrator")]
#[command(about = "Summarize a video and replace its audio with a narrated summary", long_about = None)]
struct Cli {
    /// Video to narrate; prompted for when omitted.
    input_file: Option<PathBuf>,
    #[arg(short, long, default_value = "api.txt")]
    credentials: PathBuf,
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
    /// Status checks before giving up on a remote file.
    #[arg(long, default_value_t = 30)]
    max_polls: u32,
    #[arg(long)]
    keep_intermediates: bool,
}

fn prompt_for_path() -> anyhow::Result<PathBuf> {
    print!("Enter the path to the video file: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(PathBuf::from(line.trim()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidnarrator=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let credentials = Credentials::load(&cli.credentials)
        .with_context(|| format!("loading credentials from {}", cli.credentials.display()))?;
    let summarizer = GeminiSummarizer::new(
        GeminiConfig::new(credentials.google())
            .with_poll(PollConfig::default().with_max_attempts(cli.max_polls)),
    );
    let synthesizer = EdenAiSynthesizer::new(
        EdenAiConfig::new(credentials.eden_ai()).with_work_dir(&cli.output_dir),
    );

    let video_path = match cli.input_file {
        Some(path) => path,
        None => prompt_for_path()?,
    };

    let pipeline = Pipeline::new(
        Box::new(summarizer),
        Box::new(synthesizer),
        Box::new(VideoComposer::default()),
    )
        .with_output_dir(&cli.output_dir)
        .keep_intermediates(cli.keep_intermediates);
    match pipeline
        .run(&video_path)
        .await
        .with_context(|| format!("narrating {}", video_path.display()))?
    {
        Outcome::InputNotFound(path) => {
            tracing::debug!(path = %path.display(), "nothing to do");
        }
        Outcome::Completed { output, .. } => {
            tracing::info!(output = %output.display(), "pipeline finished");
        }
    }

    Ok(())
}
