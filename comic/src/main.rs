//! Educational comic generator.
//!
//! Turns a topic or a video into an age-adapted comic and writes the panels,
//! per-page strips and a full strip to an output directory.
//!
//! ```bash
//! cargo run -p comic -- --topic "Photosynthesis" --age kid --pages 1
//! cargo run -p comic -- --video "https://youtu.be/..." --age teen --pages 2 --theme "Black holes"
//! ```
//!
//! Needs `GOOGLE_API_KEY` (from the environment or a `.env` file). Video
//! sources also need `yt-dlp`, `ffmpeg` and `whisper` on PATH.

mod export;

use anyhow::Context as _;
use clap::Parser;
use comic_core::{
    job, ErrorClass, GenerationRequest, Pipeline, PipelineConfig, RenderFailurePolicy,
    ServiceConfig, SourceKind,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "comic", version, about = "Generate an age-adapted educational comic")]
struct Cli {
    /// Topic to explain.
    #[arg(long, conflicts_with = "video", required_unless_present = "video")]
    topic: Option<String>,

    /// Video URL to build the comic from.
    #[arg(long)]
    video: Option<String>,

    /// Audience: toddler (2-5), kid (6-10) or teen (11+).
    #[arg(long, default_value = "kid")]
    age: String,

    /// Number of pages (1-5).
    #[arg(long, default_value_t = 1)]
    pages: u8,

    /// Concept to explain, when it differs from the topic text.
    #[arg(long)]
    theme: Option<String>,

    /// Output directory.
    #[arg(long, default_value = "comic-out")]
    out: PathBuf,

    /// Skip panels that keep failing instead of aborting.
    #[arg(long, default_value_t = false)]
    partial: bool,

    /// Panels kept as visual context for the next render.
    #[arg(long, default_value_t = 2)]
    window: usize,

    /// Retries per panel after the first attempt.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 180)]
    timeout: u64,

    /// Print progress events as JSON lines.
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Cli {
    fn request(&self) -> anyhow::Result<GenerationRequest> {
        let (kind, value) = match (&self.topic, &self.video) {
            (Some(topic), _) => (SourceKind::Topic, topic.clone()),
            (None, Some(video)) => (SourceKind::Video, video.clone()),
            (None, None) => anyhow::bail!("either --topic or --video is required"),
        };

        let mut request = GenerationRequest::new(kind, value, self.age.parse()?, self.pages)?;
        if let Some(theme) = &self.theme {
            request = request.with_theme(theme);
        }
        Ok(request)
    }

    fn pipeline_config(&self) -> PipelineConfig {
        let policy = if self.partial {
            RenderFailurePolicy::SkipPanel
        } else {
            RenderFailurePolicy::Abort
        };
        PipelineConfig::new()
            .with_context_window(self.window)
            .with_max_render_retries(self.retries)
            .with_call_timeout(Duration::from_secs(self.timeout))
            .with_render_failure_policy(policy)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let request = cli.request()?;
    let services = ServiceConfig::from_env()?.build_services();
    let pipeline = Arc::new(Pipeline::new(services, cli.pipeline_config()));

    let job = job::spawn(pipeline, request);

    let cancel = job.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current step...");
            cancel.cancel();
        }
    });

    let (mut events, _cancel, handle) = job.into_parts();
    while let Some(event) = events.next().await {
        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{event}");
        }
    }

    let comic = match handle.await.context("generation task failed")? {
        Ok(comic) => comic,
        Err(err) => {
            anyhow::bail!(
                "{err}\n  stage: {}\n  kind: {}\n  hint: {}",
                err.stage,
                err.error.kind_name(),
                hint(err.class())
            );
        }
    };

    let exported = export::export(&comic, &cli.out)?;
    tracing::debug!(panels = exported.panels.len(), pages = exported.pages.len(), "comic exported");

    println!("\n{}", comic.title);
    println!("  {} panels in {}", comic.len(), cli.out.display());
    if comic.is_partial() {
        let skipped: Vec<String> = comic
            .skipped_panels
            .iter()
            .map(|i| (i + 1).to_string())
            .collect();
        println!("  skipped panels: {}", skipped.join(", "));
    }
    if let Some(strip) = exported.strip {
        println!("  strip: {}", strip.display());
    }
    Ok(())
}

fn hint(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::FixInput => "check the request and try again",
        ErrorClass::RetryLater => "a temporary failure; retrying may help",
        ErrorClass::ServiceUnavailable => "a service is unavailable or misconfigured",
        ErrorClass::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comic_core::AudienceBand;

    #[test]
    fn test_topic_args() {
        let cli = Cli::parse_from(["comic", "--topic", "Gravity", "--age", "6-10", "--pages", "2"]);
        let request = cli.request().unwrap();
        assert_eq!(request.source_kind(), SourceKind::Topic);
        assert_eq!(request.audience_band(), AudienceBand::Kid);
        assert_eq!(request.page_count(), 2);
    }

    #[test]
    fn test_video_args_with_theme() {
        let cli = Cli::parse_from([
            "comic",
            "--video",
            "https://youtu.be/x",
            "--age",
            "teen",
            "--theme",
            "Orbits",
            "--partial",
        ]);
        let request = cli.request().unwrap();
        assert_eq!(request.source_kind(), SourceKind::Video);
        assert_eq!(request.theme(), Some("Orbits"));
        assert_eq!(
            cli.pipeline_config().render_failure_policy,
            RenderFailurePolicy::SkipPanel
        );
    }

    #[test]
    fn test_source_is_required() {
        assert!(Cli::try_parse_from(["comic", "--age", "kid"]).is_err());
        assert!(Cli::try_parse_from(["comic", "--topic", "a", "--video", "b"]).is_err());
    }

    #[test]
    fn test_bad_age_rejected() {
        let cli = Cli::parse_from(["comic", "--topic", "Gravity", "--age", "adult"]);
        assert!(cli.request().is_err());
    }
}
