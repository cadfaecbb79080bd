use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use satya::analysis::upload::guess_content_type;
use satya::analysis::{build_provider, AnalysisClient, AnalysisResult, MediaType, MediaUpload, ResultStore};
use satya::capture::{CaptureConstraints, CaptureError, MediaCapture, SyntheticCamera};
use satya::config::{AppConfig, Environment};
use satya::notify::Notice;
use satya::overlay::SvgCanvas;
use satya::webcam::WebcamAnalysisLoop;

#[derive(Parser)]
#[command(
    name = "satya",
    about = "Simulated deepfake detection for images, video, audio and webcam frames",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "SATYA_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config and PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Analyze a media file and wait for the verdict
    Analyze {
        /// File to analyze
        path: PathBuf,

        /// Media type: image, video or audio (guessed from the extension if omitted)
        #[arg(long)]
        kind: Option<MediaType>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run the webcam analysis loop against the synthetic camera
    Webcam {
        /// Number of frames to analyze before stopping
        #[arg(long, default_value = "5")]
        frames: u64,

        /// Make the camera fail to open (busy, permission-denied, not-found, ...)
        #[arg(long)]
        fail_with: Option<CaptureError>,

        /// Write the final detection overlay as SVG
        #[arg(long)]
        overlay: Option<PathBuf>,
    },

    /// Ask the help assistant a question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    if cli.log_json || config.server.environment == Environment::Production {
        config.logging.json = true;
    }
    satya::init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(bind = %config.server.bind_addr(), "Starting Satya API");
            satya::serve(config).await?;
        }
        Commands::Analyze { path, kind, json } => {
            run_analyze(&config, &path, kind, json).await?;
        }
        Commands::Webcam {
            frames,
            fail_with,
            overlay,
        } => {
            run_webcam(&config, frames, fail_with, overlay.as_deref()).await?;
        }
        Commands::Ask { question } => {
            println!("{}", satya::assistant::reply(&question.join(" ")));
        }
    }

    Ok(())
}

/// Print notices to stderr as they arrive. Ends when every sender is gone.
fn spawn_notice_printer(mut rx: broadcast::Receiver<Notice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notice) => eprintln!("[{}] {}", notice.title, notice.description),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("({} notices dropped)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn finish_printer(printer: JoinHandle<()>) {
    let _ = tokio::time::timeout(Duration::from_millis(500), printer).await;
}

fn infer_kind(path: &Path) -> Result<MediaType> {
    let content_type = guess_content_type(path);
    match MediaType::ALL
        .into_iter()
        .find(|m| content_type.starts_with(m.mime_prefix()))
    {
        Some(kind) => Ok(kind),
        None => bail!(
            "cannot tell the media type of {} from its extension; pass --kind",
            path.display()
        ),
    }
}

async fn run_analyze(config: &AppConfig, path: &Path, kind: Option<MediaType>, json: bool) -> Result<()> {
    let kind = match kind {
        Some(kind) => kind,
        None => infer_kind(path)?,
    };
    let upload = MediaUpload::from_path(path).await?;

    let store = Arc::new(ResultStore::new());
    let provider = build_provider(&config.analysis, store)?;
    let client = AnalysisClient::new(provider)
        .with_max_upload_bytes(config.server.max_upload_bytes)
        .with_polling(config.analysis.poll_max_attempts, config.analysis.poll_interval());
    let printer = spawn_notice_printer(client.subscribe());

    let outcome = client.analyze_and_wait(kind, &upload).await;
    drop(client);
    finish_printer(printer).await;

    let result = outcome?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!("\n=== Satya Analysis Report ===");
    println!("Id:         {}", result.id);
    println!("Media:      {}", result.media_type);
    println!(
        "Verdict:    {}",
        if result.is_deepfake { "POTENTIAL DEEPFAKE" } else { "AUTHENTIC" }
    );
    println!("Confidence: {:.0}%", result.confidence * 100.0);
    println!("Time:       {:.2}s", result.processing_time);
    println!("\nDetails:");
    for (check, score) in &result.details {
        println!(" - {:<28} {:.2}", check, score);
    }
    if !result.areas.is_empty() {
        println!("\nSuspicious areas:");
        for area in &result.areas {
            println!(
                " - {:<24} at ({:.2}, {:.2}) {:.2}x{:.2}  {:.0}%",
                area.kind,
                area.x,
                area.y,
                area.width,
                area.height,
                area.confidence * 100.0
            );
        }
    }
    println!("=============================\n");
}

async fn run_webcam(
    config: &AppConfig,
    frames: u64,
    fail_with: Option<CaptureError>,
    overlay: Option<&Path>,
) -> Result<()> {
    let camera = match fail_with {
        Some(err) => SyntheticCamera::failing(err),
        None => SyntheticCamera::new(),
    };
    let constraints = CaptureConstraints {
        width: config.webcam.width,
        height: config.webcam.height,
        facing_mode: config.webcam.facing_mode,
    };
    let capture = Arc::new(MediaCapture::new(Arc::new(camera), constraints));
    let provider = build_provider(&config.analysis, Arc::new(ResultStore::new()))?;
    let webcam = WebcamAnalysisLoop::new(capture, provider, &config.webcam);
    let printer = spawn_notice_printer(webcam.subscribe());

    if let Err(e) = webcam.start_stream().await {
        drop(webcam);
        finish_printer(printer).await;
        bail!("webcam unavailable: {}", e);
    }
    webcam.start_analysis();

    // Give up if the frames never arrive (remote provider down, etc.).
    let deadline = config.webcam.interval() * (frames.clamp(1, 10_000) as u32 * 3 + 5);
    let waited = tokio::time::timeout(deadline, async {
        let mut check = tokio::time::interval(Duration::from_millis(100));
        while webcam.snapshot().frames_analyzed < frames {
            check.tick().await;
        }
    })
    .await;
    webcam.stop_analysis();

    let snap = webcam.snapshot();
    if let Some(path) = overlay {
        let (w, h) = webcam.capture().resolution().unwrap_or((config.webcam.width, config.webcam.height));
        let mut canvas = SvgCanvas::new(w, h);
        webcam.render_overlay(&mut canvas);
        tokio::fs::write(path, canvas.render()).await?;
        println!("Overlay written to {}", path.display());
    }
    webcam.stop_stream();
    drop(webcam);
    finish_printer(printer).await;

    println!("\n=== Satya Webcam Session ===");
    println!("Session:    {}", snap.session_id.as_deref().unwrap_or("-"));
    println!("Frames:     {}", snap.frames_analyzed);
    println!("Recent:     {}", snap.recent_frames.len());
    if let Some(result) = &snap.result {
        println!(
            "Last:       {} ({:.0}%), {} area(s), {:.0} ms",
            if result.is_deepfake { "POTENTIAL DEEPFAKE" } else { "AUTHENTIC" },
            result.confidence * 100.0,
            result.areas.len(),
            snap.processing_time_ms
        );
    }
    println!("============================\n");

    if waited.is_err() {
        bail!("only {} of {} frames analyzed before giving up", snap.frames_analyzed, frames);
    }
    Ok(())
}
