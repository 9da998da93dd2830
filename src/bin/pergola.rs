//! CLI for pergola: run the generation service or render a photo against one.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pergola::client::{prepare_image, ResizeOptions, UploadClient, UploadRequest};
use pergola::{server, GenerationHandler, HandlerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pergola")]
#[command(about = "Render a pergola into a photo of your outdoor space")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the generation HTTP service
    Serve(ServeArgs),

    /// Send a photo to a running service and save the result
    Render(RenderArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "PERGOLA_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[derive(Args)]
struct RenderArgs {
    /// Photo of the outdoor space
    image: PathBuf,

    /// Pergola colour
    #[arg(short, long)]
    color: Option<String>,

    /// Extra instructions for the render
    #[arg(short, long)]
    notes: Option<String>,

    /// Generation endpoint
    #[arg(
        long,
        env = "PERGOLA_ENDPOINT",
        default_value = "http://127.0.0.1:8080/api/generate"
    )]
    endpoint: String,

    /// Where to save the rendered image (prints the URL only if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Longest edge sent before downscaling
    #[arg(long, default_value_t = 1920)]
    max_dimension: u32,

    /// JPEG quality used when downscaling
    #[arg(long, default_value_t = 85, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pergola=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Render(args) => render(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = HandlerConfig::from_env();
    if config.api_token.is_none() {
        tracing::warn!("REPLICATE_API_TOKEN is not set; generation requests will fail");
    }
    tracing::info!(
        model = ?config.model,
        upload_mode = ?config.upload_mode,
        timeout_secs = config.timeout.as_secs(),
        debug = config.debug,
        "starting pergola service"
    );

    let handler = Arc::new(GenerationHandler::new(config));
    server::serve(args.bind, handler)
        .await
        .with_context(|| format!("server on {} failed", args.bind))
}

async fn render(args: RenderArgs) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;

    let options = ResizeOptions {
        jpeg_quality: args.quality,
        ..ResizeOptions::square(args.max_dimension)
    };
    let prepared = prepare_image(bytes, &options)?;
    let resized = prepared.resized;

    let mut request = UploadRequest::new(prepared).with_filename(file_name(&args.image));
    if let Some(color) = args.color {
        request = request.with_color(color);
    }
    if let Some(notes) = args.notes {
        request = request.with_notes(notes);
    }

    let client = UploadClient::new(args.endpoint);
    let start = std::time::Instant::now();
    let result = client.generate(&request).await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let saved = match &args.output {
        Some(path) => Some(client.download(&result.image, path).await?),
        None => None,
    };

    if args.json {
        let output = serde_json::json!({
            "image": result.image,
            "resized": resized,
            "output": args.output.as_ref().map(|p| p.display().to_string()),
            "bytes": saved,
            "duration_ms": duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Rendered: {}", result.image);
        if let (Some(path), Some(bytes)) = (&args.output, saved) {
            println!("Saved to {} ({} bytes)", path.display(), bytes);
        }
        println!("Duration: {}ms", duration_ms);
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| pergola::DEFAULT_FILENAME.to_string())
}
