//! CLI for MeshGen - image-to-3D model generation.

use clap::{Args, Parser, Subcommand};
use meshgen::config::{ClientConfig, API_KEY_ENV};
use meshgen::{JobHandle, ModelGenerationRequest, ModelProviderExt, TripoProvider};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshgen")]
#[command(about = "Generate 3D models from images via remote AI APIs (Tripo3D)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (api_key, base_url, timeout, poll_interval)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a 3D model from an image
    Generate(GenerateArgs),

    /// Show the status of an existing task
    Status(StatusArgs),

    /// List available providers
    Providers,
}

#[derive(Args)]
struct GenerateArgs {
    /// Source image (jpg, jpeg, png, webp)
    image: PathBuf,

    /// Output file path
    #[arg(short, long, default_value = "output_model.glb")]
    output: PathBuf,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Seconds between status queries
    #[arg(long)]
    poll_interval: Option<u64>,
}

#[derive(Args)]
struct StatusArgs {
    /// Task id returned when the job was created
    task_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meshgen=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            let config = load_config(cli.config.as_ref())?;
            generate_model(config, args, cli.json).await?;
        }
        Commands::Status(args) => {
            let config = load_config(cli.config.as_ref())?;
            show_status(config, args, cli.json).await?;
        }
        Commands::Providers => {
            list_providers(cli.json)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::from_env()?,
    };
    Ok(config)
}

async fn generate_model(
    mut config: ClientConfig,
    args: GenerateArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval = Duration::from_secs(secs);
    }

    let provider = TripoProvider::builder().config(config).build()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let request = ModelGenerationRequest::new(&args.image).with_cancellation(cancel);
    tracing::info!(image = %args.image.display(), "generating model");

    let model = provider.generate_to_file(&request, &args.output).await?;

    if json_output {
        let result = serde_json::json!({
            "type": "model",
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": model.size(),
            "format": model.format.extension(),
            "provider": model.provider.to_string(),
            "task_id": model.metadata.task_id,
            "output_kind": model.metadata.output_kind,
            "poll_count": model.metadata.poll_count,
            "duration_ms": model.metadata.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated model: {} ({} bytes) via {}",
            args.output.display(),
            model.size(),
            model.provider
        );
        if let Some(duration) = model.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}

async fn show_status(
    config: ClientConfig,
    args: StatusArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let provider = TripoProvider::builder().config(config).build()?;
    let snapshot = provider.status(&JobHandle::new(args.task_id)).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("Task {}: {}", snapshot.handle, snapshot.raw_status);
        if let Some(progress) = snapshot.progress {
            println!("Progress: {}%", progress);
        }
        if let Some((kind, url)) = snapshot.output.as_ref().and_then(|o| o.select()) {
            println!("Artifact ({}): {}", kind, url);
        }
    }

    Ok(())
}

fn list_providers(json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ProviderInfo {
        name: &'static str,
        kind: &'static str,
        media_type: &'static str,
        env_var: &'static str,
        enabled: bool,
    }

    let providers = vec![ProviderInfo {
        name: "Tripo3D",
        kind: "tripo",
        media_type: "model",
        env_var: API_KEY_ENV,
        enabled: cfg!(feature = "tripo"),
    }];

    if json_output {
        println!("{}", serde_json::to_string_pretty(&providers)?);
    } else {
        println!("Available providers:\n");
        println!("MODEL:");
        for p in &providers {
            let status = if p.enabled { "✓" } else { "✗" };
            println!("  {} {} ({})", status, p.name, p.kind);
            println!("    API key: {}", p.env_var);
        }
    }

    Ok(())
}
