use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{build_gallery, OnnxEncoder};
use std::path::PathBuf;
use std::time::Duration;

mod client;

use client::FaceMatchClient;

#[derive(Parser)]
#[command(name = "facematch", about = "facematch face identification CLI")]
struct Cli {
    /// Base URL of the facematchd service
    #[arg(long, env = "FACEMATCH_URL", default_value = "http://127.0.0.1:5000")]
    url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the face in a photo
    Recognize {
        /// JPEG or PNG photo
        image: PathBuf,
    },
    /// Show service status
    Status,
    /// Rebuild the reference gallery on the service
    Reload,
    /// Build a gallery locally and list what was loaded (bypasses the service)
    Scan {
        /// Directory of reference photos
        dir: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long, env = "FACEMATCH_MODEL_DIR")]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Recognize { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.jpg".to_string());

            let client = FaceMatchClient::new(&cli.url, Duration::from_secs(cli.timeout))?;
            let identity = client.recognize(bytes, &file_name).await?;
            println!("{identity}");
        }
        Commands::Status => {
            let client = FaceMatchClient::new(&cli.url, Duration::from_secs(cli.timeout))?;
            println!("{}", serde_json::to_string_pretty(&client.status().await?)?);
        }
        Commands::Reload => {
            let client = FaceMatchClient::new(&cli.url, Duration::from_secs(cli.timeout))?;
            println!("{}", serde_json::to_string_pretty(&client.reload().await?)?);
        }
        Commands::Scan { dir, model_dir } => {
            let model_dir = model_dir.unwrap_or_else(facematch_core::default_model_dir);
            tracing::info!(dir = %dir.display(), models = %model_dir.display(), "scanning gallery");
            let gallery = tokio::task::spawn_blocking(move || -> Result<_> {
                let mut encoder = OnnxEncoder::from_model_dir(&model_dir)
                    .with_context(|| format!("loading models from {}", model_dir.display()))?;
                Ok(build_gallery(&dir, &mut encoder))
            })
            .await??;

            for entry in gallery.entries() {
                println!("{}\t{} dims", entry.identity, entry.embedding.dimension());
            }
            println!("{} reference faces", gallery.len());
        }
    }

    Ok(())
}
