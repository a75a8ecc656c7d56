use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use voxrelay_common::{logger, AppConfig};
use voxrelay_stt::{PipelineConfig, SystemProcessRunner, TranscriptionPipeline};

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "voxrelay")]
#[command(about = "voxrelay - media upload to transcript via whisper.cpp", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,
    },

    /// Transcribe a single local file and print the result
    Transcribe {
        /// Media file to transcribe
        file: PathBuf,

        /// Print the full result as JSON
        #[arg(long, conflicts_with = "markdown")]
        json: bool,

        /// Print timestamped segments as markdown
        #[arg(long)]
        markdown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv_from_project_root();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            let mut config = AppConfig::from_env()?;
            if let Some(host) = host {
                config.server_host = host;
            }
            if let Some(port) = port {
                config.server_port = port;
            }
            serve(config).await
        }
        Some(Commands::Transcribe {
            file,
            json,
            markdown,
        }) => transcribe(file, json, markdown).await,
        None => serve(AppConfig::from_env()?).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    config.validate()?;
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("voxrelay starting...");
    tracing::info!("  Bind: {}", config.server_bind_address());
    tracing::info!("  Engine: {} (model {})", config.whisper_bin, config.whisper_model.display());
    tracing::info!("  Workspaces: {}", config.workspace_root.display());

    println!("Server listening on http://{}", config.server_bind_address());

    voxrelay_server::start_server(config).await?;

    Ok(())
}

async fn transcribe(file: PathBuf, json: bool, markdown: bool) -> Result<()> {
    let config = AppConfig::from_env()?;
    logger::setup_console_logging(&config.log_level)?;

    let mut source = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pipeline = TranscriptionPipeline::new(
        PipelineConfig::from_app_config(&config),
        Arc::new(SystemProcessRunner),
    )?;

    let mut staged = pipeline.begin(&filename).await?;
    if let Err(e) = staged.write_from(&mut source).await {
        staged.discard().await;
        return Err(e).with_context(|| format!("Failed to stage {}", file.display()));
    }
    let transcript = pipeline.run_staged(staged).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else if markdown {
        print!("{}", transcript.to_markdown(&filename));
    } else {
        println!("{}", transcript.full_text);
    }

    Ok(())
}
