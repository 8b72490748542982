use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use yt_frame_capture::capture::resolvers::{ClientProfile, ResolverKind};
use yt_frame_capture::capture::tools::ToolManager;
use yt_frame_capture::{server, CaptureConfig, CaptureRequest, FrameCapturer};

#[derive(Parser)]
#[command(name = "yt-frame-capture")]
#[command(about = "Capture a single PNG frame from a YouTube video")]
#[command(version)]
struct Cli {
    /// Metadata resolver (innertube, yt-dlp)
    #[arg(long, global = true)]
    resolver: Option<ResolverKind>,

    /// Innertube client profile (android, ios, web)
    #[arg(long, global = true)]
    client: Option<ClientProfile>,

    /// Proxy for metadata and stream requests
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long, global = true)]
    ffmpeg: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP capture service
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Capture one frame and write it to disk
    Capture {
        video_id: String,
        /// Seconds from the start, may be fractional
        timestamp: String,
        /// Output file (default: frame_<id>_<t>s.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show decoder and yt-dlp availability
    Tools {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CaptureConfig::load().map_err(anyhow::Error::msg)?;
    if let Some(resolver) = cli.resolver {
        config = config.with_resolver(resolver);
    }
    if let Some(client) = cli.client {
        config = config.with_client(client);
    }
    if cli.proxy.is_some() {
        config = config.with_proxy(cli.proxy);
    }
    if let Some(ffmpeg) = cli.ffmpeg {
        config = config.with_ffmpeg_path(ffmpeg);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config = config.with_bind(bind);
            }
            let addr: SocketAddr = config
                .bind
                .parse()
                .with_context(|| format!("invalid bind address {}", config.bind))?;
            let capturer = FrameCapturer::from_config(&config).map_err(anyhow::Error::msg)?;
            server::serve(addr, Arc::new(capturer)).await?;
        }
        Commands::Capture {
            video_id,
            timestamp,
            output,
        } => {
            let request = CaptureRequest::parse(Some(&video_id), Some(&timestamp))?;
            let capturer = FrameCapturer::from_config(&config).map_err(anyhow::Error::msg)?;
            let frame = capturer.capture(&request).await?;

            let path = output.unwrap_or_else(|| PathBuf::from(request.suggested_filename()));
            tokio::fs::write(&path, &frame.png)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} ({} bytes, format {})",
                path.display(),
                frame.png.len(),
                frame.format_id
            );
        }
        Commands::Tools { json } => {
            let tools = ToolManager::new().get_all_tools();
            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
                return Ok(());
            }
            for tool in tools {
                match (&tool.path, &tool.version) {
                    (Some(path), version) => println!(
                        "{:<8} {} ({})",
                        tool.name,
                        path,
                        version.as_deref().unwrap_or("unknown version")
                    ),
                    (None, _) => println!("{:<8} not found", tool.name),
                }
            }
        }
    }

    Ok(())
}
