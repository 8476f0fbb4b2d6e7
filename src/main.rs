use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use submagic::{AppConfig, DownloadProgress, Submagic, TranscriptionRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "submagic", version, about = "Manage whisper models and generate subtitles")]
struct Cli {
    /// Directory holding downloaded models [env: SUBMAGIC_MODELS_DIR]
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Settings document [env: SUBMAGIC_SETTINGS]
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// whisper.cpp command line binary [env: SUBMAGIC_WHISPER_CLI]
    #[arg(long, global = true)]
    whisper_cli: Option<PathBuf>,

    /// ffmpeg binary used for range transcription [env: SUBMAGIC_FFMPEG]
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known models, smallest first
    Models {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Download a model unless it is already present
    Download { name: String },
    /// Delete a downloaded model
    Delete { name: String },
    /// Show the active model, or set it when a name is given
    Active { name: Option<String> },
    /// Generate SubRip subtitles for a media file
    Transcribe {
        file: PathBuf,
        /// Language code passed to whisper (defaults to "ru")
        #[arg(long, default_value = "")]
        lang: String,
        /// Model to use (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
        /// Only transcribe from this second
        #[arg(long, requires = "end")]
        start: Option<f64>,
        /// Only transcribe up to this second
        #[arg(long, requires = "start")]
        end: Option<f64>,
        /// Write subtitles here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(dir) = &self.models_dir {
            config.models_dir = dir.clone();
        }
        if let Some(path) = &self.settings {
            config.settings_path = path.clone();
        }
        if let Some(path) = &self.whisper_cli {
            config.whisper_cli = path.clone();
        }
        if let Some(path) = &self.ffmpeg {
            config.ffmpeg = path.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let sink = Arc::new(|_: &str, progress: &DownloadProgress| -> anyhow::Result<()> {
        if progress.total > 0 {
            info!(model = %progress.name, "{}% ({} / {} bytes)", progress.percent, progress.written, progress.total);
        } else {
            info!(model = %progress.name, "{} bytes", progress.written);
        }
        Ok(())
    });
    let service = Submagic::new(cli.config(), sink).context("failed to start backend")?;

    match cli.command {
        Command::Models { json } => {
            let models = service.list_models();
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                let active = service.get_active_model().await;
                for model in models {
                    let marker = if model.id == active { "*" } else { " " };
                    let state = if model.is_present { "[installed]" } else { "" };
                    println!(
                        "{marker} {:<18} {:>6} MB  {state}",
                        model.id,
                        model.expected_size / (1024 * 1024)
                    );
                }
            }
        }
        Command::Download { name } => {
            let path = interruptible(service.download_model(&name), || {
                service.cancel_download(&name);
            })
            .await
            .with_context(|| format!("failed to download {name}"))?;
            println!("{}", path.display());
        }
        Command::Delete { name } => {
            if service.delete_model(&name).await? {
                println!("deleted {name}");
            } else {
                println!("{name} was not downloaded");
            }
        }
        Command::Active { name: Some(name) } => {
            service.set_active_model(&name).await?;
            println!("{name}");
        }
        Command::Active { name: None } => {
            println!("{}", service.get_active_model().await);
        }
        Command::Transcribe {
            file,
            lang,
            model,
            start,
            end,
            output,
        } => {
            let model = match model {
                Some(model) => model,
                None => service.get_active_model().await,
            };
            let request = TranscriptionRequest::new(file.clone(), lang, model);
            let on_interrupt = || {
                service.cancel_transcription(&file);
            };

            let srt = match (start, end) {
                (Some(start), Some(end)) => {
                    interruptible(
                        service.generate_subtitles_range(&request, start, end),
                        on_interrupt,
                    )
                    .await
                }
                _ => interruptible(service.generate_subtitles(&request), on_interrupt).await,
            }
            .with_context(|| format!("failed to transcribe {}", file.display()))?;

            match output {
                Some(path) => service.save_subtitles(&path, &srt).await?,
                None => print!("{srt}"),
            }
        }
    }

    Ok(())
}

/// Drive `operation` to completion, calling `on_interrupt` on Ctrl-C so it can wind down
/// and clean up instead of being dropped mid-way.
async fn interruptible<T>(
    operation: impl Future<Output = T>,
    on_interrupt: impl FnOnce(),
) -> T {
    tokio::pin!(operation);
    tokio::select! {
        result = &mut operation => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, cancelling");
            on_interrupt();
            operation.await
        }
    }
}
