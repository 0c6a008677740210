use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use chorus::audio::create_backend;
use chorus::config::{default_config_path, write_default_config};
use chorus::credentials::EnvCredentials;
use chorus::event::{SpeechRequest, VoiceProfile};
use chorus::live::LiveChecker;
use chorus::{Config, Pipeline, ShutdownKind};

/// Chorus - live chat aggregation and TTS delivery gateway
#[derive(Parser)]
#[command(name = "chorus", version, about)]
struct Cli {
    /// Config file path (default: ~/.config/chorus/config.toml)
    #[arg(short, long, env = "CHORUS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Run {
        /// Hold the pipeline until this Twitch channel goes live
        #[arg(long, value_name = "TWITCH_USER")]
        wait_for_live: Option<String>,
    },
    /// Check whether a Twitch channel is live
    CheckLive {
        /// Twitch channel login name
        channel: String,
    },
    /// Speak a line through the configured audio backend
    Say {
        /// Text to speak
        #[arg(default_value = "Chorus is ready.")]
        text: String,
    },
    /// Write a commented default config file
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chorus=info",
        1 => "info,chorus=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let command = cli.command.unwrap_or(Command::Run {
        wait_for_live: None,
    });

    match command {
        Command::Init => {
            let path = match cli.config {
                Some(p) => p,
                None => default_config_path().context("no config directory available")?,
            };
            if path.exists() {
                anyhow::bail!("refusing to overwrite existing config at {}", path.display());
            }
            write_default_config(&path)?;
            println!("wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckLive { channel } => {
            let checker = LiveChecker::new(Arc::new(EnvCredentials))?;
            if checker.is_live(&channel).await? {
                println!("live");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("offline");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Say { text } => {
            let config = Config::load(cli.config.as_deref())?;
            let backend = create_backend(&config.tts, Arc::new(EnvCredentials))?;
            backend
                .speak(&SpeechRequest {
                    text,
                    voice: VoiceProfile {
                        voice: config.tts.voice.clone(),
                        rate: config.tts.rate,
                        volume: config.tts.volume,
                    },
                })
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { wait_for_live } => {
            let config = Config::load(cli.config.as_deref())?;
            let credentials = Arc::new(EnvCredentials);
            let backend = create_backend(&config.tts, credentials.clone())?;

            let pipeline = Pipeline::new(config, credentials, Arc::from(backend))?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                    shutdown_tx.send_replace(true);
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("second interrupt, exiting immediately");
                    std::process::exit(130);
                }
            });

            match pipeline.run(shutdown_rx, wait_for_live).await? {
                ShutdownKind::Clean => Ok(ExitCode::SUCCESS),
                ShutdownKind::Forced => Ok(ExitCode::from(2)),
            }
        }
    }
}
