use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facesnap_core::FaceObservation;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod replay;
mod session;

use config::Config;
use replay::ReplayOptions;

#[derive(Parser)]
#[command(name = "facesnap", version, about = "Face-gated automatic photo capture")]
struct Cli {
    /// TOML configuration file; `FACESNAP_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one face observation (detector JSON) against the quality gate.
    Check {
        observation: String,
    },
    /// Replay a recorded frame stream (one JSON array of faces per line).
    Replay {
        path: PathBuf,
        /// Frame rate the stream is fed at.
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Request a manual capture at this frame index (repeatable).
        #[arg(long = "manual-at", value_name = "FRAME")]
        manual_at: Vec<usize>,
        /// Simulate a camera whose captures always fail.
        #[arg(long)]
        fail_captures: bool,
        /// Keep capturing after the first photo instead of closing.
        #[arg(long)]
        keep_going: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check { observation } => {
            let face: FaceObservation =
                serde_json::from_str(&observation).context("invalid observation JSON")?;
            if let Err(reason) = config.engine.quality.assess(&face) {
                bail!("rejected: {reason}");
            }
            println!("acceptable");
        }
        Command::Replay {
            path,
            fps,
            manual_at,
            fail_captures,
            keep_going,
        } => {
            let frames = replay::read_frames(&path)?;
            tracing::info!(
                frames = frames.len(),
                path = %path.display(),
                fps,
                "replaying frame stream"
            );

            let opts = ReplayOptions {
                fps,
                manual_at,
                fail_captures,
                keep_going,
            };
            let reports = replay::replay(frames, &config, &opts).await?;
            for report in &reports {
                println!("{}", serde_json::to_string(report)?);
            }
            tracing::info!(captures = reports.len(), "replay finished");
        }
    }

    Ok(())
}
