//! Digicam CLI — live webcam effects, snapshots and recording.
//!
//! Usage:
//!   digicam live [OPTIONS]      Run the live preview with effects
//!   digicam apply <INPUT>       Apply an effect to an image file
//!   digicam devices             List cameras
//!   digicam check               Check system capabilities
//!   digicam config [--init]     Show or create the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use digicam_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "digicam",
    about = "Webcam effects, overlays and recording",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live camera preview
    Live {
        /// Camera device (e.g. /dev/video0); defaults to the best webcam
        #[arg(short, long)]
        device: Option<String>,

        /// Initial effect: none, grayscale, sepia, vintage, invert, rgbSplit, scanlines
        #[arg(short, long)]
        effect: Option<String>,

        /// Initial intensity in [0, 1]
        #[arg(short, long)]
        intensity: Option<String>,

        /// Recording sample rate
        #[arg(long)]
        fps: Option<u32>,

        /// Do not open a preview window
        #[arg(long)]
        no_window: bool,

        /// Do not capture the microphone
        #[arg(long)]
        no_audio: bool,

        /// Grain texture image used by the scanlines effect
        #[arg(long)]
        grain: Option<PathBuf>,

        /// Directory for snapshots and recordings
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply an effect and overlays to an image, writing a PNG
    Apply {
        /// Input image (PNG or JPEG)
        input: PathBuf,

        #[arg(short, long, default_value = "none")]
        effect: String,

        #[arg(short, long, default_value = "1")]
        intensity: String,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for the synthesised grain
        #[arg(long)]
        seed: Option<u64>,

        /// Badge text instead of the current time
        #[arg(long)]
        timestamp: Option<String>,

        /// Grain texture image
        #[arg(long)]
        grain: Option<PathBuf>,
    },

    /// List available cameras
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.log_json;
    digicam_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Live {
            device,
            effect,
            intensity,
            fps,
            no_window,
            no_audio,
            grain,
            output,
        } => {
            commands::live::run(
                config,
                commands::live::LiveOptions {
                    device,
                    effect,
                    intensity,
                    fps,
                    window: !no_window,
                    audio: !no_audio,
                    grain,
                    output,
                },
            )
            .await
        }
        Commands::Apply {
            input,
            effect,
            intensity,
            output,
            seed,
            timestamp,
            grain,
        } => commands::apply::run(
            input,
            effect,
            intensity,
            output.unwrap_or_else(|| config.output_dir.clone()),
            seed,
            timestamp,
            grain.or(config.effect.grain_texture.clone()),
        ),
        Commands::Devices { json } => commands::devices::run(json).await,
        Commands::Check => commands::check::run(),
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
