//! Slidereel CLI: turn a folder of photos into a slideshow video.
//!
//! Usage:
//!   slidereel export <PHOTOS>...   Render and save a slideshow
//!   slidereel plan <COUNT>         Show the frame timeline for a photo count
//!   slidereel check                Report which codecs ffmpeg can produce
//!   slidereel config               Print (or write) the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slidereel_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "slidereel",
    about = "Render photo slideshows with transitions to video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render photos into a slideshow video and save it
    Export {
        /// Photo paths or file:// URLs, in display order
        #[arg(required = true)]
        photos: Vec<String>,

        /// Seconds each photo stays on screen (1 to 5, in steps of 0.5)
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Transition between photos: fade, slide, zoom, none
        #[arg(short, long)]
        transition: Option<String>,

        /// Topic used in the saved file name
        #[arg(long)]
        topic: Option<String>,

        /// Directory to save into
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// ffmpeg binary to use
        #[arg(long)]
        ffmpeg: Option<String>,
    },

    /// Print the frame timeline for a number of photos
    Plan {
        /// Number of photos
        count: usize,

        /// Seconds each photo stays on screen
        #[arg(short, long)]
        seconds: Option<f64>,

        /// Transition between photos
        #[arg(short, long)]
        transition: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check which codec candidates are available
    Check {
        /// ffmpeg binary to probe
        #[arg(long)]
        ffmpeg: Option<String>,
    },

    /// Show the active configuration
    Config {
        /// Write the configuration file if it does not exist yet
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
    slidereel_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            photos,
            seconds,
            transition,
            topic,
            output,
            ffmpeg,
        } => {
            commands::export::run(
                config,
                commands::export::ExportArgs {
                    photos,
                    seconds,
                    transition,
                    topic,
                    output,
                    ffmpeg,
                },
            )
            .await
        }
        Commands::Plan {
            count,
            seconds,
            transition,
            json,
        } => commands::plan::run(&config, count, seconds, transition, json),
        Commands::Check { ffmpeg } => commands::check::run(&config, ffmpeg),
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
