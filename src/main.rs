// SPDX-License-Identifier: GPL-3.0-only

use capture_station::VideoSourceKind;
use capture_station::geometry::{FrameSize, RectF};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "capture-station")]
#[command(about = "Live capture orchestration for a projected capture mat")]
#[command(version = capture_station::constants::app_info::version())]
struct Cli {
    /// Configuration file (default: ~/.config/capture-station/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one capture against virtual sources and save the result
    Simulate {
        /// Sources to composite, primary first
        #[arg(short, long, value_delimiter = ',', default_value = "downward")]
        sources: Vec<VideoSourceKind>,

        /// Frame size of every virtual source
        #[arg(long, default_value = "1280x720")]
        frame: FrameSize,

        /// Size of the render target
        #[arg(long, default_value = "1280x800")]
        widget: FrameSize,

        /// Light the capture with the projector strobe
        #[arg(long)]
        flash: bool,

        /// Attach a virtual depth sensor
        #[arg(long)]
        depth: bool,

        /// Normalized viewport as x,y,w,h
        #[arg(long, default_value = "0,0,1,1", value_parser = cli::parse_viewport)]
        viewport: RectF,

        /// Output file or directory (default: ~/Pictures/CaptureStation)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print where each source is drawn for a widget size
    Placement {
        #[arg(short, long, value_delimiter = ',', default_value = "downward,forward")]
        sources: Vec<VideoSourceKind>,

        #[arg(long, default_value = "1920x1080")]
        frame: FrameSize,

        #[arg(long, default_value = "800x600")]
        widget: FrameSize,

        #[arg(long, default_value = "0,0,1,1", value_parser = cli::parse_viewport)]
        viewport: RectF,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=capture_station=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            sources,
            frame,
            widget,
            flash,
            depth,
            viewport,
            output,
        } => cli::simulate(cli::SimulateOptions {
            config: cli.config,
            sources,
            frame,
            widget,
            flash,
            depth,
            viewport,
            output,
        }),
        Commands::Placement {
            sources,
            frame,
            widget,
            viewport,
        } => cli::print_placement(cli.config, sources, frame, widget, viewport),
        Commands::Config => cli::print_config(cli.config),
    }
}
