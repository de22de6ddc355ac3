use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mixlane_core::{
    ExportFormat, MixConfig, OfflineBackend, Position3d, SurroundMode,
    diagnostics::init_tracing_from_config, export_to_path, fixtures::demo_session,
    spatial::surround_gains,
};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "mixlane-cli")]
#[command(about = "Headless tools for the mixlane mixing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; discovered from MIXLANE_CONFIG_PATH or the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Renders the built-in narration-over-music mix.
    DemoExport {
        #[arg(long, default_value = "data/exports/demo.wav")]
        output: PathBuf,

        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        #[arg(long)]
        sample_rate: Option<u32>,
    },
    /// Prints channel gains over a grid of listener-relative positions as JSON.
    SpatialGrid {
        #[arg(long, value_enum, default_value = "five-one")]
        mode: ModeArg,

        #[arg(long, default_value_t = 5)]
        steps: u16,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Wav,
    Mp3,
    Ogg,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Wav => Self::Wav,
            FormatArg::Mp3 => Self::Mp3,
            FormatArg::Ogg => Self::Ogg,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Stereo,
    FiveOne,
    SevenOne,
}

impl From<ModeArg> for SurroundMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Stereo => Self::Stereo,
            ModeArg::FiveOne => Self::Surround51,
            ModeArg::SevenOne => Self::Surround71,
        }
    }
}

#[derive(Debug, Serialize)]
struct GridPoint {
    x: f32,
    y: f32,
    gains: mixlane_core::ChannelGains,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => MixConfig::from_path(path)?,
        None => MixConfig::load()?,
    };
    if let Some(log_dir) = &cli.log_dir {
        config.diagnostics.log_dir.clone_from(log_dir);
    }
    let _telemetry = init_tracing_from_config(&config.diagnostics)?;

    match cli.command {
        Commands::DemoExport {
            output,
            format,
            sample_rate,
        } => {
            let format = format.map_or(config.export.default_format, ExportFormat::from);
            let mut options = config.export_options();
            if sample_rate.is_some() {
                options.sample_rate = sample_rate;
            }

            let mut demo = demo_session(config);
            demo.session.initialize(&mut OfflineBackend)?;
            let result = demo.session.export_mix(format, &options)?;
            export_to_path(&result, &output)?;
            tracing::info!(
                path = %output.display(),
                requested = %result.requested_format,
                encoded = %result.format,
                frames = result.frames,
                sha256 = %result.sha256,
                "demo export written"
            );
        }
        Commands::SpatialGrid { mode, steps } => {
            let mode = SurroundMode::from(mode);
            let steps = steps.max(2);
            let span = f32::from(steps - 1);
            let mut grid = Vec::new();
            for row in 0..steps {
                for column in 0..steps {
                    let x = -1.0 + 2.0 * f32::from(column) / span;
                    let y = 1.0 - 2.0 * f32::from(row) / span;
                    grid.push(GridPoint {
                        x,
                        y,
                        gains: surround_gains(Position3d::new(x, y, 0.0), mode),
                    });
                }
            }
            println!("{}", serde_json::to_string_pretty(&grid)?);
        }
    }

    Ok(())
}
