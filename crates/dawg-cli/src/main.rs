//! Dawg CLI - render and inspect presets of the dawg synthesizer.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dawg")]
#[command(author, version, about = "Dawg synthesizer CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List and inspect factory presets
    Presets(commands::presets::PresetsArgs),

    /// Write a factory preset as JSON
    Export(commands::export::ExportArgs),

    /// Render notes through a preset to a WAV file
    Render(commands::render::RenderArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Presets(args) => commands::presets::run(args),
        Commands::Export(args) => commands::export::run(args),
        Commands::Render(args) => commands::render::run(args),
    }
}
