//! Factory preset export.

use anyhow::Context;
use clap::Args;
use dawg_synth::factory_preset;
use std::path::PathBuf;

#[derive(Args)]
pub struct ExportArgs {
    /// Factory preset name
    name: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub fn run(args: ExportArgs) -> anyhow::Result<()> {
    let Some(preset) = factory_preset(&args.name) else {
        anyhow::bail!(
            "Unknown preset '{}'. Run `dawg presets` to list them.",
            args.name
        );
    };
    let json = preset.to_json().context("failed to serialise preset")?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Saved '{}' to {}", preset.name, path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
