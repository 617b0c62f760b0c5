//! Factory preset listing.

use clap::{Args, Subcommand};
use dawg_synth::{factory_preset, factory_presets};

#[derive(Args)]
pub struct PresetsArgs {
    #[command(subcommand)]
    command: Option<PresetsCommand>,
}

#[derive(Subcommand)]
enum PresetsCommand {
    /// List factory presets (default)
    List,

    /// Show the settings of one preset
    Show {
        /// Preset name
        name: String,
    },
}

pub fn run(args: PresetsArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(PresetsCommand::List) {
        PresetsCommand::List => {
            println!("Factory Presets:\n");
            for preset in factory_presets() {
                let description = preset.description.as_deref().unwrap_or("");
                println!("  {:20} - {}", preset.name, description);
            }
        }
        PresetsCommand::Show { name } => {
            let Some(preset) = factory_preset(&name) else {
                anyhow::bail!("Unknown preset '{name}'. Run `dawg presets` to list them.");
            };
            println!("Preset: {}", preset.name);
            if let Some(description) = &preset.description {
                println!("  {description}");
            }
            println!();
            println!("  Voice mode:    {:?}", preset.voice_mode);
            println!("  Portamento:    {:.3}s", preset.portamento);
            println!("  Legato:        {}", preset.legato);
            println!("  Master volume: {:.2}", preset.master_volume);
            println!("  Oscillators:");
            for (i, osc) in preset.oscillators.iter().enumerate() {
                println!(
                    "    {}: {:?} level {:.2} octave {:+}",
                    i + 1,
                    osc.waveform,
                    osc.level,
                    osc.octave
                );
            }
            println!(
                "  Filter:        {:?} cutoff {:.0} Hz, resonance {:.2}",
                preset.filter.kind, preset.filter.cutoff, preset.filter.resonance
            );
            let routed = preset
                .modulation
                .iter()
                .filter(|slot| slot.source.is_some() && slot.destination.is_some());
            println!("  Modulation:");
            for slot in routed {
                println!(
                    "    {} -> {} ({:+.2}, {:?})",
                    slot.source.as_deref().unwrap_or("-"),
                    slot.destination.as_deref().unwrap_or("-"),
                    slot.amount,
                    slot.curve
                );
            }
        }
    }

    Ok(())
}
