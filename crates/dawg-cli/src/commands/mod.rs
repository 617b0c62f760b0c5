//! CLI subcommands.

pub mod export;
pub mod presets;
pub mod render;
