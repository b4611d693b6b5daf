//! splat presets command - list saved parameter presets.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use splat_clean::PresetStore;

use crate::{Cli, OutputFormat, output};

/// Preset store used when `--presets-file` is not given.
pub const DEFAULT_PRESETS_FILE: &str = "splat_presets.json";

pub fn run(presets_file: &Path, cli: &Cli) -> Result<()> {
    let store = PresetStore::load(presets_file)?;

    match cli.format {
        OutputFormat::Json => {
            let listing: BTreeMap<&str, BTreeMap<String, serde_json::Value>> = store
                .iter()
                .map(|(name, preset)| (name, preset.entries().into_iter().collect()))
                .collect();
            output::print(&listing, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            if store.is_empty() {
                output::warning(
                    &format!("No presets in {}", presets_file.display()),
                    cli.format,
                    cli.quiet,
                );
                return Ok(());
            }
            println!(
                "{} ({})",
                "Presets".bold().underline(),
                presets_file.display()
            );
            for (name, preset) in store.iter() {
                println!("  {}", name.cyan().bold());
                for (key, value) in preset.entries() {
                    println!("    {key} = {value}");
                }
            }
        }
    }

    Ok(())
}
