//! Init and Config commands.

use anyhow::{Context, anyhow};

use crate::config::Settings;

/// Run init command - create configuration file in the current directory.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let root = std::env::current_dir().context("cannot determine current directory")?;
    let path = Settings::init_config_file(&root, force).map_err(|e| anyhow!("{e}"))?;

    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    let toml_str = toml::to_string_pretty(config).context("cannot display configuration")?;
    println!("{toml_str}");
    Ok(())
}
