//! Show or initialise the config file.

use digicam_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, init: bool) -> anyhow::Result<()> {
    let path = config_file_path();

    if init {
        if path.exists() {
            println!("Config already exists: {}", path.display());
        } else {
            AppConfig::default().save()?;
            println!("Wrote default config to {}", path.display());
        }
        return Ok(());
    }

    if path.exists() {
        println!("Config file: {}", path.display());
    } else {
        println!("Config file: {} (not found, using defaults)", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
