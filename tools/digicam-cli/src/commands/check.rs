//! Check system capabilities.

use digicam_common::config::config_file_path;
use digicam_platform_linux::{check_capabilities, missing_required, print_capability_report};

pub fn run() -> anyhow::Result<()> {
    println!("Digicam System Check");
    println!("{}", "=".repeat(50));
    println!("Config file: {}", config_file_path().display());
    println!();

    let capabilities = check_capabilities();
    print_capability_report(&capabilities);

    println!();
    let missing = missing_required(&capabilities);
    if missing.is_empty() {
        println!("All required capabilities are available. Digicam is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
