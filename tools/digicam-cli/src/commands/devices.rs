//! List cameras.

use digicam_capture_engine::backend::get_backend;

pub async fn run(json: bool) -> anyhow::Result<()> {
    let backend = get_backend();
    if !backend.is_supported() {
        anyhow::bail!("Camera capture is not available; run `digicam check` for details");
    }

    let devices = backend.enumerate_devices().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Cameras ({}):", devices.len());
    for (idx, device) in devices.iter().enumerate() {
        let facing = device
            .facing
            .map(|f| format!(" [{f:?}]").to_lowercase())
            .unwrap_or_default();
        let marker = if idx == 0 { " (default)" } else { "" };
        println!("  {}  {}{facing}{marker}", device.id, device.label);
    }
    Ok(())
}
