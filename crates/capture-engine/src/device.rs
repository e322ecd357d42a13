//! V4L2 camera discovery.
//!
//! Candidates are `/dev/video0` to `/dev/video15`. Each is scored from its
//! sysfs name and, when `v4l2-ctl` is installed, its reported capabilities.
//! Metadata nodes and capture cards score zero and are left out.

use std::path::Path;

use crate::backend::{DeviceInfo, FacingMode};

const MAX_VIDEO_NODES: u32 = 16;

const WEBCAM_KEYWORDS: [&str; 12] = [
    "webcam",
    "camera",
    "cam",
    "facetime",
    "logitech",
    "microsoft",
    "creative",
    "razer",
    "elgato",
    "obs",
    "virtual",
    "v4l2loopback",
];

const NON_WEBCAM_KEYWORDS: [&str; 10] = [
    "tuner",
    "tv",
    "dvb",
    "hdmi",
    "capture",
    "encoder",
    "decoder",
    "hauppauge",
    "blackmagic",
    "magewell",
];

const USER_FACING_KEYWORDS: [&str; 4] = ["front", "integrated", "facetime", "user"];
const ENVIRONMENT_FACING_KEYWORDS: [&str; 3] = ["rear", "back", "world"];

/// List capture devices, best webcam candidate first.
pub fn enumerate_v4l2_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for idx in 0..MAX_VIDEO_NODES {
        let dev_path = format!("/dev/video{idx}");
        if !Path::new(&dev_path).exists() {
            continue;
        }

        let name = std::fs::read_to_string(format!("/sys/class/video4linux/video{idx}/name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let capture = probe_v4l2_capture_capability(&dev_path);
        let priority = webcam_priority(&name, capture);
        if priority == 0 {
            tracing::debug!(device = %dev_path, name = %name, "Skipping non-webcam V4L2 device");
            continue;
        }

        let label = if name.is_empty() {
            format!("Camera {}", devices.len() + 1)
        } else {
            name.clone()
        };

        devices.push(DeviceInfo {
            id: dev_path,
            label,
            facing: facing_from_name(&name),
            priority,
        });
    }

    devices.sort_by(|a, b| b.priority.cmp(&a.priority));
    devices
}

/// Pick the device that best matches a facing preference.
///
/// Devices whose name reveals the requested facing win; otherwise the
/// highest-priority device is used.
pub fn select_device(devices: &[DeviceInfo], facing: FacingMode) -> Option<&DeviceInfo> {
    devices
        .iter()
        .find(|d| d.facing == Some(facing))
        .or_else(|| devices.first())
}

/// Score a device as a webcam candidate (higher is better, 0 excludes it).
pub fn webcam_priority(name: &str, supports_capture: Option<bool>) -> u32 {
    let name = name.to_lowercase();

    if NON_WEBCAM_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        return 0;
    }

    let named_webcam = WEBCAM_KEYWORDS.iter().any(|kw| name.contains(kw));
    match (named_webcam, supports_capture) {
        (true, Some(true)) => 100,
        (true, _) => 80,
        (false, Some(true)) => 50,
        (false, Some(false)) => 0,
        (false, None) => 10,
    }
}

pub fn facing_from_name(name: &str) -> Option<FacingMode> {
    let name = name.to_lowercase();
    if ENVIRONMENT_FACING_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        Some(FacingMode::Environment)
    } else if USER_FACING_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        Some(FacingMode::User)
    } else {
        None
    }
}

/// `Some(true)` if `v4l2-ctl` reports Video Capture, `None` if the tool
/// is not installed.
fn probe_v4l2_capture_capability(dev_path: &str) -> Option<bool> {
    let output = std::process::Command::new("v4l2-ctl")
        .args(["--device", dev_path, "--info"])
        .output()
        .ok()?;

    if !output.status.success() {
        return Some(false);
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
    Some(stdout.contains("video capture"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, facing: Option<FacingMode>, priority: u32) -> DeviceInfo {
        DeviceInfo {
            id: id.into(),
            label: id.into(),
            facing,
            priority,
        }
    }

    #[test]
    fn capture_cards_are_excluded() {
        assert_eq!(webcam_priority("Elgato HDMI Capture", Some(true)), 0);
        assert_eq!(webcam_priority("DVB tuner", None), 0);
    }

    #[test]
    fn named_webcams_outrank_generic_nodes() {
        assert_eq!(webcam_priority("Integrated Camera", Some(true)), 100);
        assert_eq!(webcam_priority("HD Webcam C920", None), 80);
        assert_eq!(webcam_priority("uvcvideo", Some(true)), 50);
        assert_eq!(webcam_priority("uvcvideo", None), 10);
        assert_eq!(webcam_priority("uvcvideo", Some(false)), 0);
    }

    #[test]
    fn facing_is_read_from_device_names() {
        assert_eq!(
            facing_from_name("Integrated Camera"),
            Some(FacingMode::User)
        );
        assert_eq!(
            facing_from_name("Rear Camera"),
            Some(FacingMode::Environment)
        );
        assert_eq!(facing_from_name("HD Webcam C920"), None);
    }

    #[test]
    fn select_device_prefers_matching_facing() {
        let devices = vec![
            device("/dev/video0", None, 100),
            device("/dev/video2", Some(FacingMode::Environment), 80),
        ];
        assert_eq!(
            select_device(&devices, FacingMode::Environment).map(|d| d.id.as_str()),
            Some("/dev/video2")
        );
        assert_eq!(
            select_device(&devices, FacingMode::User).map(|d| d.id.as_str()),
            Some("/dev/video0")
        );
        assert!(select_device(&[], FacingMode::User).is_none());
    }
}
