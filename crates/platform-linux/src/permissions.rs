//! Capability detection and guidance for Linux.
//!
//! Digicam needs a GStreamer runtime with a camera source to run at all;
//! everything else (window, microphone, particular encoders) degrades.

use gstreamer as gst;
use serde::Serialize;

/// A system capability that Digicam may need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    let gst_ready = match gst::init() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "GStreamer init failed");
            false
        }
    };
    let has = |factory: &str| gst_ready && gst::ElementFactory::find(factory).is_some();

    vec![
        check_gstreamer(gst_ready),
        check_camera_source(has("v4l2src") || has("autovideosrc")),
        check_webcam_device(),
        check_graphical_session(),
        check_microphone(has("pulsesrc") || has("pipewiresrc") || has("autoaudiosrc")),
        check_encoder("VP9 Encoder", "vp9enc", has("vp9enc")),
        check_encoder("VP8 Encoder", "vp8enc", has("vp8enc")),
        check_webm_muxer(has("webmmux")),
    ]
}

/// Required capabilities that are missing. Empty means supported.
pub fn missing_required(capabilities: &[Capability]) -> Vec<&Capability> {
    capabilities
        .iter()
        .filter(|cap| cap.required && !cap.available)
        .collect()
}

fn capability(
    name: &str,
    description: &str,
    available: bool,
    required: bool,
    fix: &str,
) -> Capability {
    Capability {
        name: name.to_string(),
        description: description.to_string(),
        available,
        required,
        fix_instructions: (!available).then(|| fix.to_string()),
    }
}

fn check_gstreamer(available: bool) -> Capability {
    capability(
        "GStreamer",
        "Multimedia runtime used for camera, window and encoding",
        available,
        true,
        "Install GStreamer: sudo apt install gstreamer1.0-tools gstreamer1.0-plugins-base",
    )
}

fn check_camera_source(available: bool) -> Capability {
    capability(
        "Camera Source",
        "GStreamer v4l2src/autovideosrc element",
        available,
        true,
        "Install the good plugins: sudo apt install gstreamer1.0-plugins-good",
    )
}

fn check_webcam_device() -> Capability {
    let has_webcam = (0..16)
        .map(|idx| format!("/dev/video{idx}"))
        .any(|path| std::path::Path::new(&path).exists());

    capability(
        "Webcam Device",
        "Video4Linux camera node",
        has_webcam,
        false,
        "Connect a webcam and verify /dev/video* exists (v4l2-ctl --list-devices)",
    )
}

fn check_graphical_session() -> Capability {
    let available = std::env::var("WAYLAND_DISPLAY").is_ok() || std::env::var("DISPLAY").is_ok();

    capability(
        "Graphical Session",
        "Display for the live preview window",
        available,
        false,
        "Run inside a desktop session, or pass --no-window",
    )
}

fn check_microphone(available: bool) -> Capability {
    capability(
        "Microphone Source",
        "PulseAudio/PipeWire audio source for recordings",
        available,
        false,
        "Install audio plugins: sudo apt install gstreamer1.0-pulseaudio",
    )
}

fn check_encoder(name: &str, element: &str, available: bool) -> Capability {
    capability(
        name,
        &format!("GStreamer {element} element for WebM recordings"),
        available,
        false,
        "Install the good plugins: sudo apt install gstreamer1.0-plugins-good",
    )
}

fn check_webm_muxer(available: bool) -> Capability {
    capability(
        "WebM Muxer",
        "GStreamer webmmux element",
        available,
        false,
        "Install the good plugins: sudo apt install gstreamer1.0-plugins-good",
    )
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Digicam System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_instructions_only_when_missing() {
        let ok = capability("A", "a", true, true, "do x");
        let missing = capability("B", "b", false, false, "do y");
        assert_eq!(ok.fix_instructions, None);
        assert_eq!(missing.fix_instructions.as_deref(), Some("do y"));
    }

    #[test]
    fn missing_required_ignores_optional() {
        let caps = vec![
            capability("Runtime", "", false, true, "install"),
            capability("Window", "", false, false, "desktop"),
            capability("Camera", "", true, true, ""),
        ];
        let missing = missing_required(&caps);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "Runtime");
    }

    #[test]
    fn report_covers_every_check() {
        let caps = check_capabilities();
        assert_eq!(caps.len(), 8);
        assert!(caps.iter().filter(|c| c.required).count() >= 2);
    }
}
