//! Still and clip export, plus image decoding for the grain asset and
//! offline processing.

use std::path::{Path, PathBuf};

use digicam_common::clock::unix_millis;
use digicam_common::error::{DigicamError, DigicamResult};
use digicam_processing_core::{Frame, GrainTexture};
use image::{ImageFormat, RgbaImage};

/// `digicam_<unix-ms>.<ext>`
pub fn output_file_name(ext: &str, unix_ms: i64) -> String {
    format!("digicam_{unix_ms}.{ext}")
}

/// Write `bytes` to `dir/name`, creating `dir` if needed.
pub fn write_output(dir: &Path, name: &str, bytes: &[u8]) -> DigicamResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Encode the frame as PNG into `dir`. Returns the written path.
pub fn export_still(frame: &Frame, dir: &Path) -> DigicamResult<PathBuf> {
    if frame.is_empty() {
        return Err(DigicamError::export("Nothing to capture: frame is empty"));
    }
    std::fs::create_dir_all(dir)?;
    let path = dir.join(output_file_name("png", unix_millis()));

    frame_to_image(frame)?
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| DigicamError::export(format!("Failed to write {}: {e}", path.display())))?;

    tracing::info!(
        path = %path.display(),
        width = frame.width(),
        height = frame.height(),
        "Still exported"
    );
    Ok(path)
}

/// Decode an image file into an RGBA frame.
pub fn load_frame(path: &Path) -> DigicamResult<Frame> {
    if !path.exists() {
        return Err(DigicamError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let image = image::open(path)
        .map_err(|e| DigicamError::processing(format!("Cannot decode {}: {e}", path.display())))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Frame::from_rgba(width, height, image.into_raw())
}

pub fn frame_to_image(frame: &Frame) -> DigicamResult<RgbaImage> {
    RgbaImage::from_raw(frame.width(), frame.height(), frame.as_bytes().to_vec())
        .ok_or_else(|| DigicamError::export("Frame buffer does not match its dimensions"))
}

/// Load the grain texture. Missing or undecodable assets disable the
/// texture rather than failing.
pub fn load_grain_texture(path: &Path) -> Option<GrainTexture> {
    match load_frame(path) {
        Ok(frame) => {
            let texture = GrainTexture::new(frame);
            if texture.is_none() {
                tracing::debug!(path = %path.display(), "Grain texture is empty; using noise");
            }
            texture
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Grain texture unavailable; using noise");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "digicam-export-{tag}-{}-{}",
            std::process::id(),
            unix_millis()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn file_names_carry_millisecond_stamp() {
        assert_eq!(output_file_name("png", 1_714_000_000_000), "digicam_1714000000000.png");
        assert_eq!(output_file_name("webm", 5), "digicam_5.webm");
    }

    #[test]
    fn still_round_trips_through_png() {
        let dir = scratch_dir("still");
        let mut frame = Frame::filled(3, 2, [10, 20, 30, 255]);
        frame.set_pixel(2, 1, [200, 100, 0, 128]);

        let path = export_still(&frame, &dir).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("digicam_") && name.ends_with(".png"));

        let decoded = load_frame(&path).unwrap();
        assert_eq!(decoded, frame);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_grain_texture_is_not_an_error() {
        assert!(load_grain_texture(Path::new("/nonexistent/grain.png")).is_none());
    }

    #[test]
    fn undecodable_grain_texture_is_ignored() {
        let dir = scratch_dir("grain");
        let path = write_output(&dir, "grain.png", b"not an image").unwrap();
        assert!(load_grain_texture(&path).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn grain_texture_loads_from_png() {
        let dir = scratch_dir("grain-ok");
        let texture = Frame::filled(2, 2, [128, 128, 128, 255]);
        let path = export_still(&texture, &dir).unwrap();
        let grain = load_grain_texture(&path).unwrap();
        assert_eq!(grain.dimensions(), (2, 2));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_frame_reports_missing_file() {
        let err = load_frame(Path::new("/nonexistent/input.png")).unwrap_err();
        assert!(matches!(err, DigicamError::FileNotFound { .. }));
    }
}
