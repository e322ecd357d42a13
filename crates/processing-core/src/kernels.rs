//! Effect kernels.
//!
//! Two entry points with explicit ownership:
//! - [`apply`] takes the frame by value and hands back the processed frame.
//! - [`apply_in_place`] mutates the caller's buffer.
//!
//! Every written sample is rounded (ties to even) and clamped to `[0, 255]`
//! before it is stored, so multi-stage kernels (vintage) operate on the
//! quantised output of the previous stage. Alpha is never touched.

use crate::effect::{EffectConfig, EffectId};
use crate::frame::{quantize, Frame, BYTES_PER_PIXEL};

/// Maximum horizontal shift of the `rgbSplit` kernel at full intensity.
pub const RGB_SPLIT_MAX_SHIFT: f32 = 20.0;

/// Darkening applied to every third row by `scanlines` at full intensity.
pub const SCANLINE_DARKEN: f32 = 0.25;

/// Contrast gain added by `vintage` at full intensity.
pub const VINTAGE_CONTRAST: f32 = 0.3;

/// Apply the configured effect, consuming and returning the frame.
pub fn apply(mut frame: Frame, config: &EffectConfig) -> Frame {
    apply_in_place(&mut frame, config);
    frame
}

/// Apply the configured effect to `frame` in place.
pub fn apply_in_place(frame: &mut Frame, config: &EffectConfig) {
    let c = config.intensity.get();
    match config.effect {
        EffectId::None => {}
        EffectId::Grayscale => grayscale(frame.as_bytes_mut(), c),
        EffectId::Sepia => sepia(frame.as_bytes_mut(), c),
        EffectId::Vintage => {
            sepia(frame.as_bytes_mut(), c);
            contrast(frame.as_bytes_mut(), 1.0 + VINTAGE_CONTRAST * c);
        }
        EffectId::Invert => invert(frame.as_bytes_mut(), c),
        EffectId::RgbSplit => rgb_split(frame, rgb_split_shift(c)),
        EffectId::Scanlines => scanlines(frame, c),
    }
}

/// Horizontal shift in pixels used by `rgbSplit` at intensity `c`.
pub fn rgb_split_shift(c: f32) -> usize {
    // Half-up rounding; c is non-negative so `round` agrees.
    (RGB_SPLIT_MAX_SHIFT * c).round() as usize
}

#[inline]
fn blend(original: u8, target: f32, c: f32) -> u8 {
    quantize(original as f32 * (1.0 - c) + target * c)
}

fn grayscale(data: &mut [u8], c: f32) {
    for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        px[0] = blend(px[0], luma, c);
        px[1] = blend(px[1], luma, c);
        px[2] = blend(px[2], luma, c);
    }
}

fn sepia(data: &mut [u8], c: f32) {
    for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        let out_r = 0.393 * r + 0.769 * g + 0.189 * b;
        let out_g = 0.349 * r + 0.686 * g + 0.168 * b;
        let out_b = 0.272 * r + 0.534 * g + 0.131 * b;
        px[0] = blend(px[0], out_r, c);
        px[1] = blend(px[1], out_g, c);
        px[2] = blend(px[2], out_b, c);
    }
}

fn contrast(data: &mut [u8], gain: f32) {
    let intercept = 128.0 * (1.0 - gain);
    for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
        for ch in &mut px[..3] {
            *ch = quantize(*ch as f32 * gain + intercept);
        }
    }
}

fn invert(data: &mut [u8], c: f32) {
    for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
        for ch in &mut px[..3] {
            *ch = blend(*ch, 255.0 - *ch as f32, c);
        }
    }
}

/// Reads from a frozen copy so shifted samples never see already-written
/// output. Sample columns clamp to the row edges.
fn rgb_split(frame: &mut Frame, shift: usize) {
    if shift == 0 || frame.is_empty() {
        return;
    }

    let width = frame.width() as usize;
    let source = frame.as_bytes().to_vec();
    let row_len = width * BYTES_PER_PIXEL;

    for (row, src_row) in frame.rows_mut().zip(source.chunks_exact(row_len)) {
        for x in 0..width {
            let red_x = x.saturating_sub(shift);
            let blue_x = (x + shift).min(width - 1);
            let i = x * BYTES_PER_PIXEL;
            row[i] = src_row[red_x * BYTES_PER_PIXEL];
            row[i + 2] = src_row[blue_x * BYTES_PER_PIXEL + 2];
        }
    }
}

fn scanlines(frame: &mut Frame, c: f32) {
    let factor = 1.0 - SCANLINE_DARKEN * c;
    for row in frame.rows_mut().step_by(3) {
        for px in row.chunks_exact_mut(BYTES_PER_PIXEL) {
            for ch in &mut px[..3] {
                *ch = quantize(*ch as f32 * factor);
            }
        }
    }
}
