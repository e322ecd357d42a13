//! Overlay compositor: vignette, grain, and the timestamp badge.
//!
//! Layers are composited source-over on top of the kernel output, in the
//! order vignette → grain → badge. The badge is always drawn.

use rand::Rng;

use crate::effect::EffectConfig;
use crate::frame::{quantize, Frame, BYTES_PER_PIXEL};
use crate::glyphs;

/// Vignette alpha at the outer radius, scaled by intensity.
pub const VIGNETTE_MAX_ALPHA: f32 = 0.45;

/// Global alpha of a tiled grain texture at full intensity.
pub const GRAIN_TEXTURE_ALPHA: f32 = 0.12;

/// Alpha of synthesised noise. Not scaled by intensity.
pub const NOISE_ALPHA: u8 = 20;

/// Badge background opacity.
pub const BADGE_ALPHA: f32 = 0.6;

/// Badge text colour (`#00ff77`).
pub const BADGE_TEXT: [u8; 3] = [0x00, 0xFF, 0x77];

const BADGE_X: i64 = 10;
const BADGE_MIN_WIDTH: i64 = 190;
const BADGE_HEIGHT: i64 = 26;
const BADGE_TOP_FROM_BOTTOM: i64 = 34;
const BADGE_TEXT_X: i64 = 14;
const BADGE_BASELINE_FROM_BOTTOM: i64 = 14;
const MIN_FONT_PX: u32 = 12;

/// A decoded texture tiled across the frame by the grain layer.
#[derive(Debug, Clone)]
pub struct GrainTexture {
    frame: Frame,
}

impl GrainTexture {
    /// Returns `None` for an empty texture, which cannot be tiled.
    pub fn new(frame: Frame) -> Option<Self> {
        if frame.width() == 0 || frame.height() == 0 {
            return None;
        }
        Some(Self { frame })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

/// Draws the non-per-pixel layers for the current effect.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    grain: Option<GrainTexture>,
}

impl Compositor {
    pub fn new(grain: Option<GrainTexture>) -> Self {
        Self { grain }
    }

    /// Whether grain uses a loaded texture rather than synthesised noise.
    pub fn has_grain_texture(&self) -> bool {
        self.grain.is_some()
    }

    /// Composite the overlays for `config` onto `frame`.
    pub fn compose<R>(&self, frame: &mut Frame, config: &EffectConfig, timestamp: &str, rng: &mut R)
    where
        R: Rng,
    {
        let c = config.intensity.get();

        if config.effect.has_vignette() {
            draw_vignette(frame, c);
        }

        if config.effect.has_grain() {
            match &self.grain {
                Some(texture) => tile_grain(frame, texture, c),
                None => synthesize_noise(frame, c, rng),
            }
        }

        draw_timestamp_badge(frame, timestamp);
    }
}

/// Source-over a colour with coverage `alpha` onto one RGBA pixel.
#[inline]
fn blend_over(px: &mut [u8], src: [f32; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let keep = 1.0 - alpha;
    px[0] = quantize(src[0] * alpha + px[0] as f32 * keep);
    px[1] = quantize(src[1] * alpha + px[1] as f32 * keep);
    px[2] = quantize(src[2] * alpha + px[2] as f32 * keep);
    px[3] = quantize(255.0 * alpha + px[3] as f32 * keep);
}

/// Radial black gradient: transparent inside `0.2·min(w,h)`, reaching
/// `0.45·c` alpha at `max(w,h)/1.2` and holding that value beyond it.
pub fn draw_vignette(frame: &mut Frame, c: f32) {
    let max_alpha = VIGNETTE_MAX_ALPHA * c;
    if max_alpha <= 0.0 || frame.is_empty() {
        return;
    }

    let (w, h) = (frame.width() as f32, frame.height() as f32);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let inner = 0.2 * w.min(h);
    let outer = w.max(h) / 1.2;
    let span = (outer - inner).max(f32::EPSILON);

    for (y, row) in frame.rows_mut().enumerate() {
        let dy = y as f32 + 0.5 - cy;
        for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let dx = x as f32 + 0.5 - cx;
            let t = ((dx.hypot(dy) - inner) / span).clamp(0.0, 1.0);
            blend_over(px, [0.0; 3], t * max_alpha);
        }
    }
}

/// Tile `texture` from the origin at `0.12·c` global alpha.
pub fn tile_grain(frame: &mut Frame, texture: &GrainTexture, c: f32) {
    let global = GRAIN_TEXTURE_ALPHA * c;
    if global <= 0.0 {
        return;
    }

    let (tw, th) = texture.dimensions();
    for (y, row) in frame.rows_mut().enumerate() {
        let ty = y as u32 % th;
        for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let [r, g, b, a] = texture.frame.pixel(x as u32 % tw, ty);
            let alpha = global * a as f32 / 255.0;
            blend_over(px, [r as f32, g as f32, b as f32], alpha);
        }
    }
}

/// Per-pixel grey noise `255·(rand·0.6 − 0.2)·c` at a fixed low alpha.
///
/// The alpha stays at [`NOISE_ALPHA`] whatever the intensity, so even
/// `c = 0` slightly darkens the frame.
pub fn synthesize_noise<R>(frame: &mut Frame, c: f32, rng: &mut R)
where
    R: Rng,
{
    let alpha = NOISE_ALPHA as f32 / 255.0;
    for px in frame.as_bytes_mut().chunks_exact_mut(BYTES_PER_PIXEL) {
        let noise: f32 = rng.random();
        let v = quantize(255.0 * (noise * 0.6 - 0.2) * c) as f32;
        blend_over(px, [v, v, v], alpha);
    }
}

/// Font size used by the badge for a frame `width` pixels wide.
pub fn badge_font_px(width: u32) -> u32 {
    ((width as f32 * 0.018).round() as u32).max(MIN_FONT_PX)
}

/// Integer glyph scale for a font size; 7px-tall glyphs cover ~70% of the em.
fn glyph_scale(font_px: u32) -> u32 {
    ((font_px as f32 * 0.7 / glyphs::GLYPH_HEIGHT as f32).round() as u32).max(1)
}

/// Dark rectangle anchored bottom-left with the timestamp drawn over it.
pub fn draw_timestamp_badge(frame: &mut Frame, timestamp: &str) {
    if frame.is_empty() {
        return;
    }

    let h = frame.height() as i64;
    let scale = glyph_scale(badge_font_px(frame.width()));
    let text_w = glyphs::text_width(timestamp, scale) as i64;
    let glyph_h = (glyphs::GLYPH_HEIGHT * scale) as i64;

    let baseline = h - BADGE_BASELINE_FROM_BOTTOM;
    let text_top = baseline - glyph_h;
    let rect_bottom = h - BADGE_TOP_FROM_BOTTOM + BADGE_HEIGHT;
    let rect_top = (h - BADGE_TOP_FROM_BOTTOM).min(text_top - 4);
    let rect_width = BADGE_MIN_WIDTH.max(BADGE_TEXT_X - BADGE_X + text_w + 4);

    fill_rect(
        frame,
        BADGE_X,
        rect_top,
        BADGE_X + rect_width,
        rect_bottom,
        [0.0; 3],
        BADGE_ALPHA,
    );

    let color = BADGE_TEXT.map(|v| v as f32);
    let mut pen_x = BADGE_TEXT_X;
    for ch in timestamp.chars() {
        let bits = glyphs::glyph(ch);
        for row in 0..glyphs::GLYPH_HEIGHT {
            for col in 0..glyphs::GLYPH_WIDTH {
                if !glyphs::lit(&bits, col, row) {
                    continue;
                }
                let x0 = pen_x + (col * scale) as i64;
                let y0 = text_top + (row * scale) as i64;
                fill_rect(
                    frame,
                    x0,
                    y0,
                    x0 + scale as i64,
                    y0 + scale as i64,
                    color,
                    1.0,
                );
            }
        }
        pen_x += (glyphs::GLYPH_ADVANCE * scale) as i64;
    }
}

/// Fill `[x0, x1) × [y0, y1)`, clipped to the frame.
fn fill_rect(frame: &mut Frame, x0: i64, y0: i64, x1: i64, y1: i64, color: [f32; 3], alpha: f32) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
    let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let row_len = w as usize * BYTES_PER_PIXEL;
    let data = frame.as_bytes_mut();
    for y in y0..y1 {
        let row = &mut data[y as usize * row_len..(y as usize + 1) * row_len];
        for px in row[x0 as usize * BYTES_PER_PIXEL..x1 as usize * BYTES_PER_PIXEL]
            .chunks_exact_mut(BYTES_PER_PIXEL)
        {
            blend_over(px, color, alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::effect::EffectId;

    const GREY: [u8; 4] = [128, 128, 128, 255];

    fn compose(frame: &mut Frame, effect: EffectId, c: f32, compositor: &Compositor) {
        let mut rng = StdRng::seed_from_u64(7);
        compositor.compose(frame, &EffectConfig::new(effect, c), "", &mut rng);
    }

    #[test]
    fn no_vignette_or_grain_for_plain_effects() {
        let mut frame = Frame::filled(64, 64, GREY);
        compose(&mut frame, EffectId::Sepia, 1.0, &Compositor::default());
        // Top rows sit above the badge and must be untouched.
        assert_eq!(frame.pixel(0, 0), GREY);
        assert_eq!(frame.pixel(63, 0), GREY);
    }

    #[test]
    fn vintage_vignette_darkens_corners_not_centre() {
        let mut frame = Frame::filled(200, 200, GREY);
        compose(&mut frame, EffectId::Vintage, 1.0, &Compositor::default());

        assert_eq!(frame.pixel(100, 100), GREY);
        let corner = frame.pixel(199, 0);
        assert!(corner[0] < 128, "corner should be darkened: {corner:?}");
        assert!(corner[0] > 60, "vignette alpha is capped at 0.45: {corner:?}");
    }

    #[test]
    fn vignette_is_skipped_at_zero_intensity() {
        let mut frame = Frame::filled(50, 50, GREY);
        draw_vignette(&mut frame, 0.0);
        assert_eq!(frame, Frame::filled(50, 50, GREY));
    }

    #[test]
    fn noise_alpha_does_not_scale_with_intensity() {
        let mut frame = Frame::filled(8, 8, [200, 200, 200, 255]);
        let mut rng = StdRng::seed_from_u64(1);
        synthesize_noise(&mut frame, 0.0, &mut rng);
        // v = 0 composited at 20/255 over 200 -> 184.3
        assert_eq!(frame.pixel(3, 3), [184, 184, 184, 255]);
    }

    #[test]
    fn noise_is_deterministic_for_a_seed() {
        let mut a = Frame::filled(16, 16, GREY);
        let mut b = Frame::filled(16, 16, GREY);
        synthesize_noise(&mut a, 1.0, &mut StdRng::seed_from_u64(42));
        synthesize_noise(&mut b, 1.0, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn grain_texture_replaces_synthesized_noise() {
        let texture = GrainTexture::new(Frame::filled(2, 2, [255, 255, 255, 255])).unwrap();
        let compositor = Compositor::new(Some(texture));
        assert!(compositor.has_grain_texture());

        let mut frame = Frame::filled(4, 4, [0, 0, 0, 255]);
        tile_grain(&mut frame, compositor.grain.as_ref().unwrap(), 1.0);
        // white at 0.12 over black -> 30.6
        assert_eq!(frame.pixel(3, 3), [31, 31, 31, 255]);
    }

    #[test]
    fn empty_grain_texture_is_rejected() {
        assert!(GrainTexture::new(Frame::filled(0, 4, GREY)).is_none());
    }

    #[test]
    fn badge_font_has_minimum_size() {
        assert_eq!(badge_font_px(320), 12);
        assert_eq!(badge_font_px(1280), 23);
    }

    #[test]
    fn badge_is_anchored_bottom_left() {
        let mut frame = Frame::filled(320, 120, [255, 255, 255, 255]);
        draw_timestamp_badge(&mut frame, "12:00:00");

        // Inside the rectangle but away from glyphs: 255 * 0.4 = 102.
        assert_eq!(frame.pixel(11, 120 - 33), [102, 102, 102, 255]);
        // Left of the rectangle and above it: untouched.
        assert_eq!(frame.pixel(5, 110), [255, 255, 255, 255]);
        assert_eq!(frame.pixel(100, 50), [255, 255, 255, 255]);
    }

    #[test]
    fn badge_text_is_drawn_in_green() {
        let mut frame = Frame::filled(320, 120, [0, 0, 0, 255]);
        draw_timestamp_badge(&mut frame, "1");
        // '1' at scale 1: stem in column 2, text top = baseline - 7.
        let top = 120 - 14 - 7;
        assert_eq!(frame.pixel(14 + 2, top), [0x00, 0xFF, 0x77, 255]);
    }

    #[test]
    fn badge_clips_on_tiny_frames() {
        let mut frame = Frame::filled(8, 8, GREY);
        draw_timestamp_badge(&mut frame, "2024-01-01 00:00:00");
        assert_eq!(frame.as_bytes().len(), 8 * 8 * 4);
    }
}
