//! RGBA frame buffers.

use digicam_common::error::{DigicamError, DigicamResult};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A rectangular RGBA8 image, row-major, no row padding.
///
/// The buffer length is always `width * height * 4`; every constructor
/// enforces it and no method can change the length afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an existing RGBA buffer.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> DigicamResult<Self> {
        let expected = buffer_len(width, height)?;
        if data.len() != expected {
            return Err(DigicamError::processing(format!(
                "RGBA buffer for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Copy a strided buffer (e.g. a mapped video buffer whose rows are
    /// padded) into a tightly packed frame.
    pub fn from_strided(width: u32, height: u32, stride: usize, src: &[u8]) -> DigicamResult<Self> {
        let row_len = width as usize * BYTES_PER_PIXEL;
        if stride < row_len {
            return Err(DigicamError::processing(format!(
                "stride {stride} is shorter than a {width}px RGBA row"
            )));
        }
        if height > 0 && src.len() < stride * (height as usize - 1) + row_len {
            return Err(DigicamError::processing(format!(
                "strided buffer too short for {width}x{height} (stride {stride}, {} bytes)",
                src.len()
            )));
        }

        let mut data = Vec::with_capacity(buffer_len(width, height)?);
        for row in 0..height as usize {
            let start = row * stride;
            data.extend_from_slice(&src[start..start + row_len]);
        }
        Self::from_rgba(width, height, data)
    }

    /// A frame filled with a single colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(pixels * BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the pixels. The slice cannot be resized, so the
    /// length invariant holds.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Read one pixel. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Overwrite one pixel. Panics when out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Mutable pixel rows, top to bottom.
    pub fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, u8> {
        let row_len = (self.width as usize * BYTES_PER_PIXEL).max(1);
        self.data.chunks_exact_mut(row_len)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} frame",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn buffer_len(width: u32, height: u32) -> DigicamResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| DigicamError::processing(format!("frame {width}x{height} is too large")))
}

/// Round to nearest (ties to even) and clamp to the 8-bit range, the way a
/// clamped byte array stores a float.
#[inline]
pub fn quantize(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0).round_ties_even() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_buffer_length() {
        let err = Frame::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(err.to_string().contains("16 bytes"));
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn filled_frame_has_expected_length() {
        let frame = Frame::filled(3, 2, [1, 2, 3, 255]);
        assert_eq!(frame.as_bytes().len(), 3 * 2 * 4);
        assert_eq!(frame.pixel(2, 1), [1, 2, 3, 255]);
    }

    #[test]
    fn strided_copy_drops_row_padding() {
        // 1x2 frame, rows padded to 8 bytes.
        let src = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        let frame = Frame::from_strided(1, 2, 8, &src).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn quantize_matches_clamped_byte_storage() {
        assert_eq!(quantize(127.5), 128);
        assert_eq!(quantize(126.5), 126);
        assert_eq!(quantize(-3.0), 0);
        assert_eq!(quantize(300.0), 255);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn set_and_read_pixel() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0, 255]);
        frame.set_pixel(1, 0, [9, 8, 7, 6]);
        assert_eq!(frame.pixel(1, 0), [9, 8, 7, 6]);
        assert_eq!(frame.rows_mut().count(), 2);
    }
}
