//! Pixel format conversion for camera buffers.

use anyhow::{anyhow, Result};

/// Capture formats the V4L2 backend accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Full-range BT.601 Y plane followed by interleaved UV at half resolution.
    Nv12,
}

impl PixelFormat {
    fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let luma = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => luma.checked_mul(3),
            PixelFormat::Nv12 => luma.checked_add(luma / 2),
        }
    }
}

/// Convert a captured buffer into the RGB24 layout `Frame` expects.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format
        .frame_len(width, height)
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch for {}x{}: expected {}, got {}",
            format,
            width,
            height,
            expected,
            pixels.len()
        ));
    }
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width as usize, height as usize)),
    }
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let (luma, chroma) = pixels.split_at(w * h);
    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let uv_row = &chroma[(row / 2) * w..];
        for col in 0..w {
            let y = luma[row * w + col] as f32;
            let u = uv_row[(col / 2) * 2] as f32 - 128.0;
            let v = uv_row[(col / 2) * 2 + 1] as f32 - 128.0;
            rgb.push(to_u8(y + 1.402 * v));
            rgb.push(to_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(to_u8(y + 1.772 * u));
        }
    }
    rgb
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_gives_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn red_chroma_gives_red() -> Result<()> {
        // Y=76, U=85, V=255 is close to pure red in full-range BT.601.
        let nv12 = [vec![76u8; 4], vec![85u8, 255u8]].concat();
        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert!(rgb[0] > 240 && rgb[1] < 20 && rgb[2] < 20, "{:?}", &rgb[..3]);
        Ok(())
    }

    #[test]
    fn buffer_length_is_checked() {
        assert!(normalize_to_rgb(&[1u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
        assert!(normalize_to_rgb(&[1u8; 9], 2, 3, PixelFormat::Rgb24).is_err());
        assert!(normalize_to_rgb(&[1u8; 5], 2, 2, PixelFormat::Nv12).is_err());
    }
}
