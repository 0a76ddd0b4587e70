use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    #[cfg_attr(not(feature = "device-v4l2"), allow(dead_code))]
    Rgb24,
    Bgr24,
    Rgba32,
    #[cfg_attr(not(feature = "device-v4l2"), allow(dead_code))]
    Nv12,
}

impl PixelFormat {
    fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
            PixelFormat::Rgba32 => Some(4),
            PixelFormat::Nv12 => None,
        }
    }
}

/// Convert a packed capture buffer into RGB24, the layout the encoder expects.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height),
        PixelFormat::Rgb24 => {
            check_packed_len(pixels, width, height, format)?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Bgr24 => {
            check_packed_len(pixels, width, height, format)?;
            Ok(pixels
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect())
        }
        PixelFormat::Rgba32 => {
            check_packed_len(pixels, width, height, format)?;
            Ok(pixels
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect())
        }
    }
}

fn check_packed_len(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<()> {
    let bpp = format
        .bytes_per_pixel()
        .ok_or_else(|| anyhow!("{:?} is not a packed format", format))?;
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(bpp))
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_plane = vec![128u8; 2];
        let nv12 = [y_plane, uv_plane].concat();

        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn bgr_channels_are_swapped() -> Result<()> {
        let bgr = vec![1u8, 2, 3, 4, 5, 6];
        let rgb = normalize_to_rgb(&bgr, 2, 1, PixelFormat::Bgr24)?;
        assert_eq!(rgb, vec![3, 2, 1, 6, 5, 4]);
        Ok(())
    }

    #[test]
    fn rgba_drops_alpha() -> Result<()> {
        let rgba = vec![10u8, 20, 30, 255, 40, 50, 60, 0];
        let rgb = normalize_to_rgb(&rgba, 2, 1, PixelFormat::Rgba32)?;
        assert_eq!(rgb, vec![10, 20, 30, 40, 50, 60]);
        Ok(())
    }

    #[test]
    fn packed_formats_validate_length() {
        assert!(normalize_to_rgb(&[0u8; 9], 1, 3, PixelFormat::Rgb24).is_ok());
        assert!(normalize_to_rgb(&[0u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(normalize_to_rgb(&[0u8; 7], 1, 2, PixelFormat::Rgba32).is_err());
    }
}
