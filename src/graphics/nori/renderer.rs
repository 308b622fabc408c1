//! Renderer for NORI bitmaps
//!
//! Turns a packed bitmap payload into an RGBA image for previewing. The
//! transparency key colour becomes fully transparent at every bit depth, as
//! does palette index 0 in 8 bpp bitmaps.

use image::{Rgba, RgbaImage};
use thiserror::Error;

use super::{model::BitmapRecord, model::Palette, TRANSPARENT_KEY};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{0} bits per pixel cannot be previewed")]
    UnsupportedDepth(i32),

    #[error("invalid bitmap dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("bitmap needs {expected} bytes of pixels, has {found}")]
    PixelLength { expected: usize, found: usize },
}

/// Bytes in one tightly packed row
pub fn packed_row_len(width: usize, bits_per_pixel: usize) -> usize {
    (width * bits_per_pixel + 7) / 8
}

/// Render a single bitmap into an RGBA image
pub fn bitmap_to_rgba(
    bitmap: &BitmapRecord,
    bits_per_pixel: i32,
    palette: Option<&Palette>,
) -> Result<RgbaImage, RenderError> {
    if bitmap.width < 0 || bitmap.height < 0 {
        return Err(RenderError::InvalidDimensions {
            width: bitmap.width,
            height: bitmap.height,
        });
    }
    let width = bitmap.width as usize;
    let height = bitmap.height as usize;

    let bytes_per_pixel = match bits_per_pixel {
        8 | 16 | 24 | 32 => bits_per_pixel as usize / 8,
        other => return Err(RenderError::UnsupportedDepth(other)),
    };

    let expected = width * height * bytes_per_pixel;
    if bitmap.pixels.len() < expected {
        return Err(RenderError::PixelLength {
            expected,
            found: bitmap.pixels.len(),
        });
    }

    let mut image = RgbaImage::new(width as u32, height as u32);
    for (i, px) in bitmap.pixels[..expected]
        .chunks_exact(bytes_per_pixel)
        .enumerate()
    {
        let rgb = match px {
            [index] => palette_colour(palette, *index),
            [lo, hi] => rgb565(u16::from_le_bytes([*lo, *hi])),
            [b, g, r] | [b, g, r, _] => [*r, *g, *b],
            _ => unreachable!("chunk size is 1 to 4"),
        };
        let keyed = rgb == TRANSPARENT_KEY || (bytes_per_pixel == 1 && px[0] == 0);
        let alpha = if keyed { 0 } else { 255 };

        let x = (i % width) as u32;
        let y = (i / width) as u32;
        image.put_pixel(x, y, Rgba([rgb[0], rgb[1], rgb[2], alpha]));
    }

    Ok(image)
}

fn palette_colour(palette: Option<&Palette>, index: u8) -> [u8; 3] {
    match palette.and_then(|p| p.colours.get(index as usize)) {
        Some(colour) => *colour,
        // No palette: show the indices as greyscale
        None => [index, index, index],
    }
}

fn rgb565(value: u16) -> [u8; 3] {
    let r = ((value >> 11) & 0x1F) as u8;
    let g = ((value >> 5) & 0x3F) as u8;
    let b = (value & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(width: i32, height: i32, pixels: Vec<u8>) -> BitmapRecord {
        BitmapRecord {
            draw_count: 1,
            data_length: pixels.len() as i32,
            width,
            height,
            param: 0,
            origin_x: 0,
            origin_y: 0,
            offset: 0,
            declared_offset: 0,
            pixels,
        }
    }

    #[test]
    fn test_24bpp_is_bgr_and_key_is_transparent() {
        let img = bitmap_to_rgba(&bitmap(2, 1, vec![1, 2, 3, 255, 0, 255]), 24, None).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgba([3, 2, 1, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([255, 0, 255, 0]));
    }

    #[test]
    fn test_8bpp_without_palette_is_greyscale() {
        let img = bitmap_to_rgba(&bitmap(1, 3, vec![7, 9, 0]), 8, None).unwrap();
        assert_eq!(img.get_pixel(0, 1), &Rgba([9, 9, 9, 255]));
        assert_eq!(img.get_pixel(0, 2)[3], 0);
    }

    #[test]
    fn test_rgb565_extremes() {
        assert_eq!(rgb565(0xFFFF), [255, 255, 255]);
        assert_eq!(rgb565(0xF800), [255, 0, 0]);
        assert_eq!(rgb565(0x0000), [0, 0, 0]);
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let err = bitmap_to_rgba(&bitmap(4, 4, vec![0; 3]), 8, None).unwrap_err();
        assert!(matches!(err, RenderError::PixelLength { expected: 16, found: 3 }));
        assert!(matches!(
            bitmap_to_rgba(&bitmap(1, 1, vec![0]), 4, None),
            Err(RenderError::UnsupportedDepth(4))
        ));
    }

    #[test]
    fn test_packed_row_len() {
        assert_eq!(packed_row_len(3, 24), 9);
        assert_eq!(packed_row_len(5, 8), 5);
        assert_eq!(packed_row_len(3, 4), 2);
    }
}
