//! Windows BMP adapter
//!
//! NORI stores pixels tightly packed with top-down rows. BMP files pad each
//! row to four bytes and usually store them bottom-up. This module converts
//! between the two and gathers the BMP files a document is built from.

use std::{
    fs,
    io::{self, Cursor},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::binary_utils::{
    read_i32_le, read_u16_le, read_u32_le, seek_to, write_bytes, write_i32_le, write_u16_le,
    write_u32_le,
};
use crate::graphics::nori::{renderer::packed_row_len, FormatDocument, Palette};

const FILE_HEADER_SIZE: usize = 14;
const INFO_HEADER_SIZE: usize = 40;
const BMP_MAGIC: &[u8; 2] = b"BM";

#[derive(Debug, Error)]
pub enum BitmapError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a BMP file")]
    NotBmp,

    #[error("BMP is {found_width}x{found_height}, bitmap record says {width}x{height}")]
    Dimensions {
        width: i32,
        height: i32,
        found_width: i32,
        found_height: i32,
    },

    #[error("BMP has {found} bits per pixel, document uses {expected}")]
    Depth { expected: i32, found: u16 },

    #[error("unsupported bit depth {0}")]
    UnsupportedDepth(i32),

    #[error("BMP pixel data is truncated: need {expected} bytes, have {found}")]
    Truncated { expected: usize, found: usize },

    #[error("packed payload is {found} bytes, expected {expected}")]
    PackedLength { expected: usize, found: usize },

    #[error("{}: found {found} BMP files for {expected} bitmaps", .dir.display())]
    FileCount {
        dir: PathBuf,
        expected: usize,
        found: usize,
    },
}

/// Packed row length, padded BMP stride and row count
fn row_lengths(
    width: i32,
    height: i32,
    bits_per_pixel: i32,
) -> Result<(usize, usize, usize), BitmapError> {
    if !matches!(bits_per_pixel, 8 | 16 | 24 | 32) {
        return Err(BitmapError::UnsupportedDepth(bits_per_pixel));
    }
    let (w, h) = (width.max(0) as usize, height.max(0) as usize);
    let packed = packed_row_len(w, bits_per_pixel as usize);
    let stride = (w * bits_per_pixel as usize + 31) / 32 * 4;
    Ok((packed, stride, h))
}

/// Strip a BMP file down to the packed top-down payload NORI stores.
pub fn to_packed(
    bmp: &[u8],
    width: i32,
    height: i32,
    bits_per_pixel: i32,
) -> Result<Vec<u8>, BitmapError> {
    if bmp.len() < FILE_HEADER_SIZE + INFO_HEADER_SIZE || &bmp[..2] != BMP_MAGIC {
        return Err(BitmapError::NotBmp);
    }
    let (packed_len, stride, rows) = row_lengths(width, height, bits_per_pixel)?;

    let mut cursor = Cursor::new(bmp);
    seek_to(&mut cursor, 10)?;
    let pixel_start = read_u32_le(&mut cursor)? as usize;
    seek_to(&mut cursor, 18)?;
    let found_width = read_i32_le(&mut cursor)?;
    let found_height = read_i32_le(&mut cursor)?;
    let _planes = read_u16_le(&mut cursor)?;
    let found_depth = read_u16_le(&mut cursor)?;

    if found_width != width || found_height.checked_abs() != Some(height) {
        return Err(BitmapError::Dimensions {
            width,
            height,
            found_width,
            found_height,
        });
    }
    if found_depth as i32 != bits_per_pixel {
        return Err(BitmapError::Depth {
            expected: bits_per_pixel,
            found: found_depth,
        });
    }

    let needed = pixel_start + stride * rows;
    if bmp.len() < needed {
        return Err(BitmapError::Truncated {
            expected: needed,
            found: bmp.len(),
        });
    }

    // Negative height marks a top-down BMP
    let top_down = found_height < 0;
    let data = &bmp[pixel_start..needed];
    let mut packed = Vec::with_capacity(packed_len * rows);
    for row in 0..rows {
        let src = if top_down { row } else { rows - 1 - row };
        let start = src * stride;
        packed.extend_from_slice(&data[start..start + packed_len]);
    }

    Ok(packed)
}

/// Wrap a packed payload in a bottom-up BMP file. 8 bpp bitmaps get the
/// document palette as colour table, or a grey ramp without one.
pub fn from_packed(
    packed: &[u8],
    width: i32,
    height: i32,
    bits_per_pixel: i32,
    palette: Option<&Palette>,
) -> Result<Vec<u8>, BitmapError> {
    let (packed_len, stride, rows) = row_lengths(width, height, bits_per_pixel)?;
    if packed.len() < packed_len * rows {
        return Err(BitmapError::PackedLength {
            expected: packed_len * rows,
            found: packed.len(),
        });
    }

    let table_len = if bits_per_pixel == 8 { 256 * 4 } else { 0 };
    let pixel_start = FILE_HEADER_SIZE + INFO_HEADER_SIZE + table_len;
    let image_size = stride * rows;
    let mut out = vec![0u8; pixel_start + image_size];

    write_bytes(&mut out, BMP_MAGIC, 0)?;
    let file_len = out.len() as u32;
    write_u32_le(&mut out, file_len, 2)?;
    write_u32_le(&mut out, pixel_start as u32, 10)?;

    write_u32_le(&mut out, INFO_HEADER_SIZE as u32, 14)?;
    write_i32_le(&mut out, width, 18)?;
    write_i32_le(&mut out, height, 22)?;
    write_u16_le(&mut out, 1, 26)?;
    write_u16_le(&mut out, bits_per_pixel as u16, 28)?;
    write_u32_le(&mut out, 0, 30)?;
    write_u32_le(&mut out, image_size as u32, 34)?;
    if table_len > 0 {
        write_u32_le(&mut out, 256, 46)?;
        let table_start = FILE_HEADER_SIZE + INFO_HEADER_SIZE;
        for i in 0..256 {
            let [r, g, b] = palette
                .and_then(|p| p.colours.get(i))
                .copied()
                .unwrap_or([i as u8; 3]);
            write_bytes(&mut out, &[b, g, r, 0], table_start + i * 4)?;
        }
    }

    for row in 0..rows {
        let dst = pixel_start + (rows - 1 - row) * stride;
        let src = row * packed_len;
        write_bytes(&mut out, &packed[src..src + packed_len], dst)?;
    }

    Ok(out)
}

/// BMP files in `dir`, ascending by file name. Other files are ignored.
pub fn list_bitmap_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_bmp = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bmp"));
        if is_bmp && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Read the packed payload of every bitmap in `document` from the BMP files
/// in `dir`, assigned in ascending file name order.
pub fn read_bitmap_dir(
    dir: &Path,
    document: &FormatDocument,
) -> Result<Vec<Vec<u8>>, BitmapError> {
    let files = list_bitmap_files(dir)?;
    if files.len() != document.bitmaps.len() {
        return Err(BitmapError::FileCount {
            dir: dir.to_path_buf(),
            expected: document.bitmaps.len(),
            found: files.len(),
        });
    }

    let bpp = document.gawi.bits_per_pixel;
    files
        .iter()
        .zip(&document.bitmaps)
        .map(|(path, bitmap)| {
            debug!("reading {}", path.display());
            let bytes = fs::read(path)?;
            to_packed(&bytes, bitmap.width, bitmap.height, bpp)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_24bpp_rows_are_padded_and_flipped() {
        // 1x2, 3 bytes per row padded to 4
        let packed = [1, 2, 3, 4, 5, 6];
        let bmp = from_packed(&packed, 1, 2, 24, None).unwrap();
        assert_eq!(bmp.len(), 54 + 8);
        assert_eq!(&bmp[2..6], &62u32.to_le_bytes());
        assert_eq!(&bmp[10..14], &54u32.to_le_bytes());
        assert_eq!(&bmp[54..], &[4, 5, 6, 0, 1, 2, 3, 0]);
        assert_eq!(to_packed(&bmp, 1, 2, 24).unwrap(), packed);
    }

    #[test]
    fn test_8bpp_has_colour_table() {
        let packed = [0, 1, 2, 3, 4, 5];
        let bmp = from_packed(&packed, 3, 2, 8, None).unwrap();
        assert_eq!(bmp.len(), 54 + 1024 + 8);
        assert_eq!(&bmp[2..6], &1086u32.to_le_bytes());
        // Grey ramp entry 2 in BGRA
        assert_eq!(&bmp[54 + 8..54 + 12], &[2, 2, 2, 0]);
        assert_eq!(to_packed(&bmp, 3, 2, 8).unwrap(), packed);
    }

    #[test]
    fn test_top_down_bmp() {
        let mut bmp = from_packed(&[9, 8, 7, 6, 5, 4], 1, 2, 24, None).unwrap();
        // Flip to top-down by negating the height and swapping the rows
        bmp[22..26].copy_from_slice(&(-2i32).to_le_bytes());
        let rows: Vec<u8> = bmp[58..62].iter().chain(&bmp[54..58]).copied().collect();
        bmp[54..62].copy_from_slice(&rows);
        assert_eq!(to_packed(&bmp, 1, 2, 24).unwrap(), vec![9, 8, 7, 6, 5, 4]);
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let bmp = from_packed(&[0; 4], 2, 2, 8, None).unwrap();
        assert!(matches!(to_packed(&bmp, 3, 2, 8), Err(BitmapError::Dimensions { .. })));
        assert!(matches!(to_packed(&bmp, 2, 2, 24), Err(BitmapError::Depth { found: 8, .. })));
        assert!(matches!(to_packed(b"PNG", 2, 2, 8), Err(BitmapError::NotBmp)));
        assert!(matches!(
            from_packed(&[0; 3], 2, 2, 8, None),
            Err(BitmapError::PackedLength { expected: 4, found: 3 })
        ));
        assert!(matches!(
            to_packed(&bmp[..bmp.len() - 1], 2, 2, 8),
            Err(BitmapError::Truncated { .. })
        ));
    }
}
