//! Writer for the NORI sprite format
//!
//! Serialisation happens in two passes. [`plan_layout`] works out where
//! every record lands, including the padding the authoring tool expects
//! after bitmaps with a bad draw count; the emit pass then writes into a
//! buffer sized by the header's declared file size, the way the game loader
//! allocates it.

use tracing::{debug, warn};

use crate::binary_utils::{write_bytes, write_i32_le};

use super::{
    model::{encode_name, Finding, FormatDocument, SizeField},
    quirks, EncodeError, HEADER_SIZE,
};

/// Supplies the packed, top-down pixel payload of each bitmap.
pub trait PixelSource {
    fn packed_pixels(&self, bitmap_id: usize) -> Option<&[u8]>;
}

/// Pixels carried by a decoded document
impl PixelSource for FormatDocument {
    fn packed_pixels(&self, bitmap_id: usize) -> Option<&[u8]> {
        self.bitmaps.get(bitmap_id).map(|b| b.pixels.as_slice())
    }
}

impl PixelSource for [Vec<u8>] {
    fn packed_pixels(&self, bitmap_id: usize) -> Option<&[u8]> {
        self.get(bitmap_id).map(Vec::as_slice)
    }
}

impl PixelSource for Vec<Vec<u8>> {
    fn packed_pixels(&self, bitmap_id: usize) -> Option<&[u8]> {
        self.as_slice().packed_pixels(bitmap_id)
    }
}

/// Encoded bytes plus warnings about things the caller should fix by hand
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub findings: Vec<Finding>,
}

/// Record positions computed before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Relative to the end of the bitmap offset table
    pub bitmap_offsets: Vec<u32>,
    /// Zero bytes written after each bitmap
    pub bitmap_padding: Vec<u64>,
    /// Absolute end of the last bitmap (plus its padding)
    pub bitmap_section_end: u64,
    /// Relative to the end of the animation offset table
    pub animation_offsets: Vec<u32>,
    /// Zero bytes written after each animation
    pub animation_padding: Vec<u64>,
    /// Relative to the end of each animation's frame offset table
    pub frame_offsets: Vec<Vec<u32>>,
    /// Absolute end of the emitted content
    pub end: u64,
}

/// Main entry point for encoding NORI files
pub fn encode<P: PixelSource + ?Sized>(
    document: &FormatDocument,
    pixels: &P,
) -> Result<Encoded, EncodeError> {
    check_document(document)?;
    let payloads = collect_pixels(document, pixels)?;

    let mut findings = Vec::new();
    let layout = plan_layout(document, &mut findings);

    let capacity = document.header.total_size;
    if capacity < 0 || layout.end > capacity as u64 {
        return Err(EncodeError::BufferOverflow {
            required: layout.end,
            capacity,
        });
    }
    check_sizes(document, &layout, &mut findings);

    let mut emitter = Emitter {
        data: vec![0u8; capacity as usize],
        pos: 0,
        capacity,
    };
    emitter.write_headers(document)?;
    emitter.write_bitmaps(document, &layout, &payloads)?;
    emitter.write_animations(document, &layout, &mut findings)?;

    debug!(
        "Encoded {} bitmaps and {} animations into {} bytes",
        document.bitmaps.len(),
        document.animations.len(),
        emitter.data.len()
    );
    for finding in &findings {
        warn!("{}", finding);
    }

    Ok(Encoded {
        bytes: emitter.data,
        findings,
    })
}

/// Fatal findings block the encode; a dangling plane reference gets its
/// own error.
fn check_document(document: &FormatDocument) -> Result<(), EncodeError> {
    let fatal = document.fatal_findings();

    let dangling = fatal.iter().find_map(|finding| match finding {
        Finding::DanglingReference {
            location,
            bitmap_id,
            bitmap_count,
        } => Some(EncodeError::DanglingReference {
            location: *location,
            bitmap_id: *bitmap_id,
            bitmap_count: *bitmap_count,
        }),
        _ => None,
    });
    if let Some(err) = dangling {
        return Err(err);
    }

    if fatal.is_empty() {
        Ok(())
    } else {
        Err(EncodeError::Invalid(fatal))
    }
}

fn collect_pixels<'p, P: PixelSource + ?Sized>(
    document: &FormatDocument,
    pixels: &'p P,
) -> Result<Vec<&'p [u8]>, EncodeError> {
    document
        .bitmaps
        .iter()
        .enumerate()
        .map(|(i, bitmap)| {
            let data = pixels
                .packed_pixels(i)
                .ok_or(EncodeError::MissingPixels { bitmap: i })?;
            if data.len() as i64 != bitmap.data_length as i64 {
                return Err(EncodeError::PixelLength {
                    bitmap: i,
                    expected: bitmap.data_length,
                    found: data.len(),
                });
            }
            Ok(data)
        })
        .collect()
}

/// First pass: positions of every bitmap, animation and frame.
pub fn plan_layout(document: &FormatDocument, findings: &mut Vec<Finding>) -> Layout {
    let data_start = document.bitmap_data_start() as u64;
    let count = document.bitmaps.len();

    let mut bitmap_offsets = Vec::with_capacity(count);
    let mut bitmap_padding = Vec::with_capacity(count);
    let mut cursor = 0u64;

    for (i, bitmap) in document.bitmaps.iter().enumerate() {
        bitmap_offsets.push(cursor as u32);
        cursor += bitmap.encoded_len() as u64;

        let mut padding = 0;
        if let Some(quirk) = quirks::check_draw_count(i, bitmap.draw_count) {
            // Land the next record where the source file had it; the last
            // record is padded out to the declared GAWI size.
            let target = match document.bitmaps.get(i + 1) {
                Some(next) => next.offset as i64,
                None => {
                    HEADER_SIZE as i64 + document.gawi.section_size as i64 - data_start as i64
                }
            };
            padding = quirks::gap_padding(cursor, target).unwrap_or(0);
            cursor += padding;
            findings.push(quirk.into());
        }
        bitmap_padding.push(padding);
    }

    let bitmap_section_end = data_start + cursor;
    let animation_start = bitmap_section_end + 4 * document.animations.len() as u64;

    let mut animation_offsets = Vec::with_capacity(document.animations.len());
    let mut animation_padding = Vec::with_capacity(document.animations.len());
    let mut frame_offsets = Vec::with_capacity(document.animations.len());
    let mut cursor = 0u64;

    for (i, animation) in document.animations.iter().enumerate() {
        animation_offsets.push(cursor as u32);

        let mut frame_cursor = 0u64;
        let offsets: Vec<u32> = animation
            .frames
            .iter()
            .map(|frame| {
                let offset = frame_cursor as u32;
                frame_cursor += frame.encoded_len() as u64;
                offset
            })
            .collect();
        frame_offsets.push(offsets);

        cursor += animation.encoded_len() as u64;

        // A gap the decoder resynced over stays in place
        let padding = document
            .animations
            .get(i + 1)
            .and_then(|next| quirks::gap_padding(cursor, next.offset as i64))
            .unwrap_or(0);
        cursor += padding;
        animation_padding.push(padding);
    }

    Layout {
        bitmap_offsets,
        bitmap_padding,
        bitmap_section_end,
        animation_offsets,
        animation_padding,
        frame_offsets,
        end: animation_start + cursor,
    }
}

/// Declared sizes are written as stored; report where they disagree with
/// the layout so the caller can fix the config.
fn check_sizes(document: &FormatDocument, layout: &Layout, findings: &mut Vec<Finding>) {
    let header_size = HEADER_SIZE as u64;
    let checks = [
        (
            SizeField::Section,
            document.gawi.section_size,
            layout.bitmap_section_end - header_size,
        ),
        (
            SizeField::WithoutBitmaps,
            document.header.size_without_bitmaps,
            header_size + (layout.end - layout.bitmap_section_end),
        ),
        (SizeField::Total, document.header.total_size, layout.end),
    ];

    for (field, declared, computed) in checks {
        if declared as i64 != computed as i64 {
            findings.push(Finding::SizeMismatch {
                field,
                declared,
                computed,
            });
        }
    }
}

struct Emitter {
    data: Vec<u8>,
    pos: usize,
    capacity: i32,
}

impl Emitter {
    fn overflow(&self, len: usize) -> EncodeError {
        EncodeError::BufferOverflow {
            required: (self.pos + len) as u64,
            capacity: self.capacity,
        }
    }

    fn int(&mut self, value: i32) -> Result<(), EncodeError> {
        write_i32_le(&mut self.data, value, self.pos).map_err(|_| self.overflow(4))?;
        self.pos += 4;
        Ok(())
    }

    fn ints(&mut self, values: &[i32]) -> Result<(), EncodeError> {
        values.iter().try_for_each(|&value| self.int(value))
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        write_bytes(&mut self.data, bytes, self.pos).map_err(|_| self.overflow(bytes.len()))?;
        self.pos += bytes.len();
        Ok(())
    }

    /// Buffer starts zeroed, so padding is a cursor move.
    fn skip(&mut self, len: u64) -> Result<(), EncodeError> {
        let len = len as usize;
        if self.pos + len > self.data.len() {
            return Err(self.overflow(len));
        }
        self.pos += len;
        Ok(())
    }

    fn write_headers(&mut self, document: &FormatDocument) -> Result<(), EncodeError> {
        let header = &document.header;
        self.int(header.signature)?;
        self.int(header.version.as_i32())?;
        self.ints(&header.params)?;
        self.int(header.animation_count)?;
        self.int(header.size_without_bitmaps)?;
        self.int(header.total_size)?;

        let gawi = &document.gawi;
        self.int(gawi.signature)?;
        self.int(gawi.version)?;
        self.int(gawi.bits_per_pixel)?;
        self.int(gawi.compressed)?;
        self.int(gawi.has_palette)?;
        self.ints(&gawi.params)?;
        self.int(gawi.bitmap_count)?;
        self.int(gawi.section_size)?;

        if let Some(palette) = &document.palette {
            self.int(palette.signature)?;
            self.int(palette.version)?;
            self.ints(&palette.params)?;
            self.int(palette.divided)?;
            self.int(palette.size)?;

            let bgr: Vec<u8> = palette
                .colours
                .iter()
                .flat_map(|&[r, g, b]| [b, g, r])
                .collect();
            self.bytes(&bgr)?;

            if let Some(range) = palette.main_range {
                self.int(range.start)?;
                self.int(range.end)?;
            }
        }

        Ok(())
    }

    fn write_bitmaps(
        &mut self,
        document: &FormatDocument,
        layout: &Layout,
        payloads: &[&[u8]],
    ) -> Result<(), EncodeError> {
        let offsets: Vec<i32> = layout.bitmap_offsets.iter().map(|&o| o as i32).collect();
        if document.gawi.is_compressed() {
            self.ints(&quirks::apply_compressed_skew(&offsets))?;
        } else {
            self.ints(&offsets)?;
        }

        for ((bitmap, pixels), &padding) in document
            .bitmaps
            .iter()
            .zip(payloads)
            .zip(&layout.bitmap_padding)
        {
            self.ints(&[
                bitmap.draw_count,
                bitmap.data_length,
                bitmap.width,
                bitmap.height,
                bitmap.param,
                bitmap.origin_x,
                bitmap.origin_y,
            ])?;
            self.bytes(pixels)?;
            self.skip(padding)?;
        }

        Ok(())
    }

    fn write_animations(
        &mut self,
        document: &FormatDocument,
        layout: &Layout,
        findings: &mut Vec<Finding>,
    ) -> Result<(), EncodeError> {
        let offsets: Vec<i32> = layout.animation_offsets.iter().map(|&o| o as i32).collect();
        self.ints(&offsets)?;

        for (a, ((animation, frame_offsets), &padding)) in document
            .animations
            .iter()
            .zip(&layout.frame_offsets)
            .zip(&layout.animation_padding)
            .enumerate()
        {
            let name = encode_name(&animation.name);
            if name.truncated() {
                findings.push(Finding::NameTruncated {
                    animation: a,
                    length: name.full_length,
                });
            }
            if name.unmappable {
                findings.push(Finding::NameUnmappable { animation: a });
            }
            self.bytes(&name.bytes)?;
            self.int(animation.frame_count)?;

            let frame_offsets: Vec<i32> = frame_offsets.iter().map(|&o| o as i32).collect();
            self.ints(&frame_offsets)?;

            for frame in &animation.frames {
                self.int(frame.delay)?;
                self.int(frame.plane_count)?;
                for plane in &frame.planes {
                    self.ints(&[
                        plane.bitmap_id,
                        plane.point_x,
                        plane.point_y,
                        plane.opacity,
                        plane.flip_axis,
                        plane.blend_mode,
                        plane.flag_param,
                    ])?;
                }
                self.bytes(&frame.padding)?;
            }
            self.skip(padding)?;
        }

        Ok(())
    }
}
