//! Parser for the NORI sprite format
//!
//! Reads a whole file from memory in one forward pass. The only backward
//! (or forward) jumps happen when a trusted offset table disagrees with the
//! position reached after a record, see [`OffsetTable`].

use std::io::Cursor;

use tracing::{debug, warn};

use crate::binary_utils::{read_bytes, read_i32_le, remaining, seek_to};

use super::{
    model::{
        bitmap_in_range, decode_name, encode_name, AnimationRecord, BitmapRecord, Finding,
        FormatDocument, FrameRecord, GawiSection, Header, MainRange, NoriVersion, OffsetKind,
        Palette, PlaneRecord, SizeField,
    },
    quirks::{self, OffsetTable},
    DecodeError, PlaneLocation, Section, ANIMATION_NAME_SIZE, GAWI_SIGNATURE, GAWI_VERSION,
    NORI_SIGNATURE, PALETTE_COLOURS, PALETTE_DATA_SIZE, PALETTE_SIGNATURE,
    PALETTE_SIZE_WITH_MAIN_RANGE, PALETTE_VERSION,
};

/// A decoded document together with the non-fatal findings collected on
/// the way (repaired quirks, offset resyncs).
#[derive(Debug, Clone)]
pub struct Decoded {
    pub document: FormatDocument,
    pub findings: Vec<Finding>,
}

/// Main entry point for decoding NORI files
pub fn decode(data: &[u8]) -> Result<Decoded, DecodeError> {
    let mut parser = Parser {
        cursor: Cursor::new(data),
        findings: Vec::new(),
    };
    let document = parser.parse()?;

    for finding in &parser.findings {
        warn!("{}", finding);
    }

    Ok(Decoded {
        document,
        findings: parser.findings,
    })
}

struct Parser<'a> {
    cursor: Cursor<&'a [u8]>,
    findings: Vec<Finding>,
}

impl<'a> Parser<'a> {
    fn parse(&mut self) -> Result<FormatDocument, DecodeError> {
        let mut header = self.read_header()?;

        let input_len = self.input_len();
        if let Some(quirk) = quirks::repair_total_size(&mut header.total_size, input_len) {
            self.findings.push(quirk.into());
        }

        let gawi_start = self.cursor.position();
        let mut gawi = self.read_gawi_header()?;

        let palette = if gawi.has_palette() {
            Some(self.read_palette()?)
        } else {
            None
        };

        let bitmap_count = self.count(gawi.bitmap_count, "bitmap count")?;
        let bitmap_table = self.read_offset_table(bitmap_count, "bitmap offset")?;
        let bitmap_table = if gawi.is_compressed() {
            debug!("Compressed GAWI, adding {} bytes per bitmap index", super::COMPRESSED_OFFSET_SKEW);
            OffsetTable::new(quirks::correct_compressed_offsets(&bitmap_table))
        } else {
            OffsetTable::new(bitmap_table)
        };

        let bitmaps = self.read_bitmaps(&bitmap_table, gawi.bits_per_pixel)?;
        let gawi_end = self.cursor.position();

        if let Some(quirk) =
            quirks::repair_section_size(&mut gawi.section_size, gawi_start, gawi_end)
        {
            self.findings.push(quirk.into());
        }
        let trailing = remaining(&self.cursor);
        if let Some(quirk) =
            quirks::repair_size_without_bitmaps(&mut header.size_without_bitmaps, trailing)
        {
            self.findings.push(quirk.into());
        }

        let animation_count = self.count(header.animation_count, "animation count")?;
        let animation_table = OffsetTable::new(
            self.read_offset_table(animation_count, "animation offset")?,
        );
        let animations =
            self.read_animations(&animation_table, header.version.extra_frame_bytes())?;

        let end = self.cursor.position();
        if end < input_len as u64 {
            self.findings.push(Finding::TrailingData {
                offset: end,
                length: input_len as u64 - end,
            });
        }
        if header.total_size as i64 != input_len as i64 {
            self.findings.push(Finding::SizeMismatch {
                field: SizeField::Total,
                declared: header.total_size,
                computed: input_len as u64,
            });
        }

        check_references(&animations, bitmaps.len())?;

        Ok(FormatDocument {
            header,
            gawi,
            palette,
            bitmaps,
            animations,
        })
    }

    fn input_len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    fn int(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        let offset = self.cursor.position();
        read_i32_le(&mut self.cursor).map_err(|_| DecodeError::Truncated { field, offset })
    }

    fn bytes(&mut self, length: usize, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let offset = self.cursor.position();
        read_bytes(&mut self.cursor, length).map_err(|_| DecodeError::Truncated { field, offset })
    }

    fn seek(&mut self, target: i64) -> Result<(), DecodeError> {
        let len = self.input_len() as u64;
        if target < 0 {
            return Err(DecodeError::SeekOutOfBounds { target, len });
        }
        seek_to(&mut self.cursor, target as u64)
            .map_err(|_| DecodeError::SeekOutOfBounds { target, len })
    }

    /// Counts and lengths are signed on disk; negative values cannot be
    /// honoured.
    fn count(&self, value: i32, field: &'static str) -> Result<usize, DecodeError> {
        usize::try_from(value).map_err(|_| DecodeError::InvalidCount {
            field,
            value,
            offset: self.cursor.position(),
        })
    }

    fn read_header(&mut self) -> Result<Header, DecodeError> {
        let signature = self.int("NORI signature")?;
        if signature != NORI_SIGNATURE {
            return Err(DecodeError::BadSignature {
                section: Section::Nori,
                expected: NORI_SIGNATURE,
                found: signature,
            });
        }

        let raw_version = self.int("NORI version")?;
        let version = NoriVersion::try_from(raw_version)
            .map_err(|_| DecodeError::UnsupportedVersion(raw_version))?;

        let mut params = [0i32; 5];
        for param in &mut params {
            *param = self.int("NORI param")?;
        }

        let header = Header {
            signature,
            version,
            params,
            animation_count: self.int("animation count")?,
            size_without_bitmaps: self.int("size without bitmaps")?,
            total_size: self.int("file size")?,
        };

        debug!(
            "NORI v{}: {} animations, size w/o GAWI {}, file size {}",
            header.version, header.animation_count, header.size_without_bitmaps, header.total_size
        );

        Ok(header)
    }

    fn read_gawi_header(&mut self) -> Result<GawiSection, DecodeError> {
        let signature = self.int("GAWI signature")?;
        if signature != GAWI_SIGNATURE {
            return Err(DecodeError::BadSignature {
                section: Section::Gawi,
                expected: GAWI_SIGNATURE,
                found: signature,
            });
        }

        let version = self.int("GAWI version")?;
        if version != GAWI_VERSION {
            return Err(DecodeError::BadVersion {
                section: Section::Gawi,
                expected: GAWI_VERSION,
                found: version,
            });
        }

        let bits_per_pixel = self.int("bits per pixel")?;
        let compressed = self.int("compressed flag")?;
        let has_palette = self.int("palette flag")?;
        let mut params = [0i32; 4];
        for param in &mut params {
            *param = self.int("GAWI param")?;
        }

        let gawi = GawiSection {
            signature,
            version,
            bits_per_pixel,
            compressed,
            has_palette,
            params,
            bitmap_count: self.int("bitmap count")?,
            section_size: self.int("GAWI size")?,
        };

        debug!(
            "GAWI: {} bpp, compressed {}, palette {}, {} images, size {}",
            gawi.bits_per_pixel,
            gawi.is_compressed(),
            gawi.has_palette(),
            gawi.bitmap_count,
            gawi.section_size
        );

        Ok(gawi)
    }

    fn read_palette(&mut self) -> Result<Palette, DecodeError> {
        let signature = self.int("palette signature")?;
        if signature != PALETTE_SIGNATURE {
            return Err(DecodeError::BadSignature {
                section: Section::Palette,
                expected: PALETTE_SIGNATURE,
                found: signature,
            });
        }

        let version = self.int("palette version")?;
        if version != PALETTE_VERSION {
            return Err(DecodeError::BadVersion {
                section: Section::Palette,
                expected: PALETTE_VERSION,
                found: version,
            });
        }

        let mut params = [0i32; 4];
        for param in &mut params {
            *param = self.int("palette param")?;
        }
        let divided = self.int("palette divided flag")?;
        let size = self.int("palette size")?;

        // Stored BGR
        let raw = self.bytes(PALETTE_DATA_SIZE as usize, "palette colours")?;
        let mut colours: Vec<[u8; 3]> = raw
            .chunks_exact(3)
            .map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect();
        debug_assert_eq!(colours.len(), PALETTE_COLOURS);

        if let Some(quirk) = quirks::force_transparent_key(&mut colours) {
            self.findings.push(quirk.into());
        }

        let main_range = if size == PALETTE_SIZE_WITH_MAIN_RANGE {
            Some(MainRange {
                start: self.int("palette main range start")?,
                end: self.int("palette main range end")?,
            })
        } else {
            if size != PALETTE_DATA_SIZE {
                self.findings.push(Finding::UnusualPaletteSize { size });
            }
            None
        };

        debug!("Palette: size {}, divided {}", size, divided);

        Ok(Palette {
            signature,
            version,
            params,
            divided,
            size,
            colours,
            main_range,
        })
    }

    fn read_offset_table(
        &mut self,
        count: usize,
        field: &'static str,
    ) -> Result<Vec<i32>, DecodeError> {
        // Guard the allocation against absurd counts
        if count as u64 * 4 > remaining(&self.cursor) {
            return Err(DecodeError::Truncated {
                field,
                offset: self.cursor.position(),
            });
        }

        (0..count).map(|_| self.int(field)).collect()
    }

    /// Walks the bitmap section once, recording where each record actually
    /// starts.
    fn read_bitmaps(
        &mut self,
        table: &OffsetTable,
        bits_per_pixel: i32,
    ) -> Result<Vec<BitmapRecord>, DecodeError> {
        let base = self.cursor.position();
        let mut bitmaps = Vec::with_capacity(table.len());

        for i in 0..table.len() {
            let observed = (self.cursor.position() - base) as u32;
            let declared = table.declared(i);
            if declared as i64 != observed as i64 {
                self.findings.push(Finding::OffsetMismatch {
                    kind: OffsetKind::Bitmap,
                    index: i,
                    declared,
                    observed,
                });
            }

            let draw_count = self.int("draw count")?;
            let data_length = self.int("data length")?;
            let width = self.int("bitmap width")?;
            let height = self.int("bitmap height")?;
            let param = self.int("bitmap param")?;
            let origin_x = self.int("bitmap x")?;
            let origin_y = self.int("bitmap y")?;

            let length = self.count(data_length, "data length")?;
            let pixels = self.bytes(length, "bitmap pixels")?;

            if let Some(quirk) = quirks::check_draw_count(i, draw_count) {
                self.findings.push(quirk.into());
            }

            debug!(
                "Bitmap {}: {}x{} @ {} bpp, {} bytes at offset {}",
                i, width, height, bits_per_pixel, data_length, observed
            );

            bitmaps.push(BitmapRecord {
                draw_count,
                data_length,
                width,
                height,
                param,
                origin_x,
                origin_y,
                offset: observed,
                declared_offset: declared,
                pixels,
            });

            self.resync(table, i, base, OffsetKind::Bitmap)?;
        }

        Ok(bitmaps)
    }

    fn resync(
        &mut self,
        table: &OffsetTable,
        index: usize,
        base: u64,
        kind: OffsetKind,
    ) -> Result<(), DecodeError> {
        let current = self.cursor.position();
        if let Some(target) = table.resync_target(index, base, current) {
            if target < base as i64 {
                return Err(DecodeError::OffsetBeforeBase {
                    kind,
                    index,
                    target,
                    base,
                });
            }
            self.seek(target)?;
            self.findings.push(Finding::OffsetResync {
                kind,
                index,
                from: current,
                to: target,
            });
        }
        Ok(())
    }

    fn read_animations(
        &mut self,
        table: &OffsetTable,
        extra_frame_bytes: usize,
    ) -> Result<Vec<AnimationRecord>, DecodeError> {
        let base = self.cursor.position();
        let mut animations = Vec::with_capacity(table.len());

        for i in 0..table.len() {
            let observed = (self.cursor.position() - base) as u32;
            let declared = table.declared(i);
            if declared as i64 != observed as i64 {
                self.findings.push(Finding::OffsetMismatch {
                    kind: OffsetKind::Animation,
                    index: i,
                    declared,
                    observed,
                });
            }

            let raw_name = self.bytes(ANIMATION_NAME_SIZE, "animation name")?;
            let name = decode_name(&raw_name);
            if encode_name(&name).bytes[..] != raw_name[..] {
                self.findings.push(Finding::NamePadding { animation: i });
            }

            let frame_count = self.int("frame count")?;
            let frames_len = self.count(frame_count, "frame count")?;
            let frame_table = self.read_offset_table(frames_len, "frame offset")?;
            let frames = self.read_frames(i, &frame_table, extra_frame_bytes)?;

            debug!("Animation {} '{}': {} frames", i, name, frame_count);

            animations.push(AnimationRecord {
                name,
                frame_count,
                offset: observed,
                declared_offset: declared,
                frames,
            });

            self.resync(table, i, base, OffsetKind::Animation)?;
        }

        Ok(animations)
    }

    fn read_frames(
        &mut self,
        animation: usize,
        frame_table: &[i32],
        extra_frame_bytes: usize,
    ) -> Result<Vec<FrameRecord>, DecodeError> {
        let base = self.cursor.position();
        let mut frames = Vec::with_capacity(frame_table.len());

        for (f, &declared) in frame_table.iter().enumerate() {
            let observed = (self.cursor.position() - base) as u32;
            if declared as i64 != observed as i64 {
                self.findings.push(Finding::OffsetMismatch {
                    kind: OffsetKind::Frame { animation },
                    index: f,
                    declared,
                    observed,
                });
            }

            let delay = self.int("frame delay")?;
            let plane_count = self.int("plane count")?;
            let planes_len = self.count(plane_count, "plane count")?;
            if planes_len as u64 * super::PLANE_SIZE as u64 > remaining(&self.cursor) {
                return Err(DecodeError::Truncated {
                    field: "planes",
                    offset: self.cursor.position(),
                });
            }

            let mut planes = Vec::with_capacity(planes_len);
            for _ in 0..planes_len {
                planes.push(PlaneRecord {
                    bitmap_id: self.int("plane bitmap id")?,
                    point_x: self.int("plane x")?,
                    point_y: self.int("plane y")?,
                    opacity: self.int("plane opacity")?,
                    flip_axis: self.int("plane flip axis")?,
                    blend_mode: self.int("plane blend mode")?,
                    flag_param: self.int("plane flag param")?,
                });
            }

            let padding = self.bytes(extra_frame_bytes, "extra frame bytes")?;

            frames.push(FrameRecord {
                delay,
                plane_count,
                offset: observed,
                declared_offset: declared,
                planes,
                padding,
            });
        }

        Ok(frames)
    }
}

fn check_references(animations: &[AnimationRecord], bitmap_count: usize) -> Result<(), DecodeError> {
    for (a, animation) in animations.iter().enumerate() {
        for (f, frame) in animation.frames.iter().enumerate() {
            for (p, plane) in frame.planes.iter().enumerate() {
                if !bitmap_in_range(plane.bitmap_id, bitmap_count) {
                    return Err(DecodeError::DanglingReference {
                        location: PlaneLocation {
                            animation: a,
                            frame: f,
                            plane: p,
                        },
                        bitmap_id: plane.bitmap_id,
                        bitmap_count,
                    });
                }
            }
        }
    }
    Ok(())
}
