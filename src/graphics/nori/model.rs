//! Data structures for NORI sprite files
//!
//! A [`FormatDocument`] owns everything decoded from one file. Count fields
//! are kept alongside the sequences they describe so that a hand-edited
//! document can be checked with [`FormatDocument::validate`] before it is
//! written back out.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    quirks::Quirk, PlaneLocation, Section, ANIMATION_NAME_SIZE, BITMAP_SPEC_SIZE, GAWI_HEADER_SIZE,
    GAWI_SIGNATURE, GAWI_VERSION, HEADER_SIZE, NORI_SIGNATURE, PALETTE_COLOURS, PALETTE_DATA_SIZE,
    PALETTE_HEADER_SIZE, PALETTE_SIGNATURE, PALETTE_SIZE_WITH_MAIN_RANGE, PALETTE_VERSION,
};
use crate::config::hex_bytes;

/// Supported NORI format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum NoriVersion {
    V300,
    V301,
    V302,
    V303,
}

impl NoriVersion {
    /// Length of the opaque block that trails every frame
    pub fn extra_frame_bytes(self) -> usize {
        match self {
            NoriVersion::V300 => 224,
            NoriVersion::V301 => 228,
            NoriVersion::V302 => 348,
            NoriVersion::V303 => 352,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            NoriVersion::V300 => 300,
            NoriVersion::V301 => 301,
            NoriVersion::V302 => 302,
            NoriVersion::V303 => 303,
        }
    }
}

impl TryFrom<i32> for NoriVersion {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            300 => Ok(NoriVersion::V300),
            301 => Ok(NoriVersion::V301),
            302 => Ok(NoriVersion::V302),
            303 => Ok(NoriVersion::V303),
            other => Err(format!("unsupported NORI version {}", other)),
        }
    }
}

impl From<NoriVersion> for i32 {
    fn from(version: NoriVersion) -> Self {
        version.as_i32()
    }
}

impl fmt::Display for NoriVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Main container for NORI file data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDocument {
    pub header: Header,
    pub gawi: GawiSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Palette>,
    pub bitmaps: Vec<BitmapRecord>,
    pub animations: Vec<AnimationRecord>,
}

/// The 40 byte file header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub signature: i32,
    pub version: NoriVersion,
    /// Version-specific values, not interpreted
    pub params: [i32; 5],
    pub animation_count: i32,
    /// Declared file size minus the GAWI section
    pub size_without_bitmaps: i32,
    pub total_size: i32,
}

/// GAWI bitmap container header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GawiSection {
    pub signature: i32,
    pub version: i32,
    pub bits_per_pixel: i32,
    pub compressed: i32,
    pub has_palette: i32,
    pub params: [i32; 4],
    pub bitmap_count: i32,
    /// Bytes from the start of the GAWI header to the end of the last bitmap
    pub section_size: i32,
}

impl GawiSection {
    pub fn is_compressed(&self) -> bool {
        self.compressed == 1
    }

    pub fn has_palette(&self) -> bool {
        self.has_palette == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainRange {
    pub start: i32,
    pub end: i32,
}

/// 256 colour palette, held as RGB (stored BGR on disk)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub signature: i32,
    pub version: i32,
    pub params: [i32; 4],
    pub divided: i32,
    /// 768, or 808 when a main range follows the colours
    pub size: i32,
    pub colours: Vec<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_range: Option<MainRange>,
}

impl Palette {
    /// Bytes the palette occupies on disk, header included
    pub fn encoded_len(&self) -> usize {
        PALETTE_HEADER_SIZE
            + PALETTE_DATA_SIZE as usize
            + if self.main_range.is_some() { 8 } else { 0 }
    }
}

/// One bitmap of the GAWI catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapRecord {
    pub draw_count: i32,
    pub data_length: i32,
    pub width: i32,
    pub height: i32,
    pub param: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    /// Position actually reached while reading, relative to the end of the
    /// bitmap offset table
    pub offset: u32,
    /// Offset from the file's table, skew-corrected when compressed
    pub declared_offset: i32,
    /// Packed top-down pixels, `data_length` bytes
    #[serde(skip)]
    pub pixels: Vec<u8>,
}

impl BitmapRecord {
    pub fn encoded_len(&self) -> usize {
        BITMAP_SPEC_SIZE + self.data_length.max(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationRecord {
    pub name: String,
    pub frame_count: i32,
    /// Relative to the end of the animation offset table
    pub offset: u32,
    pub declared_offset: i32,
    pub frames: Vec<FrameRecord>,
}

impl AnimationRecord {
    pub fn encoded_len(&self) -> usize {
        ANIMATION_NAME_SIZE
            + 4
            + 4 * self.frames.len()
            + self.frames.iter().map(FrameRecord::encoded_len).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub delay: i32,
    pub plane_count: i32,
    /// Relative to the end of the animation's frame offset table
    pub offset: u32,
    pub declared_offset: i32,
    pub planes: Vec<PlaneRecord>,
    /// Version-sized trailer, kept verbatim
    #[serde(with = "hex_bytes")]
    pub padding: Vec<u8>,
}

impl FrameRecord {
    pub fn encoded_len(&self) -> usize {
        super::FRAME_HEADER_SIZE + super::PLANE_SIZE * self.planes.len() + self.padding.len()
    }
}

/// A single bitmap placement within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaneRecord {
    pub bitmap_id: i32,
    pub point_x: i32,
    pub point_y: i32,
    pub opacity: i32,
    pub flip_axis: i32,
    pub blend_mode: i32,
    pub flag_param: i32,
}

/// Which record sequence an offset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetKind {
    Bitmap,
    Animation,
    Frame { animation: usize },
}

impl fmt::Display for OffsetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetKind::Bitmap => write!(f, "bitmap"),
            OffsetKind::Animation => write!(f, "animation"),
            OffsetKind::Frame { animation } => write!(f, "animation {} frame", animation),
        }
    }
}

/// Count field checked against its sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountField {
    Bitmaps,
    Animations,
    Frames { animation: usize },
    Planes { animation: usize, frame: usize },
}

impl fmt::Display for CountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountField::Bitmaps => write!(f, "bitmap count"),
            CountField::Animations => write!(f, "animation count"),
            CountField::Frames { animation } => {
                write!(f, "frame count of animation {}", animation)
            }
            CountField::Planes { animation, frame } => write!(
                f,
                "plane count of animation {} frame {}",
                animation, frame
            ),
        }
    }
}

/// Declared size field compared against a computed layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    Total,
    Section,
    WithoutBitmaps,
}

impl fmt::Display for SizeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeField::Total => write!(f, "file size"),
            SizeField::Section => write!(f, "GAWI size"),
            SizeField::WithoutBitmaps => write!(f, "size without bitmaps"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Fatal,
}

/// Something noteworthy about a document. Fatal findings block encoding;
/// warnings are carried alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Quirk(Quirk),
    /// Read position moved to the declared offset of the next record
    OffsetResync {
        kind: OffsetKind,
        index: usize,
        from: u64,
        to: i64,
    },
    /// Declared offset disagrees with the position the record was read from
    OffsetMismatch {
        kind: OffsetKind,
        index: usize,
        declared: i32,
        observed: u32,
    },
    /// Name bytes would not survive a re-encode (trailing garbage)
    NamePadding { animation: usize },
    NameTruncated { animation: usize, length: usize },
    NameUnmappable { animation: usize },
    /// Bytes left over after the last animation; they are not kept
    TrailingData { offset: u64, length: u64 },
    SignatureMismatch {
        section: Section,
        expected: i32,
        found: i32,
    },
    VersionMismatch {
        section: Section,
        expected: i32,
        found: i32,
    },
    CountMismatch {
        field: CountField,
        declared: i32,
        actual: usize,
    },
    DanglingReference {
        location: PlaneLocation,
        bitmap_id: i32,
        bitmap_count: usize,
    },
    PaletteFlagMismatch { has_palette: i32, present: bool },
    PaletteColours { count: usize },
    PaletteMainRange { size: i32, has_main_range: bool },
    UnusualPaletteSize { size: i32 },
    NegativeDataLength { bitmap: usize, data_length: i32 },
    PaddingLength {
        animation: usize,
        frame: usize,
        expected: usize,
        found: usize,
    },
    PixelLength {
        bitmap: usize,
        expected: i32,
        found: usize,
    },
    SizeMismatch {
        field: SizeField,
        declared: i32,
        computed: u64,
    },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::Quirk(_)
            | Finding::OffsetResync { .. }
            | Finding::OffsetMismatch { .. }
            | Finding::NamePadding { .. }
            | Finding::NameTruncated { .. }
            | Finding::NameUnmappable { .. }
            | Finding::TrailingData { .. }
            | Finding::UnusualPaletteSize { .. }
            | Finding::PixelLength { .. }
            | Finding::SizeMismatch { .. } => Severity::Warning,
            Finding::SignatureMismatch { .. }
            | Finding::VersionMismatch { .. }
            | Finding::CountMismatch { .. }
            | Finding::DanglingReference { .. }
            | Finding::PaletteFlagMismatch { .. }
            | Finding::PaletteColours { .. }
            | Finding::PaletteMainRange { .. }
            | Finding::NegativeDataLength { .. }
            | Finding::PaddingLength { .. } => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<Quirk> for Finding {
    fn from(quirk: Quirk) -> Self {
        Finding::Quirk(quirk)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Quirk(quirk) => write!(f, "{}", quirk),
            Finding::OffsetResync {
                kind,
                index,
                from,
                to,
            } => write!(
                f,
                "{} {} ended at {}, resynced to declared offset {}",
                kind, index, from, to
            ),
            Finding::OffsetMismatch {
                kind,
                index,
                declared,
                observed,
            } => write!(
                f,
                "{} {} declared at offset {} but found at {}",
                kind, index, declared, observed
            ),
            Finding::NamePadding { animation } => write!(
                f,
                "animation {} name has bytes after its padding that will not be kept",
                animation
            ),
            Finding::NameTruncated { animation, length } => write!(
                f,
                "animation {} name is {} bytes, truncated to {}",
                animation, length, ANIMATION_NAME_SIZE
            ),
            Finding::NameUnmappable { animation } => write!(
                f,
                "animation {} name has characters outside EUC-KR",
                animation
            ),
            Finding::TrailingData { offset, length } => write!(
                f,
                "{} bytes after the last animation at offset {} are dropped",
                length, offset
            ),
            Finding::SignatureMismatch {
                section,
                expected,
                found,
            } => write!(
                f,
                "{} signature is {}, expected {}",
                section, found, expected
            ),
            Finding::VersionMismatch {
                section,
                expected,
                found,
            } => write!(f, "{} version is {}, expected {}", section, found, expected),
            Finding::CountMismatch {
                field,
                declared,
                actual,
            } => write!(f, "{} is {} but {} are present", field, declared, actual),
            Finding::DanglingReference {
                location,
                bitmap_id,
                bitmap_count,
            } => write!(
                f,
                "{} references bitmap {} of {}",
                location, bitmap_id, bitmap_count
            ),
            Finding::PaletteFlagMismatch {
                has_palette,
                present,
            } => write!(
                f,
                "hasPalette is {} but a palette is {}",
                has_palette,
                if *present { "present" } else { "missing" }
            ),
            Finding::PaletteColours { count } => write!(
                f,
                "palette has {} colours, expected {}",
                count, PALETTE_COLOURS
            ),
            Finding::PaletteMainRange {
                size,
                has_main_range,
            } => write!(
                f,
                "palette size {} {} a main range",
                size,
                if *has_main_range { "with" } else { "without" }
            ),
            Finding::UnusualPaletteSize { size } => write!(
                f,
                "palette size {} is neither {} nor {}",
                size, PALETTE_DATA_SIZE, PALETTE_SIZE_WITH_MAIN_RANGE
            ),
            Finding::NegativeDataLength {
                bitmap,
                data_length,
            } => write!(f, "bitmap {} has data length {}", bitmap, data_length),
            Finding::PaddingLength {
                animation,
                frame,
                expected,
                found,
            } => write!(
                f,
                "animation {} frame {} has {} trailing bytes, version requires {}",
                animation, frame, found, expected
            ),
            Finding::PixelLength {
                bitmap,
                expected,
                found,
            } => write!(
                f,
                "bitmap {} carries {} pixel bytes, data length is {}",
                bitmap, found, expected
            ),
            Finding::SizeMismatch {
                field,
                declared,
                computed,
            } => write!(
                f,
                "declared {} {} differs from laid out {}",
                field, declared, computed
            ),
        }
    }
}

impl FormatDocument {
    /// Absolute position of the first bitmap record
    pub fn bitmap_data_start(&self) -> usize {
        HEADER_SIZE
            + GAWI_HEADER_SIZE
            + self.palette.as_ref().map_or(0, Palette::encoded_len)
            + 4 * self.bitmaps.len()
    }

    pub fn extra_frame_bytes(&self) -> usize {
        self.header.version.extra_frame_bytes()
    }

    /// Checks the structural invariants without modifying anything.
    pub fn validate(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        self.validate_signatures(&mut findings);
        self.validate_palette(&mut findings);
        self.validate_bitmaps(&mut findings);
        self.validate_animations(&mut findings);

        findings
    }

    /// Fatal findings only
    pub fn fatal_findings(&self) -> Vec<Finding> {
        self.validate().into_iter().filter(Finding::is_fatal).collect()
    }

    fn validate_signatures(&self, findings: &mut Vec<Finding>) {
        let checks = [
            (Section::Nori, NORI_SIGNATURE, self.header.signature),
            (Section::Gawi, GAWI_SIGNATURE, self.gawi.signature),
        ];
        for (section, expected, found) in checks {
            if expected != found {
                findings.push(Finding::SignatureMismatch {
                    section,
                    expected,
                    found,
                });
            }
        }

        if self.gawi.version != GAWI_VERSION {
            findings.push(Finding::VersionMismatch {
                section: Section::Gawi,
                expected: GAWI_VERSION,
                found: self.gawi.version,
            });
        }
    }

    fn validate_palette(&self, findings: &mut Vec<Finding>) {
        if self.gawi.has_palette() != self.palette.is_some() {
            findings.push(Finding::PaletteFlagMismatch {
                has_palette: self.gawi.has_palette,
                present: self.palette.is_some(),
            });
        }

        let Some(palette) = &self.palette else {
            return;
        };

        if palette.signature != PALETTE_SIGNATURE {
            findings.push(Finding::SignatureMismatch {
                section: Section::Palette,
                expected: PALETTE_SIGNATURE,
                found: palette.signature,
            });
        }
        if palette.version != PALETTE_VERSION {
            findings.push(Finding::VersionMismatch {
                section: Section::Palette,
                expected: PALETTE_VERSION,
                found: palette.version,
            });
        }
        if palette.colours.len() != PALETTE_COLOURS {
            findings.push(Finding::PaletteColours {
                count: palette.colours.len(),
            });
        }

        let has_main_range = palette.main_range.is_some();
        match (palette.size, has_main_range) {
            (PALETTE_SIZE_WITH_MAIN_RANGE, true) | (PALETTE_DATA_SIZE, false) => {}
            (PALETTE_SIZE_WITH_MAIN_RANGE, false) | (_, true) => {
                findings.push(Finding::PaletteMainRange {
                    size: palette.size,
                    has_main_range,
                });
            }
            (size, false) => findings.push(Finding::UnusualPaletteSize { size }),
        }
    }

    fn validate_bitmaps(&self, findings: &mut Vec<Finding>) {
        if self.gawi.bitmap_count as i64 != self.bitmaps.len() as i64 {
            findings.push(Finding::CountMismatch {
                field: CountField::Bitmaps,
                declared: self.gawi.bitmap_count,
                actual: self.bitmaps.len(),
            });
        }

        for (i, bitmap) in self.bitmaps.iter().enumerate() {
            if let Some(quirk) = super::quirks::check_draw_count(i, bitmap.draw_count) {
                findings.push(quirk.into());
            }
            if bitmap.data_length < 0 {
                findings.push(Finding::NegativeDataLength {
                    bitmap: i,
                    data_length: bitmap.data_length,
                });
            } else if !bitmap.pixels.is_empty()
                && bitmap.pixels.len() != bitmap.data_length as usize
            {
                findings.push(Finding::PixelLength {
                    bitmap: i,
                    expected: bitmap.data_length,
                    found: bitmap.pixels.len(),
                });
            }
        }
    }

    fn validate_animations(&self, findings: &mut Vec<Finding>) {
        if self.header.animation_count as i64 != self.animations.len() as i64 {
            findings.push(Finding::CountMismatch {
                field: CountField::Animations,
                declared: self.header.animation_count,
                actual: self.animations.len(),
            });
        }

        let extra = self.extra_frame_bytes();
        for (a, animation) in self.animations.iter().enumerate() {
            if animation.frame_count as i64 != animation.frames.len() as i64 {
                findings.push(Finding::CountMismatch {
                    field: CountField::Frames { animation: a },
                    declared: animation.frame_count,
                    actual: animation.frames.len(),
                });
            }

            for (f, frame) in animation.frames.iter().enumerate() {
                if frame.plane_count as i64 != frame.planes.len() as i64 {
                    findings.push(Finding::CountMismatch {
                        field: CountField::Planes {
                            animation: a,
                            frame: f,
                        },
                        declared: frame.plane_count,
                        actual: frame.planes.len(),
                    });
                }
                if frame.padding.len() != extra {
                    findings.push(Finding::PaddingLength {
                        animation: a,
                        frame: f,
                        expected: extra,
                        found: frame.padding.len(),
                    });
                }

                for (p, plane) in frame.planes.iter().enumerate() {
                    if !bitmap_in_range(plane.bitmap_id, self.bitmaps.len()) {
                        findings.push(Finding::DanglingReference {
                            location: PlaneLocation {
                                animation: a,
                                frame: f,
                                plane: p,
                            },
                            bitmap_id: plane.bitmap_id,
                            bitmap_count: self.bitmaps.len(),
                        });
                    }
                }
            }
        }
    }
}

pub fn bitmap_in_range(bitmap_id: i32, bitmap_count: usize) -> bool {
    bitmap_id >= 0 && (bitmap_id as usize) < bitmap_count
}

/// Decodes a fixed-width EUC-KR name field, trimming NUL padding and
/// surrounding whitespace.
pub fn decode_name(raw: &[u8]) -> String {
    let (text, _) = encoding_rs::EUC_KR.decode_without_bom_handling(raw);
    text.trim_matches(|c: char| c <= ' ').to_string()
}

/// Encoded name field plus whether it had to be truncated or had
/// characters EUC-KR cannot represent.
pub struct EncodedName {
    pub bytes: [u8; ANIMATION_NAME_SIZE],
    pub full_length: usize,
    pub unmappable: bool,
}

impl EncodedName {
    pub fn truncated(&self) -> bool {
        self.full_length > ANIMATION_NAME_SIZE
    }
}

pub fn encode_name(name: &str) -> EncodedName {
    let (encoded, _, unmappable) = encoding_rs::EUC_KR.encode(name);
    let mut bytes = [0u8; ANIMATION_NAME_SIZE];
    let len = encoded.len().min(ANIMATION_NAME_SIZE);
    bytes[..len].copy_from_slice(&encoded[..len]);
    EncodedName {
        bytes,
        full_length: encoded.len(),
        unmappable,
    }
}
