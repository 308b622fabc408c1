//! NORI sprite format handling
//!
//! This module provides functionality for decoding and re-encoding NORI
//! sprite/animation files. A NORI file carries a header, a GAWI bitmap
//! container (optionally paletted), the packed bitmaps themselves and a tree
//! of animations, frames and planes that place those bitmaps.
//!
//! Files produced by the original authoring tool are frequently inconsistent
//! (zeroed size fields, skewed offset tables, bogus draw counts). The decoder
//! repairs the known defects and reports each one as a [`Finding`] instead of
//! failing; see [`quirks`] for the rule set.

use std::fmt;

use thiserror::Error;

pub mod model;
pub mod parser;
pub mod quirks;
pub mod renderer;
pub mod writer;

#[cfg(test)]
mod tests;

// Re-exports
pub use model::*;
pub use parser::{decode, Decoded};
pub use quirks::Quirk;
pub use writer::{encode, Encoded, PixelSource};

/// "NORI" read as a little-endian i32
pub const NORI_SIGNATURE: i32 = 1_230_131_022;

/// "GAWI" read as a little-endian i32
pub const GAWI_SIGNATURE: i32 = 1_230_455_111;
pub const GAWI_VERSION: i32 = 300;

/// "PAL_" read as a little-endian i32
pub const PALETTE_SIGNATURE: i32 = 1_598_832_976;
pub const PALETTE_VERSION: i32 = 100;

pub const HEADER_SIZE: usize = 40;
pub const GAWI_HEADER_SIZE: usize = 44;
pub const PALETTE_HEADER_SIZE: usize = 32;

/// 256 colours, 3 bytes each
pub const PALETTE_DATA_SIZE: i32 = 768;
/// Declared size when a main range pair follows the colours
pub const PALETTE_SIZE_WITH_MAIN_RANGE: i32 = 808;
pub const PALETTE_COLOURS: usize = 256;

/// Colour forced into palette slot 0 (RGB)
pub const TRANSPARENT_KEY: [u8; 3] = [255, 0, 255];

/// dcount, dlen, w, h, param, x, y
pub const BITMAP_SPEC_SIZE: usize = 28;
/// bmp_id, point_x, point_y, opacity, flip_axis, blend_mode, flag_param
pub const PLANE_SIZE: usize = 28;
pub const ANIMATION_NAME_SIZE: usize = 32;
pub const FRAME_HEADER_SIZE: usize = 8;

/// Per-index skew of bitmap offsets in compressed GAWI sections
pub const COMPRESSED_OFFSET_SKEW: i32 = 28;

/// Identifies one of the three signed sections of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Nori,
    Gawi,
    Palette,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Nori => write!(f, "NORI"),
            Section::Gawi => write!(f, "GAWI"),
            Section::Palette => write!(f, "PAL_"),
        }
    }
}

/// Position of a plane inside the animation tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLocation {
    pub animation: usize,
    pub frame: usize,
    pub plane: usize,
}

impl fmt::Display for PlaneLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "animation {} frame {} plane {}",
            self.animation, self.frame, self.plane
        )
    }
}

/// Error type for decoding NORI files
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{section} signature mismatch: expected {expected}, found {found}")]
    BadSignature {
        section: Section,
        expected: i32,
        found: i32,
    },

    #[error("unsupported NORI version {0}")]
    UnsupportedVersion(i32),

    #[error("{section} version mismatch: expected {expected}, found {found}")]
    BadVersion {
        section: Section,
        expected: i32,
        found: i32,
    },

    #[error("unexpected end of input reading {field} at offset {offset}")]
    Truncated { field: &'static str, offset: u64 },

    #[error("cannot seek to offset {target}, input is {len} bytes")]
    SeekOutOfBounds { target: i64, len: u64 },

    #[error("{kind} offset after record {index} points to {target}, before its table's data at {base}")]
    OffsetBeforeBase {
        kind: OffsetKind,
        index: usize,
        target: i64,
        base: u64,
    },

    #[error("invalid {field} {value} at offset {offset}")]
    InvalidCount {
        field: &'static str,
        value: i32,
        offset: u64,
    },

    #[error("{location} references bitmap {bitmap_id}, but the file has {bitmap_count} bitmaps")]
    DanglingReference {
        location: PlaneLocation,
        bitmap_id: i32,
        bitmap_count: usize,
    },
}

impl DecodeError {
    /// Bad magic or version, as opposed to a bounds problem
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DecodeError::BadSignature { .. }
                | DecodeError::UnsupportedVersion(_)
                | DecodeError::BadVersion { .. }
        )
    }
}

/// Error type for encoding NORI files
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("content needs {required} bytes but the declared file size is {capacity}")]
    BufferOverflow { required: u64, capacity: i32 },

    #[error("{location} references bitmap {bitmap_id}, but the document has {bitmap_count} bitmaps")]
    DanglingReference {
        location: PlaneLocation,
        bitmap_id: i32,
        bitmap_count: usize,
    },

    #[error("document failed validation: {}", join_findings(.0))]
    Invalid(Vec<Finding>),

    #[error("no pixel data supplied for bitmap {bitmap}")]
    MissingPixels { bitmap: usize },

    #[error("bitmap {bitmap} declares {expected} bytes of pixel data but {found} were supplied")]
    PixelLength {
        bitmap: usize,
        expected: i32,
        found: usize,
    },
}

fn join_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
