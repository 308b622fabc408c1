//! Repair rules for defects left by the original authoring tool
//!
//! Every rule is a pure function of fields that have already been parsed.
//! The decoder applies them to normalise a file; the writer applies the
//! inverse where one exists so that a repaired document still serialises
//! to the layout the game loader expects.
//!
//! | Rule                      | Trigger                  | Repair                              |
//! |---------------------------|--------------------------|-------------------------------------|
//! | zero total size           | header total size == 0   | use the input length                |
//! | compressed offset skew    | GAWI compressed == 1     | bitmap offset += 28 * index         |
//! | zero section size         | GAWI section size == 0   | observed end - section start        |
//! | zero size-without-bitmaps | header field == 0        | 40 + bytes after the bitmap section |
//! | non-unit draw count       | draw count != 1          | pad on encode, flag for manual fix  |
//! | palette transparency key  | always                   | palette entry 0 := (255, 0, 255)    |

use std::fmt;

use super::{COMPRESSED_OFFSET_SKEW, HEADER_SIZE, TRANSPARENT_KEY};

/// A repaired (or flagged) authoring defect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// Header total size was 0 and has been replaced by the input length
    ZeroTotalSize { actual: i32 },
    /// GAWI section size was 0 and has been recomputed from the layout
    ZeroSectionSize { recomputed: i32 },
    /// Header size-without-bitmaps was 0 and has been recomputed
    ZeroSizeWithoutBitmaps { recomputed: i32 },
    /// Draw count other than 1; header sizes and offsets need a manual fix
    NonUnitDrawCount { bitmap: usize, draw_count: i32 },
    /// Palette slot 0 held a colour other than the transparency key
    PaletteKeyForced { original: [u8; 3] },
}

impl fmt::Display for Quirk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quirk::ZeroTotalSize { actual } => {
                write!(f, "file size was 0, using input length {}", actual)
            }
            Quirk::ZeroSectionSize { recomputed } => {
                write!(f, "GAWI size was 0, recomputed as {}", recomputed)
            }
            Quirk::ZeroSizeWithoutBitmaps { recomputed } => write!(
                f,
                "size without bitmaps was 0, recomputed as {}",
                recomputed
            ),
            Quirk::NonUnitDrawCount { bitmap, draw_count } => write!(
                f,
                "bitmap {} has draw count {}; fix file size, GAWI size, bitmap offsets and draw count by hand",
                bitmap, draw_count
            ),
            Quirk::PaletteKeyForced { original } => write!(
                f,
                "palette entry 0 was ({}, {}, {}), forced to the transparency key",
                original[0], original[1], original[2]
            ),
        }
    }
}

pub fn repair_total_size(total_size: &mut i32, input_len: usize) -> Option<Quirk> {
    if *total_size != 0 {
        return None;
    }
    *total_size = input_len as i32;
    Some(Quirk::ZeroTotalSize {
        actual: *total_size,
    })
}

/// Section start is the absolute position of the GAWI header, end is the
/// position reached after the last bitmap.
pub fn repair_section_size(section_size: &mut i32, start: u64, end: u64) -> Option<Quirk> {
    if *section_size != 0 {
        return None;
    }
    *section_size = end.saturating_sub(start) as i32;
    Some(Quirk::ZeroSectionSize {
        recomputed: *section_size,
    })
}

/// `trailing` counts the bytes left in the input after the bitmap section.
pub fn repair_size_without_bitmaps(size: &mut i32, trailing: u64) -> Option<Quirk> {
    if *size != 0 {
        return None;
    }
    *size = (HEADER_SIZE as u64 + trailing) as i32;
    Some(Quirk::ZeroSizeWithoutBitmaps { recomputed: *size })
}

pub fn check_draw_count(bitmap: usize, draw_count: i32) -> Option<Quirk> {
    (draw_count != 1).then_some(Quirk::NonUnitDrawCount { bitmap, draw_count })
}

/// Overwrites slot 0 with the transparency key, returning the old colour
/// when it differed.
pub fn force_transparent_key(colours: &mut [[u8; 3]]) -> Option<Quirk> {
    let first = colours.first_mut()?;
    let original = *first;
    *first = TRANSPARENT_KEY;
    (original != TRANSPARENT_KEY).then_some(Quirk::PaletteKeyForced { original })
}

/// Compressed sections store bitmap offsets without the 28 byte headers of
/// the preceding bitmaps.
pub fn correct_compressed_offsets(declared: &[i32]) -> Vec<i32> {
    declared
        .iter()
        .enumerate()
        .map(|(i, &offset)| offset.wrapping_add(COMPRESSED_OFFSET_SKEW.wrapping_mul(i as i32)))
        .collect()
}

/// Inverse of [`correct_compressed_offsets`].
pub fn apply_compressed_skew(offsets: &[i32]) -> Vec<i32> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &offset)| offset.wrapping_sub(COMPRESSED_OFFSET_SKEW.wrapping_mul(i as i32)))
        .collect()
}

/// Zero bytes needed after a record so the next one starts at `target`.
/// `None` when no padding is needed or the target lies behind the cursor.
pub fn gap_padding(cursor: u64, target: i64) -> Option<u64> {
    (target > cursor as i64).then(|| (target - cursor as i64) as u64)
}

/// A declared offset table with the zero terminator slot appended.
///
/// The table is only used to resynchronise the read position when its last
/// entry lies beyond its first. This is a heuristic for "the table looks
/// trustworthy", kept because files in the wild depend on it; it does not
/// prove the intermediate entries are sane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    entries: Vec<i32>,
    trusted: bool,
}

impl OffsetTable {
    pub fn new(mut declared: Vec<i32>) -> Self {
        let trusted = match (declared.first(), declared.last()) {
            (Some(&first), Some(&last)) => (last as i64) - (first as i64) > 0,
            _ => false,
        };
        declared.push(0);
        OffsetTable {
            entries: declared,
            trusted,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// Declared entry for record `index`; the terminator slot reads as 0.
    pub fn declared(&self, index: usize) -> i32 {
        self.entries.get(index).copied().unwrap_or(0)
    }

    /// Number of real entries, excluding the terminator
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute position the stream should move to after record `index`,
    /// when the table disagrees with `current`.
    pub fn resync_target(&self, index: usize, base: u64, current: u64) -> Option<i64> {
        if !self.trusted {
            return None;
        }

        let next = self.declared(index + 1);
        if next == 0 {
            return None;
        }

        let target = base as i64 + next as i64;
        (target != current as i64).then_some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_offsets_add_skew_per_index() {
        assert_eq!(
            correct_compressed_offsets(&[100, 50, 75]),
            vec![100, 78, 131]
        );
    }

    #[test]
    fn test_compressed_skew_inverts_correction() {
        let declared = [0, 120, 4000, 9];
        let corrected = correct_compressed_offsets(&declared);
        assert_eq!(apply_compressed_skew(&corrected), declared.to_vec());
    }

    #[test]
    fn test_zero_total_size_uses_input_length() {
        let mut size = 0;
        assert_eq!(
            repair_total_size(&mut size, 1234),
            Some(Quirk::ZeroTotalSize { actual: 1234 })
        );
        assert_eq!(size, 1234);

        let mut size = 99;
        assert_eq!(repair_total_size(&mut size, 1234), None);
        assert_eq!(size, 99);
    }

    #[test]
    fn test_section_sizes() {
        let mut size = 0;
        assert_eq!(
            repair_section_size(&mut size, 40, 300),
            Some(Quirk::ZeroSectionSize { recomputed: 260 })
        );
        assert_eq!(size, 260);

        let mut size = 5;
        assert_eq!(repair_section_size(&mut size, 40, 300), None);
        assert_eq!(size, 5);

        let mut size = 0;
        assert_eq!(
            repair_size_without_bitmaps(&mut size, 500),
            Some(Quirk::ZeroSizeWithoutBitmaps { recomputed: 540 })
        );
        assert_eq!(size, 540);

        let mut size = 7;
        assert_eq!(repair_size_without_bitmaps(&mut size, 500), None);
    }

    #[test]
    fn test_draw_count() {
        assert_eq!(check_draw_count(0, 1), None);
        assert_eq!(
            check_draw_count(3, 2),
            Some(Quirk::NonUnitDrawCount {
                bitmap: 3,
                draw_count: 2
            })
        );
        assert_eq!(gap_padding(100, 140), Some(40));
        assert_eq!(gap_padding(100, 100), None);
        assert_eq!(gap_padding(100, 60), None);
    }

    #[test]
    fn test_transparent_key_forced() {
        let mut colours = vec![[1, 2, 3], [4, 5, 6]];
        assert_eq!(
            force_transparent_key(&mut colours),
            Some(Quirk::PaletteKeyForced { original: [1, 2, 3] })
        );
        assert_eq!(colours[0], TRANSPARENT_KEY);
        assert_eq!(colours[1], [4, 5, 6]);

        // Already keyed: substitution still happens but is not reported
        assert_eq!(force_transparent_key(&mut colours), None);
        assert_eq!(force_transparent_key(&mut []), None);
    }

    #[test]
    fn test_offset_table_trust_heuristic() {
        // Forward progress between first and last entry
        let table = OffsetTable::new(vec![0, 40, 90]);
        assert!(table.is_trusted());
        assert_eq!(table.declared(3), 0);
        assert_eq!(table.len(), 3);
        assert_eq!(table.resync_target(0, 100, 140), None);
        assert_eq!(table.resync_target(0, 100, 136), Some(140));
        // Terminator slot never resyncs
        assert_eq!(table.resync_target(2, 100, 7), None);

        // Known approximation: a table with garbage in the middle is still
        // trusted as long as it ends past where it starts.
        let table = OffsetTable::new(vec![0, 9999, 90]);
        assert!(table.is_trusted());

        // Flat, backwards or single-entry tables are ignored
        assert!(!OffsetTable::new(vec![0, 0, 0]).is_trusted());
        assert!(!OffsetTable::new(vec![50, 10]).is_trusted());
        assert!(!OffsetTable::new(vec![12]).is_trusted());
        assert!(!OffsetTable::new(Vec::new()).is_trusted());
        assert_eq!(OffsetTable::new(vec![0, 0]).resync_target(0, 10, 3), None);
    }
}
