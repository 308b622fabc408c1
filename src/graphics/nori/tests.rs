use super::*;

/// Describes a synthetic file; [`build`] lays it out byte by byte.
struct Sample {
    version: i32,
    /// 256 colours as stored on disk (BGR)
    palette: Option<Vec<[u8; 3]>>,
    main_range: Option<(i32, i32)>,
    compressed: bool,
    bitmaps: Vec<SampleBitmap>,
    animations: Vec<SampleAnimation>,
    /// Raw bitmap offset table, replacing the computed one
    bitmap_table: Option<Vec<i32>>,
    /// Raw animation offset table, replacing the computed one
    animation_table: Option<Vec<i32>>,
    /// Zero bytes after animation `i`, missing entries meaning none
    animation_gaps: Vec<usize>,
    zero_total_size: bool,
    zero_section_sizes: bool,
}

struct SampleBitmap {
    draw_count: i32,
    width: i32,
    height: i32,
    pixels: Vec<u8>,
    /// Zero bytes between this record and the next
    gap_after: usize,
}

struct SampleAnimation {
    name: [u8; 32],
    frames: Vec<Vec<[i32; 7]>>,
}

fn bitmap(width: i32, height: i32) -> SampleBitmap {
    let len = (width * height) as usize;
    SampleBitmap {
        draw_count: 1,
        width,
        height,
        pixels: (0..len).map(|i| (i * 7 + 1) as u8).collect(),
        gap_after: 0,
    }
}

fn name(text: &str) -> [u8; 32] {
    let (encoded, _, _) = encoding_rs::EUC_KR.encode(text);
    let mut raw = [0u8; 32];
    raw[..encoded.len()].copy_from_slice(&encoded);
    raw
}

fn plane(bitmap_id: i32) -> [i32; 7] {
    [bitmap_id, -12, 30, 255, 0, 1, 0]
}

/// One bitmap, one animation with one empty frame, no palette
fn minimal(version: i32) -> Sample {
    Sample {
        version,
        palette: None,
        main_range: None,
        compressed: false,
        bitmaps: vec![bitmap(2, 2)],
        animations: vec![SampleAnimation {
            name: name("walk"),
            frames: vec![Vec::new()],
        }],
        bitmap_table: None,
        animation_table: None,
        animation_gaps: Vec::new(),
        zero_total_size: false,
        zero_section_sizes: false,
    }
}

fn grey_palette() -> Vec<[u8; 3]> {
    let mut colours: Vec<[u8; 3]> = (0..=255u8).map(|i| [i, i, i]).collect();
    colours[0] = [255, 0, 255];
    colours
}

fn extra_bytes(version: i32) -> usize {
    match version {
        300 => 224,
        301 => 228,
        302 => 348,
        303 => 352,
        _ => 0,
    }
}

fn ints(out: &mut Vec<u8>, values: &[i32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn build(sample: &Sample) -> Vec<u8> {
    let palette_len = match (&sample.palette, sample.main_range) {
        (None, _) => 0,
        (Some(_), None) => 32 + 768,
        (Some(_), Some(_)) => 32 + 768 + 8,
    };

    let mut bitmap_bytes = Vec::new();
    let mut offsets = Vec::new();
    for b in &sample.bitmaps {
        offsets.push(bitmap_bytes.len() as i32);
        ints(
            &mut bitmap_bytes,
            &[b.draw_count, b.pixels.len() as i32, b.width, b.height, 0, 3, 4],
        );
        bitmap_bytes.extend_from_slice(&b.pixels);
        bitmap_bytes.resize(bitmap_bytes.len() + b.gap_after, 0);
    }
    let table = match &sample.bitmap_table {
        Some(table) => table.clone(),
        None if sample.compressed => offsets
            .iter()
            .enumerate()
            .map(|(i, o)| o - 28 * i as i32)
            .collect(),
        None => offsets,
    };

    let extra = extra_bytes(sample.version);
    let mut anim_bytes = Vec::new();
    let mut anim_offsets = Vec::new();
    for (a, animation) in sample.animations.iter().enumerate() {
        anim_offsets.push(anim_bytes.len() as i32);
        anim_bytes.extend_from_slice(&animation.name);
        ints(&mut anim_bytes, &[animation.frames.len() as i32]);

        let mut frame_offset = 0;
        for planes in &animation.frames {
            ints(&mut anim_bytes, &[frame_offset]);
            frame_offset += (8 + 28 * planes.len() + extra) as i32;
        }
        for (f, planes) in animation.frames.iter().enumerate() {
            ints(&mut anim_bytes, &[100 + f as i32, planes.len() as i32]);
            for plane in planes {
                ints(&mut anim_bytes, plane);
            }
            anim_bytes.extend((0..extra).map(|i| (i % 251) as u8));
        }
        let gap = sample.animation_gaps.get(a).copied().unwrap_or(0);
        anim_bytes.resize(anim_bytes.len() + gap, 0);
    }
    let anim_offsets = sample.animation_table.clone().unwrap_or(anim_offsets);

    let data_start = 84 + palette_len + 4 * sample.bitmaps.len();
    let data_end = data_start + bitmap_bytes.len();
    let total = data_end + 4 * sample.animations.len() + anim_bytes.len();
    let section_size = (data_end - 40) as i32;
    let without_bitmaps = (40 + total - data_end) as i32;

    let mut out = Vec::with_capacity(total);
    ints(&mut out, &[NORI_SIGNATURE, sample.version, 1, 2, 3, 4, 5]);
    ints(
        &mut out,
        &[
            sample.animations.len() as i32,
            if sample.zero_section_sizes { 0 } else { without_bitmaps },
            if sample.zero_total_size { 0 } else { total as i32 },
        ],
    );
    ints(
        &mut out,
        &[
            GAWI_SIGNATURE,
            GAWI_VERSION,
            8,
            sample.compressed as i32,
            sample.palette.is_some() as i32,
            6,
            7,
            8,
            9,
            sample.bitmaps.len() as i32,
            if sample.zero_section_sizes { 0 } else { section_size },
        ],
    );
    if let Some(colours) = &sample.palette {
        let size = if sample.main_range.is_some() { 808 } else { 768 };
        ints(&mut out, &[PALETTE_SIGNATURE, PALETTE_VERSION, 11, 12, 13, 14, 0, size]);
        for colour in colours {
            out.extend_from_slice(colour);
        }
        if let Some((start, end)) = sample.main_range {
            ints(&mut out, &[start, end]);
        }
    }
    ints(&mut out, &table);
    out.extend_from_slice(&bitmap_bytes);
    ints(&mut out, &anim_offsets);
    out.extend_from_slice(&anim_bytes);

    assert_eq!(out.len(), total);
    out
}

fn warnings_only(findings: &[Finding]) -> bool {
    findings.iter().all(|f| !f.is_fatal())
}

#[test]
fn test_minimal_file() {
    let bytes = build(&minimal(300));
    assert_eq!(bytes.len(), 396);

    let decoded = decode(&bytes).unwrap();
    assert!(decoded.findings.is_empty(), "{:?}", decoded.findings);

    let doc = &decoded.document;
    assert_eq!(doc.header.version, NoriVersion::V300);
    assert_eq!(doc.header.params, [1, 2, 3, 4, 5]);
    assert_eq!(doc.header.total_size, 396);
    assert_eq!(doc.header.size_without_bitmaps, 316);
    assert_eq!(doc.gawi.section_size, 80);
    assert!(doc.palette.is_none());

    assert_eq!(doc.bitmaps.len(), 1);
    let bitmap = &doc.bitmaps[0];
    assert_eq!((bitmap.width, bitmap.height, bitmap.data_length), (2, 2, 4));
    assert_eq!((bitmap.origin_x, bitmap.origin_y), (3, 4));
    assert_eq!(bitmap.pixels, vec![1, 8, 15, 22]);

    assert_eq!(doc.animations.len(), 1);
    let animation = &doc.animations[0];
    assert_eq!(animation.name, "walk");
    assert_eq!(animation.frames.len(), 1);
    assert_eq!(animation.frames[0].delay, 100);
    assert!(animation.frames[0].planes.is_empty());
    assert_eq!(animation.frames[0].padding.len(), 224);

    let encoded = encode(doc, doc).unwrap();
    assert_eq!(encoded.bytes, bytes);
    assert!(encoded.findings.is_empty());
}

#[test]
fn test_full_round_trip_is_exact() {
    let sample = Sample {
        version: 303,
        palette: Some(grey_palette()),
        main_range: Some((16, 240)),
        compressed: false,
        bitmaps: vec![bitmap(2, 2), bitmap(3, 1), bitmap(1, 5)],
        animations: vec![
            SampleAnimation {
                name: name("idle"),
                frames: vec![vec![plane(0)], vec![plane(1), plane(2)]],
            },
            SampleAnimation {
                name: name("걷기"),
                frames: vec![Vec::new(), vec![plane(2)], vec![plane(0)]],
            },
        ],
        bitmap_table: None,
        animation_table: None,
        animation_gaps: Vec::new(),
        zero_total_size: false,
        zero_section_sizes: false,
    };
    let bytes = build(&sample);

    let decoded = decode(&bytes).unwrap();
    assert!(decoded.findings.is_empty(), "{:?}", decoded.findings);

    let doc = &decoded.document;
    let palette = doc.palette.as_ref().unwrap();
    assert_eq!(palette.size, 808);
    assert_eq!(palette.main_range, Some(MainRange { start: 16, end: 240 }));
    assert_eq!(palette.params, [11, 12, 13, 14]);
    assert_eq!(doc.animations[1].name, "걷기");
    assert_eq!(doc.animations[0].frames[1].planes[1].bitmap_id, 2);
    assert_eq!(doc.animations[0].frames[1].planes[1].point_x, -12);
    assert_eq!(doc.animations[1].frames[2].padding.len(), 352);

    let encoded = encode(doc, doc).unwrap();
    assert_eq!(encoded.bytes, bytes);
}

#[test]
fn test_round_trip_through_separate_pixels() {
    let bytes = build(&minimal(301));
    let mut doc = decode(&bytes).unwrap().document;
    let pixels: Vec<Vec<u8>> = doc.bitmaps.iter().map(|b| b.pixels.clone()).collect();
    for bitmap in &mut doc.bitmaps {
        bitmap.pixels.clear();
    }

    let encoded = encode(&doc, &pixels).unwrap();
    assert_eq!(encoded.bytes, bytes);
}

#[test]
fn test_version_padding_sizes() {
    for (version, extra) in [(300, 224), (301, 228), (302, 348), (303, 352)] {
        let decoded = decode(&build(&minimal(version))).unwrap();
        let doc = &decoded.document;
        assert_eq!(doc.header.version.as_i32(), version);
        assert_eq!(doc.extra_frame_bytes(), extra);
        assert_eq!(doc.animations[0].frames[0].padding.len(), extra);
    }
}

#[test]
fn test_unsupported_version() {
    for version in [0, 299, 304] {
        let err = decode(&build(&minimal(version))).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedVersion(v) if v == version));
        assert!(err.is_structural());
    }
}

#[test]
fn test_bad_signatures_and_versions() {
    let mut bytes = build(&minimal(300));
    bytes[0] = 0;
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::BadSignature {
            section: Section::Nori,
            ..
        })
    ));

    let mut bytes = build(&minimal(300));
    bytes[44..48].copy_from_slice(&301i32.to_le_bytes());
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::BadVersion {
            section: Section::Gawi,
            found: 301,
            ..
        })
    ));
}

#[test]
fn test_truncated_input() {
    let bytes = build(&minimal(300));
    for len in [0, 20, 60, 100, 395] {
        let err = decode(&bytes[..len]).unwrap_err();
        assert!(
            matches!(err, DecodeError::Truncated { .. }),
            "{} bytes: {:?}",
            len,
            err
        );
        assert!(!err.is_structural());
    }
}

#[test]
fn test_negative_count_is_rejected() {
    let mut bytes = build(&minimal(300));
    bytes[28..32].copy_from_slice(&(-1i32).to_le_bytes());
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::InvalidCount { value: -1, .. })
    ));
}

#[test]
fn test_palette_is_reordered_and_keyed() {
    let mut colours = grey_palette();
    colours[0] = [3, 2, 1];
    colours[1] = [10, 20, 30];
    let sample = Sample {
        palette: Some(colours),
        ..minimal(300)
    };

    let decoded = decode(&build(&sample)).unwrap();
    let palette = decoded.document.palette.as_ref().unwrap();
    assert_eq!(palette.colours.len(), 256);
    assert_eq!(palette.colours[0], TRANSPARENT_KEY);
    assert_eq!(palette.colours[1], [30, 20, 10]);
    assert_eq!(palette.main_range, None);
    assert_eq!(
        decoded.findings,
        vec![Finding::Quirk(Quirk::PaletteKeyForced {
            original: [1, 2, 3]
        })]
    );
}

#[test]
fn test_palette_key_already_set_is_silent() {
    let sample = Sample {
        palette: Some(grey_palette()),
        ..minimal(300)
    };
    let decoded = decode(&build(&sample)).unwrap();
    assert!(decoded.findings.is_empty());
    assert_eq!(
        decoded.document.palette.unwrap().colours[0],
        [255, 0, 255]
    );
}

#[test]
fn test_zero_total_size_uses_input_length() {
    let sample = Sample {
        zero_total_size: true,
        ..minimal(300)
    };
    let bytes = build(&sample);
    let decoded = decode(&bytes).unwrap();

    assert_eq!(decoded.document.header.total_size, bytes.len() as i32);
    assert_eq!(
        decoded.findings,
        vec![Finding::Quirk(Quirk::ZeroTotalSize {
            actual: bytes.len() as i32
        })]
    );

    // The repaired size is what gets written back
    let encoded = encode(&decoded.document, &decoded.document).unwrap();
    assert_eq!(&encoded.bytes[36..40], &(bytes.len() as i32).to_le_bytes());
    assert_eq!(&encoded.bytes[40..], &bytes[40..]);
}

#[test]
fn test_zero_section_sizes_are_recomputed() {
    let reference = decode(&build(&minimal(302))).unwrap().document;
    let sample = Sample {
        zero_section_sizes: true,
        ..minimal(302)
    };
    let decoded = decode(&build(&sample)).unwrap();
    let doc = &decoded.document;

    assert_eq!(doc.gawi.section_size, reference.gawi.section_size);
    assert_eq!(
        doc.header.size_without_bitmaps,
        reference.header.size_without_bitmaps
    );
    assert!(decoded.findings.contains(&Finding::Quirk(Quirk::ZeroSectionSize {
        recomputed: reference.gawi.section_size
    })));
    assert!(decoded
        .findings
        .contains(&Finding::Quirk(Quirk::ZeroSizeWithoutBitmaps {
            recomputed: reference.header.size_without_bitmaps
        })));
}

#[test]
fn test_compressed_offsets_are_corrected() {
    let sample = Sample {
        compressed: true,
        bitmaps: vec![bitmap(2, 2), bitmap(3, 2), bitmap(4, 2)],
        ..minimal(300)
    };
    let bytes = build(&sample);
    // On disk: 0, 32 - 28, 66 - 56
    let table_start = 84;
    assert_eq!(&bytes[table_start + 4..table_start + 8], &4i32.to_le_bytes());
    assert_eq!(&bytes[table_start + 8..table_start + 12], &10i32.to_le_bytes());

    let decoded = decode(&bytes).unwrap();
    assert!(decoded.findings.is_empty(), "{:?}", decoded.findings);
    let declared: Vec<i32> = decoded
        .document
        .bitmaps
        .iter()
        .map(|b| b.declared_offset)
        .collect();
    let observed: Vec<u32> = decoded.document.bitmaps.iter().map(|b| b.offset).collect();
    assert_eq!(declared, vec![0, 32, 66]);
    assert_eq!(observed, vec![0, 32, 66]);

    let encoded = encode(&decoded.document, &decoded.document).unwrap();
    assert_eq!(encoded.bytes, bytes);
}

#[test]
fn test_draw_count_gap_is_resynced_and_restored() {
    let mut first = bitmap(2, 2);
    first.draw_count = 2;
    first.gap_after = 12;
    let sample = Sample {
        bitmaps: vec![first, bitmap(2, 3)],
        ..minimal(300)
    };
    let bytes = build(&sample);

    let decoded = decode(&bytes).unwrap();
    let base = 84 + 8;
    assert_eq!(
        decoded.findings,
        vec![
            Finding::Quirk(Quirk::NonUnitDrawCount {
                bitmap: 0,
                draw_count: 2
            }),
            Finding::OffsetResync {
                kind: OffsetKind::Bitmap,
                index: 0,
                from: base + 32,
                to: base as i64 + 44,
            },
        ]
    );
    assert_eq!(decoded.document.bitmaps[1].offset, 44);
    assert_eq!(decoded.document.bitmaps[1].pixels.len(), 6);

    let encoded = encode(&decoded.document, &decoded.document).unwrap();
    assert_eq!(encoded.bytes, bytes);
    assert_eq!(
        encoded.findings,
        vec![Finding::Quirk(Quirk::NonUnitDrawCount {
            bitmap: 0,
            draw_count: 2
        })]
    );
}

#[test]
fn test_untrusted_table_is_only_reported() {
    let sample = Sample {
        bitmaps: vec![bitmap(2, 2), bitmap(2, 2)],
        bitmap_table: Some(vec![0, 0]),
        ..minimal(300)
    };
    let decoded = decode(&build(&sample)).unwrap();
    assert_eq!(
        decoded.findings,
        vec![Finding::OffsetMismatch {
            kind: OffsetKind::Bitmap,
            index: 1,
            declared: 0,
            observed: 32,
        }]
    );

    // The writer lays the table out from the records, so the output is clean
    let encoded = encode(&decoded.document, &decoded.document).unwrap();
    let again = decode(&encoded.bytes).unwrap();
    assert!(again.findings.is_empty());
    assert_eq!(again.document.bitmaps[1].declared_offset, 32);
}

#[test]
fn test_dangling_reference_on_decode() {
    let sample = Sample {
        animations: vec![SampleAnimation {
            name: name("walk"),
            frames: vec![vec![plane(0), plane(5)]],
        }],
        ..minimal(300)
    };
    let err = decode(&build(&sample)).unwrap_err();
    match err {
        DecodeError::DanglingReference {
            location,
            bitmap_id,
            bitmap_count,
        } => {
            assert_eq!(
                location,
                PlaneLocation {
                    animation: 0,
                    frame: 0,
                    plane: 1
                }
            );
            assert_eq!(bitmap_id, 5);
            assert_eq!(bitmap_count, 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_dangling_reference_on_encode() {
    let sample = Sample {
        animations: vec![SampleAnimation {
            name: name("walk"),
            frames: vec![vec![plane(0)]],
        }],
        ..minimal(300)
    };
    let mut doc = decode(&build(&sample)).unwrap().document;

    for bad_id in [1, -1] {
        doc.animations[0].frames[0].planes[0].bitmap_id = bad_id;
        assert!(matches!(
            encode(&doc, &doc),
            Err(EncodeError::DanglingReference { bitmap_id, bitmap_count: 1, .. }) if bitmap_id == bad_id
        ));
    }
}

#[test]
fn test_validate_is_pure() {
    let mut doc = decode(&build(&minimal(300))).unwrap().document;
    assert!(doc.validate().is_empty());

    doc.header.animation_count = 4;
    doc.gawi.has_palette = 1;
    doc.animations[0].frames[0].padding.pop();
    let snapshot = doc.clone();

    let first = doc.validate();
    let second = doc.validate();
    assert_eq!(first, second);
    assert_eq!(doc, snapshot);
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(Finding::is_fatal));
}

#[test]
fn test_invalid_document_is_not_encoded() {
    let mut doc = decode(&build(&minimal(300))).unwrap().document;
    doc.header.signature = 0;
    doc.animations[0].frame_count = 2;

    match encode(&doc, &doc) {
        Err(EncodeError::Invalid(findings)) => {
            assert!(findings.contains(&Finding::SignatureMismatch {
                section: Section::Nori,
                expected: NORI_SIGNATURE,
                found: 0,
            }));
            assert!(findings.contains(&Finding::CountMismatch {
                field: CountField::Frames { animation: 0 },
                declared: 2,
                actual: 1,
            }));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_buffer_overflow() {
    let mut doc = decode(&build(&minimal(300))).unwrap().document;

    doc.header.total_size = 100;
    assert!(matches!(
        encode(&doc, &doc),
        Err(EncodeError::BufferOverflow {
            required: 396,
            capacity: 100
        })
    ));

    doc.header.total_size = -1;
    assert!(matches!(
        encode(&doc, &doc),
        Err(EncodeError::BufferOverflow { capacity: -1, .. })
    ));
}

#[test]
fn test_oversized_total_is_zero_filled() {
    let mut doc = decode(&build(&minimal(300))).unwrap().document;
    doc.header.total_size = 400;

    let encoded = encode(&doc, &doc).unwrap();
    assert_eq!(encoded.bytes.len(), 400);
    assert_eq!(&encoded.bytes[396..], &[0, 0, 0, 0]);
    assert!(warnings_only(&encoded.findings));
    assert!(encoded.findings.contains(&Finding::SizeMismatch {
        field: SizeField::Total,
        declared: 400,
        computed: 396,
    }));
}

#[test]
fn test_missing_or_short_pixels() {
    let doc = decode(&build(&minimal(300))).unwrap().document;

    let none: Vec<Vec<u8>> = Vec::new();
    assert!(matches!(
        encode(&doc, &none),
        Err(EncodeError::MissingPixels { bitmap: 0 })
    ));

    let short = vec![vec![0u8; 3]];
    assert!(matches!(
        encode(&doc, &short),
        Err(EncodeError::PixelLength {
            bitmap: 0,
            expected: 4,
            found: 3
        })
    ));
}

#[test]
fn test_name_padding_and_truncation() {
    let mut raw = name("walk");
    raw[4] = b' ';
    raw[5] = b' ';
    let sample = Sample {
        animations: vec![SampleAnimation {
            name: raw,
            frames: vec![Vec::new()],
        }],
        ..minimal(300)
    };
    let decoded = decode(&build(&sample)).unwrap();
    assert_eq!(decoded.document.animations[0].name, "walk");
    assert_eq!(
        decoded.findings,
        vec![Finding::NamePadding { animation: 0 }]
    );

    let mut doc = decoded.document;
    doc.animations[0].name = "a".repeat(40);
    let encoded = encode(&doc, &doc).unwrap();
    assert!(encoded.findings.contains(&Finding::NameTruncated {
        animation: 0,
        length: 40
    }));
}

#[test]
fn test_plan_layout_matches_observed_offsets() {
    let sample = Sample {
        version: 302,
        bitmaps: vec![bitmap(2, 2), bitmap(5, 1)],
        animations: vec![
            SampleAnimation {
                name: name("a"),
                frames: vec![vec![plane(1)], Vec::new()],
            },
            SampleAnimation {
                name: name("b"),
                frames: vec![Vec::new()],
            },
        ],
        ..minimal(302)
    };
    let doc = decode(&build(&sample)).unwrap().document;

    let mut findings = Vec::new();
    let layout = writer::plan_layout(&doc, &mut findings);
    assert!(findings.is_empty());

    let bitmap_offsets: Vec<u32> = doc.bitmaps.iter().map(|b| b.offset).collect();
    let animation_offsets: Vec<u32> = doc.animations.iter().map(|a| a.offset).collect();
    assert_eq!(layout.bitmap_offsets, bitmap_offsets);
    assert_eq!(layout.animation_offsets, animation_offsets);
    assert_eq!(layout.frame_offsets[0], vec![0, 8 + 28 + 348]);
    assert_eq!(layout.end, doc.header.total_size as u64);
}

#[test]
fn test_animation_gap_is_resynced_and_restored() {
    let sample = Sample {
        animations: vec![
            SampleAnimation {
                name: name("a"),
                frames: vec![Vec::new()],
            },
            SampleAnimation {
                name: name("b"),
                frames: vec![Vec::new()],
            },
        ],
        animation_gaps: vec![12],
        ..minimal(300)
    };
    let bytes = build(&sample);

    let decoded = decode(&bytes).unwrap();
    // Bitmap data ends at 120, then two table entries
    let base = 120 + 8;
    let animation_len = 32 + 4 + 4 + 8 + 224;
    assert_eq!(
        decoded.findings,
        vec![Finding::OffsetResync {
            kind: OffsetKind::Animation,
            index: 0,
            from: base + animation_len,
            to: (base + animation_len + 12) as i64,
        }]
    );
    let animations = &decoded.document.animations;
    assert_eq!(animations[1].offset, animation_len as u32 + 12);
    assert_eq!(animations[1].name, "b");

    let encoded = encode(&decoded.document, &decoded.document).unwrap();
    assert!(encoded.findings.is_empty(), "{:?}", encoded.findings);
    assert_eq!(encoded.bytes, bytes);
}

#[test]
fn test_offset_before_table_data_is_rejected() {
    let sample = Sample {
        bitmaps: vec![bitmap(2, 2), bitmap(2, 2), bitmap(2, 2)],
        bitmap_table: Some(vec![0, -8, 64]),
        ..minimal(300)
    };
    assert!(matches!(
        decode(&build(&sample)),
        Err(DecodeError::OffsetBeforeBase {
            kind: OffsetKind::Bitmap,
            index: 0,
            target: 88,
            base: 96,
        })
    ));

    let walk = || SampleAnimation {
        name: name("walk"),
        frames: vec![Vec::new()],
    };
    let sample = Sample {
        animations: vec![walk(), walk(), walk()],
        animation_table: Some(vec![0, -8, 600]),
        ..minimal(300)
    };
    assert!(matches!(
        decode(&build(&sample)),
        Err(DecodeError::OffsetBeforeBase {
            kind: OffsetKind::Animation,
            index: 0,
            target: 124,
            base: 132,
        })
    ));
}

#[test]
fn test_trailing_bytes_are_reported() {
    let mut bytes = build(&minimal(300));
    bytes.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    bytes[36..40].copy_from_slice(&400i32.to_le_bytes());

    let decoded = decode(&bytes).unwrap();
    assert_eq!(
        decoded.findings,
        vec![Finding::TrailingData {
            offset: 396,
            length: 4
        }]
    );
    assert!(warnings_only(&decoded.findings));

    // Declared size no longer covers the extra bytes
    bytes[36..40].copy_from_slice(&396i32.to_le_bytes());
    let decoded = decode(&bytes).unwrap();
    assert_eq!(
        decoded.findings,
        vec![
            Finding::TrailingData {
                offset: 396,
                length: 4
            },
            Finding::SizeMismatch {
                field: SizeField::Total,
                declared: 396,
                computed: 400,
            },
        ]
    );
}

#[test]
fn test_declared_size_past_input_is_reported() {
    let mut bytes = build(&minimal(300));
    bytes[36..40].copy_from_slice(&400i32.to_le_bytes());

    let decoded = decode(&bytes).unwrap();
    assert_eq!(
        decoded.findings,
        vec![Finding::SizeMismatch {
            field: SizeField::Total,
            declared: 400,
            computed: 396,
        }]
    );
}
