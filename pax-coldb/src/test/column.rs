use test_log::test;

use crate::column::{new_column, Attributes, PaxColumn};
use crate::columns::PaxColumns;
use crate::encoding::{ColumnEncodingKind, EncodingOption};
use crate::format::{ColumnEncoding, Stream, StripeFooter};
use crate::nonfixed::DICT_FALLBACK_ATTR;
use crate::types::{ColumnDesc, StorageFormat, TypeKind};
use crate::Result;

const PLAIN: EncodingOption = EncodingOption::NONE;

fn int_column(format: StorageFormat, option: EncodingOption) -> Result<Box<dyn PaxColumn>> {
    new_column(&ColumnDesc::new("i", TypeKind::Int), format, option, PLAIN, Attributes::new())
}

fn text_column(format: StorageFormat, option: EncodingOption, offsets: EncodingOption) -> Result<Box<dyn PaxColumn>> {
    new_column(&ColumnDesc::new("s", TypeKind::String), format, option, offsets, Attributes::new())
}

fn ints(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
fn test_fixed_range() -> Result<()> {
    let mut col = int_column(StorageFormat::Porc, PLAIN)?;
    for i in 0..16i32 {
        col.append(&i.to_le_bytes())?;
    }
    let r = col.range_buffer(5, 10)?;
    assert_eq!(r.len(), 40);
    assert_eq!(ints(&r), (5..15).collect::<Vec<_>>());
    assert!(matches!(r, std::borrow::Cow::Borrowed(_)));
    assert!(col.range_buffer(10, 7).is_err());
    assert!(col.append(&[1, 2]).is_err());
    Ok(())
}

// Rows 0..10 with every third row null.
fn fill_with_nulls(col: &mut dyn PaxColumn) -> Result<()> {
    for i in 0..10i32 {
        if i % 3 == 0 {
            col.append_null()?;
        } else {
            col.append(&i.to_le_bytes())?;
        }
    }
    Ok(())
}

#[test]
fn test_porc_keeps_placeholders() -> Result<()> {
    let mut col = int_column(StorageFormat::Porc, PLAIN)?;
    fill_with_nulls(col.as_mut())?;
    assert_eq!((col.rows(), col.non_null_rows()), (10, 6));
    assert!(col.has_null());
    assert_eq!(col.buffer()?.len(), 40);
    // Non-null ordinals 2..6 span rows 4..9, with row 6 null in between.
    let r = col.range_buffer(2, 4)?;
    assert_eq!(ints(&r), vec![4, 5, 7, 8]);
    assert!(matches!(r, std::borrow::Cow::Owned(_)));
    // Ordinals 0..2 are rows 1 and 2, adjacent.
    let r = col.range_buffer(0, 2)?;
    assert_eq!(ints(&r), vec![1, 2]);
    assert!(matches!(r, std::borrow::Cow::Borrowed(_)));
    assert!(col.range_buffer(4, 3).is_err());
    assert_eq!(col.value(3)?, None);
    assert_eq!(col.value(4)?, Some(&4i32.to_le_bytes()[..]));
    Ok(())
}

#[test]
fn test_porc_range_counts_non_null_values() -> Result<()> {
    for format in [StorageFormat::Porc, StorageFormat::PorcVec] {
        let mut col = int_column(format, PLAIN)?;
        for i in 0..16i32 {
            if i % 3 == 0 {
                col.append_null()?;
            }
            col.append(&i.to_le_bytes())?;
        }
        assert_eq!((col.rows(), col.non_null_rows()), (22, 16));
        let r = col.range_buffer(5, 10)?;
        assert_eq!(r.len(), 40);
        assert_eq!(ints(&r), (5..15).collect::<Vec<_>>());
        let r = col.range_buffer(15, 1)?;
        assert_eq!(ints(&r), vec![15]);
        assert_eq!(col.range_buffer(16, 0)?.len(), 0);
        assert!(col.range_buffer(10, 7).is_err());
    }
    Ok(())
}

#[test]
fn test_vec_is_dense() -> Result<()> {
    let mut col = int_column(StorageFormat::PorcVec, PLAIN)?;
    fill_with_nulls(col.as_mut())?;
    assert_eq!(col.buffer()?.len(), 24);
    // Non-null ordinals 1..4.
    let r = col.range_buffer(1, 3)?;
    assert_eq!(ints(&r), vec![2, 4, 5]);
    assert!(col.range_buffer(4, 3).is_err());
    assert_eq!(col.value(9)?, None);
    assert_eq!(col.value(8)?, Some(&8i32.to_le_bytes()[..]));
    Ok(())
}

#[test]
fn test_set_rows_pads_with_nulls() -> Result<()> {
    let mut col = int_column(StorageFormat::Porc, PLAIN)?;
    col.append(&7i32.to_le_bytes())?;
    col.set_rows(4)?;
    assert_eq!((col.rows(), col.non_null_rows()), (4, 1));
    assert!(col.set_rows(2).is_err());
    assert_eq!(col.null_bitmap().map(|bm| bm.count()), Some(1));
    Ok(())
}

#[test]
fn test_nonfixed_values_and_ranges() -> Result<()> {
    for format in [StorageFormat::Porc, StorageFormat::PorcVec] {
        let mut col = text_column(format, PLAIN, PLAIN)?;
        col.append(b"alpha")?;
        col.append_null()?;
        col.append(b"")?;
        col.append(b"gamma")?;
        assert_eq!(col.value(0)?, Some(&b"alpha"[..]));
        assert_eq!(col.value(1)?, None);
        assert_eq!(col.value(2)?, Some(&b""[..]));
        assert!(col.value(4).is_err());
        let whole = col.range_buffer(0, 3)?;
        assert_eq!(&*whole, b"alphagamma");
        let tail = col.range_buffer(1, 2)?;
        assert_eq!(&*tail, b"gamma");
        assert!(matches!(tail, std::borrow::Cow::Borrowed(_)));
        assert_eq!(&*col.range_buffer(0, 1)?, b"alpha");
        assert!(col.range_buffer(1, 3).is_err());
        assert_eq!(col.offsets_encoding(), Some((PLAIN, 20)));
    }
    Ok(())
}

#[test]
fn test_rle_column_caches_its_encoding() -> Result<()> {
    let mut col = int_column(StorageFormat::Porc, EncodingOption::new(ColumnEncodingKind::RleV2, 0))?;
    for _ in 0..100 {
        col.append(&42i32.to_le_bytes())?;
    }
    assert_eq!(col.align(), 1);
    assert_eq!(col.encoding().kind, ColumnEncodingKind::RleV2);
    let first = col.buffer()?.to_vec();
    assert!(first.len() < 10);
    assert_eq!(col.buffer()?, first.as_slice());
    col.append(&43i32.to_le_bytes())?;
    assert_ne!(col.buffer()?, first.as_slice());
    assert_eq!(col.origin_length(), 404);
    Ok(())
}

#[test]
fn test_float_column_ignores_integer_codec() -> Result<()> {
    let desc = ColumnDesc::new("f", TypeKind::Double);
    let col = new_column(
        &desc,
        StorageFormat::Porc,
        EncodingOption::new(ColumnEncodingKind::DirectDelta, 0),
        PLAIN,
        Attributes::new(),
    )?;
    assert_eq!(col.encoding(), EncodingOption::NONE);
    assert_eq!(col.align(), 8);
    Ok(())
}

#[test]
fn test_high_cardinality_dictionary_falls_back() -> Result<()> {
    let dict = EncodingOption::new(ColumnEncodingKind::Dictionary, 0);
    let mut col = text_column(StorageFormat::Porc, dict, EncodingOption::default())?;
    for i in 0..16384 {
        col.append(format!("{i:0>100}").as_bytes())?;
    }
    let encoded = col.buffer()?.len();
    assert!(encoded < 16384 * 100);
    assert_eq!(col.encoding().kind, ColumnEncodingKind::CompressZstd);
    assert_eq!(col.attributes().get(DICT_FALLBACK_ATTR).map(String::as_str), Some("zstd"));
    Ok(())
}

#[test]
fn test_dictionary_fallback_is_remembered() -> Result<()> {
    let dict = EncodingOption::new(ColumnEncodingKind::Dictionary, 0);
    let mut col = text_column(StorageFormat::Porc, dict, EncodingOption::default())?;
    for i in 0..50 {
        col.append(format!("distinct-{i}").as_bytes())?;
    }
    col.buffer()?;
    assert_eq!(col.encoding().kind, ColumnEncodingKind::CompressZstd);
    assert_eq!(col.attributes().get(DICT_FALLBACK_ATTR).map(String::as_str), Some("zstd"));

    let next = new_column(
        &ColumnDesc::new("s", TypeKind::String),
        StorageFormat::Porc,
        dict,
        EncodingOption::default(),
        col.attributes().clone(),
    )?;
    assert_eq!(next.encoding().kind, ColumnEncodingKind::CompressZstd);

    let mut repetitive = text_column(StorageFormat::Porc, dict, EncodingOption::default())?;
    for i in 0..50 {
        repetitive.append(if i % 2 == 0 { b"even" } else { b"odd" })?;
    }
    repetitive.buffer()?;
    assert_eq!(repetitive.encoding().kind, ColumnEncodingKind::Dictionary);
    assert!(repetitive.attributes().is_empty());
    Ok(())
}

#[test]
fn test_bad_alignment() {
    let desc = ColumnDesc::new("i", TypeKind::Int).with_align(3);
    assert!(new_column(&desc, StorageFormat::Porc, PLAIN, PLAIN, Attributes::new()).is_err());
}

fn schema() -> Vec<ColumnDesc> {
    vec![
        ColumnDesc::new("id", TypeKind::Long),
        ColumnDesc::new("flag", TypeKind::Boolean),
        ColumnDesc::new("name", TypeKind::String),
        ColumnDesc::new("score", TypeKind::Double),
    ]
}

fn encodings(i: usize) -> EncodingOption {
    match i {
        0 => EncodingOption::new(ColumnEncodingKind::RleV2, 0),
        2 => EncodingOption::new(ColumnEncodingKind::Dictionary, 0),
        3 => EncodingOption::new(ColumnEncodingKind::CompressZlib, 4),
        _ => EncodingOption::default(),
    }
}

fn build(format: StorageFormat) -> Result<PaxColumns> {
    let mut cols = PaxColumns::new(&schema(), format, encodings, EncodingOption::default(), Vec::new())?;
    for r in 0..200i64 {
        cols.column_mut(0)?.append(&(r * 10).to_le_bytes())?;
        if r % 5 == 0 {
            cols.column_mut(1)?.append_null()?;
            cols.column_mut(2)?.append_null()?;
        } else {
            cols.column_mut(1)?.append(&[(r % 2) as u8])?;
            cols.column_mut(2)?.append(["red", "green", "blue"][r as usize % 3].as_bytes())?;
        }
        cols.column_mut(3)?.append(&(r as f64 / 4.0).to_le_bytes())?;
    }
    Ok(cols)
}

#[test]
fn test_stripe_roundtrip() -> Result<()> {
    for format in [StorageFormat::Porc, StorageFormat::PorcVec] {
        let mut cols = build(format)?;
        let mut footer = StripeFooter::default();
        let mut encs = vec![ColumnEncoding::default(); cols.len()];
        let data = cols.data_buffer(
            |kind, col, len, pad| {
                footer.streams.push(Stream {
                    kind,
                    column: col as u32,
                    length: len as u64,
                    padding: pad as u32,
                })
            },
            |col, enc| encs[col] = enc,
        )?;
        footer.encodings = encs;

        let pos: u64 = footer.streams.iter().map(|s| s.padding as u64 + s.length).sum();
        assert_eq!(pos as usize, data.used());
        assert_eq!(footer.encodings[3].kind, ColumnEncodingKind::CompressZlib);
        assert_eq!(footer.encodings[2].kind, ColumnEncodingKind::Dictionary);
        assert_eq!(footer.encodings[2].offset_stream_kind, ColumnEncodingKind::DirectDelta);

        let back = PaxColumns::decode_stripe(&schema(), format, &footer, 200, data.as_slice())?;
        assert_eq!(back.rows(), 200);
        for col in 0..cols.len() {
            for row in 0..200 {
                assert_eq!(back.column(col)?.value(row)?, cols.column(col)?.value(row)?);
            }
        }
        assert!(back.column(4).is_err());
    }
    Ok(())
}

#[test]
fn test_stripe_rejects_ragged_columns() -> Result<()> {
    let mut cols = build(StorageFormat::Porc)?;
    cols.column_mut(1)?.append_null()?;
    assert!(cols.data_buffer(|_, _, _, _| {}, |_, _| {}).is_err());
    Ok(())
}

#[test]
fn test_plain_streams_are_aligned() -> Result<()> {
    let schema = vec![ColumnDesc::new("b", TypeKind::Byte), ColumnDesc::new("l", TypeKind::Long)];
    let mut cols = PaxColumns::new(&schema, StorageFormat::Porc, |_| PLAIN, PLAIN, Vec::new())?;
    for i in 0..3i64 {
        cols.column_mut(0)?.append(&[i as u8])?;
        cols.column_mut(1)?.append(&i.to_le_bytes())?;
    }
    let mut streams = Vec::new();
    let data = cols.data_buffer(|kind, col, len, pad| streams.push((kind, col, len, pad)), |_, _| {})?;
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[1].3, 5);
    assert_eq!(data.used(), 3 + 5 + 24);
    Ok(())
}
