use std::path::Path;
use std::sync::Arc;

use test_log::test;

use crate::encoding::{ColumnEncodingKind, EncodingOption};
use crate::ioutil::MemFileSystem;
use crate::layout::{describe_layout, Annotations};
use crate::options::WriterOptions;
use crate::types::{ColumnDesc, Datum, TypeKind};
use crate::writer::OrcWriter;
use crate::Result;

#[test]
fn test_layout_covers_every_byte() -> Result<()> {
    let fs = MemFileSystem::new();
    let schema = vec![
        ColumnDesc::new("b", TypeKind::Byte),
        ColumnDesc::new("l", TypeKind::Long),
        ColumnDesc::new("s", TypeKind::String),
    ];
    let mut opts = WriterOptions::new("layout", schema);
    opts.group_limit = 20;
    opts.encodings = vec![
        EncodingOption::default(),
        EncodingOption::default(),
        EncodingOption::new(ColumnEncodingKind::NoEncoded, 0),
    ];
    opts.offsets_encoding = EncodingOption::NONE;
    let mut w = OrcWriter::create(opts, Arc::new(fs.clone()))?;
    for i in 0..50i64 {
        let s = if i % 6 == 0 { Datum::Null } else { Datum::str("abc") };
        w.write_tuple(&[Datum::Int8(i as i8), Datum::Int64(i * 1000), s])?;
    }
    w.close()?;

    let ann = describe_layout(&fs, Path::new("layout"))?;
    let names: Vec<&str> = ann.ranges.iter().map(|(_, n)| n.as_str()).collect();
    assert!(names.contains(&"stripe.0.column.1.data"));
    assert!(names.contains(&"stripe.2.column.2.present"));
    assert!(names.contains(&"stripe.1.column.2.offsets"));
    assert!(names.contains(&"stripe.0.padding"));
    assert_eq!(names[names.len() - 3..], ["file_footer", "postscript", "trailer"]);

    let bytes = fs.contents(Path::new("layout"))?;
    assert_eq!(ann.ranges.last().map(|(r, _)| r.end), Some(bytes.len() as u64));
    let dump = ann.render_hexdump(&bytes)?;
    assert!(!dump.contains("ERROR"), "{dump}");
    assert!(dump.contains("- trailer (8 bytes):"));
    Ok(())
}

#[test]
fn test_hexdump_flags_gaps_and_overlaps() -> Result<()> {
    let buf: Vec<u8> = (0..64).collect();
    let mut ann = Annotations::new();
    ann.push_context("outer");
    ann.annotate(0..16, "a");
    ann.pop_context();
    ann.annotate(20..40, "b");
    ann.annotate(30..64, "c");
    let dump = ann.render_hexdump(&buf)?;
    assert!(dump.contains("- outer.a (16 bytes):"));
    assert!(dump.contains("- ERROR: unannotated (4 bytes)"));
    assert!(dump.contains("- ERROR: c overlaps previous range"));

    let mut zeros = Annotations::new();
    zeros.annotate(0..128, "zeros");
    let dump = zeros.render_hexdump(&[0u8; 128])?;
    assert!(dump.contains("previous line repeated 6 times"));
    Ok(())
}
