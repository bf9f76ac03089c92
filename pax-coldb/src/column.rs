// One column of the current stripe. Every variant answers the same
// capability set; encodings are layered by wrapping a plain column
// (FixedColumn in EncodingColumn, NonFixedColumn in NonFixedEncodingColumn)
// rather than by subtyping it.
//
// Row indexing: `rows` counts logical rows, nulls included. In porc
// layout a fixed column keeps a zero placeholder per null, so data slot ==
// logical row. In porc_vec layout nulls take no slot and slot == number
// of non-null rows before the row. Non-fixed columns keep one offsets
// entry per logical row in both layouts (nulls are zero-length).

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::encoding::{ColumnEncodingKind, EncodingOption};
use crate::fixed::{EncodingColumn, FixedColumn};
use crate::format::ColumnEncoding;
use crate::nonfixed::{NonFixedColumn, NonFixedEncodingColumn};
use crate::types::{ColumnDesc, StorageFormat, TypeKind};
use pax_base::{err, Bitmap, Result};

/// Column-level facts learned while writing one stripe and carried into the
/// columns of the next.
pub type Attributes = BTreeMap<String, String>;

pub trait PaxColumn: std::fmt::Debug + Send {
    fn type_kind(&self) -> TypeKind;

    fn storage_format(&self) -> StorageFormat;

    /// Appends one non-null value in column representation.
    fn append(&mut self, value: &[u8]) -> Result<()>;

    fn append_null(&mut self) -> Result<()>;

    fn rows(&self) -> usize;

    fn non_null_rows(&self) -> usize;

    /// Extends the column with null rows up to `rows`.
    fn set_rows(&mut self, rows: usize) -> Result<()>;

    /// Set bits are not-null rows; `None` when the column has no nulls.
    fn null_bitmap(&self) -> Option<&Bitmap>;

    /// The physical data stream, encoding it on first call.
    fn buffer(&mut self) -> Result<&[u8]>;

    /// Decoded bytes of `len` non-null values starting at the `start`th
    /// non-null value. Null rows are skipped in both layouts.
    fn range_buffer(&self, start: usize, len: usize) -> Result<Cow<'_, [u8]>>;

    /// Decoded bytes of one logical row, `None` if it is null.
    fn value(&self, row: usize) -> Result<Option<&[u8]>>;

    /// Unencoded size of the data stream.
    fn origin_length(&self) -> usize;

    fn encoding(&self) -> EncodingOption;

    /// Alignment the data stream needs in the stripe.
    fn align(&self) -> usize;

    fn attributes(&self) -> &Attributes;

    fn attributes_mut(&mut self) -> &mut Attributes;

    /// Approximate in-memory footprint.
    fn physical_size(&self) -> usize;

    fn has_null(&self) -> bool {
        self.non_null_rows() < self.rows()
    }

    fn offsets_buffer(&mut self) -> Result<Option<&[u8]>> {
        Ok(None)
    }

    /// Encoding and unencoded length of the offsets stream.
    fn offsets_encoding(&self) -> Option<(EncodingOption, usize)> {
        None
    }

    /// Appends a value that lives out of line; `external` goes to the
    /// toast file and the data stream gets a reference to it.
    fn append_toast(&mut self, _external: &[u8]) -> Result<()> {
        Err(err("column does not store out-of-line values"))
    }

    /// Rows whose data is a toast reference.
    fn toast_rows(&self) -> Option<&Bitmap> {
        None
    }

    fn external_toast(&self) -> &[u8] {
        &[]
    }
}

/// Null tracking shared by every plain column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Nulls {
    rows: usize,
    non_null: usize,
    bitmap: Option<Bitmap>,
}

impl Nulls {
    pub(crate) fn new() -> Self {
        Nulls::default()
    }

    /// Nulls for `rows` decoded rows; `bitmap` absent means none are null.
    pub(crate) fn from_bitmap(rows: usize, bitmap: Option<Bitmap>) -> Result<Self> {
        match bitmap {
            None => Ok(Nulls { rows, non_null: rows, bitmap: None }),
            Some(bm) if bm.len() != rows => Err(err("null bitmap length disagrees with row count")),
            Some(bm) => Ok(Nulls {
                rows,
                non_null: bm.count(),
                bitmap: Some(bm),
            }),
        }
    }

    pub(crate) fn push(&mut self, not_null: bool) {
        if !not_null && self.bitmap.is_none() {
            self.bitmap = Some(Bitmap::with_len(self.rows, true));
        }
        if let Some(bm) = &mut self.bitmap {
            bm.push(not_null);
        }
        self.rows += 1;
        if not_null {
            self.non_null += 1;
        }
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn non_null(&self) -> usize {
        self.non_null
    }

    pub(crate) fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    pub(crate) fn is_null(&self, row: usize) -> bool {
        self.bitmap.as_ref().is_some_and(|bm| !bm.get(row))
    }

    /// Non-null rows strictly before `row`.
    pub(crate) fn dense_index(&self, row: usize) -> usize {
        match &self.bitmap {
            None => row,
            Some(bm) => bm.count_range(0..row),
        }
    }

    /// Logical row of the `k`th non-null value; `k == non_null` maps to `rows`.
    pub(crate) fn row_of_dense(&self, k: usize) -> Option<usize> {
        if k == self.non_null {
            return Some(self.rows);
        }
        match &self.bitmap {
            None => (k < self.rows).then_some(k),
            Some(bm) => bm.select(k),
        }
    }

    pub(crate) fn bitmap_bytes(&self) -> usize {
        self.bitmap.as_ref().map_or(0, |bm| bm.len().div_ceil(8))
    }

    pub(crate) fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows {
            return Err(err(format!("row {row} out of range for {} rows", self.rows)));
        }
        Ok(())
    }
}

/// Builds an empty column for the next stripe. `attributes` carries the
/// previous generation's learned attributes.
pub fn new_column(
    desc: &ColumnDesc,
    format: StorageFormat,
    option: EncodingOption,
    offsets_option: EncodingOption,
    attributes: Attributes,
) -> Result<Box<dyn PaxColumn>> {
    desc.check_align()?;
    let col: Box<dyn PaxColumn> = match desc.kind.fixed_width() {
        Some(_) => {
            let mut inner = FixedColumn::new(desc, format)?;
            *inner.attributes_mut() = attributes;
            // Fixed columns default to no encoding.
            if matches!(option.kind, ColumnEncodingKind::NoEncoded | ColumnEncodingKind::Default) {
                Box::new(inner)
            } else {
                Box::new(EncodingColumn::new(inner, option))
            }
        }
        None => {
            let mut inner = NonFixedColumn::new(desc, format)?;
            *inner.attributes_mut() = attributes;
            if option.kind == ColumnEncodingKind::NoEncoded && offsets_option.kind == ColumnEncodingKind::NoEncoded {
                Box::new(inner)
            } else {
                Box::new(NonFixedEncodingColumn::new(inner, option, offsets_option))
            }
        }
    };
    Ok(col)
}

/// The raw streams of one column inside a stripe.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColumnStreams<'a> {
    pub present: Option<&'a [u8]>,
    pub data: &'a [u8],
    pub offsets: Option<&'a [u8]>,
    pub toast: Option<&'a [u8]>,
}

/// Rebuilds a column from its stripe streams, decoding with the encodings
/// the stripe recorded.
pub fn decode_column(
    desc: &ColumnDesc,
    format: StorageFormat,
    encoding: &ColumnEncoding,
    rows: usize,
    streams: ColumnStreams<'_>,
) -> Result<Box<dyn PaxColumn>> {
    let bitmap = match streams.present {
        None => None,
        Some(bytes) => match Bitmap::from_bytes(bytes, rows) {
            Some(bm) => Some(bm),
            None => return Err(err("present stream shorter than row count")),
        },
    };
    let nulls = Nulls::from_bitmap(rows, bitmap)?;
    let option = EncodingOption::new(encoding.kind, encoding.compress_level);
    let col: Box<dyn PaxColumn> = match desc.kind.fixed_width() {
        Some(_) => Box::new(EncodingColumn::decode(
            desc,
            format,
            option,
            streams.data,
            encoding.length as usize,
            nulls,
        )?),
        None => {
            let Some(offsets) = streams.offsets else {
                return Err(err(format!("non-fixed column {} has no offsets stream", desc.name)));
            };
            let toast = match streams.toast {
                None => None,
                Some(bytes) => match Bitmap::from_bytes(bytes, rows) {
                    Some(bm) => Some(bm),
                    None => return Err(err("toast stream shorter than row count")),
                },
            };
            let offsets_option = EncodingOption::new(encoding.offset_stream_kind, encoding.offset_stream_compress_level);
            Box::new(NonFixedEncodingColumn::decode(
                desc,
                format,
                (option, streams.data, encoding.length as usize),
                (offsets_option, offsets, encoding.offset_stream_length as usize),
                nulls,
                toast,
            )?)
        }
    };
    Ok(col)
}
