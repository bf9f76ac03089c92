use std::borrow::Cow;

use crate::buffer::DataBuffer;
use crate::column::{Attributes, Nulls, PaxColumn};
use crate::encoding::{Codec, EncodingOption, StreamShape};
use crate::types::{i64_to_le, le_to_i64, ColumnDesc, StorageFormat, TypeKind};
use pax_base::{err, Bitmap, Result};

/// Fixed-width values appended as-is.
#[derive(Debug)]
pub struct FixedColumn {
    kind: TypeKind,
    width: usize,
    align: usize,
    format: StorageFormat,
    data: DataBuffer<'static>,
    nulls: Nulls,
    attributes: Attributes,
}

impl FixedColumn {
    pub fn new(desc: &ColumnDesc, format: StorageFormat) -> Result<Self> {
        let Some(width) = desc.kind.fixed_width() else {
            return Err(err(format!("column {} is not fixed-width", desc.name)));
        };
        desc.check_align()?;
        Ok(FixedColumn {
            kind: desc.kind,
            width,
            align: desc.align,
            format,
            data: DataBuffer::new(0),
            nulls: Nulls::new(),
            attributes: Attributes::new(),
        })
    }

    fn from_parts(desc: &ColumnDesc, format: StorageFormat, data: DataBuffer<'static>, nulls: Nulls) -> Result<Self> {
        let mut col = FixedColumn::new(desc, format)?;
        let slots = if format.is_vec() { nulls.non_null() } else { nulls.rows() };
        if data.used() != slots * col.width {
            return Err(err(format!(
                "column {}: {} data bytes for {} slots of width {}",
                desc.name,
                data.used(),
                slots,
                col.width
            )));
        }
        col.data = data;
        col.nulls = nulls;
        Ok(col)
    }

    /// Rebuilds from the non-null values alone, restoring placeholders in
    /// porc layout.
    fn from_dense(desc: &ColumnDesc, format: StorageFormat, values: &[i64], nulls: Nulls) -> Result<Self> {
        let width = desc.kind.fixed_width().unwrap_or(0);
        if values.len() != nulls.non_null() {
            return Err(err("decoded value count disagrees with non-null rows"));
        }
        let slots = if format.is_vec() { nulls.non_null() } else { nulls.rows() };
        let mut data = DataBuffer::new(slots * width);
        let mut it = values.iter();
        for row in 0..nulls.rows() {
            if nulls.is_null(row) {
                if !format.is_vec() {
                    data.append_zeros(width);
                }
            } else if let Some(v) = it.next() {
                data.append(&i64_to_le(*v, width)[..width]);
            }
        }
        FixedColumn::from_parts(desc, format, data, nulls)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn slot(&self, row: usize) -> usize {
        if self.format.is_vec() {
            self.nulls.dense_index(row)
        } else {
            row
        }
    }

    /// Non-null values, sign-extended, in row order.
    pub(crate) fn dense_values(&self) -> Vec<i64> {
        let w = self.width;
        let raw = self.data.as_slice();
        if self.format.is_vec() || self.nulls.bitmap().is_none() {
            return raw.chunks_exact(w).map(le_to_i64).collect();
        }
        (0..self.nulls.rows())
            .filter(|r| !self.nulls.is_null(*r))
            .map(|r| le_to_i64(&raw[r * w..(r + 1) * w]))
            .collect()
    }
}

impl PaxColumn for FixedColumn {
    fn type_kind(&self) -> TypeKind {
        self.kind
    }

    fn storage_format(&self) -> StorageFormat {
        self.format
    }

    fn append(&mut self, value: &[u8]) -> Result<()> {
        if value.len() != self.width {
            return Err(err(format!("{}-byte value for a {}-byte column", value.len(), self.width)));
        }
        self.data.append(value);
        self.nulls.push(true);
        Ok(())
    }

    fn append_null(&mut self) -> Result<()> {
        if !self.format.is_vec() {
            self.data.append_zeros(self.width);
        }
        self.nulls.push(false);
        Ok(())
    }

    fn rows(&self) -> usize {
        self.nulls.rows()
    }

    fn non_null_rows(&self) -> usize {
        self.nulls.non_null()
    }

    fn set_rows(&mut self, rows: usize) -> Result<()> {
        if rows < self.rows() {
            return Err(err("cannot shrink a column's row count"));
        }
        for _ in self.rows()..rows {
            self.append_null()?;
        }
        Ok(())
    }

    fn null_bitmap(&self) -> Option<&Bitmap> {
        self.nulls.bitmap()
    }

    fn buffer(&mut self) -> Result<&[u8]> {
        Ok(self.data.as_slice())
    }

    fn range_buffer(&self, start: usize, len: usize) -> Result<Cow<'_, [u8]>> {
        let w = self.width;
        let raw = self.data.as_slice();
        if start + len > self.nulls.non_null() {
            return Err(err("range past the column's non-null values"));
        }
        if self.format.is_vec() {
            return Ok(Cow::Borrowed(&raw[start * w..(start + len) * w]));
        }
        if len == 0 {
            return Ok(Cow::Borrowed(&raw[..0]));
        }
        let (Some(first), Some(end)) = (self.nulls.row_of_dense(start), self.nulls.row_of_dense(start + len - 1)) else {
            return Err(err("range past the column's non-null values"));
        };
        let last = end + 1;
        // No null between the two ends: the slots are contiguous.
        if last - first == len {
            return Ok(Cow::Borrowed(&raw[first * w..last * w]));
        }
        let mut out = Vec::with_capacity(len * w);
        for row in (first..last).filter(|r| !self.nulls.is_null(*r)) {
            out.extend_from_slice(&raw[row * w..(row + 1) * w]);
        }
        Ok(Cow::Owned(out))
    }

    fn value(&self, row: usize) -> Result<Option<&[u8]>> {
        self.nulls.check_row(row)?;
        if self.nulls.is_null(row) {
            return Ok(None);
        }
        let s = self.slot(row) * self.width;
        Ok(Some(&self.data.as_slice()[s..s + self.width]))
    }

    fn origin_length(&self) -> usize {
        self.data.used()
    }

    fn encoding(&self) -> EncodingOption {
        EncodingOption::NONE
    }

    fn align(&self) -> usize {
        self.align
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    fn physical_size(&self) -> usize {
        self.data.used() + self.nulls.bitmap_bytes()
    }
}

/// A fixed column whose data stream goes through an integer codec or a
/// block compressor. Integer codecs see only the non-null values; block
/// compressors see the plain stream, placeholders included.
#[derive(Debug)]
pub struct EncodingColumn {
    inner: FixedColumn,
    codec: Codec,
    option: EncodingOption,
    encoded: Option<Vec<u8>>,
}

impl EncodingColumn {
    pub fn new(inner: FixedColumn, option: EncodingOption) -> Self {
        let shape = if inner.kind.is_integer() {
            StreamShape::Integers
        } else {
            StreamShape::FixedOpaque
        };
        let (codec, option) = Codec::resolve(option, shape, true);
        EncodingColumn {
            inner,
            codec,
            option,
            encoded: None,
        }
    }

    pub fn decode(
        desc: &ColumnDesc,
        format: StorageFormat,
        option: EncodingOption,
        src: &[u8],
        origin_len: usize,
        nulls: Nulls,
    ) -> Result<Self> {
        let codec = Codec::for_decode(option, true)?;
        let inner = match &codec {
            Codec::Rle { .. } | Codec::Delta => {
                let values = match nulls.bitmap() {
                    Some(bm) => codec.decode_not_null(src, bm)?,
                    None => codec.decode_ints(src, nulls.rows())?,
                };
                FixedColumn::from_dense(desc, format, &values, nulls)?
            }
            _ => FixedColumn::from_parts(desc, format, codec.decode_bytes(src, origin_len)?, nulls)?,
        };
        Ok(EncodingColumn {
            inner,
            codec,
            option,
            encoded: None,
        })
    }
}

impl PaxColumn for EncodingColumn {
    fn type_kind(&self) -> TypeKind {
        self.inner.type_kind()
    }

    fn storage_format(&self) -> StorageFormat {
        self.inner.storage_format()
    }

    fn append(&mut self, value: &[u8]) -> Result<()> {
        self.encoded = None;
        self.inner.append(value)
    }

    fn append_null(&mut self) -> Result<()> {
        self.encoded = None;
        self.inner.append_null()
    }

    fn rows(&self) -> usize {
        self.inner.rows()
    }

    fn non_null_rows(&self) -> usize {
        self.inner.non_null_rows()
    }

    fn set_rows(&mut self, rows: usize) -> Result<()> {
        self.encoded = None;
        self.inner.set_rows(rows)
    }

    fn null_bitmap(&self) -> Option<&Bitmap> {
        self.inner.null_bitmap()
    }

    fn buffer(&mut self) -> Result<&[u8]> {
        if self.codec.is_plain() {
            return self.inner.buffer();
        }
        if self.encoded.is_none() {
            let inner = &self.inner;
            let encoded = self.codec.encode_ints(|| inner.dense_values(), inner.data.as_slice())?;
            self.encoded = Some(encoded);
        }
        Ok(self.encoded.as_deref().unwrap_or_default())
    }

    fn range_buffer(&self, start: usize, len: usize) -> Result<Cow<'_, [u8]>> {
        self.inner.range_buffer(start, len)
    }

    fn value(&self, row: usize) -> Result<Option<&[u8]>> {
        self.inner.value(row)
    }

    fn origin_length(&self) -> usize {
        self.inner.origin_length()
    }

    fn encoding(&self) -> EncodingOption {
        self.option
    }

    fn align(&self) -> usize {
        if self.codec.is_plain() {
            self.inner.align()
        } else {
            1
        }
    }

    fn attributes(&self) -> &Attributes {
        self.inner.attributes()
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        self.inner.attributes_mut()
    }

    fn physical_size(&self) -> usize {
        self.inner.physical_size()
    }
}
