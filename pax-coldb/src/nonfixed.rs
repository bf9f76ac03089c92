use std::borrow::Cow;
use std::collections::HashSet;

use tracing::debug;

use crate::buffer::DataBuffer;
use crate::column::{Attributes, Nulls, PaxColumn};
use crate::dict::{dict_decode, dict_encode};
use crate::encoding::{Codec, ColumnEncodingKind, EncodingOption, StreamShape};
use crate::types::{ColumnDesc, StorageFormat, TypeKind};
use pax_base::{err, Bitmap, Result};

/// Size of the in-stripe reference that replaces an out-of-line value:
/// offset then length, both u64 little-endian, relative to the column's
/// external toast bytes in the same stripe.
pub const TOAST_REF_LEN: usize = 16;

pub const DICT_FALLBACK_ATTR: &str = "dict.fallback";

// Above this share of distinct values a dictionary stops paying for itself.
const DICT_MAX_DISTINCT_RATIO: f64 = 0.8;

pub fn encode_toast_ref(offset: u64, len: u64) -> [u8; TOAST_REF_LEN] {
    let mut out = [0u8; TOAST_REF_LEN];
    out[..8].copy_from_slice(&offset.to_le_bytes());
    out[8..].copy_from_slice(&len.to_le_bytes());
    out
}

pub fn decode_toast_ref(bytes: &[u8]) -> Result<(u64, u64)> {
    if bytes.len() != TOAST_REF_LEN {
        return Err(err(format!("toast reference of {} bytes", bytes.len())));
    }
    let mut off = [0u8; 8];
    let mut len = [0u8; 8];
    off.copy_from_slice(&bytes[..8]);
    len.copy_from_slice(&bytes[8..]);
    Ok((u64::from_le_bytes(off), u64::from_le_bytes(len)))
}

/// Variable-length values concatenated in the data stream, with a u32
/// offsets stream holding `rows + 1` entries. Null rows are zero-length.
#[derive(Debug)]
pub struct NonFixedColumn {
    kind: TypeKind,
    align: usize,
    format: StorageFormat,
    data: DataBuffer<'static>,
    offsets: DataBuffer<'static>,
    nulls: Nulls,
    toast: Option<Bitmap>,
    external: Vec<u8>,
    attributes: Attributes,
}

impl NonFixedColumn {
    pub fn new(desc: &ColumnDesc, format: StorageFormat) -> Result<Self> {
        if desc.kind.fixed_width().is_some() {
            return Err(err(format!("column {} is fixed-width", desc.name)));
        }
        desc.check_align()?;
        let mut offsets = DataBuffer::new(4);
        offsets.append(&0u32.to_le_bytes());
        Ok(NonFixedColumn {
            kind: desc.kind,
            align: desc.align,
            format,
            data: DataBuffer::new(0),
            offsets,
            nulls: Nulls::new(),
            toast: None,
            external: Vec::new(),
            attributes: Attributes::new(),
        })
    }

    fn from_parts(
        desc: &ColumnDesc,
        format: StorageFormat,
        data: DataBuffer<'static>,
        offsets: DataBuffer<'static>,
        nulls: Nulls,
        toast: Option<Bitmap>,
    ) -> Result<Self> {
        let mut col = NonFixedColumn::new(desc, format)?;
        if offsets.used() != (nulls.rows() + 1) * 4 {
            return Err(err(format!(
                "column {}: {} offset bytes for {} rows",
                desc.name,
                offsets.used(),
                nulls.rows()
            )));
        }
        col.data = data;
        col.offsets = offsets;
        col.nulls = nulls;
        let mut prev = 0;
        for i in 0..=col.rows() {
            let off = col.offset(i);
            if off < prev || (i == 0 && off != 0) {
                return Err(err(format!("column {}: offsets not monotonic at {i}", desc.name)));
            }
            prev = off;
        }
        if prev != col.data.used() {
            return Err(err(format!("column {}: last offset disagrees with data length", desc.name)));
        }
        if let Some(bm) = &toast {
            if bm.len() != col.rows() {
                return Err(err("toast bitmap length disagrees with row count"));
            }
        }
        col.toast = toast;
        Ok(col)
    }

    fn offset(&self, i: usize) -> usize {
        let b = &self.offsets.as_slice()[i * 4..i * 4 + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
    }

    fn push_offset(&mut self) -> Result<()> {
        let Ok(end) = u32::try_from(self.data.used()) else {
            return Err(err("non-fixed column data exceeds u32 offsets"));
        };
        self.offsets.append(&end.to_le_bytes());
        Ok(())
    }

    fn push_toast_bit(&mut self, toasted: bool) {
        if toasted && self.toast.is_none() {
            self.toast = Some(Bitmap::with_len(self.nulls.rows(), false));
        }
        if let Some(bm) = &mut self.toast {
            bm.push(toasted);
        }
    }

    /// Stored bytes of every non-null row, in order.
    fn values(&self) -> impl Iterator<Item = &[u8]> + Clone + '_ {
        let raw = self.data.as_slice();
        (0..self.rows())
            .filter(move |r| !self.nulls.is_null(*r))
            .map(move |r| &raw[self.offset(r)..self.offset(r + 1)])
    }

    fn offsets_as_ints(&self) -> Vec<i64> {
        (0..=self.rows()).map(|i| self.offset(i) as i64).collect()
    }
}

impl PaxColumn for NonFixedColumn {
    fn type_kind(&self) -> TypeKind {
        self.kind
    }

    fn storage_format(&self) -> StorageFormat {
        self.format
    }

    fn append(&mut self, value: &[u8]) -> Result<()> {
        self.data.append(value);
        self.push_offset()?;
        self.push_toast_bit(false);
        self.nulls.push(true);
        Ok(())
    }

    fn append_null(&mut self) -> Result<()> {
        self.push_offset()?;
        self.push_toast_bit(false);
        self.nulls.push(false);
        Ok(())
    }

    fn append_toast(&mut self, external: &[u8]) -> Result<()> {
        let r = encode_toast_ref(self.external.len() as u64, external.len() as u64);
        self.external.extend_from_slice(external);
        self.data.append(&r);
        self.push_offset()?;
        self.push_toast_bit(true);
        self.nulls.push(true);
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
        if start + len > self.nulls.non_null() {
            return Err(err("range past the column's non-null values"));
        }
        let (Some(first), Some(last)) = (self.nulls.row_of_dense(start), self.nulls.row_of_dense(start + len)) else {
            return Err(err("range past the column's non-null values"));
        };
        // Null rows are zero-length, so the span holds exactly the values.
        Ok(Cow::Borrowed(&self.data.as_slice()[self.offset(first)..self.offset(last)]))
    }

    fn value(&self, row: usize) -> Result<Option<&[u8]>> {
        self.nulls.check_row(row)?;
        if self.nulls.is_null(row) {
            return Ok(None);
        }
        Ok(Some(&self.data.as_slice()[self.offset(row)..self.offset(row + 1)]))
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
        self.data.used()
            + self.offsets.used()
            + self.nulls.bitmap_bytes()
            + self.toast.as_ref().map_or(0, |bm| bm.len().div_ceil(8))
            + self.external.len()
    }

    fn offsets_buffer(&mut self) -> Result<Option<&[u8]>> {
        Ok(Some(self.offsets.as_slice()))
    }

    fn offsets_encoding(&self) -> Option<(EncodingOption, usize)> {
        Some((EncodingOption::NONE, self.offsets.used()))
    }

    fn toast_rows(&self) -> Option<&Bitmap> {
        self.toast.as_ref()
    }

    fn external_toast(&self) -> &[u8] {
        &self.external
    }
}

/// A non-fixed column whose data and offsets streams are transformed
/// independently: the data by a dictionary or a block compressor, the
/// offsets by an integer codec or a block compressor.
#[derive(Debug)]
pub struct NonFixedEncodingColumn {
    inner: NonFixedColumn,
    codec: Codec,
    option: EncodingOption,
    offsets_codec: Codec,
    offsets_option: EncodingOption,
    encoded: Option<Vec<u8>>,
    encoded_offsets: Option<Vec<u8>>,
}

impl NonFixedEncodingColumn {
    pub fn new(inner: NonFixedColumn, option: EncodingOption, offsets_option: EncodingOption) -> Self {
        let option = match inner.attributes.get(DICT_FALLBACK_ATTR) {
            Some(fallback) if option.kind == ColumnEncodingKind::Dictionary => {
                let kind = fallback.parse().unwrap_or(ColumnEncodingKind::CompressZstd);
                EncodingOption::new(kind, 0)
            }
            _ => option,
        };
        let offsets_option = match offsets_option.kind {
            ColumnEncodingKind::Default => EncodingOption::new(ColumnEncodingKind::DirectDelta, 0),
            _ => offsets_option,
        };
        let (codec, option) = Codec::resolve(option, StreamShape::Values, false);
        let (offsets_codec, offsets_option) = Codec::resolve(offsets_option, StreamShape::Integers, false);
        NonFixedEncodingColumn {
            inner,
            codec,
            option,
            offsets_codec,
            offsets_option,
            encoded: None,
            encoded_offsets: None,
        }
    }

    pub fn decode(
        desc: &ColumnDesc,
        format: StorageFormat,
        (option, src, origin_len): (EncodingOption, &[u8], usize),
        (offsets_option, offsets_src, offsets_len): (EncodingOption, &[u8], usize),
        nulls: Nulls,
        toast: Option<Bitmap>,
    ) -> Result<Self> {
        let codec = Codec::for_decode(option, false)?;
        let data = match &codec {
            Codec::Dictionary => {
                let mut out = DataBuffer::new(origin_len);
                dict_decode(src, &mut out)?;
                if out.used() != origin_len {
                    return Err(err("dictionary expansion disagrees with origin length"));
                }
                out
            }
            _ => codec.decode_bytes(src, origin_len)?,
        };
        let offsets_codec = Codec::for_decode(offsets_option, false)?;
        let offsets = match &offsets_codec {
            Codec::Rle { .. } | Codec::Delta => {
                let ints = offsets_codec.decode_ints(offsets_src, nulls.rows() + 1)?;
                let mut out = DataBuffer::new(ints.len() * 4);
                for v in ints {
                    let Ok(v) = u32::try_from(v) else {
                        return Err(err("offset out of u32 range"));
                    };
                    out.append(&v.to_le_bytes());
                }
                out
            }
            _ => offsets_codec.decode_bytes(offsets_src, offsets_len)?,
        };
        let inner = NonFixedColumn::from_parts(desc, format, data, offsets, nulls, toast)?;
        Ok(NonFixedEncodingColumn {
            inner,
            codec,
            option,
            offsets_codec,
            offsets_option,
            encoded: None,
            encoded_offsets: None,
        })
    }

    fn invalidate(&mut self) {
        self.encoded = None;
        self.encoded_offsets = None;
    }

    fn encode_data(&mut self) -> Result<Vec<u8>> {
        if let Codec::Dictionary = self.codec {
            let non_null = self.inner.non_null_rows();
            let distinct = self.inner.values().collect::<HashSet<_>>().len();
            if non_null == 0 || (distinct as f64) <= DICT_MAX_DISTINCT_RATIO * non_null as f64 {
                return Ok(dict_encode(self.inner.values()).bytes);
            }
            debug!(
                target: "pax",
                "{} distinct values over {} rows, falling back to zstd",
                distinct, non_null
            );
            let fallback = EncodingOption::new(ColumnEncodingKind::CompressZstd, 0);
            let (codec, option) = Codec::resolve(fallback, StreamShape::Values, false);
            self.codec = codec;
            self.option = option;
            self.inner
                .attributes
                .insert(DICT_FALLBACK_ATTR.to_string(), option.kind.to_string());
        }
        match &self.codec {
            Codec::Block { compressor, level } => self.codec.compress(compressor.as_ref(), *level, self.inner.data.as_slice()),
            _ => Ok(self.inner.data.as_slice().to_vec()),
        }
    }
}

impl PaxColumn for NonFixedEncodingColumn {
    fn type_kind(&self) -> TypeKind {
        self.inner.type_kind()
    }

    fn storage_format(&self) -> StorageFormat {
        self.inner.storage_format()
    }

    fn append(&mut self, value: &[u8]) -> Result<()> {
        self.invalidate();
        self.inner.append(value)
    }

    fn append_null(&mut self) -> Result<()> {
        self.invalidate();
        self.inner.append_null()
    }

    fn append_toast(&mut self, external: &[u8]) -> Result<()> {
        self.invalidate();
        self.inner.append_toast(external)
    }

    fn rows(&self) -> usize {
        self.inner.rows()
    }

    fn non_null_rows(&self) -> usize {
        self.inner.non_null_rows()
    }

    fn set_rows(&mut self, rows: usize) -> Result<()> {
        self.invalidate();
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
            let encoded = self.encode_data()?;
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

    fn offsets_buffer(&mut self) -> Result<Option<&[u8]>> {
        if self.offsets_codec.is_plain() {
            return self.inner.offsets_buffer();
        }
        if self.encoded_offsets.is_none() {
            let inner = &self.inner;
            let encoded = self
                .offsets_codec
                .encode_ints(|| inner.offsets_as_ints(), inner.offsets.as_slice())?;
            self.encoded_offsets = Some(encoded);
        }
        Ok(self.encoded_offsets.as_deref())
    }

    fn offsets_encoding(&self) -> Option<(EncodingOption, usize)> {
        Some((self.offsets_option, self.inner.offsets.used()))
    }

    fn toast_rows(&self) -> Option<&Bitmap> {
        self.inner.toast_rows()
    }

    fn external_toast(&self) -> &[u8] {
        self.inner.external_toast()
    }
}
