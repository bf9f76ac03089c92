use tracing::trace;

use crate::buffer::DataBuffer;
use crate::column::{decode_column, new_column, Attributes, ColumnStreams, PaxColumn};
use crate::encoding::{ColumnEncodingKind, EncodingOption};
use crate::format::{ColumnEncoding, StreamKind, StripeFooter};
use crate::types::{ColumnDesc, StorageFormat};
use pax_base::{err, schema_err, Result};

/// The columns of one stripe, in schema order.
#[derive(Debug)]
pub struct PaxColumns {
    columns: Vec<Box<dyn PaxColumn>>,
}

fn padding_for(used: usize, align: usize) -> usize {
    (align - used % align) % align
}

impl PaxColumns {
    /// Fresh columns for `schema`. `encodings` gives each column's option
    /// and `attributes`, when not empty, the previous generation's learned
    /// attributes.
    pub fn new(
        schema: &[ColumnDesc],
        format: StorageFormat,
        encodings: impl Fn(usize) -> EncodingOption,
        offsets_option: EncodingOption,
        mut attributes: Vec<Attributes>,
    ) -> Result<Self> {
        attributes.resize(schema.len(), Attributes::new());
        let columns = schema
            .iter()
            .zip(attributes)
            .enumerate()
            .map(|(i, (desc, attrs))| new_column(desc, format, encodings(i), offsets_option, attrs))
            .collect::<Result<Vec<_>>>()?;
        Ok(PaxColumns { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, i: usize) -> Result<&dyn PaxColumn> {
        match self.columns.get(i) {
            Some(c) => Ok(c.as_ref()),
            None => Err(schema_err(format!("no column {i} among {}", self.columns.len()))),
        }
    }

    pub fn column_mut(&mut self, i: usize) -> Result<&mut Box<dyn PaxColumn>> {
        let n = self.columns.len();
        match self.columns.get_mut(i) {
            Some(c) => Ok(c),
            None => Err(schema_err(format!("no column {i} among {n}"))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn PaxColumn> {
        self.columns.iter().map(|c| c.as_ref())
    }

    /// Row count shared by every column.
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.rows())
    }

    pub fn physical_size(&self) -> usize {
        self.columns.iter().map(|c| c.physical_size()).sum()
    }

    pub fn attributes(&self) -> Vec<Attributes> {
        self.columns.iter().map(|c| c.attributes().clone()).collect()
    }

    /// Every column's out-of-line bytes in column order, and each column's
    /// share of them.
    pub fn external_toast(&self) -> (Vec<u8>, Vec<u64>) {
        let mut all = Vec::new();
        let mut lens = Vec::with_capacity(self.columns.len());
        for c in &self.columns {
            all.extend_from_slice(c.external_toast());
            lens.push(c.external_toast().len() as u64);
        }
        (all, lens)
    }

    pub fn toast_count(&self) -> usize {
        self.columns
            .iter()
            .filter_map(|c| c.toast_rows())
            .map(|bm| bm.count())
            .sum()
    }

    /// Serializes every column into one buffer, each stream padded to its
    /// alignment relative to the buffer start. `on_stream` sees (kind,
    /// column, length, padding) per stream and `on_encoding` (column,
    /// encoding) per column.
    pub fn data_buffer(
        &mut self,
        mut on_stream: impl FnMut(StreamKind, usize, usize, usize),
        mut on_encoding: impl FnMut(usize, ColumnEncoding),
    ) -> Result<DataBuffer<'static>> {
        let rows = self.rows();
        if let Some(c) = self.columns.iter().find(|c| c.rows() != rows) {
            return Err(schema_err(format!("column of {} rows in a stripe of {rows}", c.rows())));
        }
        let mut out = DataBuffer::new(self.physical_size());
        let mut put = |out: &mut DataBuffer<'static>, kind: StreamKind, col: usize, bytes: &[u8], align: usize| {
            let padding = padding_for(out.used(), align);
            out.append_zeros(padding);
            out.append(bytes);
            on_stream(kind, col, bytes.len(), padding);
        };
        for (i, col) in self.columns.iter_mut().enumerate() {
            if let Some(bm) = col.null_bitmap().filter(|_| col.has_null()) {
                put(&mut out, StreamKind::Present, i, &bm.to_bytes(), 1);
            }

            col.buffer()?;
            let (option, align) = (col.encoding(), col.align());
            let origin = col.origin_length();
            put(&mut out, StreamKind::Data, i, col.buffer()?, align);

            let mut encoding = ColumnEncoding {
                kind: option.kind,
                compress_level: option.level,
                length: origin as u64,
                offset_stream_kind: ColumnEncodingKind::NoEncoded,
                ..Default::default()
            };
            if let Some((offsets_option, offsets_origin)) = col.offsets_encoding() {
                let align = if offsets_option.kind == ColumnEncodingKind::NoEncoded { 4 } else { 1 };
                let Some(bytes) = col.offsets_buffer()? else {
                    return Err(err("non-fixed column without an offsets stream"));
                };
                put(&mut out, StreamKind::Offset, i, bytes, align);
                encoding.offset_stream_kind = offsets_option.kind;
                encoding.offset_stream_compress_level = offsets_option.level;
                encoding.offset_stream_length = offsets_origin as u64;
            }

            if let Some(bm) = col.toast_rows() {
                put(&mut out, StreamKind::Toast, i, &bm.to_bytes(), 1);
            }
            trace!(target: "pax", "column {} encoded as {} ({} origin bytes)", i, option.kind, origin);
            on_encoding(i, encoding);
        }
        Ok(out)
    }

    /// Rebuilds the columns of a stripe from its data section and footer.
    pub fn decode_stripe(
        schema: &[ColumnDesc],
        format: StorageFormat,
        footer: &StripeFooter,
        rows: usize,
        data: &[u8],
    ) -> Result<Self> {
        if footer.encodings.len() != schema.len() {
            return Err(schema_err(format!(
                "stripe has {} column encodings for {} columns",
                footer.encodings.len(),
                schema.len()
            )));
        }
        let mut streams = vec![ColumnStreams::default(); schema.len()];
        let mut pos = 0usize;
        for s in &footer.streams {
            let col = s.column as usize;
            let Some(target) = streams.get_mut(col) else {
                return Err(schema_err(format!("stream for column {col} beyond schema")));
            };
            let start = pos + s.padding as usize;
            let end = start + s.length as usize;
            let Some(bytes) = data.get(start..end) else {
                return Err(err("stream past end of stripe data"));
            };
            match s.kind {
                StreamKind::Present => target.present = Some(bytes),
                StreamKind::Data => target.data = bytes,
                StreamKind::Offset => target.offsets = Some(bytes),
                StreamKind::Toast => target.toast = Some(bytes),
            }
            pos = end;
        }
        let columns = schema
            .iter()
            .zip(&footer.encodings)
            .zip(streams)
            .map(|((desc, enc), s)| decode_column(desc, format, enc, rows, s))
            .collect::<Result<Vec<_>>>()?;
        Ok(PaxColumns { columns })
    }
}
