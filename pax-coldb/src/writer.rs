use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::column::Attributes;
use crate::columns::PaxColumns;
use crate::format::{
    encode_message, encode_trailer, FileFooter, PostScript, Stream, StripeFooter, StripeInformation,
};
use crate::ioutil::{read_vec, File, FileSystem};
use crate::options::WriterOptions;
use crate::stats::{ColumnStatistics, StatsCollector};
use crate::types::Datum;
use pax_base::{err, schema_err, Result};

/// Receives a copy of every stripe write before it reaches the file.
pub trait WalSink: Send {
    fn log_write(&mut self, file: &Path, offset: u64, bytes: &[u8]) -> Result<()>;
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct WriteSummary {
    pub file_name: PathBuf,
    pub block_id: u64,
    pub rel_id: u64,
    pub file_size: u64,
    pub num_tuples: u64,
    pub exist_ext_toast: bool,
    pub stats: Vec<ColumnStatistics>,
}

pub type SummaryCallback = Box<dyn FnMut(&WriteSummary) + Send>;

/// Writes one micro-partition file. Rows accumulate in memory and go out
/// as a stripe every `group_limit` rows; `close` appends the file footer.
pub struct OrcWriter {
    fs: Arc<dyn FileSystem>,
    options: WriterOptions,
    file: Option<Box<dyn File>>,
    toast_file: Option<Box<dyn File>>,
    columns: PaxColumns,
    current_offset: u64,
    toast_offset: u64,
    stripes: Vec<StripeInformation>,
    stripe_stats: StatsCollector,
    file_stats: StatsCollector,
    user_stats: Option<StatsCollector>,
    num_tuples: u64,
    summary_callback: Option<SummaryCallback>,
    wal: Option<Box<dyn WalSink>>,
    closed: bool,
}

fn build_columns(options: &WriterOptions, attributes: Vec<Attributes>) -> Result<PaxColumns> {
    PaxColumns::new(
        &options.schema,
        options.storage_format,
        |i| options.encoding(i),
        options.offsets_encoding,
        attributes,
    )
}

fn build_stats(options: &WriterOptions) -> StatsCollector {
    StatsCollector::new(&options.schema, &options.min_max_columns, &options.bloom_filter_columns)
}

impl OrcWriter {
    pub fn create(options: WriterOptions, fs: Arc<dyn FileSystem>) -> Result<Self> {
        options.validate()?;
        let file = fs.create(&options.file_name)?;
        let toast_file = match options.toast_threshold {
            Some(_) => Some(fs.create(&options.toast_file_name())?),
            None => None,
        };
        let columns = build_columns(&options, Vec::new())?;
        let stripe_stats = build_stats(&options);
        let file_stats = build_stats(&options);
        debug!(target: "pax", "created {} ({} columns)", options.file_name.display(), options.schema.len());
        Ok(OrcWriter {
            fs,
            options,
            file: Some(file),
            toast_file,
            columns,
            current_offset: 0,
            toast_offset: 0,
            stripes: Vec::new(),
            stripe_stats,
            file_stats,
            user_stats: None,
            num_tuples: 0,
            summary_callback: None,
            wal: None,
            closed: false,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn file_name(&self) -> &Path {
        &self.options.file_name
    }

    pub fn num_tuples(&self) -> u64 {
        self.num_tuples
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stripes(&self) -> &[StripeInformation] {
        &self.stripes
    }

    /// Rows appended since the last flush.
    pub fn buffered_rows(&self) -> usize {
        self.columns.rows()
    }

    /// Bytes written so far plus the in-memory stripe's footprint.
    pub fn physical_size(&self) -> u64 {
        self.current_offset + self.columns.physical_size() as u64
    }

    pub fn set_summary_callback(&mut self, callback: impl FnMut(&WriteSummary) + Send + 'static) {
        self.summary_callback = Some(Box::new(callback));
    }

    /// Replaces the file-level statistics reported in the summary.
    pub fn set_stats_collector(&mut self, collector: StatsCollector) {
        self.user_stats = Some(collector);
    }

    pub fn set_wal_sink(&mut self, sink: Box<dyn WalSink>) {
        self.wal = Some(sink);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(err(format!("writer for {} is closed", self.options.file_name.display())));
        }
        Ok(())
    }

    pub fn write_tuple(&mut self, row: &[Datum]) -> Result<()> {
        self.check_open()?;
        if row.len() != self.options.schema.len() {
            return Err(schema_err(format!(
                "row of {} values for {} columns",
                row.len(),
                self.options.schema.len()
            )));
        }
        // Every datum converts before any column grows, so a rejected row
        // leaves the stripe untouched.
        let values = self
            .options
            .schema
            .iter()
            .zip(row)
            .map(|(desc, datum)| match datum {
                Datum::Null => Ok(None),
                d => d.column_bytes(desc.kind).map(Some),
            })
            .collect::<Result<Vec<_>>>()?;
        for (i, (desc, value)) in self.options.schema.iter().zip(values).enumerate() {
            let col = self.columns.column_mut(i)?;
            let Some(bytes) = value else {
                col.append_null()?;
                continue;
            };
            match self.options.toast_threshold {
                Some(t) if desc.kind.fixed_width().is_none() && bytes.len() > t => col.append_toast(&bytes)?,
                _ => col.append(&bytes)?,
            }
        }
        self.stripe_stats.add_row(row)?;
        self.file_stats.add_row(row)?;
        if let Some(stats) = &mut self.user_stats {
            stats.add_row(row)?;
        }
        self.num_tuples += 1;
        if self.columns.rows() >= self.options.group_limit {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes buffered rows as a stripe. Without buffered rows this does
    /// nothing.
    pub fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        if self.columns.rows() == 0 {
            return Ok(());
        }
        let stats = self.stripe_stats.finish();
        let attributes = self.columns.attributes();
        let mut columns = std::mem::replace(&mut self.columns, build_columns(&self.options, attributes)?);
        self.write_stripe(&mut columns, stats)?;
        // Attributes learned while encoding, such as a dictionary fallback,
        // are only known after serializing.
        self.columns = build_columns(&self.options, columns.attributes())?;
        self.stripe_stats.reset();
        Ok(())
    }

    /// Serializes `columns` in memory, then appends the stripe with one
    /// positional write at the current end of data.
    fn write_stripe(&mut self, columns: &mut PaxColumns, column_stats: Vec<ColumnStatistics>) -> Result<()> {
        let rows = columns.rows();
        let mut streams = Vec::new();
        let mut encodings = Vec::new();
        let data = columns.data_buffer(
            |kind, column, length, padding| {
                streams.push(Stream {
                    kind,
                    column: column as u32,
                    length: length as u64,
                    padding: padding as u32,
                })
            },
            |_, enc| encodings.push(enc),
        )?;
        let footer = encode_message(&StripeFooter { streams, encodings })?;
        let mut stripe = data.into_vec();
        let data_length = stripe.len() as u64;
        stripe.extend_from_slice(&footer);

        let (toast, ext_toast_length) = columns.external_toast();
        if !toast.is_empty() {
            let Some(toast_file) = &mut self.toast_file else {
                return Err(err("out-of-line values without a toast file"));
            };
            toast_file.write_at(&toast, self.toast_offset)?;
        }
        self.write_data(&stripe)?;

        let info = StripeInformation {
            offset: self.current_offset,
            data_length,
            footer_length: footer.len() as u64,
            number_of_rows: rows as u64,
            toast_offset: self.toast_offset,
            toast_length: toast.len() as u64,
            number_of_toast: columns.toast_count() as u64,
            ext_toast_length,
            column_stats,
        };
        debug!(
            target: "pax",
            "stripe {} of {}: {} rows, {} bytes at {}",
            self.stripes.len(),
            self.options.file_name.display(),
            rows,
            stripe.len(),
            self.current_offset
        );
        self.current_offset += stripe.len() as u64;
        self.toast_offset += toast.len() as u64;
        self.stripes.push(info);
        Ok(())
    }

    fn write_data(&mut self, bytes: &[u8]) -> Result<()> {
        if self.options.wal {
            let Some(wal) = &mut self.wal else {
                return Err(err("writer has WAL enabled but no sink"));
            };
            wal.log_write(&self.options.file_name, self.current_offset, bytes)?;
        }
        let Some(file) = &mut self.file else {
            return Err(err("writer has no open file"));
        };
        file.write_at(bytes, self.current_offset)
    }

    /// Flushes remaining rows, then writes the file footer and postscript.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        let footer = FileFooter {
            content_length: self.current_offset,
            number_of_rows: self.num_tuples,
            storage_format: self.options.storage_format,
            schema: self.options.schema.clone(),
            column_attributes: self.columns.attributes(),
            stripes: self.stripes.clone(),
            column_stats: self.file_stats.finish(),
        };
        let footer = encode_message(&footer)?;
        let postscript = encode_message(&PostScript::new(footer.len() as u64))?;
        let mut tail = footer;
        tail.extend_from_slice(&postscript);
        tail.extend_from_slice(&encode_trailer(postscript.len()));
        let Some(mut file) = self.file.take() else {
            return Err(err("writer has no open file"));
        };
        file.write_at(&tail, self.current_offset)?;
        file.flush()?;
        let file_size = self.current_offset + tail.len() as u64;

        if let Some(mut toast_file) = self.toast_file.take() {
            if self.toast_offset == 0 {
                drop(toast_file);
                self.fs.delete(&self.options.toast_file_name())?;
            } else {
                toast_file.flush()?;
            }
        }
        self.closed = true;
        debug!(
            target: "pax",
            "closed {}: {} rows in {} stripes, {} bytes",
            self.options.file_name.display(),
            self.num_tuples,
            self.stripes.len(),
            file_size
        );

        let summary = WriteSummary {
            file_name: self.options.file_name.clone(),
            block_id: self.options.block_id,
            rel_id: self.options.rel_id,
            file_size,
            num_tuples: self.num_tuples,
            exist_ext_toast: self.toast_offset > 0,
            stats: match &self.user_stats {
                Some(stats) => stats.finish(),
                None => self.file_stats.finish(),
            },
        };
        if let Some(cb) = &mut self.summary_callback {
            cb(&summary);
        }
        Ok(())
    }

    /// Moves `other`'s stripes into this file by byte copy, then its
    /// buffered rows, and deletes `other`'s files. Rows already buffered
    /// here are flushed first, so they read back ahead of `other`'s.
    pub fn merge_to(&mut self, mut other: OrcWriter) -> Result<()> {
        self.check_open()?;
        other.check_open()?;
        if self.options.rel_id != other.options.rel_id {
            return Err(err(format!(
                "cannot merge relation {} into relation {}",
                other.options.rel_id, self.options.rel_id
            )));
        }
        if self.options.file_name == other.options.file_name {
            return Err(err("cannot merge a writer into itself"));
        }
        if self.options.schema != other.options.schema || self.options.storage_format != other.options.storage_format {
            return Err(schema_err("cannot merge writers of different schemas"));
        }
        self.flush()?;

        let toast_base = self.toast_offset;
        if other.toast_offset > 0 {
            let (Some(theirs), Some(ours)) = (&mut other.toast_file, &mut self.toast_file) else {
                return Err(err("merging out-of-line values into a writer without a toast file"));
            };
            let bytes = read_vec(theirs.as_mut(), 0, other.toast_offset as usize)?;
            ours.write_at(&bytes, toast_base)?;
            self.toast_offset += bytes.len() as u64;
        }
        for info in &other.stripes {
            let Some(theirs) = &mut other.file else {
                return Err(err("merge source has no open file"));
            };
            let bytes = read_vec(theirs.as_mut(), info.offset, info.length() as usize)?;
            self.write_data(&bytes)?;
            self.stripes.push(StripeInformation {
                offset: self.current_offset,
                toast_offset: toast_base + info.toast_offset,
                ..info.clone()
            });
            self.current_offset += bytes.len() as u64;
        }
        if other.columns.rows() > 0 {
            let stats = other.stripe_stats.finish();
            let mut columns = std::mem::replace(&mut other.columns, build_columns(&other.options, Vec::new())?);
            self.write_stripe(&mut columns, stats)?;
        }

        match (&mut self.user_stats, &other.user_stats) {
            (Some(ours), Some(theirs)) => ours.merge(theirs)?,
            // Our rows so far are described by the file statistics.
            (None, Some(theirs)) => {
                let mut adopted = theirs.clone();
                adopted.merge(&self.file_stats)?;
                self.user_stats = Some(adopted);
            }
            (_, None) => {}
        }
        self.file_stats.merge(&other.file_stats)?;
        self.num_tuples += other.num_tuples;

        debug!(
            target: "pax",
            "merged {} ({} rows in {} stripes) into {}",
            other.options.file_name.display(),
            other.num_tuples,
            other.stripes.len(),
            self.options.file_name.display()
        );
        other.file = None;
        other.toast_file = None;
        other.closed = true;
        other.fs.delete(&other.options.file_name)?;
        let toast_name = other.options.toast_file_name();
        if other.fs.exists(&toast_name) {
            other.fs.delete(&toast_name)?;
        }
        Ok(())
    }
}

impl Drop for OrcWriter {
    fn drop(&mut self) {
        if !self.closed && self.num_tuples > 0 {
            warn!(target: "pax", "writer for {} dropped without close", self.options.file_name.display());
        }
    }
}
