use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::buffer::DataBuffer;
use crate::encoding::{ColumnEncodingKind, EncodingOption};
use crate::stats::ColumnStatistics;
use crate::types::{ColumnDesc, StorageFormat};
use pax_base::{err, Bitmap, Result};

pub const DEFAULT_GROUP_LIMIT: usize = 16384;

/// Values longer than this in non-fixed columns go to the toast file.
pub const DEFAULT_TOAST_THRESHOLD: usize = 8192;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    pub file_name: PathBuf,
    pub block_id: u64,
    pub rel_id: u64,
    pub schema: Vec<ColumnDesc>,
    /// One per column; an empty list means every column uses the default.
    pub encodings: Vec<EncodingOption>,
    /// Encoding of non-fixed columns' offsets streams.
    pub offsets_encoding: EncodingOption,
    /// Columns collecting min/max statistics, by name.
    pub min_max_columns: Vec<String>,
    /// Columns collecting a bloom filter, by name.
    pub bloom_filter_columns: Vec<String>,
    pub group_limit: usize,
    pub storage_format: StorageFormat,
    pub wal: bool,
    /// `None` keeps every value inline.
    pub toast_threshold: Option<usize>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            file_name: PathBuf::new(),
            block_id: 0,
            rel_id: 0,
            schema: Vec::new(),
            encodings: Vec::new(),
            offsets_encoding: EncodingOption::new(ColumnEncodingKind::Default, 0),
            min_max_columns: Vec::new(),
            bloom_filter_columns: Vec::new(),
            group_limit: DEFAULT_GROUP_LIMIT,
            storage_format: StorageFormat::Porc,
            wal: false,
            toast_threshold: Some(DEFAULT_TOAST_THRESHOLD),
        }
    }
}

impl WriterOptions {
    pub fn new(file_name: impl Into<PathBuf>, schema: Vec<ColumnDesc>) -> Self {
        WriterOptions {
            file_name: file_name.into(),
            schema,
            ..Default::default()
        }
    }

    pub fn encoding(&self, col: usize) -> EncodingOption {
        self.encodings.get(col).copied().unwrap_or_default()
    }

    pub fn toast_file_name(&self) -> PathBuf {
        let mut name = self.file_name.clone().into_os_string();
        name.push(".toast");
        PathBuf::from(name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_name.as_os_str().is_empty() {
            return Err(err("writer needs a file name"));
        }
        if self.schema.is_empty() {
            return Err(err("writer needs at least one column"));
        }
        if self.group_limit == 0 {
            return Err(err("group limit must be positive"));
        }
        if !self.encodings.is_empty() && self.encodings.len() != self.schema.len() {
            return Err(err(format!(
                "{} encodings for {} columns",
                self.encodings.len(),
                self.schema.len()
            )));
        }
        for desc in &self.schema {
            desc.check_align()?;
        }
        for name in self.min_max_columns.iter().chain(&self.bloom_filter_columns) {
            if !self.schema.iter().any(|c| &c.name == name) {
                return Err(err(format!("statistics requested for unknown column {name}")));
            }
        }
        if self.toast_threshold == Some(0) {
            return Err(err("toast threshold must be positive"));
        }
        Ok(())
    }
}

/// Decides from a group's statistics whether the reader may skip it.
pub trait GroupFilter: Send {
    /// False when no row of the group can match.
    fn keep(&self, group: usize, stats: &[ColumnStatistics]) -> bool;
}

impl<F: Fn(usize, &[ColumnStatistics]) -> bool + Send> GroupFilter for F {
    fn keep(&self, group: usize, stats: &[ColumnStatistics]) -> bool {
        self(group, stats)
    }
}

#[derive(Default)]
pub struct ReaderOptions {
    /// Scratch space reused for stripe reads.
    pub reused_buffer: Option<DataBuffer<'static>>,
    pub filter: Option<Box<dyn GroupFilter>>,
    /// Set bits are deleted rows, by file row number.
    pub visibility_map: Option<Bitmap>,
    /// Schema the caller expects; checked against the file's.
    pub schema: Option<Vec<ColumnDesc>>,
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("reused_buffer", &self.reused_buffer.as_ref().map(|b| b.capacity()))
            .field("filter", &self.filter.is_some())
            .field("visibility_map", &self.visibility_map)
            .field("schema", &self.schema)
            .finish()
    }
}
