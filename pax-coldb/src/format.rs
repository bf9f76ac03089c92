// Footer messages. Every stripe is followed by its StripeFooter; the file
// ends with the FileFooter, the PostScript, and an 8-byte little-endian
// length of the postscript. Messages are MessagePack with named fields.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::column::Attributes;
use crate::encoding::ColumnEncodingKind;
use crate::stats::ColumnStatistics;
use crate::types::{ColumnDesc, StorageFormat};
use pax_base::{err, Result};

pub const MAGIC: &str = "PORC";
pub const FORMAT_VERSION: u32 = 1;
pub const WRITER_ID: &str = "pax-coldb";
pub const TRAILER_LEN: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Not-null bitmap; present only for columns with nulls.
    Present,
    Data,
    /// Offsets of a non-fixed column.
    Offset,
    /// Bitmap of rows whose data is a toast reference.
    Toast,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Stream {
    pub kind: StreamKind,
    pub column: u32,
    pub length: u64,
    /// Zero bytes written ahead of the stream to align it.
    pub padding: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct ColumnEncoding {
    pub kind: ColumnEncodingKind,
    pub compress_level: i32,
    /// Unencoded length of the data stream.
    pub length: u64,
    pub offset_stream_kind: ColumnEncodingKind,
    pub offset_stream_compress_level: i32,
    pub offset_stream_length: u64,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct StripeFooter {
    pub streams: Vec<Stream>,
    pub encodings: Vec<ColumnEncoding>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct StripeInformation {
    pub offset: u64,
    pub data_length: u64,
    pub footer_length: u64,
    pub number_of_rows: u64,
    /// Range of this stripe's out-of-line values in the toast file.
    pub toast_offset: u64,
    pub toast_length: u64,
    pub number_of_toast: u64,
    /// Out-of-line bytes per column, laid out in column order.
    pub ext_toast_length: Vec<u64>,
    pub column_stats: Vec<ColumnStatistics>,
}

impl StripeInformation {
    pub fn length(&self) -> u64 {
        self.data_length + self.footer_length
    }

    /// Start of column `col`'s out-of-line bytes in the toast file.
    pub fn toast_base(&self, col: usize) -> u64 {
        self.toast_offset + self.ext_toast_length.iter().take(col).sum::<u64>()
    }
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct FileFooter {
    pub content_length: u64,
    pub number_of_rows: u64,
    pub storage_format: StorageFormat,
    pub schema: Vec<ColumnDesc>,
    pub column_attributes: Vec<Attributes>,
    pub stripes: Vec<StripeInformation>,
    pub column_stats: Vec<ColumnStatistics>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PostScript {
    pub magic: String,
    pub version: u32,
    pub writer: String,
    pub footer_length: u64,
}

impl PostScript {
    pub fn new(footer_length: u64) -> Self {
        PostScript {
            magic: MAGIC.to_string(),
            version: FORMAT_VERSION,
            writer: WRITER_ID.to_string(),
            footer_length,
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(err(format!("bad postscript magic {:?}", self.magic)));
        }
        if self.version != FORMAT_VERSION {
            return Err(err(format!("unsupported format version {}", self.version)));
        }
        Ok(())
    }
}

pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(msg)?)
}

pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn encode_trailer(postscript_len: usize) -> [u8; TRAILER_LEN] {
    (postscript_len as u64).to_le_bytes()
}

pub fn decode_trailer(bytes: &[u8]) -> Result<u64> {
    let Ok(b) = <[u8; TRAILER_LEN]>::try_from(bytes) else {
        return Err(err("short file trailer"));
    };
    Ok(u64::from_le_bytes(b))
}
