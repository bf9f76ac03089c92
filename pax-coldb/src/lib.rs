// A PAX micro-partition engine.
//
// A file is a run of stripes followed by a file footer, a postscript and
// an 8-byte postscript length:
//
//   [stripe 0][stripe 1]...[file footer][postscript][u64 LE postscript len]
//
// Each stripe holds up to `group_limit` rows as per-column streams, every
// stream padded to its column's alignment, followed by a stripe footer
// listing the streams and the encoding each column was written with:
//
//   per column: [present][data][offsets][toast]
//
// `present` is the not-null bitmap, written only when the column has
// nulls; `offsets` exists only for variable-length columns; `toast` marks
// rows whose value lives out of line in the `<file>.toast` side file.
//
// Columns are built from a single capability trait (PaxColumn) with
// encodings layered on by wrapping a plain column. The column set
// (PaxColumns) is the one place stripes are serialized and decoded.

mod bitpack;
mod buffer;
mod column;
mod columns;
mod compress;
mod delta;
mod dict;
mod encoding;
mod fixed;
mod format;
mod ioutil;
mod layout;
mod nonfixed;
mod options;
mod reader;
mod rle;
mod stats;
mod types;
mod writer;

#[cfg(test)]
mod test;

pub use bitpack::{closest_aligned_bits, closest_fixed_bits, write_longs, zigzag_decode, zigzag_encode, LongReader};
pub use buffer::DataBuffer;
pub use column::{decode_column, new_column, Attributes, ColumnStreams, PaxColumn};
pub use columns::PaxColumns;
pub use compress::{block_compressor, BlockCompressor};
pub use encoding::{ColumnEncodingKind, EncodingOption};
pub use fixed::{EncodingColumn, FixedColumn};
pub use format::{
    ColumnEncoding, FileFooter, PostScript, Stream, StreamKind, StripeFooter, StripeInformation, MAGIC,
};
pub use ioutil::{File, FileSystem, LocalFileSystem, MemFileSystem};
pub use layout::{describe_layout, Annotations};
pub use nonfixed::{NonFixedColumn, NonFixedEncodingColumn, DICT_FALLBACK_ATTR, TOAST_REF_LEN};
pub use options::{GroupFilter, ReaderOptions, WriterOptions, DEFAULT_GROUP_LIMIT, DEFAULT_TOAST_THRESHOLD};
pub use pax_base::{Bitmap, Error, ErrorKind, Result};
pub use reader::{OrcGroup, OrcReader};
pub use rle::{RleV2Decoder, RleV2Encoder};
pub use stats::{BloomFilter, ColumnStatistics, MinMax, StatsCollector};
pub use types::{ColumnDesc, Datum, StorageFormat, TypeKind};
pub use writer::{OrcWriter, SummaryCallback, WalSink, WriteSummary};
