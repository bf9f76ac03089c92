use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::buffer::DataBuffer;
use crate::compress::{block_compressor, compress_to_vec, decompress_into, BlockCompressor};
use crate::delta;
use crate::rle::{RleV2Decoder, RleV2Encoder};
use pax_base::{compress_err, err, Bitmap, Error, Result};

/// Per-stream encoding tag, recorded in every stripe footer so a reader
/// picks its decoder from the file rather than from configuration.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Default, Serialize, Deserialize)]
pub enum ColumnEncodingKind {
    /// Resolved per column type when the column is built; never written.
    #[default]
    Default,
    NoEncoded,
    RleV2,
    DirectDelta,
    Dictionary,
    CompressZstd,
    CompressZlib,
    CompressLz4,
}

impl ColumnEncodingKind {
    pub fn is_compression(&self) -> bool {
        matches!(
            self,
            ColumnEncodingKind::CompressZstd | ColumnEncodingKind::CompressZlib | ColumnEncodingKind::CompressLz4
        )
    }
}

impl std::fmt::Display for ColumnEncodingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            ColumnEncodingKind::Default => "default",
            ColumnEncodingKind::NoEncoded => "none",
            ColumnEncodingKind::RleV2 => "rle",
            ColumnEncodingKind::DirectDelta => "delta",
            ColumnEncodingKind::Dictionary => "dict",
            ColumnEncodingKind::CompressZstd => "zstd",
            ColumnEncodingKind::CompressZlib => "zlib",
            ColumnEncodingKind::CompressLz4 => "lz4",
        };
        f.write_str(s)
    }
}

impl FromStr for ColumnEncodingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(ColumnEncodingKind::Default),
            "none" => Ok(ColumnEncodingKind::NoEncoded),
            "rle" => Ok(ColumnEncodingKind::RleV2),
            "delta" => Ok(ColumnEncodingKind::DirectDelta),
            "dict" => Ok(ColumnEncodingKind::Dictionary),
            "zstd" => Ok(ColumnEncodingKind::CompressZstd),
            "zlib" => Ok(ColumnEncodingKind::CompressZlib),
            "lz4" => Ok(ColumnEncodingKind::CompressLz4),
            _ => Err(err(format!("unknown column encoding: {s}"))),
        }
    }
}

/// An encoding kind and its compression level.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Default, Serialize, Deserialize)]
pub struct EncodingOption {
    pub kind: ColumnEncodingKind,
    pub level: i32,
}

impl EncodingOption {
    pub const NONE: EncodingOption = EncodingOption::new(ColumnEncodingKind::NoEncoded, 0);

    pub const fn new(kind: ColumnEncodingKind, level: i32) -> Self {
        EncodingOption { kind, level }
    }
}

/// What a stream's bytes are made of, which decides which transforms apply.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum StreamShape {
    /// Fixed-width integers.
    Integers,
    /// Fixed-width non-integers (floats).
    FixedOpaque,
    /// Concatenated variable-length values.
    Values,
}

/// The transform stage of an encoding column, resolved from an
/// `EncodingOption` and the shape of the stream it applies to.
#[derive(Debug)]
pub(crate) enum Codec {
    Plain,
    Rle { signed: bool },
    Delta,
    Dictionary,
    Block { compressor: Box<dyn BlockCompressor>, level: i32 },
}

impl Codec {
    /// Resolves `opt` for `shape`. Kinds that make no sense for the
    /// shape, or have no implementation, fall back to no encoding.
    /// Returns the codec and the option actually in effect.
    pub(crate) fn resolve(opt: EncodingOption, shape: StreamShape, signed: bool) -> (Codec, EncodingOption) {
        use ColumnEncodingKind as K;
        let kind = match (opt.kind, shape) {
            (K::Default, StreamShape::Values) => K::CompressZstd,
            (K::Default, _) => K::NoEncoded,
            (k, _) => k,
        };
        let level = if kind == opt.kind { opt.level } else { 0 };
        let codec = match (kind, shape) {
            (K::NoEncoded, _) => Some(Codec::Plain),
            (K::RleV2, StreamShape::Integers) => Some(Codec::Rle { signed }),
            (K::DirectDelta, StreamShape::Integers) => Some(Codec::Delta),
            (K::Dictionary, StreamShape::Values) => Some(Codec::Dictionary),
            (k, _) if k.is_compression() => block_compressor(k).map(|compressor| Codec::Block { compressor, level }),
            _ => None,
        };
        match codec {
            Some(codec) => (codec, EncodingOption::new(kind, level)),
            None => {
                warn!(target: "pax", "encoding {} unsupported for {:?} stream, storing unencoded", kind, shape);
                (Codec::Plain, EncodingOption::NONE)
            }
        }
    }

    /// Codec for reading a stream that was written with `opt`. Unlike
    /// `resolve` there is no fallback: a stream we cannot decode is an error.
    pub(crate) fn for_decode(opt: EncodingOption, signed: bool) -> Result<Codec> {
        use ColumnEncodingKind as K;
        match opt.kind {
            K::NoEncoded => Ok(Codec::Plain),
            K::RleV2 => Ok(Codec::Rle { signed }),
            K::DirectDelta => Ok(Codec::Delta),
            K::Dictionary => Ok(Codec::Dictionary),
            k if k.is_compression() => match block_compressor(k) {
                Some(compressor) => Ok(Codec::Block { compressor, level: opt.level }),
                None => Err(compress_err(&k.to_string(), "decompress", "codec not available in this build")),
            },
            k => Err(err(format!("stream recorded with unresolved encoding {k}"))),
        }
    }

    pub(crate) fn is_plain(&self) -> bool {
        matches!(self, Codec::Plain)
    }

    /// Encodes an integer stream: `values` are the integers in order and
    /// `raw` their plain little-endian bytes.
    pub(crate) fn encode_ints(&self, values: impl FnOnce() -> Vec<i64>, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::Plain => Ok(raw.to_vec()),
            Codec::Rle { signed } => Ok(RleV2Encoder::encode_all(*signed, &values())),
            Codec::Delta => Ok(delta::encode_all(&values())),
            Codec::Block { compressor, level } => self.compress(compressor.as_ref(), *level, raw),
            Codec::Dictionary => Err(err("dictionary encoding applied to an integer stream")),
        }
    }

    pub(crate) fn compress(&self, c: &dyn BlockCompressor, level: i32, raw: &[u8]) -> Result<Vec<u8>> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        compress_to_vec(c, raw, level)
    }

    /// Decodes `count` integers from an integer-codec stream.
    pub(crate) fn decode_ints(&self, src: &[u8], count: usize) -> Result<Vec<i64>> {
        let vals = match self {
            Codec::Rle { signed } => {
                let mut out = Vec::with_capacity(count);
                RleV2Decoder::new(src, *signed).read(count, &mut out)?;
                out
            }
            Codec::Delta => delta::decode(src)?,
            _ => return Err(err("not an integer codec")),
        };
        if vals.len() != count {
            return Err(err(format!("decoded {} integers, expected {}", vals.len(), count)));
        }
        Ok(vals)
    }

    /// Like `decode_ints`, for a stream holding one value per set bit of
    /// `not_null`.
    pub(crate) fn decode_not_null(&self, src: &[u8], not_null: &Bitmap) -> Result<Vec<i64>> {
        match self {
            Codec::Rle { signed } => {
                let mut out = Vec::new();
                RleV2Decoder::new(src, *signed).read_not_null(not_null, 0..not_null.len(), &mut out)?;
                Ok(out)
            }
            _ => self.decode_ints(src, not_null.count()),
        }
    }

    /// Undoes a plain or block-compressed stream into `origin_len` bytes.
    pub(crate) fn decode_bytes(&self, src: &[u8], origin_len: usize) -> Result<DataBuffer<'static>> {
        let mut out = DataBuffer::new(origin_len);
        match self {
            Codec::Plain => {
                if src.len() != origin_len {
                    return Err(err("unencoded stream length disagrees with origin length"));
                }
                out.append(src);
            }
            Codec::Block { compressor, .. } => {
                if origin_len > 0 {
                    decompress_into(compressor.as_ref(), src, origin_len, &mut out)?;
                }
            }
            _ => return Err(err("not a byte codec")),
        }
        Ok(out)
    }
}
