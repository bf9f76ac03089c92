// Whole-buffer compressors behind one contract. A compressed stream does
// not record its expanded size; callers keep the origin length alongside
// it and pre-size the destination with it.

use crate::buffer::DataBuffer;
use crate::encoding::ColumnEncodingKind;
use pax_base::{compress_err, Result};

pub trait BlockCompressor: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Worst-case compressed size for `src_len` input bytes.
    fn compress_bound(&self, src_len: usize) -> usize;

    /// Compresses `src` into `dst`, returning the bytes written.
    fn compress(&self, dst: &mut [u8], src: &[u8], level: i32) -> Result<usize>;

    /// Decompresses `src` into `dst`, returning the bytes written.
    fn decompress(&self, dst: &mut [u8], src: &[u8]) -> Result<usize>;

    /// Compresses `src` into a fresh vector sized to fit.
    fn compress_vec(&self, src: &[u8], level: i32) -> Result<Vec<u8>> {
        let mut dst = vec![0u8; self.compress_bound(src.len())];
        let n = self.compress(&mut dst, src, level)?;
        dst.truncate(n);
        Ok(dst)
    }
}

/// Compressor for a compression encoding kind; `None` for kinds that are
/// not block compressions, or for lz4 when built without the `lz4` feature.
pub fn block_compressor(kind: ColumnEncodingKind) -> Option<Box<dyn BlockCompressor>> {
    match kind {
        ColumnEncodingKind::CompressZstd => Some(Box::new(ZstdCompressor)),
        ColumnEncodingKind::CompressZlib => Some(Box::new(ZlibCompressor)),
        #[cfg(feature = "lz4")]
        ColumnEncodingKind::CompressLz4 => Some(Box::new(lz4::Lz4Compressor)),
        _ => None,
    }
}

pub fn compress_to_vec(c: &dyn BlockCompressor, src: &[u8], level: i32) -> Result<Vec<u8>> {
    c.compress_vec(src, level)
}

/// Appends exactly `origin_len` decompressed bytes to `out`. On failure
/// `out`'s committed content is unchanged.
pub fn decompress_into(
    c: &dyn BlockCompressor,
    src: &[u8],
    origin_len: usize,
    out: &mut DataBuffer,
) -> Result<()> {
    out.reserve(origin_len);
    let n = c.decompress(&mut out.spare_mut()[..origin_len], src)?;
    if n != origin_len {
        return Err(compress_err(
            c.name(),
            "decompress",
            format!("expanded to {n} bytes, expected {origin_len}"),
        ));
    }
    out.brush(n)
}

#[derive(Debug, Default)]
pub struct NoCompressor;

impl BlockCompressor for NoCompressor {
    fn name(&self) -> &'static str {
        "none"
    }
    fn compress_bound(&self, src_len: usize) -> usize {
        src_len
    }
    fn compress(&self, dst: &mut [u8], src: &[u8], _level: i32) -> Result<usize> {
        let Some(d) = dst.get_mut(..src.len()) else {
            return Err(compress_err(self.name(), "compress", "destination too small"));
        };
        d.copy_from_slice(src);
        Ok(src.len())
    }
    fn decompress(&self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
        let Some(d) = dst.get_mut(..src.len()) else {
            return Err(compress_err(self.name(), "decompress", "destination too small"));
        };
        d.copy_from_slice(src);
        Ok(src.len())
    }
}

#[derive(Debug, Default)]
pub struct ZstdCompressor;

impl BlockCompressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }
    fn compress_bound(&self, src_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(src_len)
    }
    fn compress(&self, dst: &mut [u8], src: &[u8], level: i32) -> Result<usize> {
        // Level 0 selects the library default.
        zstd::bulk::compress_to_buffer(src, dst, level.clamp(0, 22))
            .map_err(|e| compress_err(self.name(), "compress", e))
    }
    fn decompress(&self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
        zstd::bulk::decompress_to_buffer(src, dst).map_err(|e| compress_err(self.name(), "decompress", e))
    }
}

#[derive(Debug, Default)]
pub struct ZlibCompressor;

impl ZlibCompressor {
    fn level(level: i32) -> flate2::Compression {
        if level <= 0 {
            flate2::Compression::default()
        } else {
            flate2::Compression::new(level.min(9) as u32)
        }
    }
}

impl BlockCompressor for ZlibCompressor {
    fn name(&self) -> &'static str {
        "zlib"
    }
    // Looser than zlib's compressBound, which the fast levels can exceed.
    fn compress_bound(&self, src_len: usize) -> usize {
        src_len + src_len / 16 + 1024
    }
    fn compress(&self, dst: &mut [u8], src: &[u8], level: i32) -> Result<usize> {
        let out = self.compress_vec(src, level)?;
        let Some(d) = dst.get_mut(..out.len()) else {
            return Err(compress_err(self.name(), "compress", "destination too small"));
        };
        d.copy_from_slice(&out);
        Ok(out.len())
    }
    fn compress_vec(&self, src: &[u8], level: i32) -> Result<Vec<u8>> {
        use flate2::write::ZlibEncoder;
        use std::io::Write;
        let mut z = ZlibEncoder::new(Vec::with_capacity(src.len() / 2 + 64), ZlibCompressor::level(level));
        z.write_all(src).map_err(|e| compress_err(self.name(), "compress", e))?;
        z.finish().map_err(|e| compress_err(self.name(), "compress", e))
    }
    fn decompress(&self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
        use flate2::{Decompress, FlushDecompress, Status};
        let mut z = Decompress::new(true);
        match z.decompress(src, dst, FlushDecompress::Finish) {
            Ok(Status::StreamEnd) => Ok(z.total_out() as usize),
            Ok(_) => Err(compress_err(self.name(), "decompress", "truncated stream or destination too small")),
            Err(e) => Err(compress_err(self.name(), "decompress", e)),
        }
    }
}

#[cfg(feature = "lz4")]
mod lz4 {
    use super::*;

    #[derive(Debug, Default)]
    pub struct Lz4Compressor;

    impl BlockCompressor for Lz4Compressor {
        fn name(&self) -> &'static str {
            "lz4"
        }
        fn compress_bound(&self, src_len: usize) -> usize {
            lz4_flex::block::get_maximum_output_size(src_len)
        }
        fn compress(&self, dst: &mut [u8], src: &[u8], _level: i32) -> Result<usize> {
            lz4_flex::block::compress_into(src, dst).map_err(|e| compress_err(self.name(), "compress", e))
        }
        fn decompress(&self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
            lz4_flex::block::decompress_into(src, dst).map_err(|e| compress_err(self.name(), "decompress", e))
        }
    }
}
