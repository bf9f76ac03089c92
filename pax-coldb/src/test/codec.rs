use test_log::test;

use crate::bitpack::write_vulong;
use crate::buffer::DataBuffer;
use crate::compress::{block_compressor, compress_to_vec, decompress_into, BlockCompressor, NoCompressor};
use crate::delta;
use crate::dict::{dict_decode, dict_encode, Heap};
use crate::encoding::{Codec, ColumnEncodingKind, EncodingOption, StreamShape};
use crate::rle::RleV2Encoder;
use crate::Result;

#[test]
fn test_delta_offsets_like_stream() -> Result<()> {
    let values = [100, 101, 102, 105, 106, 110, 120, 121];
    let enc = delta::encode_all(&values);
    assert_eq!(delta::decode(&enc)?, values);
    assert_eq!(delta::decode(&delta::encode_all(&[]))?, Vec::<i64>::new());
    Ok(())
}

#[test]
fn test_delta_long_and_wrapping() -> Result<()> {
    let mut offsets = vec![0i64];
    let mut seed = 3u64;
    for _ in 0..1000 {
        seed = seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
        let last = *offsets.last().unwrap_or(&0);
        offsets.push(last + (seed >> 58) as i64);
    }
    let enc = delta::encode_all(&offsets);
    assert!(enc.len() < offsets.len() * 4);
    assert_eq!(delta::decode(&enc)?, offsets);

    let wild = [i64::MAX, i64::MIN, 0, -1, i64::MAX];
    assert_eq!(delta::decode(&delta::encode_all(&wild))?, wild);
    Ok(())
}

#[test]
fn test_delta_truncated() {
    let enc = delta::encode_all(&[1, 50, 900, 901]);
    assert!(delta::decode(&enc[..enc.len() - 1]).is_err());
}

#[test]
fn test_dict_roundtrip() -> Result<()> {
    let vals: Vec<&[u8]> = vec![b"pear", b"apple", b"pear", b"", b"apple", b"applesauce", b"pear"];
    let enc = dict_encode(vals.iter().copied());
    assert_eq!(enc.entries, 4);
    let mut out = DataBuffer::new(0);
    dict_decode(&enc.bytes, &mut out)?;
    assert_eq!(out.as_slice(), vals.concat().as_slice());
    Ok(())
}

#[test]
fn test_dict_heap_reuses_bytes() {
    let mut heap = Heap::default();
    assert_eq!(heap.add(b"applesauce"), 0);
    assert_eq!(heap.add(b"sauce"), 5);
    assert_eq!(heap.add(b""), 0);
    assert_eq!(heap.add(b"pie"), 10);
    assert_eq!(heap.data, b"applesaucepie");
}

#[test]
fn test_dict_heap_reuse_window() {
    let mut heap = Heap::default();
    assert_eq!(heap.add(b"needle"), 0);
    let filler: Vec<u8> = (0..5000u32).map(|i| b'a' + (i % 26) as u8).collect();
    assert_eq!(heap.add(&filler), 6);
    // Too far back to be reused.
    assert_eq!(heap.add(b"needle"), 5006);
    assert_eq!(heap.add(b"needle"), 5006);
}

#[test]
fn test_dict_many_entries() -> Result<()> {
    let owned: Vec<Vec<u8>> = (0..12_000).map(|i| format!("key-{}", i % 3000).into_bytes()).collect();
    let enc = dict_encode(owned.iter().map(|v| v.as_slice()));
    assert_eq!(enc.entries, 3000);
    let mut out = DataBuffer::new(0);
    dict_decode(&enc.bytes, &mut out)?;
    assert_eq!(out.as_slice(), owned.concat().as_slice());
    Ok(())
}

#[test]
fn test_dict_entry_past_heap() {
    // One entry claiming 10 bytes at offset 5 of a 2-byte heap.
    let mut stream = DataBuffer::new(0);
    write_vulong(&mut stream, 1);
    write_vulong(&mut stream, 2);
    stream.append(b"ab");
    for table in [[5i64], [10]] {
        let enc = RleV2Encoder::encode_all(false, &table);
        write_vulong(&mut stream, enc.len() as u64);
        stream.append(&enc);
    }
    stream.append(&RleV2Encoder::encode_all(false, &[0]));
    let mut out = DataBuffer::new(0);
    assert!(dict_decode(stream.as_slice(), &mut out).is_err());
    assert_eq!(out.used(), 0);
}

#[test]
fn test_dict_corrupt() {
    let vals: Vec<&[u8]> = vec![b"x", b"yy"];
    let enc = dict_encode(vals.iter().copied());
    let mut out = DataBuffer::new(0);
    assert!(dict_decode(&enc.bytes[..3], &mut out).is_err());
}

fn check_compressor(c: &dyn BlockCompressor, level: i32) -> Result<()> {
    let src: Vec<u8> = (0..10_000u32).flat_map(|i| ((i / 7) as u16).to_le_bytes()).collect();
    let packed = compress_to_vec(c, &src, level)?;
    let mut out = DataBuffer::new(0);
    out.append(b"head");
    decompress_into(c, &packed, src.len(), &mut out)?;
    assert_eq!(&out.as_slice()[..4], b"head");
    assert_eq!(&out.as_slice()[4..], src.as_slice());
    Ok(())
}

#[test]
fn test_compressors_roundtrip() -> Result<()> {
    check_compressor(&NoCompressor, 0)?;
    for kind in [
        ColumnEncodingKind::CompressZstd,
        ColumnEncodingKind::CompressZlib,
        ColumnEncodingKind::CompressLz4,
    ] {
        let Some(c) = block_compressor(kind) else {
            assert_eq!(kind, ColumnEncodingKind::CompressLz4);
            continue;
        };
        check_compressor(c.as_ref(), 0)?;
        check_compressor(c.as_ref(), 5)?;
    }
    assert!(block_compressor(ColumnEncodingKind::RleV2).is_none());
    Ok(())
}

#[test]
fn test_corrupt_input_is_compression_error() -> Result<()> {
    for kind in [ColumnEncodingKind::CompressZstd, ColumnEncodingKind::CompressZlib] {
        let Some(c) = block_compressor(kind) else {
            continue;
        };
        let mut out = DataBuffer::new(0);
        out.append(b"keep");
        let e = decompress_into(c.as_ref(), b"definitely not a compressed frame", 64, &mut out)
            .err()
            .map(|e| e.is_compression());
        assert_eq!(e, Some(true));
        assert_eq!(out.as_slice(), b"keep");
    }
    Ok(())
}

fn noise(len: usize) -> Vec<u8> {
    let mut seed = 0x9e37_79b9_7f4a_7c15u64;
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 56) as u8
        })
        .collect()
}

#[test]
fn test_incompressible_input_at_every_level() -> Result<()> {
    for len in [65535, 65536, 100_000] {
        let src = noise(len);
        for kind in [
            ColumnEncodingKind::CompressZlib,
            ColumnEncodingKind::CompressZstd,
            ColumnEncodingKind::CompressLz4,
        ] {
            let Some(c) = block_compressor(kind) else {
                continue;
            };
            for level in 0..=9 {
                let packed = compress_to_vec(c.as_ref(), &src, level)?;
                let mut dst = vec![0u8; c.compress_bound(len)];
                assert_eq!(c.compress(&mut dst, &src, level)?, packed.len());
                let mut out = DataBuffer::new(0);
                decompress_into(c.as_ref(), &packed, len, &mut out)?;
                assert_eq!(out.as_slice(), src.as_slice());
            }
        }
    }
    Ok(())
}

#[test]
fn test_short_destination_fails() {
    let src = [7u8; 32];
    let mut dst = [0u8; 8];
    assert!(NoCompressor.compress(&mut dst, &src, 0).is_err());
}

#[test]
fn test_resolve_defaults_and_fallback() {
    use ColumnEncodingKind as K;
    let (codec, opt) = Codec::resolve(EncodingOption::default(), StreamShape::Values, false);
    assert!(matches!(codec, Codec::Block { .. }));
    assert_eq!(opt.kind, K::CompressZstd);

    let (codec, opt) = Codec::resolve(EncodingOption::default(), StreamShape::Integers, true);
    assert!(codec.is_plain());
    assert_eq!(opt, EncodingOption::NONE);

    // Integer codecs make no sense for floats or variable-length values.
    let (codec, opt) = Codec::resolve(EncodingOption::new(K::RleV2, 0), StreamShape::FixedOpaque, true);
    assert!(codec.is_plain());
    assert_eq!(opt, EncodingOption::NONE);
    let (codec, _) = Codec::resolve(EncodingOption::new(K::DirectDelta, 0), StreamShape::Values, false);
    assert!(codec.is_plain());
    let (codec, _) = Codec::resolve(EncodingOption::new(K::Dictionary, 0), StreamShape::Integers, true);
    assert!(codec.is_plain());

    let (codec, opt) = Codec::resolve(EncodingOption::new(K::CompressZlib, 6), StreamShape::FixedOpaque, false);
    assert!(matches!(codec, Codec::Block { level: 6, .. }));
    assert_eq!(opt, EncodingOption::new(K::CompressZlib, 6));
}

#[test]
fn test_decode_refuses_unresolved() {
    assert!(Codec::for_decode(EncodingOption::default(), false).is_err());
    assert!(Codec::for_decode(EncodingOption::new(ColumnEncodingKind::RleV2, 0), true).is_ok());
}

#[test]
fn test_codec_int_paths() -> Result<()> {
    let values: Vec<i64> = (0..300).map(|i| i * 4 - 100).collect();
    let raw: Vec<u8> = values.iter().flat_map(|v| (*v as i32).to_le_bytes()).collect();
    for codec in [Codec::Rle { signed: true }, Codec::Delta] {
        let enc = codec.encode_ints(|| values.clone(), &raw)?;
        assert!(enc.len() < raw.len());
        assert_eq!(codec.decode_ints(&enc, values.len())?, values);
        assert!(codec.decode_ints(&enc, values.len() + 1).is_err());
    }
    assert!(Codec::Dictionary.encode_ints(|| values.clone(), &raw).is_err());
    let plain = Codec::Plain.encode_ints(Vec::new, &raw)?;
    assert_eq!(Codec::Plain.decode_bytes(&plain, raw.len())?.as_slice(), raw.as_slice());
    assert!(Codec::Plain.decode_bytes(&plain, raw.len() - 1).is_err());
    Ok(())
}

#[test]
fn test_encoding_kind_names() -> Result<()> {
    for kind in [
        ColumnEncodingKind::Default,
        ColumnEncodingKind::NoEncoded,
        ColumnEncodingKind::RleV2,
        ColumnEncodingKind::DirectDelta,
        ColumnEncodingKind::Dictionary,
        ColumnEncodingKind::CompressZstd,
        ColumnEncodingKind::CompressZlib,
        ColumnEncodingKind::CompressLz4,
    ] {
        assert_eq!(kind.to_string().parse::<ColumnEncodingKind>()?, kind);
    }
    assert!("snappy".parse::<ColumnEncodingKind>().is_err());
    Ok(())
}
