use test_log::test;

use crate::rle::{RleV2Decoder, RleV2Encoder, RunType};
use crate::{Bitmap, Result};

fn roundtrip(signed: bool, values: &[i64]) -> Result<Vec<u8>> {
    let enc = RleV2Encoder::encode_all(signed, values);
    let back = RleV2Decoder::decode_all(&enc, signed)?;
    assert_eq!(back, values);
    Ok(enc)
}

fn run_types(enc: &[u8], signed: bool) -> Result<RunType> {
    let mut dec = RleV2Decoder::new(enc, signed);
    dec.next_value()?;
    Ok(RunType::of_header(enc[0]))
}

// A small deterministic generator so sequences are reproducible.
fn lcg(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    *seed >> 33
}

#[test]
fn test_short_repeat_ten_twos() -> Result<()> {
    let enc = roundtrip(true, &[2; 10])?;
    assert_eq!(enc.len(), 2);
    assert_eq!(RunType::of_header(enc[0]), RunType::ShortRepeat);
    assert_eq!(enc, vec![0b00_000_111, 4]);
    Ok(())
}

#[test]
fn test_long_constant_run_is_fixed_delta() -> Result<()> {
    let enc = roundtrip(true, &[5; 20])?;
    assert_eq!(enc.len(), 4);
    assert_eq!(run_types(&enc, true)?, RunType::Delta);
    Ok(())
}

#[test]
fn test_boundary_lengths() -> Result<()> {
    let mut seed = 7;
    for len in [1, 2, 3, 4, 10, 11, 511, 512, 513, 1500] {
        let constant = vec![-9i64; len];
        roundtrip(true, &constant)?;
        let ascending: Vec<i64> = (0..len as i64).map(|i| i * 3 - 40).collect();
        roundtrip(true, &ascending)?;
        let random: Vec<i64> = (0..len).map(|_| lcg(&mut seed) as i64 - (1 << 30)).collect();
        roundtrip(true, &random)?;
        let unsigned: Vec<i64> = (0..len).map(|_| (lcg(&mut seed) % 1000) as i64).collect();
        roundtrip(false, &unsigned)?;
    }
    Ok(())
}

#[test]
fn test_element_widths() -> Result<()> {
    let mut seed = 11;
    for bits in [8u32, 16, 32, 64] {
        let values: Vec<i64> = (0..600)
            .map(|_| {
                let v = (lcg(&mut seed) << 31) ^ lcg(&mut seed);
                match bits {
                    8 => v as i8 as i64,
                    16 => v as i16 as i64,
                    32 => v as i32 as i64,
                    _ => v as i64,
                }
            })
            .collect();
        roundtrip(true, &values)?;
    }
    roundtrip(true, &[i64::MIN, i64::MAX, 0, -1, 1, i64::MIN, i64::MAX])?;
    Ok(())
}

#[test]
fn test_direct_run() -> Result<()> {
    let enc = roundtrip(true, &[41000, 59000, 43000, 57000, 45000, 55000, 47000, 53000])?;
    assert_eq!(run_types(&enc, true)?, RunType::Direct);
    Ok(())
}

#[test]
fn test_delta_run() -> Result<()> {
    let enc = roundtrip(false, &[2, 3, 5, 7, 11, 13, 17, 19, 23, 29])?;
    assert_eq!(run_types(&enc, false)?, RunType::Delta);
    let enc = roundtrip(true, &[100, 90, 70, 40, 0, -50])?;
    assert_eq!(run_types(&enc, true)?, RunType::Delta);
    Ok(())
}

#[test]
fn test_patched_base_run() -> Result<()> {
    let values = [
        2030, 2000, 2020, 1000000, 2040, 2050, 2060, 2070, 2080, 2090, 2100, 2110, 2120, 2130, 2140, 2150, 2160,
        2170, 2180, 2190,
    ];
    let enc = roundtrip(true, &values)?;
    assert_eq!(run_types(&enc, true)?, RunType::PatchedBase);

    let mut values: Vec<i64> = (0..400).map(|i| 1000 + (i % 50)).collect();
    values[5] = 1 << 40;
    values[300] = 1 << 33;
    values[301] = -3;
    roundtrip(true, &values)?;
    Ok(())
}

#[test]
fn test_flush_is_idempotent() -> Result<()> {
    let mut enc = RleV2Encoder::new(true);
    for v in [1, 5, 9, 2] {
        enc.append(v);
    }
    enc.flush();
    let len = enc.output().len();
    enc.flush();
    assert_eq!(enc.output().len(), len);
    enc.append(4);
    enc.flush();
    assert!(enc.output().len() > len);
    assert_eq!(RleV2Decoder::decode_all(enc.output(), true)?, vec![1, 5, 9, 2, 4]);
    Ok(())
}

#[test]
fn test_read_and_skip_across_runs() -> Result<()> {
    let values: Vec<i64> = (0..50).map(|i| if i < 20 { 7 } else { i * i }).collect();
    let enc = RleV2Encoder::encode_all(true, &values);
    let mut dec = RleV2Decoder::new(&enc, true);
    let mut out = Vec::new();
    dec.read(15, &mut out)?;
    dec.skip(10)?;
    dec.read(25, &mut out)?;
    let mut expect = values[..15].to_vec();
    expect.extend_from_slice(&values[25..]);
    assert_eq!(out, expect);
    assert!(!dec.has_more());
    assert!(dec.read(1, &mut out).is_err());
    Ok(())
}

fn check_null_skip(len: usize, is_null: impl Fn(usize) -> bool) -> Result<()> {
    let values: Vec<i64> = (0..len as i64).map(|i| (i * 37) % 101 - 50).collect();
    let mut not_null = Bitmap::new();
    for i in 0..len {
        not_null.push(!is_null(i));
    }
    let dense: Vec<i64> = (0..len).filter(|i| !is_null(*i)).map(|i| values[i]).collect();
    let enc = RleV2Encoder::encode_all(true, &dense);
    let copy = enc.clone();
    let mut out = Vec::new();
    let n = RleV2Decoder::new(&enc, true).read_not_null(&not_null, 0..len, &mut out)?;
    assert_eq!(n, not_null.count());
    assert_eq!(out, dense);
    assert_eq!(enc, copy);
    Ok(())
}

#[test]
fn test_null_skipping_patterns() -> Result<()> {
    check_null_skip(100, |i| i < 30)?;
    check_null_skip(100, |i| i >= 70)?;
    check_null_skip(100, |i| i % 3 == 0)?;
    check_null_skip(100, |_| true)?;
    check_null_skip(700, |i| i % 3 == 0)?;
    Ok(())
}

#[test]
fn test_null_skipping_subranges() -> Result<()> {
    let mut not_null = Bitmap::new();
    for i in 0..40 {
        not_null.push(i % 4 != 1);
    }
    let dense: Vec<i64> = (0..not_null.count() as i64).collect();
    let enc = RleV2Encoder::encode_all(false, &dense);
    let mut dec = RleV2Decoder::new(&enc, false);
    let mut out = Vec::new();
    let a = dec.read_not_null(&not_null, 0..10, &mut out)?;
    let b = dec.read_not_null(&not_null, 10..40, &mut out)?;
    assert_eq!((a, b), (7, 23));
    assert_eq!(out, dense);
    Ok(())
}

#[test]
fn test_truncated_stream() {
    let enc = RleV2Encoder::encode_all(true, &[23713, 43806, 57005, 48879, 53710]);
    assert!(RleV2Decoder::decode_all(&enc[..enc.len() - 1], true).is_err());
}
