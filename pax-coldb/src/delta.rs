// Direct-delta integer encoding, used mainly for the offsets stream of
// non-fixed columns, which is non-decreasing and nearly linear:
//
//   varint count
//   zigzag varint first value
//   per block of up to 128 deltas:
//     zigzag varint min delta, u8 width, residuals (delta - min) packed at width
//
// Arithmetic wraps, so any i64 sequence round-trips.

use crate::bitpack::{bits_required, read_vslong, read_vulong, write_longs, write_vslong, write_vulong, LongReader};
use crate::buffer::DataBuffer;
use pax_base::{err, Result};

const BLOCK: usize = 128;

pub fn encode(values: &[i64], out: &mut DataBuffer) {
    write_vulong(out, values.len() as u64);
    let Some(first) = values.first() else {
        return;
    };
    write_vslong(out, *first);
    let deltas: Vec<i64> = values.windows(2).map(|w| w[1].wrapping_sub(w[0])).collect();
    for block in deltas.chunks(BLOCK) {
        let min = block.iter().copied().min().unwrap_or(0);
        let residuals: Vec<i64> = block.iter().map(|d| d.wrapping_sub(min)).collect();
        let max = residuals.iter().map(|r| *r as u64).max().unwrap_or(0);
        let width = if max == 0 { 0 } else { bits_required(max) };
        write_vslong(out, min);
        out.push(width as u8);
        write_longs(out, &residuals, width);
    }
}

pub fn encode_all(values: &[i64]) -> Vec<u8> {
    let mut out = DataBuffer::new(0);
    encode(values, &mut out);
    out.into_vec()
}

pub fn decode(src: &[u8]) -> Result<Vec<i64>> {
    let mut pos = 0;
    let count = read_vulong(src, &mut pos)? as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    if count > src.len().saturating_mul(8 * BLOCK) {
        return Err(err("delta stream count exceeds its length"));
    }
    let mut out = Vec::with_capacity(count);
    let mut prev = read_vslong(src, &mut pos)?;
    out.push(prev);
    let mut remaining = count - 1;
    let mut residuals = [0i64; BLOCK];
    while remaining > 0 {
        let n = remaining.min(BLOCK);
        let min = read_vslong(src, &mut pos)?;
        let Some(&width) = src.get(pos) else {
            return Err(err("delta block past end of stream"));
        };
        pos += 1;
        let mut rd = LongReader::new(src, pos);
        rd.read_longs(&mut residuals[..n], width as u32)?;
        pos = rd.position();
        for r in &residuals[..n] {
            prev = prev.wrapping_add(min.wrapping_add(*r));
            out.push(prev);
        }
        remaining -= n;
    }
    if pos != src.len() {
        return Err(err("trailing bytes after delta stream"));
    }
    Ok(out)
}
