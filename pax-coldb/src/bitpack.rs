// Bit-packing of integer runs, MSB-first within each byte, plus the
// width ladders and varint/zigzag helpers shared by the integer codecs.
//
// Widths handed to `write_longs` / `LongReader::read_longs` are rounded up
// to the aligned ladder 1,2,4,8,16,24,32,40,48,56,64 before packing, so a
// writer and reader that agree on a nominal width always agree on the
// physical one. The 5-bit width codes stored in run headers use the finer
// "fixed" ladder (1..=24,26,28,30,32,40,48,56,64).

use crate::buffer::DataBuffer;
use pax_base::{err, Result};

pub(crate) fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

pub fn closest_fixed_bits(n: u32) -> u32 {
    match n {
        0 => 1,
        1..=24 => n,
        25..=26 => 26,
        27..=28 => 28,
        29..=30 => 30,
        31..=32 => 32,
        33..=40 => 40,
        41..=48 => 48,
        49..=56 => 56,
        _ => 64,
    }
}

pub fn closest_aligned_bits(n: u32) -> u32 {
    match n {
        0..=1 => 1,
        2 => 2,
        3..=4 => 4,
        5..=8 => 8,
        9..=16 => 16,
        17..=24 => 24,
        25..=32 => 32,
        33..=40 => 40,
        41..=48 => 48,
        49..=56 => 56,
        _ => 64,
    }
}

/// Maps a bit width to its 5-bit header code.
pub fn encode_bit_width(n: u32) -> u32 {
    match closest_fixed_bits(n) {
        n @ 1..=24 => n - 1,
        26 => 24,
        28 => 25,
        30 => 26,
        32 => 27,
        40 => 28,
        48 => 29,
        56 => 30,
        _ => 31,
    }
}

pub fn decode_bit_width(code: u32) -> u32 {
    match code & 0x1f {
        c @ 0..=23 => c + 1,
        24 => 26,
        25 => 28,
        26 => 30,
        27 => 32,
        28 => 40,
        29 => 48,
        30 => 56,
        _ => 64,
    }
}

/// Bits needed to hold `value` read as unsigned, rounded to the fixed ladder.
pub fn bits_required(value: u64) -> u32 {
    closest_fixed_bits(64 - value.leading_zeros())
}

/// The width that covers the `p`th percentile of `data`, `0 < p <= 1`.
pub fn percentile_bits(data: &[i64], p: f64) -> u32 {
    let mut hist = [0usize; 32];
    for v in data {
        hist[encode_bit_width(bits_required(*v as u64)) as usize] += 1;
    }
    let mut per_len = (data.len() as f64 * (1.0 - p)) as i64;
    for i in (0..32).rev() {
        per_len -= hist[i] as i64;
        if per_len < 0 {
            return decode_bit_width(i as u32);
        }
    }
    0
}

pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

pub fn write_vulong(out: &mut DataBuffer, mut v: u64) {
    loop {
        if v < 0x80 {
            out.push(v as u8);
            return;
        }
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
}

pub fn write_vslong(out: &mut DataBuffer, v: i64) {
    write_vulong(out, zigzag_encode(v))
}

pub fn read_vulong(src: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let Some(&b) = src.get(*pos) else {
            return Err(err("varint runs past end of stream"));
        };
        *pos += 1;
        if shift >= 64 {
            return Err(err("varint too long"));
        }
        result |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

pub fn read_vslong(src: &[u8], pos: &mut usize) -> Result<i64> {
    Ok(zigzag_decode(read_vulong(src, pos)?))
}

/// Packs `values` at `width` bits each; width 0 writes nothing.
/// The final partial byte is zero-padded, so each call ends byte-aligned.
pub fn write_longs(out: &mut DataBuffer, values: &[i64], width: u32) {
    if width == 0 || values.is_empty() {
        return;
    }
    let width = closest_aligned_bits(width);
    out.reserve((values.len() * width as usize).div_ceil(8));
    if width % 8 == 0 {
        let nbytes = (width / 8) as usize;
        for v in values {
            out.append(&(*v as u64).to_be_bytes()[8 - nbytes..]);
        }
        return;
    }
    let mut current: u8 = 0;
    let mut bits_left: u32 = 8;
    for v in values {
        let mut value = (*v as u64) & low_mask(width);
        let mut bits_to_write = width;
        while bits_to_write > bits_left {
            current |= ((value >> (bits_to_write - bits_left)) & low_mask(bits_left)) as u8;
            bits_to_write -= bits_left;
            value &= low_mask(bits_to_write);
            out.push(current);
            current = 0;
            bits_left = 8;
        }
        bits_left -= bits_to_write;
        current |= (value << bits_left) as u8;
        if bits_left == 0 {
            out.push(current);
            current = 0;
            bits_left = 8;
        }
    }
    if bits_left != 8 {
        out.push(current);
    }
}

/// Inverse of `write_longs`. Holds the partially consumed byte between
/// calls so a run can be unpacked in several chunks.
pub struct LongReader<'a> {
    src: &'a [u8],
    pos: usize,
    bits_left: u32,
    current: u8,
}

impl<'a> LongReader<'a> {
    pub fn new(src: &'a [u8], pos: usize) -> Self {
        LongReader {
            src,
            pos,
            bits_left: 0,
            current: 0,
        }
    }

    /// Byte position after the last byte touched.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bits_left(&self) -> u32 {
        self.bits_left
    }

    /// Drops the unread low bits of the current byte.
    pub fn align(&mut self) {
        self.bits_left = 0;
    }

    fn next_byte(&mut self) -> Result<u8> {
        let Some(&b) = self.src.get(self.pos) else {
            return Err(err("bit-packed run past end of stream"));
        };
        self.pos += 1;
        Ok(b)
    }

    pub fn read_longs(&mut self, out: &mut [i64], width: u32) -> Result<()> {
        if width == 0 {
            out.fill(0);
            return Ok(());
        }
        let width = closest_aligned_bits(width);
        if width % 8 == 0 && self.bits_left == 0 {
            let nbytes = (width / 8) as usize;
            let need = out.len() * nbytes;
            if self.src.len() < self.pos + need {
                return Err(err("bit-packed run past end of stream"));
            }
            for (o, chunk) in out.iter_mut().zip(self.src[self.pos..self.pos + need].chunks(nbytes)) {
                *o = chunk.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64) as i64;
            }
            self.pos += need;
            return Ok(());
        }
        for o in out.iter_mut() {
            let mut result: u64 = 0;
            let mut bits_to_read = width;
            while bits_to_read > self.bits_left {
                result <<= self.bits_left;
                result |= self.current as u64 & low_mask(self.bits_left);
                bits_to_read -= self.bits_left;
                self.current = self.next_byte()?;
                self.bits_left = 8;
            }
            if bits_to_read > 0 {
                self.bits_left -= bits_to_read;
                result <<= bits_to_read;
                result |= (self.current as u64 >> self.bits_left) & low_mask(bits_to_read);
            }
            *o = result as i64;
        }
        Ok(())
    }
}
