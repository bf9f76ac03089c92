// ORC-style run-length integer encoding, version 2.
//
// Values are buffered in a window of up to 512 literals and emitted as
// runs, each starting with a header whose top 2 bits give the run type:
//
//   SHORT_REPEAT (0): {2b type}{3b value bytes - 1}{3b count - 3}
//                     value, big-endian, zigzagged when signed
//   DIRECT (1):       {2b type}{5b width code}{9b len - 1}
//                     len zigzagged values bit-packed at width
//   PATCHED_BASE (2): {2b type}{5b width code}{9b len - 1}
//                     {3b base bytes - 1}{5b patch width code}
//                     {3b patch gap width - 1}{5b patch list len}
//                     base (sign-magnitude, big-endian),
//                     len base-reduced values bit-packed at width,
//                     patch list of (gap << patch width | patch) entries
//   DELTA (3):        {2b type}{5b width code, 0 for fixed delta}{9b len - 1}
//                     first value varint, delta base signed varint,
//                     len - 2 absolute deltas bit-packed at width
//
// Runs are chosen in the order short-repeat, delta, patched-base, direct.

use std::ops::Range;

use crate::bitpack::{
    bits_required, closest_aligned_bits, closest_fixed_bits, decode_bit_width, encode_bit_width,
    percentile_bits, read_vslong, read_vulong, write_longs, write_vslong, write_vulong,
    zigzag_decode, zigzag_encode, LongReader,
};
use crate::buffer::DataBuffer;
use pax_base::{err, Bitmap, Result};
use tracing::trace;

pub const MIN_REPEAT: usize = 3;
pub const MAX_SHORT_REPEAT_LENGTH: usize = 10;
pub const MAX_SCOPE: usize = 512;
const MAX_PATCH_LIST: usize = 31;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum RunType {
    ShortRepeat = 0,
    Direct = 1,
    PatchedBase = 2,
    Delta = 3,
}

impl RunType {
    pub fn of_header(b: u8) -> RunType {
        match b >> 6 {
            0 => RunType::ShortRepeat,
            1 => RunType::Direct,
            2 => RunType::PatchedBase,
            _ => RunType::Delta,
        }
    }
}

struct PatchedBlob {
    width: u32,
    patch_width: u32,
    gap_width: u32,
    reduced: Vec<i64>,
    patches: Vec<i64>,
}

enum RunPlan {
    Direct { width: u32, zigzagged: Vec<i64> },
    Delta { fixed: Option<i64>, width: u32, deltas: Vec<i64> },
    PatchedBase(PatchedBlob),
}

pub struct RleV2Encoder {
    signed: bool,
    out: DataBuffer<'static>,
    literals: Vec<i64>,
    fixed_run: usize,
    var_run: usize,
    prev_delta: i64,
}

impl RleV2Encoder {
    pub fn new(signed: bool) -> Self {
        RleV2Encoder {
            signed,
            out: DataBuffer::new(0),
            literals: Vec::with_capacity(MAX_SCOPE),
            fixed_run: 0,
            var_run: 0,
            prev_delta: 0,
        }
    }

    pub fn encode_all(signed: bool, values: &[i64]) -> Vec<u8> {
        let mut enc = RleV2Encoder::new(signed);
        for v in values {
            enc.append(*v);
        }
        enc.flush();
        enc.into_output().into_vec()
    }

    pub fn output(&self) -> &[u8] {
        self.out.as_slice()
    }

    pub fn into_output(self) -> DataBuffer<'static> {
        self.out
    }

    fn init_literals(&mut self, v: i64) {
        self.literals.push(v);
        self.fixed_run = 1;
        self.var_run = 1;
    }

    pub fn append(&mut self, v: i64) {
        let n = self.literals.len();
        if n == 0 {
            self.init_literals(v);
            return;
        }
        if n == 1 {
            self.prev_delta = v.wrapping_sub(self.literals[0]);
            self.literals.push(v);
            if v == self.literals[0] {
                self.fixed_run = 2;
                self.var_run = 0;
            } else {
                self.fixed_run = 0;
                self.var_run = 2;
            }
            return;
        }
        let delta = v.wrapping_sub(self.literals[n - 1]);
        if self.prev_delta == 0 && delta == 0 {
            self.literals.push(v);
            // Repeats at the tail of a variable run.
            if self.var_run > 0 {
                self.fixed_run = 2;
            }
            self.fixed_run += 1;
            if self.fixed_run >= MIN_REPEAT && self.var_run > 0 {
                // Flush the variable part and carry the repeats over.
                let split = self.literals.len() - MIN_REPEAT;
                let tail: Vec<i64> = self.literals.drain(split..).collect();
                self.var_run = self.var_run.saturating_sub(MIN_REPEAT - 1);
                self.write_planned();
                self.literals.extend(tail);
            }
            if self.fixed_run == MAX_SCOPE {
                self.write_fixed_delta();
            }
            return;
        }
        if self.fixed_run >= MIN_REPEAT {
            if self.fixed_run <= MAX_SHORT_REPEAT_LENGTH {
                self.write_short_repeat();
            } else {
                self.write_fixed_delta();
            }
        }
        if self.fixed_run > 0 && self.fixed_run < MIN_REPEAT {
            if let Some(last) = self.literals.last() {
                if v != *last {
                    self.var_run = self.fixed_run;
                    self.fixed_run = 0;
                }
            }
        }
        match self.literals.last() {
            None => self.init_literals(v),
            Some(last) => {
                self.prev_delta = v.wrapping_sub(*last);
                self.literals.push(v);
                self.var_run += 1;
                if self.var_run == MAX_SCOPE {
                    self.write_planned();
                }
            }
        }
    }

    /// Emits any buffered literals. Calling it again with nothing new
    /// buffered writes nothing.
    pub fn flush(&mut self) {
        if self.literals.is_empty() {
            return;
        }
        if self.var_run != 0 {
            self.write_planned();
        } else if self.fixed_run != 0 {
            if self.fixed_run < MIN_REPEAT {
                self.var_run = self.fixed_run;
                self.fixed_run = 0;
                self.write_planned();
            } else if self.fixed_run <= MAX_SHORT_REPEAT_LENGTH {
                self.write_short_repeat();
            } else {
                self.write_fixed_delta();
            }
        }
    }

    fn clear(&mut self) {
        self.literals.clear();
        self.prev_delta = 0;
    }

    fn write_planned(&mut self) {
        if self.literals.is_empty() {
            return;
        }
        match self.plan() {
            RunPlan::Direct { width, zigzagged } => self.write_direct(width, &zigzagged),
            RunPlan::Delta { fixed, width, deltas } => self.write_delta(fixed, width, &deltas),
            RunPlan::PatchedBase(blob) => self.write_patched_base(blob),
        }
    }

    fn zigzagged(&self) -> Vec<i64> {
        if self.signed {
            self.literals.iter().map(|v| zigzag_encode(*v) as i64).collect()
        } else {
            self.literals.clone()
        }
    }

    fn plan(&self) -> RunPlan {
        let lits = &self.literals;
        let n = lits.len();
        let zigzagged = self.zigzagged();
        let zz_bits_100p = percentile_bits(&zigzagged, 1.0);
        let direct = |zigzagged: Vec<i64>| RunPlan::Direct {
            width: closest_aligned_bits(zz_bits_100p),
            zigzagged,
        };
        if n <= MIN_REPEAT {
            return direct(zigzagged);
        }

        let mut increasing = true;
        let mut decreasing = true;
        let mut fixed_delta = true;
        let mut min = lits[0];
        let mut max = lits[0];
        let initial_delta = lits[1].wrapping_sub(lits[0]);
        let mut deltas = Vec::with_capacity(n - 1);
        deltas.push(initial_delta);
        let mut delta_max: i64 = 0;
        for i in 1..n {
            let (l0, l1) = (lits[i - 1], lits[i]);
            let d = l1.wrapping_sub(l0);
            min = min.min(l1);
            max = max.max(l1);
            increasing &= l0 <= l1;
            decreasing &= l0 >= l1;
            fixed_delta &= d == initial_delta;
            if i > 1 {
                let ad = d.wrapping_abs();
                deltas.push(ad);
                delta_max = delta_max.max(ad);
            }
        }

        if max.checked_sub(min).is_none() {
            return direct(zigzagged);
        }
        if min == max {
            return RunPlan::Delta { fixed: Some(0), width: 0, deltas };
        }
        if fixed_delta {
            return RunPlan::Delta { fixed: Some(initial_delta), width: 0, deltas };
        }
        if initial_delta != 0 && (increasing || decreasing) {
            let mut width = closest_aligned_bits(bits_required(delta_max as u64));
            // Width code 0 means fixed delta.
            if width == 1 {
                width = 2;
            }
            return RunPlan::Delta { fixed: None, width, deltas };
        }

        let zz_bits_90p = percentile_bits(&zigzagged, 0.9);
        // The base is stored sign-magnitude in at most 8 bytes.
        if zz_bits_100p.saturating_sub(zz_bits_90p) > 1 && min.unsigned_abs() < 1 << 56 {
            let reduced: Vec<i64> = lits.iter().map(|v| v - min).collect();
            let br_bits_95p = percentile_bits(&reduced, 0.95);
            let br_bits_100p = percentile_bits(&reduced, 1.0);
            if br_bits_100p != br_bits_95p {
                if let Some(blob) = prepare_patched_blob(reduced, br_bits_95p, br_bits_100p) {
                    return RunPlan::PatchedBase(blob);
                }
            }
        }
        direct(zigzagged)
    }

    fn write_header(&mut self, run: RunType, width_code: u32, len: usize) {
        let len = (len - 1) as u32;
        self.out.push(((run as u32) << 6 | width_code << 1 | (len & 0x100) >> 8) as u8);
        self.out.push((len & 0xff) as u8);
    }

    fn write_short_repeat(&mut self) {
        let v = self.literals[0];
        let repeat = if self.signed { zigzag_encode(v) } else { v as u64 };
        let nbytes = bits_required(repeat).div_ceil(8);
        let count = self.literals.len();
        trace!(target: "pax", count, nbytes, "rle short repeat");
        let header = (RunType::ShortRepeat as u32) << 6 | (nbytes - 1) << 3 | (count - MIN_REPEAT) as u32;
        self.out.push(header as u8);
        for i in (0..nbytes).rev() {
            self.out.push((repeat >> (i * 8)) as u8);
        }
        self.fixed_run = 0;
        self.clear();
    }

    fn write_fixed_delta(&mut self) {
        let n = self.literals.len();
        let deltas = vec![0; n - 1];
        self.write_delta(Some(0), 0, &deltas);
    }

    fn write_direct(&mut self, width: u32, zigzagged: &[i64]) {
        let n = zigzagged.len();
        trace!(target: "pax", n, width, "rle direct");
        self.write_header(RunType::Direct, encode_bit_width(width), n);
        write_longs(&mut self.out, zigzagged, width);
        self.var_run = 0;
        self.clear();
    }

    fn write_delta(&mut self, fixed: Option<i64>, width: u32, deltas: &[i64]) {
        let n = self.literals.len();
        trace!(target: "pax", n, width, fixed = ?fixed, "rle delta");
        let width_code = if fixed.is_some() { 0 } else { encode_bit_width(width) };
        self.write_header(RunType::Delta, width_code, n);
        if self.signed {
            write_vslong(&mut self.out, self.literals[0]);
        } else {
            write_vulong(&mut self.out, self.literals[0] as u64);
        }
        match fixed {
            Some(d) => {
                write_vslong(&mut self.out, d);
                if self.fixed_run > MIN_REPEAT {
                    self.fixed_run = 0;
                } else {
                    self.var_run = 0;
                }
            }
            None => {
                write_vslong(&mut self.out, deltas[0]);
                write_longs(&mut self.out, &deltas[1..], width);
                self.var_run = 0;
            }
        }
        self.clear();
    }

    fn write_patched_base(&mut self, blob: PatchedBlob) {
        let n = self.literals.len();
        trace!(target: "pax", n, width = blob.width, patches = blob.patches.len(), "rle patched base");
        self.write_header(RunType::PatchedBase, encode_bit_width(blob.width), n);

        let mut min = self.literals.iter().copied().min().unwrap_or(0);
        let negative = min < 0;
        if negative {
            min = -min;
        }
        let base_width = bits_required(min as u64) + 1;
        let base_bytes = base_width.div_ceil(8);
        if negative {
            min |= 1i64 << (base_bytes * 8 - 1);
        }
        self.out.push(((base_bytes - 1) << 5 | encode_bit_width(blob.patch_width)) as u8);
        self.out.push(((blob.gap_width - 1) << 5 | blob.patches.len() as u32) as u8);
        for i in (0..base_bytes).rev() {
            self.out.push((min >> (i * 8)) as u8);
        }
        write_longs(&mut self.out, &blob.reduced, blob.width);
        write_longs(
            &mut self.out,
            &blob.patches,
            closest_fixed_bits(blob.gap_width + blob.patch_width),
        );
        self.var_run = 0;
        self.clear();
    }
}

// Values above the 95th percentile width keep their low bits in the packed
// array; their high bits go to the patch list, keyed by the gap from the
// previous patched index. Gaps over 255 are split with (255, 0) entries.
fn prepare_patched_blob(mut reduced: Vec<i64>, mut width: u32, max_width: u32) -> Option<PatchedBlob> {
    let mut patch_width = closest_fixed_bits(max_width - width);
    if patch_width == 64 {
        patch_width = 56;
        width = 8;
    }
    let mask = (1i64 << width) - 1;
    let mut gaps = Vec::new();
    let mut prev = 0usize;
    let mut max_gap = 0usize;
    for (i, v) in reduced.iter_mut().enumerate() {
        if *v > mask {
            let gap = i - prev;
            max_gap = max_gap.max(gap);
            prev = i;
            gaps.push((gap, ((*v as u64) >> width) as i64));
            *v &= mask;
        }
    }
    let mut gap_width = if max_gap == 0 && !gaps.is_empty() {
        1
    } else {
        bits_required(max_gap as u64)
    };
    if gap_width > 8 {
        gap_width = 8;
    }
    let mut patches = Vec::with_capacity(gaps.len());
    for (mut gap, patch) in gaps {
        while gap > 255 {
            patches.push(255i64 << patch_width);
            gap -= 255;
        }
        patches.push((gap as i64) << patch_width | patch);
    }
    if patches.is_empty() || patches.len() > MAX_PATCH_LIST {
        return None;
    }
    Some(PatchedBlob {
        width,
        patch_width,
        gap_width,
        reduced,
        patches,
    })
}

/// Decodes a run-length stream. Borrows its source and never writes to it;
/// a partially consumed run is kept so reads can stop and resume anywhere.
pub struct RleV2Decoder<'a> {
    src: &'a [u8],
    pos: usize,
    signed: bool,
    literals: Vec<i64>,
    used: usize,
}

impl<'a> RleV2Decoder<'a> {
    pub fn new(src: &'a [u8], signed: bool) -> Self {
        RleV2Decoder {
            src,
            pos: 0,
            signed,
            literals: Vec::with_capacity(MAX_SCOPE),
            used: 0,
        }
    }

    pub fn decode_all(src: &[u8], signed: bool) -> Result<Vec<i64>> {
        let mut dec = RleV2Decoder::new(src, signed);
        let mut out = Vec::new();
        while dec.has_more() {
            out.push(dec.next_value()?);
        }
        Ok(out)
    }

    pub fn has_more(&self) -> bool {
        self.used < self.literals.len() || self.pos < self.src.len()
    }

    pub fn next_value(&mut self) -> Result<i64> {
        if self.used == self.literals.len() {
            self.read_run()?;
        }
        let v = self.literals[self.used];
        self.used += 1;
        Ok(v)
    }

    /// Appends exactly `n` values to `out`.
    pub fn read(&mut self, n: usize, out: &mut Vec<i64>) -> Result<()> {
        out.reserve(n);
        let mut remaining = n;
        while remaining > 0 {
            if self.used == self.literals.len() {
                self.read_run()?;
            }
            let take = remaining.min(self.literals.len() - self.used);
            out.extend_from_slice(&self.literals[self.used..self.used + take]);
            self.used += take;
            remaining -= take;
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            if self.used == self.literals.len() {
                self.read_run()?;
            }
            let take = remaining.min(self.literals.len() - self.used);
            self.used += take;
            remaining -= take;
        }
        Ok(())
    }

    /// The stream holds one value per not-null row. For the logical rows
    /// in `rows`, appends exactly as many values as `not_null` has set
    /// bits there, and returns that count.
    pub fn read_not_null(&mut self, not_null: &Bitmap, rows: Range<usize>, out: &mut Vec<i64>) -> Result<usize> {
        let n = not_null.count_range(rows);
        self.read(n, out)?;
        Ok(n)
    }

    fn byte(&mut self) -> Result<u8> {
        let Some(&b) = self.src.get(self.pos) else {
            return Err(err("rle run past end of stream"));
        };
        self.pos += 1;
        Ok(b)
    }

    fn unpack(&mut self, n: usize, width: u32) -> Result<Vec<i64>> {
        let mut vals = vec![0i64; n];
        let mut rd = LongReader::new(self.src, self.pos);
        rd.read_longs(&mut vals, width)?;
        self.pos = rd.position();
        Ok(vals)
    }

    fn read_run(&mut self) -> Result<()> {
        self.literals.clear();
        self.used = 0;
        let first = self.byte()?;
        match RunType::of_header(first) {
            RunType::ShortRepeat => self.read_short_repeat(first),
            RunType::Direct => self.read_direct(first),
            RunType::PatchedBase => self.read_patched_base(first),
            RunType::Delta => self.read_delta(first),
        }
    }

    fn unzigzag(&self, v: i64) -> i64 {
        if self.signed {
            zigzag_decode(v as u64)
        } else {
            v
        }
    }

    fn read_len(&mut self, first: u8) -> Result<usize> {
        let second = self.byte()?;
        Ok((((first as usize) & 1) << 8 | second as usize) + 1)
    }

    fn read_short_repeat(&mut self, first: u8) -> Result<()> {
        let nbytes = ((first >> 3) & 0x07) as usize + 1;
        let count = (first & 0x07) as usize + MIN_REPEAT;
        let mut v: u64 = 0;
        for _ in 0..nbytes {
            v = (v << 8) | self.byte()? as u64;
        }
        let v = self.unzigzag(v as i64);
        self.literals.resize(count, v);
        Ok(())
    }

    fn read_direct(&mut self, first: u8) -> Result<()> {
        let width = decode_bit_width(((first >> 1) & 0x1f) as u32);
        let len = self.read_len(first)?;
        let vals = self.unpack(len, width)?;
        for v in vals {
            let v = self.unzigzag(v);
            self.literals.push(v);
        }
        Ok(())
    }

    fn read_patched_base(&mut self, first: u8) -> Result<()> {
        let width = decode_bit_width(((first >> 1) & 0x1f) as u32);
        let len = self.read_len(first)?;
        let third = self.byte()?;
        let base_bytes = ((third >> 5) & 0x07) as u32 + 1;
        let patch_width = decode_bit_width((third & 0x1f) as u32);
        let fourth = self.byte()?;
        let gap_width = ((fourth >> 5) & 0x07) as u32 + 1;
        let patch_len = (fourth & 0x1f) as usize;
        if patch_width + gap_width > 64 {
            return Err(err("rle patch entry wider than 64 bits"));
        }

        let mut base: i64 = 0;
        for _ in 0..base_bytes {
            base = (base << 8) | self.byte()? as i64;
        }
        let sign_bit = 1i64 << (base_bytes * 8 - 1);
        if base & sign_bit != 0 {
            base = -(base & !sign_bit);
        }

        let mut vals = self.unpack(len, width)?;
        let patches = self.unpack(patch_len, closest_fixed_bits(patch_width + gap_width))?;
        let patch_mask = (1u64 << patch_width) - 1;
        let mut idx = 0usize;
        for p in patches {
            let p = p as u64;
            let gap = (p >> patch_width) as usize;
            let patch = p & patch_mask;
            idx += gap;
            if gap == 255 && patch == 0 {
                continue;
            }
            let Some(v) = vals.get_mut(idx) else {
                return Err(err("rle patch index out of range"));
            };
            *v = ((*v as u64) | patch.checked_shl(width).unwrap_or(0)) as i64;
        }
        self.literals.extend(vals.into_iter().map(|v| base.wrapping_add(v)));
        Ok(())
    }

    fn read_delta(&mut self, first: u8) -> Result<()> {
        let code = ((first >> 1) & 0x1f) as u32;
        let width = if code == 0 { 0 } else { decode_bit_width(code) };
        let len = self.read_len(first)?;
        let first_val = if self.signed {
            read_vslong(self.src, &mut self.pos)?
        } else {
            read_vulong(self.src, &mut self.pos)? as i64
        };
        self.literals.push(first_val);
        let delta_base = read_vslong(self.src, &mut self.pos)?;
        if width == 0 {
            let mut prev = first_val;
            for _ in 1..len {
                prev = prev.wrapping_add(delta_base);
                self.literals.push(prev);
            }
            return Ok(());
        }
        if len < 2 {
            return Err(err("rle delta run shorter than 2"));
        }
        let mut prev = first_val.wrapping_add(delta_base);
        self.literals.push(prev);
        for d in self.unpack(len - 2, width)? {
            prev = if delta_base < 0 {
                prev.wrapping_sub(d)
            } else {
                prev.wrapping_add(d)
            };
            self.literals.push(prev);
        }
        Ok(())
    }
}
