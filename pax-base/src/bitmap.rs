use std::ops::Range;

/// A growable bitmap that counts bits in order from least-to-most
/// significant bits and ascending words. Used for column null tracking
/// (set = not null) and for row visibility maps (set = deleted).
///
/// Bits past `len` are always zero.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new() -> Self {
        Bitmap::default()
    }

    pub fn with_len(len: usize, val: bool) -> Self {
        let mut bm = Bitmap::new();
        bm.extend(len, val);
        bm
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, val: bool) {
        let i = self.len;
        if i / 64 >= self.words.len() {
            self.words.push(0);
        }
        self.len += 1;
        self.set(i, val);
    }

    pub fn extend(&mut self, n: usize, val: bool) {
        if !val {
            // Zero bits only need words to exist.
            self.len += n;
            self.words.resize(self.len.div_ceil(64), 0);
            return;
        }
        for _ in 0..n {
            self.push(true);
        }
    }

    /// Sets bit `i`, growing the bitmap with zero bits if `i >= len`.
    pub fn set(&mut self, i: usize, val: bool) {
        if i >= self.len {
            self.extend(i + 1 - self.len, false);
        }
        if val {
            self.words[i / 64] |= 1 << (i % 64);
        } else {
            self.words[i / 64] &= !(1 << (i % 64));
        }
    }

    /// Bits past the end read as zero.
    pub fn get(&self, i: usize) -> bool {
        i < self.len && (self.words[i / 64] & (1 << (i % 64))) != 0
    }

    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|x| x.count_ones() as usize).sum()
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|x| *x != 0)
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.len
    }

    /// Number of set bits in positions `0..=i`.
    pub fn rank(&self, i: usize) -> usize {
        self.count_range(0..i + 1)
    }

    /// Number of set bits in `range`, clamped to the bitmap's length.
    pub fn count_range(&self, range: Range<usize>) -> usize {
        let end = range.end.min(self.len);
        let start = range.start.min(end);
        if start == end {
            return 0;
        }
        let (sw, ew) = (start / 64, (end - 1) / 64);
        let lo_mask = u64::MAX << (start % 64);
        let hi_mask = u64::MAX >> (63 - ((end - 1) % 64));
        if sw == ew {
            return (self.words[sw] & lo_mask & hi_mask).count_ones() as usize;
        }
        let mut n = (self.words[sw] & lo_mask).count_ones() as usize;
        for w in &self.words[sw + 1..ew] {
            n += w.count_ones() as usize;
        }
        n + (self.words[ew] & hi_mask).count_ones() as usize
    }

    /// Position of the `k`th (zero-based) set bit.
    pub fn select(&self, k: usize) -> Option<usize> {
        let mut remaining = k;
        for (wi, w) in self.words.iter().enumerate() {
            let ones = w.count_ones() as usize;
            if remaining < ones {
                let mut w = *w;
                for _ in 0..remaining {
                    w &= w - 1;
                }
                return Some(wi * 64 + w.trailing_zeros() as usize);
            }
            remaining -= ones;
        }
        None
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|i| self.get(*i))
    }

    pub fn union(&mut self, other: &Self) {
        if other.len > self.len {
            self.extend(other.len - self.len, false);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    pub fn intersect(&mut self, other: &Self) {
        for (i, a) in self.words.iter_mut().enumerate() {
            *a &= other.words.get(i).copied().unwrap_or(0);
        }
    }

    pub fn subtract(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= !*b;
        }
    }

    /// Packed little-endian bytes, `ceil(len / 8)` of them.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        out.truncate(self.len.div_ceil(8));
        out
    }

    /// Inverse of `to_bytes`; returns `None` if `bytes` is too short for `len`.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Option<Self> {
        if bytes.len() < len.div_ceil(8) {
            return None;
        }
        let mut words = vec![0u64; len.div_ceil(64)];
        for (i, b) in bytes[..len.div_ceil(8)].iter().enumerate() {
            words[i / 8] |= (*b as u64) << ((i % 8) * 8);
        }
        if len % 64 != 0 {
            if let Some(last) = words.last_mut() {
                *last &= u64::MAX >> (64 - len % 64);
            }
        }
        Some(Bitmap { words, len })
    }
}
