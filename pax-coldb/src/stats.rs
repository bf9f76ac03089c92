use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::types::{ColumnDesc, Datum};
use pax_base::{schema_err, Result};

const BLOOM_FP_RATE: f64 = 0.01;
const BLOOM_MAX_HASHES: u32 = 16;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum MinMax {
    Int { min: i64, max: i64 },
    Float { min: OrderedFloat<f64>, max: OrderedFloat<f64> },
    Bytes { min: Vec<u8>, max: Vec<u8> },
}

impl MinMax {
    fn of(datum: &Datum) -> Option<MinMax> {
        if let Some(v) = datum.as_i64() {
            return Some(MinMax::Int { min: v, max: v });
        }
        if let Some(v) = datum.as_f64() {
            let v = OrderedFloat(v);
            return Some(MinMax::Float { min: v, max: v });
        }
        datum.as_bytes().map(|b| MinMax::Bytes {
            min: b.to_vec(),
            max: b.to_vec(),
        })
    }

    fn widen(&mut self, other: &MinMax) {
        match (self, other) {
            (MinMax::Int { min, max }, MinMax::Int { min: lo, max: hi }) => {
                *min = (*min).min(*lo);
                *max = (*max).max(*hi);
            }
            (MinMax::Float { min, max }, MinMax::Float { min: lo, max: hi }) => {
                *min = (*min).min(*lo);
                *max = (*max).max(*hi);
            }
            (MinMax::Bytes { min, max }, MinMax::Bytes { min: lo, max: hi }) => {
                if *lo < *min {
                    min.clone_from(lo);
                }
                if *hi > *max {
                    max.clone_from(hi);
                }
            }
            _ => {}
        }
    }

    /// Whether `datum` may fall inside the range.
    pub fn may_contain(&self, datum: &Datum) -> bool {
        match (self, MinMax::of(datum)) {
            (MinMax::Int { min, max }, Some(MinMax::Int { min: v, .. })) => *min <= v && v <= *max,
            (MinMax::Float { min, max }, Some(MinMax::Float { min: v, .. })) => *min <= v && v <= *max,
            (MinMax::Bytes { min, max }, Some(MinMax::Bytes { min: v, .. })) => *min <= v && v <= *max,
            _ => true,
        }
    }
}

/// A bloom filter over rapidhash digests, probed by double hashing.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    hashes: u32,
}

impl BloomFilter {
    pub fn new(expected: usize, fp_rate: f64) -> Self {
        let n = expected.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let m = (-(n * fp_rate.ln()) / (ln2 * ln2)).ceil().max(64.0) as usize;
        let hashes = ((m as f64 / n) * ln2).round().clamp(1.0, BLOOM_MAX_HASHES as f64) as u32;
        BloomFilter {
            bits: vec![0; m.div_ceil(64)],
            hashes,
        }
    }

    pub fn hash(value: &[u8]) -> u64 {
        rapidhash::rapidhash(value)
    }

    fn probes(&self, h: u64) -> impl Iterator<Item = usize> + '_ {
        let nbits = (self.bits.len() * 64) as u64;
        let (h1, h2) = (h, h.rotate_left(32) | 1);
        (0..self.hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % nbits) as usize)
    }

    pub fn insert_hash(&mut self, h: u64) {
        let probes: Vec<usize> = self.probes(h).collect();
        for p in probes {
            self.bits[p / 64] |= 1 << (p % 64);
        }
    }

    pub fn contains_hash(&self, h: u64) -> bool {
        self.probes(h).all(|p| self.bits[p / 64] & (1 << (p % 64)) != 0)
    }

    pub fn might_contain(&self, datum: &Datum) -> bool {
        match bloom_key(datum) {
            Some(key) => self.contains_hash(BloomFilter::hash(&key)),
            None => true,
        }
    }
}

/// The bytes a datum is hashed as.
fn bloom_key(datum: &Datum) -> Option<Vec<u8>> {
    if let Some(v) = datum.as_i64() {
        return Some(v.to_le_bytes().to_vec());
    }
    if let Some(v) = datum.as_f64() {
        return Some(v.to_bits().to_le_bytes().to_vec());
    }
    datum.as_bytes().map(|b| b.to_vec())
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub rows: u64,
    pub non_null_rows: u64,
    pub has_null: bool,
    pub all_null: bool,
    pub min_max: Option<MinMax>,
    pub bloom: Option<BloomFilter>,
}

impl ColumnStatistics {
    /// False only when no row of the column can equal `datum`.
    pub fn may_contain(&self, datum: &Datum) -> bool {
        if datum.is_null() {
            return self.has_null;
        }
        if self.non_null_rows == 0 {
            return false;
        }
        self.min_max.as_ref().map_or(true, |mm| mm.may_contain(datum))
            && self.bloom.as_ref().map_or(true, |bf| bf.might_contain(datum))
    }
}

#[derive(Clone, Debug, Default)]
struct ColumnCollector {
    min_max_enabled: bool,
    rows: u64,
    non_null_rows: u64,
    min_max: Option<MinMax>,
    hashes: Option<BTreeSet<u64>>,
}

impl ColumnCollector {
    fn add(&mut self, datum: &Datum) {
        self.rows += 1;
        if datum.is_null() {
            return;
        }
        self.non_null_rows += 1;
        if self.min_max_enabled {
            if let Some(mm) = MinMax::of(datum) {
                match &mut self.min_max {
                    Some(cur) => cur.widen(&mm),
                    None => self.min_max = Some(mm),
                }
            }
        }
        if let (Some(hashes), Some(key)) = (&mut self.hashes, bloom_key(datum)) {
            hashes.insert(BloomFilter::hash(&key));
        }
    }

    // A range or bloom filter survives only if both sides collected it.
    fn merge(&mut self, other: &ColumnCollector) {
        self.rows += other.rows;
        self.non_null_rows += other.non_null_rows;
        self.min_max_enabled &= other.min_max_enabled;
        if !self.min_max_enabled {
            self.min_max = None;
        }
        match (&mut self.min_max, &other.min_max) {
            (Some(cur), Some(mm)) => cur.widen(mm),
            (None, Some(mm)) if self.min_max_enabled => self.min_max = Some(mm.clone()),
            _ => {}
        }
        match (&mut self.hashes, &other.hashes) {
            (Some(hashes), Some(theirs)) => hashes.extend(theirs.iter().copied()),
            (Some(_), None) => self.hashes = None,
            _ => {}
        }
    }

    fn finish(&self) -> ColumnStatistics {
        let bloom = self.hashes.as_ref().map(|hashes| {
            let mut bf = BloomFilter::new(hashes.len(), BLOOM_FP_RATE);
            for h in hashes {
                bf.insert_hash(*h);
            }
            bf
        });
        ColumnStatistics {
            rows: self.rows,
            non_null_rows: self.non_null_rows,
            has_null: self.non_null_rows < self.rows,
            all_null: self.rows > 0 && self.non_null_rows == 0,
            min_max: self.min_max.clone(),
            bloom,
        }
    }
}

/// Running statistics for every column of a schema.
#[derive(Clone, Debug, Default)]
pub struct StatsCollector {
    columns: Vec<ColumnCollector>,
}

impl StatsCollector {
    /// `min_max` and `bloom` name the columns that collect min/max and a
    /// bloom filter; every column counts rows and nulls.
    pub fn new(schema: &[ColumnDesc], min_max: &[String], bloom: &[String]) -> Self {
        let columns = schema
            .iter()
            .map(|c| ColumnCollector {
                min_max_enabled: min_max.contains(&c.name),
                hashes: bloom.contains(&c.name).then(BTreeSet::new),
                ..Default::default()
            })
            .collect();
        StatsCollector { columns }
    }

    pub fn add_row(&mut self, row: &[Datum]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(schema_err(format!(
                "row of {} values for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (col, datum) in self.columns.iter_mut().zip(row) {
            col.add(datum);
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &StatsCollector) -> Result<()> {
        if other.columns.len() != self.columns.len() {
            return Err(schema_err("merging statistics of different column counts"));
        }
        for (col, theirs) in self.columns.iter_mut().zip(&other.columns) {
            col.merge(theirs);
        }
        Ok(())
    }

    /// Clears the running values, keeping the column configuration.
    pub fn reset(&mut self) {
        for col in &mut self.columns {
            *col = ColumnCollector {
                min_max_enabled: col.min_max_enabled,
                hashes: col.hashes.as_ref().map(|_| BTreeSet::new()),
                ..Default::default()
            };
        }
    }

    pub fn finish(&self) -> Vec<ColumnStatistics> {
        self.columns.iter().map(ColumnCollector::finish).collect()
    }
}
