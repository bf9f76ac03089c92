// Dictionary encoding for variable-length values.
//
// Distinct values are sorted and their bytes laid into a heap that reuses
// any earlier occurrence of the same bytes. The stream is:
//
//   varint entry count, varint heap length, heap bytes
//   varint length + unsigned RLE stream of entry heap offsets
//   varint length + unsigned RLE stream of entry lengths
//   unsigned RLE stream of codes, one per encoded value

use std::collections::BTreeMap;

use crate::bitpack::{read_vulong, write_vulong};
use crate::buffer::DataBuffer;
use crate::rle::{RleV2Decoder, RleV2Encoder};
use pax_base::{err, Result};

#[derive(Debug, Default)]
pub(crate) struct Heap {
    pub(crate) data: Vec<u8>,
}

// Reuse is only searched for in the heap's most recent bytes, which keeps
// each add linear in the window rather than in the heap.
const HEAP_REUSE_WINDOW: usize = 4096;

impl Heap {
    pub(crate) fn add(&mut self, new_data: &[u8]) -> usize {
        if new_data.is_empty() {
            return 0;
        }
        let start = self.data.len().saturating_sub(HEAP_REUSE_WINDOW);
        if let Some(pos) = memchr::memmem::find(&self.data[start..], new_data) {
            start + pos
        } else {
            let pos = self.data.len();
            self.data.extend_from_slice(new_data);
            pos
        }
    }
}

pub struct DictEncoded {
    pub entries: usize,
    pub bytes: Vec<u8>,
}

/// Builds the sorted dictionary for `vals` and returns the encoded stream.
pub fn dict_encode<'a>(vals: impl Iterator<Item = &'a [u8]> + Clone) -> DictEncoded {
    let mut dict: BTreeMap<&[u8], i64> = BTreeMap::new();
    for v in vals.clone() {
        dict.insert(v, 0);
    }
    let mut heap = Heap::default();
    let mut offsets = Vec::with_capacity(dict.len());
    let mut lens = Vec::with_capacity(dict.len());
    for (code, (v, slot)) in dict.iter_mut().enumerate() {
        *slot = code as i64;
        offsets.push(heap.add(v) as i64);
        lens.push(v.len() as i64);
    }
    let codes: Vec<i64> = vals.map(|v| dict[v]).collect();

    let mut out = DataBuffer::new(0);
    write_vulong(&mut out, dict.len() as u64);
    write_vulong(&mut out, heap.data.len() as u64);
    out.append(&heap.data);
    for stream in [&offsets, &lens] {
        let enc = RleV2Encoder::encode_all(false, stream);
        write_vulong(&mut out, enc.len() as u64);
        out.append(&enc);
    }
    out.append(&RleV2Encoder::encode_all(false, &codes));
    DictEncoded {
        entries: dict.len(),
        bytes: out.into_vec(),
    }
}

/// Expands a dictionary stream back into the concatenated values.
pub fn dict_decode(src: &[u8], out: &mut DataBuffer) -> Result<()> {
    let mut pos = 0;
    let entries = read_vulong(src, &mut pos)? as usize;
    let heap_len = read_vulong(src, &mut pos)? as usize;
    let Some(heap) = src.get(pos..pos.saturating_add(heap_len)) else {
        return Err(err("dictionary heap past end of stream"));
    };
    pos += heap_len;
    let mut tables = Vec::with_capacity(2);
    for _ in 0..2 {
        let len = read_vulong(src, &mut pos)? as usize;
        let Some(stream) = src.get(pos..pos.saturating_add(len)) else {
            return Err(err("dictionary table past end of stream"));
        };
        pos += len;
        tables.push(RleV2Decoder::decode_all(stream, false)?);
    }
    let (offsets, lens) = (&tables[0], &tables[1]);
    if offsets.len() != entries || lens.len() != entries {
        return Err(err("dictionary table length mismatch"));
    }
    let mut codes = RleV2Decoder::new(&src[pos..], false);
    while codes.has_more() {
        let code = codes.next_value()? as usize;
        if code >= entries {
            return Err(err("dictionary code out of range"));
        }
        let (Ok(off), Ok(len)) = (usize::try_from(offsets[code]), usize::try_from(lens[code])) else {
            return Err(err("negative dictionary entry"));
        };
        let Some(bytes) = off.checked_add(len).and_then(|end| heap.get(off..end)) else {
            return Err(err("dictionary entry past end of heap"));
        };
        out.append(bytes);
    }
    Ok(())
}
