// A DataBuffer is a fixed-capacity byte region with two cursors:
//
//   0 <= treated <= used <= capacity
//
// `used` is the committed prefix: `write` places bytes at `used` without
// committing them and `brush` commits. `treated` marks the prefix that a
// downstream pass (an encoder, a decoder, a compressor) has already
// consumed, so a streaming pass can pick up at `treated` after more data
// arrives or after a resize.
//
// The memory is either owned or a borrowed view over external memory (the
// zero-copy read path). A borrowed view is copied into owned memory the
// first time it is written to or resized.

use std::borrow::Cow;

use pax_base::{err, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataBuffer<'a> {
    mem: Cow<'a, [u8]>,
    used: usize,
    treated: usize,
}

impl DataBuffer<'static> {
    pub fn new(capacity: usize) -> Self {
        DataBuffer {
            mem: Cow::Owned(vec![0; capacity]),
            used: 0,
            treated: 0,
        }
    }

    /// Takes over `vec` as fully-used owned memory.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let used = vec.len();
        DataBuffer {
            mem: Cow::Owned(vec),
            used,
            treated: 0,
        }
    }
}

impl<'a> DataBuffer<'a> {
    /// A non-owning view over `bytes`, all of which count as used.
    pub fn wrap(bytes: &'a [u8]) -> Self {
        DataBuffer {
            mem: Cow::Borrowed(bytes),
            used: bytes.len(),
            treated: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity() - self.used
    }

    pub fn treated(&self) -> usize {
        self.treated
    }

    /// Bytes committed but not yet consumed by a downstream pass.
    pub fn untreated(&self) -> usize {
        self.used - self.treated
    }

    pub fn is_mem_taken_over(&self) -> bool {
        matches!(self.mem, Cow::Owned(_))
    }

    /// Places `bytes` at the `used` cursor without committing them.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.available() {
            return Err(err("data buffer write past capacity"));
        }
        let used = self.used;
        self.mem.to_mut()[used..used + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Commits `n` previously written bytes.
    pub fn brush(&mut self, n: usize) -> Result<()> {
        if n > self.available() {
            return Err(err("data buffer brush past capacity"));
        }
        self.used += n;
        Ok(())
    }

    pub fn brush_all(&mut self) {
        self.used = self.capacity();
    }

    /// Marks `n` more committed bytes as consumed.
    pub fn brush_treated(&mut self, n: usize) -> Result<()> {
        if n > self.untreated() {
            return Err(err("data buffer treated cursor past used"));
        }
        self.treated += n;
        Ok(())
    }

    pub fn brush_treated_all(&mut self) {
        self.treated = self.used;
    }

    /// Resets both cursors, keeping the capacity.
    pub fn clear(&mut self) {
        self.used = 0;
        self.treated = 0;
    }

    /// Changes the capacity, preserving committed content and both cursors.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.used {
            return Err(err("data buffer resize below used"));
        }
        self.mem.to_mut().resize(capacity, 0);
        Ok(())
    }

    /// Grows geometrically until `additional` more bytes fit.
    pub fn reserve(&mut self, additional: usize) {
        if additional <= self.available() {
            return;
        }
        let want = (self.used + additional).max(self.capacity() * 2).max(64);
        self.mem.to_mut().resize(want, 0);
    }

    /// Write, growing if needed, and commit.
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        let used = self.used;
        self.mem.to_mut()[used..used + bytes.len()].copy_from_slice(bytes);
        self.used += bytes.len();
    }

    pub fn append_zeros(&mut self, n: usize) {
        self.reserve(n);
        let used = self.used;
        self.mem.to_mut()[used..used + n].fill(0);
        self.used += n;
    }

    pub fn push(&mut self, byte: u8) {
        self.append(&[byte]);
    }

    /// The committed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.mem[..self.used]
    }

    pub fn untreated_slice(&self) -> &[u8] {
        &self.mem[self.treated..self.used]
    }

    /// The uncommitted tail, for passes that fill it in place and then `brush`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let used = self.used;
        &mut self.mem.to_mut()[used..]
    }

    pub fn into_vec(self) -> Vec<u8> {
        let mut v = self.mem.into_owned();
        v.truncate(self.used);
        v
    }

    pub fn into_owned(self) -> DataBuffer<'static> {
        DataBuffer {
            mem: Cow::Owned(self.mem.into_owned()),
            used: self.used,
            treated: self.treated,
        }
    }
}
