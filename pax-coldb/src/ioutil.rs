use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use pax_base::{io_err, Result};

/// A positionally read/written file. Calls are blocking and never retried.
pub trait File: Send {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// Fills `buf` from `offset`; reading past the end is an error.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn len(&mut self) -> Result<u64>;
}

pub trait FileSystem: Send + Sync {
    /// Creates `path`, which must not already exist.
    fn create(&self, path: &Path) -> Result<Box<dyn File>>;

    fn open(&self, path: &Path) -> Result<Box<dyn File>>;

    fn delete(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

pub fn read_vec(file: &mut dyn File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.read_at(&mut buf, offset)?;
    Ok(buf)
}

// LocalFileSystem

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

struct LocalFile {
    file: std::fs::File,
}

impl File for LocalFile {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl FileSystem for LocalFileSystem {
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Box::new(LocalFile { file }))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Box::new(LocalFile { file }))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// MemFileSystem

type MemBytes = Arc<Mutex<Vec<u8>>>;

/// Files held in memory; clones share the same files.
#[derive(Clone, Debug, Default)]
pub struct MemFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, MemBytes>>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        MemFileSystem::default()
    }

    /// Snapshot of a file's contents.
    pub fn contents(&self, path: &Path) -> Result<Vec<u8>> {
        let mem = self.lookup(path)?;
        let bytes = mem.lock().map_err(|_| io_err("mem file lock poisoned"))?;
        Ok(bytes.clone())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        match self.files.lock() {
            Ok(files) => files.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn lookup(&self, path: &Path) -> Result<MemBytes> {
        let files = self.files.lock().map_err(|_| io_err("mem filesystem lock poisoned"))?;
        match files.get(path) {
            Some(mem) => Ok(mem.clone()),
            None => Err(io_err(format!("no such file: {}", path.display()))),
        }
    }
}

struct MemFile {
    mem: MemBytes,
}

impl File for MemFile {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let mut mem = self.mem.lock().map_err(|_| io_err("mem file lock poisoned"))?;
        let (lo, hi) = (offset as usize, offset as usize + buf.len());
        if mem.len() < hi {
            mem.resize(hi, 0);
        }
        mem[lo..hi].copy_from_slice(buf);
        Ok(())
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mem = self.mem.lock().map_err(|_| io_err("mem file lock poisoned"))?;
        let lo = offset as usize;
        let Some(src) = mem.get(lo..lo + buf.len()) else {
            return Err(io_err(format!("read of {} bytes at {} past end of file", buf.len(), offset)));
        };
        buf.copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&mut self) -> Result<u64> {
        let mem = self.mem.lock().map_err(|_| io_err("mem file lock poisoned"))?;
        Ok(mem.len() as u64)
    }
}

impl FileSystem for MemFileSystem {
    fn create(&self, path: &Path) -> Result<Box<dyn File>> {
        let mut files = self.files.lock().map_err(|_| io_err("mem filesystem lock poisoned"))?;
        if files.contains_key(path) {
            return Err(io_err(format!("file exists: {}", path.display())));
        }
        let mem = MemBytes::default();
        files.insert(path.to_owned(), mem.clone());
        Ok(Box::new(MemFile { mem }))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn File>> {
        Ok(Box::new(MemFile { mem: self.lookup(path)? }))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let mut files = self.files.lock().map_err(|_| io_err("mem filesystem lock poisoned"))?;
        match files.remove(path) {
            Some(_) => Ok(()),
            None => Err(io_err(format!("no such file: {}", path.display()))),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().map(|f| f.contains_key(path)).unwrap_or(false)
    }
}
