//! # Memory-Mapped Raw File
//!
//! Disk-backed [`RawFile`] over a single memory-mapped file.
//!
//! ## Design
//!
//! The file is mapped in its entirety; page reads and writes are memcpys
//! against the mapping and `flush()` is an `msync`, the durability barrier
//! the commit ordering relies on. Growing (`new_interval`) and shrinking
//! (`truncate`) change the file length and remap.
//!
//! The mapping lives behind an `RwLock` because remapping invalidates the
//! old view; page accesses take the lock shared, length changes take it
//! exclusively. An empty file has no mapping at all; most platforms
//! refuse zero-length maps.
//!
//! ## Open Modes
//!
//! - `Create` truncates or creates the file
//! - `Open` opens read-write and requires a page-aligned length
//! - `ReadOnly` maps immutably; every mutating call fails

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use memmap2::{Mmap, MmapMut};

use super::{Interval, LockProtocol, OpenMode, PageIndex, RawFile, PAGE_SIZE};

enum Mapping {
    None,
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::None => &[],
            Mapping::ReadWrite(m) => m,
            Mapping::ReadOnly(m) => m,
        }
    }
}

struct MmapInner {
    file: File,
    mapping: Mapping,
    page_count: usize,
}

pub struct MmapFile {
    inner: parking_lot::RwLock<MmapInner>,
    read_only: bool,
    locks: Arc<LockProtocol>,
}

impl MmapFile {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();

        let file = match mode {
            OpenMode::Create => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .wrap_err_with(|| format!("failed to create store file '{}'", path.display()))?,
            OpenMode::Open => OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .wrap_err_with(|| format!("failed to open store file '{}'", path.display()))?,
            OpenMode::ReadOnly => OpenOptions::new()
                .read(true)
                .open(path)
                .wrap_err_with(|| format!("failed to open store file '{}'", path.display()))?,
        };

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        ensure!(
            file_size % PAGE_SIZE as u64 == 0,
            "store file '{}' size {} is not a multiple of page size {}",
            path.display(),
            file_size,
            PAGE_SIZE
        );

        let page_count = (file_size / PAGE_SIZE as u64) as usize;
        let read_only = mode == OpenMode::ReadOnly;
        let mapping = Self::map(&file, page_count, read_only)?;

        Ok(Self {
            inner: parking_lot::RwLock::new(MmapInner {
                file,
                mapping,
                page_count,
            }),
            read_only,
            locks: LockProtocol::new(),
        })
    }

    fn map(file: &File, page_count: usize, read_only: bool) -> Result<Mapping> {
        if page_count == 0 {
            return Ok(Mapping::None);
        }

        // SAFETY: mapping a file is unsafe because external processes could
        // modify it underneath us. The store file is owned exclusively by
        // this process for the lifetime of the handle, every access is
        // bounds-checked against page_count, and the mapping is replaced
        // before the file length ever changes.
        if read_only {
            let mmap = unsafe { Mmap::map(file).wrap_err("failed to memory-map store file")? };
            Ok(Mapping::ReadOnly(mmap))
        } else {
            let mmap =
                unsafe { MmapMut::map_mut(file).wrap_err("failed to memory-map store file")? };
            Ok(Mapping::ReadWrite(mmap))
        }
    }

    fn resize(&self, inner: &mut MmapInner, new_page_count: usize) -> Result<()> {
        if let Mapping::ReadWrite(m) = &inner.mapping {
            m.flush().wrap_err("failed to flush mapping before resize")?;
        }
        inner.mapping = Mapping::None;

        let new_size = new_page_count as u64 * PAGE_SIZE as u64;
        inner
            .file
            .set_len(new_size)
            .wrap_err_with(|| format!("failed to resize store file to {} bytes", new_size))?;

        inner.mapping = Self::map(&inner.file, new_page_count, false)?;
        inner.page_count = new_page_count;
        Ok(())
    }
}

impl RawFile for MmapFile {
    fn new_interval(&self, max_pages: usize) -> Result<Interval> {
        ensure!(!self.read_only, "store is opened read-only");

        let mut inner = self.inner.write();
        let begin = inner.page_count as PageIndex;
        let new_count = inner.page_count + max_pages;
        self.resize(&mut inner, new_count)?;
        Ok(Interval::new(begin, begin + max_pages as PageIndex))
    }

    fn write_page(&self, id: PageIndex, offset: usize, bytes: &[u8]) -> Result<()> {
        ensure!(!self.read_only, "store is opened read-only");

        let mut inner = self.inner.write();
        ensure!(
            (id as usize) < inner.page_count,
            "page {} out of bounds (page_count={})",
            id,
            inner.page_count
        );
        ensure!(
            offset + bytes.len() <= PAGE_SIZE,
            "write of {} bytes at offset {} exceeds page size",
            bytes.len(),
            offset
        );

        let start = id as usize * PAGE_SIZE + offset;
        match &mut inner.mapping {
            Mapping::ReadWrite(m) => {
                m[start..start + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            _ => bail!("store has no writable mapping"),
        }
    }

    fn read_page(&self, id: PageIndex, offset: usize, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.read();
        ensure!(
            (id as usize) < inner.page_count,
            "page {} out of bounds (page_count={})",
            id,
            inner.page_count
        );
        ensure!(
            offset + buf.len() <= PAGE_SIZE,
            "read of {} bytes at offset {} exceeds page size",
            buf.len(),
            offset
        );

        let start = id as usize * PAGE_SIZE + offset;
        buf.copy_from_slice(&inner.mapping.bytes()[start..start + buf.len()]);
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.inner.read().page_count
    }

    fn flush(&self) -> Result<()> {
        let inner = self.inner.read();
        match &inner.mapping {
            Mapping::ReadWrite(m) => m.flush().wrap_err("failed to sync mapping to disk"),
            _ => Ok(()),
        }
    }

    fn truncate(&self, pages: usize) -> Result<()> {
        ensure!(!self.read_only, "store is opened read-only");

        let mut inner = self.inner.write();
        ensure!(
            pages <= inner.page_count,
            "cannot truncate to {} pages, file has {}",
            pages,
            inner.page_count
        );
        self.resize(&mut inner, pages)
    }

    fn lock_protocol(&self) -> &Arc<LockProtocol> {
        &self.locks
    }
}
