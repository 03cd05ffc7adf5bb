use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::trace;

use crate::error::Error;

/// Abstraction over the page-addressed block device the tree is built on.
/// Pages are addressed by a flat `u32` id; `read_page`/`write_page` always
/// move exactly `size` bytes.
pub trait StorageAdapter {
    fn read_page(&mut self, id: u32, size: u16, dst: &mut [u8]) -> Result<(), Error>;
    fn write_page(&mut self, id: u32, size: u16, src: &[u8]) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;
}

/// `Vec<u8>`-backed storage, grown in `page_size` increments on first write
/// to a page past the current end. Used by every unit test and the
/// property tests, where file I/O would only add noise.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pages: Vec<u8>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    fn ensure_capacity(&mut self, id: u32, size: u16) {
        let end = (id as usize + 1) * size as usize;
        if self.pages.len() < end {
            self.pages.resize(end, 0);
        }
    }
}

impl StorageAdapter for MemoryStorage {
    fn read_page(&mut self, id: u32, size: u16, dst: &mut [u8]) -> Result<(), Error> {
        let start = id as usize * size as usize;
        let end = start + size as usize;
        trace!("memory storage read page {id}");
        if self.pages.len() < end {
            dst.iter_mut().for_each(|b| *b = 0);
            return Ok(());
        }
        dst.copy_from_slice(&self.pages[start..end]);
        Ok(())
    }

    fn write_page(&mut self, id: u32, size: u16, src: &[u8]) -> Result<(), Error> {
        trace!("memory storage write page {id}");
        self.ensure_capacity(id, size);
        let start = id as usize * size as usize;
        let end = start + size as usize;
        self.pages[start..end].copy_from_slice(src);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Single-file storage. Pages are written at `id * page_size` offsets;
/// reading a page past the current file length yields a zeroed page
/// rather than an error, matching the never-been-written semantics of
/// `MemoryStorage`.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(Error::StorageRead)?;
        Ok(Self { file })
    }
}

impl StorageAdapter for FileStorage {
    fn read_page(&mut self, id: u32, size: u16, dst: &mut [u8]) -> Result<(), Error> {
        let offset = id as u64 * size as u64;
        trace!("file storage read page {id} at offset {offset}");
        let len = self.file.metadata().map_err(Error::StorageRead)?.len();
        if offset >= len {
            dst.iter_mut().for_each(|b| *b = 0);
            return Ok(());
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(Error::StorageRead)?;
        match self.file.read_exact(dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                dst.iter_mut().for_each(|b| *b = 0);
                Ok(())
            }
            Err(e) => Err(Error::StorageRead(e)),
        }
    }

    fn write_page(&mut self, id: u32, size: u16, src: &[u8]) -> Result<(), Error> {
        let offset = id as u64 * size as u64;
        trace!("file storage write page {id} at offset {offset}");
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(Error::StorageWrite)?;
        self.file.write_all(src).map_err(Error::StorageWrite)
    }

    fn close(&mut self) -> Result<(), Error> {
        self.file.sync_all().map_err(Error::StorageWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trips() {
        let mut s = MemoryStorage::new();
        let page = vec![7u8; 64];
        s.write_page(3, 64, &page).unwrap();
        let mut out = vec![0u8; 64];
        s.read_page(3, 64, &mut out).unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn memory_storage_unwritten_page_is_zeroed() {
        let mut s = MemoryStorage::new();
        let mut out = vec![9u8; 32];
        s.read_page(5, 32, &mut out).unwrap();
        assert_eq!(out, vec![0u8; 32]);
    }

    #[test]
    fn file_storage_round_trips_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");

        {
            let mut s = FileStorage::open(&path).unwrap();
            let page = vec![5u8; 128];
            s.write_page(2, 128, &page).unwrap();
            s.close().unwrap();
        }

        let mut s = FileStorage::open(&path).unwrap();
        let mut out = vec![0u8; 128];
        s.read_page(2, 128, &mut out).unwrap();
        assert_eq!(out, vec![5u8; 128]);
    }
}
