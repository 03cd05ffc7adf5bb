use log::trace;

use crate::error::Error;
use crate::page::{self, Geometry};
use crate::storage::StorageAdapter;

struct Frame {
    page_id: Option<u32>,
    dirty: bool,
    buf: Box<[u8]>,
}

/// Fixed pool of `page_size` buffers fronting a [`StorageAdapter`]. No page
/// is ever pinned resident: every access goes through [`load`](Self::load)
/// or [`claim_new`](Self::claim_new), either of which may evict an
/// unrelated frame to make room. A dirty frame is always written back
/// before its slot is reused, so a page's on-storage copy is never behind
/// whatever was last written to it — callers re-fetch a page id with
/// `load`/`claim_new` after any intervening pool operation rather than
/// holding a frame index across one. This keeps live frame count exactly
/// `frame_count`, independent of how many distinct pages (or how deep a
/// tree) get touched.
pub struct BufferPool<S: StorageAdapter> {
    storage: S,
    geom: Geometry,
    frames: Vec<Frame>,
}

impl<S: StorageAdapter> BufferPool<S> {
    pub fn new(storage: S, geom: Geometry, frame_count: usize) -> Self {
        let frames = (0..frame_count)
            .map(|_| Frame {
                page_id: None,
                dirty: false,
                buf: vec![0u8; geom.page_size as usize].into_boxed_slice(),
            })
            .collect();
        Self {
            storage,
            geom,
            frames,
        }
    }

    /// Returns the frame index holding `page_id`, loading it from storage
    /// into an evicted victim frame if it isn't already resident. The
    /// returned index is only valid until the next `load`/`claim_new` call.
    pub fn load(&mut self, page_id: u32) -> Result<usize, Error> {
        if let Some(idx) = self.frames.iter().position(|f| f.page_id == Some(page_id)) {
            return Ok(idx);
        }
        let victim = self.select_victim();
        self.writeback(victim)?;
        let page_size = self.geom.page_size;
        let frame = &mut self.frames[victim];
        self.storage.read_page(page_id, page_size, &mut frame.buf)?;
        frame.page_id = Some(page_id);
        frame.dirty = false;
        trace!("buffer pool loaded page {page_id} into frame {victim}");
        Ok(victim)
    }

    /// Claims a frame for a page that does not exist on storage yet.
    pub fn claim_new(&mut self, page_id: u32) -> Result<usize, Error> {
        let victim = self.select_victim();
        self.writeback(victim)?;
        let frame = &mut self.frames[victim];
        page::zero_page(&mut frame.buf);
        frame.page_id = Some(page_id);
        frame.dirty = true;
        trace!("buffer pool claimed frame {victim} for new page {page_id}");
        Ok(victim)
    }

    pub fn buf(&self, idx: usize) -> &[u8] {
        &self.frames[idx].buf
    }

    pub fn buf_mut(&mut self, idx: usize) -> &mut [u8] {
        self.frames[idx].dirty = true;
        &mut self.frames[idx].buf
    }

    /// Writes a frame back to storage if dirty. Public so the tree engine
    /// can persist a page the instant it's done with it, ahead of eviction.
    pub fn writeback(&mut self, idx: usize) -> Result<(), Error> {
        let page_size = self.geom.page_size;
        let frame = &mut self.frames[idx];
        if frame.dirty {
            if let Some(page_id) = frame.page_id {
                trace!("buffer pool writing back frame {idx} (page {page_id})");
                self.storage.write_page(page_id, page_size, &frame.buf)?;
            }
            frame.dirty = false;
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<(), Error> {
        for idx in 0..self.frames.len() {
            self.writeback(idx)?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<(), Error> {
        self.flush_all()?;
        self.storage.close()
    }

    /// Prefers an unoccupied frame, then a clean occupied one (no writeback
    /// needed), else falls back to frame 0. Always succeeds: with nothing
    /// pinned, every frame is evictable.
    fn select_victim(&self) -> usize {
        if let Some(idx) = self.frames.iter().position(|f| f.page_id.is_none()) {
            return idx;
        }
        if let Some(idx) = self.frames.iter().position(|f| !f.dirty) {
            return idx;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn geom() -> Geometry {
        Geometry::new(64, 4, 4).unwrap()
    }

    #[test]
    fn claim_then_load_round_trips() {
        let mut pool = BufferPool::new(MemoryStorage::new(), geom(), 4);
        let idx = pool.claim_new(1).unwrap();
        pool.buf_mut(idx)[0] = 42;
        pool.writeback(idx).unwrap();
        let idx2 = pool.load(1).unwrap();
        assert_eq!(pool.buf(idx2)[0], 42);
    }

    #[test]
    fn eviction_writes_back_dirty_frame_before_reuse() {
        // Only 2 frames for 3 distinct pages: claiming the third must evict
        // one of the first two, and that eviction must not lose its write.
        let mut pool = BufferPool::new(MemoryStorage::new(), geom(), 2);
        let a = pool.claim_new(1).unwrap();
        pool.buf_mut(a)[0] = 11;
        let b = pool.claim_new(2).unwrap();
        pool.buf_mut(b)[0] = 22;

        let c = pool.claim_new(3).unwrap();
        pool.buf_mut(c)[0] = 33;

        let reload_a = pool.load(1).unwrap();
        assert_eq!(pool.buf(reload_a)[0], 11);
        let reload_b = pool.load(2).unwrap();
        assert_eq!(pool.buf(reload_b)[0], 22);
        let reload_c = pool.load(3).unwrap();
        assert_eq!(pool.buf(reload_c)[0], 33);
    }
}
