//! Bounded, ordered cursor over a tree. Walks a path stack from root to
//! leaf; when a leaf is exhausted, pops ancestors until one has an
//! unvisited child, then leans left back down to the next leaf.

use crate::error::Error;
use crate::page;
use crate::record::Key;
use crate::storage::StorageAdapter;
use crate::tree::Engine;

pub struct SbTreeIter<'a, K: Key, const N: usize, S: StorageAdapter> {
    engine: &'a mut Engine<K, N, S>,
    min_key: Option<K>,
    max_key: Option<K>,
    stack: Vec<(u32, u16)>,
    leaf_id: Option<u32>,
    leaf_idx: u16,
    leaf_count: u16,
    started: bool,
    finished: bool,
}

impl<'a, K: Key, const N: usize, S: StorageAdapter> SbTreeIter<'a, K, N, S> {
    pub(crate) fn new(engine: &'a mut Engine<K, N, S>, min_key: Option<K>, max_key: Option<K>) -> Self {
        Self {
            engine,
            min_key,
            max_key,
            stack: Vec::new(),
            leaf_id: None,
            leaf_idx: 0,
            leaf_count: 0,
            started: false,
            finished: false,
        }
    }

    fn start(&mut self) -> Result<(), Error> {
        let levels = self.engine.active_path.len();
        let mut node_id = self.engine.active_path[0];
        for depth in 0..levels {
            let frame = self.engine.pool.load(node_id)?;
            let hdr = page::Header::decode(self.engine.pool.buf(frame))?;
            let idx = match &self.min_key {
                Some(k) => page::interior_descend_index::<K>(
                    self.engine.pool.buf(frame),
                    &self.engine.geom,
                    hdr.count,
                    k,
                ),
                None => 0,
            };
            let child_id = page::interior_get_child(self.engine.pool.buf(frame), &self.engine.geom, idx);
            self.stack.push((node_id, idx));
            if depth + 1 == levels {
                self.leaf_id = Some(child_id);
            } else {
                node_id = child_id;
            }
        }
        self.load_leaf_cursor(self.leaf_id.expect("at least one level"))
    }

    fn load_leaf_cursor(&mut self, leaf_id: u32) -> Result<(), Error> {
        let frame = self.engine.pool.load(leaf_id)?;
        let hdr = page::Header::decode(self.engine.pool.buf(frame))?;
        self.leaf_count = hdr.count;
        self.leaf_idx = match &self.min_key {
            Some(k) => page::leaf_lower_bound::<K, N>(
                self.engine.pool.buf(frame),
                &self.engine.geom,
                hdr.count,
                k,
            ),
            None => 0,
        };
        self.leaf_id = Some(leaf_id);
        Ok(())
    }

    /// Pops exhausted ancestors until one has an unvisited child, then
    /// leans left back down to that child's leftmost leaf. Returns `false`
    /// once the stack empties (iteration exhausted past the open leaf).
    fn advance_leaf(&mut self) -> Result<bool, Error> {
        loop {
            let (node_id, idx) = match self.stack.pop() {
                Some(x) => x,
                None => return Ok(false),
            };
            let frame = self.engine.pool.load(node_id)?;
            let hdr = page::Header::decode(self.engine.pool.buf(frame))?;
            let next_idx = idx + 1;
            if next_idx > hdr.count {
                continue;
            }
            self.stack.push((node_id, next_idx));

            let levels = self.engine.active_path.len();
            let mut child_id =
                page::interior_get_child(self.engine.pool.buf(frame), &self.engine.geom, next_idx);
            let depth_here = self.stack.len();
            for _ in depth_here..levels {
                let cframe = self.engine.pool.load(child_id)?;
                self.stack.push((child_id, 0));
                child_id = page::interior_get_child(self.engine.pool.buf(cframe), &self.engine.geom, 0);
            }
            self.load_leaf_cursor(child_id)?;
            return Ok(true);
        }
    }
}

impl<'a, K: Key, const N: usize, S: StorageAdapter> Iterator for SbTreeIter<'a, K, N, S> {
    type Item = Result<(K, [u8; N]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.start() {
                self.finished = true;
                return Some(Err(e));
            }
        }
        loop {
            let leaf_id = match self.leaf_id {
                Some(id) => id,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            if self.leaf_idx >= self.leaf_count {
                match self.advance_leaf() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.finished = true;
                        return None;
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
            let frame = match self.engine.pool.load(leaf_id) {
                Ok(f) => f,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            let (k, v) =
                page::leaf_get::<K, N>(self.engine.pool.buf(frame), &self.engine.geom, self.leaf_idx);
            self.leaf_idx += 1;
            if let Some(max) = self.max_key {
                if k > max {
                    self.finished = true;
                    return None;
                }
            }
            return Some(Ok((k, v)));
        }
    }
}
