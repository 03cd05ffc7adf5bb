//! Sequential, copy-on-write B-tree index for fixed-size key/value
//! records over page-oriented storage. Single writer, append-only,
//! bounded memory: a small fixed pool of page-sized buffers is the only
//! allocation the core makes after `open`.

mod buffer_pool;
mod error;
mod iter;
mod page;
mod record;
mod storage;
mod tree;

pub use error::Error;
pub use iter::SbTreeIter;
pub use page::Geometry;
pub use record::Key;
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};

use serde::{Deserialize, Serialize};
use tree::Engine;

/// Construction parameters for a [`SbTree`]. `page_size`/`key_size`/
/// `data_size` fix the on-disk layout for the life of the tree;
/// `pool_frames` is purely a runtime memory/performance knob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SbTreeConfig {
    pub page_size: u16,
    pub key_size: u8,
    pub data_size: u8,
    pub pool_frames: usize,
}

impl SbTreeConfig {
    pub fn validate(&self) -> Result<Geometry, Error> {
        if self.pool_frames < 2 {
            return Err(Error::Config("pool_frames must be at least 2".into()));
        }
        Geometry::new(self.page_size, self.key_size, self.data_size)
    }
}

/// A sequential copy-on-write B-tree over `K`-keyed, `N`-byte-valued
/// records, backed by storage adapter `S`.
pub struct SbTree<K: Key, const N: usize, S: StorageAdapter> {
    engine: Engine<K, N, S>,
}

impl<K: Key, const N: usize, S: StorageAdapter> SbTree<K, N, S> {
    fn checked_geometry(config: &SbTreeConfig) -> Result<Geometry, Error> {
        let geom = config.validate()?;
        if geom.key_size as usize != K::ENCODED_SIZE {
            return Err(Error::Config(format!(
                "config key_size {} does not match Key::ENCODED_SIZE {}",
                geom.key_size,
                K::ENCODED_SIZE
            )));
        }
        if geom.data_size as usize != N {
            return Err(Error::Config(format!(
                "config data_size {} does not match record value width {N}",
                geom.data_size
            )));
        }
        Ok(geom)
    }

    pub fn open(storage: S, config: SbTreeConfig) -> Result<Self, Error> {
        let geom = Self::checked_geometry(&config)?;
        let engine = Engine::open(storage, geom, config.pool_frames)?;
        Ok(Self { engine })
    }

    /// Reopens `storage` if it already holds a tree (detected via its
    /// superblock page), otherwise starts a fresh one. This is what lets a
    /// CLI invocation pick up data written by an earlier, separate process.
    pub fn open_or_create(storage: S, config: SbTreeConfig) -> Result<Self, Error> {
        let geom = Self::checked_geometry(&config)?;
        let engine = Engine::open_or_create(storage, geom, config.pool_frames)?;
        Ok(Self { engine })
    }

    /// Reopens a tree whose root page id is already known, rebuilding the
    /// active path by walking the tail-child chain down from it.
    pub fn open_existing(storage: S, config: SbTreeConfig, root_id: u32) -> Result<Self, Error> {
        let geom = Self::checked_geometry(&config)?;
        let engine = Engine::open_existing(storage, geom, config.pool_frames, root_id)?;
        Ok(Self { engine })
    }

    pub fn put(&mut self, key: K, value: &[u8; N]) -> Result<(), Error> {
        self.engine.put(key, value)
    }

    pub fn get(&mut self, key: K, out: &mut [u8; N]) -> Result<(), Error> {
        self.engine.get(key, out)
    }

    /// Persists every dirty buffer to storage. Safe to call repeatedly;
    /// a flush with nothing dirty is a no-op.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.engine.flush()
    }

    pub fn iter(&mut self, min: Option<K>, max: Option<K>) -> SbTreeIter<'_, K, N, S> {
        SbTreeIter::new(&mut self.engine, min, max)
    }

    /// Flushes and closes the underlying storage. Consuming, unlike
    /// `flush`, since nothing can be done with the tree afterward.
    pub fn close(self) -> Result<(), Error> {
        self.engine.close()
    }
}
