//! Bit-exact page layout shared by leaf and interior nodes.
//!
//! ```text
//! Offset  Size                      Field
//! 0       4                         page id (u32, little-endian)
//! 4       2                         count+flags (u16, little-endian)
//! 6       max_leaf * record_size    leaf: records, sorted by key
//! 6       max_int * key_size        interior: separator keys, sorted
//! 6 + max_int*key_size  (max_int+1)*4   interior: child page ids
//! ```
//!
//! The count+flags field packs three things into one u16: a count modulo
//! 10 000, and two bias thresholds (`>= 10_000` interior, `>= 20_000` root).
//! A root is always encoded with the root bias (`>= 20_000`), which in turn
//! always also satisfies the interior threshold — so a root is never
//! encoded as a bare leaf. [`Header`] hides this arithmetic behind typed
//! accessors; nothing outside this module masks the raw field directly.

use crate::error::Error;
use crate::record::Key;
use std::cmp::Ordering;

pub const HEADER_SIZE: usize = 6;
const INTERIOR_BIAS: u16 = 10_000;
const ROOT_BIAS: u16 = 20_000;
const MAX_RAW: u16 = 30_000;

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub page_id: u32,
    pub count: u16,
    pub is_interior: bool,
    pub is_root: bool,
}

impl Header {
    pub fn leaf(page_id: u32, count: u16) -> Self {
        Self {
            page_id,
            count,
            is_interior: false,
            is_root: false,
        }
    }

    pub fn interior(page_id: u32, count: u16, is_root: bool) -> Self {
        Self {
            page_id,
            count,
            is_interior: true,
            is_root,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let page_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let raw = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if raw >= MAX_RAW {
            return Err(Error::CorruptPage {
                page_id,
                reason: format!("count+flags {raw} out of range"),
            });
        }
        let is_root = raw >= ROOT_BIAS;
        let is_interior = is_root || raw >= INTERIOR_BIAS;
        let count = raw % INTERIOR_BIAS;
        Ok(Self {
            page_id,
            count,
            is_interior,
            is_root,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        let raw = if self.is_root {
            self.count + ROOT_BIAS
        } else if self.is_interior {
            self.count + INTERIOR_BIAS
        } else {
            self.count
        };
        buf[4..6].copy_from_slice(&raw.to_le_bytes());
    }
}

/// Derived sizing for a given `(page_size, key_size, data_size)` triple.
/// Computed once at `open` and shared by every page in the tree.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub page_size: u16,
    pub key_size: u8,
    pub data_size: u8,
    pub record_size: u16,
    pub max_leaf: u16,
    pub max_int: u16,
}

impl Geometry {
    pub fn new(page_size: u16, key_size: u8, data_size: u8) -> Result<Self, Error> {
        let record_size = key_size as u16 + data_size as u16;
        let available = page_size
            .checked_sub(HEADER_SIZE as u16)
            .ok_or_else(|| Error::Config("page_size smaller than header".into()))?;
        let max_leaf = available / record_size;
        if max_leaf < 1 {
            return Err(Error::Config(
                "page_size too small to hold a single leaf record".into(),
            ));
        }

        let available_int = available
            .checked_sub(4)
            .ok_or_else(|| Error::Config("page_size too small for an interior node".into()))?;
        let max_int = available_int / (key_size as u16 + 4);
        if max_int < 1 {
            return Err(Error::Config(
                "page_size too small to hold a single interior separator".into(),
            ));
        }

        Ok(Self {
            page_size,
            key_size,
            data_size,
            record_size,
            max_leaf,
            max_int,
        })
    }

    fn leaf_offset(&self, i: u16) -> usize {
        HEADER_SIZE + i as usize * self.record_size as usize
    }

    fn interior_key_offset(&self, i: u16) -> usize {
        HEADER_SIZE + i as usize * self.key_size as usize
    }

    fn interior_children_offset(&self) -> usize {
        HEADER_SIZE + self.max_int as usize * self.key_size as usize
    }

    fn interior_child_offset(&self, i: u16) -> usize {
        self.interior_children_offset() + i as usize * 4
    }
}

pub fn zero_page(buf: &mut [u8]) {
    buf.iter_mut().for_each(|b| *b = 0);
}

// ---------------------------------------------------------------- leaf ----

pub fn leaf_get<K: Key, const N: usize>(buf: &[u8], geom: &Geometry, i: u16) -> (K, [u8; N]) {
    let off = geom.leaf_offset(i);
    let key = K::decode(&buf[off..off + K::ENCODED_SIZE]);
    let mut value = [0u8; N];
    value.copy_from_slice(&buf[off + K::ENCODED_SIZE..off + K::ENCODED_SIZE + N]);
    (key, value)
}

pub fn leaf_set<K: Key, const N: usize>(
    buf: &mut [u8],
    geom: &Geometry,
    i: u16,
    key: &K,
    value: &[u8; N],
) {
    let off = geom.leaf_offset(i);
    key.encode(&mut buf[off..off + K::ENCODED_SIZE]);
    buf[off + K::ENCODED_SIZE..off + K::ENCODED_SIZE + N].copy_from_slice(value);
}

/// Exact match search over `count` sorted leaf records.
pub fn leaf_find<K: Key, const N: usize>(
    buf: &[u8],
    geom: &Geometry,
    count: u16,
    key: &K,
) -> Option<u16> {
    let mut lo = 0i32;
    let mut hi = count as i32 - 1;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let (k, _) = leaf_get::<K, N>(buf, geom, mid as u16);
        match k.cmp(key) {
            Ordering::Equal => return Some(mid as u16),
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid - 1,
        }
    }
    None
}

/// First index whose key is `>= key` (or `count` if none). Used by the
/// iterator to lean into a leaf at an inclusive lower bound.
pub fn leaf_lower_bound<K: Key, const N: usize>(
    buf: &[u8],
    geom: &Geometry,
    count: u16,
    key: &K,
) -> u16 {
    let mut lo = 0u16;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (k, _) = leaf_get::<K, N>(buf, geom, mid);
        if k.cmp(key) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

// ------------------------------------------------------------ interior ----

pub fn interior_get_key<K: Key>(buf: &[u8], geom: &Geometry, i: u16) -> K {
    let off = geom.interior_key_offset(i);
    K::decode(&buf[off..off + geom.key_size as usize])
}

pub fn interior_set_key<K: Key>(buf: &mut [u8], geom: &Geometry, i: u16, key: &K) {
    let off = geom.interior_key_offset(i);
    key.encode(&mut buf[off..off + geom.key_size as usize]);
}

pub fn interior_get_child(buf: &[u8], geom: &Geometry, i: u16) -> u32 {
    let off = geom.interior_child_offset(i);
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

pub fn interior_set_child(buf: &mut [u8], geom: &Geometry, i: u16, child: u32) {
    let off = geom.interior_child_offset(i);
    buf[off..off + 4].copy_from_slice(&child.to_le_bytes());
}

/// Separator keys hold the maximum key of the correspondingly-indexed
/// sealed child; the final (unkeyed) child is the still-open tail. This
/// returns the first index `i` with `keys[i] >= key`, i.e. the child whose
/// sealed range covers `key`, or `count` (the open tail) if none does.
pub fn interior_descend_index<K: Key>(buf: &[u8], geom: &Geometry, count: u16, key: &K) -> u16 {
    let mut lo = 0u16;
    let mut hi = count;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let k = interior_get_key::<K>(buf, geom, mid);
        if k.cmp(key) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
