//! End-to-end scenarios: small trees, leaf rolls, multi-level growth,
//! range scans, repeated flush, and a larger sequential load run at
//! reduced scale by default (full scale gated behind `--ignored`).

use sbtree::{MemoryStorage, SbTree, SbTreeConfig};

fn small_config() -> SbTreeConfig {
    SbTreeConfig {
        page_size: 128,
        key_size: 4,
        data_size: 8,
        pool_frames: 10,
    }
}

#[test]
fn scenario_single_leaf_never_rolls() {
    let mut tree: SbTree<u32, 8, _> =
        SbTree::open(MemoryStorage::new(), small_config()).unwrap();
    for k in 0..5u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
    }
    for k in 0..5u32 {
        let mut out = [0u8; 8];
        tree.get(k, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), k as u64);
    }
}

#[test]
fn scenario_many_leaf_rolls_single_interior_level() {
    let mut tree: SbTree<u32, 8, _> =
        SbTree::open(MemoryStorage::new(), small_config()).unwrap();
    for k in 0..60u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
    }
    for k in 0..60u32 {
        let mut out = [0u8; 8];
        tree.get(k, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), k as u64);
    }
}

#[test]
fn scenario_root_growth_across_multiple_levels() {
    let mut tree: SbTree<u32, 8, _> =
        SbTree::open(MemoryStorage::new(), small_config()).unwrap();
    for k in 0..3000u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
    }
    for k in (0..3000u32).step_by(97) {
        let mut out = [0u8; 8];
        tree.get(k, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), k as u64);
    }
}

#[test]
fn scenario_bounded_range_scan() {
    let mut tree: SbTree<u32, 8, _> =
        SbTree::open(MemoryStorage::new(), small_config()).unwrap();
    for k in 0..400u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
    }
    let collected: Vec<u32> = tree
        .iter(Some(100), Some(110))
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(collected, (100..=110).collect::<Vec<_>>());
}

#[test]
fn scenario_unbounded_scan_covers_everything_in_order() {
    let mut tree: SbTree<u32, 8, _> =
        SbTree::open(MemoryStorage::new(), small_config()).unwrap();
    for k in 0..250u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
    }
    let collected: Vec<u32> = tree.iter(None, None).map(|r| r.unwrap().0).collect();
    assert_eq!(collected, (0..250).collect::<Vec<_>>());
}

#[test]
fn scenario_repeated_flush_is_safe() {
    let mut tree: SbTree<u32, 8, _> =
        SbTree::open(MemoryStorage::new(), small_config()).unwrap();
    for k in 0..30u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
        tree.flush().unwrap();
    }
    tree.flush().unwrap();
    tree.flush().unwrap();
    let mut out = [0u8; 8];
    tree.get(29, &mut out).unwrap();
    assert_eq!(u64::from_le_bytes(out), 29);
}

#[test]
#[ignore]
fn scenario_large_sequential_load() {
    let config = SbTreeConfig {
        page_size: 4096,
        key_size: 4,
        data_size: 8,
        pool_frames: 16,
    };
    let mut tree: SbTree<u32, 8, _> = SbTree::open(MemoryStorage::new(), config).unwrap();
    for k in 0..1_000_000u32 {
        tree.put(k, &(k as u64).to_le_bytes()).unwrap();
    }
    for k in (0..1_000_000u32).step_by(9973) {
        let mut out = [0u8; 8];
        tree.get(k, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), k as u64);
    }
}
