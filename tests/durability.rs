//! Scenario 6: writes survive a close + reopen against a real file.

use sbtree::{FileStorage, SbTree, SbTreeConfig};

fn config() -> SbTreeConfig {
    SbTreeConfig {
        page_size: 256,
        key_size: 4,
        data_size: 8,
        pool_frames: 12,
    }
}

#[test]
fn reopen_after_close_preserves_flushed_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("durable.sbt");

    {
        let storage = FileStorage::open(&path).unwrap();
        let mut tree: SbTree<u32, 8, _> = SbTree::open_or_create(storage, config()).unwrap();
        for k in 0..300u32 {
            tree.put(k, &(k as u64).to_le_bytes()).unwrap();
        }
        tree.flush().unwrap();
        tree.close().unwrap();
    }

    let storage = FileStorage::open(&path).unwrap();
    let mut tree: SbTree<u32, 8, _> = SbTree::open_or_create(storage, config()).unwrap();

    let mut out = [0u8; 8];
    for k in 0..300u32 {
        tree.get(k, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), k as u64);
    }

    let all: Vec<u32> = tree.iter(None, None).map(|r| r.unwrap().0).collect();
    assert_eq!(all, (0..300).collect::<Vec<_>>());

    tree.put(300, &300u64.to_le_bytes()).unwrap();
    tree.get(300, &mut out).unwrap();
    assert_eq!(u64::from_le_bytes(out), 300);

    let all: Vec<u32> = tree.iter(None, None).map(|r| r.unwrap().0).collect();
    assert_eq!(all, (0..301).collect::<Vec<_>>());
}
