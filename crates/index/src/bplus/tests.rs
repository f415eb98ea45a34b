use std::collections::BTreeMap;

use comb_primitives::{
    ChunkAddress, ChunkStore, ChunkStoreExt, MemoryChunkStore, StatsStore, StoreError,
};
use proptest::prelude::*;

use super::*;
use crate::IndexCursor;

fn value(n: i64) -> ChunkAddress {
    ChunkAddress::sha256_of(&[&n.to_be_bytes()])
}

fn key(n: i64) -> IndexKey {
    IndexKey::from_i64(n)
}

fn int_tree() -> BPlusTree<MemoryChunkStore> {
    BPlusTree::new(MemoryChunkStore::new(), KeyType::Integer)
}

fn forward<S: ChunkStore>(tree: &mut BPlusTree<S>) -> Vec<i64> {
    let mut cursor = tree.seek_first().unwrap();
    let mut keys = Vec::new();
    while let Some((key, _)) = cursor.next().unwrap() {
        keys.push(key.as_i64());
    }
    keys
}

fn backward<S: ChunkStore>(tree: &mut BPlusTree<S>) -> Vec<i64> {
    let mut cursor = tree.seek_last().unwrap();
    let mut keys = Vec::new();
    while let Some((key, _)) = cursor.prev().unwrap() {
        keys.push(key.as_i64());
    }
    keys
}

#[test]
fn test_seek_traversal_after_shuffled_inserts() {
    let mut tree = int_tree();
    for k in [5, 3, 8, 1, 4, 7, 2, 6] {
        assert_eq!(tree.put(&key(k), value(k)).unwrap(), PutOutcome::Inserted);
    }

    let (mut cursor, found) = tree.seek(&key(1)).unwrap();
    assert!(found);
    let mut keys = Vec::new();
    while let Some((key, hash)) = cursor.next().unwrap() {
        assert_eq!(hash, value(key.as_i64()));
        keys.push(key.as_i64());
    }
    assert_eq!(keys, [1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(tree.check_invariants().unwrap().depth, 2);
}

#[test]
fn test_put_existing_key_updates() {
    let mut tree = BPlusTree::new(MemoryChunkStore::new(), KeyType::String);
    let key = IndexKey::try_from("42").unwrap();
    let first = ChunkAddress::sha256_of(&[b"314"]);
    let second = ChunkAddress::sha256_of(&[b"278"]);

    tree.put(&key, first).unwrap();
    assert_eq!(tree.get(&key).unwrap(), Some(first));

    assert_eq!(tree.put(&key, second).unwrap(), PutOutcome::Updated);
    assert_eq!(tree.get(&key).unwrap(), Some(second));
    assert_eq!(tree.check_invariants().unwrap().entries, 1);
}

#[test]
fn test_insert_rejects_duplicate() {
    let mut tree = int_tree();
    tree.insert(&key(7), value(7)).unwrap();
    assert!(matches!(
        tree.insert(&key(7), value(8)),
        Err(IndexError::DuplicateKey)
    ));
    assert_eq!(tree.get(&key(7)).unwrap(), Some(value(7)));
}

#[test]
fn test_delete_missing_key() {
    let mut tree = int_tree();
    assert!(!tree.delete(&key(1)).unwrap());
    tree.put(&key(1), value(1)).unwrap();
    assert!(!tree.delete(&key(2)).unwrap());
    assert!(tree.delete(&key(1)).unwrap());
    assert_eq!(tree.get(&key(1)).unwrap(), None);
    assert!(tree.root_hash().is_zero());
}

#[test]
fn test_reverse_traversal() {
    let mut tree = int_tree();
    for k in (0..100).rev() {
        tree.put(&key(k), value(k)).unwrap();
    }
    let expected: Vec<i64> = (0..100).rev().collect();
    assert_eq!(backward(&mut tree), expected);
}

#[test]
fn test_seek_between_keys() {
    let mut tree = int_tree();
    for k in (0..40).step_by(2) {
        tree.put(&key(k), value(k)).unwrap();
    }

    let (mut cursor, found) = tree.seek(&key(15)).unwrap();
    assert!(!found);
    assert_eq!(cursor.next().unwrap().map(|(k, _)| k.as_i64()), Some(16));

    // backward from a missed key starts at its predecessor
    let (mut cursor, _) = tree.seek(&key(15)).unwrap();
    assert_eq!(cursor.prev().unwrap().map(|(k, _)| k.as_i64()), Some(14));
    assert_eq!(cursor.prev().unwrap().map(|(k, _)| k.as_i64()), Some(12));

    // backward from an exact hit starts at the key itself
    let (mut cursor, found) = tree.seek(&key(20)).unwrap();
    assert!(found);
    assert_eq!(cursor.prev().unwrap().map(|(k, _)| k.as_i64()), Some(20));
}

#[test]
fn test_seek_outside_range() {
    let mut tree = int_tree();
    for k in 10..20 {
        tree.put(&key(k), value(k)).unwrap();
    }

    let (mut cursor, _) = tree.seek(&key(100)).unwrap();
    assert_eq!(cursor.next().unwrap(), None);

    let (mut cursor, _) = tree.seek(&key(100)).unwrap();
    assert_eq!(cursor.prev().unwrap().map(|(k, _)| k.as_i64()), Some(19));

    let (mut cursor, _) = tree.seek(&key(-5)).unwrap();
    assert_eq!(cursor.prev().unwrap(), None);
    assert!(cursor.is_exhausted());
}

#[test]
fn test_cursor_end_is_sticky() {
    let mut tree = int_tree();
    tree.put(&key(1), value(1)).unwrap();

    let mut cursor = tree.seek_first().unwrap();
    assert!(cursor.next().unwrap().is_some());
    assert_eq!(cursor.next().unwrap(), None);
    assert_eq!(cursor.next().unwrap(), None);
    assert_eq!(cursor.prev().unwrap(), None);

    let mut empty = int_tree();
    assert_eq!(empty.seek_first().unwrap().next().unwrap(), None);
    assert_eq!(empty.seek_last().unwrap().prev().unwrap(), None);
}

#[test]
fn test_reopen_loads_lazily() {
    let store = StatsStore::new(MemoryChunkStore::new());
    let mut tree = BPlusTree::new(store.clone(), KeyType::Integer);
    tree.start_buffer();
    for k in 0..500 {
        tree.put(&key(k), value(k)).unwrap();
    }
    let root = tree.flush_buffer().unwrap();
    let depth = tree.check_invariants().unwrap().depth;

    store.stats().reset();
    let mut reader = BPlusTree::open(store.clone(), KeyType::Integer, root);
    assert_eq!(reader.resident_nodes(), 0);
    assert_eq!(reader.get(&key(250)).unwrap(), Some(value(250)));
    assert_eq!(reader.resident_nodes(), depth);
    assert_eq!(store.stats().snapshot().chunk_reads, depth as u64);

    assert_eq!(forward(&mut reader), (0..500).collect::<Vec<_>>());
}

#[test]
fn test_unbuffered_writes_persist_each_mutation() {
    let store = MemoryChunkStore::new();
    let mut tree = BPlusTree::new(store.clone(), KeyType::Integer);
    tree.put(&key(1), value(1)).unwrap();
    let after_first = tree.root_hash();
    assert!(!after_first.is_zero());
    assert!(store.contains(&after_first));

    tree.put(&key(2), value(2)).unwrap();
    assert_ne!(tree.root_hash(), after_first);

    let mut reader = BPlusTree::open(store, KeyType::Integer, tree.root_hash());
    assert_eq!(forward(&mut reader), [1, 2]);
}

#[test]
fn test_buffered_writes_invisible_until_flush() {
    let store = MemoryChunkStore::new();
    let mut tree = BPlusTree::new(store.clone(), KeyType::Integer);
    tree.put(&key(0), value(0)).unwrap();
    let persisted = tree.root_hash();

    tree.start_buffer();
    tree.put(&key(1), value(1)).unwrap();
    tree.put(&key(2), value(2)).unwrap();
    assert_eq!(tree.root_hash(), persisted);

    let mut before = BPlusTree::open(store.clone(), KeyType::Integer, tree.root_hash());
    assert_eq!(before.get(&key(1)).unwrap(), None);

    let flushed = tree.flush_buffer().unwrap();
    assert!(!tree.is_buffered());
    let mut after = BPlusTree::open(store, KeyType::Integer, flushed);
    assert_eq!(forward(&mut after), [0, 1, 2]);
}

#[test]
fn test_flush_is_idempotent() {
    let store = StatsStore::new(MemoryChunkStore::new());
    let mut tree = BPlusTree::new(store.clone(), KeyType::Integer);
    tree.start_buffer();
    for k in 0..50 {
        tree.put(&key(k), value(k)).unwrap();
    }
    let first = tree.flush_buffer().unwrap();
    let writes = store.stats().snapshot().chunk_writes;

    let second = tree.flush_buffer().unwrap();
    assert_eq!(first, second);
    assert_eq!(store.stats().snapshot().chunk_writes, writes);
}

#[test]
fn test_discard_buffer_restores_last_flush() {
    let mut tree = int_tree();
    assert!(matches!(
        tree.discard_buffer(),
        Err(IndexError::BufferNotStarted)
    ));

    tree.put(&key(1), value(1)).unwrap();
    tree.start_buffer();
    tree.put(&key(2), value(2)).unwrap();
    tree.delete(&key(1)).unwrap();
    tree.discard_buffer().unwrap();

    assert_eq!(forward(&mut tree), [1]);
}

#[test]
fn test_delete_everything_then_reinsert() {
    let mut tree = int_tree();
    tree.start_buffer();
    for k in 0..200 {
        tree.put(&key(k), value(k)).unwrap();
    }
    for k in (0..200).filter(|k| k % 3 != 0) {
        assert!(tree.delete(&key(k)).unwrap());
        tree.check_invariants().unwrap();
    }
    for k in (0..200).filter(|k| k % 3 == 0) {
        assert!(tree.delete(&key(k)).unwrap());
    }
    assert!(tree.flush_buffer().unwrap().is_zero());
    assert_eq!(tree.get(&key(3)).unwrap(), None);

    tree.insert(&key(3), value(3)).unwrap();
    assert_eq!(tree.get(&key(3)).unwrap(), Some(value(3)));
}

#[test]
fn test_float_keys_order_numerically() {
    let mut tree = BPlusTree::new(MemoryChunkStore::new(), KeyType::Float);
    let keys = [3.25, -1.5, 0.0, 1e6, -200.0, 2.5, -0.75];
    for k in keys {
        tree.put(&IndexKey::from_f64(k), ChunkAddress::keccak(&k.to_be_bytes()))
            .unwrap();
    }

    let mut cursor = tree.seek_first().unwrap();
    let mut seen = Vec::new();
    while let Some((key, _)) = cursor.next().unwrap() {
        seen.push(key.as_f64());
    }
    let mut sorted = keys.to_vec();
    sorted.sort_by(f64::total_cmp);
    assert_eq!(seen, sorted);
}

#[test]
fn test_wider_fanout() {
    let fanout = Fanout::new(8, 5).unwrap();
    let mut tree = BPlusTree::open_with_fanout(
        MemoryChunkStore::new(),
        KeyType::Integer,
        ChunkAddress::zero(),
        fanout,
    );
    tree.start_buffer();
    for k in (0..1000).rev() {
        tree.put(&key(k), value(k)).unwrap();
    }
    let shape = tree.check_invariants().unwrap();
    assert_eq!(shape.entries, 1000);
    assert!(shape.depth <= 4);

    assert!(Fanout::new(1, 3).is_err());
    assert!(Fanout::new(3, 31).is_err());
    assert!(Fanout::new(31, 3).is_ok());
}

#[test]
fn test_reopen_requires_creation_fanout() {
    let store = MemoryChunkStore::new();
    let wide = Fanout::new(8, 8).unwrap();
    let mut tree = BPlusTree::open_with_fanout(store.clone(), KeyType::Integer, ChunkAddress::zero(), wide);
    tree.start_buffer();
    let mut keys: Vec<i64> = (0..200).map(|k| (k * 7919) % 1009).collect();
    for k in &keys {
        tree.put(&key(*k), value(*k)).unwrap();
    }
    let root = tree.flush().unwrap();

    // every leaf of this tree holds more entries than the default fanout allows
    let mut narrow = BPlusTree::open(store.clone(), KeyType::Integer, root);
    assert!(matches!(
        narrow.get(&key(keys[0])),
        Err(IndexError::FanoutExceeded { .. })
    ));
    assert!(matches!(
        narrow.put(&key(5000), value(5000)),
        Err(IndexError::FanoutExceeded { .. })
    ));

    let mut tree = BPlusTree::open_with_fanout(store, KeyType::Integer, root, wide);
    for k in (0..60).map(|k| (k * 104_729) % 2003 + 1009) {
        tree.put(&key(k), value(k)).unwrap();
        keys.push(k);
    }
    for k in &keys {
        assert_eq!(tree.get(&key(*k)).unwrap(), Some(value(*k)));
    }
    assert_eq!(tree.check_invariants().unwrap().entries, keys.len());
}

#[test]
fn test_malformed_root_is_an_error() {
    let store = MemoryChunkStore::new();
    let bogus = store.store_bytes(b"definitely not a node").unwrap();
    let mut tree = BPlusTree::open(store, KeyType::Integer, bogus);
    assert!(matches!(
        tree.get(&key(1)),
        Err(IndexError::MalformedNode { .. })
    ));
}

#[test]
fn test_missing_root_chunk_is_an_error() {
    let mut tree = BPlusTree::open(
        MemoryChunkStore::new(),
        KeyType::Integer,
        ChunkAddress::keccak(b"gone"),
    );
    assert!(matches!(
        tree.get(&key(1)),
        Err(IndexError::Store(StoreError::ChunkNotFound(_)))
    ));
}

#[derive(Debug, Clone)]
enum Op {
    Put(i64),
    Delete(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0i64..120).prop_map(Op::Put),
        2 => (0i64..120).prop_map(Op::Delete),
    ]
}

#[derive(Debug, Clone)]
enum SessionOp {
    Put(i64),
    Delete(i64),
    /// Flush, then reopen lazily from the root hash, buffered or not
    Reopen(bool),
}

fn session_op_strategy() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        6 => (0i64..200).prop_map(SessionOp::Put),
        3 => (0i64..200).prop_map(SessionOp::Delete),
        1 => any::<bool>().prop_map(SessionOp::Reopen),
    ]
}

fn fanout_strategy() -> impl Strategy<Value = Fanout> {
    (2usize..=6, 2usize..=6).prop_map(|(leaf, branch)| Fanout::new(leaf, branch).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_matches_btreemap_model(ops in prop::collection::vec(op_strategy(), 1..300)) {
        let store = MemoryChunkStore::new();
        let mut tree = BPlusTree::new(store.clone(), KeyType::Integer);
        let mut model = BTreeMap::new();
        tree.start_buffer();

        for op in &ops {
            match *op {
                Op::Put(k) => {
                    let outcome = tree.put(&key(k), value(k)).unwrap();
                    let expected = if model.insert(k, value(k)).is_some() {
                        PutOutcome::Updated
                    } else {
                        PutOutcome::Inserted
                    };
                    prop_assert_eq!(outcome, expected);
                }
                Op::Delete(k) => {
                    prop_assert_eq!(tree.delete(&key(k)).unwrap(), model.remove(&k).is_some());
                }
            }
        }

        let shape = tree.check_invariants().unwrap();
        prop_assert_eq!(shape.entries, model.len());

        let keys: Vec<i64> = model.keys().copied().collect();
        prop_assert_eq!(&forward(&mut tree), &keys);
        let reversed: Vec<i64> = keys.iter().rev().copied().collect();
        prop_assert_eq!(&backward(&mut tree), &reversed);

        // the persisted tree reads back the same
        let root = tree.flush_buffer().unwrap();
        let mut reader = BPlusTree::open(store, KeyType::Integer, root);
        for k in 0..120 {
            prop_assert_eq!(reader.get(&key(k)).unwrap(), model.get(&k).copied());
        }
        prop_assert_eq!(reader.check_invariants().unwrap().entries, model.len());
    }

    #[test]
    fn test_reloaded_sessions_match_model(
        fanout in fanout_strategy(),
        ops in prop::collection::vec(session_op_strategy(), 1..400),
    ) {
        let store = MemoryChunkStore::new();
        let mut tree = BPlusTree::open_with_fanout(store.clone(), KeyType::Integer, ChunkAddress::zero(), fanout);
        let mut model = BTreeMap::new();

        for op in &ops {
            match *op {
                SessionOp::Put(k) => {
                    tree.put(&key(k), value(k)).unwrap();
                    model.insert(k, value(k));
                }
                SessionOp::Delete(k) => {
                    prop_assert_eq!(tree.delete(&key(k)).unwrap(), model.remove(&k).is_some());
                }
                SessionOp::Reopen(buffered) => {
                    let root = tree.flush().unwrap();
                    tree = BPlusTree::open_with_fanout(store.clone(), KeyType::Integer, root, fanout);
                    if buffered {
                        tree.start_buffer();
                    }
                }
            }
        }

        let shape = tree.check_invariants().unwrap();
        prop_assert_eq!(shape.entries, model.len());
        let keys: Vec<i64> = model.keys().copied().collect();
        prop_assert_eq!(&forward(&mut tree), &keys);

        let root = tree.flush().unwrap();
        let mut reader = BPlusTree::open_with_fanout(store, KeyType::Integer, root, fanout);
        for k in 0..200 {
            prop_assert_eq!(reader.get(&key(k)).unwrap(), model.get(&k).copied());
        }
        prop_assert_eq!(reader.check_invariants().unwrap().entries, model.len());
    }
}
