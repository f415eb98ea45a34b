use std::collections::{HashMap, HashSet};

use comb_primitives::{ChunkAddress, ChunkStore, MemoryChunkStore, StatsStore};
use proptest::prelude::*;

use super::*;
use crate::IndexCursor;

fn value(n: i64) -> ChunkAddress {
    ChunkAddress::sha256_of(&[b"trie", &n.to_be_bytes()])
}

fn key(n: i64) -> IndexKey {
    IndexKey::from_i64(n)
}

fn trie() -> HashTrie<MemoryChunkStore> {
    HashTrie::new(MemoryChunkStore::new())
}

/// Integer keys whose hashes agree on the first `levels` bins
fn colliding(levels: usize, count: usize) -> Vec<i64> {
    let mut groups: HashMap<Vec<usize>, Vec<i64>> = HashMap::new();
    for k in 0.. {
        let hash = node::key_hash(&key(k));
        let prefix: Vec<usize> = (0..levels).map(|level| node::bin(&hash, level)).collect();
        let group = groups.entry(prefix).or_default();
        group.push(k);
        if group.len() == count {
            return group.clone();
        }
    }
    unreachable!()
}

fn walk<S: ChunkStore>(trie: &mut HashTrie<S>, forward: bool) -> Vec<i64> {
    let mut cursor = if forward {
        trie.seek_first().unwrap()
    } else {
        trie.seek_last().unwrap()
    };
    let mut keys = Vec::new();
    loop {
        let entry = if forward { cursor.next() } else { cursor.prev() };
        match entry.unwrap() {
            Some((key, _)) => keys.push(key.as_i64()),
            None => break,
        }
    }
    keys
}

#[test]
fn test_put_get_delete() {
    let mut trie = trie();
    assert_eq!(trie.root_hash(), ChunkAddress::zero());
    assert_eq!(trie.get(&key(1)).unwrap(), None);

    for k in 0..200 {
        assert_eq!(trie.put(&key(k), value(k)).unwrap(), PutOutcome::Inserted);
    }
    assert_eq!(trie.put(&key(7), value(700)).unwrap(), PutOutcome::Updated);
    assert_eq!(trie.get(&key(7)).unwrap(), Some(value(700)));
    assert_eq!(trie.get(&key(8)).unwrap(), Some(value(8)));
    assert_eq!(trie.check_invariants().unwrap(), 200);

    assert!(trie.delete(&key(8)).unwrap());
    assert!(!trie.delete(&key(8)).unwrap());
    assert_eq!(trie.get(&key(8)).unwrap(), None);
    assert_eq!(trie.check_invariants().unwrap(), 199);
}

#[test]
fn test_insert_rejects_duplicate() {
    let mut trie = trie();
    trie.insert(&key(1), value(1)).unwrap();
    assert!(matches!(trie.insert(&key(1), value(2)), Err(IndexError::DuplicateKey)));
    assert_eq!(trie.get(&key(1)).unwrap(), Some(value(1)));
}

#[test]
fn test_collision_splits_to_next_level() {
    let keys = colliding(1, 2);
    let mut trie = trie();
    trie.put(&key(keys[0]), value(keys[0])).unwrap();
    assert_eq!(trie.depth_of(&key(keys[0])).unwrap(), Some(1));

    trie.put(&key(keys[1]), value(keys[1])).unwrap();
    assert_eq!(trie.depth_of(&key(keys[0])).unwrap(), Some(2));
    assert_eq!(trie.depth_of(&key(keys[1])).unwrap(), Some(2));
    trie.check_invariants().unwrap();
}

#[test]
fn test_delete_collapses_branch() {
    let keys = colliding(1, 2);
    let mut trie = trie();
    for k in &keys {
        trie.put(&key(*k), value(*k)).unwrap();
    }
    assert!(trie.delete(&key(keys[0])).unwrap());

    // the survivor moves back up into the root
    assert_eq!(trie.depth_of(&key(keys[1])).unwrap(), Some(1));
    assert_eq!(trie.get(&key(keys[1])).unwrap(), Some(value(keys[1])));
    trie.check_invariants().unwrap();
}

#[test]
fn test_delete_collapses_chain() {
    let keys = colliding(2, 2);
    let mut trie = trie();
    for k in &keys {
        trie.put(&key(*k), value(*k)).unwrap();
    }
    assert!(trie.depth_of(&key(keys[0])).unwrap() >= Some(3));

    assert!(trie.delete(&key(keys[1])).unwrap());
    assert_eq!(trie.depth_of(&key(keys[0])).unwrap(), Some(1));
    trie.check_invariants().unwrap();
}

#[test]
fn test_delete_last_key_empties_trie() {
    let mut trie = trie();
    trie.put(&key(1), value(1)).unwrap();
    assert_ne!(trie.root_hash(), ChunkAddress::zero());
    assert!(trie.delete(&key(1)).unwrap());
    assert_eq!(trie.root_hash(), ChunkAddress::zero());
    assert!(walk(&mut trie, true).is_empty());
}

#[test]
fn test_depth_of_absent_key() {
    let mut trie = trie();
    trie.put(&key(1), value(1)).unwrap();
    assert_eq!(trie.depth_of(&key(2)).unwrap(), None);
}

#[test]
fn test_traversal_visits_every_key_once() {
    let mut trie = trie();
    for k in 0..300 {
        trie.put(&key(k), value(k)).unwrap();
    }

    let forward = walk(&mut trie, true);
    assert_eq!(forward.iter().copied().collect::<HashSet<_>>().len(), 300);
    assert_eq!(forward.len(), 300);

    let mut backward = walk(&mut trie, false);
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn test_traversal_is_bin_order() {
    let mut trie = trie();
    for k in 0..50 {
        trie.put(&key(k), value(k)).unwrap();
    }
    let bins: Vec<Vec<usize>> = walk(&mut trie, true)
        .into_iter()
        .map(|k| {
            let hash = node::key_hash(&key(k));
            (0..=MAX_LEVEL).map(|level| node::bin(&hash, level)).collect()
        })
        .collect();
    assert!(bins.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_seek_and_sticky_end() {
    let mut trie = trie();
    for k in 0..10 {
        trie.put(&key(k), value(k)).unwrap();
    }
    let order = walk(&mut trie, true);

    let (mut cursor, found) = trie.seek(&key(order[8])).unwrap();
    assert!(found);
    assert_eq!(cursor.next().unwrap().map(|(k, _)| k.as_i64()), Some(order[8]));
    assert_eq!(cursor.next().unwrap().map(|(k, _)| k.as_i64()), Some(order[9]));
    assert_eq!(cursor.next().unwrap(), None);
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.prev().unwrap(), None);

    let (mut cursor, found) = trie.seek(&key(99)).unwrap();
    assert!(!found);
    assert_eq!(cursor.next().unwrap(), None);
}

#[test]
fn test_reopen_and_lazy_load() {
    let store = MemoryChunkStore::new();
    let mut trie = HashTrie::new(store.clone());
    for k in 0..100 {
        trie.put(&key(k), value(k)).unwrap();
    }
    let root = trie.root_hash();

    let counted = StatsStore::new(store);
    let mut reader = HashTrie::open(counted.clone(), root);
    assert_eq!(counted.stats().snapshot().chunk_reads, 0);

    let depth = reader.depth_of(&key(42)).unwrap().unwrap();
    // every branch on the path plus the leaf
    assert_eq!(counted.stats().snapshot().chunk_reads as usize, depth + 1);
    assert_eq!(reader.get(&key(42)).unwrap(), Some(value(42)));
    assert_eq!(reader.check_invariants().unwrap(), 100);
}

#[test]
fn test_buffered_changes_invisible_until_flush() {
    let store = MemoryChunkStore::new();
    let mut trie = HashTrie::new(store.clone());
    trie.put(&key(1), value(1)).unwrap();
    let before = trie.root_hash();

    trie.start_buffer();
    trie.put(&key(2), value(2)).unwrap();
    assert_eq!(trie.root_hash(), before);
    let mut reader = HashTrie::open(store.clone(), trie.root_hash());
    assert_eq!(reader.get(&key(2)).unwrap(), None);

    let after = trie.flush_buffer().unwrap();
    assert_ne!(after, before);
    assert!(!trie.is_buffered());
    assert_eq!(trie.flush_buffer().unwrap(), after);
    let mut reader = HashTrie::open(store, after);
    assert_eq!(reader.get(&key(2)).unwrap(), Some(value(2)));
}

#[test]
fn test_discard_buffer() {
    let mut trie = trie();
    assert!(matches!(trie.discard_buffer(), Err(IndexError::BufferNotStarted)));

    trie.put(&key(1), value(1)).unwrap();
    trie.start_buffer();
    trie.put(&key(2), value(2)).unwrap();
    trie.delete(&key(1)).unwrap();
    trie.discard_buffer().unwrap();

    assert_eq!(trie.get(&key(1)).unwrap(), Some(value(1)));
    assert_eq!(trie.get(&key(2)).unwrap(), None);
}

#[test]
fn test_same_content_same_root() {
    let mut a = trie();
    let mut b = trie();
    for k in 0..40 {
        a.put(&key(k), value(k)).unwrap();
    }
    for k in (0..60).rev() {
        b.put(&key(k), value(k)).unwrap();
    }
    for k in 40..60 {
        b.delete(&key(k)).unwrap();
    }
    assert_eq!(a.root_hash(), b.root_hash());
}

#[test]
fn test_leaf_root_rejected() {
    let store = MemoryChunkStore::new();
    let leaf = node::encode_leaf(&TrieLeaf::new(key(1), value(1)));
    let address = store.store(leaf).unwrap();
    let mut trie = HashTrie::open(store, address);
    assert!(matches!(trie.get(&key(1)), Err(IndexError::MalformedNode { .. })));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_matches_hashmap_model(ops in prop::collection::vec((any::<bool>(), 0i64..150), 1..300)) {
        let store = MemoryChunkStore::new();
        let mut trie = HashTrie::new(store.clone());
        let mut model = HashMap::new();
        trie.start_buffer();

        for (put, k) in ops {
            if put {
                let outcome = trie.put(&key(k), value(k)).unwrap();
                let expected = if model.insert(k, value(k)).is_some() {
                    PutOutcome::Updated
                } else {
                    PutOutcome::Inserted
                };
                prop_assert_eq!(outcome, expected);
            } else {
                prop_assert_eq!(trie.delete(&key(k)).unwrap(), model.remove(&k).is_some());
            }
        }
        prop_assert_eq!(trie.check_invariants().unwrap(), model.len());

        let root = trie.flush_buffer().unwrap();
        let mut reader = HashTrie::open(store, root);
        for k in 0..150 {
            prop_assert_eq!(reader.get(&key(k)).unwrap(), model.get(&k).copied());
        }
        let mut seen = walk(&mut reader, true);
        seen.sort_unstable();
        let mut expected: Vec<i64> = model.keys().copied().collect();
        expected.sort_unstable();
        prop_assert_eq!(seen, expected);
    }
}
