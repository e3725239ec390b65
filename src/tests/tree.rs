use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::nodes::{NodeType, PtrType};
use crate::tests::{CountingAllocator, FailingAllocator};
use crate::Okra;

fn root_prefix(tree: &Okra) -> Vec<u8> {
    match tree.inner().root.downcast() {
        PtrType::SubNode(sub) => unsafe { sub.as_ref() }.prefix().to_vec(),
        PtrType::Payload(_) => panic!("root is a leaf"),
    }
}

fn root_type(tree: &Okra) -> NodeType {
    match tree.inner().root.downcast() {
        PtrType::SubNode(sub) => unsafe { sub.as_ref() }.get_type(),
        PtrType::Payload(_) => panic!("root is a leaf"),
    }
}

#[test]
fn test_small_dense_roots_in_shared_prefix() {
    let mut tree = Okra::new();
    for v in [1u64, 2, 3] {
        tree.insert(v).unwrap();
    }

    assert_eq!(tree.get(2), Some(2));
    assert_eq!(root_type(&tree), NodeType::N4);
    // 1, 2 and 3 agree on their first seven encoded bytes
    assert_eq!(root_prefix(&tree), vec![0, 0, 0, 0, 0, 0, 0]);
    tree.inner().verify_structure();
}

#[test]
fn test_keys_differing_in_last_byte() {
    let mut tree = Okra::new();
    tree.insert(0x0101010101010100).unwrap();
    tree.insert(0x0101010101010101).unwrap();

    assert_eq!(root_type(&tree), NodeType::N4);
    assert_eq!(root_prefix(&tree), vec![1, 1, 1, 1, 1, 1, 1]);
    assert_eq!(tree.get(0x0101010101010100), Some(0x0101010101010100));
    assert_eq!(tree.get(0x0101010101010101), Some(0x0101010101010101));
    tree.inner().verify_structure();
}

#[test]
fn test_keys_differing_in_first_byte() {
    let a = 0x0000000000000001u64;
    let b = 0x7fffffffffffffffu64;

    let mut tree = Okra::new();
    tree.insert(a).unwrap();
    tree.insert(b).unwrap();

    assert_eq!(root_type(&tree), NodeType::N4);
    assert_eq!(root_prefix(&tree), Vec::<u8>::new());
    assert_eq!(tree.get(a), Some(a));
    assert_eq!(tree.get(b), Some(b));

    // removing either key dissolves the node into a bare leaf
    assert_eq!(tree.remove(a), Some(a));
    assert_eq!(tree.get(b), Some(b));
    match tree.inner().root.downcast() {
        PtrType::Payload(tid) => assert_eq!(tid as u64, b),
        PtrType::SubNode(_) => panic!("one-way root should have dissolved"),
    }
}

#[test]
fn test_erase_keeps_siblings() {
    let mut tree = Okra::new();
    tree.insert(1000).unwrap();
    tree.insert(2).unwrap();
    tree.insert(500000).unwrap();

    assert_eq!(tree.remove(2), Some(2));
    assert_eq!(tree.get(2), None);
    assert_eq!(tree.get(1000), Some(1000));
    assert_eq!(tree.get(500000), Some(500000));
    tree.inner().verify_structure();
}

#[test]
fn test_growth_transitions() {
    // values 1..=n differ only in the low byte, so they gather under one
    // node that must climb through every size class
    let mut tree = Okra::new();
    let mut expected = NodeType::N4;
    for v in 1..=100u64 {
        tree.insert(v).unwrap();
        expected = match v {
            1 => continue, // a single leaf, no inner node yet
            2..=4 => NodeType::N4,
            5..=16 => NodeType::N16,
            17..=48 => NodeType::N48,
            _ => NodeType::N256,
        };
        assert_eq!(root_type(&tree), expected, "after inserting {v}");
    }
    assert_eq!(expected, NodeType::N256);
    tree.inner().verify_structure();

    for v in 1..=100u64 {
        assert_eq!(tree.get(v), Some(v));
        assert_eq!(tree.get_verified(v), Some(v));
    }
}

#[test]
fn test_shrink_transitions_end_at_empty() {
    let mut tree = Okra::new();
    for v in 1..=100u64 {
        tree.insert(v).unwrap();
    }

    for v in (1..=100u64).rev() {
        assert_eq!(tree.remove(v), Some(v));
        let remaining = v - 1;
        match remaining {
            0 => assert!(tree.is_empty()),
            1 => {} // bare leaf at the root
            2..=3 => assert_eq!(root_type(&tree), NodeType::N4),
            4..=12 => assert_eq!(root_type(&tree), NodeType::N16),
            13..=36 => assert_eq!(root_type(&tree), NodeType::N48),
            _ => assert_eq!(root_type(&tree), NodeType::N256),
        }
        if remaining > 1 {
            tree.inner().verify_structure();
        }
    }
}

#[test]
fn test_prefix_split_mid_path() {
    let mut tree = Okra::new();
    // share bytes 0..7, so the first pair builds a deep prefix
    tree.insert(0x1111111111111100).unwrap();
    tree.insert(0x1111111111111101).unwrap();
    // now diverge at byte 3, splitting the compressed path
    tree.insert(0x1111112211111100).unwrap();

    for v in [0x1111111111111100u64, 0x1111111111111101, 0x1111112211111100] {
        assert_eq!(tree.get(v), Some(v));
        assert_eq!(tree.get_verified(v), Some(v));
    }
    tree.inner().verify_structure();

    // the split point keeps the matching three bytes inline
    assert_eq!(root_prefix(&tree), vec![0x11, 0x11, 0x11]);
}

#[test]
fn test_prefix_split_at_first_byte() {
    let mut tree = Okra::new();
    tree.insert(0x1111111111111100).unwrap();
    tree.insert(0x1111111111111101).unwrap();
    tree.insert(0x2211111111111100).unwrap();

    // mismatch at position zero still yields a valid empty-prefix node
    assert_eq!(root_prefix(&tree), Vec::<u8>::new());
    for v in [0x1111111111111100u64, 0x1111111111111101, 0x2211111111111100] {
        assert_eq!(tree.get(v), Some(v));
    }
    tree.inner().verify_structure();
}

#[test]
fn test_erase_concatenates_prefixes() {
    let mut tree = Okra::new();
    // three keys: two deep below one branch, one forcing an early split
    let deep_a = 0x1111111111111100u64;
    let deep_b = 0x1111111111111101u64;
    let shallow = 0x1122000000000000u64;
    tree.insert(deep_a).unwrap();
    tree.insert(deep_b).unwrap();
    tree.insert(shallow).unwrap();
    tree.inner().verify_structure();

    // removing the shallow key splices its parent out and glues the path
    // back together
    assert_eq!(tree.remove(shallow), Some(shallow));
    assert_eq!(tree.get(deep_a), Some(deep_a));
    assert_eq!(tree.get(deep_b), Some(deep_b));
    assert_eq!(root_prefix(&tree), vec![0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]);
    tree.inner().verify_structure();
}

#[test]
fn test_insert_is_idempotent() {
    let mut tree = Okra::new();
    assert_eq!(tree.insert(42).unwrap(), None);
    assert_eq!(tree.insert(42).unwrap(), Some(42));
    assert_eq!(tree.insert(42).unwrap(), Some(42));
    assert_eq!(tree.value_count(), 1);
    assert_eq!(tree.get(42), Some(42));
}

#[test]
fn test_optimistic_and_verified_agree() {
    let mut r = StdRng::seed_from_u64(42);
    let mut tree = Okra::new();
    let mut present = Vec::new();

    for _ in 0..4096 {
        let v = r.gen_range(0..1u64 << 62);
        tree.insert(v).unwrap();
        present.push(v);
    }

    for v in &present {
        assert_eq!(tree.get(*v), Some(*v));
        assert_eq!(tree.get_verified(*v), Some(*v));
    }
    for _ in 0..4096 {
        let v = r.gen_range(0..1u64 << 62);
        assert_eq!(tree.get(v), tree.get_verified(v));
    }
}

#[test]
fn test_keys_are_sorted() {
    let mut key_space: Vec<u64> = (0..10_000).collect();
    let mut r = StdRng::seed_from_u64(42);
    key_space.shuffle(&mut r);

    let mut tree = Okra::new();
    for v in &key_space {
        tree.insert(*v).unwrap();
    }

    let keys = tree.keys();
    let expected: Vec<u64> = (0..10_000).collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_no_nodes_leak() {
    let allocator = CountingAllocator::default();
    {
        let mut tree = Okra::new_with_allocator(allocator.clone());
        let mut key_space: Vec<u64> = (0..50_000).collect();
        let mut r = StdRng::seed_from_u64(7);
        key_space.shuffle(&mut r);

        for v in &key_space {
            tree.insert(*v).unwrap();
        }
        assert!(allocator.live_nodes() > 0);

        // erase half, drop the rest
        for v in &key_space[..25_000] {
            assert_eq!(tree.remove(*v), Some(*v));
        }
    }
    assert_eq!(allocator.live_nodes(), 0);
}

#[test]
fn test_erase_everything_leaves_no_nodes() {
    let allocator = CountingAllocator::default();
    let mut tree = Okra::new_with_allocator(allocator.clone());
    for v in 0..10_000u64 {
        tree.insert(v).unwrap();
    }
    for v in 0..10_000u64 {
        assert_eq!(tree.remove(v), Some(v));
    }
    assert!(tree.is_empty());
    assert_eq!(allocator.live_nodes(), 0);
}

#[test]
fn test_insert_surfaces_allocation_failure() {
    let mut tree = Okra::new_with_allocator(FailingAllocator::new(1));
    // the first split allocates the only budgeted node
    tree.insert(1).unwrap();
    tree.insert(2).unwrap();
    // the next split must fail cleanly
    let res = tree.insert(1 << 32);
    assert!(res.is_err());
    // the earlier entries are still intact
    assert_eq!(tree.get(1), Some(1));
    assert_eq!(tree.get(2), Some(2));
}

#[test]
fn test_value_count_and_is_empty() {
    let mut tree = Okra::new();
    assert!(tree.is_empty());
    assert_eq!(tree.value_count(), 0);

    for v in 0..123u64 {
        tree.insert(v).unwrap();
    }
    assert!(!tree.is_empty());
    assert_eq!(tree.value_count(), 123);

    tree.remove(0).unwrap();
    assert_eq!(tree.value_count(), 122);
}

#[test]
fn test_stats_sees_every_size_class() {
    let mut tree = Okra::new();
    // 64 children under one branch node
    for v in 0..64u64 {
        tree.insert(v).unwrap();
    }
    let stats = tree.stats();
    assert_eq!(stats.nodes_of(NodeType::N256), 1);
    assert_eq!(stats.total_nodes(), 1);

    // a second cluster far away splits the root
    tree.insert(1 << 56).unwrap();
    let stats = tree.stats();
    assert_eq!(stats.nodes_of(NodeType::N4), 1);
    assert_eq!(stats.nodes_of(NodeType::N256), 1);
}

#[test]
fn test_sparse_random_workload() {
    let mut r = StdRng::seed_from_u64(1234);
    let mut values: Vec<u64> = (0..30_000)
        .map(|_| r.gen_range(0..1u64 << 62))
        .collect();
    values.sort_unstable();
    values.dedup();

    let mut tree = Okra::new();
    for v in &values {
        tree.insert(*v).unwrap();
    }
    tree.inner().verify_structure();

    for v in &values {
        assert_eq!(tree.get(*v), Some(*v));
    }

    for v in &values {
        assert_eq!(tree.remove(*v), Some(*v));
    }
    assert!(tree.is_empty());
}
