use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::nodes::{NodeType, PtrType};
use crate::tests::CountingAllocator;
use crate::Okra;

#[test]
fn test_bulk_load_small_dense() {
    let values: Vec<u64> = (1..=16).collect();
    let tree = Okra::bulk_load(&values).unwrap();
    tree.inner().verify_structure();

    // sixteen keys force a learned root covering the shared upper bytes
    match tree.inner().root.downcast() {
        PtrType::SubNode(sub) => {
            let root = unsafe { sub.as_ref() };
            assert_eq!(root.get_type(), NodeType::NLinear);
            assert_eq!(root.prefix_len(), 7);
            assert_eq!(root.prefix().to_vec(), vec![0u8; 7]);
        }
        PtrType::Payload(_) => panic!("expected an inner root"),
    }

    for v in &values {
        assert_eq!(tree.get(*v), Some(*v));
        assert_eq!(tree.get_verified(*v), Some(*v));
    }
    assert_eq!(tree.get(0), None);
    assert_eq!(tree.get(17), None);
}

#[test]
fn test_bulk_load_tiny_input_has_no_learned_node() {
    let values: Vec<u64> = (1..=5).collect();
    let tree = Okra::bulk_load(&values).unwrap();
    tree.inner().verify_structure();

    assert_eq!(tree.stats().nodes_of(NodeType::NLinear), 0);
    for v in &values {
        assert_eq!(tree.get(*v), Some(*v));
    }
}

#[test]
fn test_bulk_load_empty_and_single() {
    let tree = Okra::bulk_load(&[]).unwrap();
    assert!(tree.is_empty());

    let tree = Okra::bulk_load(&[99]).unwrap();
    assert_eq!(tree.get(99), Some(99));
    assert_eq!(tree.value_count(), 1);
}

#[test]
fn test_bulk_load_collapses_duplicates() {
    let values = vec![5u64; 20];
    let tree = Okra::bulk_load(&values).unwrap();
    assert_eq!(tree.value_count(), 1);
    assert_eq!(tree.get(5), Some(5));
}

#[test]
fn test_bulk_load_matches_point_insert() {
    let mut values: Vec<u64> = (0..5000).collect();
    let mut r = StdRng::seed_from_u64(42);
    values.shuffle(&mut r);

    let loaded = Okra::bulk_load(&values).unwrap();
    let mut inserted = Okra::new();
    for v in &values {
        inserted.insert(*v).unwrap();
    }

    loaded.inner().verify_structure();
    assert_eq!(loaded.value_count(), inserted.value_count());
    assert_eq!(loaded.keys(), inserted.keys());
}

#[test]
fn test_bulk_load_dense_read_back() {
    let values: Vec<u64> = (0..100_000).collect();
    let tree = Okra::bulk_load(&values).unwrap();
    tree.inner().verify_structure();

    // the learned spine should dominate a dense bulk-loaded tree
    assert!(tree.stats().nodes_of(NodeType::NLinear) > 0);

    for v in &values {
        assert_eq!(tree.get(*v), Some(*v));
    }
    assert_eq!(tree.get(100_000), None);
}

#[test]
fn test_bulk_load_sparse_read_back() {
    let mut r = StdRng::seed_from_u64(9);
    let mut values: Vec<u64> = (0..30_000)
        .map(|_| r.gen_range(0..1u64 << 62))
        .collect();
    values.sort_unstable();
    values.dedup();

    let tree = Okra::bulk_load(&values).unwrap();
    tree.inner().verify_structure();

    for v in &values {
        assert_eq!(tree.get(*v), Some(*v));
        assert_eq!(tree.get_verified(*v), Some(*v));
    }
}

#[test]
fn test_point_insert_into_bulk_loaded_tree() {
    let values: Vec<u64> = (0..10_000).map(|v| v * 2).collect();
    let mut tree = Okra::bulk_load(&values).unwrap();

    // fill the odd gaps through the learned spine
    for v in 0..10_000u64 {
        tree.insert(v * 2 + 1).unwrap();
    }
    tree.inner().verify_structure();

    for v in 0..20_000u64 {
        assert_eq!(tree.get(v), Some(v));
        assert_eq!(tree.get_verified(v), Some(v));
    }
}

#[test]
fn test_erase_empties_bulk_loaded_tree() {
    let allocator = CountingAllocator::default();
    let mut values: Vec<u64> = (0..20_000).collect();

    let mut tree = Okra::bulk_load_with_allocator(&values, allocator.clone()).unwrap();

    let mut r = StdRng::seed_from_u64(3);
    values.shuffle(&mut r);
    for v in &values {
        assert_eq!(tree.remove(*v), Some(*v), "missing {v}");
    }

    assert!(tree.is_empty());
    assert_eq!(tree.value_count(), 0);
    assert_eq!(allocator.live_nodes(), 0);
}

#[test]
fn test_erase_half_of_bulk_loaded_tree() {
    let values: Vec<u64> = (0..10_000).collect();
    let mut tree = Okra::bulk_load(&values).unwrap();

    for v in values.iter().filter(|v| *v % 2 == 0) {
        assert_eq!(tree.remove(*v), Some(*v));
    }
    tree.inner().verify_structure();

    for v in &values {
        let expected = if *v % 2 == 0 { None } else { Some(*v) };
        assert_eq!(tree.get(*v), expected);
    }
}

#[test]
fn test_bulk_load_keys_are_sorted() {
    let mut values: Vec<u64> = (0..50_000).collect();
    let mut r = StdRng::seed_from_u64(11);
    values.shuffle(&mut r);

    let tree = Okra::bulk_load(&values).unwrap();
    let keys = tree.keys();
    let expected: Vec<u64> = (0..50_000).collect();
    assert_eq!(keys, expected);
}
