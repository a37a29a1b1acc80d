//! Garbage Collection Stress Tests
//!
//! Tests validate collector correctness under heavy churn:
//! - Rapid allocation with nothing retained
//! - Long linked structures that survive many cycles
//! - Fragmentation from interleaved lifetimes
//! - Circular references
//! - Arrays of references
//!
//! Every test runs against both strategies.
//!
//! # Running Tests
//! ```bash
//! cargo test --test gc_stress_tests
//! ```

use ember_engine::vm::types::{ClassId, FieldDescriptor, TypeRegistryBuilder};
use ember_engine::{
    GarbageCollector, GcConfig, GcStrategy, NoRoots, Reference, RootSet, Value, VmError,
};
use std::sync::Arc;

const STRATEGIES: [GcStrategy; 2] = [GcStrategy::Compact, GcStrategy::Sweep];

/// `Node { value: int, next: Node }` and `Pair { left: Node, right: Node }`
fn create_gc(heap_size: usize, strategy: GcStrategy) -> (GarbageCollector, ClassId, ClassId) {
    let mut builder = TypeRegistryBuilder::new();
    let node = builder.declare_class("Node").unwrap();
    builder
        .define_fields(
            node,
            vec![FieldDescriptor::int("value"), FieldDescriptor::reference("next", node)],
        )
        .unwrap();
    let pair = builder
        .register_class(
            "Pair",
            vec![
                FieldDescriptor::reference("left", node),
                FieldDescriptor::reference("right", node),
            ],
        )
        .unwrap();
    let config = GcConfig {
        heap_size,
        strategy,
    };
    let gc = GarbageCollector::new(config, Arc::new(builder.build())).unwrap();
    (gc, node, pair)
}

/// Walk a list from `head`, returning its values
fn list_values(gc: &GarbageCollector, head: Reference) -> Vec<i64> {
    let mut values = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        values.push(gc.load_field(cursor, 0).unwrap().as_int().unwrap());
        cursor = gc.load_field(cursor, 1).unwrap().as_reference().unwrap();
    }
    values
}

// ===== Rapid Allocation Tests =====

#[test]
fn test_rapid_allocation_with_no_roots() {
    for strategy in STRATEGIES {
        let (mut gc, node, _) = create_gc(8 * 1024, strategy);

        for i in 0..100_000 {
            let obj = gc.allocate_object(node, &mut NoRoots).unwrap();
            gc.store_field(obj, 0, Value::int(i)).unwrap();
        }

        let stats = gc.stats();
        assert!(stats.collections > 0, "{}: GC should have run", strategy);
        assert_eq!(stats.out_of_memory_count, 0);
        assert!(gc.heap_stats().allocated_bytes <= 8 * 1024);
    }
}

// ===== Survival Tests =====

#[test]
fn test_long_list_survives_churn() {
    for strategy in STRATEGIES {
        let (mut gc, node, _) = create_gc(16 * 1024, strategy);
        let mut roots = RootSet::new();
        let head = roots.push(Reference::Null);

        // Prepend 200 nodes, allocating garbage between each
        for i in 0..200 {
            for _ in 0..20 {
                gc.allocate_object(node, &mut roots).unwrap();
            }
            let new = gc.allocate_object(node, &mut roots).unwrap();
            gc.store_field(new, 0, Value::int(i)).unwrap();
            gc.store_field(new, 1, Value::Ref(roots.get(head))).unwrap();
            roots.set(head, new);
        }

        let expected: Vec<i64> = (0..200).rev().collect();
        assert_eq!(list_values(&gc, roots.get(head)), expected, "{}", strategy);
        assert!(gc.stats().collections > 0);

        // Dropping the root frees the whole list
        roots.set(head, Reference::Null);
        gc.collect(&mut roots);
        assert_eq!(gc.stats().live_objects, 0, "{}", strategy);
        assert_eq!(gc.heap_stats().allocated_bytes, 0, "{}", strategy);
    }
}

#[test]
fn test_interleaved_lifetimes_fragmentation() {
    for strategy in STRATEGIES {
        let (mut gc, node, pair) = create_gc(32 * 1024, strategy);
        let mut roots = RootSet::new();
        let keep = roots.push(Reference::Null);

        // Keep every other pair's left node; free pairs and right nodes
        for i in 0..2_000 {
            let left = gc.allocate_object(node, &mut roots).unwrap();
            let left_slot = roots.push(left);
            let right = gc.allocate_object(node, &mut roots).unwrap();
            let right_slot = roots.push(right);
            let p = gc.allocate_object(pair, &mut roots).unwrap();
            gc.store_field(p, 0, Value::Ref(roots.get(left_slot))).unwrap();
            gc.store_field(p, 1, Value::Ref(roots.get(right_slot))).unwrap();

            if i % 2 == 0 {
                let left = roots.get(left_slot);
                gc.store_field(left, 0, Value::int(i)).unwrap();
                gc.store_field(left, 1, Value::Ref(roots.get(keep))).unwrap();
                roots.set(keep, left);
            }
            roots.truncate(left_slot);
        }

        let values = list_values(&gc, roots.get(keep));
        assert_eq!(values.len(), 1_000, "{}", strategy);
        assert!(values.windows(2).all(|w| w[0] == w[1] + 2));
        assert_eq!(gc.stats().out_of_memory_count, 0);
    }
}

// ===== Circular Reference Tests =====

#[test]
fn test_circular_references_are_reclaimed() {
    for strategy in STRATEGIES {
        let (mut gc, node, _) = create_gc(8 * 1024, strategy);
        let mut roots = RootSet::new();

        for _ in 0..5_000 {
            let a = gc.allocate_object(node, &mut roots).unwrap();
            let slot = roots.push(a);
            let b = gc.allocate_object(node, &mut roots).unwrap();
            let a = roots.get(slot);
            gc.store_field(a, 1, Value::Ref(b)).unwrap();
            gc.store_field(b, 1, Value::Ref(a)).unwrap();
            roots.truncate(slot);
        }

        gc.collect(&mut roots);
        assert_eq!(gc.stats().live_objects, 0, "{}", strategy);
    }
}

#[test]
fn test_rooted_cycle_survives() {
    for strategy in STRATEGIES {
        let (mut gc, node, _) = create_gc(8 * 1024, strategy);
        let mut roots = RootSet::new();

        let a = gc.allocate_object(node, &mut roots).unwrap();
        let slot = roots.push(a);
        let b = gc.allocate_object(node, &mut roots).unwrap();
        let a = roots.get(slot);
        gc.store_field(a, 0, Value::int(1)).unwrap();
        gc.store_field(b, 0, Value::int(2)).unwrap();
        gc.store_field(a, 1, Value::Ref(b)).unwrap();
        gc.store_field(b, 1, Value::Ref(a)).unwrap();

        for _ in 0..10_000 {
            gc.allocate_object(node, &mut roots).unwrap();
        }

        let a = roots.get(slot);
        let b = gc.load_field(a, 1).unwrap().as_reference().unwrap();
        assert_eq!(gc.load_field(a, 0).unwrap(), Value::int(1));
        assert_eq!(gc.load_field(b, 0).unwrap(), Value::int(2));
        assert_eq!(gc.load_field(b, 1).unwrap(), Value::Ref(a), "{}", strategy);
    }
}

// ===== Array Tests =====

#[test]
fn test_array_of_references_under_churn() {
    for strategy in STRATEGIES {
        let (mut gc, node, _) = create_gc(16 * 1024, strategy);
        let mut roots = RootSet::new();
        let array = gc.allocate_array(node, 64, &mut roots).unwrap();
        let array_slot = roots.push(array);

        for i in 0..5_000i64 {
            let obj = gc.allocate_object(node, &mut roots).unwrap();
            gc.store_field(obj, 0, Value::int(i)).unwrap();
            gc.store_element(roots.get(array_slot), i % 64, Value::Ref(obj)).unwrap();
        }

        let array = roots.get(array_slot);
        for j in 0..64i64 {
            let obj = gc.load_element(array, j).unwrap().as_reference().unwrap();
            let value = gc.load_field(obj, 0).unwrap().as_int().unwrap();
            assert_eq!(value % 64, j, "{}", strategy);
            assert!(value >= 5_000 - 64);
        }
    }
}

#[test]
fn test_out_of_memory_is_recoverable() {
    for strategy in STRATEGIES {
        let (mut gc, node, _) = create_gc(4096, strategy);
        let mut roots = RootSet::new();

        // Fill the heap with rooted nodes
        let (err, before) = loop {
            let before = gc.stats().collections;
            match gc.allocate_object(node, &mut roots) {
                Ok(obj) => {
                    roots.push(obj);
                }
                Err(err) => break (err, before),
            }
        };
        assert!(matches!(err, VmError::OutOfMemory { requested_bytes: 24, .. }));
        assert_eq!(gc.stats().collections, before + 1, "{}", strategy);
        assert_eq!(gc.stats().out_of_memory_count, 1);

        // Releasing roots makes room again, at the cost of one more cycle
        roots.clear_stack_roots();
        assert!(gc.allocate_object(node, &mut roots).is_ok(), "{}", strategy);
        assert_eq!(gc.stats().collections, before + 2, "{}", strategy);
        assert_eq!(gc.stats().out_of_memory_count, 1);
    }
}
