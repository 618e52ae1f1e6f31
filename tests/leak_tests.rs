//! Leak scanner tests: the V1 ownership heuristic, the V2 graph
//! classifier, pointer-strength annotations, and the end-to-end
//! shutdown check.

use guardheap::{
    AllocClass, CheckedHeap, CollectingSink, HeapConfig, RefEventKind, Strength, TopLevelKind,
};
use std::sync::Arc;

fn heap_with_sink() -> (CheckedHeap, Arc<CollectingSink>) {
    let heap = CheckedHeap::new(HeapConfig::default());
    let sink = Arc::new(CollectingSink::new());
    heap.set_sink(sink.clone());
    (heap, sink)
}

/// Store `target`'s address in the first pointer-sized word of `holder`.
unsafe fn point_at(holder: *mut u8, target: *mut u8) {
    (holder as *mut usize).write(target as usize);
}

#[test]
fn test_ownership_scan_finds_older_owner() {
    let heap = CheckedHeap::new(HeapConfig::default());

    // Owner allocated first, then the owned object, owner holds the
    // pointer: the construction order the heuristic is built around.
    let parent = heap.alloc_checked(64, AllocClass::Scalar);
    let child = heap.alloc_checked(32, AllocClass::Scalar);
    unsafe { point_at(parent, child) };

    let entries = heap.scan_ownership();
    assert_eq!(entries.len(), 2);

    let child_entry = entries.iter().find(|e| e.address == child as usize).unwrap();
    assert_eq!(child_entry.owner, Some(parent as usize));

    let parent_entry = entries.iter().find(|e| e.address == parent as usize).unwrap();
    assert_eq!(parent_entry.owner, None);

    heap.free_checked(child, AllocClass::Scalar);
    heap.free_checked(parent, AllocClass::Scalar);
}

#[test]
fn test_ownership_scan_ignores_younger_referrer() {
    let heap = CheckedHeap::new(HeapConfig::default());

    // The referrer is allocated after the referent; a back-pointer like
    // this must not count as ownership.
    let older = heap.alloc_checked(32, AllocClass::Scalar);
    let younger = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe { point_at(younger, older) };

    let entries = heap.scan_ownership();
    assert!(entries.iter().all(|e| e.owner.is_none()));

    heap.free_checked(younger, AllocClass::Scalar);
    heap.free_checked(older, AllocClass::Scalar);
}

#[test]
fn test_ignored_blocks_leave_the_scan_entirely() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let parent = heap.alloc_checked(64, AllocClass::Scalar);
    let child = heap.alloc_checked(32, AllocClass::Scalar);
    unsafe { point_at(parent, child) };

    assert!(heap.set_leak_ignored(parent, true));
    let entries = heap.scan_ownership();
    // The ignored parent is gone both as a candidate and as an owner
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].address, child as usize);
    assert_eq!(entries[0].owner, None);

    assert!(heap.set_leak_ignored(parent, false));
    assert_eq!(heap.scan_ownership().len(), 2);

    heap.free_checked(child, AllocClass::Scalar);
    heap.free_checked(parent, AllocClass::Scalar);
}

#[test]
fn test_graph_classifies_untagged_cycle_as_loop() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let a = heap.alloc_checked(64, AllocClass::Scalar);
    let b = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe {
        point_at(a, b);
        point_at(b, a);
    }

    let nodes = heap.classify_graph();
    assert_eq!(nodes.len(), 2);
    for node in &nodes {
        assert_eq!(node.top_level, TopLevelKind::Loop);
        assert_eq!(node.inbound_strength, Some(Strength::Unknown));
        assert_eq!(node.outbound_strength, Some(Strength::Unknown));
    }

    heap.free_checked(a, AllocClass::Scalar);
    heap.free_checked(b, AllocClass::Scalar);
}

#[test]
fn test_weak_tag_breaks_the_cycle() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let a = heap.alloc_checked(64, AllocClass::Scalar);
    let b = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe {
        point_at(a, b);
        point_at(b, a);
    }
    // a's first word is declared a back-pointer
    assert!(heap.mark_weak_pointer(a, a));

    let nodes = heap.classify_graph();
    let node_a = nodes.iter().find(|n| n.address == a as usize).unwrap();
    let node_b = nodes.iter().find(|n| n.address == b as usize).unwrap();

    // b is only weakly referenced: a genuine top-level block. a is still
    // held by b's untagged pointer.
    assert_eq!(node_b.top_level, TopLevelKind::Single);
    assert_eq!(node_b.inbound_strength, None);
    assert_eq!(node_a.top_level, TopLevelKind::NotTopLevel);
    assert_eq!(node_a.outbound_strength, Some(Strength::Weak));

    heap.free_checked(a, AllocClass::Scalar);
    heap.free_checked(b, AllocClass::Scalar);
}

#[test]
fn test_strong_wildcard_tag_applies_to_every_field() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let a = heap.alloc_checked(64, AllocClass::Scalar);
    let b = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe { point_at(a, b) };
    // Null slot: the whole block's pointers are declared strong
    assert!(heap.mark_strong_pointer(a, std::ptr::null()));

    let nodes = heap.classify_graph();
    let node_b = nodes.iter().find(|n| n.address == b as usize).unwrap();
    assert_eq!(node_b.inbound_strength, Some(Strength::Strong));
    assert_eq!(node_b.top_level, TopLevelKind::NotTopLevel);

    heap.free_checked(a, AllocClass::Scalar);
    heap.free_checked(b, AllocClass::Scalar);
}

#[test]
fn test_part_time_strong_follows_tracked_count() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let a = heap.alloc_checked(64, AllocClass::Scalar);
    let b = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe {
        point_at(a, b);
        point_at(b, a);
    }

    let handle = heap.mark_part_time_strong(a, a).unwrap();

    // Count is zero: the tag is demoted to weak, the cycle is broken
    let nodes = heap.classify_graph();
    let node_b = nodes.iter().find(|n| n.address == b as usize).unwrap();
    assert_eq!(node_b.top_level, TopLevelKind::Single);

    // Nonzero count restores the declared strength
    heap.increment_part_time_strong(&handle);
    let nodes = heap.classify_graph();
    let node_b = nodes.iter().find(|n| n.address == b as usize).unwrap();
    assert_eq!(node_b.top_level, TopLevelKind::Loop);
    assert_eq!(node_b.inbound_strength, Some(Strength::Strong));

    heap.decrement_part_time_strong(&handle);
    let nodes = heap.classify_graph();
    let node_b = nodes.iter().find(|n| n.address == b as usize).unwrap();
    assert_eq!(node_b.top_level, TopLevelKind::Single);

    heap.free_checked(a, AllocClass::Scalar);
    heap.free_checked(b, AllocClass::Scalar);
}

#[test]
fn test_strong_triple_cycle_is_a_loop() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let x = heap.alloc_checked(64, AllocClass::Scalar);
    let y = heap.alloc_checked(64, AllocClass::Scalar);
    let z = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe {
        point_at(x, y);
        point_at(y, z);
        point_at(z, x);
    }
    assert!(heap.mark_strong_pointer(x, x));
    assert!(heap.mark_strong_pointer(y, y));
    assert!(heap.mark_strong_pointer(z, z));

    let nodes = heap.classify_graph();
    assert_eq!(nodes.len(), 3);
    for node in &nodes {
        assert_eq!(node.top_level, TopLevelKind::Loop);
        assert_eq!(node.inbound_strength, Some(Strength::Strong));
    }

    for ptr in [x, y, z] {
        heap.free_checked(ptr, AllocClass::Scalar);
    }
}

#[test]
fn test_weak_triple_cycle_is_all_single() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let x = heap.alloc_checked(64, AllocClass::Scalar);
    let y = heap.alloc_checked(64, AllocClass::Scalar);
    let z = heap.alloc_checked(64, AllocClass::Scalar);
    unsafe {
        point_at(x, y);
        point_at(y, z);
        point_at(z, x);
    }
    assert!(heap.mark_weak_pointer(x, x));
    assert!(heap.mark_weak_pointer(y, y));
    assert!(heap.mark_weak_pointer(z, z));

    // No edge survives: every block is its own top-level leak
    let nodes = heap.classify_graph();
    assert_eq!(nodes.len(), 3);
    for node in &nodes {
        assert_eq!(node.top_level, TopLevelKind::Single);
        assert_eq!(node.inbound_strength, None);
        assert_eq!(node.outbound_strength, Some(Strength::Weak));
    }

    for ptr in [x, y, z] {
        heap.free_checked(ptr, AllocClass::Scalar);
    }
}

#[test]
fn test_hard_to_track_marking() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let ptr = heap.alloc_checked(32, AllocClass::Scalar);
    assert!(heap.mark_hard_to_track(ptr));

    let nodes = heap.classify_graph();
    assert_eq!(nodes.len(), 1);
    assert!(nodes[0].hard_to_track);
    assert_eq!(nodes[0].top_level, TopLevelKind::Single);

    heap.free_checked(ptr, AllocClass::Scalar);
}

#[test]
fn test_marking_untracked_address_fails() {
    let (heap, sink) = heap_with_sink();

    let on_stack = 0u64;
    let addr = &on_stack as *const u64 as *const u8;
    assert!(!heap.mark_weak_pointer(addr, std::ptr::null()));
    assert_eq!(sink.codes(), vec!["GH201"]);
}

#[test]
fn test_interior_pointer_resolves_to_containing_block() {
    let heap = CheckedHeap::new(HeapConfig::default());

    let ptr = heap.alloc_checked(64, AllocClass::Scalar);
    // An address in the middle of the payload still finds its block
    assert!(heap.mark_hard_to_track(unsafe { ptr.add(24) } as *const u8));

    let nodes = heap.classify_graph();
    assert!(nodes[0].hard_to_track);

    heap.free_checked(ptr, AllocClass::Scalar);
}

#[test]
fn test_ref_events_only_recorded_when_enabled() {
    let heap = CheckedHeap::new(HeapConfig::default());
    let ptr = heap.alloc_checked(32, AllocClass::Scalar);
    assert!(!heap.note_ref_event(ptr, RefEventKind::Increment, 1));
    heap.free_checked(ptr, AllocClass::Scalar);

    let heap = CheckedHeap::new(HeapConfig::default().with_ref_events(true));
    let ptr = heap.alloc_checked(32, AllocClass::Scalar);
    assert!(heap.note_ref_event(ptr, RefEventKind::Increment, 1));
    assert!(heap.note_ref_event(ptr, RefEventKind::Decrement, 0));
    heap.free_checked(ptr, AllocClass::Scalar);
}

#[test]
fn test_check_leaks_end_to_end() {
    let report_dir = std::env::temp_dir().join("guardheap-leak-test");
    std::fs::create_dir_all(&report_dir).unwrap();

    let config = HeapConfig::default().with_log_dir(report_dir.clone());
    let heap = CheckedHeap::new(config);
    let sink = Arc::new(CollectingSink::new());
    heap.set_sink(sink.clone());

    // P holds Q's address through an untagged (Unknown) pointer; neither
    // is freed.
    let p = heap.alloc_checked(16, AllocClass::Scalar);
    let q = heap.alloc_checked(8, AllocClass::Array);
    unsafe { point_at(p, q) };

    let verdict = heap.check_leaks(1000);
    assert!(!verdict.is_clean());
    let summary = verdict.summary();
    assert_eq!(summary.blocks, 2);
    assert_eq!(summary.bytes, 24);
    assert_eq!(summary.ignored_blocks, 0);
    assert_eq!(sink.codes(), vec!["GH301"]);

    // P is the actionable top-level block in both scans, Q is owned
    let v1 = heap.scan_ownership();
    let q_entry = v1.iter().find(|e| e.address == q as usize).unwrap();
    assert_eq!(q_entry.owner, Some(p as usize));
    let v2 = heap.classify_graph();
    let node_p = v2.iter().find(|n| n.address == p as usize).unwrap();
    let node_q = v2.iter().find(|n| n.address == q as usize).unwrap();
    assert_eq!(node_p.top_level, TopLevelKind::Single);
    assert_eq!(node_q.top_level, TopLevelKind::NotTopLevel);
    assert_eq!(node_q.inbound_strength, Some(Strength::Unknown));

    let report = std::fs::read_to_string(report_dir.join("guardheap-leaks.log")).unwrap();
    assert!(report.contains("ownership scan (v1)"));
    assert!(report.contains("graph scan (v2)"));
    assert!(report.contains(&format!("{:#x}", p as usize)));

    heap.free_checked(q, AllocClass::Array);
    heap.free_checked(p, AllocClass::Scalar);
    assert!(heap.check_leaks(1000).is_clean());
    heap.teardown();
}

#[test]
fn test_ignored_blocks_counted_separately_by_check_leaks() {
    let report_dir = std::env::temp_dir().join("guardheap-ignored-test");
    std::fs::create_dir_all(&report_dir).unwrap();

    let heap = CheckedHeap::new(HeapConfig::default().with_log_dir(report_dir));
    let sink = Arc::new(CollectingSink::new());
    heap.set_sink(sink.clone());

    let leaked = heap.alloc_checked(100, AllocClass::Scalar);
    let ignored = heap.alloc_checked(50, AllocClass::Scalar);
    assert!(heap.set_leak_ignored(ignored, true));

    let summary = heap.check_leaks(usize::MAX).summary();
    assert_eq!(summary.blocks, 1);
    assert_eq!(summary.bytes, 100);
    assert_eq!(summary.ignored_blocks, 1);
    assert_eq!(summary.ignored_bytes, 50);

    heap.free_checked(leaked, AllocClass::Scalar);
    heap.free_checked(ignored, AllocClass::Scalar);
    assert!(heap.check_leaks(usize::MAX).is_clean());
}
