//! Global allocation registry.
//!
//! All live checked blocks form one circular chain through a sentinel.
//! Rather than intrusive raw prev/next pointers, the chain lives in a
//! growable slot table: slot 0 is the sentinel, every other slot carries
//! the linkage plus a generation counter, and each block's header stores
//! its `(slot, generation)` pair. Linkage verification goes through the
//! table, so a corrupted header cannot send the verifier chasing wild
//! pointers.
//!
//! The registry also holds the one-slot delayed-reclamation buffer: the
//! most recently freed block is kept unreleased until the next free
//! evicts it, giving stale-pointer reads one extra window in which they
//! hit scrub patterns instead of recycled memory.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::block::BlockHeader;
use crate::sync::mutex::Mutex;

const SENTINEL: u32 = 0;

struct Slot {
    prev: u32,
    next: u32,
    generation: u32,
    header: *mut BlockHeader,
}

struct Chain {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Chain {
    fn new() -> Self {
        Chain {
            slots: vec![Slot {
                prev: SENTINEL,
                next: SENTINEL,
                generation: 0,
                header: std::ptr::null_mut(),
            }],
            free: Vec::new(),
            live: 0,
        }
    }

    fn grab_slot(&mut self) -> u32 {
        match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(Slot {
                    prev: SENTINEL,
                    next: SENTINEL,
                    generation: 0,
                    header: std::ptr::null_mut(),
                });
                (self.slots.len() - 1) as u32
            }
        }
    }
}

/// A freed block parked in the delayed-reclamation slot.
pub(crate) struct DelayedBlock {
    pub base: *mut u8,
    pub total: usize,
}

/// The process-wide registry of live checked blocks.
///
/// The mutex guards only the chain linkage; block contents are always
/// read outside it. After `teardown` the chain cell holds `None` and
/// every operation degrades to a no-op, so reentrant calls during
/// shutdown cannot deadlock or touch freed state.
pub(crate) struct Registry {
    chain: Mutex<Option<Chain>>,
    delayed: Mutex<Option<DelayedBlock>>,
    next_index: AtomicU64,
}

// Safety: raw header pointers in the table are only dereferenced by the
// allocator paths that own the referenced blocks; the table itself is
// mutex-guarded.
unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

impl Registry {
    pub fn new() -> Self {
        Registry {
            chain: Mutex::new(Some(Chain::new())),
            delayed: Mutex::new(None),
            next_index: AtomicU64::new(0),
        }
    }

    /// Next allocation sequence number (strictly increasing).
    pub fn next_index(&self) -> u64 {
        self.next_index.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert a block at the head of the chain (newest first).
    ///
    /// Returns false after teardown; the block then goes untracked.
    ///
    /// # Safety
    ///
    /// `header` must point to an initialized block header not currently
    /// in the chain.
    pub unsafe fn insert_head(&self, header: *mut BlockHeader) -> bool {
        let mut guard = self.chain.lock();
        let Some(chain) = guard.as_mut() else {
            return false;
        };
        let idx = chain.grab_slot();
        let first = chain.slots[SENTINEL as usize].next;

        let generation = chain.slots[idx as usize].generation;
        chain.slots[idx as usize].prev = SENTINEL;
        chain.slots[idx as usize].next = first;
        chain.slots[idx as usize].header = header;
        chain.slots[first as usize].prev = idx;
        chain.slots[SENTINEL as usize].next = idx;
        chain.live += 1;

        (*header).slot = idx;
        (*header).slot_generation = generation;
        true
    }

    /// Unlink a block from the chain.
    ///
    /// # Safety
    ///
    /// `header` must point to a block previously inserted and not yet
    /// removed.
    pub unsafe fn remove(&self, header: *mut BlockHeader) -> bool {
        let mut guard = self.chain.lock();
        let Some(chain) = guard.as_mut() else {
            return false;
        };
        let idx = (*header).slot;
        if !slot_matches(chain, idx, (*header).slot_generation, header) {
            return false;
        }
        let slot = &chain.slots[idx as usize];
        let (prev, next) = (slot.prev, slot.next);
        chain.slots[prev as usize].next = next;
        chain.slots[next as usize].prev = prev;

        let slot = &mut chain.slots[idx as usize];
        slot.header = std::ptr::null_mut();
        slot.generation = slot.generation.wrapping_add(1);
        chain.free.push(idx);
        chain.live -= 1;
        true
    }

    /// Verify the chain linkage for one block: the slot table must know
    /// this header, and its neighbors must link back to it.
    ///
    /// Takes the registry lock; this is the only validation check that
    /// touches shared state. A torn-down registry verifies trivially.
    pub fn verify_links(&self, header: *const BlockHeader) -> bool {
        let guard = self.chain.lock();
        let Some(chain) = guard.as_ref() else {
            return true;
        };
        // Reading slot/generation out of the header is safe for any
        // still-allocated block; garbage values simply fail the match.
        let (idx, generation) = unsafe { ((*header).slot, (*header).slot_generation) };
        if !slot_matches(chain, idx, generation, header as *mut BlockHeader) {
            return false;
        }
        let slot = &chain.slots[idx as usize];
        chain.slots[slot.prev as usize].next == idx && chain.slots[slot.next as usize].prev == idx
    }

    /// Snapshot the chain newest-to-oldest.
    ///
    /// The snapshot is taken under the lock; the caller reads block
    /// contents afterwards without it (quiescence is assumed, not
    /// enforced).
    pub fn snapshot(&self) -> Vec<*mut BlockHeader> {
        let guard = self.chain.lock();
        let Some(chain) = guard.as_ref() else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(chain.live);
        let mut idx = chain.slots[SENTINEL as usize].next;
        while idx != SENTINEL {
            let slot = &chain.slots[idx as usize];
            out.push(slot.header);
            idx = slot.next;
        }
        out
    }

    /// Number of live tracked blocks.
    pub fn live_count(&self) -> usize {
        self.chain.lock().as_ref().map_or(0, |c| c.live)
    }

    /// Walk the whole chain and confirm it is a single circle through the
    /// sentinel with consistent back-links.
    pub fn chain_is_consistent(&self) -> bool {
        let guard = self.chain.lock();
        let Some(chain) = guard.as_ref() else {
            return true;
        };
        let mut seen = 0usize;
        let mut prev = SENTINEL;
        let mut idx = chain.slots[SENTINEL as usize].next;
        while idx != SENTINEL {
            if seen > chain.live {
                return false;
            }
            let slot = &chain.slots[idx as usize];
            if slot.prev != prev || slot.header.is_null() {
                return false;
            }
            seen += 1;
            prev = idx;
            idx = slot.next;
        }
        chain.slots[SENTINEL as usize].prev == prev && seen == chain.live
    }

    /// Park a freed block, handing back whatever previously occupied the
    /// delayed-reclamation slot.
    pub fn swap_delayed(&self, block: DelayedBlock) -> Option<DelayedBlock> {
        self.delayed.lock().replace(block)
    }

    /// Drain the delayed-reclamation slot.
    pub fn take_delayed(&self) -> Option<DelayedBlock> {
        self.delayed.lock().take()
    }

    /// Two-phase shutdown: detach the chain from the shared cell first,
    /// then drop it outside the lock. Returns the parked delayed block
    /// for the caller to release.
    pub fn teardown(&self) -> Option<DelayedBlock> {
        let chain = self.chain.lock().take();
        drop(chain);
        self.take_delayed()
    }
}

fn slot_matches(chain: &Chain, idx: u32, generation: u32, header: *mut BlockHeader) -> bool {
    let Some(slot) = chain.slots.get(idx as usize) else {
        return false;
    };
    idx != SENTINEL && slot.generation == generation && slot.header == header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{init_block, layout_for, AllocClass, BlockHeader};
    use std::alloc::{alloc, dealloc, Layout};

    unsafe fn make_block(registry: &Registry, size: usize) -> (*mut BlockHeader, Layout) {
        let layout = layout_for(size).unwrap();
        let mem_layout = Layout::from_size_align(layout.total, 16).unwrap();
        let base = alloc(mem_layout);
        assert!(!base.is_null());
        let index = registry.next_index();
        let header = init_block(
            base,
            size,
            &layout,
            AllocClass::Scalar,
            1,
            index,
            std::ptr::null_mut(),
        );
        (header, mem_layout)
    }

    #[test]
    fn test_insert_remove_round_trip() {
        let registry = Registry::new();
        unsafe {
            let (a, la) = make_block(&registry, 32);
            let (b, lb) = make_block(&registry, 32);
            assert!(registry.insert_head(a));
            assert!(registry.insert_head(b));
            assert_eq!(registry.live_count(), 2);
            assert!(registry.chain_is_consistent());

            // Newest first
            let snap = registry.snapshot();
            assert_eq!(snap, vec![b, a]);

            assert!(registry.verify_links(a));
            assert!(registry.remove(a));
            assert!(!registry.verify_links(a));
            assert!(registry.chain_is_consistent());
            assert_eq!(registry.snapshot(), vec![b]);

            assert!(registry.remove(b));
            assert_eq!(registry.live_count(), 0);

            dealloc(a as *mut u8, la);
            dealloc(b as *mut u8, lb);
        }
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let registry = Registry::new();
        unsafe {
            let (a, la) = make_block(&registry, 16);
            registry.insert_head(a);
            let stale_generation = (*a).slot_generation;
            registry.remove(a);

            let (b, lb) = make_block(&registry, 16);
            registry.insert_head(b);
            // Slot is reused, generation moved on
            assert_eq!((*b).slot, 1);
            assert_ne!((*b).slot_generation, stale_generation);
            assert!(!registry.remove(a));
            registry.remove(b);

            dealloc(a as *mut u8, la);
            dealloc(b as *mut u8, lb);
        }
    }

    #[test]
    fn test_indices_strictly_increase() {
        let registry = Registry::new();
        let a = registry.next_index();
        let b = registry.next_index();
        assert!(b > a);
    }

    #[test]
    fn test_teardown_makes_operations_noop() {
        let registry = Registry::new();
        unsafe {
            let (a, la) = make_block(&registry, 16);
            assert!(registry.teardown().is_none());
            assert!(!registry.insert_head(a));
            assert!(registry.snapshot().is_empty());
            assert_eq!(registry.live_count(), 0);
            dealloc(a as *mut u8, la);
        }
    }
}
