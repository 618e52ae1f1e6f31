//! The checked heap context object.
//!
//! All process-wide mutable state — registry, delayed-reclamation slot,
//! counters, trace flags — lives behind one `Arc`-shared context with an
//! explicit lifecycle, cloned cheaply wherever the host needs it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::api::config::{HeapConfig, MismatchPolicy};
use crate::api::stats::{HeapStats, LeakSummary, LeakVerdict};
use crate::core::block::{self, AllocClass, BlockHeader, Corruption, FREED_PATTERN};
use crate::core::marks::{self, PartTimeStrongHandle, Strength};
use crate::core::raw::SystemHeap;
use crate::core::registry::{DelayedBlock, Registry};
use crate::debug::events::{RefEvent, RefEventKind};
use crate::debug::stack::CallStack;
use crate::diagnostics::break_handler::BreakHandler;
use crate::diagnostics::emit::{self, DiagnosticSink};
use crate::diagnostics::kind::{
    Diagnostic, GH001, GH002, GH010, GH011, GH012, GH101, GH201, GH301, GH901,
};
use crate::leak::graph::{self, GraphNode};
use crate::leak::ownership::{self, OwnershipEntry};
use crate::leak::report;
use crate::sync::mutex::Mutex;

/// Frames to skip so captured stacks start at the caller, not inside the
/// allocator.
const ALLOC_STACK_SKIP: usize = 3;

/// Shared state behind every [`CheckedHeap`] clone.
struct HeapState {
    config: HeapConfig,
    registry: Registry,
    raw: SystemHeap,
    sink: Mutex<Option<Arc<dyn DiagnosticSink>>>,
    breaks: Mutex<Option<Arc<dyn BreakHandler>>>,

    /// Global statistics (atomics)
    total_allocated: AtomicUsize,
    peak_allocated: AtomicUsize,
    allocation_count: AtomicUsize,
    deallocation_count: AtomicUsize,
}

impl Drop for HeapState {
    fn drop(&mut self) {
        // Two-phase: detach the chain first, then release the parked
        // block. Reentrant registry calls during this window are no-ops.
        if let Some(parked) = self.registry.teardown() {
            unsafe { self.raw.dealloc(parked.base, parked.total) };
        }
    }
}

/// The checked debug heap.
///
/// Every allocation is wrapped in header/trailer metadata with guard
/// words, tracked in a global registry, scrubbed on free, and held one
/// extra generation before returning to the OS allocator. `check_leaks`
/// classifies whatever is still live.
///
/// Leak scans read block contents without locking and are meant to run
/// at quiescence (typically process shutdown); running them under
/// concurrent allocation activity is an accepted risk, not a supported
/// mode.
#[derive(Clone)]
pub struct CheckedHeap {
    state: Arc<HeapState>,
}

impl CheckedHeap {
    /// Create a checked heap with the given configuration.
    pub fn new(config: HeapConfig) -> Self {
        Self {
            state: Arc::new(HeapState {
                config,
                registry: Registry::new(),
                raw: SystemHeap::new(),
                sink: Mutex::new(None),
                breaks: Mutex::new(None),
                total_allocated: AtomicUsize::new(0),
                peak_allocated: AtomicUsize::new(0),
                allocation_count: AtomicUsize::new(0),
                deallocation_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HeapConfig {
        &self.state.config
    }

    /// Install a diagnostic sink consuming corruption and leak reports.
    pub fn set_sink(&self, sink: Arc<dyn DiagnosticSink>) {
        *self.state.sink.lock() = Some(sink);
    }

    /// Install the interactive-break collaborator.
    pub fn set_break_handler(&self, handler: Arc<dyn BreakHandler>) {
        *self.state.breaks.lock() = Some(handler);
    }

    // =========================================================================
    // Allocator entry points
    // =========================================================================

    /// Allocate a checked block and return its payload pointer.
    ///
    /// Returns null when the size cannot be represented once metadata and
    /// alignment are added. OS heap exhaustion is deliberately fatal: the
    /// process aborts after a diagnostic, trading a clean dump for a null
    /// pointer cascading through the host.
    pub fn alloc_checked(&self, size: usize, class: AllocClass) -> *mut u8 {
        let Some(layout) = block::layout_for(size) else {
            self.report(&GH001, &format!("requested {} bytes", size));
            return std::ptr::null_mut();
        };

        let base = self.state.raw.alloc(layout.total);
        if base.is_null() {
            self.report(
                &GH002,
                &format!("requested {} bytes ({} with metadata)", size, layout.total),
            );
            std::process::abort();
        }

        let index = self.state.registry.next_index();
        let stack = if self.state.config.capture_stacks {
            Box::into_raw(Box::new(CallStack::capture(
                self.state.config.max_stack_depth,
                ALLOC_STACK_SKIP,
            )))
        } else {
            std::ptr::null_mut()
        };

        // SAFETY: base is a fresh region of layout.total aligned bytes.
        let header = unsafe {
            block::init_block(
                base,
                size,
                &layout,
                class,
                self.state.config.section,
                index,
                stack,
            )
        };
        // SAFETY: header was just initialized and is not yet chained.
        if !unsafe { self.state.registry.insert_head(header) } {
            self.report(&GH101, &format!("block {:#x}", base as usize));
        }

        self.record_alloc(size);
        // SAFETY: header points into the fresh region.
        unsafe { BlockHeader::payload(header) }
    }

    /// Validate and free a checked block.
    ///
    /// On corruption the free is aborted for this block (reported, soft
    /// failure) and false is returned. The block's memory is scrubbed and
    /// parked in the delayed-reclamation slot; whatever previously
    /// occupied the slot goes back to the OS allocator.
    pub fn free_checked(&self, ptr: *mut u8, class: AllocClass) -> bool {
        if ptr.is_null() {
            return false;
        }
        // SAFETY: caller contract - ptr came from alloc_checked.
        let header = unsafe { BlockHeader::from_payload(ptr) };
        if let Err(corruption) = unsafe { block::validate_block(header, &self.state.registry) } {
            self.report_corruption(corruption);
            return false;
        }

        // SAFETY: the block just validated as live and intact.
        unsafe {
            let actual = AllocClass::from_bits((*header).class_bits);
            if actual != Some(class) {
                let context = format!(
                    "block {:#x} allocated as {}, freed as {}",
                    ptr as usize,
                    actual.map_or("?", |c| c.name()),
                    class.name(),
                );
                match self.state.config.class_mismatch {
                    MismatchPolicy::Warn => self.report(&GH011, &context),
                    MismatchPolicy::Fail => {
                        self.report(&GH012, &context);
                        return false;
                    }
                }
            }

            let size = (*header).size;
            let Some(layout) = block::layout_for(size) else {
                // Cannot happen for a block that validated; bail rather
                // than guess at the region size.
                self.report(&GH901, &format!("block {:#x} layout", ptr as usize));
                return false;
            };

            (*header).deallocated = 1;
            (*BlockHeader::trailer(header)).deallocated = 1;
            self.state.registry.remove(header);
            free_side_data(header);

            // Scrub payload and filler; header and trailer keep their
            // metadata so a double free reports precisely.
            let base = header as *mut u8;
            std::ptr::write_bytes(
                base.add(layout.payload_offset),
                FREED_PATTERN,
                layout.trailer_offset - layout.payload_offset,
            );

            if let Some(evicted) = self.state.registry.swap_delayed(DelayedBlock {
                base,
                total: layout.total,
            }) {
                self.state.raw.dealloc(evicted.base, evicted.total);
            }

            self.record_dealloc(size);
        }
        true
    }

    /// Resize a checked block: allocate new, copy `min(old, new)` bytes,
    /// free old. Null (old block untouched) when the new allocation
    /// fails or the old block does not validate.
    pub fn resize_checked(&self, ptr: *mut u8, new_size: usize, class: AllocClass) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc_checked(new_size, class);
        }
        // SAFETY: caller contract - ptr came from alloc_checked.
        let header = unsafe { BlockHeader::from_payload(ptr) };
        if let Err(corruption) = unsafe { block::validate_block(header, &self.state.registry) } {
            self.report_corruption(corruption);
            return std::ptr::null_mut();
        }
        let old_size = unsafe { (*header).size };

        let new_ptr = self.alloc_checked(new_size, class);
        if new_ptr.is_null() {
            return std::ptr::null_mut();
        }
        // SAFETY: both payloads are live and at least min(old, new) long.
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size));
        }
        self.free_checked(ptr, class);
        new_ptr
    }

    /// Run the full validation sequence against a live payload pointer.
    ///
    /// Failures are reported (and may break) exactly as they would be
    /// during a free; the result is returned so callers can continue
    /// best-effort.
    pub fn validate(&self, ptr: *const u8) -> Result<(), Corruption> {
        // SAFETY: caller contract - ptr came from alloc_checked.
        let header = unsafe { BlockHeader::from_payload(ptr) };
        let result = unsafe { block::validate_block(header, &self.state.registry) };
        if let Err(corruption) = result {
            self.report_corruption(corruption);
        }
        result
    }

    /// Toggle the ignore-leak bit on a block, mirrored into its trailer.
    pub fn set_leak_ignored(&self, ptr: *const u8, ignore: bool) -> bool {
        // SAFETY: caller contract - ptr came from alloc_checked.
        let header = unsafe { BlockHeader::from_payload(ptr) };
        if let Err(corruption) = unsafe { block::validate_block(header, &self.state.registry) } {
            self.report_corruption(corruption);
            return false;
        }
        unsafe {
            let header = header as *mut BlockHeader;
            (*header).class_bits = block::set_ignored((*header).class_bits, ignore);
            (*BlockHeader::trailer(header)).class_bits = (*header).class_bits;
        }
        true
    }

    // =========================================================================
    // Pointer-strength annotations
    // =========================================================================

    /// Declare the pointer field at `slot` inside `owner`'s block as a
    /// weak (non-owning) reference. Null `slot` tags the whole block.
    ///
    /// Returns false when `owner` does not resolve to a tracked block.
    pub fn mark_weak_pointer(&self, owner: *const u8, slot: *const u8) -> bool {
        self.append_mark(owner, slot, Strength::Weak, 0)
    }

    /// Declare the pointer field at `slot` inside `owner`'s block as a
    /// strong (owning) reference. Null `slot` tags the whole block.
    pub fn mark_strong_pointer(&self, owner: *const u8, slot: *const u8) -> bool {
        self.append_mark(owner, slot, Strength::Strong, 1)
    }

    /// Declare a part-time-strong reference: strong only while its
    /// tracked count is nonzero (it starts at zero). The returned handle
    /// mirrors the external counter onto the tag.
    pub fn mark_part_time_strong(
        &self,
        owner: *const u8,
        slot: *const u8,
    ) -> Option<PartTimeStrongHandle> {
        let header = self.resolve_marked_owner(owner)?;
        // SAFETY: header resolved to a live block just now.
        let tag_index = unsafe { marks::append_tag(header, slot_of(slot), Strength::Strong, 0) };
        Some(PartTimeStrongHandle { header, tag_index })
    }

    /// Note that the external counter behind a part-time-strong
    /// reference was incremented.
    pub fn increment_part_time_strong(&self, handle: &PartTimeStrongHandle) {
        // SAFETY: caller contract - the tagged block is still live.
        unsafe { marks::adjust_tracked(handle, 1) };
    }

    /// Note that the external counter behind a part-time-strong
    /// reference was decremented.
    pub fn decrement_part_time_strong(&self, handle: &PartTimeStrongHandle) {
        // SAFETY: caller contract - the tagged block is still live.
        unsafe { marks::adjust_tracked(handle, -1) };
    }

    /// Mark the block containing `addr` as hard to track, keeping it out
    /// of the precise branches of the V2 report.
    pub fn mark_hard_to_track(&self, addr: *const u8) -> bool {
        let Some(header) = self.resolve_marked_owner(addr) else {
            return false;
        };
        // SAFETY: header resolved to a live block just now.
        unsafe { (*header).hard_to_track = 1 };
        true
    }

    /// Record an external reference-count change on the object living at
    /// `ptr`. No-op unless `log_ref_events` is enabled.
    pub fn note_ref_event(&self, ptr: *const u8, kind: RefEventKind, count_after: u32) -> bool {
        if !self.state.config.log_ref_events {
            return false;
        }
        let Some(header) = self.resolve_marked_owner(ptr) else {
            return false;
        };
        let stack = self
            .state
            .config
            .capture_stacks
            .then(|| CallStack::capture(self.state.config.max_stack_depth, ALLOC_STACK_SKIP));
        // SAFETY: header resolved to a live block; per-block event lists
        // are assumed uncontended.
        unsafe {
            if (*header).ref_events.is_null() {
                (*header).ref_events = Box::into_raw(Box::new(Vec::new()));
            }
            (*(*header).ref_events).push(RefEvent {
                kind,
                count_after,
                stack,
            });
        }
        true
    }

    // =========================================================================
    // Leak scanning
    // =========================================================================

    /// Run the V1 ownership heuristic over the live chain.
    pub fn scan_ownership(&self) -> Vec<OwnershipEntry> {
        ownership::scan(&self.state.registry.snapshot())
    }

    /// Run the V2 graph classifier over the live chain.
    pub fn classify_graph(&self) -> Vec<GraphNode> {
        graph::scan(&self.state.registry.snapshot())
    }

    /// The process-shutdown leak check: V1 then V2 over one snapshot,
    /// reports dumped, aggregate counts returned.
    ///
    /// In stress mode, non-ignored leaked bytes above `summary_threshold`
    /// (or the configured break threshold, whichever is lower) break
    /// unconditionally; otherwise the break handler is prompted unless an
    /// attached sink is consuming the stream.
    pub fn check_leaks(&self, summary_threshold: usize) -> LeakVerdict {
        let snapshot = self.state.registry.snapshot();

        let mut summary = LeakSummary::default();
        for &header in &snapshot {
            // SAFETY: snapshot entries are live chain members.
            unsafe {
                let size = (*header).size;
                if block::is_ignored((*header).class_bits) {
                    summary.ignored_blocks += 1;
                    summary.ignored_bytes += size;
                } else {
                    summary.blocks += 1;
                    summary.bytes += size;
                }
            }
        }
        if summary.blocks == 0 {
            return LeakVerdict::Clean(summary);
        }

        let v1 = ownership::scan(&snapshot);
        let v2 = graph::scan(&snapshot);
        let mut out = self.report_writer();
        let _ = report::dump_ownership(&v1, out.as_mut(), self.state.config.hex_dumps);
        let _ = report::dump_graph(&v2, out.as_mut(), self.state.config.hex_dumps);
        let _ = out.flush();

        let context = format!(
            "{} blocks / {} bytes live, {} blocks / {} bytes ignored",
            summary.blocks, summary.bytes, summary.ignored_blocks, summary.ignored_bytes,
        );
        self.report(&GH301, &context);

        if self.state.config.stress_mode {
            if summary.bytes > summary_threshold.min(self.state.config.leak_break_threshold) {
                self.break_now(&context);
            }
        } else if !self.sink_attached() && self.prompt_break(&context) {
            self.break_now(&context);
        }

        LeakVerdict::LeaksDetected(summary)
    }

    // =========================================================================
    // Introspection and lifecycle
    // =========================================================================

    /// Get current statistics.
    pub fn stats(&self) -> HeapStats {
        let total = self.state.total_allocated.load(Ordering::Relaxed);
        HeapStats {
            total_allocated: total,
            peak_allocated: self.state.peak_allocated.load(Ordering::Relaxed),
            allocation_count: self.state.allocation_count.load(Ordering::Relaxed) as u64,
            deallocation_count: self.state.deallocation_count.load(Ordering::Relaxed) as u64,
            live_blocks: self.state.registry.live_count(),
            overhead_bytes: self.state.raw.allocated_bytes().saturating_sub(total),
        }
    }

    /// Number of blocks currently tracked.
    pub fn live_blocks(&self) -> usize {
        self.state.registry.live_count()
    }

    /// Walk the registry chain and confirm it is one circle through the
    /// sentinel with consistent back-links.
    pub fn chain_is_consistent(&self) -> bool {
        self.state.registry.chain_is_consistent()
    }

    /// Explicit shutdown: detach the registry chain, then release the
    /// delayed-reclamation slot. Idempotent; later heap calls degrade to
    /// no-ops instead of touching freed state.
    pub fn teardown(&self) {
        if let Some(parked) = self.state.registry.teardown() {
            // SAFETY: the parked block was allocated by self.state.raw
            // and is owned solely by the slot.
            unsafe { self.state.raw.dealloc(parked.base, parked.total) };
        }
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn report(&self, diag: &Diagnostic, context: &str) {
        let sink = self.state.sink.lock().clone();
        match sink {
            Some(sink) => sink.report(diag, context),
            None => emit::emit_with_context(diag, context),
        }
    }

    fn sink_attached(&self) -> bool {
        self.state
            .sink
            .lock()
            .as_ref()
            .is_some_and(|s| s.attached())
    }

    fn prompt_break(&self, message: &str) -> bool {
        let handler = self.state.breaks.lock().clone();
        handler.map_or(false, |h| h.prompt_break(message))
    }

    fn break_now(&self, message: &str) {
        let handler = self.state.breaks.lock().clone();
        if let Some(handler) = handler {
            handler.break_now(message);
        }
    }

    fn report_corruption(&self, corruption: Corruption) {
        let context = corruption.to_string();
        self.report(&GH010, &context);
        if self.state.config.stress_mode {
            // Unattended runs break unconditionally; nobody is there to
            // answer a prompt.
            self.break_now(&context);
        } else if !self.sink_attached() && self.prompt_break(&context) {
            self.break_now(&context);
        }
    }

    fn resolve_marked_owner(&self, addr: *const u8) -> Option<*mut BlockHeader> {
        let resolved = marks::resolve_owner(
            &self.state.registry,
            addr as usize,
            self.state.config.owner_scan_limit,
        );
        if resolved.is_none() {
            self.report(&GH201, &format!("address {:#x}", addr as usize));
        }
        resolved
    }

    fn append_mark(
        &self,
        owner: *const u8,
        slot: *const u8,
        strength: Strength,
        tracked: u32,
    ) -> bool {
        let Some(header) = self.resolve_marked_owner(owner) else {
            return false;
        };
        // SAFETY: header resolved to a live block just now.
        unsafe { marks::append_tag(header, slot_of(slot), strength, tracked) };
        true
    }

    fn report_writer(&self) -> Box<dyn std::io::Write> {
        if let Some(dir) = &self.state.config.log_dir {
            if let Ok(file) = std::fs::File::create(dir.join("guardheap-leaks.log")) {
                return Box::new(file);
            }
        }
        Box::new(std::io::stderr())
    }

    fn record_alloc(&self, size: usize) {
        self.state.allocation_count.fetch_add(1, Ordering::Relaxed);
        let new_total = self.state.total_allocated.fetch_add(size, Ordering::Relaxed) + size;

        // Update peak if needed
        let mut peak = self.state.peak_allocated.load(Ordering::Relaxed);
        while new_total > peak {
            match self.state.peak_allocated.compare_exchange_weak(
                peak,
                new_total,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    fn record_dealloc(&self, size: usize) {
        self.state.deallocation_count.fetch_add(1, Ordering::Relaxed);
        self.state.total_allocated.fetch_sub(size, Ordering::Relaxed);
    }
}

impl Default for CheckedHeap {
    fn default() -> Self {
        Self::new(HeapConfig::default())
    }
}

fn slot_of(slot: *const u8) -> Option<usize> {
    if slot.is_null() {
        None
    } else {
        Some(slot as usize)
    }
}

/// Release a block's owned side data (stack, ref events, tags).
///
/// # Safety
///
/// `header` must point to a live block; the side pointers must either be
/// null or come from `Box::into_raw`.
unsafe fn free_side_data(header: *mut BlockHeader) {
    if !(*header).stack.is_null() {
        drop(Box::from_raw((*header).stack));
        (*header).stack = std::ptr::null_mut();
    }
    if !(*header).ref_events.is_null() {
        drop(Box::from_raw((*header).ref_events));
        (*header).ref_events = std::ptr::null_mut();
    }
    if !(*header).tags.is_null() {
        drop(Box::from_raw((*header).tags));
        (*header).tags = std::ptr::null_mut();
    }
}
