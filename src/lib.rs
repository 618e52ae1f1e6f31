//! # guardheap
//!
//! A checked heap allocator with an integrated leak and corruption
//! detector, built for long-running native applications that manage raw
//! allocations directly.
//!
//! ## Features
//!
//! - Guarded block format: header + trailer with address-derived guard
//!   words, junk fill on alloc, scrub fill on free
//! - Thread-safe block registry with chain-linkage verification
//! - Delayed reclamation (one-slot parking) to catch use-after-free
//! - Pointer-strength annotations (weak / strong / part-time-strong)
//! - V1 ownership heuristic: first-containing-older-block scan
//! - V2 graph classifier: Loop / Single / NotTopLevel with bucketed
//!   reports ordered most-suspicious-last
//! - Optional per-allocation call stacks and ref-count event traces
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardheap::{AllocClass, CheckedHeap, HeapConfig};
//!
//! let heap = CheckedHeap::new(HeapConfig::default());
//!
//! let p = heap.alloc_checked(128, AllocClass::Scalar);
//! // ... use p ...
//! heap.free_checked(p, AllocClass::Scalar);
//!
//! // At shutdown:
//! let verdict = heap.check_leaks(usize::MAX);
//! assert!(verdict.is_clean());
//! heap.teardown();
//! ```

#[allow(dead_code)]
pub mod api;
#[allow(dead_code)]
pub mod debug;
#[allow(dead_code)]
pub mod diagnostics;
pub mod leak;

#[allow(dead_code)]
mod core;
#[allow(dead_code)]
mod sync;
#[allow(dead_code)]
mod util;

// Re-export public API at crate root for convenience
pub use api::config::{HeapConfig, MismatchPolicy};
pub use api::heap::CheckedHeap;
pub use api::stats::{HeapStats, LeakSummary, LeakVerdict};

// Block format
pub use crate::core::block::{
    guard_word_for, AllocClass, CorruptKind, Corruption, BLOCK_ALIGN, FILLER_PATTERN,
    FREED_PATTERN, GUARD_WORDS, UNINIT_PATTERN,
};

// Pointer-strength annotations
pub use crate::core::marks::{PartTimeStrongHandle, Strength};

// Leak scan results
pub use leak::graph::{GraphNode, TopLevelKind};
pub use leak::ownership::OwnershipEntry;

// Debug traces
pub use debug::events::{RefEvent, RefEventKind};
pub use debug::stack::{CallStack, ResolvedFrame};

// Diagnostics - core types and predefined codes
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink};
pub use diagnostics::{set_strict_mode, StrictMode, StrictModeGuard};
pub use diagnostics::{BreakHandler, NoBreak, RecordingBreakHandler};
pub use diagnostics::{GH001, GH002, GH010, GH011, GH012, GH101, GH201, GH301, GH901};
