//! Reference-count event trace.
//!
//! When enabled, every external add-ref/release on an object living in a
//! checked block is recorded on the block, each event with its own call
//! stack. The list is dumped alongside the block in top-level leak
//! reports, which is usually enough to see who forgot the final release.

use crate::debug::stack::CallStack;

/// The direction of a reference-count change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefEventKind {
    /// The external reference count was incremented.
    Increment,
    /// The external reference count was decremented.
    Decrement,
}

/// One recorded reference-count change.
#[derive(Debug, Clone)]
pub struct RefEvent {
    /// Increment or decrement.
    pub kind: RefEventKind,
    /// The reference count after the change, as reported by the caller.
    pub count_after: u32,
    /// Call stack of the change, if stack capture was enabled.
    pub stack: Option<CallStack>,
}
