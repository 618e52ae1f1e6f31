//! Allocation-site debugging support.
//!
//! Call-stack capture for allocations and the reference-count event
//! trace attached to checked blocks.

pub mod events;
pub mod stack;

pub use events::{RefEvent, RefEventKind};
pub use stack::{CallStack, ResolvedFrame};
