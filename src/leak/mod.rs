//! Leak scanning and classification.
//!
//! Two passes over the live chain, both purely conservative: they read
//! pointer-sized words out of payloads and treat anything that lands
//! inside another live payload as a possible reference.
//!
//! - [`ownership`] (V1): naive containment-based ownership inference —
//!   the oldest block whose payload holds your address owns you.
//! - [`graph`] (V2): an explicit inbound-link graph with strength-aware
//!   edges and cycle-aware classification.
//!
//! Both run at quiescence (typically process shutdown) and read block
//! contents without any lock.

pub mod graph;
pub mod ownership;
pub(crate) mod report;

pub use graph::{GraphNode, TopLevelKind};
pub use ownership::OwnershipEntry;

const WORD: usize = std::mem::size_of::<usize>();

/// Scan a payload's pointer-sized words for `needle`.
///
/// # Safety
///
/// `payload..payload + size` must be readable.
pub(crate) unsafe fn payload_contains_word(payload: usize, size: usize, needle: usize) -> bool {
    let mut offset = 0;
    while offset + WORD <= size {
        if ((payload + offset) as *const usize).read_unaligned() == needle {
            return true;
        }
        offset += WORD;
    }
    false
}
