//! Pointer-strength annotation store.
//!
//! Callers declare how much a specific outgoing pointer field means:
//! `Weak` (incidental or back-pointer), `Strong` (real ownership), or
//! part-time-strong (strong only while an external counter is nonzero).
//! The V2 leak classifier consults these tags when it turns a scanned
//! pointer word into a graph edge; anything untagged is `Unknown`.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::block::BlockHeader;
use crate::core::registry::Registry;

/// Declared strength of a pointer relationship.
///
/// Ordering matters: edges of strength `Weak` or below are never recorded
/// in the inbound-link graph, while `Unknown` and `Strong` are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    /// Known not to express ownership.
    Weak,
    /// No annotation; treated conservatively as a possible owner.
    Unknown,
    /// Declared ownership.
    Strong,
}

impl Strength {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Strength::Weak => "weak",
            Strength::Unknown => "unknown",
            Strength::Strong => "strong",
        }
    }
}

/// One caller-declared tag on an owning block.
///
/// `slot` is the address of the tagged pointer field, or `None` for a
/// wildcard covering every field in the block. A `Strong` tag whose
/// tracked count is zero is demoted to `Weak` at scan time.
pub(crate) struct StrengthTag {
    pub slot: Option<usize>,
    pub strength: Strength,
    pub tracked: AtomicU32,
}

/// The per-block tag list hung off a block header.
pub(crate) type TagList = Vec<StrengthTag>;

/// Opaque context for a part-time-strong tag, handed back to the caller
/// so the external counter's changes can be mirrored onto the tag.
pub struct PartTimeStrongHandle {
    pub(crate) header: *mut BlockHeader,
    pub(crate) tag_index: usize,
}

/// How many chain entries the owner search will look at before giving up.
/// Static and other non-heap owners are not supported; a miss just means
/// "untracked".
pub(crate) const DEFAULT_OWNER_SCAN_LIMIT: usize = 256;

/// Resolve an address to the live block containing it.
///
/// Exact payload-start matches are preferred; a second bounded pass
/// accepts any address inside a block's payload range. Both passes walk
/// the chain newest-to-oldest and stop after `limit` blocks.
pub(crate) fn resolve_owner(
    registry: &Registry,
    addr: usize,
    limit: usize,
) -> Option<*mut BlockHeader> {
    let snapshot = registry.snapshot();
    let bounded = &snapshot[..snapshot.len().min(limit)];

    for &header in bounded {
        // Safety: snapshot entries are live chain members.
        let start = unsafe { BlockHeader::payload(header) } as usize;
        if start == addr {
            return Some(header);
        }
    }
    for &header in bounded {
        let start = unsafe { BlockHeader::payload(header) } as usize;
        let size = unsafe { (*header).size };
        if addr >= start && addr < start + size {
            return Some(header);
        }
    }
    None
}

/// Append a tag to a block's list, creating the list on first use.
///
/// Returns the tag's index, stable for the lifetime of the block (tags
/// are only ever appended).
///
/// # Safety
///
/// `header` must point to a live block; per-block tag mutation is
/// assumed uncontended with other operations on the same block.
pub(crate) unsafe fn append_tag(
    header: *mut BlockHeader,
    slot: Option<usize>,
    strength: Strength,
    tracked: u32,
) -> usize {
    if (*header).tags.is_null() {
        (*header).tags = Box::into_raw(Box::new(TagList::new()));
    }
    let tags = &mut *(*header).tags;
    tags.push(StrengthTag {
        slot,
        strength,
        tracked: AtomicU32::new(tracked),
    });
    tags.len() - 1
}

/// Effective strength of the pointer field at `slot_addr` on a source
/// block: exact tag first, wildcard second, `Unknown` if untagged, with
/// the part-time-strong demotion applied.
///
/// # Safety
///
/// `header` must point to a live block.
pub(crate) unsafe fn effective_strength(header: *const BlockHeader, slot_addr: usize) -> Strength {
    let tags = (*header).tags;
    if tags.is_null() {
        return Strength::Unknown;
    }
    let tags = &*tags;
    let tag = tags
        .iter()
        .find(|t| t.slot == Some(slot_addr))
        .or_else(|| tags.iter().find(|t| t.slot.is_none()));
    match tag {
        Some(tag) => {
            if tag.strength == Strength::Strong && tag.tracked.load(Ordering::Relaxed) == 0 {
                Strength::Weak
            } else {
                tag.strength
            }
        }
        None => Strength::Unknown,
    }
}

/// Adjust a part-time-strong tag's tracked count by `delta`.
///
/// # Safety
///
/// The handle's block must still be live.
pub(crate) unsafe fn adjust_tracked(handle: &PartTimeStrongHandle, delta: i32) {
    let tags = (*handle.header).tags;
    if tags.is_null() {
        return;
    }
    if let Some(tag) = (&*tags).get(handle.tag_index) {
        if delta >= 0 {
            tag.tracked.fetch_add(delta as u32, Ordering::Relaxed);
        } else {
            tag.tracked.fetch_sub((-delta) as u32, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_ordering() {
        assert!(Strength::Weak < Strength::Unknown);
        assert!(Strength::Unknown < Strength::Strong);
    }
}
