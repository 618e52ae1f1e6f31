//! Checked block format and guard validation.
//!
//! Every allocation is wrapped in a contiguous region:
//!
//! ```text
//! [ BlockHeader | payload (size bytes) | filler | BlockTrailer ]
//! ```
//!
//! The header carries identity and bookkeeping, the trailer mirrors the
//! validation-relevant header fields to catch overruns past the payload,
//! and both carry guard words whose expected value is a pure function of
//! each word's own address. Freed payloads are scrubbed with a fixed
//! pattern and reads of never-written memory surface as the junk fill.

use std::mem;

use crate::core::marks::TagList;
use crate::core::registry::Registry;
use crate::debug::events::RefEvent;
use crate::debug::stack::CallStack;
use crate::util::layout::{align_up, align_up_checked};

/// Alignment of payloads and of the whole block region.
pub const BLOCK_ALIGN: usize = 16;

/// Number of guard words in the header and again in the trailer.
pub const GUARD_WORDS: usize = 4;

/// Pattern written over fresh payload bytes (reads of uninitialized
/// memory surface as this).
pub const UNINIT_PATTERN: u8 = 0xAB;

/// Pattern written over freed payload bytes.
pub const FREED_PATTERN: u8 = 0xCD;

/// Pattern filling the gap between payload end and trailer start.
pub const FILLER_PATTERN: u8 = 0xFD;

const HEADER_SIGNATURE: u64 = 0x4855_4752_4448_4541;
const TRAILER_SIGNATURE: u64 = 0x4C52_5444_4844_5247;

/// Bit in `class_bits` marking a block as ignored by leak scans.
const IGNORE_LEAK_BIT: u8 = 0x80;

/// Call-site discipline of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AllocClass {
    /// Single-object allocation.
    Scalar = 0,
    /// Array allocation.
    Array = 1,
    /// Untyped flat buffer.
    Flat = 2,
}

impl AllocClass {
    pub(crate) fn from_bits(bits: u8) -> Option<AllocClass> {
        match bits & !IGNORE_LEAK_BIT {
            0 => Some(AllocClass::Scalar),
            1 => Some(AllocClass::Array),
            2 => Some(AllocClass::Flat),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            AllocClass::Scalar => "scalar",
            AllocClass::Array => "array",
            AllocClass::Flat => "flat",
        }
    }
}

pub(crate) fn is_ignored(class_bits: u8) -> bool {
    class_bits & IGNORE_LEAK_BIT != 0
}

pub(crate) fn set_ignored(class_bits: u8, ignore: bool) -> u8 {
    if ignore {
        class_bits | IGNORE_LEAK_BIT
    } else {
        class_bits & !IGNORE_LEAK_BIT
    }
}

/// Header at the start of every checked block.
///
/// `slot`/`slot_generation` tie the block into the registry's slot table;
/// the table, not the header, owns the chain linkage. The three side-data
/// pointers are owned by the block and freed with it.
#[repr(C)]
pub struct BlockHeader {
    pub(crate) signature: u64,
    pub(crate) size: usize,
    pub(crate) index: u64,
    pub(crate) class_bits: u8,
    pub(crate) section: u8,
    pub(crate) deallocated: u8,
    pub(crate) hard_to_track: u8,
    pub(crate) slot: u32,
    pub(crate) slot_generation: u32,
    _pad: u32,
    pub(crate) stack: *mut CallStack,
    pub(crate) ref_events: *mut Vec<RefEvent>,
    pub(crate) tags: *mut TagList,
    pub(crate) guard: [usize; GUARD_WORDS],
}

/// Trailer mirroring the header's validation-relevant fields.
#[repr(C)]
pub struct BlockTrailer {
    pub(crate) signature: u64,
    pub(crate) size: usize,
    pub(crate) class_bits: u8,
    pub(crate) section: u8,
    pub(crate) deallocated: u8,
    _pad: [u8; 5],
    pub(crate) guard: [usize; GUARD_WORDS],
}

/// Byte offsets of a checked block region for a given payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    pub payload_offset: usize,
    pub trailer_offset: usize,
    pub total: usize,
}

/// Offset of the payload from the block base.
#[inline]
pub(crate) fn payload_offset() -> usize {
    align_up(mem::size_of::<BlockHeader>(), BLOCK_ALIGN)
}

#[inline]
fn trailer_region() -> usize {
    align_up(mem::size_of::<BlockTrailer>(), BLOCK_ALIGN)
}

/// Compute the block layout for a payload size, or `None` when the
/// metadata and alignment rounding cannot be represented.
pub(crate) fn layout_for(size: usize) -> Option<BlockLayout> {
    let payload_offset = payload_offset();
    let trailer_offset = align_up_checked(payload_offset.checked_add(size)?, BLOCK_ALIGN)?;
    let total = trailer_offset.checked_add(trailer_region())?;
    Some(BlockLayout {
        payload_offset,
        trailer_offset,
        total,
    })
}

/// Expected guard word for the guard slot at `addr`.
///
/// A self-referential canary: no process-wide secret to store, at the
/// cost of being trivially forgeable by anyone reading this function.
/// Acceptable for a debug tool that is not a security boundary.
#[inline]
pub fn guard_word_for(addr: usize) -> usize {
    let a = addr as u64;
    (a.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ 0x5ED1_BADC_0FFE_EDA1).rotate_left(17) as usize
}

unsafe fn write_guards(words: *mut usize) {
    for i in 0..GUARD_WORDS {
        let slot = words.add(i);
        slot.write(guard_word_for(slot as usize));
    }
}

unsafe fn check_guards(words: *const usize) -> bool {
    for i in 0..GUARD_WORDS {
        let slot = words.add(i);
        if slot.read() != guard_word_for(slot as usize) {
            return false;
        }
    }
    true
}

impl BlockHeader {
    /// Recover the header from a caller-visible payload pointer.
    ///
    /// # Safety
    ///
    /// `payload` must be a payload pointer previously returned by this
    /// heap (the header sits at a fixed negative offset).
    #[inline]
    pub(crate) unsafe fn from_payload(payload: *const u8) -> *mut BlockHeader {
        payload.sub(payload_offset()) as *mut BlockHeader
    }

    /// Payload pointer for a header.
    #[inline]
    pub(crate) unsafe fn payload(header: *const BlockHeader) -> *mut u8 {
        (header as *mut u8).add(payload_offset())
    }

    /// Trailer pointer for a header, derived from the stored size.
    #[inline]
    pub(crate) unsafe fn trailer(header: *const BlockHeader) -> *mut BlockTrailer {
        let size = (*header).size;
        let off = align_up(payload_offset() + size, BLOCK_ALIGN);
        (header as *mut u8).add(off) as *mut BlockTrailer
    }
}

/// Initialize a freshly allocated block region.
///
/// Fills the payload with the junk pattern, writes the header (guards
/// included), mirrors it into the trailer, and fills the gap between
/// payload end and trailer start with the filler pattern. The region is
/// not yet linked into the registry; `slot`/`slot_generation` are zeroed
/// until insertion.
///
/// # Safety
///
/// `base` must point to at least `layout.total` writable bytes aligned to
/// [`BLOCK_ALIGN`], and `layout` must equal `layout_for(size)`.
pub(crate) unsafe fn init_block(
    base: *mut u8,
    size: usize,
    layout: &BlockLayout,
    class: AllocClass,
    section: u8,
    index: u64,
    stack: *mut CallStack,
) -> *mut BlockHeader {
    let header = base as *mut BlockHeader;
    header.write(BlockHeader {
        signature: HEADER_SIGNATURE,
        size,
        index,
        class_bits: class as u8,
        section,
        deallocated: 0,
        hard_to_track: 0,
        slot: 0,
        slot_generation: 0,
        _pad: 0,
        stack,
        ref_events: std::ptr::null_mut(),
        tags: std::ptr::null_mut(),
        guard: [0; GUARD_WORDS],
    });
    write_guards((*header).guard.as_mut_ptr());

    std::ptr::write_bytes(base.add(layout.payload_offset), UNINIT_PATTERN, size);

    let gap = layout.trailer_offset - (layout.payload_offset + size);
    std::ptr::write_bytes(base.add(layout.payload_offset + size), FILLER_PATTERN, gap);

    let trailer = base.add(layout.trailer_offset) as *mut BlockTrailer;
    trailer.write(BlockTrailer {
        signature: TRAILER_SIGNATURE,
        size,
        class_bits: class as u8,
        section,
        deallocated: 0,
        _pad: [0; 5],
        guard: [0; GUARD_WORDS],
    });
    write_guards((*trailer).guard.as_mut_ptr());

    header
}

/// The specific validation check that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptKind {
    /// The block was already freed (double free or stale pointer).
    AlreadyFreed,
    /// The leading header signature is gone.
    HeaderSignature,
    /// The trailing signature, at the position derived from the stored
    /// size, is gone.
    TrailerSignature,
    /// The stored allocation class is not a known tag.
    ClassOutOfRange,
    /// A header guard word no longer matches its address.
    GuardWords,
    /// The trailer's size mirror disagrees with the header (the trailer
    /// is not where the header says it should be).
    TrailerPosition,
    /// A filler byte between payload end and trailer was overwritten.
    Filler,
    /// The registry slot table disagrees with the block's linkage.
    ChainLinks,
    /// A mirrored trailer field or trailer guard word disagrees with the
    /// header.
    TrailerMirror,
}

impl CorruptKind {
    /// Short human-readable name of the failed check.
    pub fn describe(&self) -> &'static str {
        match self {
            CorruptKind::AlreadyFreed => "block already deallocated",
            CorruptKind::HeaderSignature => "header signature corrupted",
            CorruptKind::TrailerSignature => "trailer signature corrupted",
            CorruptKind::ClassOutOfRange => "allocation class out of range",
            CorruptKind::GuardWords => "guard block corrupted",
            CorruptKind::TrailerPosition => "trailer position mismatch",
            CorruptKind::Filler => "filler bytes overwritten",
            CorruptKind::ChainLinks => "registry chain links corrupted",
            CorruptKind::TrailerMirror => "trailer mirror mismatch",
        }
    }
}

/// A failed validation: which check, and the payload address it was
/// running against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corruption {
    /// The failed check.
    pub kind: CorruptKind,
    /// Payload address of the block under validation.
    pub address: usize,
}

impl std::fmt::Display for Corruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {:#x}", self.kind.describe(), self.address)
    }
}

/// Run the ordered validation sequence against a block, stopping at the
/// first failure.
///
/// Only the chain-linkage check touches shared state; it takes the
/// registry lock internally. Everything else reads the block outside any
/// lock.
///
/// # Safety
///
/// `header` must point to a region obtained from this heap that has not
/// yet been released to the OS allocator.
pub(crate) unsafe fn validate_block(
    header: *const BlockHeader,
    registry: &Registry,
) -> Result<(), Corruption> {
    let address = BlockHeader::payload(header) as usize;
    let fail = |kind| Err(Corruption { kind, address });

    if (*header).deallocated != 0 {
        return fail(CorruptKind::AlreadyFreed);
    }
    if (*header).signature != HEADER_SIGNATURE {
        return fail(CorruptKind::HeaderSignature);
    }
    let trailer = BlockHeader::trailer(header);
    if (*trailer).signature != TRAILER_SIGNATURE {
        return fail(CorruptKind::TrailerSignature);
    }
    if AllocClass::from_bits((*header).class_bits).is_none() {
        return fail(CorruptKind::ClassOutOfRange);
    }
    if !check_guards((*header).guard.as_ptr()) {
        return fail(CorruptKind::GuardWords);
    }
    if (*trailer).size != (*header).size {
        return fail(CorruptKind::TrailerPosition);
    }
    let size = (*header).size;
    let payload_end = address + size;
    let gap = align_up(payload_offset() + size, BLOCK_ALIGN) - (payload_offset() + size);
    for i in 0..gap {
        if *((payload_end + i) as *const u8) != FILLER_PATTERN {
            return fail(CorruptKind::Filler);
        }
    }
    if !registry.verify_links(header) {
        return fail(CorruptKind::ChainLinks);
    }
    if (*trailer).class_bits != (*header).class_bits
        || (*trailer).section != (*header).section
        || (*trailer).deallocated != (*header).deallocated
        || !check_guards((*trailer).guard.as_ptr())
    {
        return fail(CorruptKind::TrailerMirror);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_offset_aligned() {
        assert_eq!(payload_offset() % BLOCK_ALIGN, 0);
        assert!(payload_offset() >= mem::size_of::<BlockHeader>());
    }

    #[test]
    fn test_layout_for_gap() {
        // 17-byte payload leaves a 15-byte filler gap
        let layout = layout_for(17).unwrap();
        assert_eq!(layout.trailer_offset - layout.payload_offset - 17, 15);

        // 16-byte payload leaves none
        let layout = layout_for(16).unwrap();
        assert_eq!(layout.trailer_offset - layout.payload_offset, 16);
    }

    #[test]
    fn test_layout_for_overflow() {
        assert!(layout_for(usize::MAX - 8).is_none());
    }

    #[test]
    fn test_guard_word_is_deterministic() {
        let addr = 0xdead_b000usize;
        assert_eq!(guard_word_for(addr), guard_word_for(addr));
        assert_ne!(guard_word_for(addr), guard_word_for(addr + 8));
    }

    #[test]
    fn test_class_bits_round_trip() {
        for class in [AllocClass::Scalar, AllocClass::Array, AllocClass::Flat] {
            let bits = class as u8;
            assert_eq!(AllocClass::from_bits(bits), Some(class));
            let ignored = set_ignored(bits, true);
            assert!(is_ignored(ignored));
            assert_eq!(AllocClass::from_bits(ignored), Some(class));
            assert!(!is_ignored(set_ignored(ignored, false)));
        }
        assert_eq!(AllocClass::from_bits(0x17), None);
    }
}
