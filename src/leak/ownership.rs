//! Ownership heuristic scanner (V1).
//!
//! The heuristic: owners are constructed before the objects they own, so
//! for each block we look for an older block (strictly smaller sequence
//! number) whose payload contains our address. The first hit wins. Blocks
//! with no such older referent are the actionable "top-level" list.

use crate::core::block::{self, BlockHeader};
use crate::leak::payload_contains_word;

/// One live block in the V1 report.
#[derive(Debug, Clone)]
pub struct OwnershipEntry {
    /// Payload address.
    pub address: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Allocation sequence number.
    pub index: u64,
    /// Payload address of the inferred owner, if any.
    pub owner: Option<usize>,
    pub(crate) header: *mut BlockHeader,
}

/// Run the V1 scan over a chain snapshot.
///
/// Ignored blocks are skipped entirely, both as leak candidates and as
/// candidate owners.
///
/// # Safety contract (internal): the snapshot's blocks must stay live
/// for the duration of the scan; quiescence is assumed.
pub(crate) fn scan(snapshot: &[*mut BlockHeader]) -> Vec<OwnershipEntry> {
    let mut entries: Vec<OwnershipEntry> = snapshot
        .iter()
        .filter_map(|&header| unsafe {
            if block::is_ignored((*header).class_bits) {
                return None;
            }
            Some(OwnershipEntry {
                address: BlockHeader::payload(header) as usize,
                size: (*header).size,
                index: (*header).index,
                owner: None,
                header,
            })
        })
        .collect();

    for i in 0..entries.len() {
        let (address, index) = (entries[i].address, entries[i].index);
        let owner = entries.iter().find(|candidate| {
            candidate.index < index
                && unsafe { payload_contains_word(candidate.address, candidate.size, address) }
        });
        entries[i].owner = owner.map(|c| c.address);
    }

    entries
}
