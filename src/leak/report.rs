//! Leak report formatting.
//!
//! The V1 dump is two lists: a compact "owned" list and a detailed
//! "top-level" list. The V2 dump walks fixed nested buckets —
//! hard-to-track status, then Loop before Single, then inbound and
//! outbound strength — ordered least to most suspicious, so that in a
//! terminal or log file the most likely real leak is the last thing
//! printed.

use std::io::Write;

use crate::core::block::{AllocClass, BlockHeader};
use crate::core::marks::Strength;
use crate::debug::events::RefEventKind;
use crate::leak::graph::{GraphNode, TopLevelKind};
use crate::leak::ownership::OwnershipEntry;
use crate::util::hex;

/// Strongest-first bucket order for inbound links; `None` (no inbound
/// link at all) is the most suspicious and prints last.
const INBOUND_BUCKETS: [Option<Strength>; 3] =
    [Some(Strength::Strong), Some(Strength::Unknown), None];

const OUTBOUND_BUCKETS: [Option<Strength>; 4] = [
    Some(Strength::Strong),
    Some(Strength::Unknown),
    Some(Strength::Weak),
    None,
];

fn strength_label(strength: Option<Strength>) -> &'static str {
    strength.map_or("none", |s| s.name())
}

pub(crate) fn dump_ownership(
    entries: &[OwnershipEntry],
    out: &mut dyn Write,
    hex_dumps: bool,
) -> std::io::Result<()> {
    writeln!(out, "=== ownership scan (v1): {} live blocks ===", entries.len())?;

    let owned: Vec<_> = entries.iter().filter(|e| e.owner.is_some()).collect();
    if !owned.is_empty() {
        writeln!(out, "--- owned ---")?;
        for entry in &owned {
            writeln!(
                out,
                "block {:#x} owned by {:#x}",
                entry.address,
                entry.owner.unwrap_or(0)
            )?;
        }
    }

    writeln!(out, "--- top-level ---")?;
    for entry in entries.iter().filter(|e| e.owner.is_none()) {
        dump_block_detail(out, entry.header, entry.address, entry.size, hex_dumps)?;
    }
    Ok(())
}

pub(crate) fn dump_graph(
    nodes: &[GraphNode],
    out: &mut dyn Write,
    hex_dumps: bool,
) -> std::io::Result<()> {
    writeln!(out, "=== graph scan (v2): {} live blocks ===", nodes.len())?;

    for hard in [true, false] {
        for top_level in [TopLevelKind::Loop, TopLevelKind::Single] {
            for inbound in INBOUND_BUCKETS {
                for outbound in OUTBOUND_BUCKETS {
                    for node in nodes {
                        if node.hard_to_track != hard
                            || node.top_level != top_level
                            || node.inbound_strength != inbound
                            || node.outbound_strength != outbound
                        {
                            continue;
                        }
                        writeln!(
                            out,
                            "--- {:?}{} (inbound: {}, outbound: {}) ---",
                            top_level,
                            if hard { ", hard to track" } else { "" },
                            strength_label(inbound),
                            strength_label(outbound),
                        )?;
                        dump_block_detail(out, node.header, node.address, node.size, hex_dumps)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Full allocation detail for one block: identity line, captured stack,
/// recorded ref-count events, optional hex dump.
fn dump_block_detail(
    out: &mut dyn Write,
    header: *const BlockHeader,
    address: usize,
    size: usize,
    hex_dumps: bool,
) -> std::io::Result<()> {
    // Safety: report runs over a live snapshot at quiescence.
    unsafe {
        let class = AllocClass::from_bits((*header).class_bits)
            .map_or("?", |c| c.name());
        writeln!(
            out,
            "block {:#x}: {} bytes, class {}, allocation #{}",
            address,
            size,
            class,
            (*header).index
        )?;

        if !(*header).stack.is_null() {
            writeln!(out, "  allocated at:")?;
            for frame in (*(*header).stack).resolve() {
                match (frame.symbol, frame.file, frame.line) {
                    (Some(symbol), Some(file), Some(line)) => {
                        writeln!(out, "    {:#x} {} ({}:{})", frame.address, symbol, file, line)?
                    }
                    (Some(symbol), _, _) => {
                        writeln!(out, "    {:#x} {}", frame.address, symbol)?
                    }
                    _ => writeln!(out, "    {:#x}", frame.address)?,
                }
            }
        }

        if !(*header).ref_events.is_null() {
            let events = &*(*header).ref_events;
            writeln!(out, "  {} ref-count events:", events.len())?;
            for event in events {
                let sign = match event.kind {
                    RefEventKind::Increment => "+",
                    RefEventKind::Decrement => "-",
                };
                writeln!(out, "    {} -> {}", sign, event.count_after)?;
            }
        }

        if hex_dumps {
            for line in hex::dump_region(address, size) {
                writeln!(out, "  {}", line)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_orders_end_least_precise() {
        // "No link at all" is the most suspicious bucket on both axes.
        assert_eq!(INBOUND_BUCKETS.last(), Some(&None));
        assert_eq!(OUTBOUND_BUCKETS.last(), Some(&None));
        assert_eq!(INBOUND_BUCKETS[0], Some(Strength::Strong));
    }
}
