//! Graph-based leak classifier (V2).
//!
//! Builds an explicit inbound-link graph over the live chain: every
//! pointer-sized payload word that lands inside another live payload
//! becomes a candidate edge, qualified by the source block's strength
//! tags. Weak edges are dropped (an incidental back-pointer does not
//! keep anything alive); Unknown and Strong edges are recorded. A
//! depth-first walk toward referrers then classifies each block: on a
//! reference cycle (`Loop`), referenced by nothing (`Single`), or
//! reachable from something else (`NotTopLevel`).

use crate::core::block::{self, BlockHeader};
use crate::core::marks::{self, Strength};

const WORD: usize = std::mem::size_of::<usize>();

/// Classification of a block after the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelKind {
    /// Not yet visited (never escapes the scan).
    Unclassified,
    /// No qualifying inbound link; a definite top-level block.
    Single,
    /// On a reference cycle; the cycle as a whole is top-level.
    Loop,
    /// Referenced by some other live block.
    NotTopLevel,
}

struct InboundLink {
    source: usize,
    strength: Strength,
}

/// One live block with its scan results.
pub struct GraphNode {
    /// Payload address.
    pub address: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Allocation sequence number.
    pub index: u64,
    /// Set via `mark_hard_to_track`; steers the block into the imprecise
    /// report bucket.
    pub hard_to_track: bool,
    /// Traversal classification.
    pub top_level: TopLevelKind,
    /// Strongest recorded inbound link, if any.
    pub inbound_strength: Option<Strength>,
    /// Strongest outgoing reference observed, recorded or not.
    pub outbound_strength: Option<Strength>,
    pub(crate) header: *mut BlockHeader,
    inbound: Vec<InboundLink>,
    on_stack: bool,
    considered: bool,
}

/// Run the V2 scan over a chain snapshot.
pub(crate) fn scan(snapshot: &[*mut BlockHeader]) -> Vec<GraphNode> {
    let mut nodes = collect_nodes(snapshot);
    if nodes.is_empty() {
        return nodes;
    }
    build_edges(&mut nodes);
    classify(&mut nodes);
    for node in &mut nodes {
        node.inbound_strength = node.inbound.iter().map(|l| l.strength).max();
    }
    nodes
}

fn collect_nodes(snapshot: &[*mut BlockHeader]) -> Vec<GraphNode> {
    let mut nodes: Vec<GraphNode> = snapshot
        .iter()
        .filter_map(|&header| unsafe {
            if block::is_ignored((*header).class_bits) {
                return None;
            }
            Some(GraphNode {
                address: BlockHeader::payload(header) as usize,
                size: (*header).size,
                index: (*header).index,
                hard_to_track: (*header).hard_to_track != 0,
                top_level: TopLevelKind::Unclassified,
                inbound_strength: None,
                outbound_strength: None,
                header,
                inbound: Vec::new(),
                on_stack: false,
                considered: false,
            })
        })
        .collect();
    // Sorted starts enable binary-search containment queries below.
    nodes.sort_unstable_by_key(|n| n.address);
    nodes
}

/// Binary-search the sorted node array for the block containing `addr`.
fn containing_node(nodes: &[GraphNode], addr: usize) -> Option<usize> {
    let idx = nodes.partition_point(|n| n.address <= addr);
    if idx == 0 {
        return None;
    }
    let candidate = idx - 1;
    if addr < nodes[candidate].address + nodes[candidate].size {
        Some(candidate)
    } else {
        None
    }
}

fn build_edges(nodes: &mut Vec<GraphNode>) {
    let min = nodes[0].address;
    let last = nodes.len() - 1;
    let max = nodes[last].address + nodes[last].size;

    let mut edges: Vec<(usize, usize, Strength)> = Vec::new();
    for (src, node) in nodes.iter().enumerate() {
        let mut offset = 0;
        while offset + WORD <= node.size {
            let slot_addr = node.address + offset;
            // Safety: the payload is live for the duration of the scan.
            let value = unsafe { (slot_addr as *const usize).read_unaligned() };
            offset += WORD;
            if value < min || value >= max {
                continue;
            }
            let Some(dst) = containing_node(nodes, value) else {
                continue;
            };
            if dst == src {
                continue;
            }
            let strength = unsafe { marks::effective_strength(node.header, slot_addr) };
            edges.push((src, dst, strength));
        }
    }

    for (src, dst, strength) in edges {
        // Every observed reference feeds the outbound summary, but only
        // links stronger than Weak become graph edges.
        let out = &mut nodes[src].outbound_strength;
        *out = Some(out.map_or(strength, |s| s.max(strength)));
        if strength > Strength::Weak {
            nodes[dst].inbound.push(InboundLink {
                source: src,
                strength,
            });
        }
    }
}

fn classify(nodes: &mut [GraphNode]) {
    let mut path = Vec::new();
    for start in 0..nodes.len() {
        consider(nodes, start, &mut path);
    }
}

/// Expand one node, walking toward whatever references it.
///
/// Revisiting a node on the current path means the path segment from the
/// repeat to the top is a reference cycle. Already-expanded nodes are
/// skipped, which bounds the cost: not every loop through a shared node
/// is separately discovered, but every node on at least one loop is
/// found.
fn consider(nodes: &mut [GraphNode], i: usize, path: &mut Vec<usize>) {
    if nodes[i].considered {
        return;
    }
    if nodes[i].on_stack {
        let repeat = path
            .iter()
            .rposition(|&p| p == i)
            .expect("on-stack node must be on the path");
        for &p in &path[repeat..] {
            nodes[p].top_level = TopLevelKind::Loop;
        }
        return;
    }
    if nodes[i].inbound.is_empty() {
        nodes[i].top_level = TopLevelKind::Single;
        nodes[i].considered = true;
        return;
    }

    nodes[i].on_stack = true;
    path.push(i);
    let sources: Vec<usize> = nodes[i].inbound.iter().map(|l| l.source).collect();
    for source in sources {
        consider(nodes, source, path);
    }
    path.pop();
    nodes[i].on_stack = false;

    if nodes[i].top_level == TopLevelKind::Unclassified {
        nodes[i].top_level = TopLevelKind::NotTopLevel;
    }
    nodes[i].considered = true;
}
