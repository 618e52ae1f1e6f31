//! Allocation statistics and leak check results.

/// Aggregated checked-heap statistics.
#[derive(Debug, Clone, Default)]
pub struct HeapStats {
    /// Total payload bytes currently live.
    pub total_allocated: usize,

    /// Peak payload bytes (high water mark).
    pub peak_allocated: usize,

    /// Total number of checked allocations performed.
    pub allocation_count: u64,

    /// Total number of checked frees performed.
    pub deallocation_count: u64,

    /// Blocks currently tracked in the registry.
    pub live_blocks: usize,

    /// Bytes held by block metadata and the delayed-reclamation slot, as
    /// accounted by the system heap wrapper (total region bytes minus
    /// live payload bytes).
    pub overhead_bytes: usize,
}

impl HeapStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate active allocations.
    pub fn active_allocations(&self) -> u64 {
        self.allocation_count.saturating_sub(self.deallocation_count)
    }
}

impl std::fmt::Display for HeapStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Checked Heap Statistics:")?;
        writeln!(f, "  Live payload:    {} bytes", self.total_allocated)?;
        writeln!(f, "  Peak payload:    {} bytes", self.peak_allocated)?;
        writeln!(f, "  Allocations:     {}", self.allocation_count)?;
        writeln!(f, "  Deallocations:   {}", self.deallocation_count)?;
        writeln!(f, "  Live blocks:     {}", self.live_blocks)?;
        writeln!(f, "  Overhead:        {} bytes", self.overhead_bytes)?;
        Ok(())
    }
}

/// Aggregate counts from a leak check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakSummary {
    /// Live, non-ignored blocks.
    pub blocks: usize,
    /// Payload bytes in those blocks.
    pub bytes: usize,
    /// Live blocks carrying the ignore-leak bit.
    pub ignored_blocks: usize,
    /// Payload bytes in ignored blocks.
    pub ignored_bytes: usize,
}

/// Result of [`CheckedHeap::check_leaks`](crate::CheckedHeap::check_leaks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakVerdict {
    /// No non-ignored blocks were live.
    Clean(LeakSummary),
    /// Live non-ignored blocks remain; the reports were dumped.
    LeaksDetected(LeakSummary),
}

impl LeakVerdict {
    /// The aggregate counts, pass or fail.
    pub fn summary(&self) -> LeakSummary {
        match self {
            LeakVerdict::Clean(s) | LeakVerdict::LeaksDetected(s) => *s,
        }
    }

    /// True when no non-ignored blocks were live.
    pub fn is_clean(&self) -> bool {
        matches!(self, LeakVerdict::Clean(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_allocations() {
        let stats = HeapStats {
            allocation_count: 10,
            deallocation_count: 7,
            ..HeapStats::default()
        };
        assert_eq!(stats.active_allocations(), 3);
    }

    #[test]
    fn test_verdict_accessors() {
        let summary = LeakSummary {
            blocks: 2,
            bytes: 24,
            ..LeakSummary::default()
        };
        assert!(!LeakVerdict::LeaksDetected(summary).is_clean());
        assert_eq!(LeakVerdict::LeaksDetected(summary).summary(), summary);
        assert!(LeakVerdict::Clean(LeakSummary::default()).is_clean());
    }
}
