//! Checked-heap configuration.

use std::path::PathBuf;

use crate::core::marks::DEFAULT_OWNER_SCAN_LIMIT;
use crate::util::size::kb;

/// What to do when the allocation class at free time differs from the
/// class at allocation time.
///
/// The check is deliberately relaxed by default (mismatches are real but
/// historically tolerated); strict enforcement is a policy choice, not a
/// guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Warn through the diagnostic stream, then free normally.
    Warn,
    /// Report an error and abort the free; the block stays live.
    Fail,
}

/// Configuration for the checked heap, read once at startup.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Capture an allocation call stack on every allocation.
    /// Off by default to keep the common case cheap.
    pub capture_stacks: bool,

    /// Maximum frames kept per captured stack.
    pub max_stack_depth: usize,

    /// Include payload hex dumps in leak reports.
    pub hex_dumps: bool,

    /// Record reference-count events on blocks (full-reference logging).
    pub log_ref_events: bool,

    /// Unattended stress mode: corruption breaks unconditionally instead
    /// of prompting, and leaks past the byte threshold break too.
    pub stress_mode: bool,

    /// Leaked-byte threshold for the unconditional break in stress mode.
    pub leak_break_threshold: usize,

    /// Policy for allocation-class mismatches at free time.
    pub class_mismatch: MismatchPolicy,

    /// Section tag stamped into every block's header and trailer.
    pub section: u8,

    /// How many chain entries the annotation owner search examines
    /// before giving up.
    pub owner_scan_limit: usize,

    /// Directory for leak report files; stderr when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            capture_stacks: false,
            max_stack_depth: 32,
            hex_dumps: false,
            log_ref_events: false,
            stress_mode: false,
            leak_break_threshold: kb(64),
            class_mismatch: MismatchPolicy::Warn,
            section: 1,
            owner_scan_limit: DEFAULT_OWNER_SCAN_LIMIT,
            log_dir: None,
        }
    }
}

impl HeapConfig {
    /// Full-detail config for leak hunting: stacks, hex dumps, and
    /// reference logging all on.
    pub fn full_tracking() -> Self {
        Self {
            capture_stacks: true,
            hex_dumps: true,
            log_ref_events: true,
            ..Self::default()
        }
    }

    /// Read configuration overrides from `GUARDHEAP_*` environment
    /// variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.capture_stacks = env_flag("GUARDHEAP_CAPTURE_STACKS");
        config.hex_dumps = env_flag("GUARDHEAP_HEX_DUMPS");
        config.log_ref_events = env_flag("GUARDHEAP_REF_EVENTS");
        config.stress_mode = env_flag("GUARDHEAP_STRESS");
        if env_flag("GUARDHEAP_STRICT_CLASS") {
            config.class_mismatch = MismatchPolicy::Fail;
        }
        if let Ok(dir) = std::env::var("GUARDHEAP_LOG_DIR") {
            if !dir.is_empty() {
                config.log_dir = Some(PathBuf::from(dir));
            }
        }
        config
    }

    /// Builder pattern: enable allocation stack capture.
    pub fn with_stacks(mut self, enable: bool) -> Self {
        self.capture_stacks = enable;
        self
    }

    /// Builder pattern: enable payload hex dumps in reports.
    pub fn with_hex_dumps(mut self, enable: bool) -> Self {
        self.hex_dumps = enable;
        self
    }

    /// Builder pattern: enable reference-count event logging.
    pub fn with_ref_events(mut self, enable: bool) -> Self {
        self.log_ref_events = enable;
        self
    }

    /// Builder pattern: set stress mode.
    pub fn with_stress_mode(mut self, enable: bool) -> Self {
        self.stress_mode = enable;
        self
    }

    /// Builder pattern: set the class-mismatch policy.
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.class_mismatch = policy;
        self
    }

    /// Builder pattern: set the leak-byte break threshold.
    pub fn with_leak_break_threshold(mut self, bytes: usize) -> Self {
        self.leak_break_threshold = bytes;
        self
    }

    /// Builder pattern: set the report output directory.
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("on")
    )
}
