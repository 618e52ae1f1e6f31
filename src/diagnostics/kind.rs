//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// Diagnostic code wrapper for type-safe code references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode(&'static str);

impl DiagnosticCode {
    /// Create a new diagnostic code.
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    /// Get the code string.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Additional context about another diagnostic.
    Note,
    /// Actionable suggestion to fix the issue.
    Help,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
            DiagnosticKind::Help => "help",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `GH0xx` - Block format / allocation issues
/// - `GH1xx` - Registry issues
/// - `GH2xx` - Pointer annotation issues
/// - `GH3xx` - Leak scan results
/// - `GH9xx` - Internal errors
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "GH010").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
    /// The reporting call already signals this failure to its caller
    /// (null return, `false`, deliberate abort); strict mode must not
    /// escalate it into a panic.
    pub soft: bool,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
            soft: false,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
            soft: false,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    /// Mark this diagnostic as a soft failure, exempt from strict-mode
    /// panics.
    pub const fn soft_failure(mut self) -> Self {
        self.soft = true;
        self
    }
}

// =============================================================================
// Predefined diagnostics (GH0xx - Block format / allocation)
// =============================================================================

/// GH001: Requested size overflows once metadata is added.
pub const GH001: Diagnostic = Diagnostic::warning(
    "GH001",
    "allocation too large: size overflows with block metadata added"
).with_note("header, trailer, and alignment rounding could not be represented")
 .with_help("the allocation failed cleanly; the caller receives a null payload");

/// GH002: The underlying OS heap is exhausted.
pub const GH002: Diagnostic = Diagnostic::error(
    "GH002",
    "system heap exhausted"
).with_note("the checked heap terminates the process deliberately on exhaustion")
 .with_help("a clean abort here beats a null pointer propagating through the host")
 .soft_failure();

/// GH010: A validation check on a checked block failed.
pub const GH010: Diagnostic = Diagnostic::error(
    "GH010",
    "heap corruption detected in checked block"
).with_note("the triggering operation is aborted for this block")
 .with_help("run under a debugger with a break handler installed to inspect the block")
 .soft_failure();

/// GH011: Allocation class at free time differs from allocation time.
pub const GH011: Diagnostic = Diagnostic::warning(
    "GH011",
    "allocation class mismatch at free"
).with_note("the block was allocated under a different call-site discipline")
 .with_help("set MismatchPolicy::Fail in HeapConfig to make this a hard failure");

/// GH012: Class mismatch under MismatchPolicy::Fail.
pub const GH012: Diagnostic = Diagnostic::error(
    "GH012",
    "allocation class mismatch at free (strict policy)"
).with_note("the free was aborted; the block is still live")
 .soft_failure();

// =============================================================================
// Predefined diagnostics (GH1xx - Registry)
// =============================================================================

/// GH101: Registry operation after teardown.
pub const GH101: Diagnostic = Diagnostic::warning(
    "GH101",
    "allocation registry used after teardown"
).with_note("the block is not tracked and will not appear in leak reports");

// =============================================================================
// Predefined diagnostics (GH2xx - Pointer annotations)
// =============================================================================

/// GH201: Pointer annotation owner did not resolve to a checked block.
pub const GH201: Diagnostic = Diagnostic::warning(
    "GH201",
    "pointer annotation owner is not a tracked block"
).with_note("static and non-heap owners are not supported; the tag was dropped");

// =============================================================================
// Predefined diagnostics (GH3xx - Leak scans)
// =============================================================================

/// GH301: Leak check summary.
pub const GH301: Diagnostic = Diagnostic::warning(
    "GH301",
    "live allocations remain at leak check"
).with_help("the classified dump lists the most suspicious block last");

// =============================================================================
// Predefined diagnostics (GH9xx - Internal)
// =============================================================================

/// GH901: Internal checked-heap error.
pub const GH901: Diagnostic = Diagnostic::error(
    "GH901",
    "internal checked-heap error"
).with_note("this indicates a bug in guardheap")
 .with_help("please report this issue at the guardheap repository");
