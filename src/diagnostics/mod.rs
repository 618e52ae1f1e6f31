//! Diagnostics and reporting seams.
//!
//! This module provides:
//! - **Runtime diagnostics**: corruption and leak reports with stable codes
//! - **Sinks**: pluggable consumers for the diagnostic stream
//! - **Break handling**: the interactive-break collaborator seam
//! - **Strict mode**: optional panic-on-error for CI
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                          |
//! |-------|----------------------------------|
//! | GH0xx | Block format / allocation issues |
//! | GH1xx | Registry issues                  |
//! | GH2xx | Pointer annotation issues        |
//! | GH3xx | Leak scan results                |
//! | GH9xx | Internal errors                  |

// Core diagnostic types
pub mod break_handler;
pub mod emit;
pub mod kind;
pub mod strict;

// Re-export core types
pub use break_handler::{BreakHandler, NoBreak, RecordingBreakHandler};
pub use emit::{emit, emit_with_context, set_verbose, suppress_diagnostics, CollectingSink, DiagnosticSink};
pub use kind::{Diagnostic, DiagnosticCode, DiagnosticKind};
pub use strict::{init_from_env, set_strict_mode, strict_mode, StrictMode, StrictModeGuard};

// Re-export predefined diagnostics
pub use kind::{GH001, GH002, GH010, GH011, GH012, GH101, GH201, GH301, GH901};
