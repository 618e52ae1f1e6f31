//! Allocation call-stack capture.
//!
//! Raw return addresses are captured at allocation time (cheap); symbol
//! resolution is deferred until a leak report actually prints the stack.

use std::ffi::c_void;

/// A captured call stack: raw instruction pointers, innermost first.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<usize>,
}

/// One frame of a resolved stack.
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    /// The instruction pointer.
    pub address: usize,
    /// Demangled symbol name, if known.
    pub symbol: Option<String>,
    /// Source file, if known.
    pub file: Option<String>,
    /// Source line, if known.
    pub line: Option<u32>,
}

impl CallStack {
    /// Capture up to `max_depth` frames, skipping `skip` innermost frames
    /// (the allocator's own entry points).
    pub fn capture(max_depth: usize, skip: usize) -> Self {
        let mut frames = Vec::with_capacity(max_depth);
        let mut skipped = 0;
        backtrace::trace(|frame| {
            if skipped < skip {
                skipped += 1;
                return true;
            }
            frames.push(frame.ip() as usize);
            frames.len() < max_depth
        });
        Self { frames }
    }

    /// The raw captured return addresses.
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    /// Resolve the captured addresses to symbols.
    ///
    /// Expensive; only called when a report is printed.
    pub fn resolve(&self) -> Vec<ResolvedFrame> {
        let mut out = Vec::with_capacity(self.frames.len());
        for &ip in &self.frames {
            let mut frame = ResolvedFrame {
                address: ip,
                symbol: None,
                file: None,
                line: None,
            };
            backtrace::resolve(ip as *mut c_void, |symbol| {
                if frame.symbol.is_none() {
                    frame.symbol = symbol.name().map(|n| n.to_string());
                    frame.file = symbol.filename().map(|p| p.display().to_string());
                    frame.line = symbol.lineno();
                }
            });
            out.push(frame);
        }
        out
    }
}
