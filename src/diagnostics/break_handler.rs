//! Interactive break collaborator.
//!
//! When a corruption or leak threshold fires, a developer sitting at a
//! debugger wants to stop right there. The host application supplies the
//! actual dialog/trap mechanism; this module only defines the seam.

/// Collaborator interface for interactive breaks.
///
/// `prompt_break` asks whether to break (a dialog, a TTY prompt, a policy
/// decision); `break_now` performs the break itself. In unattended stress
/// runs the prompt is bypassed and `break_now` is called directly.
pub trait BreakHandler: Send + Sync {
    /// Ask whether execution should break for `message`.
    fn prompt_break(&self, message: &str) -> bool;

    /// Break into the debugger (or whatever the host considers a break).
    fn break_now(&self, message: &str);
}

/// Default handler: never prompts, never breaks.
///
/// Suitable for CI and for hosts that only consume the diagnostic stream.
#[derive(Debug, Default)]
pub struct NoBreak;

impl BreakHandler for NoBreak {
    fn prompt_break(&self, _message: &str) -> bool {
        false
    }

    fn break_now(&self, _message: &str) {}
}

/// A handler that records break requests, for tests.
#[derive(Debug, Default)]
pub struct RecordingBreakHandler {
    prompts: std::sync::Mutex<Vec<String>>,
    breaks: std::sync::Mutex<Vec<String>>,
    /// Answer returned from `prompt_break`.
    pub answer: bool,
}

impl RecordingBreakHandler {
    /// Create a handler answering `answer` to every prompt.
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    /// Messages passed to `prompt_break`.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Messages passed to `break_now`.
    pub fn breaks(&self) -> Vec<String> {
        self.breaks.lock().unwrap().clone()
    }
}

impl BreakHandler for RecordingBreakHandler {
    fn prompt_break(&self, message: &str) -> bool {
        self.prompts.lock().unwrap().push(message.to_string());
        self.answer
    }

    fn break_now(&self, message: &str) {
        self.breaks.lock().unwrap().push(message.to_string());
    }
}
