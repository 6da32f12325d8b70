//! Host-facing observability sink.
//!
//! The navigator classifies every message as echo (informational), error,
//! or protocol (machine-parsed listing and status lines); wire framing is
//! entirely the implementor's business.

pub trait Console {
    fn echo(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
    fn protocol(&mut self, line: &str);
}

/// Discards everything. Useful for callers that only need the result
/// codes, and for the autostart scan on headless boots.
pub struct NullConsole;

impl Console for NullConsole {
    fn echo(&mut self, _msg: &str) {}
    fn error(&mut self, _msg: &str) {}
    fn protocol(&mut self, _line: &str) {}
}
