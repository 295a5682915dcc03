//! Output sinks for diagnostic text.
//!
//! The call matcher never raises; it reports through whatever sink it was
//! given. The buffer sink exists for tests and programmatic capture.

pub trait OutputSink {
    fn emit(&mut self, text: &str);
}

/// Collects output into a String.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buffer: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.buffer.lines()
    }
}

impl OutputSink for OutputBuffer {
    fn emit(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(text);
    }
}

/// Writes each emitted line to stdout. Default for discovery output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Writes each emitted line to stderr. Default for mismatch and parse-error
/// diagnostics.
#[derive(Debug, Default)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn emit(&mut self, text: &str) {
        eprintln!("{}", text);
    }
}
