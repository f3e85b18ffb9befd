//! JSON-lines event reporting on stdout.
//!
//! The supervising process reads one JSON object per line. Progress events
//! may repeat; the stream carries exactly one terminal event — this sink
//! enforces that even if the caller misbehaves.

use dubsync_media::ProgressSink;
use dubsync_models::{DubSummary, ReportEvent};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Event sink writing JSON lines to a writer (stdout in production).
pub struct StdoutSink {
    writer: Mutex<Box<dyn Write + Send>>,
    terminal_sent: AtomicBool,
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutSink {
    /// Sink writing to process stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Sink writing to an arbitrary writer (used by tests).
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            terminal_sent: AtomicBool::new(false),
        }
    }

    /// Emit one event as a JSON line.
    pub fn emit(&self, event: &ReportEvent) {
        if event.is_terminal() && self.terminal_sent.swap(true, Ordering::SeqCst) {
            warn!("suppressing second terminal event: {event:?}");
            return;
        }
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize report event: {e}");
                return;
            }
        };
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(_) => return,
        };
        let _ = writeln!(writer, "{line}");
        let _ = writer.flush();
    }

    /// Emit the terminal error event.
    pub fn emit_error(&self, message: impl Into<String>) {
        self.emit(&ReportEvent::error(message));
    }

    /// Emit the terminal result event.
    pub fn emit_result(&self, summary: DubSummary) {
        self.emit(&ReportEvent::Result(summary));
    }

    /// Whether a terminal event has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.terminal_sent.load(Ordering::SeqCst)
    }
}

impl ProgressSink for StdoutSink {
    fn progress(&self, percent: u8, message: &str) {
        self.emit(&ReportEvent::progress(percent, message));
    }
}
