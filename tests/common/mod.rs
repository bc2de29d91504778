//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use event_processor::ProcessingResult;

/// Assert every result failed with exactly `message`
pub fn assert_all_failed_with(results: &[ProcessingResult], message: &str) {
    assert!(!results.is_empty(), "Expected at least one result");
    for result in results {
        assert!(!result.success, "Expected {} to fail", result.id);
        assert_eq!(
            result.console_logs, message,
            "Unexpected diagnostic text for {}",
            result.id
        );
    }
}

/// Result ids in order
pub fn ids(results: &[ProcessingResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

/// Diagnostic lines of one result
pub fn lines(result: &ProcessingResult) -> Vec<&str> {
    if result.console_logs.is_empty() {
        Vec::new()
    } else {
        result.console_logs.split('\n').collect()
    }
}

/// In-memory sink for tracing output
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// How many captured lines contain `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Capture debug-level tracing output on the current thread until the guard drops
pub fn capture_tracing() -> (tracing::subscriber::DefaultGuard, LogCapture) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    (tracing::subscriber::set_default(subscriber), capture)
}
