/// Error-rate detection over the merged output stream: split chunks into
/// lines, match a literal substring, and fire once the match count inside
/// a sliding time window reaches the configured limit.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Splits a chunk stream into newline-delimited lines.
///
/// Carries the trailing partial line between chunks; `finish` flushes a
/// final line that ended without a newline.
#[derive(Debug, Default)]
pub struct LineScanner {
    buf: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the lines it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush a final unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

/// Counts occurrences of a literal substring in output lines and fires
/// once `count_limit` of them land inside the sliding `window`.
///
/// The occurrence log lives for a single run: entries older than the
/// window are evicted before each comparison, so memory stays bounded
/// for long-running chatty children. Fires at most once; afterwards it
/// keeps accepting lines with no further effect, so the stream is never
/// starved while the interrupted child winds down.
///
/// Matching is a plain substring search, not a pattern language: it
/// runs once per output line and the hot path stays allocation-light.
pub struct ErrorWindow {
    pattern: String,
    count_limit: usize,
    window: Duration,
    occurrences: VecDeque<Instant>,
    fired: bool,
}

impl ErrorWindow {
    pub fn new(pattern: impl Into<String>, count_limit: u32, window: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            count_limit: count_limit as usize,
            window,
            occurrences: VecDeque::new(),
            fired: false,
        }
    }

    /// Scan one output line. Returns true exactly once per run, at the
    /// moment the error rate becomes unacceptable.
    pub fn observe(&mut self, line: &str) -> bool {
        if !line.contains(&self.pattern) {
            return false;
        }
        tracing::debug!(pattern = %self.pattern, "matched error pattern");
        self.record(Instant::now())
    }

    /// Whether this run already crossed the threshold.
    pub fn fired(&self) -> bool {
        self.fired
    }

    fn record(&mut self, at: Instant) -> bool {
        if self.fired {
            return false;
        }
        self.occurrences.push_back(at);
        while let Some(&front) = self.occurrences.front() {
            if at.duration_since(front) >= self.window {
                self.occurrences.pop_front();
            } else {
                break;
            }
        }
        if self.occurrences.len() >= self.count_limit {
            self.fired = true;
            self.occurrences.clear();
            return true;
        }
        false
    }
}
