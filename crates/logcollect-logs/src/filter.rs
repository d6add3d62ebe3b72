use logcollect_types::LogLine;

use crate::buffer::RingBuffer;

/// Substring search over the most recent lines
#[derive(Clone)]
pub struct FilterQuery {
    buffer: RingBuffer,
    max_results: usize,
}

impl FilterQuery {
    pub fn new(buffer: RingBuffer, max_results: usize) -> Self {
        Self {
            buffer,
            max_results,
        }
    }

    /// Maximum number of lines a search returns
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Check if a line matches `query`. The empty query matches everything.
    pub fn matches(line: &str, query: &str) -> bool {
        query.is_empty() || line.contains(query)
    }

    /// Matching lines, newest first
    pub fn search(&self, query: &str) -> Vec<LogLine> {
        self.buffer
            .scan_backward(|line| Self::matches(line, query), self.max_results)
    }

    /// Matching lines concatenated into one body, newest first
    pub fn render(&self, query: &str) -> String {
        self.search(query).concat()
    }
}

impl std::fmt::Debug for FilterQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterQuery")
            .field("max_results", &self.max_results)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
