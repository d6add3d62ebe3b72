use std::sync::Arc;

use parking_lot::RwLock;

use logcollect_types::LogLine;

/// Position in the write sequence of a [`RingBuffer`].
///
/// A cursor counts appends, so it keeps increasing across wraparound and a
/// reader can tell how far behind it fell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(u64);

impl Cursor {
    /// Number of appends observed at this position
    pub fn position(&self) -> u64 {
        self.0
    }
}

/// Result of [`RingBuffer::snapshot_since`]
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Lines written after the requested cursor, oldest first
    pub lines: Vec<LogLine>,

    /// Cursor to pass to the next call
    pub cursor: Cursor,

    /// Number of lines overwritten before they could be read
    pub gap: Option<u64>,
}

/// Thread-safe fixed-capacity ring buffer of formatted lines
#[derive(Clone)]
pub struct RingBuffer {
    inner: Arc<RwLock<RingInner>>,
}

struct RingInner {
    /// Backing slots, `None` until first written
    slots: Vec<Option<LogLine>>,

    /// Next slot to write
    write_pos: usize,

    /// Total lines ever written
    total_written: u64,
}

impl RingInner {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entries
    fn live(&self) -> usize {
        self.total_written.min(self.capacity() as u64) as usize
    }

    /// Slot holding the entry `back` positions before the newest one
    fn slot_back(&self, back: usize) -> usize {
        let cap = self.capacity();
        (self.write_pos + cap - 1 - back) % cap
    }

    /// Clone out the newest `n` entries, oldest first
    fn newest(&self, n: usize) -> Vec<LogLine> {
        (0..n)
            .rev()
            .filter_map(|back| self.slots[self.slot_back(back)].clone())
            .collect()
    }
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RwLock::new(RingInner {
                slots: vec![None; capacity],
                write_pos: 0,
                total_written: 0,
            })),
        }
    }

    /// Store a line, overwriting the oldest one once full
    pub fn append(&self, line: LogLine) {
        let mut inner = self.inner.write();
        let pos = inner.write_pos;
        inner.slots[pos] = Some(line);
        inner.write_pos = (pos + 1) % inner.capacity();
        inner.total_written += 1;
    }

    /// Current end of the write sequence
    pub fn cursor(&self) -> Cursor {
        Cursor(self.inner.read().total_written)
    }

    /// Lines appended after `cursor`, oldest first.
    ///
    /// When more than `capacity` appends happened since `cursor`, the unread
    /// tail was overwritten: the snapshot then holds every live line and
    /// reports how many were lost.
    pub fn snapshot_since(&self, cursor: Cursor) -> Snapshot {
        let inner = self.inner.read();
        let end = Cursor(inner.total_written);

        let pending = inner.total_written.saturating_sub(cursor.0);
        let live = inner.live() as u64;

        if pending > live {
            return Snapshot {
                lines: inner.newest(live as usize),
                cursor: end,
                gap: Some(pending - live),
            };
        }

        Snapshot {
            lines: inner.newest(pending as usize),
            cursor: end,
            gap: None,
        }
    }

    /// Walk from the newest line to the oldest, collecting up to `limit`
    /// lines accepted by `predicate`.
    pub fn scan_backward<F>(&self, mut predicate: F, limit: usize) -> Vec<LogLine>
    where
        F: FnMut(&str) -> bool,
    {
        let inner = self.inner.read();
        let mut matches = Vec::new();
        if limit == 0 {
            return matches;
        }

        for back in 0..inner.live() {
            let Some(line) = &inner.slots[inner.slot_back(back)] else {
                continue;
            };
            if predicate(line) {
                matches.push(Arc::clone(line));
                if matches.len() >= limit {
                    break;
                }
            }
        }

        matches
    }

    /// Number of live lines
    pub fn len(&self) -> usize {
        self.inner.read().live()
    }

    /// Check if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of live lines
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    /// Total lines ever appended
    pub fn total_written(&self) -> u64 {
        self.inner.read().total_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(s: &str) -> LogLine {
        Arc::from(s)
    }

    fn texts(lines: &[LogLine]) -> Vec<&str> {
        lines.iter().map(|l| l.as_ref()).collect()
    }

    fn filled(capacity: usize, items: &[&str]) -> RingBuffer {
        let buffer = RingBuffer::new(capacity);
        for item in items {
            buffer.append(line(item));
        }
        buffer
    }

    #[test]
    fn test_overwrite_keeps_most_recent() {
        let buffer = filled(3, &["A", "B", "C", "D"]);
        assert_eq!(buffer.len(), 3);

        let snap = buffer.snapshot_since(Cursor::default());
        assert_eq!(texts(&snap.lines), vec!["B", "C", "D"]);
        assert_eq!(snap.gap, Some(1));
        assert_eq!(snap.cursor.position(), 4);
    }

    #[test]
    fn test_live_entries_after_many_writes() {
        let items: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        let buffer = filled(10, &refs);

        let live = buffer.scan_backward(|_| true, 10);
        let expected: Vec<&str> = refs[15..].iter().rev().copied().collect();
        assert_eq!(texts(&live), expected);
    }

    #[test]
    fn test_scan_backward_newest_first() {
        let buffer = filled(3, &["A", "B", "C", "D"]);
        let lines = buffer.scan_backward(|_| true, 10);
        assert_eq!(texts(&lines), vec!["D", "C", "B"]);
    }

    #[test]
    fn test_scan_backward_skips_unwritten_slots() {
        let buffer = filled(8, &["A", "B"]);
        let lines = buffer.scan_backward(|_| true, 8);
        assert_eq!(texts(&lines), vec!["B", "A"]);
    }

    #[test]
    fn test_scan_backward_stops_at_limit() {
        let buffer = filled(5, &["err 1", "ok", "err 2", "err 3", "ok"]);
        let lines = buffer.scan_backward(|l| l.contains("err"), 2);
        assert_eq!(texts(&lines), vec!["err 3", "err 2"]);

        assert!(buffer.scan_backward(|_| true, 0).is_empty());
    }

    #[test]
    fn test_snapshot_since_returns_only_new_lines() {
        let buffer = filled(4, &["A", "B"]);
        let first = buffer.snapshot_since(Cursor::default());
        assert_eq!(texts(&first.lines), vec!["A", "B"]);
        assert_eq!(first.gap, None);

        buffer.append(line("C"));
        buffer.append(line("D"));
        buffer.append(line("E"));
        let second = buffer.snapshot_since(first.cursor);
        assert_eq!(texts(&second.lines), vec!["C", "D", "E"]);
        assert_eq!(second.gap, None);

        let third = buffer.snapshot_since(second.cursor);
        assert!(third.lines.is_empty());
        assert_eq!(third.cursor, second.cursor);
    }

    #[test]
    fn test_snapshot_exactly_capacity_behind_is_not_a_gap() {
        let buffer = RingBuffer::new(3);
        let start = buffer.cursor();
        for item in ["A", "B", "C"] {
            buffer.append(line(item));
        }
        let snap = buffer.snapshot_since(start);
        assert_eq!(texts(&snap.lines), vec!["A", "B", "C"]);
        assert_eq!(snap.gap, None);
    }

    #[test]
    fn test_snapshot_gap_after_lapping() {
        let buffer = filled(3, &["A"]);
        let cursor = buffer.cursor();
        for item in ["B", "C", "D", "E", "F"] {
            buffer.append(line(item));
        }
        let snap = buffer.snapshot_since(cursor);
        assert_eq!(texts(&snap.lines), vec!["D", "E", "F"]);
        assert_eq!(snap.gap, Some(2));
    }

    #[test]
    fn test_future_cursor_is_caught_up() {
        let buffer = filled(3, &["A"]);
        let snap = buffer.snapshot_since(Cursor(42));
        assert!(snap.lines.is_empty());
        assert_eq!(snap.gap, None);
        assert_eq!(snap.cursor.position(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = filled(0, &["A", "B"]);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(texts(&buffer.scan_backward(|_| true, 5)), vec!["B"]);
    }

    #[test]
    fn test_concurrent_append_and_scan() {
        let buffer = RingBuffer::new(64);
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..5_000 {
                    buffer.append(Arc::from(format!("line {i}")));
                }
            })
        };

        for _ in 0..200 {
            let lines = buffer.scan_backward(|_| true, 64);
            assert!(lines.len() <= 64);
            // Newest first: sequence numbers strictly decrease
            let numbers: Vec<u32> = lines
                .iter()
                .map(|l| l.trim_start_matches("line ").parse().unwrap())
                .collect();
            assert!(numbers.windows(2).all(|w| w[0] == w[1] + 1));
        }

        writer.join().unwrap();
        assert_eq!(buffer.total_written(), 5_000);
        assert_eq!(buffer.len(), 64);
    }
}
