use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use logcollect_types::Payload;

use crate::broadcast::Broadcaster;
use crate::buffer::{Cursor, RingBuffer};
use crate::echo::ConsoleEcho;

/// Outcome of one [`PeriodicPublisher::tick`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Lines drained this tick
    pub lines: usize,
    /// Lines overwritten before they were drained
    pub gap: Option<u64>,
    /// Subscribers that received the batch
    pub delivered: usize,
}

/// Drains new lines from the buffer on a timer and hands them to the
/// broadcaster and, optionally, the console.
pub struct PeriodicPublisher {
    buffer: RingBuffer,
    broadcaster: Broadcaster,
    cursor: Cursor,
    echo: Option<ConsoleEcho>,
}

impl PeriodicPublisher {
    /// Start publishing from the buffer's current end
    pub fn new(buffer: RingBuffer, broadcaster: Broadcaster) -> Self {
        let cursor = buffer.cursor();
        Self {
            buffer,
            broadcaster,
            cursor,
            echo: None,
        }
    }

    /// Also hand every drained batch to the console writer
    pub fn with_echo(mut self, echo: ConsoleEcho) -> Self {
        self.echo = Some(echo);
        self
    }

    /// Position of the last drained line
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Drain everything appended since the previous tick
    pub fn tick(&mut self) -> TickReport {
        let snapshot = self.buffer.snapshot_since(self.cursor);

        if let Some(lost) = snapshot.gap {
            tracing::warn!(
                lost,
                capacity = self.buffer.capacity(),
                "buffer overwrote undrained lines, resynchronizing"
            );
        }

        let mut report = TickReport {
            lines: snapshot.lines.len(),
            gap: snapshot.gap,
            delivered: 0,
        };

        if !snapshot.lines.is_empty() {
            let payload: Payload = Arc::from(snapshot.lines.concat());
            if let Some(echo) = self.echo.as_mut() {
                echo.send(Arc::clone(&payload));
            }
            report.delivered = self.broadcaster.publish(payload).delivered;
        }

        self.cursor = snapshot.cursor;
        report
    }

    /// Tick every `period` until `cancel` fires
    pub async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    let report = self.tick();
                    if report.lines > 0 {
                        tracing::debug!(
                            lines = report.lines,
                            delivered = report.delivered,
                            "published batch"
                        );
                    }
                }
            }
        }

        tracing::info!("periodic publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    /// Write sink that tests can inspect afterwards
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn append(buffer: &RingBuffer, lines: &[&str]) {
        for line in lines {
            buffer.append(Arc::from(format!("{line}\n")));
        }
    }

    #[test]
    fn test_tick_publishes_new_lines_in_order() {
        let buffer = RingBuffer::new(8);
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let mut publisher = PeriodicPublisher::new(buffer.clone(), broadcaster.clone());

        append(&buffer, &["a", "b", "c"]);
        let report = publisher.tick();
        assert_eq!(report.lines, 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(sub.try_recv().as_deref(), Some("a\nb\nc\n"));

        append(&buffer, &["d"]);
        publisher.tick();
        assert_eq!(sub.try_recv().as_deref(), Some("d\n"));
    }

    #[test]
    fn test_empty_tick_publishes_nothing() {
        let buffer = RingBuffer::new(8);
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let mut publisher = PeriodicPublisher::new(buffer, broadcaster.clone());

        assert_eq!(publisher.tick(), TickReport::default());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_starts_at_current_end() {
        let buffer = RingBuffer::new(8);
        append(&buffer, &["old"]);
        let mut publisher = PeriodicPublisher::new(buffer.clone(), Broadcaster::default());

        append(&buffer, &["new"]);
        assert_eq!(publisher.tick().lines, 1);
    }

    #[test]
    fn test_gap_resynchronizes() {
        let buffer = RingBuffer::new(3);
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let mut publisher = PeriodicPublisher::new(buffer.clone(), broadcaster.clone());

        append(&buffer, &["1", "2", "3", "4", "5"]);
        let report = publisher.tick();
        assert_eq!(report.gap, Some(2));
        assert_eq!(sub.try_recv().as_deref(), Some("3\n4\n5\n"));
        assert_eq!(publisher.cursor(), buffer.cursor());

        append(&buffer, &["6"]);
        let report = publisher.tick();
        assert_eq!(report.gap, None);
        assert_eq!(sub.try_recv().as_deref(), Some("6\n"));
    }

    #[test]
    fn test_echo_matches_broadcast_order() {
        let buffer = RingBuffer::new(8);
        let sink = SharedSink::default();
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let mut publisher = PeriodicPublisher::new(buffer.clone(), broadcaster.clone())
            .with_echo(ConsoleEcho::spawn(Box::new(sink.clone()), 4).unwrap());

        append(&buffer, &["x", "y"]);
        publisher.tick();
        append(&buffer, &["z"]);
        publisher.tick();

        publisher.echo.take().unwrap().close();
        assert_eq!(sink.text(), "x\ny\nz\n");
        assert_eq!(sub.try_recv().as_deref(), Some("x\ny\n"));
        assert_eq!(sub.try_recv().as_deref(), Some("z\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_cancelled() {
        let buffer = RingBuffer::new(8);
        let broadcaster = Broadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        let cancel = CancellationToken::new();

        let publisher = PeriodicPublisher::new(buffer.clone(), broadcaster.clone());
        let task = tokio::spawn(publisher.run(Duration::from_secs(3), cancel.clone()));

        append(&buffer, &["hello"]);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(sub.recv().await.as_deref(), Some("hello\n"));

        cancel.cancel();
        task.await.unwrap();
    }
}
