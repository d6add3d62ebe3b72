//! Console echo
//!
//! Writes to the console are blocking, so they run on their own thread fed
//! by a bounded channel. A stalled console drops batches instead of holding
//! up the publisher.

use std::io::{self, Write};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use logcollect_types::Payload;

/// Batches queued for the writer thread before new ones are dropped
pub const DEFAULT_ECHO_QUEUE: usize = 64;

/// Handle to the console writer thread
pub struct ConsoleEcho {
    batches: Option<SyncSender<Payload>>,
    writer: Option<JoinHandle<()>>,
    dropped: u64,
}

impl ConsoleEcho {
    /// Start the writer thread for `sink`
    pub fn spawn(mut sink: Box<dyn Write + Send>, queue: usize) -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Payload>(queue.max(1));

        let writer = thread::Builder::new()
            .name("console-echo".into())
            .spawn(move || {
                for batch in rx {
                    if let Err(e) = sink.write_all(batch.as_bytes()).and_then(|()| sink.flush()) {
                        tracing::warn!(error = %e, "console echo failed, stopping");
                        break;
                    }
                }
            })?;

        Ok(Self {
            batches: Some(tx),
            writer: Some(writer),
            dropped: 0,
        })
    }

    /// Queue a batch without waiting. Returns false if it was dropped.
    pub fn send(&mut self, batch: Payload) -> bool {
        let Some(batches) = &self.batches else {
            return false;
        };

        match batches.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "console is not keeping up, batch dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.batches = None;
                false
            }
        }
    }

    /// Batches dropped because the writer was behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Stop accepting batches and wait until the queued ones are written
    pub fn close(mut self) {
        self.batches.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

impl std::fmt::Debug for ConsoleEcho {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleEcho")
            .field("open", &self.batches.is_some())
            .field("dropped", &self.dropped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Blocks every write until the gate sender is dropped
    struct GatedSink {
        gate: mpsc::Receiver<()>,
        out: SharedSink,
    }

    impl Write for GatedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let _ = self.gate.recv();
            self.out.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_batches_in_order() {
        let sink = SharedSink::default();
        let mut echo = ConsoleEcho::spawn(Box::new(sink.clone()), 8).unwrap();

        assert!(echo.send(Arc::from("a\nb\n")));
        assert!(echo.send(Arc::from("c\n")));
        echo.close();

        assert_eq!(sink.text(), "a\nb\nc\n");
    }

    #[test]
    fn test_stalled_sink_drops_instead_of_blocking() {
        let out = SharedSink::default();
        let (gate_tx, gate) = mpsc::channel();
        let mut echo = ConsoleEcho::spawn(
            Box::new(GatedSink {
                gate,
                out: out.clone(),
            }),
            1,
        )
        .unwrap();

        for i in 0..10 {
            echo.send(Arc::from(format!("{i}\n")));
        }

        // One batch in the writer, one in the queue
        let dropped = echo.dropped();
        assert!(dropped >= 8, "dropped {dropped}");

        drop(gate_tx);
        echo.close();

        let text = out.text();
        assert!(text.starts_with("0\n"), "{text}");
        assert_eq!(text.lines().count() as u64, 10 - dropped);
    }

    #[test]
    fn test_failed_sink_stops_accepting() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut echo = ConsoleEcho::spawn(Box::new(Broken), 4).unwrap();
        echo.send(Arc::from("x\n"));

        let writer = echo.writer.take().unwrap();
        writer.join().unwrap();
        assert!(!echo.send(Arc::from("y\n")));
        assert!(echo.batches.is_none());
    }
}
