//! The `ByteSink` capability: where rendered PDF bytes go.
//!
//! The render pipeline (C5) is written against this trait instead of a
//! concrete streaming type so the core stays free of any particular HTTP or
//! I/O framework — an integrator plugs in whatever `ByteSink` fits their
//! response type (a channel into a streaming HTTP body, a `Vec<u8>` for a
//! buffered response, a file).

use std::future::Future;

/// A destination for the bytes of one rendered PDF.
///
/// `write` is async so a channel-backed sink can apply real backpressure
/// (awaiting channel capacity); `stopped` is a cheap synchronous check the
/// render loop polls between `IO.read` iterations so it can abandon a
/// render promptly once the consumer has gone away, without waiting for the
/// next `write` to fail.
pub trait ByteSink: Send {
    /// Writes one chunk of decoded PDF bytes.
    fn write(&mut self, bytes: Vec<u8>) -> impl Future<Output = ()> + Send;

    /// Signals that no more bytes will be written.
    fn complete(&mut self) -> impl Future<Output = ()> + Send;

    /// Whether the consumer has asked for early termination. Checked by the
    /// render loop between `IO.read` iterations (spec §4.5 step 6).
    fn stopped(&self) -> bool {
        false
    }
}

/// An in-memory sink that buffers the whole PDF, for callers that want a
/// single `Vec<u8>` rather than a stream.
#[derive(Debug, Default)]
pub struct VecSink {
    pub buf: Vec<u8>,
    pub completed: bool,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteSink for VecSink {
    async fn write(&mut self, bytes: Vec<u8>) {
        self.buf.extend_from_slice(&bytes);
    }

    async fn complete(&mut self) {
        self.completed = true;
    }
}

/// A sink that forwards chunks over a bounded channel, suitable for piping
/// into a streaming HTTP response body. Closing or dropping the receiver
/// causes subsequent writes to complete immediately without blocking, and
/// marks the sink stopped so the render loop unwinds on its next check.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<Vec<u8>>,
    stopped: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (
            Self {
                tx,
                stopped: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            },
            rx,
        )
    }
}

impl ByteSink for ChannelSink {
    async fn write(&mut self, bytes: Vec<u8>) {
        if self.tx.send(bytes).await.is_err() {
            self.stopped
                .store(true, std::sync::atomic::Ordering::Relaxed);
        }
    }

    async fn complete(&mut self) {
        // Dropping `tx` (on `self`'s drop) closes the receiver's stream;
        // nothing further to signal here.
    }

    fn stopped(&self) -> bool {
        self.stopped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_sink_accumulates_and_completes() {
        let mut sink = VecSink::new();
        sink.write(vec![1, 2, 3]).await;
        sink.write(vec![4, 5]).await;
        sink.complete().await;
        assert_eq!(sink.buf, vec![1, 2, 3, 4, 5]);
        assert!(sink.completed);
        assert!(!sink.stopped());
    }

    #[tokio::test]
    async fn channel_sink_marks_stopped_when_receiver_dropped() {
        let (mut sink, rx) = ChannelSink::new(1);
        drop(rx);
        sink.write(vec![1]).await;
        assert!(sink.stopped());
    }

    #[tokio::test]
    async fn channel_sink_forwards_bytes_to_receiver() {
        let (mut sink, mut rx) = ChannelSink::new(4);
        sink.write(vec![9, 9]).await;
        assert_eq!(rx.recv().await, Some(vec![9, 9]));
        assert!(!sink.stopped());
    }
}
