//! A bounded, FIFO channel whose items optionally carry a one-shot
//! acknowledgement signal fired when the item is dequeued.
//!
//! HTTP/2 DATA frames need per-frame backpressure (a writer should pause
//! when the peer cannot absorb more), while control operations must never be
//! blocked behind that backpressure. Attaching the signal only to the items
//! that need it lets one channel type serve both cases: send without an ack
//! to avoid waiting, or send with one and await it to know the item has been
//! taken off the queue.

use tokio::sync::{mpsc, oneshot};

/// Fired when the paired item is dequeued by [`NotifyingReceiver::recv`].
pub type AckSender = oneshot::Sender<()>;

/// Creates a bounded notifying channel with room for `capacity` items.
pub fn notifying_channel<T>(capacity: usize) -> (NotifyingSender<T>, NotifyingReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotifyingSender { tx }, NotifyingReceiver { rx })
}

/// The sending half of a [`notifying_channel`].
pub struct NotifyingSender<T> {
    tx: mpsc::Sender<(T, Option<AckSender>)>,
}

impl<T> NotifyingSender<T> {
    /// Sends `item`, optionally paired with an ack sender that fires once the
    /// receiver dequeues it. Suspends when the channel is full.
    ///
    /// Returns an error if the receiving half has been dropped or explicitly
    /// closed.
    pub async fn send(&self, item: T, ack: Option<AckSender>) -> Result<(), SendError> {
        self.tx.send((item, ack)).await.map_err(|_| SendError)
    }
}

impl<T> Clone for NotifyingSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Returned when a [`NotifyingSender::send`] fails because the receiver is gone.
#[derive(Debug, thiserror::Error)]
#[error("notifying channel is closed")]
pub struct SendError;

/// The receiving half of a [`notifying_channel`].
pub struct NotifyingReceiver<T> {
    rx: mpsc::Receiver<(T, Option<AckSender>)>,
}

impl<T> NotifyingReceiver<T> {
    /// Dequeues the next item, firing its ack signal (if any) before
    /// returning. Returns `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        let (item, ack) = self.rx.recv().await?;
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        Some(item)
    }

    /// Closes the receiving half; subsequent sends fail immediately.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Dequeues an already-buffered item without waiting, firing its ack
    /// signal (if any) before returning. Used to drain a channel on close
    /// without blocking on new sends.
    pub fn try_recv(&mut self) -> Option<T> {
        let (item, ack) = self.rx.try_recv().ok()?;
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        Some(item)
    }
}
