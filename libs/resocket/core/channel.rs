//! Unbounded ordered channel
//!
//! # Architecture
//!
//! ```text
//! transport callback ──push──> crossbeam unbounded queue ──> subscribe() stream
//!                         └──> Notify (wakes a suspended consumer)
//! ```
//!
//! - **Non-blocking producer**: `push` never waits and never fails
//! - **FIFO**: values come out in push order
//! - **Lazy consumers**: `subscribe()` returns a stream that suspends while
//!   the queue is empty; a new subscription continues from the current
//!   head, values already taken are never replayed
//! - **Close**: queued values are still delivered, then every stream ends;
//!   a push either lands before the close and is delivered, or is refused

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Shared<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    notify: Notify,
    closed: AtomicBool,
    // Orders every push against close
    gate: Mutex<()>,
}

/// FIFO carrier between a producer and its consumers
///
/// Cloning yields another handle to the same queue.
pub struct OrderedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for OrderedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for OrderedChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedChannel")
            .field("queued", &self.shared.rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Default for OrderedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedChannel<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                tx,
                rx,
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                gate: Mutex::new(()),
            }),
        }
    }

    /// Enqueue a value
    ///
    /// Values pushed after [`close`](Self::close) are discarded; returns
    /// whether the value was accepted.
    pub fn push(&self, value: T) -> bool {
        {
            let _gate = self.shared.gate.lock();
            if self.shared.closed.load(Ordering::Acquire) {
                return false;
            }
            // The channel owns both ends, so send cannot fail
            let _ = self.shared.tx.send(value);
        }
        self.shared.notify.notify_one();
        true
    }

    /// Take the next value without waiting
    pub fn try_recv(&self) -> Option<T> {
        self.shared.rx.try_recv().ok()
    }

    /// Wait for the next value
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed
            notified.as_mut().enable();

            match self.shared.rx.try_recv() {
                Ok(value) => {
                    // Another consumer may be parked on the same wakeup
                    if !self.shared.rx.is_empty() {
                        self.shared.notify.notify_one();
                    }
                    return Some(value);
                }
                Err(TryRecvError::Empty) => {
                    if self.shared.closed.load(Ordering::Acquire) {
                        // Anything accepted before the close is queued by now
                        return self.shared.rx.try_recv().ok();
                    }
                }
                Err(TryRecvError::Disconnected) => return None,
            }

            notified.await;
        }
    }

    /// Stream of values from the current head onwards
    pub fn subscribe(&self) -> BoxStream<'static, T>
    where
        T: Send + 'static,
    {
        stream::unfold(self.clone(), |channel| async move {
            let next = channel.recv().await;
            next.map(|value| (value, channel))
        })
        .boxed()
    }

    /// Stop accepting values and end all subscriptions after draining
    pub fn close(&self) {
        let first = {
            let _gate = self.shared.gate.lock();
            !self.shared.closed.swap(true, Ordering::AcqRel)
        };
        if first {
            self.shared.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of values waiting to be consumed
    pub fn len(&self) -> usize {
        self.shared.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.rx.is_empty()
    }
}
