// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot handoff between two threads
//!
//! One side produces exactly one value, the other waits for it. Neither half
//! can be cloned, and [`Producer::fulfil`] consumes the producer, so a value
//! is delivered at most once. Dropping the producer unfulfilled wakes the
//! consumer with [`RendezvousError::Abandoned`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::Duration;

/// Why a consumer came back without a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousError {
    /// The producer was dropped without delivering
    Abandoned,
    /// The timeout elapsed first
    TimedOut,
}

impl std::fmt::Display for RendezvousError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RendezvousError::Abandoned => write!(f, "producer dropped without a result"),
            RendezvousError::TimedOut => write!(f, "timed out waiting for result"),
        }
    }
}

impl std::error::Error for RendezvousError {}

/// Create a connected producer/consumer pair
pub fn rendezvous<T: Send>() -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    let gone = Arc::new(AtomicBool::new(false));
    (
        Producer {
            tx,
            consumer_gone: Arc::clone(&gone),
        },
        Consumer { rx, gone },
    )
}

/// Producing half, consumed on delivery
#[derive(Debug)]
pub struct Producer<T> {
    tx: SyncSender<T>,
    consumer_gone: Arc<AtomicBool>,
}

impl<T: Send> Producer<T> {
    /// Deliver the value. Returns `false` if the consumer is already gone.
    pub fn fulfil(self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }

    /// Whether the consumer gave up waiting or was dropped
    pub fn is_abandoned(&self) -> bool {
        self.consumer_gone.load(Ordering::Acquire)
    }
}

/// Waiting half
#[derive(Debug)]
pub struct Consumer<T> {
    rx: Receiver<T>,
    gone: Arc<AtomicBool>,
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.gone.store(true, Ordering::Release);
    }
}

impl<T: Send> Consumer<T> {
    /// Block until the value arrives, the producer is dropped, or `timeout`
    /// elapses. `None` waits without limit.
    pub fn wait(self, timeout: Option<Duration>) -> Result<T, RendezvousError> {
        match timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => RendezvousError::TimedOut,
                RecvTimeoutError::Disconnected => RendezvousError::Abandoned,
            }),
            None => self.rx.recv().map_err(|_| RendezvousError::Abandoned),
        }
    }

    /// Take the value if it has already been delivered
    pub fn try_take(&self) -> Result<Option<T>, RendezvousError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RendezvousError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_value_crosses_threads() {
        let (producer, consumer) = rendezvous();
        let handle = thread::spawn(move || producer.fulfil(7u32));

        assert_eq!(consumer.wait(Some(Duration::from_secs(1))), Ok(7));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_dropped_producer_abandons() {
        let (producer, consumer) = rendezvous::<u32>();
        drop(producer);
        assert_eq!(consumer.wait(None), Err(RendezvousError::Abandoned));
    }

    #[test]
    fn test_wait_times_out() {
        let (_producer, consumer) = rendezvous::<u32>();
        assert_eq!(
            consumer.wait(Some(Duration::from_millis(10))),
            Err(RendezvousError::TimedOut)
        );
    }

    #[test]
    fn test_fulfil_after_consumer_dropped() {
        let (producer, consumer) = rendezvous::<u32>();
        drop(consumer);
        assert!(!producer.fulfil(1));
    }

    #[test]
    fn test_producer_sees_consumer_give_up() {
        let (producer, consumer) = rendezvous::<u32>();
        assert!(!producer.is_abandoned());

        assert_eq!(
            consumer.wait(Some(Duration::from_millis(5))),
            Err(RendezvousError::TimedOut)
        );
        assert!(producer.is_abandoned());
    }

    #[test]
    fn test_try_take_before_and_after_delivery() {
        let (producer, consumer) = rendezvous::<&'static str>();
        assert_eq!(consumer.try_take(), Ok(None));
        producer.fulfil("ready");
        assert_eq!(consumer.try_take(), Ok(Some("ready")));
    }
}
