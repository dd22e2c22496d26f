//! One-shot reply correlation.
//!
//! The handshake sends one message and waits for exactly one reply with a
//! bounded timeout. Rather than bolting a "wait for next message" hook onto
//! a particular transport, the expectation is registered here: the
//! transport dispatcher offers every inbound text to `resolve`, and the
//! waiter blocks on its end of a rendezvous channel. Expectations are
//! always deregistered: resolution takes the slot, timeout drops the
//! receiver, `cancel` clears the rest.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::RelayError;

/// Correlates one outstanding request with the next inbound reply.
pub(crate) struct ReplyCorrelator {
    slot: Mutex<Option<SyncSender<String>>>,
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Register a one-shot expectation for the next reply. A previously
    /// registered expectation is discarded.
    pub fn expect(&self) -> PendingReply {
        let (sender, receiver) = mpsc::sync_channel(1);
        *self.slot.lock() = Some(sender);
        PendingReply { receiver }
    }

    /// Offer an inbound text to the pending expectation.
    ///
    /// Returns `true` when a waiter consumed it; the expectation is
    /// deregistered either way.
    pub fn resolve(&self, text: &str) -> bool {
        match self.slot.lock().take() {
            Some(sender) => sender.send(text.to_owned()).is_ok(),
            None => false,
        }
    }

    /// Drop any pending expectation, waking its waiter with a closed error.
    pub fn cancel(&self) {
        self.slot.lock().take();
    }
}

/// The waiting end of a registered expectation.
pub(crate) struct PendingReply {
    receiver: Receiver<String>,
}

impl PendingReply {
    /// Block until the reply arrives, the expectation is cancelled, or the
    /// timeout elapses.
    pub fn wait(self, timeout: Duration) -> Result<String, RelayError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(text) => Ok(text),
            Err(RecvTimeoutError::Timeout) => Err(RelayError::HandshakeTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(RelayError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn resolves_pending_reply() {
        let correlator = ReplyCorrelator::new();
        let pending = correlator.expect();

        assert!(correlator.resolve("Channel created"));
        assert_eq!(
            pending.wait(Duration::from_millis(100)),
            Ok("Channel created".into())
        );
    }

    #[test]
    fn resolve_without_expectation_is_ignored() {
        let correlator = ReplyCorrelator::new();
        assert!(!correlator.resolve("stray"));
    }

    #[test]
    fn second_resolve_is_ignored() {
        let correlator = ReplyCorrelator::new();
        let _pending = correlator.expect();

        assert!(correlator.resolve("first"));
        assert!(!correlator.resolve("second"));
    }

    #[test]
    fn wait_times_out() {
        let correlator = ReplyCorrelator::new();
        let pending = correlator.expect();

        assert_eq!(
            pending.wait(Duration::from_millis(20)),
            Err(RelayError::HandshakeTimeout)
        );
    }

    #[test]
    fn cancel_wakes_waiter_with_closed_error() {
        let correlator = ReplyCorrelator::new();
        let pending = correlator.expect();
        correlator.cancel();

        assert_eq!(
            pending.wait(Duration::from_secs(5)),
            Err(RelayError::ConnectionClosed)
        );
    }

    #[test]
    fn reply_from_another_thread_is_received() {
        let correlator = std::sync::Arc::new(ReplyCorrelator::new());
        let pending = correlator.expect();

        let resolver = std::sync::Arc::clone(&correlator);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            resolver.resolve("ok");
        });

        assert_eq!(pending.wait(Duration::from_secs(1)), Ok("ok".into()));
    }
}
