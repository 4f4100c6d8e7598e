//! Mailbox: the per-thread endpoint over the shared broker.
//!
//! A mailbox owns one inbox, registers it for labels, and drains it with
//! blocking, timed, or non-blocking receives. Payload blocks handed out
//! by `receive` belong to this mailbox until `release`; [`MessageGuard`]
//! releases on every exit path, panics included.

use std::sync::Arc;
use std::time::Duration;

use zerocopy::{Immutable, IntoBytes};

use crate::core::broker::{shared, Broker, SendError};
use crate::core::message::{Label, Message};
use crate::core::registry::Inbox;

/// A consumer endpoint bound to the process-wide broker.
///
/// Construction lazily initializes the broker with default pool geometry
/// when no explicit [`crate::init`] ran first. Any thread may send
/// through any mailbox; receiving is meant for the owning thread.
pub struct Mailbox {
    broker: &'static Broker,
    inbox: Arc<Inbox>,
}

impl Mailbox {
    /// Mailbox with the default inbox queue depth.
    pub fn new() -> Self {
        Self {
            broker: shared(),
            inbox: Inbox::new(),
        }
    }

    /// Mailbox with a custom inbox queue depth.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            broker: shared(),
            inbox: Inbox::with_capacity(queue_capacity),
        }
    }

    /// Register to receive messages and signals published to `label`.
    ///
    /// False when the label already has its full set of receivers.
    /// Registering the same mailbox twice occupies two slots and the
    /// mailbox is then delivered to once per slot.
    pub fn register(&self, label: Label) -> bool {
        self.broker.register(label, &self.inbox)
    }

    /// Cancel a registration. False when this mailbox held no slot at
    /// `label`.
    pub fn unregister(&self, label: Label) -> bool {
        self.broker.unregister(label, &self.inbox)
    }

    /// Send a byte-copyable value to every receiver of `label`.
    ///
    /// True iff every occupied receiver slot was delivered to; deliveries
    /// that did succeed are not rolled back on a partial failure.
    pub fn send<T: IntoBytes + Immutable>(&self, label: Label, value: &T) -> bool {
        self.broker.publish_value(label, value).is_ok()
    }

    /// [`send`](Self::send) with the failure kind preserved.
    pub fn try_send<T: IntoBytes + Immutable>(
        &self,
        label: Label,
        value: &T,
    ) -> Result<(), SendError> {
        self.broker.publish_value(label, value)
    }

    /// Send raw payload bytes to every receiver of `label`.
    pub fn send_bytes(&self, label: Label, payload: &[u8]) -> bool {
        self.broker.publish_bytes(label, payload).is_ok()
    }

    /// Send a zero-payload signal to every receiver of `label`.
    pub fn signal(&self, label: Label) -> bool {
        self.broker.publish_signal(label).is_ok()
    }

    /// Block until a message or signal arrives.
    pub fn receive(&self) -> Message {
        self.broker.receive(&self.inbox)
    }

    /// Wait up to `timeout` for a message or signal.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Message> {
        self.inbox.queue().pop_wait(timeout)
    }

    /// Non-blocking receive.
    pub fn try_receive(&self) -> Option<Message> {
        self.inbox.queue().try_pop()
    }

    /// Return a received message's payload block to its pool. No-op for
    /// signals and for messages already released.
    pub fn release(&self, msg: &mut Message) {
        self.broker.release(msg);
    }

    /// Descriptors waiting in this mailbox.
    pub fn pending(&self) -> usize {
        self.inbox.queue().len()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        // Dropping while registered leaves the inbox reachable from the
        // registry with nobody draining it.
        debug_assert_eq!(
            self.inbox.registration_count(),
            0,
            "mailbox dropped while still registered"
        );
    }
}

/// Scoped release: hands the message back to its pool when the guard
/// leaves scope, on early returns and panics alike.
pub struct MessageGuard<'a> {
    mailbox: &'a Mailbox,
    msg: Message,
}

impl<'a> MessageGuard<'a> {
    pub fn new(mailbox: &'a Mailbox, msg: Message) -> Self {
        Self { mailbox, msg }
    }

    #[inline(always)]
    pub fn message(&self) -> &Message {
        &self.msg
    }
}

impl core::ops::Deref for MessageGuard<'_> {
    type Target = Message;

    #[inline(always)]
    fn deref(&self) -> &Message {
        &self.msg
    }
}

impl Drop for MessageGuard<'_> {
    fn drop(&mut self) {
        self.mailbox.release(&mut self.msg);
    }
}

