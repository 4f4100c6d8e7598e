//! # Crossbar
//!
//! An in-process, label-addressed message broker with an integrated
//! timer service, for systems built around a fixed set of cooperating
//! worker threads exchanging small typed payloads and scheduled events.
//!
//! ## Core Philosophy
//!
//! All routing state is carved out up front: two fixed-block payload
//! pools over one arena, a dense label table with bounded receiver
//! slots, and bounded per-subscriber inboxes. The publish path allocates
//! nothing from the system allocator and fails fast instead of blocking.
//!
//! ## Primary API Surface
//!
//! - [`init`] / [`init_with`] - One-time setup of the shared broker
//! - [`Mailbox`] - Per-thread endpoint: register, send, signal, receive
//! - [`Message`] - Delivered descriptor with size-checked typed decode
//! - [`MessageGuard`] - Scoped release of a received payload block
//! - [`TimerManager`] - One-shot and periodic timers as broker signals
//!
//! ## Design Constraints
//!
//! - **Bounded everything**: `MAX_RECEIVERS` slots per label, fixed pool
//!   capacities, fixed inbox depth; the bounds are the contract
//! - **Byte-copyable payloads** via `zerocopy` (`IntoBytes`/`FromBytes`)
//! - **No back-pressure**: a full pool or inbox drops that delivery and
//!   reports it; nothing is rolled back
//! - One reserved real-time signal (`SIGRTMIN`) for timer dispatch
//!
//! ## Example
//!
//! ```rust
//! use crossbar::prelude::*;
//! use zerocopy::{FromBytes, Immutable, IntoBytes};
//!
//! #[derive(IntoBytes, FromBytes, Immutable, Clone, Copy, PartialEq, Debug)]
//! #[repr(C)]
//! struct Reading {
//!     sensor: u32,
//!     value: u32,
//! }
//!
//! const READINGS: Label = 42;
//!
//! crossbar::init();
//!
//! let consumer = Mailbox::new();
//! assert!(consumer.register(READINGS));
//!
//! let producer = Mailbox::new();
//! assert!(producer.send(READINGS, &Reading { sensor: 7, value: 99 }));
//!
//! let msg = consumer.receive();
//! let guard = MessageGuard::new(&consumer, msg);
//! assert_eq!(guard.label(), READINGS);
//! assert_eq!(
//!     guard.decode::<Reading>(),
//!     Some(Reading { sensor: 7, value: 99 })
//! );
//! drop(guard);
//!
//! assert!(consumer.unregister(READINGS));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod core;
pub mod mailbox;
pub mod timer;

/// Prelude for convenient imports of primary API types.
pub mod prelude {
    pub use crate::core::{init, init_with, Label, Message, PoolConfig, SendError};
    pub use crate::mailbox::{Mailbox, MessageGuard};
    pub use crate::timer::{TimerKind, TimerManager};
}

// Re-export primary types at crate root for convenience.
pub use crate::core::{
    init, init_with, shared, BlockRef, Label, Message, PoolClass, PoolConfig, SendError,
    MAX_RECEIVERS, QUEUE_CAPACITY,
};
pub use crate::mailbox::{Mailbox, MessageGuard};
pub use crate::timer::{TimerKind, TimerManager};
