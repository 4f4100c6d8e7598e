//! The broker: publish paths, payload copy, per-subscriber enqueue,
//! descriptor release, and the process-wide lifecycle.

use std::sync::{Arc, OnceLock};

use zerocopy::{Immutable, IntoBytes};

use super::message::{BlockRef, Label, Message, PoolClass};
use super::metrics::BrokerMetrics;
use super::pool::{Arena, BytePool, LARGE_CAP, LARGE_SIZE, SMALL_CAP, SMALL_SIZE};
use super::registry::{Inbox, Registry};

/// Delivery failed. Check the variant for why.
///
/// Under the partial-success policy this is the first failure seen while
/// fanning out; other subscribers may still have received the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendError {
    /// Payload exceeds the large block size. Nothing was published.
    PayloadTooLarge = 1,
    /// No free block for at least one subscriber.
    PoolExhausted = 2,
    /// At least one subscriber's inbox was at capacity.
    QueueFull = 3,
}

/// Pool geometry, fixed at initialization.
///
/// Block sizes are padded up to the pool alignment and must fit the
/// 16-bit descriptor size field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub small_size: usize,
    pub small_cap: usize,
    pub large_size: usize,
    pub large_cap: usize,
}

impl PoolConfig {
    fn normalized(self) -> Self {
        Self {
            small_size: BytePool::padded_elt_size(self.small_size),
            small_cap: self.small_cap,
            large_size: BytePool::padded_elt_size(self.large_size),
            large_cap: self.large_cap,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            small_size: SMALL_SIZE,
            small_cap: SMALL_CAP,
            large_size: LARGE_SIZE,
            large_cap: LARGE_CAP,
        }
    }
}

/// One broker universe: the label registry, both payload pools over a
/// shared arena, and the publish-path metrics.
///
/// The process-wide instance lives behind [`shared`]; standalone values
/// are constructible for tests and embedders that want isolation.
pub struct Broker {
    registry: Registry,
    small: BytePool,
    large: BytePool,
    metrics: BrokerMetrics,
}

impl Broker {
    pub fn new(config: PoolConfig) -> Self {
        let config = config.normalized();
        debug_assert!(config.small_size <= config.large_size);
        debug_assert!(config.large_size <= u16::MAX as usize);

        let small_bytes = config.small_size * config.small_cap;
        let large_bytes = config.large_size * config.large_cap;
        let arena = Arc::new(Arena::new(small_bytes + large_bytes));

        Self {
            registry: Registry::new(),
            small: BytePool::new(
                arena.clone(),
                PoolClass::Small,
                0,
                config.small_size,
                config.small_cap,
            ),
            large: BytePool::new(
                arena,
                PoolClass::Large,
                small_bytes,
                config.large_size,
                config.large_cap,
            ),
            metrics: BrokerMetrics::new(),
        }
    }

    /// Register `inbox` as a receiver for `label`. False when the label's
    /// receiver slots are all taken.
    pub fn register(&self, label: Label, inbox: &Arc<Inbox>) -> bool {
        self.registry.register(label, inbox)
    }

    /// Remove `inbox` from `label`. False when it held no slot there.
    pub fn unregister(&self, label: Label, inbox: &Arc<Inbox>) -> bool {
        let was_registered = self.registry.is_registered(label, inbox);
        self.registry.unregister(label, inbox);
        was_registered
    }

    /// Publish `payload` to every receiver of `label`.
    ///
    /// Chooses the pool class by payload size, copies the bytes into one
    /// block per subscriber, and enqueues a descriptor into each inbox.
    /// Fan-out iterates every occupied slot even after a failure; the
    /// result reports the first failure while the remaining subscribers
    /// still receive. Zero subscribers is a successful no-op.
    pub fn publish_bytes(&self, label: Label, payload: &[u8]) -> Result<(), SendError> {
        let size = payload.len();
        // A zero-byte payload is a signal; descriptors carry a block only
        // when size > 0.
        if size == 0 {
            return self.publish_signal(label);
        }
        if size > self.large.elt_size() {
            self.metrics.record_payload_reject();
            return Err(SendError::PayloadTooLarge);
        }
        let pool = if size <= self.small.elt_size() {
            &self.small
        } else {
            &self.large
        };

        self.metrics.record_publish();
        let mut first_failure = None;

        // Lock order: registry, then each inbox queue inside try_push.
        let table = self.registry.lock();
        for inbox in table[label as usize].iter() {
            let Some(index) = pool.alloc() else {
                self.metrics.record_pool_exhausted();
                first_failure.get_or_insert(SendError::PoolExhausted);
                continue;
            };
            pool.write_block(index, payload);
            let block = BlockRef {
                class: pool.class(),
                index,
            };
            let msg = Message::with_block(label, size as u16, block, pool.block_ptr(index));
            if inbox.queue().try_push(msg) {
                self.metrics.record_delivery();
            } else {
                pool.free(index);
                self.metrics.record_queue_full();
                first_failure.get_or_insert(SendError::QueueFull);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Publish a byte-copyable value. The receiver gets back a byte-exact
    /// copy recoverable with [`Message::decode`].
    pub fn publish_value<T: IntoBytes + Immutable>(
        &self,
        label: Label,
        value: &T,
    ) -> Result<(), SendError> {
        self.publish_bytes(label, value.as_bytes())
    }

    /// Publish a zero-payload signal: same fan-out shape, no pool
    /// interaction.
    pub fn publish_signal(&self, label: Label) -> Result<(), SendError> {
        self.metrics.record_signal();
        let mut first_failure = None;

        let table = self.registry.lock();
        for inbox in table[label as usize].iter() {
            if inbox.queue().try_push(Message::signal(label)) {
                self.metrics.record_delivery();
            } else {
                self.metrics.record_queue_full();
                first_failure.get_or_insert(SendError::QueueFull);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Block until a descriptor is available on `inbox`.
    pub fn receive(&self, inbox: &Inbox) -> Message {
        inbox.queue().pop()
    }

    /// Return a descriptor's block to its pool. Routed by the recorded
    /// pool class, never by payload size. No-op for signals and for
    /// descriptors already released.
    pub fn release(&self, msg: &mut Message) {
        if let Some(block) = msg.block() {
            self.pool(block.class).free(block.index);
            msg.clear_block();
        }
    }

    #[inline(always)]
    fn pool(&self, class: PoolClass) -> &BytePool {
        match class {
            PoolClass::Small => &self.small,
            PoolClass::Large => &self.large,
        }
    }

    #[inline(always)]
    pub fn small_pool(&self) -> &BytePool {
        &self.small
    }

    #[inline(always)]
    pub fn large_pool(&self) -> &BytePool {
        &self.large
    }

    #[inline(always)]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline(always)]
    pub fn metrics(&self) -> &BrokerMetrics {
        &self.metrics
    }
}

static SHARED: OnceLock<(PoolConfig, Arc<Broker>)> = OnceLock::new();

fn shared_entry(config: PoolConfig) -> &'static (PoolConfig, Arc<Broker>) {
    SHARED.get_or_init(|| (config, Arc::new(Broker::new(config))))
}

/// Initialize the process-wide broker with default pool geometry.
/// Idempotent; see [`init_with`].
pub fn init() -> bool {
    init_with(PoolConfig::default())
}

/// Initialize the process-wide broker.
///
/// The first call wins. A later call with the same configuration is a
/// successful no-op; a later call with a different configuration returns
/// false and does not reconfigure.
pub fn init_with(config: PoolConfig) -> bool {
    let config = config.normalized();
    shared_entry(config).0 == config
}

/// The process-wide broker, lazily constructed with defaults when no
/// explicit `init` ran first.
pub fn shared() -> &'static Broker {
    &shared_entry(PoolConfig::default().normalized()).1
}
