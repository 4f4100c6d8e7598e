//! The guts. Pools, queues, the label registry, the broker.

pub mod broker;
pub mod message;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod registry;

pub use broker::{init, init_with, shared, Broker, PoolConfig, SendError};
pub use message::{BlockRef, Label, Message, PoolClass, LABEL_SPACE};
pub use metrics::{
    BrokerMetrics, BrokerMetricsSnapshot, PrometheusExporter, TimerMetrics, TimerMetricsSnapshot,
};
pub use pool::{Arena, BytePool, LARGE_CAP, LARGE_SIZE, SMALL_CAP, SMALL_SIZE};
pub use queue::{BoundedQueue, QUEUE_CAPACITY};
pub use registry::{Inbox, Receivers, Registry, MAX_RECEIVERS};
