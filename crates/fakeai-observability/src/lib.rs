//! FakeAI Observability
//!
//! The event-driven observability pipeline:
//! - [`bus`]: non-blocking pub/sub event dispatcher
//! - [`window`]: sliding-window rate/percentile computation
//! - [`trackers`]: the seven specialized aggregators
//! - [`subscribers`]: adapters binding trackers to the bus
//! - [`metrics`]: Prometheus export

pub mod bus;
pub mod metrics;
pub mod subscribers;
pub mod trackers;
pub mod window;

pub use bus::{EventBus, EventBusHandle, Subscriber};
pub use metrics::Metrics;
pub use window::MetricsWindow;
