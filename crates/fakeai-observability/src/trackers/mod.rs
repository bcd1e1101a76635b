//! The seven specialized trackers. Each is updated only by its bound
//! subscriber; readers call accessor methods that return copies, never
//! live references, so trackers never block writers behind reader locks
//! for more than a brief window.

pub mod cost;
pub mod dynamo;
pub mod error;
pub mod kv_cache;
pub mod model;
pub mod request;
pub mod streaming;

pub use cost::CostTracker;
pub use dynamo::DynamoTracker;
pub use error::ErrorTracker;
pub use kv_cache::KVCacheMetrics;
pub use model::ModelTracker;
pub use request::RequestTracker;
pub use streaming::StreamingTracker;
