//! FakeAI Core Types and Traits
//!
//! Shared data model used by every other FakeAI crate:
//!
//! - [`error`]: Error taxonomy and the OpenAI-style error envelope
//! - [`events`]: Event bus payloads and the 48 event kinds
//! - [`model`]: Model descriptor registry
//! - [`types`]: Request/stream records, workers, rate-limit tiers

pub mod error;
pub mod events;
pub mod model;
pub mod types;

pub use error::{Error, Result};
pub use events::{Event, EventKind, EventPayload};
pub use model::{Capabilities, ModelDescriptor, ModelRegistry};
