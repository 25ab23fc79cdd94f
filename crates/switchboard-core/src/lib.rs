//! Core types for the switchboard resilience layer.
//!
//! Provides the clock abstraction every timed component reads from, the
//! inbox domain models cached and re-sent by the other crates, and the
//! retry queue event types consumed by the UI layer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{CoreError, LifecycleError, Result};
pub use events::{
    EventHandler, MulticastEventHandler, NoOpEventHandler, QueueEvent, TracingEventHandler,
};
pub use models::{
    Contact, ContactFilters, InstanceId, InstanceSettings, MessageBody, MessageId,
    OutboundMessage, QuickMessage,
};
pub use time::{Clock, RealClock, TestClock};
