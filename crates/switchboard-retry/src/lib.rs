//! Delivery retry queue for outbound inbox messages.
//!
//! When a send through the gateway fails, the message is recorded in a
//! [`RetryQueue`] instead of being lost. The UI (or the optional
//! [`AutoRetryScheduler`]) re-attempts single items or the whole queue, and
//! a [`RetryPolicy`] decides when to give up.
//!
//! ```text
//! MessageSender ──send──▶ MessageTransport ──▶ gateway
//!       │ failure
//!       ▼
//!  RetryQueue ◀── retry / retry_all ── UI
//!       ▲
//!       └──── retry_due ── AutoRetryScheduler
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod sender;
pub mod transport;

pub use client::{ClientConfig, GatewayTransport};
pub use error::{ErrorCategory, Result, SendError};
pub use policy::{BackoffStrategy, RetryContext, RetryDecision, RetryPolicy};
pub use queue::{RetryAllReport, RetryOutcome, RetryQueue, RetryQueueItem, RetryStatus};
pub use scheduler::{AutoRetryScheduler, SchedulerConfig};
pub use sender::{MessageSender, SendReport};
pub use transport::MessageTransport;
