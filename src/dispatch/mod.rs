//! Bulk email dispatch.
//!
//! Every accepted recipient gets its own tokio task that renders the template,
//! inlines CSS and hands the message to the transport under a [`RetryPolicy`].
//! The caller only learns how many recipients were accepted.

mod dispatcher;
mod retry;
mod types;

pub use dispatcher::EmailDispatcher;
pub use retry::{Backoff, BackoffConfig, RetryOutcome, RetryPolicy, Retryable};
pub use types::{
    DeliveryRecord, DeliveryState, DispatcherStats, DispatcherStatsSnapshot, SendReceipt,
};
