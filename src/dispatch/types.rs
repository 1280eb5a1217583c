use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of one recipient's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Rendering,
    Sending,
    Delivered,
    /// Every send attempt failed
    Exhausted,
    /// Rendering, inlining or message building failed; never retried
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Delivered | DeliveryState::Exhausted | DeliveryState::Failed
        )
    }
}

/// In-memory view of one delivery task.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub template: String,
    pub recipient: String,
    pub state: DeliveryState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    pub(crate) fn new(batch_id: Uuid, template: &str, recipient: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            template: template.to_string(),
            recipient: recipient.to_string(),
            state: DeliveryState::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// What the caller gets back from a send: nothing about delivery itself.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub batch_id: Uuid,
    pub accepted: usize,
    #[serde(skip)]
    pub task_ids: Vec<Uuid>,
}

/// Statistics for the email dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Recipients accepted for processing
    pub total_accepted: AtomicU64,
    /// Messages handed to the SMTP server
    pub total_delivered: AtomicU64,
    /// Messages abandoned after the retry ceiling
    pub total_exhausted: AtomicU64,
    /// Messages that failed without being retried
    pub total_failed: AtomicU64,
    /// SMTP send attempts, retries included
    pub total_attempts: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_exhausted: self.total_exhausted.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_accepted: u64,
    pub total_delivered: u64,
    pub total_exhausted: u64,
    pub total_failed: u64,
    pub total_attempts: u64,
}
