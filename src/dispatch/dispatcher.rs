use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::retry::{RetryOutcome, RetryPolicy};
use super::types::{
    DeliveryRecord, DeliveryState, DispatcherStats, DispatcherStatsSnapshot, SendReceipt,
};
use crate::metrics::{DeliveryMetrics, FailureStage};
use crate::template::{
    inline_css, InlineAttachment, Recipient, RenderContext, TemplateError, TemplateRenderer,
};
use crate::transport::{MailTransport, OutgoingEmail};

/// Default maximum number of delivery tasks running at once
const DEFAULT_MAX_CONCURRENCY: usize = 100;

/// Finished records older than this are dropped on the next send
const RECORD_RETENTION_MINUTES: i64 = 60;

/// Dispatches templated emails to many recipients.
pub struct EmailDispatcher {
    renderer: TemplateRenderer,
    transport: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
    records: Arc<DashMap<Uuid, DeliveryRecord>>,
    handles: DashMap<Uuid, JoinHandle<()>>,
    stats: Arc<DispatcherStats>,
}

impl EmailDispatcher {
    pub fn new(renderer: TemplateRenderer, transport: Arc<dyn MailTransport>) -> Self {
        Self::with_policy(
            renderer,
            transport,
            RetryPolicy::default(),
            DEFAULT_MAX_CONCURRENCY,
        )
    }

    pub fn with_policy(
        renderer: TemplateRenderer,
        transport: Arc<dyn MailTransport>,
        retry: RetryPolicy,
        max_concurrency: usize,
    ) -> Self {
        Self {
            renderer,
            transport,
            retry,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
            records: Arc::new(DashMap::new()),
            handles: DashMap::new(),
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn record(&self, id: &Uuid) -> Option<DeliveryRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn batch(&self, batch_id: &Uuid) -> Vec<DeliveryRecord> {
        self.records
            .iter()
            .filter(|r| r.batch_id == *batch_id)
            .map(|r| r.clone())
            .collect()
    }

    /// Number of tracked tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Schedule one delivery task per recipient and return immediately.
    #[tracing::instrument(
        name = "dispatcher.send",
        skip(self, template, subject, recipients),
        fields(template = %template, recipient_count = recipients.len())
    )]
    pub fn send(&self, template: &str, subject: &str, recipients: Vec<Recipient>) -> SendReceipt {
        self.prune_finished();

        let batch_id = Uuid::new_v4();
        let year = Utc::now().year();
        let accepted = recipients.len();
        let mut task_ids = Vec::with_capacity(accepted);

        for recipient in recipients {
            let record = DeliveryRecord::new(batch_id, template, &recipient.email);
            let id = record.id;
            self.records.insert(id, record);

            let task = DeliveryTask {
                id,
                template: template.to_string(),
                subject: subject.to_string(),
                context: RenderContext::for_recipient(&recipient, year),
                renderer: self.renderer.clone(),
                transport: Arc::clone(&self.transport),
                retry: self.retry.clone(),
                limiter: Arc::clone(&self.limiter),
                records: Arc::clone(&self.records),
                stats: Arc::clone(&self.stats),
            };

            self.handles.insert(id, tokio::spawn(task.run()));
            task_ids.push(id);
        }

        self.stats
            .total_accepted
            .fetch_add(accepted as u64, Ordering::Relaxed);
        DeliveryMetrics::record_accepted(accepted as u64);

        tracing::info!(
            batch_id = %batch_id,
            template = %template,
            accepted,
            "Accepted recipients for delivery"
        );

        SendReceipt {
            batch_id,
            accepted,
            task_ids,
        }
    }

    /// Wait for every tracked task to finish.
    pub async fn join_all(&self) {
        let ids: Vec<Uuid> = self.handles.iter().map(|h| *h.key()).collect();
        let handles = ids
            .into_iter()
            .filter_map(|id| self.handles.remove(&id))
            .map(|(id, handle)| async move { (id, handle.await) });

        for (id, result) in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(task_id = %id, error = %e, "Delivery task panicked");
            }
        }
    }

    /// Drop handles of finished tasks and records past their retention.
    pub fn prune_finished(&self) {
        self.handles.retain(|_, handle| !handle.is_finished());

        let cutoff = Utc::now() - chrono::Duration::minutes(RECORD_RETENTION_MINUTES);
        self.records.retain(|_, record| match record.finished_at {
            Some(finished_at) if record.state.is_terminal() => finished_at > cutoff,
            _ => true,
        });
    }
}

/// Everything one recipient's delivery needs, owned by its task.
struct DeliveryTask {
    id: Uuid,
    template: String,
    subject: String,
    context: RenderContext,
    renderer: TemplateRenderer,
    transport: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
    records: Arc<DashMap<Uuid, DeliveryRecord>>,
    stats: Arc<DispatcherStats>,
}

impl DeliveryTask {
    async fn run(self) {
        let _permit = match Arc::clone(&self.limiter).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.fail(FailureStage::Transport, e.to_string());
                return;
            }
        };

        DeliveryMetrics::task_started();
        self.deliver().await;
        DeliveryMetrics::task_finished();
    }

    #[tracing::instrument(
        name = "dispatcher.deliver",
        skip(self),
        fields(task_id = %self.id, template = %self.template, recipient = %self.context.email)
    )]
    async fn deliver(&self) {
        self.set_state(DeliveryState::Rendering);

        let (html, attachments) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err((stage, reason)) => {
                self.fail(stage, reason);
                return;
            }
        };

        self.set_state(DeliveryState::Sending);

        let email = OutgoingEmail {
            to: vec![self.context.email.clone()],
            subject: self.subject.clone(),
            html,
            attachments,
        };

        let transport = &self.transport;
        let records = &self.records;
        let email = &email;
        let id = self.id;

        let outcome = self
            .retry
            .run(move |attempt| async move {
                if let Some(mut record) = records.get_mut(&id) {
                    record.attempts = attempt;
                }
                let started = Instant::now();
                let result = transport.send(email).await;
                DeliveryMetrics::record_attempt(started.elapsed());
                result
            })
            .await;

        self.stats
            .total_attempts
            .fetch_add(outcome.attempts() as u64, Ordering::Relaxed);

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                self.finish(DeliveryState::Delivered, None);
                self.stats.total_delivered.fetch_add(1, Ordering::Relaxed);
                DeliveryMetrics::record_delivered();
                tracing::info!(attempts, "Email delivered");
            }
            RetryOutcome::Exhausted { error, attempts } => {
                self.finish(DeliveryState::Exhausted, Some(error.to_string()));
                self.stats.total_exhausted.fetch_add(1, Ordering::Relaxed);
                DeliveryMetrics::record_exhausted();
                tracing::error!(attempts, error = %error, "Giving up on email after retries");
            }
            RetryOutcome::Aborted { error, .. } => {
                self.fail(FailureStage::Transport, error.to_string());
            }
        }
    }

    /// Render and inline on the blocking pool.
    async fn prepare(&self) -> Result<(String, Vec<InlineAttachment>), (FailureStage, String)> {
        let renderer = self.renderer.clone();
        let template = self.template.clone();
        let context = self.context.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let rendered = renderer
                .render(&template, &context)
                .map_err(|e| (FailureStage::Render, e))?;
            let html = inline_css(&rendered.html).map_err(|e| (FailureStage::Inline, e))?;
            Ok::<_, (FailureStage, TemplateError)>((html, rendered.attachments))
        })
        .await;

        match joined {
            Ok(Ok(prepared)) => Ok(prepared),
            Ok(Err((stage, e))) => Err((stage, e.to_string())),
            Err(e) => Err((FailureStage::Render, e.to_string())),
        }
    }

    fn set_state(&self, state: DeliveryState) {
        if let Some(mut record) = self.records.get_mut(&self.id) {
            record.state = state;
        }
    }

    fn finish(&self, state: DeliveryState, error: Option<String>) {
        if let Some(mut record) = self.records.get_mut(&self.id) {
            record.state = state;
            record.last_error = error;
            record.finished_at = Some(Utc::now());
        }
    }

    fn fail(&self, stage: FailureStage, reason: String) {
        tracing::error!(stage = stage.as_str(), error = %reason, "Email delivery failed");
        self.finish(DeliveryState::Failed, Some(reason));
        self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
        DeliveryMetrics::record_failed(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::template::testing::MemoryImages;
    use crate::template::{ImageResolver, TemplateStore};
    use crate::transport::TransportError;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MailTransport for FailingTransport {
        async fn send(&self, _: &OutgoingEmail) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Smtp("connection refused".into()))
        }
    }

    /// Fails for one address, succeeds for everyone else.
    struct SelectiveTransport {
        bad: String,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailTransport for SelectiveTransport {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
            if email.to[0] == self.bad {
                return Err(TransportError::Smtp("mailbox busy".into()));
            }
            self.delivered.lock().unwrap().push(email.to[0].clone());
            Ok(())
        }
    }

    fn renderer() -> TemplateRenderer {
        let store = Arc::new(TemplateStore::new());
        store
            .load(
                "default",
                r#"<style>p { color: red; }</style><p>Hello {{name}} {{property "team"}}</p>{{image "logo.png"}}"#,
            )
            .unwrap();
        store.load("strict", "Hello {{nickname}}").unwrap();
        TemplateRenderer::new(
            store,
            ImageResolver::new(Arc::new(MemoryImages::default().with("logo.png", b"PNG"))),
        )
    }

    fn recipient(name: &str, email: &str) -> Recipient {
        Recipient {
            name: name.to_string(),
            email: email.to_string(),
            custom: None,
        }
    }

    #[tokio::test]
    async fn test_send_delivers_each_recipient() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = EmailDispatcher::with_policy(
            renderer(),
            transport.clone(),
            RetryPolicy::immediate(3),
            10,
        );

        let mut kim = recipient("Kim", "kim@example.com");
        kim.custom = Some(HashMap::from([("team".to_string(), "infra".to_string())]));

        let receipt = dispatcher.send(
            "default",
            "Welcome",
            vec![recipient("Hong", "hong@example.com"), kim],
        );
        assert_eq!(receipt.accepted, 2);

        dispatcher.join_all().await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        for email in sent.iter() {
            assert_eq!(email.subject, "Welcome");
            assert_eq!(email.attachments.len(), 1);
            assert!(email.html.contains("color: red"));
            assert!(!email.html.contains("<style"));
        }
        let kim_mail = sent.iter().find(|e| e.to[0] == "kim@example.com").unwrap();
        assert!(kim_mail.html.contains("Hello Kim infra"));

        for id in &receipt.task_ids {
            let record = dispatcher.record(id).unwrap();
            assert_eq!(record.state, DeliveryState::Delivered);
            assert_eq!(record.attempts, 1);
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.total_accepted, 2);
        assert_eq!(stats.total_delivered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_transport_is_called_max_attempts_times() {
        let transport = Arc::new(FailingTransport::default());
        let dispatcher = EmailDispatcher::new(renderer(), transport.clone());

        let receipt = dispatcher.send("default", "Hi", vec![recipient("Hong", "a@b.com")]);
        dispatcher.join_all().await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
        let record = dispatcher.record(&receipt.task_ids[0]).unwrap();
        assert_eq!(record.state, DeliveryState::Exhausted);
        assert_eq!(record.attempts, 10);
        assert!(record.finished_at.is_some());
        assert_eq!(dispatcher.stats().total_exhausted, 1);
    }

    #[tokio::test]
    async fn test_render_failure_is_not_retried() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = EmailDispatcher::with_policy(
            renderer(),
            transport.clone(),
            RetryPolicy::immediate(5),
            10,
        );

        let receipt = dispatcher.send("strict", "Hi", vec![recipient("Hong", "a@b.com")]);
        dispatcher.join_all().await;

        assert!(transport.sent.lock().unwrap().is_empty());
        let record = dispatcher.record(&receipt.task_ids[0]).unwrap();
        assert_eq!(record.state, DeliveryState::Failed);
        assert_eq!(record.attempts, 0);
        assert!(record.last_error.is_some());
    }

    #[tokio::test]
    async fn test_missing_template_fails_each_recipient() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = EmailDispatcher::new(renderer(), transport.clone());

        let receipt = dispatcher.send(
            "does-not-exist",
            "Hi",
            vec![recipient("A", "a@example.com"), recipient("B", "b@example.com")],
        );
        assert_eq!(receipt.accepted, 2);
        dispatcher.join_all().await;

        assert_eq!(dispatcher.stats().total_failed, 2);
        assert!(dispatcher
            .batch(&receipt.batch_id)
            .iter()
            .all(|r| r.state == DeliveryState::Failed));
    }

    #[tokio::test]
    async fn test_one_failing_recipient_does_not_affect_others() {
        let transport = Arc::new(SelectiveTransport {
            bad: "bad@example.com".to_string(),
            delivered: Mutex::new(Vec::new()),
        });
        let dispatcher = EmailDispatcher::with_policy(
            renderer(),
            transport.clone(),
            RetryPolicy::immediate(3),
            10,
        );

        let recipients = vec![
            recipient("A", "a@example.com"),
            recipient("Bad", "bad@example.com"),
            recipient("C", "c@example.com"),
        ];
        let receipt = dispatcher.send("default", "Hi", recipients);
        dispatcher.join_all().await;

        let mut delivered = transport.delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, vec!["a@example.com", "c@example.com"]);

        let states: HashMap<String, DeliveryState> = dispatcher
            .batch(&receipt.batch_id)
            .into_iter()
            .map(|r| (r.recipient, r.state))
            .collect();
        assert_eq!(states["bad@example.com"], DeliveryState::Exhausted);
        assert_eq!(states["a@example.com"], DeliveryState::Delivered);
    }

    #[tokio::test]
    async fn test_empty_recipient_list() {
        let dispatcher =
            EmailDispatcher::new(renderer(), Arc::new(RecordingTransport::default()));
        let receipt = dispatcher.send("default", "Hi", vec![]);
        assert_eq!(receipt.accepted, 0);
        assert!(receipt.task_ids.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_records() {
        let dispatcher = EmailDispatcher::with_policy(
            renderer(),
            Arc::new(RecordingTransport::default()),
            RetryPolicy::immediate(1),
            10,
        );
        let receipt = dispatcher.send("default", "Hi", vec![recipient("A", "a@example.com")]);
        dispatcher.join_all().await;

        dispatcher.prune_finished();
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(dispatcher.record(&receipt.task_ids[0]).is_some());
    }

    #[tokio::test]
    async fn test_prune_drops_only_expired_terminal_records() {
        let dispatcher = EmailDispatcher::new(renderer(), Arc::new(RecordingTransport::default()));
        let expired = Utc::now() - chrono::Duration::minutes(RECORD_RETENTION_MINUTES + 1);
        let batch_id = Uuid::new_v4();

        let mut delivered = DeliveryRecord::new(batch_id, "default", "old@example.com");
        delivered.state = DeliveryState::Delivered;
        delivered.finished_at = Some(expired);

        let mut sending = DeliveryRecord::new(batch_id, "default", "slow@example.com");
        sending.state = DeliveryState::Sending;
        sending.finished_at = Some(expired);

        let (delivered_id, sending_id) = (delivered.id, sending.id);
        dispatcher.records.insert(delivered_id, delivered);
        dispatcher.records.insert(sending_id, sending);

        dispatcher.prune_finished();

        assert!(dispatcher.record(&delivered_id).is_none());
        assert!(dispatcher.record(&sending_id).is_some());
        assert!(!DeliveryState::Sending.is_terminal());
        assert!(DeliveryState::Exhausted.is_terminal());
    }
}
