use bytes::Bytes;
use intake_core::{Contact, Submission};
use intake_mail::{MailRelay, Notifier};
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// Work handed from request handlers to the background notifier.
#[derive(Debug)]
pub enum NotificationJob {
    Submission {
        record: Submission,
        filename: String,
        payload: Bytes,
    },
    Contact {
        record: Contact,
    },
}

impl NotificationJob {
    fn kind(&self) -> &'static str {
        match self {
            Self::Submission { .. } => "submission",
            Self::Contact { .. } => "contact",
        }
    }

    fn record_id(&self) -> &str {
        match self {
            Self::Submission { record, .. } => &record.id,
            Self::Contact { record } => &record.id,
        }
    }
}

/// Cloneable handle used by handlers to schedule notifications.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<NotificationJob>,
}

impl NotificationQueue {
    pub fn new<R: MailRelay>(
        notifier: Notifier<R>,
        capacity: usize,
    ) -> (Self, NotificationWorker<R>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, NotificationWorker { notifier, receiver })
    }

    /// Schedules a job without waiting; a full or closed queue drops it.
    pub fn enqueue(&self, job: NotificationJob) -> Result<(), NotificationQueueError> {
        let kind = job.kind();
        let record_id = job.record_id().to_string();
        let err = match self.sender.try_send(job) {
            Ok(()) => {
                gauge!("notification_queue_depth").increment(1.0);
                return Ok(());
            }
            Err(TrySendError::Full(_)) => NotificationQueueError::Full,
            Err(TrySendError::Closed(_)) => NotificationQueueError::Closed,
        };
        counter!("notification_queue_rejected_total").increment(1);
        warn!(
            stage = "notify",
            kind,
            record_id = %record_id,
            error = %err,
            "notification dropped"
        );
        Err(err)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationQueueError {
    #[error("notification queue is full")]
    Full,
    #[error("notification worker has stopped")]
    Closed,
}

/// Consumes queued jobs one at a time until every queue handle is dropped.
pub struct NotificationWorker<R> {
    notifier: Notifier<R>,
    receiver: mpsc::Receiver<NotificationJob>,
}

impl<R: MailRelay + 'static> NotificationWorker<R> {
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            gauge!("notification_queue_depth").decrement(1.0);
            let kind = job.kind();
            let delivered = match &job {
                NotificationJob::Submission {
                    record,
                    filename,
                    payload,
                } => {
                    self.notifier
                        .notify_submission(record, filename, payload)
                        .await
                }
                NotificationJob::Contact { record } => {
                    self.notifier
                        .notify_contact(record, &record.origin_domain)
                        .await
                }
            };
            let result = if delivered { "sent" } else { "failed" };
            counter!("notifications_total", "kind" => kind, "result" => result).increment(1);
        }
        info!(stage = "notify", "notification queue drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use intake_core::{ContactForm, RecipientDirectory};
    use intake_mail::MemoryRelay;
    use std::sync::Arc;

    fn notifier(relay: MemoryRelay) -> Notifier<MemoryRelay> {
        let directory = RecipientDirectory::new([("acme.com", "hr@acme.com")]);
        Notifier::new(relay, Arc::new(directory), "service@example.com")
    }

    fn contact(id: &str) -> NotificationJob {
        NotificationJob::Contact {
            record: Contact {
                id: id.to_string(),
                form: ContactForm {
                    full_name: "Sam Lee".to_string(),
                    ..ContactForm::default()
                },
                origin_domain: "acme.com".to_string(),
                created_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn worker_drains_queued_jobs_after_handles_drop() {
        let relay = MemoryRelay::new();
        let (queue, worker) = NotificationQueue::new(notifier(relay.clone()), 8);

        queue.enqueue(contact("c-1")).expect("enqueue");
        queue.enqueue(contact("c-2")).expect("enqueue");
        let handle = worker.spawn();
        drop(queue);

        handle.await.expect("worker exits");
        let sent = relay.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .all(|mail| mail.recipients == vec!["hr@acme.com".to_string()]));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (queue, _worker) = NotificationQueue::new(notifier(MemoryRelay::new()), 1);

        queue.enqueue(contact("c-1")).expect("first fits");
        assert_eq!(
            queue.enqueue(contact("c-2")),
            Err(NotificationQueueError::Full)
        );
    }

    #[tokio::test]
    async fn stopped_worker_reports_closed_queue() {
        let (queue, worker) = NotificationQueue::new(notifier(MemoryRelay::new()), 4);
        drop(worker);

        assert_eq!(
            queue.enqueue(contact("c-1")),
            Err(NotificationQueueError::Closed)
        );
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_worker() {
        let (queue, worker) = NotificationQueue::new(notifier(MemoryRelay::failing()), 4);
        queue.enqueue(contact("c-1")).expect("enqueue");
        queue.enqueue(contact("c-2")).expect("enqueue");
        drop(queue);

        worker.spawn().await.expect("worker exits cleanly");
    }
}
