use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio::sync::watch;

use crate::event_sourcing::store::Outbox;
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};
use super::publisher::{EventPublisher, PublishedMessage};

// ============================================================================
// Outbox Relay - drains the outbox and publishes to the event bus
// ============================================================================
//
// 1. Fetch pending outbox rows, oldest first
// 2. Publish each with exponential backoff
// 3. Delete the row once the publisher accepted it
//
// A message that exhausts its retries stays in the outbox and stops the
// batch, so later events of the same order are never published ahead of it.
// Delivery is at-least-once.
//
// ============================================================================

const DEFAULT_BATCH_SIZE: usize = 100;

pub struct OutboxRelay {
    outbox: Arc<dyn Outbox>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
    batch_size: usize,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn Outbox>, publisher: Arc<dyn EventPublisher>, metrics: Arc<Metrics>) -> Self {
        Self {
            outbox,
            publisher,
            metrics,
            retry: RetryConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publish one batch. Returns how many messages went out.
    pub async fn relay_once(&self) -> Result<usize> {
        let messages = self.outbox.fetch_pending(self.batch_size).await?;
        if messages.is_empty() {
            return Ok(0);
        }

        tracing::debug!(message_count = messages.len(), "📬 Fetched pending outbox messages");

        let mut published = 0;
        for msg in messages {
            let message = PublishedMessage::from(&msg);
            let result = retry_with_backoff(&self.retry, "outbox_publish", &self.metrics, || {
                self.publisher.publish(message.clone())
            })
            .await;

            match result {
                RetryResult::Success { attempts, .. } => {
                    self.outbox.mark_published(msg.id).await?;
                    self.metrics.record_publish_outcome(&msg.event_type, true);
                    published += 1;

                    tracing::info!(
                        event_id = %msg.event_id,
                        event_type = %msg.event_type,
                        aggregate_id = %msg.aggregate_id,
                        attempts,
                        "✅ Published outbox message"
                    );
                }
                RetryResult::Failed { error, attempts } => {
                    self.outbox.record_failed_attempt(msg.id).await?;
                    self.metrics.record_publish_outcome(&msg.event_type, false);

                    tracing::error!(
                        event_id = %msg.event_id,
                        event_type = %msg.event_type,
                        cycles = msg.attempts + 1,
                        attempts,
                        error = %error,
                        "❌ Failed to publish outbox message, will retry next cycle"
                    );
                    break;
                }
            }
        }

        Ok(published)
    }

    /// Poll until the shutdown flag flips to true
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_ms = interval.as_millis() as u64, "🔄 Starting outbox relay");

        loop {
            if let Err(e) = self.relay_once().await {
                tracing::error!(error = %e, "Outbox relay cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Final drain so nothing accepted before shutdown is left behind
        if let Err(e) = self.relay_once().await {
            tracing::error!(error = %e, "Final outbox drain failed");
        }
        tracing::info!("Outbox relay stopped");
    }
}
