use std::collections::{HashMap, HashSet};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::domain::order::OrderEvent;
use crate::event_sourcing::core::deserialize_event;
use super::publisher::PublishedMessage;

// ============================================================================
// Cash Balance Projection
// ============================================================================
//
// Consumes settlement events from the bus and keeps a running balance per
// payment method. Completion credits the order total; a reopen debits the
// amount that was credited when the order was completed.
//
// The relay delivers at least once, so settlement events are keyed by
// event id and a redelivered id is ignored.
//
// ============================================================================

#[derive(Default)]
struct Ledger {
    balances: HashMap<String, Decimal>,
    settled_events: HashSet<Uuid>,
}

#[derive(Default)]
pub struct CashBalanceProjection {
    ledger: RwLock<Ledger>,
}

impl CashBalanceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns whether it moved a balance.
    pub async fn apply(&self, event_id: Uuid, event: &OrderEvent) -> bool {
        let (order_id, payment_method, delta) = match event {
            OrderEvent::Completed(e) => (Some(e.order_id), &e.payment_method, e.total_amount),
            OrderEvent::Reopened(e) => (None, &e.payment_method, -e.reversed_amount),
            _ => return false,
        };

        let mut ledger = self.ledger.write().await;
        if !ledger.settled_events.insert(event_id) {
            tracing::debug!(event_id = %event_id, "Settlement already applied, skipping redelivery");
            return false;
        }

        let balance = ledger.balances.entry(payment_method.clone()).or_insert(Decimal::ZERO);
        *balance += delta;

        tracing::info!(
            event_id = %event_id,
            order_id = ?order_id,
            payment_method = %payment_method,
            delta = %delta,
            balance = %balance,
            "Cash balance updated"
        );
        true
    }

    pub async fn balance(&self, payment_method: &str) -> Decimal {
        self.ledger
            .read()
            .await
            .balances
            .get(payment_method)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn snapshot(&self) -> HashMap<String, Decimal> {
        self.ledger.read().await.balances.clone()
    }

    /// Consume messages until every sender is dropped
    pub async fn run(&self, mut receiver: mpsc::Receiver<PublishedMessage>) {
        while let Some(message) = receiver.recv().await {
            match deserialize_event::<OrderEvent>(&message.payload) {
                Ok(event) => {
                    self.apply(message.event_id, &event).await;
                }
                Err(e) => tracing::warn!(
                    event_id = %message.event_id,
                    aggregate_id = %message.aggregate_id,
                    error = %e,
                    "Skipping undecodable message"
                ),
            }
        }

        tracing::info!("Cash balance projection stopped");
    }
}
