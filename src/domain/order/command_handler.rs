use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, EventEnvelope};
use crate::event_sourcing::store::{load_aggregate, EventStore, VersionConflict};
use crate::metrics::Metrics;

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::FulfillmentError;
use super::events::OrderEvent;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store
//
// Each order has its own async guard held across load → handle → append,
// so two commands on one order never interleave. The store's expected
// version check still rejects writers outside this process.
//
// ============================================================================

type OrderLock = Arc<AsyncMutex<()>>;

pub struct OrderCommandHandler {
    event_store: Arc<dyn EventStore<OrderEvent>>,
    metrics: Arc<Metrics>,
    locks: Mutex<HashMap<Uuid, OrderLock>>,
}

impl OrderCommandHandler {
    pub fn new(event_store: Arc<dyn EventStore<OrderEvent>>, metrics: Arc<Metrics>) -> Self {
        Self {
            event_store,
            metrics,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle a command and persist resulting events. Returns the updated aggregate.
    pub async fn handle(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        correlation_id: Uuid,
    ) -> Result<OrderAggregate, FulfillmentError> {
        let started = Instant::now();
        let lock = self.lock_for(order_id);

        let result = {
            let _guard = lock.lock().await;
            self.execute(order_id, &command, correlation_id).await
        };
        self.release(order_id, lock);

        let failure = result.as_ref().err().map(|e| e.kind().as_str());
        self.metrics
            .record_command(command.name(), started.elapsed().as_secs_f64(), failure);

        match &result {
            Ok(aggregate) => tracing::debug!(
                order_id = %order_id,
                command = command.name(),
                version = aggregate.version(),
                "Command handled"
            ),
            Err(e) => tracing::debug!(
                order_id = %order_id,
                command = command.name(),
                error = %e,
                "Command rejected"
            ),
        }

        result
    }

    /// Current state of an order, rebuilt from its events
    pub async fn load(&self, order_id: Uuid) -> Result<OrderAggregate, FulfillmentError> {
        load_aggregate::<OrderAggregate>(self.event_store.as_ref(), order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    pub async fn history(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, FulfillmentError> {
        let events = self.event_store.load_events(order_id).await?;
        if events.is_empty() {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }
        Ok(events)
    }

    async fn execute(
        &self,
        order_id: Uuid,
        command: &OrderCommand,
        correlation_id: Uuid,
    ) -> Result<OrderAggregate, FulfillmentError> {
        let current = load_aggregate::<OrderAggregate>(self.event_store.as_ref(), order_id).await?;

        let events = match (&current, command) {
            (None, OrderCommand::CreateOrder { .. }) => OrderAggregate::initial_events(command)?,
            (None, _) => return Err(FulfillmentError::OrderNotFound(order_id)),
            (Some(aggregate), _) => aggregate.handle_command(command)?,
        };

        if events.is_empty() {
            // Idempotent retry; nothing to persist
            return current.ok_or(FulfillmentError::OrderNotFound(order_id));
        }

        self.commit(order_id, current, events, command.name(), correlation_id).await
    }

    /// Apply events to a private copy, then append. Nothing is visible unless both succeed.
    async fn commit(
        &self,
        order_id: Uuid,
        current: Option<OrderAggregate>,
        events: Vec<OrderEvent>,
        command_name: &str,
        correlation_id: Uuid,
    ) -> Result<OrderAggregate, FulfillmentError> {
        let expected_version = current.as_ref().map(|a| a.version()).unwrap_or(0);
        let mut state = current;
        let mut envelopes = Vec::with_capacity(events.len());
        let mut seq = expected_version;

        for event in events {
            seq += 1;
            let next = match state.take() {
                Some(mut aggregate) => {
                    aggregate.apply_event(&event)?;
                    aggregate
                }
                None => OrderAggregate::apply_first_event(&event)?,
            };
            state = Some(next);

            envelopes.push(
                EventEnvelope::new(order_id, seq, event, correlation_id)
                    .with_metadata("command", command_name),
            );
        }

        let mut aggregate = state.ok_or(FulfillmentError::NotInitialized)?;
        aggregate.set_version(seq);

        let event_types: Vec<String> = envelopes.iter().map(|e| e.event_type.clone()).collect();
        let dispatched = envelopes
            .iter()
            .filter(|e| matches!(e.event_data, OrderEvent::UnitDispatched(_)))
            .count();

        self.event_store
            .append_events(order_id, expected_version, envelopes, true)
            .await
            .map_err(|e| match e.downcast_ref::<VersionConflict>() {
                Some(conflict) => FulfillmentError::ConcurrencyConflict {
                    expected: conflict.expected,
                    actual: conflict.actual,
                },
                None => FulfillmentError::Storage(e),
            })?;

        for event_type in &event_types {
            self.metrics.record_event_appended(event_type);
        }
        self.metrics.units_dispatched.inc_by(dispatched as u64);

        Ok(aggregate)
    }

    fn lock_for(&self, order_id: Uuid) -> OrderLock {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(order_id).or_default().clone()
    }

    /// Drop the registry entry once nobody else is waiting on it
    fn release(&self, order_id: Uuid, lock: OrderLock) {
        drop(lock);

        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map's reference left means nobody holds or awaits it
        if locks.get(&order_id).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(&order_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
