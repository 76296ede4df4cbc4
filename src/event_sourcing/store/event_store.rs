use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use tokio::sync::RwLock;
use uuid::Uuid;
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_sourcing::core::{DomainEvent, EventEnvelope, Aggregate, serialize_event, deserialize_event};

// ============================================================================
// Event Store - Repository for Events
// ============================================================================
//
// Responsibilities:
// 1. Append events for an aggregate (append-only)
// 2. Load event history for aggregates
// 3. Ensure optimistic concurrency control
// 4. Write to outbox for publishing
//
// The traits make no assumption about the storage technology; the
// in-memory implementation keeps serialized rows the way a table would.
//
// ============================================================================

/// Raised when the stored version no longer matches the caller's snapshot.
#[derive(Debug, thiserror::Error)]
#[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {actual}")]
pub struct VersionConflict {
    pub aggregate_id: Uuid,
    pub expected: i64,
    pub actual: i64,
}

#[async_trait]
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// Append events atomically. Returns the new version number.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
        publish_to_outbox: bool,
    ) -> Result<i64>;

    /// Load all events for an aggregate, ordered by sequence number
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>>;

    /// Current version of an aggregate (0 when it does not exist)
    async fn get_current_version(&self, aggregate_id: Uuid) -> Result<i64>;

    async fn aggregate_exists(&self, aggregate_id: Uuid) -> Result<bool> {
        Ok(self.get_current_version(aggregate_id).await? > 0)
    }
}

/// Load aggregate from events. `Ok(None)` when the aggregate has no history.
pub async fn load_aggregate<A>(
    store: &dyn EventStore<A::Event>,
    aggregate_id: Uuid,
) -> Result<Option<A>>
where
    A: Aggregate,
    A::Event: DomainEvent,
    A::Error: std::fmt::Display,
{
    let events = store.load_events(aggregate_id).await?;

    if events.is_empty() {
        return Ok(None);
    }

    tracing::debug!(
        aggregate_id = %aggregate_id,
        event_count = events.len(),
        "Replaying aggregate"
    );

    A::load_from_events(events).map(Some)
}

// ============================================================================
// Outbox
// ============================================================================

/// One pending integration message written alongside an event
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: String,
    pub topic: String,
    pub partition_key: String,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

#[async_trait]
pub trait Outbox: Send + Sync {
    /// Oldest unpublished messages first
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>>;

    async fn mark_published(&self, message_id: Uuid) -> Result<()>;

    async fn record_failed_attempt(&self, message_id: Uuid) -> Result<()>;
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

#[derive(Clone, Debug)]
struct StoredEvent {
    sequence_number: i64,
    event_id: Uuid,
    event_type: String,
    event_version: i32,
    event_data: String,
    correlation_id: Uuid,
    timestamp: DateTime<Utc>,
    metadata: HashMap<String, String>,
}

#[derive(Default)]
struct Tables {
    event_store: HashMap<Uuid, Vec<StoredEvent>>,
    aggregate_sequence: HashMap<Uuid, i64>,
    outbox_messages: Vec<OutboxMessage>,
}

pub struct InMemoryEventStore<E: DomainEvent> {
    tables: RwLock<Tables>,
    aggregate_type_name: String,  // e.g., "Order"
    topic_name: String,            // e.g., "order-events"
    _phantom: PhantomData<E>,
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    pub fn new(aggregate_type_name: &str, topic_name: &str) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            aggregate_type_name: aggregate_type_name.to_string(),
            topic_name: topic_name.to_string(),
            _phantom: PhantomData,
        }
    }

    pub async fn outbox_len(&self) -> usize {
        self.tables.read().await.outbox_messages.len()
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for InMemoryEventStore<E> {
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
        publish_to_outbox: bool,
    ) -> Result<i64> {
        if events.is_empty() {
            bail!("Cannot append empty event list");
        }

        // Serialize before taking the write lock so a bad payload writes nothing
        let mut rows = Vec::with_capacity(events.len());
        let mut new_version = expected_version;
        for envelope in &events {
            new_version += 1;
            rows.push(StoredEvent {
                sequence_number: new_version,
                event_id: envelope.event_id,
                event_type: envelope.event_type.clone(),
                event_version: envelope.event_version,
                event_data: serialize_event(&envelope.event_data)?,
                correlation_id: envelope.correlation_id,
                timestamp: envelope.timestamp,
                metadata: envelope.metadata.clone(),
            });
        }

        let mut tables = self.tables.write().await;

        let current_version = tables.aggregate_sequence.get(&aggregate_id).copied().unwrap_or(0);
        if current_version != expected_version {
            return Err(VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            }
            .into());
        }

        if publish_to_outbox {
            let now = Utc::now();
            for row in &rows {
                tables.outbox_messages.push(OutboxMessage {
                    id: Uuid::new_v4(),
                    aggregate_id,
                    aggregate_type: self.aggregate_type_name.clone(),
                    event_id: row.event_id,
                    event_type: row.event_type.clone(),
                    payload: row.event_data.clone(),
                    topic: self.topic_name.clone(),
                    partition_key: aggregate_id.to_string(),
                    correlation_id: row.correlation_id,
                    created_at: now,
                    attempts: 0,
                });
            }
        }

        tables.event_store.entry(aggregate_id).or_default().extend(rows);
        tables.aggregate_sequence.insert(aggregate_id, new_version);

        tracing::info!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type_name,
            new_version = new_version,
            event_count = events.len(),
            "Appended events to event store"
        );

        Ok(new_version)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>> {
        let tables = self.tables.read().await;

        let Some(rows) = tables.event_store.get(&aggregate_id) else {
            return Ok(Vec::new());
        };

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_data: E = deserialize_event(&row.event_data)?;

            events.push(EventEnvelope {
                event_id: row.event_id,
                aggregate_id,
                sequence_number: row.sequence_number,
                event_type: row.event_type.clone(),
                event_version: row.event_version,
                event_data,
                correlation_id: row.correlation_id,
                timestamp: row.timestamp,
                metadata: row.metadata.clone(),
            });
        }

        Ok(events)
    }

    async fn get_current_version(&self, aggregate_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables.aggregate_sequence.get(&aggregate_id).copied().unwrap_or(0))
    }
}

#[async_trait]
impl<E: DomainEvent> Outbox for InMemoryEventStore<E> {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let tables = self.tables.read().await;
        Ok(tables.outbox_messages.iter().take(limit).cloned().collect())
    }

    async fn mark_published(&self, message_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        let before = tables.outbox_messages.len();
        tables.outbox_messages.retain(|m| m.id != message_id);
        if tables.outbox_messages.len() == before {
            bail!("Outbox message not found: {}", message_id);
        }
        Ok(())
    }

    async fn record_failed_attempt(&self, message_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.outbox_messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.attempts += 1;
                Ok(())
            }
            None => bail!("Outbox message not found: {}", message_id),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    enum CounterEvent {
        Opened { start: i64 },
        Added { amount: i64 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Added { .. } => "CounterAdded",
            }
        }
    }

    #[derive(Debug)]
    struct Counter {
        id: Uuid,
        version: i64,
        value: i64,
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Command = ();
        type Error = String;

        fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
            match event {
                CounterEvent::Opened { start } => Ok(Self { id: Uuid::nil(), version: 0, value: *start }),
                _ => Err("not opened".to_string()),
            }
        }

        fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
            match event {
                CounterEvent::Added { amount } => {
                    self.value += amount;
                    Ok(())
                }
                _ => Err("already opened".to_string()),
            }
        }

        fn handle_command(&self, _command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
            Ok(vec![])
        }

        fn aggregate_id(&self) -> Uuid { self.id }
        fn version(&self) -> i64 { self.version }
        fn set_version(&mut self, version: i64) { self.version = version; }
    }

    fn envelope(aggregate_id: Uuid, seq: i64, event: CounterEvent) -> EventEnvelope<CounterEvent> {
        EventEnvelope::new(aggregate_id, seq, event, Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_append_and_load_round_trip() {
        let store = InMemoryEventStore::<CounterEvent>::new("Counter", "counter-events");
        let id = Uuid::new_v4();

        let version = store
            .append_events(
                id,
                0,
                vec![
                    envelope(id, 1, CounterEvent::Opened { start: 5 }),
                    envelope(id, 2, CounterEvent::Added { amount: 3 }),
                ],
                false,
            )
            .await
            .unwrap();

        assert_eq!(version, 2);
        assert!(store.aggregate_exists(id).await.unwrap());

        let events = store.load_events(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence_number, 1);
        assert_eq!(events[1].event_type, "CounterAdded");
        assert_eq!(events[1].event_data, CounterEvent::Added { amount: 3 });
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_without_writing() {
        let store = InMemoryEventStore::<CounterEvent>::new("Counter", "counter-events");
        let id = Uuid::new_v4();

        store
            .append_events(id, 0, vec![envelope(id, 1, CounterEvent::Opened { start: 0 })], true)
            .await
            .unwrap();

        let err = store
            .append_events(id, 0, vec![envelope(id, 1, CounterEvent::Added { amount: 1 })], true)
            .await
            .unwrap_err();

        let conflict = err.downcast_ref::<VersionConflict>().expect("version conflict");
        assert_eq!(conflict.expected, 0);
        assert_eq!(conflict.actual, 1);
        assert_eq!(store.load_events(id).await.unwrap().len(), 1);
        assert_eq!(store.outbox_len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_append_fails() {
        let store = InMemoryEventStore::<CounterEvent>::new("Counter", "counter-events");
        assert!(store.append_events(Uuid::new_v4(), 0, vec![], false).await.is_err());
    }

    #[tokio::test]
    async fn test_load_aggregate_replays_and_tracks_version() {
        let store = InMemoryEventStore::<CounterEvent>::new("Counter", "counter-events");
        let id = Uuid::new_v4();

        assert!(load_aggregate::<Counter>(&store, id).await.unwrap().is_none());

        store
            .append_events(
                id,
                0,
                vec![
                    envelope(id, 1, CounterEvent::Opened { start: 10 }),
                    envelope(id, 2, CounterEvent::Added { amount: -4 }),
                    envelope(id, 3, CounterEvent::Added { amount: 1 }),
                ],
                false,
            )
            .await
            .unwrap();

        let counter = load_aggregate::<Counter>(&store, id).await.unwrap().unwrap();
        assert_eq!(counter.value, 7);
        assert_eq!(counter.version(), 3);
    }

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let store = InMemoryEventStore::<CounterEvent>::new("Counter", "counter-events");
        let id = Uuid::new_v4();

        store
            .append_events(
                id,
                0,
                vec![
                    envelope(id, 1, CounterEvent::Opened { start: 0 }),
                    envelope(id, 2, CounterEvent::Added { amount: 2 }),
                ],
                true,
            )
            .await
            .unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].event_type, "CounterOpened");
        assert_eq!(pending[0].topic, "counter-events");
        assert_eq!(pending[0].partition_key, id.to_string());

        store.record_failed_attempt(pending[0].id).await.unwrap();
        assert_eq!(store.fetch_pending(1).await.unwrap()[0].attempts, 1);

        store.mark_published(pending[0].id).await.unwrap();
        assert_eq!(store.outbox_len().await, 1);
        assert!(store.mark_published(pending[0].id).await.is_err());
    }
}
