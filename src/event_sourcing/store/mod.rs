// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// Persistence seams for event sourcing. All components work with ANY
// aggregate/event type.
//
// ============================================================================

pub mod event_store;

pub use event_store::{
    load_aggregate, EventStore, InMemoryEventStore, Outbox, OutboxMessage, VersionConflict,
};
