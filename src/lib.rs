// ============================================================================
// Kitchen Fulfillment Engine
// ============================================================================
//
// Order decomposition and multi-station fulfillment for a restaurant
// ordering platform.
//
// Layout:
// - domain/          - Catalog, order aggregate, decomposition, status, money
// - event_sourcing/  - Generic aggregate/event traits and the event store
// - messaging/       - Outbox relay and settlement consumers
// - metrics/         - Prometheus registry and /metrics endpoint
// - config           - Environment-driven configuration
// - utils/           - Retry with backoff
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod messaging;
pub mod metrics;
pub mod utils;

pub use domain::catalog::{CatalogItem, CatalogLookup, InMemoryCatalog, PaymentMethodTable, TaxRateLookup};
pub use domain::order::{
    AdjustmentRequest, CreateOrderRequest, FulfillmentError, FulfillmentUnit, LineItem, Order,
    OrderService, OrderStatus,
};
