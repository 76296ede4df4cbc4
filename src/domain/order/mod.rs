// ============================================================================
// Order Domain - Business Logic for Order Fulfillment
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (FulfillmentUnit, LineItem, OrderStatus, adjustments)
// - Decomposition of cart lines into trackable units
// - Unit arena, status derivation and financial recomputation
// - Events, commands and errors
// - Aggregate (OrderAggregate with business logic)
// - Command Handler and the OrderService entry point
//
// This is completely separate from the generic event sourcing infrastructure.
//
// ============================================================================

pub mod value_objects;
pub mod decomposition;
pub mod units;
pub mod status;
pub mod financials;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod service;

// Re-export for convenience
pub use value_objects::*;
pub use decomposition::{Decomposer, Decomposition};
pub use units::UnitArena;
pub use status::{derive_status, DispatchProgress};
pub use financials::{round_money, OrderTotals};
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
pub use service::OrderService;
