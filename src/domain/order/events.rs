use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::event_sourcing::core::DomainEvent;
use super::value_objects::{Adjustment, FulfillmentUnit};

// ============================================================================
// Order Events - Domain Events for the Order Aggregate
// ============================================================================
//
// Events carry everything needed to replay deterministically: decomposed
// units, resolved tax rates and timestamps. Derived state (status,
// totals) is recomputed on apply.
//
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    UnitsAdded(OrderUnitsAdded),
    UnitRemoved(OrderUnitRemoved),
    ItemsPreparedToggled(OrderItemsPreparedToggled),
    UnitDispatched(OrderUnitDispatched),
    Accepted(OrderAccepted),
    Completed(OrderCompleted),
    Reopened(OrderReopened),
    Cancelled(OrderCancelled),
    AdjustmentApplied(OrderAdjustmentApplied),
    PaymentMethodChanged(OrderPaymentMethodChanged),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::UnitsAdded(_) => "OrderUnitsAdded",
            OrderEvent::UnitRemoved(_) => "OrderUnitRemoved",
            OrderEvent::ItemsPreparedToggled(_) => "OrderItemsPreparedToggled",
            OrderEvent::UnitDispatched(_) => "OrderUnitDispatched",
            OrderEvent::Accepted(_) => "OrderAccepted",
            OrderEvent::Completed(_) => "OrderCompleted",
            OrderEvent::Reopened(_) => "OrderReopened",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::AdjustmentApplied(_) => "OrderAdjustmentApplied",
            OrderEvent::PaymentMethodChanged(_) => "OrderPaymentMethodChanged",
        }
    }
}

impl OrderEvent {
    /// When the fact happened, as recorded in the payload
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Created(e) => e.created_at,
            OrderEvent::UnitsAdded(e) => e.added_at,
            OrderEvent::UnitRemoved(e) => e.removed_at,
            OrderEvent::ItemsPreparedToggled(e) => e.toggled_at,
            OrderEvent::UnitDispatched(e) => e.dispatched_at,
            OrderEvent::Accepted(e) => e.accepted_at,
            OrderEvent::Completed(e) => e.completed_at,
            OrderEvent::Reopened(e) => e.reopened_at,
            OrderEvent::Cancelled(e) => e.cancelled_at,
            OrderEvent::AdjustmentApplied(e) => e.applied_at,
            OrderEvent::PaymentMethodChanged(e) => e.changed_at,
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Created - units already decomposed from the cart lines
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub order_number: String,
    pub units: Vec<FulfillmentUnit>,
    pub payment_method: String,
    pub tax_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Units appended after placement
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderUnitsAdded {
    pub units: Vec<FulfillmentUnit>,
    pub added_at: DateTime<Utc>,
}

/// Administrative removal; `removed_unit_ids` includes the cascade
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderUnitRemoved {
    pub unit_id: Uuid,
    pub removed_unit_ids: Vec<Uuid>,
    pub removed_at: DateTime<Utc>,
}

/// Station flipped the prepared flag of these units
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderItemsPreparedToggled {
    pub unit_ids: Vec<Uuid>,
    pub toggled_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderUnitDispatched {
    pub unit_id: Uuid,
    pub dispatched_at: DateTime<Utc>,
}

/// Cashier accepted a pending order into the kitchen
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderAccepted {
    pub accepted_at: DateTime<Utc>,
}

/// Order settled; consumed by the cash balance projection
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCompleted {
    pub order_id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    pub payment_method: String,
    pub completed_at: DateTime<Utc>,
}

/// A completed order received new items; reverses the settlement
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderReopened {
    pub reversed_amount: Decimal,
    pub payment_method: String,
    pub reopened_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelled {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderAdjustmentApplied {
    pub adjustment: Adjustment,
    pub applied_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPaymentMethodChanged {
    pub payment_method: String,
    pub tax_rate: Decimal,
    pub changed_at: DateTime<Utc>,
}
