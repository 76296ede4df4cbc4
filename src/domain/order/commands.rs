use rust_decimal::Decimal;
use uuid::Uuid;

use super::value_objects::{Adjustment, FulfillmentUnit, OrderStatus};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Catalog and tax lookups are resolved before a command is built, so the
// aggregate only ever sees decomposed units and concrete rates.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    CreateOrder {
        order_id: Uuid,
        order_number: String,
        units: Vec<FulfillmentUnit>,
        payment_method: String,
        tax_rate: Decimal,
    },
    AddUnits {
        units: Vec<FulfillmentUnit>,
    },
    RemoveUnit {
        unit_id: Uuid,
    },
    TogglePrepared {
        unit_ids: Vec<Uuid>,
    },
    DispatchUnit {
        unit_id: Uuid,
    },
    SetStatus {
        status: OrderStatus,
        reason: Option<String>,
    },
    ApplyAdjustment {
        adjustment: Adjustment,
    },
    ChangePaymentMethod {
        payment_method: String,
        tax_rate: Decimal,
    },
}

impl OrderCommand {
    /// Stable label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::CreateOrder { .. } => "CreateOrder",
            OrderCommand::AddUnits { .. } => "AddUnits",
            OrderCommand::RemoveUnit { .. } => "RemoveUnit",
            OrderCommand::TogglePrepared { .. } => "TogglePrepared",
            OrderCommand::DispatchUnit { .. } => "DispatchUnit",
            OrderCommand::SetStatus { .. } => "SetStatus",
            OrderCommand::ApplyAdjustment { .. } => "ApplyAdjustment",
            OrderCommand::ChangePaymentMethod { .. } => "ChangePaymentMethod",
        }
    }
}
