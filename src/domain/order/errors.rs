use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Fulfillment Errors
// ============================================================================
//
// Every variant is returned to the caller with no partial mutation.
// Unresolvable deal components are not errors: decomposition skips them.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Unit {unit_id} not found in order {order_id}")]
    UnitNotFound { order_id: Uuid, unit_id: Uuid },

    #[error("Catalog entry not found: {0}")]
    CatalogEntryNotFound(String),

    #[error("Unknown payment method: {0}")]
    PaymentMethodNotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Order is in terminal status {0:?}")]
    TerminalStatus(OrderStatus),

    #[error("Cannot move order from {from:?} to {to:?}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Order was modified concurrently: expected version {expected}, found {actual}")]
    ConcurrencyConflict { expected: i64, actual: i64 },

    #[error("Aggregate not initialized")]
    NotInitialized,

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Coarse error classes exposed to callers and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    InvalidAdjustment,
    Validation,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::InvalidAdjustment => "invalid_adjustment",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::OrderNotFound(_)
            | FulfillmentError::UnitNotFound { .. }
            | FulfillmentError::CatalogEntryNotFound(_)
            | FulfillmentError::PaymentMethodNotFound(_) => ErrorKind::NotFound,
            FulfillmentError::PreconditionFailed(_)
            | FulfillmentError::TerminalStatus(_)
            | FulfillmentError::InvalidStatusTransition { .. } => ErrorKind::PreconditionFailed,
            FulfillmentError::InvalidAdjustment(_) => ErrorKind::InvalidAdjustment,
            FulfillmentError::InvalidQuantity(_) | FulfillmentError::Validation(_) => ErrorKind::Validation,
            FulfillmentError::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            FulfillmentError::NotInitialized | FulfillmentError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        FulfillmentError::PreconditionFailed(message.into())
    }
}
