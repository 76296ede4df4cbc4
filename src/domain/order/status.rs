use super::value_objects::{FulfillmentUnit, OrderStatus};

// ============================================================================
// Status Aggregator
// ============================================================================
//
// Ready / PartialReady are a pure function of unit dispatch state. Only
// physical units count: a deal's readiness is entirely its components'.
// Pending -> Preparing and the terminal statuses are explicit actions and
// are never produced here.
//
// ============================================================================

/// Dispatch progress over the physical units of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchProgress {
    pub physical: usize,
    pub dispatched: usize,
}

impl DispatchProgress {
    pub fn of<'a>(units: impl IntoIterator<Item = &'a FulfillmentUnit>) -> Self {
        units
            .into_iter()
            .filter(|u| u.is_physical())
            .fold(Self::default(), |mut acc, u| {
                acc.physical += 1;
                if u.is_dispatched {
                    acc.dispatched += 1;
                }
                acc
            })
    }

    pub fn is_complete(&self) -> bool {
        self.physical > 0 && self.dispatched == self.physical
    }
}

/// Status the order should hold given its current status and units
pub fn derive_status<'a>(
    current: OrderStatus,
    units: impl IntoIterator<Item = &'a FulfillmentUnit>,
) -> OrderStatus {
    if current.is_terminal() {
        return current;
    }

    let progress = DispatchProgress::of(units);

    if progress.is_complete() {
        OrderStatus::Ready
    } else if progress.dispatched > 0 {
        OrderStatus::PartialReady
    } else {
        match current {
            OrderStatus::Pending | OrderStatus::Preparing => current,
            // Dispatched units were removed or the order reopened; back to the kitchen
            _ => OrderStatus::Preparing,
        }
    }
}
