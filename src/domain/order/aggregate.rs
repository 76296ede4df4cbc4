use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::StationId;
use crate::event_sourcing::core::Aggregate;
use super::commands::OrderCommand;
use super::errors::FulfillmentError;
use super::events::*;
use super::financials::OrderTotals;
use super::status::derive_status;
use super::units::UnitArena;
use super::value_objects::{FulfillmentUnit, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub order_number: String,

    // Current State (derived from events)
    pub units: UnitArena,
    pub status: OrderStatus,
    pub totals: OrderTotals,
    pub payment_method: String,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Optional fields
    pub cancellation_reason: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
}

impl OrderAggregate {
    /// Events for a brand-new order. Validated by a dry-run apply.
    pub fn initial_events(command: &OrderCommand) -> Result<Vec<OrderEvent>, FulfillmentError> {
        let OrderCommand::CreateOrder { order_id, order_number, units, payment_method, tax_rate } = command else {
            return Err(FulfillmentError::NotInitialized);
        };

        if units.is_empty() {
            return Err(FulfillmentError::Validation("order must contain at least one unit".to_string()));
        }

        let event = OrderEvent::Created(OrderCreated {
            order_id: *order_id,
            order_number: order_number.clone(),
            units: units.clone(),
            payment_method: payment_method.clone(),
            tax_rate: *tax_rate,
            created_at: Utc::now(),
        });
        Self::apply_first_event(&event)?;

        Ok(vec![event])
    }

    pub fn unit(&self, unit_id: Uuid) -> Result<&FulfillmentUnit, FulfillmentError> {
        self.units.get(&unit_id).ok_or(FulfillmentError::UnitNotFound {
            order_id: self.id,
            unit_id,
        })
    }

    /// Physical, undispatched units routed to one station (the KDS view)
    pub fn station_queue(&self, station_id: &StationId) -> Vec<&FulfillmentUnit> {
        self.units
            .iter()
            .filter(|u| u.is_physical() && !u.is_dispatched && u.station_id.as_ref() == Some(station_id))
            .collect()
    }

    /// Validate that the order still accepts mutation
    fn ensure_mutable(&self) -> Result<(), FulfillmentError> {
        if self.status.is_terminal() {
            return Err(FulfillmentError::TerminalStatus(self.status));
        }
        Ok(())
    }

    /// New units must be fresh and components must point at a known parent
    fn validate_new_units(&self, units: &[FulfillmentUnit]) -> Result<(), FulfillmentError> {
        if units.is_empty() {
            return Err(FulfillmentError::Validation("no units to add".to_string()));
        }

        let mut known: HashSet<Uuid> = HashSet::new();
        for unit in units {
            if self.units.contains(&unit.unit_id) || !known.insert(unit.unit_id) {
                return Err(FulfillmentError::Validation(format!("duplicate unit id {}", unit.unit_id)));
            }
            if unit.quantity <= 0 {
                return Err(FulfillmentError::InvalidQuantity(unit.quantity));
            }
            if let Some(parent_id) = unit.parent_unit_id {
                if !known.contains(&parent_id) && !self.units.contains(&parent_id) {
                    return Err(FulfillmentError::Validation(format!(
                        "component {} references missing parent {}",
                        unit.unit_id, parent_id
                    )));
                }
            }
        }

        Ok(())
    }

    fn insert_units(&mut self, units: &[FulfillmentUnit]) -> Result<Decimal, FulfillmentError> {
        let mut delta = Decimal::ZERO;
        for unit in units {
            delta += unit.line_total();
            self.units.insert(unit.clone()).map_err(|rejected| {
                FulfillmentError::Validation(format!("unit {} cannot be inserted", rejected.unit_id))
            })?;
        }
        Ok(delta)
    }

    fn rederive_status(&mut self) {
        self.status = derive_status(self.status, self.units.iter());
    }

    fn handle_toggle(&self, unit_ids: &[Uuid]) -> Result<Vec<OrderEvent>, FulfillmentError> {
        if unit_ids.is_empty() {
            return Err(FulfillmentError::Validation("no units given".to_string()));
        }

        // A duplicate id would flip twice within one batch
        let mut seen = HashSet::new();
        let unit_ids: Vec<Uuid> = unit_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        for unit_id in &unit_ids {
            let unit = self.unit(*unit_id)?;
            if !unit.is_physical() {
                return Err(FulfillmentError::precondition(format!(
                    "unit {} is a deal container and is never prepared",
                    unit_id
                )));
            }
            if !unit.needs_preparation() {
                return Err(FulfillmentError::precondition(format!(
                    "unit {} has no station and is dispatch-only",
                    unit_id
                )));
            }
            if unit.is_dispatched {
                return Err(FulfillmentError::precondition(format!(
                    "unit {} is already dispatched",
                    unit_id
                )));
            }
        }

        Ok(vec![OrderEvent::ItemsPreparedToggled(OrderItemsPreparedToggled {
            unit_ids,
            toggled_at: Utc::now(),
        })])
    }

    fn handle_dispatch(&self, unit_id: Uuid) -> Result<Vec<OrderEvent>, FulfillmentError> {
        let unit = self.unit(unit_id)?;

        if !unit.is_physical() {
            return Err(FulfillmentError::precondition(format!(
                "unit {} is a deal container; dispatch its components",
                unit_id
            )));
        }

        // Monotonic: a retried dispatch is a no-op
        if unit.is_dispatched {
            return Ok(vec![]);
        }

        if !unit.is_ready_for_dispatch() {
            return Err(FulfillmentError::precondition(format!(
                "unit {} has not been prepared",
                unit_id
            )));
        }

        Ok(vec![OrderEvent::UnitDispatched(OrderUnitDispatched {
            unit_id,
            dispatched_at: Utc::now(),
        })])
    }

    fn handle_set_status(
        &self,
        status: OrderStatus,
        reason: &Option<String>,
    ) -> Result<Vec<OrderEvent>, FulfillmentError> {
        let now = Utc::now();

        match status {
            OrderStatus::Preparing if self.status == OrderStatus::Pending => {
                Ok(vec![OrderEvent::Accepted(OrderAccepted { accepted_at: now })])
            }
            OrderStatus::Completed => Ok(vec![OrderEvent::Completed(OrderCompleted {
                order_id: self.id,
                order_number: self.order_number.clone(),
                total_amount: self.totals.total_amount,
                payment_method: self.payment_method.clone(),
                completed_at: now,
            })]),
            OrderStatus::Cancelled => Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                reason: reason.clone(),
                cancelled_at: now,
            })]),
            // Ready / PartialReady are derived, Pending is initial only
            _ => Err(FulfillmentError::InvalidStatusTransition {
                from: self.status,
                to: status,
            }),
        }
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = FulfillmentError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => {
                let mut aggregate = Self {
                    id: e.order_id,
                    version: 0,
                    order_number: e.order_number.clone(),
                    units: UnitArena::new(),
                    status: OrderStatus::Pending,
                    totals: OrderTotals::new(Decimal::ZERO, e.tax_rate),
                    payment_method: e.payment_method.clone(),
                    created_at: e.created_at,
                    updated_at: e.created_at,
                    cancellation_reason: None,
                    completion_date: None,
                };
                let subtotal = aggregate.insert_units(&e.units)?;
                aggregate.totals = OrderTotals::new(subtotal, e.tax_rate);
                Ok(aggregate)
            }
            _ => Err(FulfillmentError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) => {
                return Err(FulfillmentError::precondition("order already created"));
            }
            OrderEvent::UnitsAdded(e) => {
                let delta = self.insert_units(&e.units)?;
                self.totals = self.totals.with_added_units(delta);
                // Ready and Completed regress first, then unit state decides
                if matches!(self.status, OrderStatus::Ready | OrderStatus::Completed) {
                    self.status = OrderStatus::PartialReady;
                }
                self.completion_date = None;
                self.rederive_status();
            }
            OrderEvent::UnitRemoved(e) => {
                let removed = self.units.remove_cascade(&e.unit_id);
                if removed.is_empty() {
                    return Err(FulfillmentError::UnitNotFound { order_id: self.id, unit_id: e.unit_id });
                }
                let delta: Decimal = removed.iter().map(FulfillmentUnit::line_total).sum();
                self.totals = self.totals.with_removed_units(delta);
                self.rederive_status();
            }
            OrderEvent::ItemsPreparedToggled(e) => {
                for unit_id in &e.unit_ids {
                    let order_id = self.id;
                    let unit = self
                        .units
                        .get_mut(unit_id)
                        .ok_or(FulfillmentError::UnitNotFound { order_id, unit_id: *unit_id })?;
                    unit.is_prepared = !unit.is_prepared;
                    unit.prepared_at = unit.is_prepared.then_some(e.toggled_at);
                }
                self.rederive_status();
            }
            OrderEvent::UnitDispatched(e) => {
                let order_id = self.id;
                let unit = self
                    .units
                    .get_mut(&e.unit_id)
                    .ok_or(FulfillmentError::UnitNotFound { order_id, unit_id: e.unit_id })?;
                unit.is_dispatched = true;
                unit.dispatched_at = Some(e.dispatched_at);
                self.rederive_status();
            }
            OrderEvent::Accepted(_) => {
                self.status = OrderStatus::Preparing;
            }
            OrderEvent::Completed(e) => {
                self.status = OrderStatus::Completed;
                self.completion_date = Some(e.completed_at);
            }
            OrderEvent::Reopened(_) => {
                self.status = OrderStatus::PartialReady;
                self.completion_date = None;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = e.reason.clone();
            }
            OrderEvent::AdjustmentApplied(e) => {
                self.totals = self.totals.with_adjustment(&e.adjustment);
            }
            OrderEvent::PaymentMethodChanged(e) => {
                self.totals = self.totals.with_tax_rate(e.tax_rate);
                self.payment_method = e.payment_method.clone();
            }
        }

        self.updated_at = event.occurred_at();
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder { .. } => {
                Err(FulfillmentError::precondition(format!("order {} already exists", self.id)))
            }

            OrderCommand::AddUnits { units } => {
                // A completed order may be reopened by new items; cancelled may not
                if self.status == OrderStatus::Cancelled {
                    return Err(FulfillmentError::TerminalStatus(self.status));
                }
                self.validate_new_units(units)?;

                let now = Utc::now();
                let mut events = Vec::with_capacity(2);
                if self.status == OrderStatus::Completed {
                    events.push(OrderEvent::Reopened(OrderReopened {
                        reversed_amount: self.totals.total_amount,
                        payment_method: self.payment_method.clone(),
                        reopened_at: now,
                    }));
                }
                events.push(OrderEvent::UnitsAdded(OrderUnitsAdded {
                    units: units.clone(),
                    added_at: now,
                }));
                Ok(events)
            }

            OrderCommand::RemoveUnit { unit_id } => {
                self.ensure_mutable()?;
                let unit = self.unit(*unit_id)?;
                if unit.is_component {
                    return Err(FulfillmentError::precondition(format!(
                        "unit {} belongs to deal {:?}; remove the deal instead",
                        unit_id, unit.parent_unit_id
                    )));
                }

                Ok(vec![OrderEvent::UnitRemoved(OrderUnitRemoved {
                    unit_id: *unit_id,
                    removed_unit_ids: self.units.cascade_ids(unit_id),
                    removed_at: Utc::now(),
                })])
            }

            OrderCommand::TogglePrepared { unit_ids } => {
                self.ensure_mutable()?;
                self.handle_toggle(unit_ids)
            }

            OrderCommand::DispatchUnit { unit_id } => {
                self.ensure_mutable()?;
                self.handle_dispatch(*unit_id)
            }

            OrderCommand::SetStatus { status, reason } => {
                self.ensure_mutable()?;
                self.handle_set_status(*status, reason)
            }

            OrderCommand::ApplyAdjustment { adjustment } => {
                self.ensure_mutable()?;
                Ok(vec![OrderEvent::AdjustmentApplied(OrderAdjustmentApplied {
                    adjustment: adjustment.clone(),
                    applied_at: Utc::now(),
                })])
            }

            OrderCommand::ChangePaymentMethod { payment_method, tax_rate } => {
                self.ensure_mutable()?;
                if *tax_rate < Decimal::ZERO {
                    return Err(FulfillmentError::Validation(format!(
                        "tax rate for {} is negative",
                        payment_method
                    )));
                }
                Ok(vec![OrderEvent::PaymentMethodChanged(OrderPaymentMethodChanged {
                    payment_method: payment_method.clone(),
                    tax_rate: *tax_rate,
                    changed_at: Utc::now(),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Order View - the aggregate as returned to callers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub units: Vec<FulfillmentUnit>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub payment_method: String,
    pub cancellation_reason: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Order {
    pub fn unit(&self, unit_id: Uuid) -> Option<&FulfillmentUnit> {
        self.units.iter().find(|u| u.unit_id == unit_id)
    }

    /// Units spawned by the given deal parent
    pub fn components_of(&self, parent_unit_id: Uuid) -> impl Iterator<Item = &FulfillmentUnit> {
        self.units.iter().filter(move |u| u.parent_unit_id == Some(parent_unit_id))
    }
}

impl From<&OrderAggregate> for Order {
    fn from(aggregate: &OrderAggregate) -> Self {
        Self {
            id: aggregate.id,
            order_number: aggregate.order_number.clone(),
            status: aggregate.status,
            units: aggregate.units.iter().cloned().collect(),
            totals: aggregate.totals.clone(),
            payment_method: aggregate.payment_method.clone(),
            cancellation_reason: aggregate.cancellation_reason.clone(),
            completion_date: aggregate.completion_date,
            created_at: aggregate.created_at,
            updated_at: aggregate.updated_at,
            version: aggregate.version,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogItem, InMemoryCatalog};
    use crate::domain::order::decomposition::Decomposer;
    use crate::domain::order::value_objects::{Adjustment, DiscountType, LineItem};
    use crate::event_sourcing::core::EventEnvelope;
    use rust_decimal_macros::dec;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new([
            CatalogItem::new("pizza", "Pizza", dec!(12.00)).with_station("oven"),
            CatalogItem::new("drink", "Drink", dec!(2.50)).with_station("bar"),
            CatalogItem::new("water", "Bottled Water", dec!(1.00)),
            CatalogItem::new("family-deal", "Family Deal", dec!(30.00))
                .with_station("expo")
                .with_component("pizza", 2)
                .with_component("drink", 1),
            CatalogItem::new("banquet", "Banquet", dec!(1000.00)),
            CatalogItem::new("ghost-deal", "Ghost Deal", dec!(5.00)).with_component("discontinued", 2),
        ])
    }

    fn units_for(lines: &[LineItem]) -> Vec<FulfillmentUnit> {
        let catalog = catalog();
        Decomposer::new(&catalog).decompose_lines(lines).unwrap().units
    }

    fn create(lines: &[LineItem], tax_rate: Decimal) -> OrderAggregate {
        let command = OrderCommand::CreateOrder {
            order_id: Uuid::new_v4(),
            order_number: "ORD-0001".to_string(),
            units: units_for(lines),
            payment_method: "cash".to_string(),
            tax_rate,
        };
        let events = OrderAggregate::initial_events(&command).unwrap();
        OrderAggregate::apply_first_event(&events[0]).unwrap()
    }

    fn exec(aggregate: &mut OrderAggregate, command: OrderCommand) -> Result<Vec<OrderEvent>, FulfillmentError> {
        let events = aggregate.handle_command(&command)?;
        for event in &events {
            aggregate.apply_event(event).unwrap();
        }
        Ok(events)
    }

    fn ids_where(aggregate: &OrderAggregate, pred: impl Fn(&FulfillmentUnit) -> bool) -> Vec<Uuid> {
        aggregate.units.iter().filter(|u| pred(u)).map(|u| u.unit_id).collect()
    }

    fn prepare_and_dispatch(aggregate: &mut OrderAggregate, unit_id: Uuid) {
        if aggregate.unit(unit_id).unwrap().needs_preparation() {
            exec(aggregate, OrderCommand::TogglePrepared { unit_ids: vec![unit_id] }).unwrap();
        }
        exec(aggregate, OrderCommand::DispatchUnit { unit_id }).unwrap();
    }

    #[test]
    fn test_created_order_totals_and_status() {
        let order = create(&[LineItem::new("banquet", 1)], dec!(0.16));

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.totals.subtotal, dec!(1000));
        assert_eq!(order.totals.tax_amount, dec!(160));
        assert_eq!(order.totals.total_amount, dec!(1160));
    }

    #[test]
    fn test_create_requires_units() {
        let command = OrderCommand::CreateOrder {
            order_id: Uuid::new_v4(),
            order_number: "ORD-0002".to_string(),
            units: vec![],
            payment_method: "cash".to_string(),
            tax_rate: dec!(0.16),
        };
        assert!(matches!(
            OrderAggregate::initial_events(&command),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let mut order = create(&[LineItem::new("pizza", 1), LineItem::new("drink", 1)], dec!(0));
        let ids = ids_where(&order, |u| u.needs_preparation());

        exec(&mut order, OrderCommand::TogglePrepared { unit_ids: ids.clone() }).unwrap();
        assert!(ids.iter().all(|id| order.unit(*id).unwrap().is_prepared));
        assert!(ids.iter().all(|id| order.unit(*id).unwrap().prepared_at.is_some()));

        exec(&mut order, OrderCommand::TogglePrepared { unit_ids: ids.clone() }).unwrap();
        assert!(ids.iter().all(|id| !order.unit(*id).unwrap().is_prepared));
        assert!(ids.iter().all(|id| order.unit(*id).unwrap().prepared_at.is_none()));
    }

    #[test]
    fn test_duplicate_ids_in_batch_flip_once() {
        let mut order = create(&[LineItem::new("pizza", 1)], dec!(0));
        let id = ids_where(&order, |_| true)[0];

        exec(&mut order, OrderCommand::TogglePrepared { unit_ids: vec![id, id] }).unwrap();
        assert!(order.unit(id).unwrap().is_prepared);
    }

    #[test]
    fn test_toggle_rejections_are_all_or_nothing() {
        let mut order = create(
            &[LineItem::new("pizza", 1), LineItem::new("water", 1), LineItem::new("family-deal", 1)],
            dec!(0),
        );
        let pizza = ids_where(&order, |u| u.catalog_id.as_str() == "pizza" && !u.is_component)[0];
        let water = ids_where(&order, |u| u.catalog_id.as_str() == "water")[0];
        let deal = ids_where(&order, |u| u.is_deal)[0];

        for bad in [water, deal, Uuid::new_v4()] {
            let result = exec(&mut order, OrderCommand::TogglePrepared { unit_ids: vec![pizza, bad] });
            assert!(result.is_err());
            assert!(!order.unit(pizza).unwrap().is_prepared);
        }

        assert!(matches!(
            exec(&mut order, OrderCommand::TogglePrepared { unit_ids: vec![water] }),
            Err(FulfillmentError::PreconditionFailed(_))
        ));
        assert!(matches!(
            exec(&mut order, OrderCommand::TogglePrepared { unit_ids: vec![Uuid::nil()] }),
            Err(FulfillmentError::UnitNotFound { .. })
        ));
        assert!(matches!(
            exec(&mut order, OrderCommand::TogglePrepared { unit_ids: vec![] }),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_dispatched_unit_cannot_be_unprepared() {
        let mut order = create(&[LineItem::new("pizza", 1)], dec!(0));
        let id = ids_where(&order, |_| true)[0];
        prepare_and_dispatch(&mut order, id);

        assert!(matches!(
            exec(&mut order, OrderCommand::TogglePrepared { unit_ids: vec![id] }),
            Err(FulfillmentError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_dispatch_preconditions() {
        let mut order = create(&[LineItem::new("pizza", 1), LineItem::new("water", 1)], dec!(0));
        let pizza = ids_where(&order, |u| u.catalog_id.as_str() == "pizza")[0];
        let water = ids_where(&order, |u| u.catalog_id.as_str() == "water")[0];

        assert!(matches!(
            exec(&mut order, OrderCommand::DispatchUnit { unit_id: pizza }),
            Err(FulfillmentError::PreconditionFailed(_))
        ));

        // Stationless units dispatch without preparation
        exec(&mut order, OrderCommand::DispatchUnit { unit_id: water }).unwrap();
        assert!(order.unit(water).unwrap().is_dispatched);
        assert_eq!(order.status, OrderStatus::PartialReady);

        // Retrying is safe and emits nothing
        let events = exec(&mut order, OrderCommand::DispatchUnit { unit_id: water }).unwrap();
        assert!(events.is_empty());

        assert!(matches!(
            exec(&mut order, OrderCommand::DispatchUnit { unit_id: Uuid::new_v4() }),
            Err(FulfillmentError::UnitNotFound { .. })
        ));
    }

    #[test]
    fn test_deal_container_cannot_be_dispatched() {
        let mut order = create(&[LineItem::new("family-deal", 1)], dec!(0));
        let deal = ids_where(&order, |u| u.is_deal)[0];

        assert!(matches!(
            exec(&mut order, OrderCommand::DispatchUnit { unit_id: deal }),
            Err(FulfillmentError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_three_physical_units_partial_then_ready() {
        let mut order = create(&[LineItem::new("pizza", 1), LineItem::new("drink", 1), LineItem::new("water", 1)], dec!(0));
        exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Preparing, reason: None }).unwrap();
        let ids = ids_where(&order, |_| true);

        prepare_and_dispatch(&mut order, ids[0]);
        prepare_and_dispatch(&mut order, ids[1]);
        assert_eq!(order.status, OrderStatus::PartialReady);

        prepare_and_dispatch(&mut order, ids[2]);
        assert_eq!(order.status, OrderStatus::Ready);
    }

    #[test]
    fn test_deal_readiness_comes_from_components() {
        let mut order = create(&[LineItem::new("family-deal", 1)], dec!(0));
        let components = ids_where(&order, |u| u.is_component);
        assert_eq!(components.len(), 3);

        for id in &components {
            prepare_and_dispatch(&mut order, *id);
        }
        assert_eq!(order.status, OrderStatus::Ready);

        let deal = ids_where(&order, |u| u.is_deal)[0];
        assert!(!order.unit(deal).unwrap().is_dispatched);
    }

    #[test]
    fn test_station_queue_lists_undispatched_units() {
        let mut order = create(&[LineItem::new("family-deal", 1), LineItem::new("pizza", 1)], dec!(0));
        let oven = StationId::new("oven");

        assert_eq!(order.station_queue(&oven).len(), 3);
        // The deal parent is routed to expo but is never queued there
        assert!(order.station_queue(&StationId::new("expo")).is_empty());

        let first = order.station_queue(&oven)[0].unit_id;
        prepare_and_dispatch(&mut order, first);
        assert_eq!(order.station_queue(&oven).len(), 2);
    }

    #[test]
    fn test_explicit_status_transitions() {
        let mut order = create(&[LineItem::new("pizza", 1)], dec!(0));

        for derived in [OrderStatus::Ready, OrderStatus::PartialReady, OrderStatus::Pending] {
            assert!(matches!(
                exec(&mut order, OrderCommand::SetStatus { status: derived, reason: None }),
                Err(FulfillmentError::InvalidStatusTransition { .. })
            ));
        }

        exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Preparing, reason: None }).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert!(matches!(
            exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Preparing, reason: None }),
            Err(FulfillmentError::InvalidStatusTransition { .. })
        ));

        exec(
            &mut order,
            OrderCommand::SetStatus { status: OrderStatus::Cancelled, reason: Some("walked out".into()) },
        )
        .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancellation_reason.as_deref(), Some("walked out"));
    }

    #[test]
    fn test_terminal_order_rejects_mutation() {
        let mut order = create(&[LineItem::new("pizza", 1)], dec!(0));
        let id = ids_where(&order, |_| true)[0];
        exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Cancelled, reason: None }).unwrap();

        let attempts = vec![
            OrderCommand::TogglePrepared { unit_ids: vec![id] },
            OrderCommand::DispatchUnit { unit_id: id },
            OrderCommand::RemoveUnit { unit_id: id },
            OrderCommand::SetStatus { status: OrderStatus::Completed, reason: None },
            OrderCommand::ApplyAdjustment { adjustment: Adjustment::Complementary { reason: None } },
            OrderCommand::ChangePaymentMethod { payment_method: "card".into(), tax_rate: dec!(0.05) },
            OrderCommand::AddUnits { units: units_for(&[LineItem::new("drink", 1)]) },
        ];
        for command in attempts {
            assert!(matches!(
                exec(&mut order, command),
                Err(FulfillmentError::TerminalStatus(OrderStatus::Cancelled))
            ));
        }
    }

    #[test]
    fn test_add_units_to_ready_order_regresses() {
        let mut order = create(&[LineItem::new("water", 1)], dec!(0.10));
        let water = ids_where(&order, |_| true)[0];
        exec(&mut order, OrderCommand::DispatchUnit { unit_id: water }).unwrap();
        assert_eq!(order.status, OrderStatus::Ready);

        exec(&mut order, OrderCommand::AddUnits { units: units_for(&[LineItem::new("pizza", 2)]) }).unwrap();

        assert_eq!(order.status, OrderStatus::PartialReady);
        assert_eq!(order.completion_date, None);
        assert_eq!(order.totals.subtotal, dec!(25.00));
        assert_eq!(order.totals.tax_amount, dec!(2.50));
        assert_eq!(order.totals.total_amount, dec!(27.50));
        assert_eq!(order.totals.original_total_amount, Some(dec!(27.50)));
    }

    #[test]
    fn test_add_unresolvable_deal_keeps_ready_order_ready() {
        let mut order = create(&[LineItem::new("water", 1)], dec!(0));
        let water = ids_where(&order, |_| true)[0];
        exec(&mut order, OrderCommand::DispatchUnit { unit_id: water }).unwrap();
        assert_eq!(order.status, OrderStatus::Ready);

        // Every component is missing, so only the non-physical container is added
        let units = units_for(&[LineItem::new("ghost-deal", 1)]);
        assert_eq!(units.len(), 1);
        exec(&mut order, OrderCommand::AddUnits { units }).unwrap();

        assert_eq!(order.status, OrderStatus::Ready);
        assert_eq!(order.totals.subtotal, dec!(6.00));
    }

    #[test]
    fn test_add_units_to_undispatched_completed_order() {
        let mut order = create(&[LineItem::new("water", 1)], dec!(0));
        exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Completed, reason: None }).unwrap();

        exec(&mut order, OrderCommand::AddUnits { units: units_for(&[LineItem::new("drink", 1)]) }).unwrap();

        // Nothing was ever handed over, so the order goes back to the kitchen
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.completion_date, None);
    }

    #[test]
    fn test_add_units_reopens_completed_order() {
        let mut order = create(&[LineItem::new("water", 2)], dec!(0));
        let water = ids_where(&order, |_| true)[0];
        exec(&mut order, OrderCommand::DispatchUnit { unit_id: water }).unwrap();
        exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Completed, reason: None }).unwrap();
        assert!(order.completion_date.is_some());

        let events = exec(&mut order, OrderCommand::AddUnits { units: units_for(&[LineItem::new("drink", 1)]) }).unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], OrderEvent::Reopened(e) if e.reversed_amount == dec!(2.00)));
        assert_eq!(order.status, OrderStatus::PartialReady);
        assert_eq!(order.completion_date, None);
        assert_eq!(order.totals.total_amount, dec!(4.50));
    }

    #[test]
    fn test_add_units_rejects_reused_ids() {
        let mut order = create(&[LineItem::new("pizza", 1)], dec!(0));
        let existing: Vec<FulfillmentUnit> = order.units.iter().cloned().collect();

        assert!(matches!(
            exec(&mut order, OrderCommand::AddUnits { units: existing }),
            Err(FulfillmentError::Validation(_))
        ));
        assert!(matches!(
            exec(&mut order, OrderCommand::AddUnits { units: vec![] }),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_remove_deal_cascades_and_recomputes() {
        let mut order = create(&[LineItem::new("family-deal", 1), LineItem::new("water", 1)], dec!(0));
        let deal = ids_where(&order, |u| u.is_deal)[0];
        let water = ids_where(&order, |u| u.catalog_id.as_str() == "water")[0];
        let component = ids_where(&order, |u| u.is_component)[0];

        assert!(matches!(
            exec(&mut order, OrderCommand::RemoveUnit { unit_id: component }),
            Err(FulfillmentError::PreconditionFailed(_))
        ));

        exec(&mut order, OrderCommand::DispatchUnit { unit_id: water }).unwrap();
        assert_eq!(order.status, OrderStatus::PartialReady);

        let events = exec(&mut order, OrderCommand::RemoveUnit { unit_id: deal }).unwrap();
        assert!(matches!(&events[0], OrderEvent::UnitRemoved(e) if e.removed_unit_ids.len() == 4));

        assert_eq!(order.units.len(), 1);
        assert!(order.unit(water).is_ok());
        assert_eq!(order.totals.subtotal, dec!(1.00));
        // Only the dispatched water remains
        assert_eq!(order.status, OrderStatus::Ready);
    }

    #[test]
    fn test_discount_scenario_through_aggregate() {
        let mut order = create(&[LineItem::new("banquet", 1)], dec!(0.16));

        exec(
            &mut order,
            OrderCommand::ApplyAdjustment {
                adjustment: Adjustment::Discount { discount_type: DiscountType::Percentage, value: dec!(10) },
            },
        )
        .unwrap();
        assert_eq!(order.totals.discount_amount, Some(dec!(116)));
        assert_eq!(order.totals.total_amount, dec!(1044));
        assert_eq!(order.totals.original_total_amount, Some(dec!(1160)));

        exec(
            &mut order,
            OrderCommand::ChangePaymentMethod { payment_method: "card".into(), tax_rate: dec!(0.05) },
        )
        .unwrap();
        assert_eq!(order.payment_method, "card");
        assert_eq!(order.totals.total_amount, dec!(934));
    }

    #[test]
    fn test_completed_event_carries_settlement() {
        let mut order = create(&[LineItem::new("banquet", 1)], dec!(0.16));
        let events = exec(&mut order, OrderCommand::SetStatus { status: OrderStatus::Completed, reason: None }).unwrap();

        match &events[0] {
            OrderEvent::Completed(e) => {
                assert_eq!(e.total_amount, dec!(1160));
                assert_eq!(e.payment_method, "cash");
                assert_eq!(e.order_number, "ORD-0001");
                assert_eq!(e.order_id, order.id);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_replay_reproduces_state() {
        let command = OrderCommand::CreateOrder {
            order_id: Uuid::new_v4(),
            order_number: "ORD-0042".to_string(),
            units: units_for(&[LineItem::new("family-deal", 1), LineItem::new("water", 1)]),
            payment_method: "cash".to_string(),
            tax_rate: dec!(0.16),
        };
        let mut history = OrderAggregate::initial_events(&command).unwrap();
        let mut live = OrderAggregate::apply_first_event(&history[0]).unwrap();

        let water = ids_where(&live, |u| u.catalog_id.as_str() == "water")[0];
        let pizza = ids_where(&live, |u| u.catalog_id.as_str() == "pizza")[0];
        history.extend(exec(&mut live, OrderCommand::DispatchUnit { unit_id: water }).unwrap());
        history.extend(exec(&mut live, OrderCommand::TogglePrepared { unit_ids: vec![pizza] }).unwrap());
        history.extend(
            exec(&mut live, OrderCommand::ApplyAdjustment { adjustment: Adjustment::Complementary { reason: None } })
                .unwrap(),
        );

        let envelopes: Vec<EventEnvelope<OrderEvent>> = history
            .into_iter()
            .enumerate()
            .map(|(i, e)| EventEnvelope::new(live.id, i as i64 + 1, e, Uuid::new_v4()))
            .collect();
        let replayed = OrderAggregate::load_from_events(envelopes).unwrap();

        assert_eq!(replayed.version(), 4);
        assert_eq!(Order::from(&replayed).units, Order::from(&live).units);
        assert_eq!(replayed.totals, live.totals);
        assert_eq!(replayed.status, live.status);
    }
}
