use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::catalog::{CatalogLookup, StationId, TaxRateLookup};
use crate::event_sourcing::core::EventEnvelope;
use crate::event_sourcing::store::EventStore;
use crate::metrics::Metrics;

use super::aggregate::Order;
use super::command_handler::OrderCommandHandler;
use super::commands::OrderCommand;
use super::decomposition::{Decomposer, Decomposition, DEFAULT_MAX_UNITS_PER_LINE};
use super::errors::FulfillmentError;
use super::events::OrderEvent;
use super::value_objects::{
    Adjustment, AdjustmentRequest, CreateOrderRequest, FulfillmentUnit, LineItem, OrderStatus,
};

// ============================================================================
// Order Service - public entry point
// ============================================================================
//
// Resolves catalog entries and tax rates, then hands concrete commands to
// the command handler. Every mutating call returns the full updated order.
//
// ============================================================================

pub struct OrderService {
    handler: OrderCommandHandler,
    catalog: Arc<dyn CatalogLookup>,
    tax_rates: Arc<dyn TaxRateLookup>,
    metrics: Arc<Metrics>,
    default_payment_method: String,
    next_order_number: AtomicU64,
    max_units_per_line: usize,
}

impl OrderService {
    pub fn new(
        event_store: Arc<dyn EventStore<OrderEvent>>,
        catalog: Arc<dyn CatalogLookup>,
        tax_rates: Arc<dyn TaxRateLookup>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            handler: OrderCommandHandler::new(event_store, metrics.clone()),
            catalog,
            tax_rates,
            metrics,
            default_payment_method: "cash".to_string(),
            next_order_number: AtomicU64::new(1),
            max_units_per_line: DEFAULT_MAX_UNITS_PER_LINE,
        }
    }

    pub fn with_default_payment_method(mut self, payment_method: impl Into<String>) -> Self {
        self.default_payment_method = payment_method.into();
        self
    }

    pub fn with_order_number_start(mut self, start: u64) -> Self {
        self.next_order_number = AtomicU64::new(start);
        self
    }

    pub fn with_max_units_per_line(mut self, max_units_per_line: usize) -> Self {
        self.max_units_per_line = max_units_per_line;
        self
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, FulfillmentError> {
        let requested = request
            .payment_method
            .unwrap_or_else(|| self.default_payment_method.clone());
        let (payment_method, tax_rate) = self.resolve_payment_method(&requested)?;
        let decomposition = self.decompose(&request.lines)?;

        let order_id = Uuid::new_v4();
        let order_number = self.allocate_order_number();
        let unit_count = decomposition.units.len();

        let command = OrderCommand::CreateOrder {
            order_id,
            order_number: order_number.clone(),
            units: decomposition.units,
            payment_method,
            tax_rate,
        };
        let order = self.execute(order_id, command).await?;
        self.metrics.orders_created.inc();

        tracing::info!(
            order_id = %order_id,
            order_number = %order_number,
            unit_count = unit_count,
            total_amount = %order.totals.total_amount,
            "Order created"
        );

        Ok(order)
    }

    pub async fn add_units(&self, order_id: Uuid, lines: Vec<LineItem>) -> Result<Order, FulfillmentError> {
        let decomposition = self.decompose(&lines)?;
        let unit_count = decomposition.units.len();

        let order = self
            .execute(order_id, OrderCommand::AddUnits { units: decomposition.units })
            .await?;

        tracing::info!(
            order_id = %order_id,
            unit_count = unit_count,
            status = %order.status,
            "Units added to order"
        );

        Ok(order)
    }

    pub async fn toggle_items_prepared(&self, order_id: Uuid, unit_ids: Vec<Uuid>) -> Result<Order, FulfillmentError> {
        let unit_count = unit_ids.len();
        let order = self
            .execute(order_id, OrderCommand::TogglePrepared { unit_ids })
            .await?;

        tracing::info!(
            order_id = %order_id,
            unit_count = unit_count,
            status = %order.status,
            "Toggled prepared flag"
        );

        Ok(order)
    }

    /// Safe to retry: dispatching an already dispatched unit changes nothing
    pub async fn dispatch_unit(&self, order_id: Uuid, unit_id: Uuid) -> Result<Order, FulfillmentError> {
        let order = self
            .execute(order_id, OrderCommand::DispatchUnit { unit_id })
            .await?;

        tracing::info!(
            order_id = %order_id,
            unit_id = %unit_id,
            status = %order.status,
            "Unit dispatched"
        );

        Ok(order)
    }

    pub async fn set_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order, FulfillmentError> {
        let order = self
            .execute(order_id, OrderCommand::SetStatus { status, reason })
            .await?;

        tracing::info!(order_id = %order_id, status = %order.status, "Order status set");
        Ok(order)
    }

    pub async fn apply_adjustment(&self, order_id: Uuid, request: AdjustmentRequest) -> Result<Order, FulfillmentError> {
        let adjustment = Adjustment::try_from(request)?;
        let order = self
            .execute(order_id, OrderCommand::ApplyAdjustment { adjustment })
            .await?;

        tracing::info!(
            order_id = %order_id,
            total_amount = %order.totals.total_amount,
            is_complementary = order.totals.is_complementary,
            "Adjustment applied"
        );

        Ok(order)
    }

    pub async fn change_payment_method(&self, order_id: Uuid, payment_method: &str) -> Result<Order, FulfillmentError> {
        let (payment_method, tax_rate) = self.resolve_payment_method(payment_method)?;
        let order = self
            .execute(order_id, OrderCommand::ChangePaymentMethod { payment_method, tax_rate })
            .await?;

        tracing::info!(
            order_id = %order_id,
            payment_method = %order.payment_method,
            total_amount = %order.totals.total_amount,
            "Payment method changed"
        );

        Ok(order)
    }

    /// Remove a top-level unit together with its deal components
    pub async fn remove_unit(&self, order_id: Uuid, unit_id: Uuid) -> Result<Order, FulfillmentError> {
        let order = self
            .execute(order_id, OrderCommand::RemoveUnit { unit_id })
            .await?;

        tracing::info!(
            order_id = %order_id,
            unit_id = %unit_id,
            remaining_units = order.units.len(),
            "Unit removed"
        );

        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, FulfillmentError> {
        let aggregate = self.handler.load(order_id).await?;
        Ok(Order::from(&aggregate))
    }

    /// Physical, undispatched units of one order routed to the station
    pub async fn station_queue(
        &self,
        order_id: Uuid,
        station_id: &StationId,
    ) -> Result<Vec<FulfillmentUnit>, FulfillmentError> {
        let aggregate = self.handler.load(order_id).await?;
        Ok(aggregate.station_queue(station_id).into_iter().cloned().collect())
    }

    pub async fn order_history(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, FulfillmentError> {
        self.handler.history(order_id).await
    }

    async fn execute(&self, order_id: Uuid, command: OrderCommand) -> Result<Order, FulfillmentError> {
        let aggregate = self.handler.handle(order_id, command, Uuid::new_v4()).await?;
        Ok(Order::from(&aggregate))
    }

    fn decompose(&self, lines: &[LineItem]) -> Result<Decomposition, FulfillmentError> {
        let decomposition = Decomposer::new(self.catalog.as_ref())
            .with_max_units_per_line(self.max_units_per_line)
            .decompose_lines(lines)?;
        for component in &decomposition.skipped_components {
            self.metrics.record_catalog_inconsistency(component.as_str());
        }
        Ok(decomposition)
    }

    fn resolve_payment_method(&self, payment_method: &str) -> Result<(String, Decimal), FulfillmentError> {
        let normalized = payment_method.trim().to_lowercase();
        let tax_rate = self
            .tax_rates
            .get_tax_rate(&normalized)
            .ok_or_else(|| FulfillmentError::PaymentMethodNotFound(payment_method.to_string()))?;
        Ok((normalized, tax_rate))
    }

    fn allocate_order_number(&self) -> String {
        let n = self.next_order_number.fetch_add(1, Ordering::Relaxed);
        format!("ORD-{:04}", n)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
