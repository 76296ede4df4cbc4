use std::sync::Arc;
use rust_decimal_macros::dec;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kitchen_fulfillment::config::FulfillmentConfig;
use kitchen_fulfillment::domain::catalog::StationId;
use kitchen_fulfillment::domain::order::OrderEvent;
use kitchen_fulfillment::event_sourcing::store::InMemoryEventStore;
use kitchen_fulfillment::messaging::{CashBalanceProjection, ChannelPublisher, OutboxRelay};
use kitchen_fulfillment::metrics::{self, Metrics};
use kitchen_fulfillment::utils::RetryConfig;
use kitchen_fulfillment::{
    AdjustmentRequest, CatalogItem, CreateOrderRequest, InMemoryCatalog, LineItem, OrderService,
    OrderStatus, PaymentMethodTable,
};

fn demo_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new([
        CatalogItem::new("pizza", "Margherita Pizza", dec!(12.00)).with_station("oven"),
        CatalogItem::new("fries", "Fries", dec!(3.50)).with_station("fryer"),
        CatalogItem::new("drink", "Soft Drink", dec!(2.50)).with_station("bar"),
        CatalogItem::new("water", "Bottled Water", dec!(1.00)),
        CatalogItem::new("burger", "Burger", dec!(8.00))
            .with_station("grill")
            .with_variant("double", "Double Burger", dec!(11.00))
            .with_eligible_addon("bacon"),
        CatalogItem::new("family-deal", "Family Deal", dec!(30.00))
            .with_component("pizza", 2)
            .with_component("drink", 1),
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kitchen_fulfillment=debug"))
        )
        .init();

    tracing::info!("🚀 Starting Kitchen Fulfillment Engine demo");

    // === 1. Configuration ===
    let config = FulfillmentConfig::load()?;

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // actix-web needs its own system; run it on a dedicated thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, metrics_port)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 3. Event store, lookups and the order service ===
    let store = Arc::new(InMemoryEventStore::<OrderEvent>::new("Order", "order-events"));
    let service = OrderService::new(
        store.clone(),
        Arc::new(demo_catalog()),
        Arc::new(PaymentMethodTable::new(config.tax_rates.clone())),
        metrics.clone(),
    )
    .with_default_payment_method(config.default_payment_method.clone())
    .with_order_number_start(config.order_number_start)
    .with_max_units_per_line(config.max_units_per_line);

    // === 4. Outbox relay and cash balance consumer ===
    let (publisher, receiver) = ChannelPublisher::new(1024);
    let relay = OutboxRelay::new(store.clone(), Arc::new(publisher), metrics.clone())
        .with_retry(RetryConfig::default().with_max_attempts(config.relay_max_attempts))
        .with_batch_size(config.relay_batch_size);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_handle = tokio::spawn(relay.run(config.relay_interval, shutdown_rx));

    let projection = Arc::new(CashBalanceProjection::new());
    let projection_handle = {
        let projection = projection.clone();
        tokio::spawn(async move { projection.run(receiver).await })
    };

    // === 5. Demonstrate an order lifecycle ===
    let order = service
        .create_order(CreateOrderRequest {
            lines: vec![
                LineItem::new("family-deal", 1),
                LineItem::new("burger", 1).with_variant("double").with_addon("bacon", dec!(1.50), 1),
                LineItem::new("water", 2),
            ],
            payment_method: None,
        })
        .await?;
    tracing::info!(
        order_number = %order.order_number,
        units = order.units.len(),
        total = %order.totals.total_amount,
        "✅ Order placed"
    );

    service.set_status(order.id, OrderStatus::Preparing, None).await?;

    for station in ["oven", "bar", "grill"] {
        let queue = service.station_queue(order.id, &StationId::new(station)).await?;
        let unit_ids: Vec<_> = queue.iter().map(|u| u.unit_id).collect();
        tracing::info!(station = station, units = unit_ids.len(), "🍳 Station working");

        service.toggle_items_prepared(order.id, unit_ids.clone()).await?;
        for unit_id in unit_ids {
            service.dispatch_unit(order.id, unit_id).await?;
        }
    }

    let water = order
        .units
        .iter()
        .find(|u| u.catalog_id.as_str() == "water")
        .map(|u| u.unit_id);
    if let Some(unit_id) = water {
        let ready = service.dispatch_unit(order.id, unit_id).await?;
        tracing::info!(status = %ready.status, "📦 All units handed over");
    }

    let order = service.apply_adjustment(order.id, AdjustmentRequest::percentage(dec!(10))).await?;
    tracing::info!(total = %order.totals.total_amount, "💸 Discount applied");

    service.set_status(order.id, OrderStatus::Completed, None).await?;

    // Late extra item reopens the order
    let order = service.add_units(order.id, vec![LineItem::new("fries", 1)]).await?;
    tracing::info!(status = %order.status, total = %order.totals.total_amount, "🔁 Order reopened");

    // === 6. Shut down: drain the outbox, then let the consumer finish ===
    shutdown_tx.send(true)?;
    relay_handle.await?;
    projection_handle.await?;

    for (method, balance) in projection.snapshot().await {
        tracing::info!(payment_method = %method, balance = %balance, "💰 Cash balance");
    }

    tracing::info!("🎉 Demo complete!");
    Ok(())
}
