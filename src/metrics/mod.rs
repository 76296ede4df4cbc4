// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order commands (throughput, failures by error kind, latency)
// - Appended events and dispatched units
// - Catalog inconsistencies recovered during decomposition
// - Outbox relay publication and retry attempts
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Command Metrics
    pub orders_created: IntCounter,
    pub commands_handled: IntCounterVec,
    pub commands_failed: IntCounterVec,
    pub command_duration: HistogramVec,

    // Event Metrics
    pub events_appended: IntCounterVec,
    pub units_dispatched: IntCounter,
    pub catalog_inconsistencies: IntCounterVec,

    // Outbox Relay Metrics
    pub outbox_published: IntCounterVec,
    pub outbox_failed: IntCounterVec,
    pub retry_attempts_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Command Metrics
        let orders_created = IntCounter::new("orders_created_total", "Total orders placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let commands_handled = IntCounterVec::new(
            Opts::new("order_commands_handled_total", "Total order commands that succeeded"),
            &["command"],
        )?;
        registry.register(Box::new(commands_handled.clone()))?;

        let commands_failed = IntCounterVec::new(
            Opts::new("order_commands_failed_total", "Total order commands rejected or failed"),
            &["command", "reason"],
        )?;
        registry.register(Box::new(commands_failed.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new("order_command_duration_seconds", "Order command handling duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        // Event Metrics
        let events_appended = IntCounterVec::new(
            Opts::new("order_events_appended_total", "Total events appended to the event store"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let units_dispatched = IntCounter::new(
            "units_dispatched_total",
            "Total fulfillment units handed over",
        )?;
        registry.register(Box::new(units_dispatched.clone()))?;

        let catalog_inconsistencies = IntCounterVec::new(
            Opts::new(
                "catalog_inconsistencies_total",
                "Deal components that could not be resolved and were skipped",
            ),
            &["component"],
        )?;
        registry.register(Box::new(catalog_inconsistencies.clone()))?;

        // Outbox Relay Metrics
        let outbox_published = IntCounterVec::new(
            Opts::new("outbox_messages_published_total", "Total outbox messages published"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_failed = IntCounterVec::new(
            Opts::new("outbox_messages_failed_total", "Outbox messages that failed after all retries"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_failed.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            commands_handled,
            commands_failed,
            command_duration,
            events_appended,
            units_dispatched,
            catalog_inconsistencies,
            outbox_published,
            outbox_failed,
            retry_attempts_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a handled command. `failure` is the error kind label.
    pub fn record_command(&self, command: &str, duration_secs: f64, failure: Option<&str>) {
        match failure {
            None => self.commands_handled.with_label_values(&[command]).inc(),
            Some(reason) => self.commands_failed.with_label_values(&[command, reason]).inc(),
        }
        self.command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    /// Helper to record an appended event
    pub fn record_event_appended(&self, event_type: &str) {
        self.events_appended.with_label_values(&[event_type]).inc();
    }

    /// Helper to record a skipped deal component
    pub fn record_catalog_inconsistency(&self, component: &str) {
        self.catalog_inconsistencies.with_label_values(&[component]).inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    /// Helper to record relay outcome
    pub fn record_publish_outcome(&self, event_type: &str, success: bool) {
        if success {
            self.outbox_published.with_label_values(&[event_type]).inc();
        } else {
            self.outbox_failed.with_label_values(&[event_type]).inc();
        }
    }
}
