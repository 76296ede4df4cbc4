use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

// ============================================================================
// Configuration - environment variables with defaults
// ============================================================================

pub struct FulfillmentConfig {
    pub metrics_port: u16,
    pub default_payment_method: String,
    pub order_number_start: u64,
    pub relay_max_attempts: u32,
    pub relay_interval: Duration,
    pub relay_batch_size: usize,
    /// Largest number of units one order line may expand into
    pub max_units_per_line: usize,
    /// Payment method name to tax rate
    pub tax_rates: Vec<(String, Decimal)>,
}

impl FulfillmentConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let tax_rates: String = try_load(&lookup, "FULFILLMENT_TAX_RATES", "cash=0.16,card=0.16")?;
        let relay_interval_ms: u64 = try_load(&lookup, "FULFILLMENT_RELAY_INTERVAL_MS", "500")?;

        let config = Self {
            metrics_port: try_load(&lookup, "FULFILLMENT_METRICS_PORT", "9090")?,
            default_payment_method: try_load(&lookup, "FULFILLMENT_DEFAULT_PAYMENT_METHOD", "cash")?,
            order_number_start: try_load(&lookup, "FULFILLMENT_ORDER_NUMBER_START", "1")?,
            relay_max_attempts: try_load(&lookup, "FULFILLMENT_RELAY_MAX_ATTEMPTS", "5")?,
            relay_interval: Duration::from_millis(relay_interval_ms),
            relay_batch_size: try_load(&lookup, "FULFILLMENT_RELAY_BATCH_SIZE", "100")?,
            max_units_per_line: try_load(&lookup, "FULFILLMENT_MAX_UNITS_PER_LINE", "500")?,
            tax_rates: parse_tax_rates(&tax_rates)?,
        };

        let default_method = config.default_payment_method.to_lowercase();
        if config.max_units_per_line == 0 {
            return Err(anyhow!("FULFILLMENT_MAX_UNITS_PER_LINE must be at least 1"));
        }

        if !config.tax_rates.iter().any(|(name, _)| *name == default_method) {
            return Err(anyhow!(
                "Default payment method {} has no tax rate configured",
                config.default_payment_method
            ));
        }

        Ok(config)
    }
}

fn try_load<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow!("Invalid {key} value {raw:?}: {e}")
    })
}

/// Parse `method=rate` pairs separated by commas, e.g. `cash=0.16,card=0.05`
pub fn parse_tax_rates(raw: &str) -> Result<Vec<(String, Decimal)>> {
    let mut rates = Vec::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, rate) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Tax rate entry {pair:?} is not name=rate"))?;

        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(anyhow!("Tax rate entry {pair:?} has no payment method"));
        }

        let rate: Decimal = rate
            .trim()
            .parse()
            .with_context(|| format!("Invalid tax rate for {name}"))?;
        if rate < Decimal::ZERO {
            return Err(anyhow!("Tax rate for {name} is negative"));
        }

        rates.push((name, rate));
    }

    if rates.is_empty() {
        return Err(anyhow!("No payment methods configured"));
    }

    Ok(rates)
}
