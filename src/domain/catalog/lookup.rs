use rust_decimal::Decimal;
use std::collections::HashMap;

use super::value_objects::{CatalogId, CatalogItem};

// ============================================================================
// External Lookups
// ============================================================================
//
// Menu and payment-method administration live outside this crate. The
// fulfillment engine only reads through these two traits.
//
// ============================================================================

/// Read-only resolver for menu items
pub trait CatalogLookup: Send + Sync {
    fn get_catalog_entry(&self, catalog_id: &CatalogId) -> Option<CatalogItem>;
}

/// Tax rate per payment method
pub trait TaxRateLookup: Send + Sync {
    fn get_tax_rate(&self, payment_method: &str) -> Option<Decimal>;
}

/// Catalog snapshot held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: HashMap<CatalogId, CatalogItem>,
}

impl InMemoryCatalog {
    pub fn new(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        Self {
            items: items.into_iter().map(|item| (item.id.clone(), item)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn get_catalog_entry(&self, catalog_id: &CatalogId) -> Option<CatalogItem> {
        self.items.get(catalog_id).cloned()
    }
}

/// Payment methods keyed by name, case-insensitive
#[derive(Debug, Clone, Default)]
pub struct PaymentMethodTable {
    rates: HashMap<String, Decimal>,
}

impl PaymentMethodTable {
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .map(|(name, rate)| (name.to_lowercase(), rate))
                .collect(),
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }
}

impl TaxRateLookup for PaymentMethodTable {
    fn get_tax_rate(&self, payment_method: &str) -> Option<Decimal> {
        self.rates.get(&payment_method.to_lowercase()).copied()
    }
}
