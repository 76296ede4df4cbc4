use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Catalog Value Objects
// ============================================================================

/// Menu item identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogId(pub String);

impl CatalogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kitchen preparation queue identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationId(pub String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bundled item of a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealComponent {
    pub component_catalog_id: CatalogId,
    pub quantity: i32,
}

/// A priced alternative of a catalog item (e.g. "Large")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

/// Catalog entry, immutable per catalog version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogId,
    pub name: String,
    pub base_price: Decimal,
    /// `None` means no preparation step: the item goes straight to dispatch
    pub station_id: Option<StationId>,
    #[serde(default)]
    pub deal_components: Vec<DealComponent>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Addon ids that may be attached; empty accepts any addon
    #[serde(default)]
    pub addon_eligibility: Vec<String>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_price: Decimal) -> Self {
        Self {
            id: CatalogId::new(id),
            name: name.into(),
            base_price,
            station_id: None,
            deal_components: Vec::new(),
            variants: Vec::new(),
            addon_eligibility: Vec::new(),
        }
    }

    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(StationId::new(station_id));
        self
    }

    pub fn with_component(mut self, component_catalog_id: impl Into<String>, quantity: i32) -> Self {
        self.deal_components.push(DealComponent {
            component_catalog_id: CatalogId::new(component_catalog_id),
            quantity,
        });
        self
    }

    pub fn with_variant(mut self, id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        self.variants.push(Variant {
            id: id.into(),
            name: name.into(),
            price,
        });
        self
    }

    pub fn with_eligible_addon(mut self, addon_id: impl Into<String>) -> Self {
        self.addon_eligibility.push(addon_id.into());
        self
    }

    /// A deal container spawns component units and is never prepared itself
    pub fn is_deal(&self) -> bool {
        !self.deal_components.is_empty()
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn accepts_addon(&self, addon_id: &str) -> bool {
        self.addon_eligibility.is_empty() || self.addon_eligibility.iter().any(|a| a == addon_id)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
