use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::catalog::{CatalogId, StationId, Variant};
use super::errors::FulfillmentError;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Preparing,
    PartialReady,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// No further mutation is accepted once terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::PartialReady => "Partial Ready",
            OrderStatus::Ready => "Ready",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// Addon chosen by the customer, priced at order time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAddon {
    pub addon_id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

/// One independently trackable item within an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentUnit {
    pub unit_id: Uuid,
    pub catalog_id: CatalogId,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub base_price: Decimal,
    pub station_id: Option<StationId>,
    pub is_component: bool,
    /// Set only on component units; resolved through the unit arena
    pub parent_unit_id: Option<Uuid>,
    /// Parent unit of a deal; never prepared or dispatched itself
    pub is_deal: bool,
    pub is_prepared: bool,
    pub is_dispatched: bool,
    pub prepared_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub selected_addons: Vec<SelectedAddon>,
    pub selected_variant: Option<Variant>,
    pub instructions: Option<String>,
}

impl FulfillmentUnit {
    /// Anything that is tracked for dispatch, i.e. not a deal container
    pub fn is_physical(&self) -> bool {
        self.is_component || !self.is_deal
    }

    pub fn needs_preparation(&self) -> bool {
        self.station_id.is_some()
    }

    /// Stationless units count as prepared
    pub fn is_ready_for_dispatch(&self) -> bool {
        self.is_physical() && (!self.needs_preparation() || self.is_prepared)
    }

    /// Contribution to the order subtotal; components are bundled into the parent
    pub fn line_total(&self) -> Decimal {
        if self.is_component {
            Decimal::ZERO
        } else {
            self.price * Decimal::from(self.quantity)
        }
    }
}

/// A purchased cart line as submitted by the kiosk or cashier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub catalog_id: CatalogId,
    pub quantity: i32,
    #[serde(default)]
    pub selected_addons: Vec<SelectedAddon>,
    pub variant_id: Option<String>,
    pub instructions: Option<String>,
}

impl LineItem {
    pub fn new(catalog_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            catalog_id: CatalogId::new(catalog_id),
            quantity,
            selected_addons: Vec::new(),
            variant_id: None,
            instructions: None,
        }
    }

    pub fn with_addon(mut self, addon_id: impl Into<String>, price: Decimal, quantity: i32) -> Self {
        let addon_id = addon_id.into();
        self.selected_addons.push(SelectedAddon {
            name: addon_id.clone(),
            addon_id,
            price,
            quantity,
        });
        self
    }

    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Input validation, run before decomposition
    pub fn validate(&self) -> Result<(), FulfillmentError> {
        if self.quantity <= 0 {
            return Err(FulfillmentError::InvalidQuantity(self.quantity));
        }

        for addon in &self.selected_addons {
            if addon.quantity <= 0 {
                return Err(FulfillmentError::Validation(format!(
                    "addon {} has quantity {}",
                    addon.addon_id, addon.quantity
                )));
            }
            if addon.price < Decimal::ZERO {
                return Err(FulfillmentError::Validation(format!(
                    "addon {} has a negative price",
                    addon.addon_id
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Validated order adjustment; discount and complementary exclude each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Adjustment {
    Discount { discount_type: DiscountType, value: Decimal },
    Complementary { reason: Option<String> },
}

/// Raw adjustment input from the cashier terminal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    #[serde(default)]
    pub is_complementary: bool,
    pub reason: Option<String>,
}

impl AdjustmentRequest {
    pub fn percentage(value: Decimal) -> Self {
        Self {
            discount_type: Some(DiscountType::Percentage),
            discount_value: Some(value),
            ..Self::default()
        }
    }

    pub fn fixed(value: Decimal) -> Self {
        Self {
            discount_type: Some(DiscountType::Fixed),
            discount_value: Some(value),
            ..Self::default()
        }
    }

    pub fn complementary(reason: impl Into<String>) -> Self {
        Self {
            is_complementary: true,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

impl TryFrom<AdjustmentRequest> for Adjustment {
    type Error = FulfillmentError;

    fn try_from(request: AdjustmentRequest) -> Result<Self, Self::Error> {
        let has_discount = request.discount_type.is_some() || request.discount_value.is_some();

        match (request.is_complementary, has_discount) {
            (true, true) => Err(FulfillmentError::InvalidAdjustment(
                "discount and complementary are mutually exclusive".to_string(),
            )),
            (true, false) => Ok(Adjustment::Complementary { reason: request.reason }),
            (false, false) => Err(FulfillmentError::InvalidAdjustment(
                "no discount or complementary given".to_string(),
            )),
            (false, true) => {
                let discount_type = request.discount_type.ok_or_else(|| {
                    FulfillmentError::InvalidAdjustment("discount value without a type".to_string())
                })?;
                let value = request.discount_value.ok_or_else(|| {
                    FulfillmentError::InvalidAdjustment("discount type without a value".to_string())
                })?;
                if value <= Decimal::ZERO {
                    return Err(FulfillmentError::InvalidAdjustment(format!(
                        "discount value must be positive, got {}",
                        value
                    )));
                }
                Ok(Adjustment::Discount { discount_type, value })
            }
        }
    }
}

/// New order from a cart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<LineItem>,
    /// Falls back to the configured default method
    pub payment_method: Option<String>,
}

// ============================================================================
// Unit Tests
// ============================================================================
