use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::catalog::{CatalogId, CatalogItem, CatalogLookup};
use super::errors::FulfillmentError;
use super::value_objects::{FulfillmentUnit, LineItem};

// ============================================================================
// Decomposition Engine
// ============================================================================
//
// Expands a purchased line into one parent unit plus, for deals, one
// component unit per physical dish. Components carry no price of their own
// and point back at the parent through `parent_unit_id`.
//
// ============================================================================

/// Units produced for a batch of lines, plus the components that could not be resolved
#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    pub units: Vec<FulfillmentUnit>,
    pub skipped_components: Vec<CatalogId>,
}

impl Decomposition {
    /// Sum of the new non-component units' price × quantity
    pub fn subtotal(&self) -> Decimal {
        self.units.iter().map(FulfillmentUnit::line_total).sum()
    }
}

/// Upper bound on the units a single line may expand into, parent included
pub const DEFAULT_MAX_UNITS_PER_LINE: usize = 500;

pub struct Decomposer<'a> {
    catalog: &'a dyn CatalogLookup,
    max_units_per_line: usize,
}

impl<'a> Decomposer<'a> {
    pub fn new(catalog: &'a dyn CatalogLookup) -> Self {
        Self {
            catalog,
            max_units_per_line: DEFAULT_MAX_UNITS_PER_LINE,
        }
    }

    pub fn with_max_units_per_line(mut self, max_units_per_line: usize) -> Self {
        self.max_units_per_line = max_units_per_line.max(1);
        self
    }

    /// Validate and decompose every line; fails as a whole on the first bad line
    pub fn decompose_lines(&self, lines: &[LineItem]) -> Result<Decomposition, FulfillmentError> {
        if lines.is_empty() {
            return Err(FulfillmentError::Validation("order lines cannot be empty".to_string()));
        }

        let mut result = Decomposition::default();
        for line in lines {
            let decomposed = self.decompose_line(line)?;
            result.units.extend(decomposed.units);
            result.skipped_components.extend(decomposed.skipped_components);
        }

        Ok(result)
    }

    pub fn decompose_line(&self, line: &LineItem) -> Result<Decomposition, FulfillmentError> {
        line.validate()?;

        let entry = self
            .catalog
            .get_catalog_entry(&line.catalog_id)
            .ok_or_else(|| FulfillmentError::CatalogEntryNotFound(line.catalog_id.to_string()))?;

        let parent = self.parent_unit(&entry, line)?;
        let parent_id = parent.unit_id;
        let mut result = Decomposition {
            units: vec![parent],
            skipped_components: Vec::new(),
        };

        // Size the expansion before building anything
        let mut expansions = Vec::with_capacity(entry.deal_components.len());
        let mut unit_count: usize = 1;
        for component in &entry.deal_components {
            let Some(component_entry) = self.catalog.get_catalog_entry(&component.component_catalog_id) else {
                tracing::warn!(
                    deal = %entry.id,
                    component = %component.component_catalog_id,
                    "Deal component missing from catalog, skipping"
                );
                result.skipped_components.push(component.component_catalog_id.clone());
                continue;
            };

            let count = component
                .quantity
                .max(0)
                .checked_mul(line.quantity)
                .and_then(|count| usize::try_from(count).ok())
                .ok_or_else(|| self.oversized(line))?;
            unit_count = unit_count.saturating_add(count);
            expansions.push((component_entry, count));
        }

        if unit_count > self.max_units_per_line {
            return Err(self.oversized(line));
        }

        for (component_entry, count) in &expansions {
            for _ in 0..*count {
                result.units.push(component_unit(component_entry, parent_id));
            }
        }

        tracing::debug!(
            catalog_id = %line.catalog_id,
            quantity = line.quantity,
            unit_count = result.units.len(),
            "Decomposed line"
        );

        Ok(result)
    }

    fn oversized(&self, line: &LineItem) -> FulfillmentError {
        FulfillmentError::Validation(format!(
            "{} x{} expands past {} units",
            line.catalog_id, line.quantity, self.max_units_per_line
        ))
    }

    fn parent_unit(&self, entry: &CatalogItem, line: &LineItem) -> Result<FulfillmentUnit, FulfillmentError> {
        let selected_variant = match &line.variant_id {
            Some(variant_id) => Some(entry.variant(variant_id).cloned().ok_or_else(|| {
                FulfillmentError::Validation(format!("{} has no variant {}", entry.id, variant_id))
            })?),
            None => None,
        };

        if let Some(addon) = line.selected_addons.iter().find(|a| !entry.accepts_addon(&a.addon_id)) {
            return Err(FulfillmentError::Validation(format!(
                "addon {} is not available for {}",
                addon.addon_id, entry.id
            )));
        }

        let base_price = selected_variant
            .as_ref()
            .map(|v| v.price)
            .unwrap_or(entry.base_price);
        let addon_price: Decimal = line
            .selected_addons
            .iter()
            .map(|a| a.price * Decimal::from(a.quantity))
            .sum();

        Ok(FulfillmentUnit {
            unit_id: Uuid::new_v4(),
            catalog_id: entry.id.clone(),
            name: entry.name.clone(),
            quantity: line.quantity,
            price: base_price + addon_price,
            base_price,
            station_id: entry.station_id.clone(),
            is_component: false,
            parent_unit_id: None,
            is_deal: entry.is_deal(),
            is_prepared: false,
            is_dispatched: false,
            prepared_at: None,
            dispatched_at: None,
            selected_addons: line.selected_addons.clone(),
            selected_variant,
            instructions: line.instructions.clone(),
        })
    }
}

fn component_unit(entry: &CatalogItem, parent_id: Uuid) -> FulfillmentUnit {
    FulfillmentUnit {
        unit_id: Uuid::new_v4(),
        catalog_id: entry.id.clone(),
        name: entry.name.clone(),
        quantity: 1,
        price: Decimal::ZERO,
        base_price: Decimal::ZERO,
        station_id: entry.station_id.clone(),
        is_component: true,
        parent_unit_id: Some(parent_id),
        is_deal: false,
        is_prepared: false,
        is_dispatched: false,
        prepared_at: None,
        dispatched_at: None,
        selected_addons: Vec::new(),
        selected_variant: None,
        instructions: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
