use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::value_objects::{Adjustment, DiscountType};

// ============================================================================
// Financial Adjustment Engine
// ============================================================================
//
// Every recomputation starts from one consistent snapshot and returns a
// complete new `OrderTotals`; callers swap it in as a whole.
//
// `original_total_amount` is the pre-discount baseline. Once set it is only
// moved by item changes, never by adjustments, so discounts never compound.
//
// ============================================================================

const MONEY_SCALE: u32 = 2;

/// Round a derived amount to cents
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn non_negative(amount: Decimal) -> Decimal {
    amount.max(Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub original_total_amount: Option<Decimal>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub is_complementary: bool,
    pub complementary_reason: Option<String>,
}

impl OrderTotals {
    pub fn new(subtotal: Decimal, tax_rate: Decimal) -> Self {
        let tax_amount = round_money(subtotal * tax_rate);
        Self {
            subtotal,
            tax_rate,
            tax_amount,
            total_amount: subtotal + tax_amount,
            original_total_amount: None,
            discount_type: None,
            discount_value: None,
            discount_amount: None,
            is_complementary: false,
            complementary_reason: None,
        }
    }

    fn gross(&self) -> Decimal {
        self.subtotal + self.tax_amount
    }

    fn discount_or_zero(&self) -> Decimal {
        self.discount_amount.unwrap_or(Decimal::ZERO)
    }

    /// Recompute after items were appended to a placed order
    pub fn with_added_units(&self, subtotal_delta: Decimal) -> Self {
        let mut next = self.with_subtotal(self.subtotal + subtotal_delta);
        next.original_total_amount = match self.original_total_amount {
            Some(original) => Some(original + (next.gross() - self.gross())),
            None => Some(next.total_amount),
        };
        next
    }

    /// Recompute after units were taken off the order
    pub fn with_removed_units(&self, subtotal_delta: Decimal) -> Self {
        let mut next = self.with_subtotal(self.subtotal - subtotal_delta);
        next.original_total_amount = self
            .original_total_amount
            .map(|original| non_negative(original - (self.gross() - next.gross())));
        next
    }

    fn with_subtotal(&self, subtotal: Decimal) -> Self {
        let tax_amount = round_money(subtotal * self.tax_rate);
        Self {
            subtotal,
            tax_amount,
            total_amount: non_negative(subtotal + tax_amount - self.discount_or_zero()),
            ..self.clone()
        }
    }

    /// Apply a discount or complementary. Last write wins.
    pub fn with_adjustment(&self, adjustment: &Adjustment) -> Self {
        let original = self.original_total_amount.unwrap_or(self.total_amount);

        match adjustment {
            Adjustment::Complementary { reason } => Self {
                total_amount: Decimal::ZERO,
                original_total_amount: Some(original),
                discount_type: None,
                discount_value: None,
                discount_amount: Some(original),
                is_complementary: true,
                complementary_reason: reason.clone(),
                ..self.clone()
            },
            Adjustment::Discount { discount_type, value } => {
                let discount_amount = match discount_type {
                    DiscountType::Percentage => round_money(original * *value / Decimal::ONE_HUNDRED),
                    DiscountType::Fixed => *value,
                };
                Self {
                    total_amount: non_negative(original - discount_amount),
                    original_total_amount: Some(original),
                    discount_type: Some(*discount_type),
                    discount_value: Some(*value),
                    discount_amount: Some(discount_amount),
                    is_complementary: false,
                    complementary_reason: None,
                    ..self.clone()
                }
            }
        }
    }

    /// Payment method changed; each method carries its own tax rate
    pub fn with_tax_rate(&self, tax_rate: Decimal) -> Self {
        let tax_amount = round_money(self.subtotal * tax_rate);
        Self {
            tax_rate,
            tax_amount,
            total_amount: non_negative(self.subtotal + tax_amount - self.discount_or_zero()),
            ..self.clone()
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
