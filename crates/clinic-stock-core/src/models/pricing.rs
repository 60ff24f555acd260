//! Line pricing and visit totals.

use serde::{Deserialize, Serialize};

/// Discount applied to a priced line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Discount {
    /// Percentage of the undiscounted line cost
    Percentage(f64),
    /// Fixed amount off the line
    Amount(f64),
}

impl Discount {
    pub fn type_str(&self) -> &'static str {
        match self {
            Discount::Percentage(_) => "percentage",
            Discount::Amount(_) => "amount",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Discount::Percentage(v) | Discount::Amount(v) => *v,
        }
    }

    /// Rebuild from the stored (type, value) pair.
    pub fn from_parts(discount_type: Option<&str>, value: Option<f64>) -> Option<Self> {
        match (discount_type, value) {
            (Some("percentage"), Some(v)) => Some(Discount::Percentage(v)),
            (Some("amount"), Some(v)) => Some(Discount::Amount(v)),
            _ => None,
        }
    }

    /// Amount taken off a line whose undiscounted cost is `base`.
    pub fn amount_off(&self, base: f64) -> f64 {
        match self {
            Discount::Percentage(v) => base * v / 100.0,
            Discount::Amount(v) => *v,
        }
    }
}

/// Optional pricing attached to a transaction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    pub price_per_box: Option<f64>,
    pub discount: Option<Discount>,
}

impl Pricing {
    pub fn new(price_per_box: Option<f64>, discount: Option<Discount>) -> Self {
        Self {
            price_per_box,
            discount,
        }
    }

    /// `price × quantity − discount`; `None` when no price was recorded.
    pub fn line_total(&self, quantity_boxes: i64) -> Option<f64> {
        let price = self.price_per_box?;
        let base = price * quantity_boxes as f64;
        let off = self.discount.map(|d| d.amount_off(base)).unwrap_or(0.0);
        Some(base - off)
    }
}

/// Billing summary for one visit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitTotals {
    /// Sum of priced dispensed lines
    pub dispensed: f64,
    /// Sum of priced return and refund lines
    pub returned: f64,
    pub dispensed_boxes: i64,
    pub returned_boxes: i64,
}

impl VisitTotals {
    /// Amount owed after returns.
    pub fn net(&self) -> f64 {
        self.dispensed - self.returned
    }
}
