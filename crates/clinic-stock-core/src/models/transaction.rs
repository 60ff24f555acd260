//! Stock transaction models.

use serde::{Deserialize, Serialize};

use super::pricing::Pricing;

/// What a stock transaction does to a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    /// Stock leaves the clinic
    Dispensed,
    /// New stock arrives (direct adjustments only)
    Received,
    /// Patient hands medicine back
    Return,
    /// Medicine returned against a refund
    Refund,
    /// Stock correction; the quantity may carry its own sign
    Adjustment,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Dispensed,
        TransactionType::Received,
        TransactionType::Return,
        TransactionType::Refund,
        TransactionType::Adjustment,
    ];

    /// Signed change to on-hand stock for a quantity of boxes.
    ///
    /// Only dispensing debits stock. Every other type credits the quantity as
    /// given, so a pre-signed adjustment quantity passes through unchanged.
    /// `None` when the debit does not fit in an `i64`.
    pub fn stock_delta(self, quantity_boxes: i64) -> Option<i64> {
        match self {
            TransactionType::Dispensed => quantity_boxes.checked_neg(),
            TransactionType::Received
            | TransactionType::Return
            | TransactionType::Refund
            | TransactionType::Adjustment => Some(quantity_boxes),
        }
    }

    /// Whether this type may be recorded against a patient visit.
    pub fn allowed_on_visit(self) -> bool {
        matches!(
            self,
            TransactionType::Dispensed | TransactionType::Return | TransactionType::Refund
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Dispensed => "dispensed",
            TransactionType::Received => "received",
            TransactionType::Return => "return",
            TransactionType::Refund => "refund",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// The two physical shapes of a stock transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionKind {
    /// Correction or walk-in movement against one batch.
    DirectAdjustment { inventory_batch_id: String },
    /// Medicine prescribed, returned or refunded during a visit.
    PatientVisit {
        medicine_definition_id: String,
        visit_id: String,
    },
}

/// Stock change applied to one batch by a committed transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchEffect {
    pub batch_id: String,
    /// Signed change applied to `on_hand_qty_boxes`
    pub delta: i64,
}

/// A committed stock transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockTransaction {
    /// Unique transaction ID
    pub id: String,
    pub kind: TransactionKind,
    pub patient_id: Option<String>,
    pub transaction_type: TransactionType,
    /// Quantity as requested; magnitude for visit transactions
    pub quantity_boxes: i64,
    pub pricing: Pricing,
    pub payment_method: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Commit timestamp (RFC 3339)
    pub transaction_date: String,
    /// Per-batch deltas applied at commit; `None` for imported records
    /// that predate effect tracking
    pub effects: Option<Vec<BatchEffect>>,
}

impl StockTransaction {
    pub fn visit_id(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::PatientVisit { visit_id, .. } => Some(visit_id),
            TransactionKind::DirectAdjustment { .. } => None,
        }
    }

    pub fn medicine_definition_id(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::PatientVisit {
                medicine_definition_id,
                ..
            } => Some(medicine_definition_id),
            TransactionKind::DirectAdjustment { .. } => None,
        }
    }

    /// Signed delta this transaction applies to each affected batch.
    pub fn stock_delta(&self) -> Option<i64> {
        self.transaction_type.stock_delta(self.quantity_boxes)
    }

    /// Billed amount for this line, if priced.
    pub fn line_total(&self) -> Option<f64> {
        self.pricing.line_total(self.quantity_boxes)
    }
}

/// Selector for transaction listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionFilter {
    /// Every transaction that touched the batch, direct or via a visit
    Batch(String),
    MedicineDefinition(String),
    Visit(String),
    Patient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_delta_signs() {
        assert_eq!(TransactionType::Dispensed.stock_delta(5), Some(-5));
        assert_eq!(TransactionType::Return.stock_delta(5), Some(5));
        assert_eq!(TransactionType::Refund.stock_delta(5), Some(5));
        assert_eq!(TransactionType::Received.stock_delta(5), Some(5));
        assert_eq!(TransactionType::Adjustment.stock_delta(-3), Some(-3));
        assert_eq!(TransactionType::Dispensed.stock_delta(i64::MIN), None);
    }

    #[test]
    fn test_type_string_round_trip() {
        for t in TransactionType::ALL {
            assert_eq!(TransactionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TransactionType::parse("sold"), None);
    }

    #[test]
    fn test_visit_types() {
        assert!(TransactionType::Dispensed.allowed_on_visit());
        assert!(TransactionType::Refund.allowed_on_visit());
        assert!(!TransactionType::Received.allowed_on_visit());
        assert!(!TransactionType::Adjustment.allowed_on_visit());
    }
}
