//! Inventory batch models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One received shipment of a single base medicine.
///
/// `on_hand_qty_boxes` is only ever written by the ledger; every other field
/// is descriptive metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryBatch {
    /// Unique batch ID
    pub id: String,
    /// Base medicine name (e.g., "COBECWT")
    pub medicine_name: String,
    /// Free-text description
    pub description: Option<String>,
    /// Supplier batch number
    pub batch_number: String,
    /// Purchase price per box
    pub price_in: Option<f64>,
    /// Sale price per box
    pub price_out: Option<f64>,
    /// Manufacturing date (YYYY-MM-DD)
    pub manufacturing_date: Option<String>,
    /// Expiry date (YYYY-MM-DD)
    pub expiry_date: Option<String>,
    /// Date the batch arrived at the clinic
    pub batch_in_date: Option<String>,
    pub expected_qty_cartons: i64,
    pub expected_qty_boxes: i64,
    pub received_qty_cartons: i64,
    pub received_qty_boxes: i64,
    /// Current boxes on hand
    pub on_hand_qty_boxes: i64,
    /// Drug regulatory registration number
    pub registration_number: Option<String>,
    pub warranty_received: bool,
    pub warranty_receive_date: Option<String>,
    pub bill_invoice_number: Option<String>,
    /// Creation timestamp; newest batch per medicine name wins resolution
    pub created_at: String,
}

/// Fields supplied when a new batch is received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewBatch {
    pub medicine_name: String,
    pub batch_number: String,
    pub received_qty_boxes: i64,
    pub details: BatchDetails,
}

/// Descriptive batch metadata (everything except identity and stock).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BatchDetails {
    pub description: Option<String>,
    pub price_in: Option<f64>,
    pub price_out: Option<f64>,
    pub manufacturing_date: Option<String>,
    pub expiry_date: Option<String>,
    pub batch_in_date: Option<String>,
    pub expected_qty_cartons: i64,
    pub expected_qty_boxes: i64,
    pub received_qty_cartons: i64,
    pub registration_number: Option<String>,
    pub warranty_received: bool,
    pub warranty_receive_date: Option<String>,
    pub bill_invoice_number: Option<String>,
}

/// Editable batch fields for an administrative update.
///
/// There is no stock field: on-hand quantity only moves through
/// transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BatchUpdate {
    pub medicine_name: String,
    pub batch_number: String,
    pub received_qty_boxes: i64,
    pub details: BatchDetails,
}

impl NewBatch {
    /// Create a batch request with required fields.
    pub fn new(medicine_name: impl Into<String>, batch_number: impl Into<String>, received_qty_boxes: i64) -> Self {
        Self {
            medicine_name: medicine_name.into(),
            batch_number: batch_number.into(),
            received_qty_boxes,
            details: BatchDetails::default(),
        }
    }

    /// Materialize the batch record. On-hand stock starts at the received count.
    pub fn into_batch(self) -> InventoryBatch {
        InventoryBatch {
            id: uuid::Uuid::new_v4().to_string(),
            medicine_name: self.medicine_name,
            description: self.details.description,
            batch_number: self.batch_number,
            price_in: self.details.price_in,
            price_out: self.details.price_out,
            manufacturing_date: self.details.manufacturing_date,
            expiry_date: self.details.expiry_date,
            batch_in_date: self.details.batch_in_date,
            expected_qty_cartons: self.details.expected_qty_cartons,
            expected_qty_boxes: self.details.expected_qty_boxes,
            received_qty_cartons: self.details.received_qty_cartons,
            received_qty_boxes: self.received_qty_boxes,
            on_hand_qty_boxes: self.received_qty_boxes,
            registration_number: self.details.registration_number,
            warranty_received: self.details.warranty_received,
            warranty_receive_date: self.details.warranty_receive_date,
            bill_invoice_number: self.details.bill_invoice_number,
            created_at: timestamp_now(),
        }
    }
}

/// Stock level classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StockStatus {
    OutOfStock,
    Low,
    Medium,
    Good,
}

/// Expiry classification relative to a reference date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExpiryStatus {
    Expired,
    /// Inside the warning window
    ExpiringSoon,
    /// Inside the wider notice window
    ExpiringWithinNotice,
    Fine,
    /// No parseable expiry date recorded
    Unknown,
}

/// Thresholds for stock and expiry classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockThresholds {
    /// Below this many boxes is low
    pub low: i64,
    /// Below this many boxes is medium
    pub medium: i64,
    /// Days before expiry that count as expiring soon
    pub expiry_warning_days: i64,
    /// Days before expiry that count as within notice
    pub expiry_notice_days: i64,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            low: 10,
            medium: 50,
            expiry_warning_days: 30,
            expiry_notice_days: 90,
        }
    }
}

impl InventoryBatch {
    /// Classify the current on-hand quantity.
    pub fn stock_status(&self, thresholds: &StockThresholds) -> StockStatus {
        match self.on_hand_qty_boxes {
            q if q <= 0 => StockStatus::OutOfStock,
            q if q < thresholds.low => StockStatus::Low,
            q if q < thresholds.medium => StockStatus::Medium,
            _ => StockStatus::Good,
        }
    }

    /// Classify the expiry date relative to `today`.
    pub fn expiry_status(&self, today: NaiveDate, thresholds: &StockThresholds) -> ExpiryStatus {
        let Some(expiry) = self.expiry_date.as_deref().and_then(parse_date) else {
            return ExpiryStatus::Unknown;
        };
        let days_left = (expiry - today).num_days();
        if days_left < 0 {
            ExpiryStatus::Expired
        } else if days_left <= thresholds.expiry_warning_days {
            ExpiryStatus::ExpiringSoon
        } else if days_left <= thresholds.expiry_notice_days {
            ExpiryStatus::ExpiringWithinNotice
        } else {
            ExpiryStatus::Fine
        }
    }
}

/// Parse a `YYYY-MM-DD` date, tolerating a trailing time component.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Current time as a fixed-width RFC 3339 string.
///
/// Microsecond precision with a `Z` suffix keeps lexicographic order equal to
/// chronological order, which the newest-batch lookup relies on.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
