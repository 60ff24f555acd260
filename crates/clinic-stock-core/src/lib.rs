//! Clinic Stock Core Library
//!
//! Medicine stock ledger for a clinic: inventory batches, simple and
//! predefined combination medicines, and the transactions that move stock.
//!
//! # Architecture
//!
//! ```text
//!   visit / direct request
//!             │
//!             ▼
//!   resolve target batches ◄── combination codec + newest batch by name
//!             │
//!             ▼
//!   lock batches (sorted) ──► BEGIN IMMEDIATE ──► re-resolve
//!                                                     │
//!                                    ┌────────────────┴────────────────┐
//!                                    ▼                                 ▼
//!                         stage + validate all            plan moved: rollback, retry
//!                                    │
//!                                    ▼
//!                   write stock + transaction + effects ──► COMMIT
//! ```
//!
//! Deleting a transaction, a visit or a patient runs the same cycle with the
//! inverse of every recorded effect.
//!
//! # Modules
//!
//! - [`codec`]: Combination text encoding and legacy fields
//! - [`models`]: Domain types (InventoryBatch, MedicineDefinition, StockTransaction, etc.)
//! - [`db`]: SQLite persistence
//! - [`ledger`]: Transaction engine, compensation and catalog maintenance
//! - [`config`]: Ledger configuration
//! - [`logging`]: Tracing bootstrap

pub mod codec;
pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use db::Database;
pub use ledger::{BatchLocks, BatchResolver, LatestBatchResolver, Ledger, LedgerError};
pub use models::{
    CombinationComponent, CombinationDescriptor, DosagePattern, InventoryBatch,
    MedicineDefinition, StockTransaction, TransactionType,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use ledger::{
    BatchOverview, BatchStock, CombinationInput, CompensationResult, DirectTransactionRequest,
    SkippedComponent, TransactionResult, VisitTransactionRequest,
};
use models::{
    BatchDetails, BatchEffect, BatchUpdate, Discount, ExpiryStatus, MedicineKind, NewBatch,
    Patient, Pricing, StockStatus, StockThresholds, TransactionFilter, TransactionKind, Visit,
    VisitTotals,
};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicStockError {
    #[error("Insufficient stock in batch {batch_id}: {available} available, {requested} requested")]
    InsufficientStock {
        batch_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Reversing {transaction_id} would leave batch {batch_id} at {available} with {required} to remove")]
    CompensationBlocked {
        transaction_id: String,
        batch_id: String,
        available: i64,
        required: i64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<db::DbError> for ClinicStockError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicStockError::NotFound(what),
            other => ClinicStockError::DatabaseError(other.to_string()),
        }
    }
}

impl From<LedgerError> for ClinicStockError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientStock {
                batch_id,
                available,
                requested,
            } => ClinicStockError::InsufficientStock {
                batch_id,
                available,
                requested,
            },
            LedgerError::CompensationBlocked {
                transaction_id,
                batch_id,
                available,
                required,
            } => ClinicStockError::CompensationBlocked {
                transaction_id,
                batch_id,
                available,
                required,
            },
            LedgerError::MedicineNotFound(_)
            | LedgerError::BatchNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::VisitNotFound(_)
            | LedgerError::PatientNotFound(_) => ClinicStockError::NotFound(e.to_string()),
            LedgerError::PatientMismatch { .. }
            | LedgerError::InvalidQuantity(_)
            | LedgerError::UnsupportedTransactionType(_)
            | LedgerError::InvalidCombination(_)
            | LedgerError::InvalidInput(_) => ClinicStockError::InvalidInput(e.to_string()),
            LedgerError::ResolutionChanged(_) => ClinicStockError::Conflict(e.to_string()),
            LedgerError::LockPoisoned => ClinicStockError::DatabaseError(e.to_string()),
            LedgerError::Database(db_err) => db_err.into(),
        }
    }
}

impl From<codec::ParseError> for ClinicStockError {
    fn from(e: codec::ParseError) -> Self {
        ClinicStockError::InvalidInput(e.to_string())
    }
}

impl From<anyhow::Error> for ClinicStockError {
    fn from(e: anyhow::Error) -> Self {
        ClinicStockError::ConfigError(format!("{:#}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicStockError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicStockError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicStockCore>, ClinicStockError> {
    let config = LedgerConfig {
        database_path: Some(path.into()),
        ..LedgerConfig::default()
    };
    ClinicStockCore::open(config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicStockCore>, ClinicStockError> {
    ClinicStockCore::open(LedgerConfig::default())
}

/// Open the database described by a JSON config file, with
/// `CLINIC_STOCK_*` environment overrides applied.
#[uniffi::export]
pub fn open_with_config_file(path: String) -> Result<Arc<ClinicStockCore>, ClinicStockError> {
    let config = LedgerConfig::from_file(&path)?.with_env_overrides()?;
    logging::init_tracing(&config.log_filter);
    ClinicStockCore::open(config)
}

/// Install the tracing subscriber. Returns `false` if one was already set.
///
/// Without an explicit filter, `CLINIC_STOCK_LOG` applies before the default.
#[uniffi::export]
pub fn init_logging(filter: Option<String>) -> bool {
    let filter = filter
        .or_else(|| std::env::var(config::ENV_LOG_FILTER).ok())
        .unwrap_or_else(config::default_log_filter);
    logging::init_tracing(&filter)
}

/// Parse combination text leniently into its components.
#[uniffi::export]
pub fn parse_combination_text(text: String) -> Vec<FfiCombinationComponent> {
    codec::parse(&text)
        .components
        .into_iter()
        .map(Into::into)
        .collect()
}

/// Render components as combination text.
#[uniffi::export]
pub fn format_combination_text(components: Vec<FfiCombinationComponent>) -> String {
    let descriptor =
        CombinationDescriptor::new(components.into_iter().map(Into::into).collect());
    codec::format(&descriptor)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe ledger wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicStockCore {
    db: Arc<Mutex<Database>>,
    locks: Arc<BatchLocks>,
    config: LedgerConfig,
}

impl ClinicStockCore {
    fn open(config: LedgerConfig) -> Result<Arc<Self>, ClinicStockError> {
        let db = Database::open_with_config(&config)?;
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            locks: Arc::new(BatchLocks::new()),
            config,
        }))
    }

    fn ledger<'a>(&'a self, db: &'a Database) -> Ledger<'a> {
        Ledger::new(db, &self.locks).max_resolution_retries(self.config.max_resolution_retries)
    }

    fn thresholds(&self) -> StockThresholds {
        self.config.thresholds()
    }
}

#[uniffi::export]
impl ClinicStockCore {
    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Receive a new batch. The simple medicine of the same name now draws
    /// from it.
    pub fn create_batch(&self, batch: FfiNewBatch) -> Result<FfiBatch, ClinicStockError> {
        let db = self.db.lock()?;
        let created = self.ledger(&db).create_batch(batch.into())?;
        Ok(created.into())
    }

    /// Edit batch metadata. Stock is not touched.
    pub fn update_batch_details(
        &self,
        batch_id: String,
        update: FfiBatchUpdate,
    ) -> Result<FfiBatch, ClinicStockError> {
        let db = self.db.lock()?;
        let updated = self
            .ledger(&db)
            .update_batch_details(&batch_id, &update.into())?;
        Ok(updated.into())
    }

    /// Delete a batch. Returns how many medicines were unbound from it.
    pub fn delete_batch(&self, batch_id: String) -> Result<u32, ClinicStockError> {
        let db = self.db.lock()?;
        let detached = self.ledger(&db).delete_batch(&batch_id)?;
        Ok(detached as u32)
    }

    pub fn get_batch(&self, batch_id: String) -> Result<FfiBatch, ClinicStockError> {
        let db = self.db.lock()?;
        Ok(self.ledger(&db).get_batch(&batch_id)?.into())
    }

    /// All batches, newest first.
    pub fn list_batches(&self) -> Result<Vec<FfiBatch>, ClinicStockError> {
        let db = self.db.lock()?;
        let batches = self.ledger(&db).list_batches()?;
        Ok(batches.into_iter().map(|b| b.into()).collect())
    }

    /// Batches below the configured low-stock threshold.
    pub fn list_low_stock_batches(&self) -> Result<Vec<FfiBatch>, ClinicStockError> {
        let db = self.db.lock()?;
        let batches = self.ledger(&db).list_low_stock_batches(&self.thresholds())?;
        Ok(batches.into_iter().map(|b| b.into()).collect())
    }

    /// Every batch with stock and expiry classification as of `today`
    /// (YYYY-MM-DD).
    pub fn batch_overview(&self, today: String) -> Result<Vec<FfiBatchOverview>, ClinicStockError> {
        let today = NaiveDate::parse_from_str(&today, "%Y-%m-%d")
            .map_err(|e| ClinicStockError::InvalidInput(format!("{}: {}", today, e)))?;
        let db = self.db.lock()?;
        let overview = self.ledger(&db).batch_overview(&self.thresholds(), today)?;
        Ok(overview.into_iter().map(|o| o.into()).collect())
    }

    /// Current on-hand boxes of a batch.
    pub fn get_stock(&self, batch_id: String) -> Result<i64, ClinicStockError> {
        let db = self.db.lock()?;
        Ok(self.ledger(&db).get_stock(&batch_id)?)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Record a stock movement against a single batch.
    pub fn record_direct_transaction(
        &self,
        request: FfiDirectTransactionRequest,
    ) -> Result<FfiTransactionResult, ClinicStockError> {
        let db = self.db.lock()?;
        let result = self
            .ledger(&db)
            .record_direct_transaction(&request.into())?;
        Ok(result.into())
    }

    /// Record a medicine dispensed, returned or refunded during a visit.
    pub fn record_visit_transaction(
        &self,
        request: FfiVisitTransactionRequest,
    ) -> Result<FfiTransactionResult, ClinicStockError> {
        let db = self.db.lock()?;
        let result = self.ledger(&db).record_visit_transaction(&request.into())?;
        Ok(result.into())
    }

    /// Delete a transaction and restore the stock it moved.
    pub fn delete_transaction(
        &self,
        transaction_id: String,
    ) -> Result<FfiCompensationResult, ClinicStockError> {
        let db = self.db.lock()?;
        let result = self.ledger(&db).delete_transaction(&transaction_id)?;
        Ok(result.into())
    }

    /// Delete a visit and its transactions, restoring stock.
    pub fn delete_visit_cascade(
        &self,
        visit_id: String,
    ) -> Result<FfiCompensationResult, ClinicStockError> {
        let db = self.db.lock()?;
        let result = self.ledger(&db).delete_visit_cascade(&visit_id)?;
        Ok(result.into())
    }

    /// Delete a patient with all visits and transactions, restoring stock.
    pub fn delete_patient_cascade(
        &self,
        patient_id: String,
    ) -> Result<FfiCompensationResult, ClinicStockError> {
        let db = self.db.lock()?;
        let result = self.ledger(&db).delete_patient_cascade(&patient_id)?;
        Ok(result.into())
    }

    /// Transactions matching a filter, newest first.
    pub fn list_transactions(
        &self,
        filter: FfiTransactionFilter,
    ) -> Result<Vec<FfiTransaction>, ClinicStockError> {
        let db = self.db.lock()?;
        let transactions = self.ledger(&db).list_transactions(&filter.into())?;
        Ok(transactions.into_iter().map(|t| t.into()).collect())
    }

    /// Billing totals for a visit.
    pub fn visit_totals(&self, visit_id: String) -> Result<FfiVisitTotals, ClinicStockError> {
        let db = self.db.lock()?;
        Ok(self.ledger(&db).visit_totals(&visit_id)?.into())
    }

    // =========================================================================
    // Medicine Definition Operations
    // =========================================================================

    /// Save a predefined combination.
    pub fn save_combination_definition(
        &self,
        name: String,
        components: Vec<FfiCombinationComponent>,
        tags: Vec<String>,
        description: Option<String>,
    ) -> Result<FfiMedicineDefinition, ClinicStockError> {
        let db = self.db.lock()?;
        let def = self.ledger(&db).save_combination_definition(CombinationInput {
            name,
            components: components.into_iter().map(Into::into).collect(),
            tags,
            description,
        })?;
        Ok(def.into())
    }

    /// Save a combination from text such as `"COBECWT (1+0+0) + COBECGT (0+0+1)"`.
    pub fn define_combination_from_text(
        &self,
        text: String,
        tags: Vec<String>,
        description: Option<String>,
    ) -> Result<FfiMedicineDefinition, ClinicStockError> {
        let db = self.db.lock()?;
        let def = self
            .ledger(&db)
            .define_combination_from_text(&text, tags, description)?;
        Ok(def.into())
    }

    pub fn update_combination_definition(
        &self,
        definition_id: String,
        name: String,
        components: Vec<FfiCombinationComponent>,
        tags: Vec<String>,
        description: Option<String>,
    ) -> Result<FfiMedicineDefinition, ClinicStockError> {
        let db = self.db.lock()?;
        let def = self.ledger(&db).update_combination_definition(
            &definition_id,
            CombinationInput {
                name,
                components: components.into_iter().map(Into::into).collect(),
                tags,
                description,
            },
        )?;
        Ok(def.into())
    }

    pub fn delete_medicine_definition(&self, definition_id: String) -> Result<(), ClinicStockError> {
        let db = self.db.lock()?;
        self.ledger(&db).delete_medicine_definition(&definition_id)?;
        Ok(())
    }

    pub fn get_medicine_definition(
        &self,
        definition_id: String,
    ) -> Result<FfiMedicineDefinition, ClinicStockError> {
        let db = self.db.lock()?;
        Ok(self.ledger(&db).get_medicine_definition(&definition_id)?.into())
    }

    /// Predefined combinations, by name.
    pub fn list_combinations(&self) -> Result<Vec<FfiMedicineDefinition>, ClinicStockError> {
        let db = self.db.lock()?;
        let defs = self.ledger(&db).list_combinations()?;
        Ok(defs.into_iter().map(|d| d.into()).collect())
    }

    /// Every medicine definition, by name.
    pub fn list_medicine_definitions(&self) -> Result<Vec<FfiMedicineDefinition>, ClinicStockError> {
        let db = self.db.lock()?;
        let defs = db.list_medicine_definitions()?;
        Ok(defs.into_iter().map(|d| d.into()).collect())
    }

    // =========================================================================
    // Patient / Visit Anchors
    // =========================================================================

    pub fn create_patient(&self, name: String) -> Result<FfiPatient, ClinicStockError> {
        let db = self.db.lock()?;
        let patient = Patient::new(name);
        db.insert_patient(&patient)?;
        Ok(patient.into())
    }

    /// Open a visit for a patient on `visit_date` (YYYY-MM-DD).
    pub fn create_visit(
        &self,
        patient_id: String,
        visit_date: String,
    ) -> Result<FfiVisit, ClinicStockError> {
        let db = self.db.lock()?;
        if db.get_patient(&patient_id)?.is_none() {
            return Err(ClinicStockError::NotFound(format!("Patient {}", patient_id)));
        }
        let visit = Visit::new(patient_id, visit_date);
        db.insert_visit(&visit)?;
        Ok(visit.into())
    }

    /// A patient's visits, newest first.
    pub fn list_visits(&self, patient_id: String) -> Result<Vec<FfiVisit>, ClinicStockError> {
        let db = self.db.lock()?;
        let visits = db.list_visits_for_patient(&patient_id)?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiTransactionType {
    Dispensed,
    Received,
    Return,
    Refund,
    Adjustment,
}

impl From<FfiTransactionType> for TransactionType {
    fn from(t: FfiTransactionType) -> Self {
        match t {
            FfiTransactionType::Dispensed => TransactionType::Dispensed,
            FfiTransactionType::Received => TransactionType::Received,
            FfiTransactionType::Return => TransactionType::Return,
            FfiTransactionType::Refund => TransactionType::Refund,
            FfiTransactionType::Adjustment => TransactionType::Adjustment,
        }
    }
}

impl From<TransactionType> for FfiTransactionType {
    fn from(t: TransactionType) -> Self {
        match t {
            TransactionType::Dispensed => FfiTransactionType::Dispensed,
            TransactionType::Received => FfiTransactionType::Received,
            TransactionType::Return => FfiTransactionType::Return,
            TransactionType::Refund => FfiTransactionType::Refund,
            TransactionType::Adjustment => FfiTransactionType::Adjustment,
        }
    }
}

/// FFI-safe batch metadata.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiBatchDetails {
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

impl From<FfiBatchDetails> for BatchDetails {
    fn from(d: FfiBatchDetails) -> Self {
        BatchDetails {
            description: d.description,
            price_in: d.price_in,
            price_out: d.price_out,
            manufacturing_date: d.manufacturing_date,
            expiry_date: d.expiry_date,
            batch_in_date: d.batch_in_date,
            expected_qty_cartons: d.expected_qty_cartons,
            expected_qty_boxes: d.expected_qty_boxes,
            received_qty_cartons: d.received_qty_cartons,
            registration_number: d.registration_number,
            warranty_received: d.warranty_received,
            warranty_receive_date: d.warranty_receive_date,
            bill_invoice_number: d.bill_invoice_number,
        }
    }
}

/// FFI-safe new batch.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewBatch {
    pub medicine_name: String,
    pub batch_number: String,
    pub received_qty_boxes: i64,
    pub details: FfiBatchDetails,
}

impl From<FfiNewBatch> for NewBatch {
    fn from(b: FfiNewBatch) -> Self {
        NewBatch {
            medicine_name: b.medicine_name,
            batch_number: b.batch_number,
            received_qty_boxes: b.received_qty_boxes,
            details: b.details.into(),
        }
    }
}

/// FFI-safe batch update.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatchUpdate {
    pub medicine_name: String,
    pub batch_number: String,
    pub received_qty_boxes: i64,
    pub details: FfiBatchDetails,
}

impl From<FfiBatchUpdate> for BatchUpdate {
    fn from(u: FfiBatchUpdate) -> Self {
        BatchUpdate {
            medicine_name: u.medicine_name,
            batch_number: u.batch_number,
            received_qty_boxes: u.received_qty_boxes,
            details: u.details.into(),
        }
    }
}

/// FFI-safe inventory batch.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatch {
    pub id: String,
    pub medicine_name: String,
    pub batch_number: String,
    pub received_qty_boxes: i64,
    pub on_hand_qty_boxes: i64,
    pub details: FfiBatchDetails,
    pub created_at: String,
}

impl From<InventoryBatch> for FfiBatch {
    fn from(b: InventoryBatch) -> Self {
        Self {
            id: b.id,
            medicine_name: b.medicine_name,
            batch_number: b.batch_number,
            received_qty_boxes: b.received_qty_boxes,
            on_hand_qty_boxes: b.on_hand_qty_boxes,
            details: FfiBatchDetails {
                description: b.description,
                price_in: b.price_in,
                price_out: b.price_out,
                manufacturing_date: b.manufacturing_date,
                expiry_date: b.expiry_date,
                batch_in_date: b.batch_in_date,
                expected_qty_cartons: b.expected_qty_cartons,
                expected_qty_boxes: b.expected_qty_boxes,
                received_qty_cartons: b.received_qty_cartons,
                registration_number: b.registration_number,
                warranty_received: b.warranty_received,
                warranty_receive_date: b.warranty_receive_date,
                bill_invoice_number: b.bill_invoice_number,
            },
            created_at: b.created_at,
        }
    }
}

/// FFI-safe stock classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiStockStatus {
    OutOfStock,
    Low,
    Medium,
    Good,
}

impl From<StockStatus> for FfiStockStatus {
    fn from(s: StockStatus) -> Self {
        match s {
            StockStatus::OutOfStock => FfiStockStatus::OutOfStock,
            StockStatus::Low => FfiStockStatus::Low,
            StockStatus::Medium => FfiStockStatus::Medium,
            StockStatus::Good => FfiStockStatus::Good,
        }
    }
}

/// FFI-safe expiry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiExpiryStatus {
    Expired,
    ExpiringSoon,
    ExpiringWithinNotice,
    Fine,
    Unknown,
}

impl From<ExpiryStatus> for FfiExpiryStatus {
    fn from(s: ExpiryStatus) -> Self {
        match s {
            ExpiryStatus::Expired => FfiExpiryStatus::Expired,
            ExpiryStatus::ExpiringSoon => FfiExpiryStatus::ExpiringSoon,
            ExpiryStatus::ExpiringWithinNotice => FfiExpiryStatus::ExpiringWithinNotice,
            ExpiryStatus::Fine => FfiExpiryStatus::Fine,
            ExpiryStatus::Unknown => FfiExpiryStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatchOverview {
    pub batch: FfiBatch,
    pub stock_status: FfiStockStatus,
    pub expiry_status: FfiExpiryStatus,
}

impl From<BatchOverview> for FfiBatchOverview {
    fn from(o: BatchOverview) -> Self {
        Self {
            batch: o.batch.into(),
            stock_status: o.stock_status.into(),
            expiry_status: o.expiry_status.into(),
        }
    }
}

/// FFI-safe combination component.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FfiCombinationComponent {
    pub base_medicine_name: String,
    pub morning: u32,
    pub afternoon: u32,
    pub night: u32,
}

impl From<CombinationComponent> for FfiCombinationComponent {
    fn from(c: CombinationComponent) -> Self {
        Self {
            base_medicine_name: c.base_medicine_name,
            morning: c.dosage.morning,
            afternoon: c.dosage.afternoon,
            night: c.dosage.night,
        }
    }
}

impl From<FfiCombinationComponent> for CombinationComponent {
    fn from(c: FfiCombinationComponent) -> Self {
        CombinationComponent::new(
            c.base_medicine_name,
            DosagePattern::new(c.morning, c.afternoon, c.night),
        )
    }
}

/// FFI-safe medicine definition.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicineDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_combination: bool,
    /// Bound batch of a simple medicine
    pub inventory_batch_id: Option<String>,
    pub components: Vec<FfiCombinationComponent>,
    /// Text form of the components, for combinations
    pub combination_text: Option<String>,
    pub created_at: String,
}

impl From<MedicineDefinition> for FfiMedicineDefinition {
    fn from(def: MedicineDefinition) -> Self {
        let inventory_batch_id = def.inventory_batch_id().map(str::to_string);
        let (components, combination_text) = match def.kind {
            MedicineKind::Combination { components } => {
                let text = codec::format(&components);
                (
                    components.components.into_iter().map(Into::into).collect(),
                    Some(text),
                )
            }
            MedicineKind::Simple { .. } => (Vec::new(), None),
        };
        Self {
            id: def.id,
            name: def.name,
            description: def.description,
            tags: def.tags,
            is_combination: combination_text.is_some(),
            inventory_batch_id,
            components,
            combination_text,
            created_at: def.created_at,
        }
    }
}

/// FFI-safe discount.
#[derive(Debug, Clone, Copy, PartialEq, uniffi::Enum)]
pub enum FfiDiscount {
    Percentage { value: f64 },
    Amount { value: f64 },
}

impl From<FfiDiscount> for Discount {
    fn from(d: FfiDiscount) -> Self {
        match d {
            FfiDiscount::Percentage { value } => Discount::Percentage(value),
            FfiDiscount::Amount { value } => Discount::Amount(value),
        }
    }
}

impl From<Discount> for FfiDiscount {
    fn from(d: Discount) -> Self {
        match d {
            Discount::Percentage(value) => FfiDiscount::Percentage { value },
            Discount::Amount(value) => FfiDiscount::Amount { value },
        }
    }
}

/// FFI-safe visit transaction request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitTransactionRequest {
    pub medicine_definition_id: String,
    pub patient_id: String,
    pub visit_id: String,
    pub transaction_type: FfiTransactionType,
    pub quantity_boxes: i64,
    pub price_per_box: Option<f64>,
    pub discount: Option<FfiDiscount>,
    pub payment_method: Option<String>,
    pub reason: Option<String>,
}

impl From<FfiVisitTransactionRequest> for VisitTransactionRequest {
    fn from(r: FfiVisitTransactionRequest) -> Self {
        VisitTransactionRequest {
            medicine_definition_id: r.medicine_definition_id,
            patient_id: r.patient_id,
            visit_id: r.visit_id,
            transaction_type: r.transaction_type.into(),
            quantity_boxes: r.quantity_boxes,
            pricing: Pricing::new(r.price_per_box, r.discount.map(Into::into)),
            payment_method: r.payment_method,
            reason: r.reason,
        }
    }
}

/// FFI-safe direct transaction request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDirectTransactionRequest {
    pub inventory_batch_id: String,
    pub transaction_type: FfiTransactionType,
    pub quantity_boxes: i64,
    pub notes: Option<String>,
    pub patient_id: Option<String>,
}

impl From<FfiDirectTransactionRequest> for DirectTransactionRequest {
    fn from(r: FfiDirectTransactionRequest) -> Self {
        DirectTransactionRequest {
            inventory_batch_id: r.inventory_batch_id,
            transaction_type: r.transaction_type.into(),
            quantity_boxes: r.quantity_boxes,
            notes: r.notes,
            patient_id: r.patient_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FfiBatchStock {
    pub batch_id: String,
    pub on_hand_qty_boxes: i64,
}

impl From<BatchStock> for FfiBatchStock {
    fn from(s: BatchStock) -> Self {
        Self {
            batch_id: s.batch_id,
            on_hand_qty_boxes: s.on_hand_qty_boxes,
        }
    }
}

/// Combination component that had no batch to draw from.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FfiSkippedComponent {
    pub medicine_name: String,
    pub suggestion: Option<String>,
}

impl From<SkippedComponent> for FfiSkippedComponent {
    fn from(s: SkippedComponent) -> Self {
        Self {
            medicine_name: s.medicine_name,
            suggestion: s.suggestion,
        }
    }
}

/// FFI-safe transaction result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTransactionResult {
    pub transaction_id: String,
    pub batches: Vec<FfiBatchStock>,
    pub skipped: Vec<FfiSkippedComponent>,
}

impl From<TransactionResult> for FfiTransactionResult {
    fn from(r: TransactionResult) -> Self {
        Self {
            transaction_id: r.transaction_id,
            batches: r.batches.into_iter().map(Into::into).collect(),
            skipped: r.skipped.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FfiBatchEffect {
    pub batch_id: String,
    pub delta: i64,
}

impl From<BatchEffect> for FfiBatchEffect {
    fn from(e: BatchEffect) -> Self {
        Self {
            batch_id: e.batch_id,
            delta: e.delta,
        }
    }
}

/// FFI-safe stock transaction.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTransaction {
    pub id: String,
    /// Set for direct transactions
    pub inventory_batch_id: Option<String>,
    /// Set for visit transactions
    pub medicine_definition_id: Option<String>,
    pub visit_id: Option<String>,
    pub patient_id: Option<String>,
    pub transaction_type: FfiTransactionType,
    pub quantity_boxes: i64,
    pub price_per_box: Option<f64>,
    pub discount: Option<FfiDiscount>,
    pub line_total: Option<f64>,
    pub payment_method: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub transaction_date: String,
    pub effects: Option<Vec<FfiBatchEffect>>,
}

impl From<StockTransaction> for FfiTransaction {
    fn from(tx: StockTransaction) -> Self {
        let line_total = tx.line_total();
        let (inventory_batch_id, medicine_definition_id, visit_id) = match tx.kind {
            TransactionKind::DirectAdjustment { inventory_batch_id } => {
                (Some(inventory_batch_id), None, None)
            }
            TransactionKind::PatientVisit {
                medicine_definition_id,
                visit_id,
            } => (None, Some(medicine_definition_id), Some(visit_id)),
        };
        Self {
            id: tx.id,
            inventory_batch_id,
            medicine_definition_id,
            visit_id,
            patient_id: tx.patient_id,
            transaction_type: tx.transaction_type.into(),
            quantity_boxes: tx.quantity_boxes,
            price_per_box: tx.pricing.price_per_box,
            discount: tx.pricing.discount.map(Into::into),
            line_total,
            payment_method: tx.payment_method,
            reason: tx.reason,
            notes: tx.notes,
            transaction_date: tx.transaction_date,
            effects: tx
                .effects
                .map(|effects| effects.into_iter().map(Into::into).collect()),
        }
    }
}

/// FFI-safe transaction listing filter.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum FfiTransactionFilter {
    Batch { batch_id: String },
    MedicineDefinition { medicine_definition_id: String },
    Visit { visit_id: String },
    Patient { patient_id: String },
}

impl From<FfiTransactionFilter> for TransactionFilter {
    fn from(f: FfiTransactionFilter) -> Self {
        match f {
            FfiTransactionFilter::Batch { batch_id } => TransactionFilter::Batch(batch_id),
            FfiTransactionFilter::MedicineDefinition {
                medicine_definition_id,
            } => TransactionFilter::MedicineDefinition(medicine_definition_id),
            FfiTransactionFilter::Visit { visit_id } => TransactionFilter::Visit(visit_id),
            FfiTransactionFilter::Patient { patient_id } => TransactionFilter::Patient(patient_id),
        }
    }
}

/// FFI-safe compensation result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCompensationResult {
    pub removed_transactions: Vec<String>,
    pub removed_visits: Vec<String>,
    pub removed_patient: Option<String>,
    pub batches: Vec<FfiBatchStock>,
    pub missing_batches: Vec<String>,
}

impl From<CompensationResult> for FfiCompensationResult {
    fn from(r: CompensationResult) -> Self {
        Self {
            removed_transactions: r.removed_transactions,
            removed_visits: r.removed_visits,
            removed_patient: r.removed_patient,
            batches: r.batches.into_iter().map(Into::into).collect(),
            missing_batches: r.missing_batches,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitTotals {
    pub dispensed: f64,
    pub returned: f64,
    pub net: f64,
    pub dispensed_boxes: i64,
    pub returned_boxes: i64,
}

impl From<VisitTotals> for FfiVisitTotals {
    fn from(t: VisitTotals) -> Self {
        Self {
            dispensed: t.dispensed,
            returned: t.returned,
            net: t.net(),
            dispensed_boxes: t.dispensed_boxes,
            returned_boxes: t.returned_boxes,
        }
    }
}

/// FFI-safe patient anchor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub notes: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            name: p.name,
            notes: p.notes,
        }
    }
}

/// FFI-safe visit anchor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: String,
    pub patient_id: String,
    pub visit_date: String,
    pub notes: Option<String>,
}

impl From<Visit> for FfiVisit {
    fn from(v: Visit) -> Self {
        Self {
            id: v.id,
            patient_id: v.patient_id,
            visit_date: v.visit_date,
            notes: v.notes,
        }
    }
}
