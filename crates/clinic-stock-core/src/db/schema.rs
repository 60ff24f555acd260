//! SQLite schema definition.

/// Complete database schema for the clinic stock ledger.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Inventory Batches
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_batches (
    id TEXT PRIMARY KEY,
    medicine_name TEXT NOT NULL,
    description TEXT,
    batch_number TEXT NOT NULL,
    price_in REAL,
    price_out REAL,
    manufacturing_date TEXT,
    expiry_date TEXT,
    batch_in_date TEXT,
    expected_qty_cartons INTEGER NOT NULL DEFAULT 0,
    expected_qty_boxes INTEGER NOT NULL DEFAULT 0,
    received_qty_cartons INTEGER NOT NULL DEFAULT 0,
    received_qty_boxes INTEGER NOT NULL DEFAULT 0,
    on_hand_qty_boxes INTEGER NOT NULL DEFAULT 0 CHECK (on_hand_qty_boxes >= 0),
    registration_number TEXT,
    warranty_received INTEGER NOT NULL DEFAULT 0,
    warranty_receive_date TEXT,
    bill_invoice_number TEXT,
    created_at TEXT NOT NULL
);

-- Newest batch per medicine name
CREATE INDEX IF NOT EXISTS idx_batches_name_created
    ON inventory_batches(medicine_name, created_at);

-- ============================================================================
-- Medicine Definitions
-- ============================================================================

CREATE TABLE IF NOT EXISTS medicine_definitions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    kind TEXT NOT NULL CHECK (kind IN ('simple', 'combination')),
    inventory_batch_id TEXT REFERENCES inventory_batches(id),
    components TEXT NOT NULL DEFAULT '[]',        -- JSON array of {base_medicine_name, dosage}
    medicines_included TEXT,                      -- JSON array of names (derived)
    medicine_dosages TEXT,                        -- JSON object name -> "m+a+n" (derived)
    dosage_pattern TEXT,                          -- "(m+a+n)" of first component (derived)
    tags TEXT NOT NULL DEFAULT '[]',              -- JSON array of strings
    created_at TEXT NOT NULL,
    CHECK (kind = 'simple' OR inventory_batch_id IS NULL)
);

CREATE INDEX IF NOT EXISTS idx_definitions_name ON medicine_definitions(name);
CREATE INDEX IF NOT EXISTS idx_definitions_batch ON medicine_definitions(inventory_batch_id);

-- ============================================================================
-- Patients and Visits (anchors for visit transactions)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS visits (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    visit_date TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id);

-- ============================================================================
-- Stock Transactions
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_transactions (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('direct', 'visit')),
    inventory_batch_id TEXT,                      -- direct adjustments
    medicine_definition_id TEXT,                  -- visit transactions
    visit_id TEXT REFERENCES visits(id),
    patient_id TEXT REFERENCES patients(id),
    transaction_type TEXT NOT NULL,
    quantity_boxes INTEGER NOT NULL,
    price_per_box REAL,
    discount_type TEXT,
    discount_value REAL,
    payment_method TEXT,
    reason TEXT,
    notes TEXT,
    transaction_date TEXT NOT NULL,
    effects_recorded INTEGER NOT NULL DEFAULT 0,  -- 0 for imported rows
    CHECK (
        (kind = 'direct' AND inventory_batch_id IS NOT NULL)
        OR (kind = 'visit' AND medicine_definition_id IS NOT NULL AND visit_id IS NOT NULL)
    )
);

CREATE INDEX IF NOT EXISTS idx_transactions_batch ON stock_transactions(inventory_batch_id);
CREATE INDEX IF NOT EXISTS idx_transactions_definition ON stock_transactions(medicine_definition_id);
CREATE INDEX IF NOT EXISTS idx_transactions_visit ON stock_transactions(visit_id);
CREATE INDEX IF NOT EXISTS idx_transactions_patient ON stock_transactions(patient_id);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON stock_transactions(transaction_date);

-- Per-batch deltas applied when a transaction was committed
CREATE TABLE IF NOT EXISTS stock_transaction_effects (
    transaction_id TEXT NOT NULL REFERENCES stock_transactions(id) ON DELETE CASCADE,
    batch_id TEXT NOT NULL,
    delta INTEGER NOT NULL,
    PRIMARY KEY (transaction_id, batch_id)
);

CREATE INDEX IF NOT EXISTS idx_effects_batch ON stock_transaction_effects(batch_id);
"#;
