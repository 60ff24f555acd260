//! Stock transaction database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{
    BatchEffect, Discount, Pricing, StockTransaction, TransactionFilter, TransactionKind,
    TransactionType,
};

const TRANSACTION_COLUMNS: &str = r#"
    id, kind, inventory_batch_id, medicine_definition_id, visit_id, patient_id,
    transaction_type, quantity_boxes, price_per_box, discount_type, discount_value,
    payment_method, reason, notes, transaction_date, effects_recorded
"#;

impl Database {
    /// Insert a transaction together with its batch effects.
    pub fn insert_transaction(&self, tx: &StockTransaction) -> DbResult<()> {
        let (kind, batch_id, definition_id, visit_id) = match &tx.kind {
            TransactionKind::DirectAdjustment { inventory_batch_id } => {
                ("direct", Some(inventory_batch_id.as_str()), None, None)
            }
            TransactionKind::PatientVisit {
                medicine_definition_id,
                visit_id,
            } => (
                "visit",
                None,
                Some(medicine_definition_id.as_str()),
                Some(visit_id.as_str()),
            ),
        };

        self.conn.execute(
            r#"
            INSERT INTO stock_transactions (
                id, kind, inventory_batch_id, medicine_definition_id, visit_id, patient_id,
                transaction_type, quantity_boxes, price_per_box, discount_type, discount_value,
                payment_method, reason, notes, transaction_date, effects_recorded
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                tx.id,
                kind,
                batch_id,
                definition_id,
                visit_id,
                tx.patient_id,
                tx.transaction_type.as_str(),
                tx.quantity_boxes,
                tx.pricing.price_per_box,
                tx.pricing.discount.map(|d| d.type_str()),
                tx.pricing.discount.map(|d| d.value()),
                tx.payment_method,
                tx.reason,
                tx.notes,
                tx.transaction_date,
                tx.effects.is_some(),
            ],
        )?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO stock_transaction_effects (transaction_id, batch_id, delta) VALUES (?1, ?2, ?3)",
        )?;
        for effect in tx.effects.iter().flatten() {
            stmt.execute(params![tx.id, effect.batch_id, effect.delta])?;
        }
        Ok(())
    }

    /// Get a transaction by ID.
    pub fn get_transaction(&self, id: &str) -> DbResult<Option<StockTransaction>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM stock_transactions WHERE id = ?", TRANSACTION_COLUMNS),
                [id],
                TransactionRow::from_row,
            )
            .optional()?;
        row.map(|row| self.hydrate(row)).transpose()
    }

    /// List transactions matching a filter, newest first.
    pub fn list_transactions(&self, filter: &TransactionFilter) -> DbResult<Vec<StockTransaction>> {
        let (clause, key) = match filter {
            TransactionFilter::Batch(id) => (
                r#"inventory_batch_id = ?1
                   OR id IN (SELECT transaction_id FROM stock_transaction_effects WHERE batch_id = ?1)"#,
                id,
            ),
            TransactionFilter::MedicineDefinition(id) => ("medicine_definition_id = ?1", id),
            TransactionFilter::Visit(id) => ("visit_id = ?1", id),
            TransactionFilter::Patient(id) => ("patient_id = ?1", id),
        };

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM stock_transactions
            WHERE {}
            ORDER BY transaction_date DESC, rowid DESC
            "#,
            TRANSACTION_COLUMNS, clause
        ))?;
        let rows = stmt
            .query_map([key], TransactionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }

    /// IDs of a patient's transactions that are not tied to a visit.
    pub fn list_direct_transaction_ids_for_patient(&self, patient_id: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id FROM stock_transactions
            WHERE patient_id = ? AND visit_id IS NULL
            ORDER BY transaction_date DESC, rowid DESC
            "#,
        )?;
        let ids = stmt
            .query_map([patient_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Recorded per-batch effects of a transaction.
    pub fn get_transaction_effects(&self, transaction_id: &str) -> DbResult<Vec<BatchEffect>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT batch_id, delta FROM stock_transaction_effects
            WHERE transaction_id = ?
            ORDER BY batch_id
            "#,
        )?;
        let effects = stmt
            .query_map([transaction_id], |row| {
                Ok(BatchEffect {
                    batch_id: row.get(0)?,
                    delta: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(effects)
    }

    /// Delete a transaction row; its effects go with it.
    pub(crate) fn delete_transaction_row(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM stock_transactions WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    fn hydrate(&self, row: TransactionRow) -> DbResult<StockTransaction> {
        let effects = if row.effects_recorded {
            Some(self.get_transaction_effects(&row.id)?)
        } else {
            None
        };
        let mut tx: StockTransaction = row.try_into()?;
        tx.effects = effects;
        Ok(tx)
    }
}

/// Intermediate row struct for database mapping.
struct TransactionRow {
    id: String,
    kind: String,
    inventory_batch_id: Option<String>,
    medicine_definition_id: Option<String>,
    visit_id: Option<String>,
    patient_id: Option<String>,
    transaction_type: String,
    quantity_boxes: i64,
    price_per_box: Option<f64>,
    discount_type: Option<String>,
    discount_value: Option<f64>,
    payment_method: Option<String>,
    reason: Option<String>,
    notes: Option<String>,
    transaction_date: String,
    effects_recorded: bool,
}

impl TransactionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            inventory_batch_id: row.get(2)?,
            medicine_definition_id: row.get(3)?,
            visit_id: row.get(4)?,
            patient_id: row.get(5)?,
            transaction_type: row.get(6)?,
            quantity_boxes: row.get(7)?,
            price_per_box: row.get(8)?,
            discount_type: row.get(9)?,
            discount_value: row.get(10)?,
            payment_method: row.get(11)?,
            reason: row.get(12)?,
            notes: row.get(13)?,
            transaction_date: row.get(14)?,
            effects_recorded: row.get(15)?,
        })
    }
}

impl TryFrom<TransactionRow> for StockTransaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.inventory_batch_id, row.medicine_definition_id, row.visit_id) {
            ("direct", Some(inventory_batch_id), _, _) => {
                TransactionKind::DirectAdjustment { inventory_batch_id }
            }
            ("visit", _, Some(medicine_definition_id), Some(visit_id)) => {
                TransactionKind::PatientVisit {
                    medicine_definition_id,
                    visit_id,
                }
            }
            (other, ..) => {
                return Err(DbError::Constraint(format!(
                    "Invalid transaction kind for {}: {}",
                    row.id, other
                )))
            }
        };
        let transaction_type = TransactionType::parse(&row.transaction_type).ok_or_else(|| {
            DbError::Constraint(format!("Invalid transaction type: {}", row.transaction_type))
        })?;

        Ok(StockTransaction {
            id: row.id,
            kind,
            patient_id: row.patient_id,
            transaction_type,
            quantity_boxes: row.quantity_boxes,
            pricing: Pricing::new(
                row.price_per_box,
                Discount::from_parts(row.discount_type.as_deref(), row.discount_value),
            ),
            payment_method: row.payment_method,
            reason: row.reason,
            notes: row.notes,
            transaction_date: row.transaction_date,
            effects: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{timestamp_now, NewBatch, Patient, Visit};

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn direct(batch_id: &str, delta: i64) -> StockTransaction {
        StockTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            kind: TransactionKind::DirectAdjustment {
                inventory_batch_id: batch_id.to_string(),
            },
            patient_id: None,
            transaction_type: TransactionType::Adjustment,
            quantity_boxes: delta,
            pricing: Pricing::default(),
            payment_method: None,
            reason: None,
            notes: Some("count correction".into()),
            transaction_date: timestamp_now(),
            effects: Some(vec![BatchEffect {
                batch_id: batch_id.to_string(),
                delta,
            }]),
        }
    }

    #[test]
    fn test_insert_and_get_direct() {
        let db = setup_db();
        let tx = direct("batch-1", -2);
        db.insert_transaction(&tx).unwrap();

        let loaded = db.get_transaction(&tx.id).unwrap().unwrap();
        assert_eq!(loaded, tx);
        assert!(db.get_transaction("missing").unwrap().is_none());
    }

    #[test]
    fn test_visit_transaction_round_trip() {
        let db = setup_db();
        let patient = Patient::new("Ayesha");
        db.insert_patient(&patient).unwrap();
        let visit = Visit::new(&patient.id, "2025-03-01");
        db.insert_visit(&visit).unwrap();

        let tx = StockTransaction {
            id: "tx-1".into(),
            kind: TransactionKind::PatientVisit {
                medicine_definition_id: "def-1".into(),
                visit_id: visit.id.clone(),
            },
            patient_id: Some(patient.id.clone()),
            transaction_type: TransactionType::Dispensed,
            quantity_boxes: 3,
            pricing: Pricing::new(Some(100.0), Some(Discount::Percentage(10.0))),
            payment_method: Some("cash".into()),
            reason: None,
            notes: None,
            transaction_date: timestamp_now(),
            effects: Some(vec![
                BatchEffect { batch_id: "a".into(), delta: -3 },
                BatchEffect { batch_id: "b".into(), delta: -3 },
            ]),
        };
        db.insert_transaction(&tx).unwrap();

        let loaded = db.get_transaction("tx-1").unwrap().unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(loaded.line_total(), Some(270.0));

        let by_visit = db
            .list_transactions(&TransactionFilter::Visit(visit.id.clone()))
            .unwrap();
        assert_eq!(by_visit.len(), 1);
        let by_batch = db
            .list_transactions(&TransactionFilter::Batch("b".into()))
            .unwrap();
        assert_eq!(by_batch.len(), 1);
    }

    #[test]
    fn test_list_newest_first() {
        let db = setup_db();
        let batch = NewBatch::new("COBECWT", "B-001", 10).into_batch();
        let mut older = direct(&batch.id, 1);
        older.transaction_date = "2025-01-01T00:00:00.000000Z".into();
        let mut newer = direct(&batch.id, 2);
        newer.transaction_date = "2025-01-02T00:00:00.000000Z".into();
        db.insert_transaction(&older).unwrap();
        db.insert_transaction(&newer).unwrap();

        let ids: Vec<String> = db
            .list_transactions(&TransactionFilter::Batch(batch.id.clone()))
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn test_delete_removes_effects() {
        let db = setup_db();
        let tx = direct("batch-1", 4);
        db.insert_transaction(&tx).unwrap();
        assert!(db.delete_transaction_row(&tx.id).unwrap());
        assert!(db.get_transaction_effects(&tx.id).unwrap().is_empty());
        assert!(!db.delete_transaction_row(&tx.id).unwrap());
    }

    #[test]
    fn test_direct_ids_for_patient() {
        let db = setup_db();
        let patient = Patient::new("Bilal");
        db.insert_patient(&patient).unwrap();
        let mut tx = direct("batch-1", 1);
        tx.patient_id = Some(patient.id.clone());
        db.insert_transaction(&tx).unwrap();

        assert_eq!(
            db.list_direct_transaction_ids_for_patient(&patient.id).unwrap(),
            vec![tx.id]
        );
    }
}
