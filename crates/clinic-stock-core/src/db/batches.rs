//! Inventory batch database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{BatchUpdate, InventoryBatch};

const BATCH_COLUMNS: &str = r#"
    id, medicine_name, description, batch_number, price_in, price_out,
    manufacturing_date, expiry_date, batch_in_date,
    expected_qty_cartons, expected_qty_boxes, received_qty_cartons, received_qty_boxes,
    on_hand_qty_boxes, registration_number, warranty_received, warranty_receive_date,
    bill_invoice_number, created_at
"#;

fn map_batch(row: &Row<'_>) -> rusqlite::Result<InventoryBatch> {
    Ok(InventoryBatch {
        id: row.get(0)?,
        medicine_name: row.get(1)?,
        description: row.get(2)?,
        batch_number: row.get(3)?,
        price_in: row.get(4)?,
        price_out: row.get(5)?,
        manufacturing_date: row.get(6)?,
        expiry_date: row.get(7)?,
        batch_in_date: row.get(8)?,
        expected_qty_cartons: row.get(9)?,
        expected_qty_boxes: row.get(10)?,
        received_qty_cartons: row.get(11)?,
        received_qty_boxes: row.get(12)?,
        on_hand_qty_boxes: row.get(13)?,
        registration_number: row.get(14)?,
        warranty_received: row.get(15)?,
        warranty_receive_date: row.get(16)?,
        bill_invoice_number: row.get(17)?,
        created_at: row.get(18)?,
    })
}

impl Database {
    /// Insert a new batch.
    pub fn insert_batch(&self, batch: &InventoryBatch) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO inventory_batches (
                id, medicine_name, description, batch_number, price_in, price_out,
                manufacturing_date, expiry_date, batch_in_date,
                expected_qty_cartons, expected_qty_boxes, received_qty_cartons, received_qty_boxes,
                on_hand_qty_boxes, registration_number, warranty_received, warranty_receive_date,
                bill_invoice_number, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                batch.id,
                batch.medicine_name,
                batch.description,
                batch.batch_number,
                batch.price_in,
                batch.price_out,
                batch.manufacturing_date,
                batch.expiry_date,
                batch.batch_in_date,
                batch.expected_qty_cartons,
                batch.expected_qty_boxes,
                batch.received_qty_cartons,
                batch.received_qty_boxes,
                batch.on_hand_qty_boxes,
                batch.registration_number,
                batch.warranty_received,
                batch.warranty_receive_date,
                batch.bill_invoice_number,
                batch.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a batch by ID.
    pub fn get_batch(&self, id: &str) -> DbResult<Option<InventoryBatch>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM inventory_batches WHERE id = ?", BATCH_COLUMNS),
                [id],
                map_batch,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Current on-hand boxes of a batch.
    pub fn get_on_hand(&self, id: &str) -> DbResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT on_hand_qty_boxes FROM inventory_batches WHERE id = ?",
                [id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all batches, newest first.
    pub fn list_batches(&self) -> DbResult<Vec<InventoryBatch>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inventory_batches ORDER BY created_at DESC, rowid DESC",
            BATCH_COLUMNS
        ))?;
        let batches = stmt
            .query_map([], map_batch)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// List batches with fewer than `below` boxes on hand, emptiest first.
    pub fn list_batches_below(&self, below: i64) -> DbResult<Vec<InventoryBatch>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM inventory_batches
            WHERE on_hand_qty_boxes < ?
            ORDER BY on_hand_qty_boxes ASC, medicine_name ASC
            "#,
            BATCH_COLUMNS
        ))?;
        let batches = stmt
            .query_map([below], map_batch)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// Most recently created batch for a medicine name, as of a timestamp.
    ///
    /// Insertion order breaks ties between equal timestamps.
    pub fn latest_batch_for_name(
        &self,
        medicine_name: &str,
        as_of: &str,
    ) -> DbResult<Option<InventoryBatch>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM inventory_batches
                    WHERE medicine_name = ?1 AND created_at <= ?2
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT 1
                    "#,
                    BATCH_COLUMNS
                ),
                params![medicine_name, as_of],
                map_batch,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Count other batches of the same medicine that still hold stock.
    pub fn count_other_stocked_batches(&self, medicine_name: &str, except_id: &str) -> DbResult<i64> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM inventory_batches
            WHERE medicine_name = ?1 AND id != ?2 AND on_hand_qty_boxes > 0
            "#,
            params![medicine_name, except_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Distinct medicine names that have at least one batch.
    pub fn list_batch_medicine_names(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT medicine_name FROM inventory_batches ORDER BY medicine_name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Update descriptive batch fields. On-hand stock is left untouched.
    pub fn update_batch_details(&self, id: &str, update: &BatchUpdate) -> DbResult<bool> {
        let d = &update.details;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_batches SET
                medicine_name = ?2,
                batch_number = ?3,
                received_qty_boxes = ?4,
                description = ?5,
                price_in = ?6,
                price_out = ?7,
                manufacturing_date = ?8,
                expiry_date = ?9,
                batch_in_date = ?10,
                expected_qty_cartons = ?11,
                expected_qty_boxes = ?12,
                received_qty_cartons = ?13,
                registration_number = ?14,
                warranty_received = ?15,
                warranty_receive_date = ?16,
                bill_invoice_number = ?17
            WHERE id = ?1
            "#,
            params![
                id,
                update.medicine_name,
                update.batch_number,
                update.received_qty_boxes,
                d.description,
                d.price_in,
                d.price_out,
                d.manufacturing_date,
                d.expiry_date,
                d.batch_in_date,
                d.expected_qty_cartons,
                d.expected_qty_boxes,
                d.received_qty_cartons,
                d.registration_number,
                d.warranty_received,
                d.warranty_receive_date,
                d.bill_invoice_number,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Write a new on-hand quantity. Only the ledger calls this.
    pub(crate) fn set_on_hand(&self, id: &str, on_hand_qty_boxes: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE inventory_batches SET on_hand_qty_boxes = ?2 WHERE id = ?1",
            params![id, on_hand_qty_boxes],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a batch row. Fails while a medicine definition still binds it.
    pub(crate) fn delete_batch_row(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM inventory_batches WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}
