//! Stock transaction engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::resolver::{resolve_targets, BatchResolver, ResolvedTargets, SkippedComponent};
use super::{Ledger, LedgerError, LedgerResult, LockPlan};
use crate::db::{Database, DbResult};
use crate::models::{
    timestamp_now, BatchEffect, Pricing, StockTransaction, TransactionFilter, TransactionKind,
    TransactionType, VisitTotals,
};

/// A medicine handed out, returned or refunded during a visit.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitTransactionRequest {
    pub medicine_definition_id: String,
    pub patient_id: String,
    pub visit_id: String,
    pub transaction_type: TransactionType,
    /// Boxes, as a positive magnitude
    pub quantity_boxes: i64,
    pub pricing: Pricing,
    pub payment_method: Option<String>,
    pub reason: Option<String>,
}

/// A stock movement against one batch, outside any visit.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectTransactionRequest {
    pub inventory_batch_id: String,
    pub transaction_type: TransactionType,
    /// Boxes; adjustments may be negative
    pub quantity_boxes: i64,
    pub notes: Option<String>,
    pub patient_id: Option<String>,
}

/// Stock of one batch after an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchStock {
    pub batch_id: String,
    pub on_hand_qty_boxes: i64,
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionResult {
    pub transaction_id: String,
    /// New stock of every affected batch
    pub batches: Vec<BatchStock>,
    /// Components that had no batch and were left untouched
    pub skipped: Vec<SkippedComponent>,
}

/// Pending stock writes, validated before any is applied.
#[derive(Debug, Default)]
pub(crate) struct StagedStock {
    entries: BTreeMap<String, StagedEntry>,
}

#[derive(Debug, Clone)]
pub(crate) struct StagedEntry {
    pub before: i64,
    pub after: i64,
    /// Last transaction that contributed to this entry
    pub source: String,
}

impl StagedStock {
    /// Stage a delta. Returns `false` when the batch no longer exists.
    ///
    /// A total that leaves the `i64` range is rejected as an invalid quantity.
    pub fn add(
        &mut self,
        db: &Database,
        batch_id: &str,
        delta: i64,
        source: &str,
    ) -> LedgerResult<bool> {
        if let Some(entry) = self.entries.get_mut(batch_id) {
            entry.after = entry
                .after
                .checked_add(delta)
                .ok_or(LedgerError::InvalidQuantity(delta))?;
            entry.source = source.to_string();
            return Ok(true);
        }
        let Some(on_hand) = db.get_on_hand(batch_id)? else {
            return Ok(false);
        };
        let after = on_hand
            .checked_add(delta)
            .ok_or(LedgerError::InvalidQuantity(delta))?;
        self.entries.insert(
            batch_id.to_string(),
            StagedEntry {
                before: on_hand,
                after,
                source: source.to_string(),
            },
        );
        Ok(true)
    }

    /// First entry that would end up negative.
    pub fn first_negative(&self) -> Option<(&str, &StagedEntry)> {
        self.entries
            .iter()
            .find(|(_, e)| e.after < 0)
            .map(|(id, e)| (id.as_str(), e))
    }

    /// Write every staged value.
    pub fn commit(&self, db: &Database) -> DbResult<Vec<BatchStock>> {
        let mut stocks = Vec::with_capacity(self.entries.len());
        for (batch_id, entry) in &self.entries {
            db.set_on_hand(batch_id, entry.after)?;
            stocks.push(BatchStock {
                batch_id: batch_id.clone(),
                on_hand_qty_boxes: entry.after,
            });
        }
        Ok(stocks)
    }
}

impl LockPlan for ResolvedTargets {
    fn lock_ids(&self) -> Vec<String> {
        self.batch_ids.clone()
    }
}

/// Lock plan for a single known batch.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SingleBatch(pub String);

impl LockPlan for SingleBatch {
    fn lock_ids(&self) -> Vec<String> {
        vec![self.0.clone()]
    }
}

impl<R: BatchResolver> Ledger<'_, R> {
    /// Record a visit transaction against every batch its medicine draws from.
    ///
    /// Either every target batch is updated and the transaction stored, or
    /// nothing changes.
    pub fn record_visit_transaction(
        &self,
        req: &VisitTransactionRequest,
    ) -> LedgerResult<TransactionResult> {
        if !req.transaction_type.allowed_on_visit() {
            return Err(LedgerError::UnsupportedTransactionType(
                req.transaction_type.as_str(),
            ));
        }
        if req.quantity_boxes <= 0 {
            return Err(LedgerError::InvalidQuantity(req.quantity_boxes));
        }

        let delta = req
            .transaction_type
            .stock_delta(req.quantity_boxes)
            .ok_or(LedgerError::InvalidQuantity(req.quantity_boxes))?;
        self.run_locked(
            |db| {
                check_visit_owner(db, &req.visit_id, &req.patient_id)?;
                resolve_targets(db, &self.resolver, &req.medicine_definition_id, &timestamp_now())
            },
            |db, targets| {
                let tx = StockTransaction {
                    id: uuid::Uuid::new_v4().to_string(),
                    kind: TransactionKind::PatientVisit {
                        medicine_definition_id: req.medicine_definition_id.clone(),
                        visit_id: req.visit_id.clone(),
                    },
                    patient_id: Some(req.patient_id.clone()),
                    transaction_type: req.transaction_type,
                    quantity_boxes: req.quantity_boxes,
                    pricing: req.pricing,
                    payment_method: req.payment_method.clone(),
                    reason: req.reason.clone(),
                    notes: None,
                    transaction_date: timestamp_now(),
                    effects: None,
                };
                apply_and_record(db, tx, &targets.batch_ids, delta, targets.skipped)
            },
        )
    }

    /// Record a stock movement against one batch.
    pub fn record_direct_transaction(
        &self,
        req: &DirectTransactionRequest,
    ) -> LedgerResult<TransactionResult> {
        let valid_quantity = match req.transaction_type {
            TransactionType::Adjustment => req.quantity_boxes != 0,
            _ => req.quantity_boxes > 0,
        };
        if !valid_quantity {
            return Err(LedgerError::InvalidQuantity(req.quantity_boxes));
        }
        if let Some(patient_id) = &req.patient_id {
            if self.db.get_patient(patient_id)?.is_none() {
                return Err(LedgerError::PatientNotFound(patient_id.clone()));
            }
        }

        let delta = req
            .transaction_type
            .stock_delta(req.quantity_boxes)
            .ok_or(LedgerError::InvalidQuantity(req.quantity_boxes))?;
        self.run_locked(
            |db| {
                db.get_on_hand(&req.inventory_batch_id)?
                    .ok_or_else(|| LedgerError::BatchNotFound(req.inventory_batch_id.clone()))?;
                Ok(SingleBatch(req.inventory_batch_id.clone()))
            },
            |db, batch| {
                let tx = StockTransaction {
                    id: uuid::Uuid::new_v4().to_string(),
                    kind: TransactionKind::DirectAdjustment {
                        inventory_batch_id: batch.0.clone(),
                    },
                    patient_id: req.patient_id.clone(),
                    transaction_type: req.transaction_type,
                    quantity_boxes: req.quantity_boxes,
                    pricing: Pricing::default(),
                    payment_method: None,
                    reason: None,
                    notes: req.notes.clone(),
                    transaction_date: timestamp_now(),
                    effects: None,
                };
                apply_and_record(db, tx, &[batch.0], delta, Vec::new())
            },
        )
    }

    /// Current on-hand boxes of a batch.
    pub fn get_stock(&self, batch_id: &str) -> LedgerResult<i64> {
        self.db
            .get_on_hand(batch_id)?
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))
    }

    /// Transactions matching a filter, newest first.
    pub fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<StockTransaction>> {
        Ok(self.db.list_transactions(filter)?)
    }

    /// Billing totals for a visit.
    pub fn visit_totals(&self, visit_id: &str) -> LedgerResult<VisitTotals> {
        if self.db.get_visit(visit_id)?.is_none() {
            return Err(LedgerError::VisitNotFound(visit_id.to_string()));
        }
        let mut totals = VisitTotals::default();
        for tx in self
            .db
            .list_transactions(&TransactionFilter::Visit(visit_id.to_string()))?
        {
            let amount = tx.line_total().unwrap_or(0.0);
            match tx.transaction_type {
                TransactionType::Dispensed => {
                    totals.dispensed += amount;
                    totals.dispensed_boxes += tx.quantity_boxes;
                }
                TransactionType::Return | TransactionType::Refund => {
                    totals.returned += amount;
                    totals.returned_boxes += tx.quantity_boxes;
                }
                TransactionType::Received | TransactionType::Adjustment => {}
            }
        }
        Ok(totals)
    }
}

/// Fail unless the visit exists and belongs to the patient.
fn check_visit_owner(db: &Database, visit_id: &str, patient_id: &str) -> LedgerResult<()> {
    let visit = db
        .get_visit(visit_id)?
        .ok_or_else(|| LedgerError::VisitNotFound(visit_id.to_string()))?;
    if visit.patient_id != patient_id {
        return Err(LedgerError::PatientMismatch {
            visit_id: visit_id.to_string(),
            patient_id: patient_id.to_string(),
        });
    }
    Ok(())
}

/// Stage `delta` on every batch, validate all, then write stock and record.
fn apply_and_record(
    db: &Database,
    mut tx: StockTransaction,
    batch_ids: &[String],
    delta: i64,
    skipped: Vec<SkippedComponent>,
) -> LedgerResult<TransactionResult> {
    let mut staged = StagedStock::default();
    for batch_id in batch_ids {
        if !staged.add(db, batch_id, delta, &tx.id)? {
            return Err(LedgerError::BatchNotFound(batch_id.clone()));
        }
    }
    if let Some((batch_id, entry)) = staged.first_negative() {
        let requested = delta
            .checked_neg()
            .ok_or(LedgerError::InvalidQuantity(tx.quantity_boxes))?;
        return Err(LedgerError::InsufficientStock {
            batch_id: batch_id.to_string(),
            available: entry.before,
            requested,
        });
    }

    let batches = staged.commit(db)?;
    tx.effects = Some(
        batch_ids
            .iter()
            .map(|batch_id| BatchEffect {
                batch_id: batch_id.clone(),
                delta,
            })
            .collect(),
    );
    db.insert_transaction(&tx)?;

    info!(
        transaction_id = %tx.id,
        transaction_type = tx.transaction_type.as_str(),
        quantity = tx.quantity_boxes,
        batches = batches.len(),
        skipped = skipped.len(),
        "Stock transaction committed"
    );
    Ok(TransactionResult {
        transaction_id: tx.id,
        batches,
        skipped,
    })
}
