//! Compensation: reversing stock effects when transactions are deleted.
//!
//! A transaction's recorded effects are reversed exactly. Records without
//! effects are re-resolved the way the engine would resolve them now, which
//! can land on a different batch than the one originally touched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::{BatchStock, StagedStock};
use super::resolver::{resolve_definition, BatchResolver};
use super::{Ledger, LedgerError, LedgerResult, LockPlan};
use crate::db::Database;
use crate::models::{timestamp_now, BatchEffect, StockTransaction, TransactionFilter, TransactionKind};

/// Inverse stock changes for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationPlan {
    pub transaction_id: String,
    pub medicine_definition_id: Option<String>,
    /// Whether the reversals come from recorded effects
    pub recorded: bool,
    pub reversals: Vec<BatchEffect>,
}

/// Compensation for everything attached to one visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitCascadePlan {
    pub visit_id: String,
    pub transactions: Vec<CompensationPlan>,
}

/// Compensation for a patient's visits and direct transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientCascadePlan {
    pub patient_id: String,
    pub visits: Vec<VisitCascadePlan>,
    pub direct: Vec<CompensationPlan>,
}

/// What a deletion removed and the stock it left behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompensationResult {
    pub removed_transactions: Vec<String>,
    pub removed_visits: Vec<String>,
    pub removed_patient: Option<String>,
    /// Stock of every batch that was restored
    pub batches: Vec<BatchStock>,
    /// Batches that no longer exist and could not be restored
    pub missing_batches: Vec<String>,
}

fn union_ids<'p>(plans: impl IntoIterator<Item = &'p CompensationPlan>) -> Vec<String> {
    plans
        .into_iter()
        .flat_map(|p| p.reversals.iter().map(|r| r.batch_id.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl LockPlan for CompensationPlan {
    fn lock_ids(&self) -> Vec<String> {
        union_ids([self])
    }
}

impl LockPlan for VisitCascadePlan {
    fn lock_ids(&self) -> Vec<String> {
        union_ids(&self.transactions)
    }
}

impl LockPlan for PatientCascadePlan {
    fn lock_ids(&self) -> Vec<String> {
        union_ids(
            self.visits
                .iter()
                .flat_map(|v| v.transactions.iter())
                .chain(self.direct.iter()),
        )
    }
}

impl<R: BatchResolver> Ledger<'_, R> {
    /// Delete one transaction, restoring the stock it moved.
    pub fn delete_transaction(&self, transaction_id: &str) -> LedgerResult<CompensationResult> {
        self.run_locked(
            |db| {
                let tx = db
                    .get_transaction(transaction_id)?
                    .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))?;
                self.plan_compensation(db, &tx)
            },
            |db, plan| {
                let mut result = self.compensate(db, [&plan])?;
                db.delete_transaction_row(&plan.transaction_id)?;
                result.removed_transactions.push(plan.transaction_id);
                info!(
                    transaction_id = %transaction_id,
                    batches = result.batches.len(),
                    "Transaction deleted with compensation"
                );
                Ok(result)
            },
        )
    }

    /// Delete a visit and all its transactions, restoring their stock.
    pub fn delete_visit_cascade(&self, visit_id: &str) -> LedgerResult<CompensationResult> {
        self.run_locked(
            |db| self.plan_visit_cascade(db, visit_id),
            |db, plan| {
                let mut result = self.compensate(db, &plan.transactions)?;
                remove_visit(db, &plan, &mut result)?;
                info!(
                    visit_id = %visit_id,
                    transactions = result.removed_transactions.len(),
                    batches = result.batches.len(),
                    "Visit deleted with compensation"
                );
                Ok(result)
            },
        )
    }

    /// Delete a patient with every visit and transaction, restoring stock.
    ///
    /// Each visit goes through the same compensation as
    /// [`Ledger::delete_visit_cascade`]; all of it commits or none does.
    pub fn delete_patient_cascade(&self, patient_id: &str) -> LedgerResult<CompensationResult> {
        self.run_locked(
            |db| {
                if db.get_patient(patient_id)?.is_none() {
                    return Err(LedgerError::PatientNotFound(patient_id.to_string()));
                }
                let visits = db
                    .list_visits_for_patient(patient_id)?
                    .into_iter()
                    .map(|visit| self.plan_visit_cascade(db, &visit.id))
                    .collect::<LedgerResult<Vec<_>>>()?;
                let direct = db
                    .list_direct_transaction_ids_for_patient(patient_id)?
                    .into_iter()
                    .map(|id| {
                        let tx = db
                            .get_transaction(&id)?
                            .ok_or(LedgerError::TransactionNotFound(id))?;
                        self.plan_compensation(db, &tx)
                    })
                    .collect::<LedgerResult<Vec<_>>>()?;
                Ok(PatientCascadePlan {
                    patient_id: patient_id.to_string(),
                    visits,
                    direct,
                })
            },
            |db, plan| {
                let all = plan
                    .visits
                    .iter()
                    .flat_map(|v| v.transactions.iter())
                    .chain(plan.direct.iter());
                let mut result = self.compensate(db, all)?;
                for visit in &plan.visits {
                    remove_visit(db, visit, &mut result)?;
                }
                for tx in &plan.direct {
                    db.delete_transaction_row(&tx.transaction_id)?;
                    result.removed_transactions.push(tx.transaction_id.clone());
                }
                db.delete_patient_row(&plan.patient_id)?;
                result.removed_patient = Some(plan.patient_id);
                info!(
                    patient_id = %patient_id,
                    visits = result.removed_visits.len(),
                    transactions = result.removed_transactions.len(),
                    "Patient deleted with compensation"
                );
                Ok(result)
            },
        )
    }

    fn plan_visit_cascade(&self, db: &Database, visit_id: &str) -> LedgerResult<VisitCascadePlan> {
        if db.get_visit(visit_id)?.is_none() {
            return Err(LedgerError::VisitNotFound(visit_id.to_string()));
        }
        let transactions = db
            .list_transactions(&TransactionFilter::Visit(visit_id.to_string()))?
            .iter()
            .map(|tx| self.plan_compensation(db, tx))
            .collect::<LedgerResult<Vec<_>>>()?;
        Ok(VisitCascadePlan {
            visit_id: visit_id.to_string(),
            transactions,
        })
    }

    /// Work out the inverse deltas of a transaction.
    pub fn plan_compensation(
        &self,
        db: &Database,
        tx: &StockTransaction,
    ) -> LedgerResult<CompensationPlan> {
        let mut plan = CompensationPlan {
            transaction_id: tx.id.clone(),
            medicine_definition_id: tx.medicine_definition_id().map(str::to_string),
            recorded: tx.effects.is_some(),
            reversals: Vec::new(),
        };

        if let Some(effects) = &tx.effects {
            plan.reversals = effects
                .iter()
                .map(|e| {
                    Ok(BatchEffect {
                        batch_id: e.batch_id.clone(),
                        delta: e
                            .delta
                            .checked_neg()
                            .ok_or(LedgerError::InvalidQuantity(e.delta))?,
                    })
                })
                .collect::<LedgerResult<Vec<_>>>()?;
            return Ok(plan);
        }

        let inverse = tx
            .stock_delta()
            .and_then(i64::checked_neg)
            .ok_or(LedgerError::InvalidQuantity(tx.quantity_boxes))?;
        let batch_ids = match &tx.kind {
            TransactionKind::DirectAdjustment { inventory_batch_id } => {
                vec![inventory_batch_id.clone()]
            }
            TransactionKind::PatientVisit {
                medicine_definition_id,
                ..
            } => match db.get_medicine_definition(medicine_definition_id)? {
                Some(def) => {
                    resolve_definition(db, &self.resolver, &def, &timestamp_now())?.batch_ids
                }
                None => {
                    warn!(
                        transaction_id = %tx.id,
                        medicine_definition_id = %medicine_definition_id,
                        "Medicine definition gone; transaction has no stock to restore"
                    );
                    Vec::new()
                }
            },
        };
        plan.reversals = batch_ids
            .into_iter()
            .map(|batch_id| BatchEffect {
                batch_id,
                delta: inverse,
            })
            .collect();
        Ok(plan)
    }

    /// Stage and write the reversals of several plans as one unit.
    ///
    /// Only the final stock of each batch is checked, so the order of
    /// reversals within one deletion does not matter.
    fn compensate<'p>(
        &self,
        db: &Database,
        plans: impl IntoIterator<Item = &'p CompensationPlan>,
    ) -> LedgerResult<CompensationResult> {
        let mut staged = StagedStock::default();
        let mut result = CompensationResult::default();

        for plan in plans {
            if !plan.recorded {
                warn!(
                    transaction_id = %plan.transaction_id,
                    "No recorded effects; compensating by current batch resolution"
                );
            } else if let Some(def_id) = &plan.medicine_definition_id {
                self.warn_on_drift(db, plan, def_id)?;
            }

            for reversal in &plan.reversals {
                if !staged.add(db, &reversal.batch_id, reversal.delta, &plan.transaction_id)? {
                    warn!(
                        transaction_id = %plan.transaction_id,
                        batch_id = %reversal.batch_id,
                        "Batch no longer exists; skipping its compensation"
                    );
                    if !result.missing_batches.contains(&reversal.batch_id) {
                        result.missing_batches.push(reversal.batch_id.clone());
                    }
                }
            }
        }

        if let Some((batch_id, entry)) = staged.first_negative() {
            warn!(
                transaction_id = %entry.source,
                batch_id,
                available = entry.before,
                after = entry.after,
                "Compensation would drive stock negative; aborting"
            );
            return Err(LedgerError::CompensationBlocked {
                transaction_id: entry.source.clone(),
                batch_id: batch_id.to_string(),
                available: entry.before,
                required: entry.before.saturating_sub(entry.after),
            });
        }

        result.batches = staged.commit(db)?;
        Ok(result)
    }

    /// Log when a recorded combination would resolve elsewhere today.
    fn warn_on_drift(&self, db: &Database, plan: &CompensationPlan, def_id: &str) -> LedgerResult<()> {
        let Some(def) = db.get_medicine_definition(def_id)? else {
            return Ok(());
        };
        if !def.is_combination() {
            return Ok(());
        }
        let now: BTreeSet<String> = resolve_definition(db, &self.resolver, &def, &timestamp_now())?
            .batch_ids
            .into_iter()
            .collect();
        let recorded: BTreeSet<String> =
            plan.reversals.iter().map(|r| r.batch_id.clone()).collect();
        if now != recorded {
            warn!(
                transaction_id = %plan.transaction_id,
                recorded = ?recorded,
                current = ?now,
                "Combination now resolves to different batches; restoring the recorded ones"
            );
        }
        Ok(())
    }
}

fn remove_visit(
    db: &Database,
    plan: &VisitCascadePlan,
    result: &mut CompensationResult,
) -> LedgerResult<()> {
    for tx in &plan.transactions {
        db.delete_transaction_row(&tx.transaction_id)?;
        result.removed_transactions.push(tx.transaction_id.clone());
    }
    db.delete_visit_row(&plan.visit_id)?;
    result.removed_visits.push(plan.visit_id.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BatchLocks, DirectTransactionRequest, VisitTransactionRequest};
    use crate::models::{
        CombinationComponent, CombinationDescriptor, DosagePattern, MedicineDefinition, NewBatch,
        Patient, Pricing, TransactionType, Visit,
    };

    struct Fixture {
        db: Database,
        locks: BatchLocks,
        patient: Patient,
        visit: Visit,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Ayesha");
        db.insert_patient(&patient).unwrap();
        let visit = Visit::new(&patient.id, "2025-03-01");
        db.insert_visit(&visit).unwrap();
        Fixture {
            db,
            locks: BatchLocks::new(),
            patient,
            visit,
        }
    }

    fn add_simple(db: &Database, name: &str, qty: i64) -> (String, String) {
        let batch = NewBatch::new(name, "B-001", qty).into_batch();
        db.insert_batch(&batch).unwrap();
        let def = MedicineDefinition::simple(name, Some(batch.id.clone()));
        db.insert_medicine_definition(&def).unwrap();
        (batch.id, def.id)
    }

    fn dispense(f: &Fixture, def_id: &str, t: TransactionType, qty: i64) -> String {
        Ledger::new(&f.db, &f.locks)
            .record_visit_transaction(&VisitTransactionRequest {
                medicine_definition_id: def_id.to_string(),
                patient_id: f.patient.id.clone(),
                visit_id: f.visit.id.clone(),
                transaction_type: t,
                quantity_boxes: qty,
                pricing: Pricing::default(),
                payment_method: None,
                reason: None,
            })
            .unwrap()
            .transaction_id
    }

    #[test]
    fn test_delete_transaction_restores_stock() {
        let f = setup();
        let (batch_id, def_id) = add_simple(&f.db, "COBECWT", 100);
        let tx_id = dispense(&f, &def_id, TransactionType::Dispensed, 30);
        let ledger = Ledger::new(&f.db, &f.locks);
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 70);

        let result = ledger.delete_transaction(&tx_id).unwrap();
        assert_eq!(result.removed_transactions, vec![tx_id.clone()]);
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 100);
        assert!(f.db.get_transaction(&tx_id).unwrap().is_none());

        assert!(matches!(
            ledger.delete_transaction(&tx_id).unwrap_err(),
            LedgerError::TransactionNotFound(_)
        ));
    }

    #[test]
    fn test_blocked_compensation_rolls_back() {
        let f = setup();
        let (batch_id, def_id) = add_simple(&f.db, "COBECWT", 0);
        let returned = dispense(&f, &def_id, TransactionType::Return, 5);
        let ledger = Ledger::new(&f.db, &f.locks);
        ledger
            .record_direct_transaction(&DirectTransactionRequest {
                inventory_batch_id: batch_id.clone(),
                transaction_type: TransactionType::Dispensed,
                quantity_boxes: 4,
                notes: None,
                patient_id: None,
            })
            .unwrap();

        let err = ledger.delete_transaction(&returned).unwrap_err();
        match err {
            LedgerError::CompensationBlocked {
                transaction_id,
                available,
                required,
                ..
            } => {
                assert_eq!(transaction_id, returned);
                assert_eq!((available, required), (1, 5));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 1);
        assert!(f.db.get_transaction(&returned).unwrap().is_some());
    }

    #[test]
    fn test_visit_cascade_nets_reversals() {
        let f = setup();
        let (batch_id, def_id) = add_simple(&f.db, "COBECWT", 10);
        dispense(&f, &def_id, TransactionType::Dispensed, 10);
        dispense(&f, &def_id, TransactionType::Return, 3);
        let ledger = Ledger::new(&f.db, &f.locks);
        // Someone else takes the returned boxes.
        ledger
            .record_direct_transaction(&DirectTransactionRequest {
                inventory_batch_id: batch_id.clone(),
                transaction_type: TransactionType::Dispensed,
                quantity_boxes: 3,
                notes: None,
                patient_id: None,
            })
            .unwrap();
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 0);

        let result = ledger.delete_visit_cascade(&f.visit.id).unwrap();
        assert_eq!(result.removed_transactions.len(), 2);
        assert_eq!(result.removed_visits, vec![f.visit.id.clone()]);
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 7);
        assert!(f.db.get_visit(&f.visit.id).unwrap().is_none());
    }

    #[test]
    fn test_legacy_record_is_re_resolved() {
        let f = setup();
        let def = MedicineDefinition::combination(
            "COBECWT (1+0+0)",
            CombinationDescriptor::new(vec![CombinationComponent::new(
                "COBECWT",
                DosagePattern::new(1, 0, 0),
            )]),
        );
        f.db.insert_medicine_definition(&def).unwrap();
        let batch = NewBatch::new("COBECWT", "B-001", 10).into_batch();
        f.db.insert_batch(&batch).unwrap();

        let tx_id = dispense(&f, &def.id, TransactionType::Dispensed, 4);
        f.db.conn()
            .execute(
                "UPDATE stock_transactions SET effects_recorded = 0 WHERE id = ?",
                [&tx_id],
            )
            .unwrap();

        let ledger = Ledger::new(&f.db, &f.locks);
        let tx = f.db.get_transaction(&tx_id).unwrap().unwrap();
        let plan = ledger.plan_compensation(&f.db, &tx).unwrap();
        assert!(!plan.recorded);
        assert_eq!(
            plan.reversals,
            vec![BatchEffect {
                batch_id: batch.id.clone(),
                delta: 4
            }]
        );

        ledger.delete_transaction(&tx_id).unwrap();
        assert_eq!(ledger.get_stock(&batch.id).unwrap(), 10);
    }

    #[test]
    fn test_patient_cascade_restores_everything() {
        let f = setup();
        let (batch_id, def_id) = add_simple(&f.db, "COBECWT", 50);
        dispense(&f, &def_id, TransactionType::Dispensed, 5);

        let second_visit = Visit::new(&f.patient.id, "2025-04-01");
        f.db.insert_visit(&second_visit).unwrap();
        let ledger = Ledger::new(&f.db, &f.locks);
        ledger
            .record_visit_transaction(&VisitTransactionRequest {
                medicine_definition_id: def_id.clone(),
                patient_id: f.patient.id.clone(),
                visit_id: second_visit.id.clone(),
                transaction_type: TransactionType::Dispensed,
                quantity_boxes: 7,
                pricing: Pricing::default(),
                payment_method: None,
                reason: None,
            })
            .unwrap();
        ledger
            .record_direct_transaction(&DirectTransactionRequest {
                inventory_batch_id: batch_id.clone(),
                transaction_type: TransactionType::Dispensed,
                quantity_boxes: 2,
                notes: Some("walk-in".into()),
                patient_id: Some(f.patient.id.clone()),
            })
            .unwrap();
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 36);

        let result = ledger.delete_patient_cascade(&f.patient.id).unwrap();
        assert_eq!(result.removed_visits.len(), 2);
        assert_eq!(result.removed_transactions.len(), 3);
        assert_eq!(result.removed_patient.as_deref(), Some(f.patient.id.as_str()));
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 50);
        assert!(f.db.get_patient(&f.patient.id).unwrap().is_none());
    }

    #[test]
    fn test_cascade_missing_targets() {
        let f = setup();
        let ledger = Ledger::new(&f.db, &f.locks);
        assert!(matches!(
            ledger.delete_visit_cascade("missing").unwrap_err(),
            LedgerError::VisitNotFound(_)
        ));
        assert!(matches!(
            ledger.delete_patient_cascade("missing").unwrap_err(),
            LedgerError::PatientNotFound(_)
        ));
    }
    #[test]
    fn test_unrepresentable_reversal_is_rejected() {
        let f = setup();
        let (batch_id, _) = add_simple(&f.db, "COBECWT", 10);
        let imported = StockTransaction {
            id: "imported-1".into(),
            kind: TransactionKind::DirectAdjustment {
                inventory_batch_id: batch_id.clone(),
            },
            patient_id: None,
            transaction_type: TransactionType::Adjustment,
            quantity_boxes: i64::MIN,
            pricing: Pricing::default(),
            payment_method: None,
            reason: None,
            notes: None,
            transaction_date: timestamp_now(),
            effects: Some(vec![BatchEffect {
                batch_id: batch_id.clone(),
                delta: i64::MIN,
            }]),
        };
        f.db.insert_transaction(&imported).unwrap();

        let ledger = Ledger::new(&f.db, &f.locks);
        assert!(matches!(
            ledger.delete_transaction("imported-1").unwrap_err(),
            LedgerError::InvalidQuantity(i64::MIN)
        ));
        assert_eq!(ledger.get_stock(&batch_id).unwrap(), 10);
        assert!(f.db.get_transaction("imported-1").unwrap().is_some());
    }
}
