//! Batch and medicine definition maintenance.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::engine::SingleBatch;
use super::resolver::BatchResolver;
use super::{Ledger, LedgerError, LedgerResult};
use crate::codec::{self, ParseError};
use crate::models::{
    BatchUpdate, CombinationComponent, CombinationDescriptor, ExpiryStatus, InventoryBatch,
    MedicineDefinition, MedicineKind, NewBatch, StockStatus, StockThresholds,
};

/// A batch with its stock and expiry classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchOverview {
    pub batch: InventoryBatch,
    pub stock_status: StockStatus,
    pub expiry_status: ExpiryStatus,
}

/// Input for saving a predefined combination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinationInput {
    pub name: String,
    pub components: Vec<CombinationComponent>,
    pub tags: Vec<String>,
    /// Generated from the components when absent
    pub description: Option<String>,
}

impl<R: BatchResolver> Ledger<'_, R> {
    // =====================================================================
    // Batches
    // =====================================================================

    /// Receive a new batch and bind the simple medicine of the same name to it.
    pub fn create_batch(&self, new_batch: NewBatch) -> LedgerResult<InventoryBatch> {
        let medicine_name = new_batch.medicine_name.trim().to_string();
        if medicine_name.is_empty() {
            return Err(LedgerError::InvalidInput("Medicine name is required".into()));
        }
        if new_batch.received_qty_boxes < 0 {
            return Err(LedgerError::InvalidQuantity(new_batch.received_qty_boxes));
        }

        let batch = NewBatch {
            medicine_name,
            ..new_batch
        }
        .into_batch();

        self.db.in_transaction(|db| {
            db.insert_batch(&batch)?;
            match db.find_simple_definition(&batch.medicine_name)? {
                Some(def) => {
                    db.bind_simple_definition(&def.id, &batch.id)?;
                }
                None => {
                    let def = MedicineDefinition::simple(&batch.medicine_name, Some(batch.id.clone()));
                    db.insert_medicine_definition(&def)?;
                }
            }
            Ok::<_, LedgerError>(())
        })?;

        info!(
            batch_id = %batch.id,
            medicine = %batch.medicine_name,
            received = batch.received_qty_boxes,
            "Batch received"
        );
        Ok(batch)
    }

    /// Edit batch metadata. A rename carries over to the bound simple medicine.
    pub fn update_batch_details(
        &self,
        batch_id: &str,
        update: &BatchUpdate,
    ) -> LedgerResult<InventoryBatch> {
        let medicine_name = update.medicine_name.trim();
        if medicine_name.is_empty() {
            return Err(LedgerError::InvalidInput("Medicine name is required".into()));
        }
        if update.received_qty_boxes < 0 {
            return Err(LedgerError::InvalidQuantity(update.received_qty_boxes));
        }

        self.run_locked(
            |db| {
                db.get_on_hand(batch_id)?
                    .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))?;
                Ok(SingleBatch(batch_id.to_string()))
            },
            |db, _| {
                let before = db
                    .get_batch(batch_id)?
                    .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))?;
                let update = BatchUpdate {
                    medicine_name: medicine_name.to_string(),
                    ..update.clone()
                };
                db.update_batch_details(batch_id, &update)?;
                if before.medicine_name != update.medicine_name {
                    let renamed = db.rename_definitions_bound_to(batch_id, &update.medicine_name)?;
                    info!(
                        batch_id,
                        from = %before.medicine_name,
                        to = %update.medicine_name,
                        renamed,
                        "Batch medicine renamed"
                    );
                }
                db.get_batch(batch_id)?
                    .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))
            },
        )
    }

    /// Remove a batch. Simple medicines bound to it become unbound;
    /// transaction history is kept.
    pub fn delete_batch(&self, batch_id: &str) -> LedgerResult<usize> {
        self.run_locked(
            |db| {
                db.get_on_hand(batch_id)?
                    .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))?;
                Ok(SingleBatch(batch_id.to_string()))
            },
            |db, _| {
                let detached = db.detach_batch_references(batch_id)?;
                db.delete_batch_row(batch_id)?;
                info!(batch_id, detached, "Batch deleted");
                Ok(detached)
            },
        )
    }

    pub fn get_batch(&self, batch_id: &str) -> LedgerResult<InventoryBatch> {
        self.db
            .get_batch(batch_id)?
            .ok_or_else(|| LedgerError::BatchNotFound(batch_id.to_string()))
    }

    /// All batches, newest first.
    pub fn list_batches(&self) -> LedgerResult<Vec<InventoryBatch>> {
        Ok(self.db.list_batches()?)
    }

    /// Batches with fewer boxes than the low-stock threshold.
    pub fn list_low_stock_batches(
        &self,
        thresholds: &StockThresholds,
    ) -> LedgerResult<Vec<InventoryBatch>> {
        Ok(self.db.list_batches_below(thresholds.low)?)
    }

    /// Every batch with its stock and expiry classification as of `today`.
    pub fn batch_overview(
        &self,
        thresholds: &StockThresholds,
        today: NaiveDate,
    ) -> LedgerResult<Vec<BatchOverview>> {
        Ok(self
            .db
            .list_batches()?
            .into_iter()
            .map(|batch| BatchOverview {
                stock_status: batch.stock_status(thresholds),
                expiry_status: batch.expiry_status(today, thresholds),
                batch,
            })
            .collect())
    }

    // =====================================================================
    // Medicine definitions
    // =====================================================================

    /// Save a new predefined combination.
    ///
    /// Repeated base medicines are merged by summing their dosages.
    pub fn save_combination_definition(
        &self,
        input: CombinationInput,
    ) -> LedgerResult<MedicineDefinition> {
        let (descriptor, description) = validate_combination(&input)?;
        let mut def = MedicineDefinition::combination(input.name.trim(), descriptor);
        def.description = Some(description);
        def.tags = input.tags;

        self.db.insert_medicine_definition(&def)?;
        info!(
            medicine_definition_id = %def.id,
            name = %def.name,
            components = def.component_names().len(),
            "Combination saved"
        );
        Ok(def)
    }

    /// Save a combination from its text encoding, kept as the name.
    pub fn define_combination_from_text(
        &self,
        text: &str,
        tags: Vec<String>,
        description: Option<String>,
    ) -> LedgerResult<MedicineDefinition> {
        let parsed = codec::parse_strict(text)?;
        self.save_combination_definition(CombinationInput {
            name: text.trim().to_string(),
            components: parsed.components,
            tags,
            description,
        })
    }

    /// Replace the name, components, tags and description of a combination.
    pub fn update_combination_definition(
        &self,
        definition_id: &str,
        input: CombinationInput,
    ) -> LedgerResult<MedicineDefinition> {
        let mut def = self.get_medicine_definition(definition_id)?;
        if !def.is_combination() {
            return Err(LedgerError::InvalidInput(format!(
                "{} is not a combination",
                definition_id
            )));
        }
        let (descriptor, description) = validate_combination(&input)?;
        def.name = input.name.trim().to_string();
        def.kind = MedicineKind::Combination {
            components: descriptor.merged(),
        };
        def.description = Some(description);
        def.tags = input.tags;

        if !self.db.update_medicine_definition(&def)? {
            return Err(LedgerError::MedicineNotFound(definition_id.to_string()));
        }
        info!(medicine_definition_id = %def.id, name = %def.name, "Combination updated");
        Ok(def)
    }

    /// Delete a medicine definition. Transactions that used it are kept.
    pub fn delete_medicine_definition(&self, definition_id: &str) -> LedgerResult<()> {
        if !self.db.delete_medicine_definition_row(definition_id)? {
            return Err(LedgerError::MedicineNotFound(definition_id.to_string()));
        }
        info!(medicine_definition_id = %definition_id, "Medicine definition deleted");
        Ok(())
    }

    pub fn get_medicine_definition(&self, definition_id: &str) -> LedgerResult<MedicineDefinition> {
        self.db
            .get_medicine_definition(definition_id)?
            .ok_or_else(|| LedgerError::MedicineNotFound(definition_id.to_string()))
    }

    /// Predefined combinations, by name.
    pub fn list_combinations(&self) -> LedgerResult<Vec<MedicineDefinition>> {
        Ok(self.db.list_combinations()?)
    }
}

/// Check a combination and work out its description.
fn validate_combination(
    input: &CombinationInput,
) -> LedgerResult<(CombinationDescriptor, String)> {
    if input.name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("Combination name is required".into()));
    }
    if input.components.is_empty() {
        return Err(ParseError::Empty.into());
    }
    if let Some(bad) = input
        .components
        .iter()
        .find(|c| !codec::is_medicine_name(&c.base_medicine_name))
    {
        return Err(ParseError::MalformedSegment(bad.base_medicine_name.clone()).into());
    }

    let descriptor = CombinationDescriptor::new(input.components.clone()).try_merged()?;
    let description = match input.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => descriptor.describe(),
    };
    Ok((descriptor, description))
}
