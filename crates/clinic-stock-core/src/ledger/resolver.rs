//! Batch resolution for medicine definitions.

use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::warn;

use super::{LedgerError, LedgerResult};
use crate::db::{Database, DbResult};
use crate::models::{MedicineDefinition, MedicineKind};

/// Minimum similarity for a medicine name suggestion.
const MIN_SUGGESTION_SCORE: f64 = 0.75;

/// Picks the batch a base medicine name draws stock from.
pub trait BatchResolver {
    /// Batch to use for `medicine_name` as of `as_of` (RFC 3339), if any.
    fn resolve(&self, db: &Database, medicine_name: &str, as_of: &str) -> DbResult<Option<String>>;
}

/// The most recently created batch with a matching name wins.
///
/// Older batches of the same medicine are never touched, even while they
/// still hold stock; that case is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestBatchResolver;

impl BatchResolver for LatestBatchResolver {
    fn resolve(&self, db: &Database, medicine_name: &str, as_of: &str) -> DbResult<Option<String>> {
        let Some(batch) = db.latest_batch_for_name(medicine_name, as_of)? else {
            return Ok(None);
        };
        let bypassed = db.count_other_stocked_batches(medicine_name, &batch.id)?;
        if bypassed > 0 {
            warn!(
                medicine = medicine_name,
                batch_id = %batch.id,
                bypassed,
                "Older batches with stock are bypassed by newest-batch resolution"
            );
        }
        Ok(Some(batch.id))
    }
}

impl<F> BatchResolver for F
where
    F: Fn(&Database, &str, &str) -> DbResult<Option<String>>,
{
    fn resolve(&self, db: &Database, medicine_name: &str, as_of: &str) -> DbResult<Option<String>> {
        self(db, medicine_name, as_of)
    }
}

/// A combination component (or unbound simple medicine) with no stock effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedComponent {
    pub medicine_name: String,
    /// Closest existing batch medicine name, if any is similar enough
    pub suggestion: Option<String>,
}

/// Batches a medicine definition draws from at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub definition_id: String,
    /// Distinct batch IDs in component order
    pub batch_ids: Vec<String>,
    pub skipped: Vec<SkippedComponent>,
}

/// Resolve the target batches of a medicine definition.
pub fn resolve_targets<R: BatchResolver + ?Sized>(
    db: &Database,
    resolver: &R,
    definition_id: &str,
    as_of: &str,
) -> LedgerResult<ResolvedTargets> {
    let def = db
        .get_medicine_definition(definition_id)?
        .ok_or_else(|| LedgerError::MedicineNotFound(definition_id.to_string()))?;
    resolve_definition(db, resolver, &def, as_of)
}

/// Resolve the target batches of an already loaded definition.
pub fn resolve_definition<R: BatchResolver + ?Sized>(
    db: &Database,
    resolver: &R,
    def: &MedicineDefinition,
    as_of: &str,
) -> LedgerResult<ResolvedTargets> {
    let mut targets = ResolvedTargets {
        definition_id: def.id.clone(),
        batch_ids: Vec::new(),
        skipped: Vec::new(),
    };

    match &def.kind {
        MedicineKind::Simple {
            inventory_batch_id: Some(batch_id),
        } => targets.batch_ids.push(batch_id.clone()),
        MedicineKind::Simple {
            inventory_batch_id: None,
        } => {
            warn!(medicine = %def.name, "Simple medicine has no bound batch; no stock effect");
            targets.skipped.push(SkippedComponent {
                medicine_name: def.name.clone(),
                suggestion: None,
            });
        }
        MedicineKind::Combination { .. } => {
            for name in def.component_names() {
                match resolver.resolve(db, &name, as_of)? {
                    Some(batch_id) => {
                        if !targets.batch_ids.contains(&batch_id) {
                            targets.batch_ids.push(batch_id);
                        }
                    }
                    None => {
                        let suggestion = suggest_medicine_name(db, &name)?;
                        warn!(
                            combination = %def.name,
                            component = %name,
                            suggestion = ?suggestion,
                            "Combination component has no batch; skipping"
                        );
                        targets.skipped.push(SkippedComponent {
                            medicine_name: name,
                            suggestion,
                        });
                    }
                }
            }
        }
    }
    Ok(targets)
}

/// Closest batch medicine name to `name`, for operator hints.
pub fn suggest_medicine_name(db: &Database, name: &str) -> DbResult<Option<String>> {
    let wanted = name.to_uppercase();
    let best = db
        .list_batch_medicine_names()?
        .into_iter()
        .map(|candidate| {
            let score = fuzzy_match(&wanted, &candidate.to_uppercase());
            (candidate, score)
        })
        .filter(|(_, score)| *score >= MIN_SUGGESTION_SCORE)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(best.map(|(candidate, _)| candidate))
}

/// Combined Jaro-Winkler and Levenshtein similarity.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        timestamp_now, CombinationComponent, CombinationDescriptor, DosagePattern, NewBatch,
    };

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_batch(db: &Database, name: &str, qty: i64) -> String {
        let batch = NewBatch::new(name, "B", qty).into_batch();
        db.insert_batch(&batch).unwrap();
        batch.id
    }

    fn combination(names: &[&str]) -> MedicineDefinition {
        MedicineDefinition::combination(
            names.join(" + "),
            CombinationDescriptor::new(
                names
                    .iter()
                    .map(|n| CombinationComponent::new(*n, DosagePattern::new(1, 0, 0)))
                    .collect(),
            ),
        )
    }

    #[test]
    fn test_latest_batch_resolver() {
        let db = setup_db();
        add_batch(&db, "COBECWT", 5);
        let newest = add_batch(&db, "COBECWT", 10);

        let resolved = LatestBatchResolver
            .resolve(&db, "COBECWT", &timestamp_now())
            .unwrap();
        assert_eq!(resolved, Some(newest));
        assert_eq!(
            LatestBatchResolver
                .resolve(&db, "SLIM-X", &timestamp_now())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_resolve_combination_skips_missing() {
        let db = setup_db();
        let wt = add_batch(&db, "COBECWT", 10);
        let def = combination(&["COBECWT", "COBECGX"]);
        add_batch(&db, "COBECGT", 10);

        let targets = resolve_definition(&db, &LatestBatchResolver, &def, &timestamp_now()).unwrap();
        assert_eq!(targets.batch_ids, vec![wt]);
        assert_eq!(
            targets.skipped,
            vec![SkippedComponent {
                medicine_name: "COBECGX".into(),
                suggestion: Some("COBECGT".into()),
            }]
        );
    }

    #[test]
    fn test_resolve_simple() {
        let db = setup_db();
        let bound = MedicineDefinition::simple("COBECWT", Some("batch-1".into()));
        let targets = resolve_definition(&db, &LatestBatchResolver, &bound, &timestamp_now()).unwrap();
        assert_eq!(targets.batch_ids, vec!["batch-1"]);

        let unbound = MedicineDefinition::simple("COBECWT", None);
        let targets = resolve_definition(&db, &LatestBatchResolver, &unbound, &timestamp_now()).unwrap();
        assert!(targets.batch_ids.is_empty());
        assert_eq!(targets.skipped.len(), 1);
    }

    #[test]
    fn test_custom_resolver_closure() {
        let db = setup_db();
        let pinned = |_: &Database, name: &str, _: &str| -> DbResult<Option<String>> {
            Ok(Some(format!("pinned-{}", name)))
        };
        let def = combination(&["A", "B"]);
        let targets = resolve_definition(&db, &pinned, &def, &timestamp_now()).unwrap();
        assert_eq!(targets.batch_ids, vec!["pinned-A", "pinned-B"]);
    }

    #[test]
    fn test_resolve_targets_missing_definition() {
        let db = setup_db();
        let err = resolve_targets(&db, &LatestBatchResolver, "nope", &timestamp_now()).unwrap_err();
        assert!(matches!(err, LedgerError::MedicineNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_no_suggestion_for_unrelated_name() {
        let db = setup_db();
        add_batch(&db, "COBECWT", 1);
        assert_eq!(suggest_medicine_name(&db, "PARACETAMOL").unwrap(), None);
        assert_eq!(
            suggest_medicine_name(&db, "cobecwt").unwrap(),
            Some("COBECWT".into())
        );
    }
}
