//! Medicine definition database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::codec::LegacyFields;
use crate::models::{CombinationComponent, CombinationDescriptor, MedicineDefinition, MedicineKind};

const DEFINITION_COLUMNS: &str = r#"
    id, name, description, kind, inventory_batch_id, components,
    medicines_included, medicine_dosages, tags, created_at
"#;

impl Database {
    /// Insert a new medicine definition.
    pub fn insert_medicine_definition(&self, def: &MedicineDefinition) -> DbResult<()> {
        let stored = StoredKind::from_definition(def)?;
        let tags_json = serde_json::to_string(&def.tags)?;

        self.conn.execute(
            r#"
            INSERT INTO medicine_definitions (
                id, name, description, kind, inventory_batch_id, components,
                medicines_included, medicine_dosages, dosage_pattern, tags, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                def.id,
                def.name,
                def.description,
                stored.kind,
                def.inventory_batch_id(),
                stored.components_json,
                stored.legacy.as_ref().map(|l| &l.medicines_included),
                stored.legacy.as_ref().map(|l| &l.medicine_dosages),
                stored.legacy.as_ref().and_then(|l| l.dosage_pattern.as_ref()),
                tags_json,
                def.created_at,
            ],
        )?;
        Ok(())
    }

    /// Update name, description, tags and components of a definition.
    ///
    /// The kind of a definition never changes.
    pub fn update_medicine_definition(&self, def: &MedicineDefinition) -> DbResult<bool> {
        let stored = StoredKind::from_definition(def)?;
        let tags_json = serde_json::to_string(&def.tags)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE medicine_definitions SET
                name = ?2,
                description = ?3,
                components = ?4,
                medicines_included = ?5,
                medicine_dosages = ?6,
                dosage_pattern = ?7,
                tags = ?8
            WHERE id = ?1 AND kind = ?9
            "#,
            params![
                def.id,
                def.name,
                def.description,
                stored.components_json,
                stored.legacy.as_ref().map(|l| &l.medicines_included),
                stored.legacy.as_ref().map(|l| &l.medicine_dosages),
                stored.legacy.as_ref().and_then(|l| l.dosage_pattern.as_ref()),
                tags_json,
                stored.kind,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a definition by ID.
    pub fn get_medicine_definition(&self, id: &str) -> DbResult<Option<MedicineDefinition>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM medicine_definitions WHERE id = ?", DEFINITION_COLUMNS),
                [id],
                DefinitionRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Find the simple definition for a base medicine name.
    pub fn find_simple_definition(&self, name: &str) -> DbResult<Option<MedicineDefinition>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM medicine_definitions
                    WHERE name = ? AND kind = 'simple'
                    ORDER BY created_at ASC, rowid ASC
                    LIMIT 1
                    "#,
                    DEFINITION_COLUMNS
                ),
                [name],
                DefinitionRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all combination definitions, by name.
    pub fn list_combinations(&self) -> DbResult<Vec<MedicineDefinition>> {
        self.query_definitions(&format!(
            "SELECT {} FROM medicine_definitions WHERE kind = 'combination' ORDER BY name",
            DEFINITION_COLUMNS
        ))
    }

    /// List every medicine definition, by name.
    pub fn list_medicine_definitions(&self) -> DbResult<Vec<MedicineDefinition>> {
        self.query_definitions(&format!(
            "SELECT {} FROM medicine_definitions ORDER BY name",
            DEFINITION_COLUMNS
        ))
    }

    fn query_definitions(&self, sql: &str) -> DbResult<Vec<MedicineDefinition>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], DefinitionRow::from_row)?;

        let mut defs = Vec::new();
        for row in rows {
            defs.push(row?.try_into()?);
        }
        Ok(defs)
    }

    /// Point a simple definition at a batch.
    pub(crate) fn bind_simple_definition(&self, def_id: &str, batch_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE medicine_definitions SET inventory_batch_id = ?2 WHERE id = ?1 AND kind = 'simple'",
            params![def_id, batch_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Clear every definition's reference to a batch. Returns how many were detached.
    pub(crate) fn detach_batch_references(&self, batch_id: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE medicine_definitions SET inventory_batch_id = NULL WHERE inventory_batch_id = ?",
            [batch_id],
        )?;
        Ok(rows_affected)
    }

    /// Rename the simple definitions bound to a batch.
    pub(crate) fn rename_definitions_bound_to(&self, batch_id: &str, name: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE medicine_definitions SET name = ?2 WHERE inventory_batch_id = ?1",
            params![batch_id, name],
        )?;
        Ok(rows_affected)
    }

    /// Delete a definition row.
    pub(crate) fn delete_medicine_definition_row(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM medicine_definitions WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

/// Column values derived from a definition's kind.
struct StoredKind {
    kind: &'static str,
    components_json: String,
    legacy: Option<LegacyFields>,
}

impl StoredKind {
    fn from_definition(def: &MedicineDefinition) -> DbResult<Self> {
        Ok(match &def.kind {
            MedicineKind::Simple { .. } => Self {
                kind: "simple",
                components_json: "[]".to_string(),
                legacy: None,
            },
            MedicineKind::Combination { components } => Self {
                kind: "combination",
                components_json: serde_json::to_string(&components.components)?,
                legacy: Some(LegacyFields::from_descriptor(components)),
            },
        })
    }
}

/// Intermediate row struct for database mapping.
struct DefinitionRow {
    id: String,
    name: String,
    description: Option<String>,
    kind: String,
    inventory_batch_id: Option<String>,
    components: String,
    medicines_included: Option<String>,
    medicine_dosages: Option<String>,
    tags: String,
    created_at: String,
}

impl DefinitionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            kind: row.get(3)?,
            inventory_batch_id: row.get(4)?,
            components: row.get(5)?,
            medicines_included: row.get(6)?,
            medicine_dosages: row.get(7)?,
            tags: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl TryFrom<DefinitionRow> for MedicineDefinition {
    type Error = DbError;

    fn try_from(row: DefinitionRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "simple" => MedicineKind::Simple {
                inventory_batch_id: row.inventory_batch_id,
            },
            "combination" => {
                let components: Vec<CombinationComponent> = serde_json::from_str(&row.components)?;
                let mut descriptor = CombinationDescriptor::new(components);
                // Older rows carry only the derived columns.
                if descriptor.is_empty() {
                    if let Some(included) = row.medicines_included {
                        let legacy = LegacyFields {
                            medicines_included: included,
                            medicine_dosages: row.medicine_dosages.unwrap_or_default(),
                            dosage_pattern: None,
                        };
                        descriptor = legacy
                            .to_descriptor()
                            .map_err(|e| DbError::Constraint(e.to_string()))?;
                    }
                }
                MedicineKind::Combination {
                    components: descriptor,
                }
            }
            other => {
                return Err(DbError::Constraint(format!(
                    "Invalid medicine kind: {}",
                    other
                )))
            }
        };

        Ok(MedicineDefinition {
            id: row.id,
            name: row.name,
            description: row.description,
            tags: serde_json::from_str(&row.tags)?,
            kind,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DosagePattern, NewBatch};

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn combination() -> MedicineDefinition {
        let mut def = MedicineDefinition::combination(
            "COBECWT (1+0+0) + COBECGT (0+0+1)",
            CombinationDescriptor::new(vec![
                CombinationComponent::new("COBECWT", DosagePattern::new(1, 0, 0)),
                CombinationComponent::new("COBECGT", DosagePattern::new(0, 0, 1)),
            ]),
        );
        def.tags = vec!["weight-loss".into()];
        def
    }

    #[test]
    fn test_insert_and_get_combination() {
        let db = setup_db();
        let def = combination();
        db.insert_medicine_definition(&def).unwrap();

        let loaded = db.get_medicine_definition(&def.id).unwrap().unwrap();
        assert_eq!(loaded, def);

        let (included, pattern): (String, String) = db
            .conn()
            .query_row(
                "SELECT medicines_included, dosage_pattern FROM medicine_definitions WHERE id = ?",
                [&def.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(included, r#"["COBECWT","COBECGT"]"#);
        assert_eq!(pattern, "(1+0+0)");
    }

    #[test]
    fn test_legacy_row_without_components() {
        let db = setup_db();
        db.conn()
            .execute(
                r#"
                INSERT INTO medicine_definitions (
                    id, name, kind, components, medicines_included, medicine_dosages, created_at
                ) VALUES ('legacy', 'COBECYT(1+0+0) + COBECPT(0+0+1)', 'combination', '[]',
                          '["COBECYT","COBECPT"]', '{"COBECYT":"1+0+0","COBECPT":"0+0+1"}', 'then')
                "#,
                [],
            )
            .unwrap();

        let loaded = db.get_medicine_definition("legacy").unwrap().unwrap();
        let MedicineKind::Combination { components } = &loaded.kind else {
            panic!("expected combination");
        };
        assert_eq!(components.names(), vec!["COBECYT", "COBECPT"]);
        assert_eq!(components.components[1].dosage, DosagePattern::new(0, 0, 1));
    }

    #[test]
    fn test_bind_detach_and_rename() {
        let db = setup_db();
        let batch = NewBatch::new("COBECWT", "B-001", 10).into_batch();
        db.insert_batch(&batch).unwrap();
        let def = MedicineDefinition::simple("COBECWT", None);
        db.insert_medicine_definition(&def).unwrap();

        assert!(db.bind_simple_definition(&def.id, &batch.id).unwrap());
        let found = db.find_simple_definition("COBECWT").unwrap().unwrap();
        assert_eq!(found.inventory_batch_id(), Some(batch.id.as_str()));

        assert_eq!(db.rename_definitions_bound_to(&batch.id, "COBECWT-F").unwrap(), 1);
        assert!(db.find_simple_definition("COBECWT").unwrap().is_none());

        // Bound batches cannot be removed.
        assert!(db.delete_batch_row(&batch.id).is_err());
        assert_eq!(db.detach_batch_references(&batch.id).unwrap(), 1);
        assert!(db.delete_batch_row(&batch.id).unwrap());
    }

    #[test]
    fn test_update_keeps_kind() {
        let db = setup_db();
        let mut def = combination();
        db.insert_medicine_definition(&def).unwrap();

        def.description = Some("Morning and night".into());
        assert!(db.update_medicine_definition(&def).unwrap());

        let simple = MedicineDefinition {
            id: def.id.clone(),
            ..MedicineDefinition::simple("COBECWT", None)
        };
        assert!(!db.update_medicine_definition(&simple).unwrap());
    }

    #[test]
    fn test_list_combinations() {
        let db = setup_db();
        db.insert_medicine_definition(&combination()).unwrap();
        db.insert_medicine_definition(&MedicineDefinition::simple("COBECWT", None))
            .unwrap();

        assert_eq!(db.list_combinations().unwrap().len(), 1);
        assert_eq!(db.list_medicine_definitions().unwrap().len(), 2);
        assert!(db.delete_medicine_definition_row(&db.list_combinations().unwrap()[0].id).unwrap());
        assert!(db.list_combinations().unwrap().is_empty());
    }
}
