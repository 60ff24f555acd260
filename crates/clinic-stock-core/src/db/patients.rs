//! Patient and visit anchor operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::{Patient, Visit};

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (id, name, notes, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![patient.id, patient.name, patient.notes, patient.created_at],
        )?;
        Ok(())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                "SELECT id, name, notes, created_at FROM patients WHERE id = ?",
                [id],
                |row| {
                    Ok(Patient {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        notes: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Insert a new visit.
    pub fn insert_visit(&self, visit: &Visit) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO visits (id, patient_id, visit_date, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                visit.id,
                visit.patient_id,
                visit.visit_date,
                visit.notes,
                visit.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, id: &str) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                "SELECT id, patient_id, visit_date, notes, created_at FROM visits WHERE id = ?",
                [id],
                |row| {
                    Ok(Visit {
                        id: row.get(0)?,
                        patient_id: row.get(1)?,
                        visit_date: row.get(2)?,
                        notes: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// List a patient's visits, newest first.
    pub fn list_visits_for_patient(&self, patient_id: &str) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, patient_id, visit_date, notes, created_at
            FROM visits
            WHERE patient_id = ?
            ORDER BY visit_date DESC, created_at DESC
            "#,
        )?;

        let visits = stmt
            .query_map([patient_id], |row| {
                Ok(Visit {
                    id: row.get(0)?,
                    patient_id: row.get(1)?,
                    visit_date: row.get(2)?,
                    notes: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(visits)
    }

    /// Delete a visit row. Its transactions must already be gone.
    pub(crate) fn delete_visit_row(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM visits WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Delete a patient row. Visits and transactions must already be gone.
    pub(crate) fn delete_patient_row(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_patient_and_visits() {
        let db = setup_db();
        let patient = Patient::new("Ayesha Khan");
        db.insert_patient(&patient).unwrap();

        let first = Visit::new(&patient.id, "2025-01-10");
        let second = Visit::new(&patient.id, "2025-02-10");
        db.insert_visit(&first).unwrap();
        db.insert_visit(&second).unwrap();

        assert_eq!(db.get_patient(&patient.id).unwrap(), Some(patient.clone()));
        assert_eq!(db.get_visit(&first.id).unwrap(), Some(first.clone()));

        let visits = db.list_visits_for_patient(&patient.id).unwrap();
        assert_eq!(visits, vec![second, first]);
    }

    #[test]
    fn test_visit_requires_patient() {
        let db = setup_db();
        let visit = Visit::new("nobody", "2025-01-10");
        assert!(db.insert_visit(&visit).is_err());
    }

    #[test]
    fn test_patient_with_visits_cannot_be_deleted() {
        let db = setup_db();
        let patient = Patient::new("Bilal");
        db.insert_patient(&patient).unwrap();
        let visit = Visit::new(&patient.id, "2025-01-10");
        db.insert_visit(&visit).unwrap();

        assert!(db.delete_patient_row(&patient.id).is_err());
        assert!(db.delete_visit_row(&visit.id).unwrap());
        assert!(db.delete_patient_row(&patient.id).unwrap());
        assert!(db.get_patient(&patient.id).unwrap().is_none());
    }
}
