//! CRUD operations for the three domain tables, plus the seed fallback used
//! when a table is empty or cannot be read.

use crate::database::Database;
use crate::error::{ArgusError, Result};
use crate::loader::{SeedFiles, read_seed};
use crate::models::{
    CyberIncident, DatasetMetadata, DatasetUpdate, IncidentUpdate, ItTicket, Tabular,
    TicketUpdate,
};
use log::{info, warn};
use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use std::path::Path;

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<CyberIncident> {
    Ok(CyberIncident {
        incident_id: row.get(0)?,
        timestamp: row.get(1)?,
        severity: row.get(2)?,
        category: row.get(3)?,
        status: row.get(4)?,
        description: row.get(5)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<ItTicket> {
    Ok(ItTicket {
        ticket_id: row.get(0)?,
        priority: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        assigned_to: row.get(4)?,
        created_at: row.get(5)?,
        resolution_time_hours: row.get(6)?,
    })
}

fn dataset_from_row(row: &Row<'_>) -> rusqlite::Result<DatasetMetadata> {
    Ok(DatasetMetadata {
        dataset_id: row.get(0)?,
        name: row.get(1)?,
        rows: row.get(2)?,
        columns: row.get(3)?,
        uploaded_by: row.get(4)?,
        upload_date: row.get(5)?,
    })
}

/// Map a primary key collision to `Duplicate`, pass everything else through
fn insert_error(err: rusqlite::Error, kind: &'static str, id: i64) -> ArgusError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            ArgusError::Duplicate { kind, id }
        }
        _ => ArgusError::Database(err),
    }
}

fn expect_changed(changed: usize, kind: &'static str, id: i64) -> Result<()> {
    if changed == 0 {
        return Err(ArgusError::NotFound { kind, id });
    }
    Ok(())
}

impl Database {
    // Cyber incidents

    pub fn list_incidents(&self) -> Result<Vec<CyberIncident>> {
        let mut stmt = self.conn.prepare(
            "SELECT incident_id, timestamp, severity, category, status, description \
             FROM cyber_incidents ORDER BY incident_id",
        )?;
        let rows = stmt.query_map([], incident_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_incident(&self, incident_id: i64) -> Result<Option<CyberIncident>> {
        let incident = self
            .conn
            .query_row(
                "SELECT incident_id, timestamp, severity, category, status, description \
                 FROM cyber_incidents WHERE incident_id = ?1",
                params![incident_id],
                incident_from_row,
            )
            .optional()?;
        Ok(incident)
    }

    pub fn create_incident(&self, incident: &CyberIncident) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO cyber_incidents VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    incident.incident_id,
                    incident.timestamp,
                    incident.severity,
                    incident.category,
                    incident.status,
                    incident.description,
                ],
            )
            .map_err(|e| insert_error(e, CyberIncident::KIND, incident.incident_id))?;
        Ok(())
    }

    pub fn update_incident(&self, incident_id: i64, update: &IncidentUpdate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cyber_incidents SET status = ?1, severity = ?2 WHERE incident_id = ?3",
            params![update.status, update.severity, incident_id],
        )?;
        expect_changed(changed, CyberIncident::KIND, incident_id)
    }

    pub fn delete_incident(&self, incident_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM cyber_incidents WHERE incident_id = ?1",
            params![incident_id],
        )?;
        expect_changed(changed, CyberIncident::KIND, incident_id)
    }

    fn store_incidents(&mut self, incidents: &[CyberIncident]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO cyber_incidents VALUES (?1, ?2, ?3, ?4, ?5, ?6)")?;
            for i in incidents {
                stmt.execute(params![
                    i.incident_id,
                    i.timestamp,
                    i.severity,
                    i.category,
                    i.status,
                    i.description
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // IT tickets

    pub fn list_tickets(&self) -> Result<Vec<ItTicket>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticket_id, priority, description, status, assigned_to, created_at, \
             resolution_time_hours FROM it_tickets ORDER BY ticket_id",
        )?;
        let rows = stmt.query_map([], ticket_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn create_ticket(&self, ticket: &ItTicket) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO it_tickets VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ticket.ticket_id,
                    ticket.priority,
                    ticket.description,
                    ticket.status,
                    ticket.assigned_to,
                    ticket.created_at,
                    ticket.resolution_time_hours,
                ],
            )
            .map_err(|e| insert_error(e, ItTicket::KIND, ticket.ticket_id))?;
        Ok(())
    }

    pub fn update_ticket(&self, ticket_id: i64, update: &TicketUpdate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE it_tickets SET status = ?1, priority = ?2, resolution_time_hours = ?3 \
             WHERE ticket_id = ?4",
            params![
                update.status,
                update.priority,
                update.resolution_time_hours,
                ticket_id
            ],
        )?;
        expect_changed(changed, ItTicket::KIND, ticket_id)
    }

    pub fn delete_ticket(&self, ticket_id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM it_tickets WHERE ticket_id = ?1", params![ticket_id])?;
        expect_changed(changed, ItTicket::KIND, ticket_id)
    }

    fn store_tickets(&mut self, tickets: &[ItTicket]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO it_tickets VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)")?;
            for t in tickets {
                stmt.execute(params![
                    t.ticket_id,
                    t.priority,
                    t.description,
                    t.status,
                    t.assigned_to,
                    t.created_at,
                    t.resolution_time_hours
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // Dataset metadata

    pub fn list_datasets(&self) -> Result<Vec<DatasetMetadata>> {
        let mut stmt = self.conn.prepare(
            "SELECT dataset_id, name, rows, columns, uploaded_by, upload_date \
             FROM datasets_metadata ORDER BY dataset_id",
        )?;
        let rows = stmt.query_map([], dataset_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn create_dataset(&self, dataset: &DatasetMetadata) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO datasets_metadata VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    dataset.dataset_id,
                    dataset.name,
                    dataset.rows,
                    dataset.columns,
                    dataset.uploaded_by,
                    dataset.upload_date,
                ],
            )
            .map_err(|e| insert_error(e, DatasetMetadata::KIND, dataset.dataset_id))?;
        Ok(())
    }

    pub fn update_dataset(&self, dataset_id: i64, update: &DatasetUpdate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE datasets_metadata SET name = ?1, rows = ?2, columns = ?3 WHERE dataset_id = ?4",
            params![update.name, update.rows, update.columns, dataset_id],
        )?;
        expect_changed(changed, DatasetMetadata::KIND, dataset_id)
    }

    pub fn delete_dataset(&self, dataset_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM datasets_metadata WHERE dataset_id = ?1",
            params![dataset_id],
        )?;
        expect_changed(changed, DatasetMetadata::KIND, dataset_id)
    }

    fn store_datasets(&mut self, datasets: &[DatasetMetadata]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx
                .prepare("INSERT OR REPLACE INTO datasets_metadata VALUES (?1, ?2, ?3, ?4, ?5, ?6)")?;
            for d in datasets {
                stmt.execute(params![
                    d.dataset_id,
                    d.name,
                    d.rows,
                    d.columns,
                    d.uploaded_by,
                    d.upload_date
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Shared body of the `load_*` functions
///
/// A non-empty table wins. An empty table is populated from the seed file.
/// A table that cannot be read falls back to the seed file too; storing
/// the seed is best-effort in that case.
fn load_or_seed<T, S>(table: &str, listed: Result<Vec<T>>, seed: &Path, store: S) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    S: FnOnce(&[T]) -> Result<()>,
{
    match listed {
        Ok(records) if !records.is_empty() => Ok(records),
        Ok(_) => {
            let records = read_seed(seed)?;
            if !records.is_empty() {
                store(&records)?;
                info!("seeded {} with {} rows from {}", table, records.len(), seed.display());
            }
            Ok(records)
        }
        Err(e) => {
            warn!("reading {} failed ({}), falling back to {}", table, e, seed.display());
            let records = read_seed(seed)?;
            if let Err(e) = store(&records) {
                warn!("could not store seed rows into {}: {}", table, e);
            }
            Ok(records)
        }
    }
}

/// All cyber incidents, seeding the table from CSV when it is empty
pub fn load_cyber_incidents(db: &mut Database, seeds: &SeedFiles) -> Result<Vec<CyberIncident>> {
    let listed = db.list_incidents();
    load_or_seed("cyber_incidents", listed, &seeds.incidents(), |rows| {
        db.store_incidents(rows)
    })
}

/// All IT tickets, seeding the table from CSV when it is empty
pub fn load_it_tickets(db: &mut Database, seeds: &SeedFiles) -> Result<Vec<ItTicket>> {
    let listed = db.list_tickets();
    load_or_seed("it_tickets", listed, &seeds.tickets(), |rows| db.store_tickets(rows))
}

/// All dataset metadata, seeding the table from CSV when it is empty
pub fn load_datasets_metadata(
    db: &mut Database,
    seeds: &SeedFiles,
) -> Result<Vec<DatasetMetadata>> {
    let listed = db.list_datasets();
    load_or_seed("datasets_metadata", listed, &seeds.datasets(), |rows| {
        db.store_datasets(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn incident(id: i64, category: &str, status: &str) -> CyberIncident {
        CyberIncident {
            incident_id: id,
            timestamp: "2024-11-01 09:00:00".into(),
            severity: "High".into(),
            category: category.into(),
            status: status.into(),
            description: Some(format!("incident {}", id)),
        }
    }

    fn ticket(id: i64) -> ItTicket {
        ItTicket {
            ticket_id: id,
            priority: "Medium".into(),
            description: "Laptop will not boot".into(),
            status: "Open".into(),
            assigned_to: "IT_Support_C".into(),
            created_at: "2024-11-03 14:00:00".into(),
            resolution_time_hours: Some(4.0),
        }
    }

    fn dataset(id: i64, rows: i64) -> DatasetMetadata {
        DatasetMetadata {
            dataset_id: id,
            name: format!("set_{}", id),
            rows,
            columns: 12,
            uploaded_by: "data_scientist".into(),
            upload_date: "2024-10-30".into(),
        }
    }

    #[test]
    fn incident_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        db.create_incident(&incident(2, "Malware", "Open")).unwrap();
        db.create_incident(&incident(1, "Phishing", "Open")).unwrap();

        let listed = db.list_incidents().unwrap();
        assert_eq!(listed.iter().map(|i| i.incident_id).collect::<Vec<_>>(), [1, 2]);

        let update = IncidentUpdate {
            status: "Resolved".into(),
            severity: "Critical".into(),
        };
        db.update_incident(1, &update).unwrap();
        let updated = db.get_incident(1).unwrap().unwrap();
        assert_eq!(updated.status, "Resolved");
        assert_eq!(updated.severity, "Critical");
        assert_eq!(updated.category, "Phishing");

        db.delete_incident(2).unwrap();
        assert_eq!(db.list_incidents().unwrap().len(), 1);
    }

    #[test]
    fn colliding_ids_are_reported_not_overwritten() {
        let db = Database::open_in_memory().unwrap();
        db.create_incident(&incident(5, "Phishing", "Open")).unwrap();

        let err = db.create_incident(&incident(5, "DDoS", "Closed")).unwrap_err();
        assert!(matches!(err, ArgusError::Duplicate { kind: "Incident", id: 5 }));
        assert_eq!(err.to_string(), "Incident 5 already exists");
        assert_eq!(db.get_incident(5).unwrap().unwrap().category, "Phishing");
    }

    #[test]
    fn missing_rows_are_not_found() {
        let db = Database::open_in_memory().unwrap();
        let update = TicketUpdate {
            status: "Resolved".into(),
            priority: "Low".into(),
            resolution_time_hours: 1.0,
        };
        assert!(matches!(
            db.update_ticket(42, &update),
            Err(ArgusError::NotFound { kind: "Ticket", id: 42 })
        ));
        assert!(matches!(
            db.delete_dataset(42),
            Err(ArgusError::NotFound { kind: "Dataset", id: 42 })
        ));
    }

    #[test]
    fn ticket_update_changes_status_priority_and_resolution() {
        let db = Database::open_in_memory().unwrap();
        db.create_ticket(&ticket(10)).unwrap();
        db.update_ticket(
            10,
            &TicketUpdate {
                status: "Waiting for User".into(),
                priority: "Critical".into(),
                resolution_time_hours: 12.5,
            },
        )
        .unwrap();

        let t = &db.list_tickets().unwrap()[0];
        assert_eq!(t.status, "Waiting for User");
        assert_eq!(t.priority, "Critical");
        assert_eq!(t.resolution_time_hours, Some(12.5));
        assert_eq!(t.assigned_to, "IT_Support_C");

        db.delete_ticket(10).unwrap();
        assert!(db.list_tickets().unwrap().is_empty());
    }

    #[test]
    fn dataset_update_changes_name_and_shape() {
        let db = Database::open_in_memory().unwrap();
        db.create_dataset(&dataset(1, 500)).unwrap();
        db.update_dataset(
            1,
            &DatasetUpdate {
                name: "renamed".into(),
                rows: 900,
                columns: 3,
            },
        )
        .unwrap();

        let d = &db.list_datasets().unwrap()[0];
        assert_eq!((d.name.as_str(), d.rows, d.columns), ("renamed", 900, 3));
        assert_eq!(d.uploaded_by, "data_scientist");
    }

    #[test]
    fn empty_table_is_seeded_once() {
        let dir = tempfile::tempdir().unwrap();
        let seeds = SeedFiles::new(dir.path());
        fs::write(
            seeds.datasets(),
            "dataset_id,name,rows,columns,uploaded_by,upload_date\n\
             1,Customer Churn,120000,25,data_scientist,2024-09-01\n\
             2,Threat Intel,5000,8,cyber_admin,2024-09-15\n",
        )
        .unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let loaded = load_datasets_metadata(&mut db, &seeds).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(db.list_datasets().unwrap(), loaded);

        // once populated, the table wins over the seed file
        db.delete_dataset(2).unwrap();
        let reloaded = load_datasets_metadata(&mut db, &seeds).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].name, "Customer Churn");
    }

    #[test]
    fn unreadable_table_falls_back_to_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seeds = SeedFiles::new(dir.path());
        fs::write(
            seeds.incidents(),
            "incident_id,timestamp,severity,category,status,description\n\
             1,2024-11-01 09:00:00,High,Phishing,Open,Spoofed invoice\n",
        )
        .unwrap();

        let mut db = Database::open_in_memory().unwrap();
        db.conn.execute_batch("DROP TABLE cyber_incidents").unwrap();

        let loaded = load_cyber_incidents(&mut db, &seeds).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].category, "Phishing");
    }

    #[test]
    fn missing_seed_leaves_table_empty() {
        let dir = tempfile::tempdir().unwrap();
        let seeds = SeedFiles::new(dir.path());
        let mut db = Database::open_in_memory().unwrap();
        assert!(load_it_tickets(&mut db, &seeds).unwrap().is_empty());
    }
}
