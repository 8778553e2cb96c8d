use crate::error::Result;
use crate::models::{Role, User};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs::create_dir_all;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cyber_incidents (
    incident_id INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL,
    severity TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS datasets_metadata (
    dataset_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    rows INTEGER NOT NULL,
    columns INTEGER NOT NULL,
    uploaded_by TEXT NOT NULL,
    upload_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS it_tickets (
    ticket_id INTEGER PRIMARY KEY,
    priority TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    assigned_to TEXT NOT NULL,
    created_at TEXT NOT NULL,
    resolution_time_hours REAL
);
"#;

/// Local SQLite store holding users and the three domain tables
///
/// Record operations live in [`crate::records`]; this type owns the
/// connection, the schema and the user table.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open or create the database file and make sure every table exists
    ///
    /// The parent directory is created when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("opened database at {}", path.display());

        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database with the full schema, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert a new user and return its row id
    pub fn add_user(&self, username: &str, password_hash: &str, role: Role) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
            params![username, password_hash, role.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Look a user up by username
    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
                params![username],
                |row| {
                    let role: String = row.get(3)?;
                    let role = role.parse::<Role>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?;
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        role,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directory_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DATA").join("platform.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        for table in ["cyber_incidents", "datasets_metadata", "it_tickets", "users"] {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }
    }

    #[test]
    fn reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.db");

        Database::open(&path)
            .unwrap()
            .add_user("alice", "hash", Role::ItAdmin)
            .unwrap();

        let db = Database::open(&path).unwrap();
        let alice = db.get_user("alice").unwrap().unwrap();
        assert_eq!(alice.role, Role::ItAdmin);
    }

    #[test]
    fn user_lookup() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.user_exists("bob").unwrap());
        assert!(db.get_user("bob").unwrap().is_none());

        let id = db.add_user("bob", "$argon2id$stub", Role::DataScientist).unwrap();
        assert!(id > 0);
        assert!(db.user_exists("bob").unwrap());

        let bob = db.get_user("bob").unwrap().unwrap();
        assert_eq!(bob.id, id);
        assert_eq!(bob.password_hash, "$argon2id$stub");
        assert_eq!(bob.role, Role::DataScientist);
    }

    #[test]
    fn usernames_are_unique() {
        let db = Database::open_in_memory().unwrap();
        db.add_user("carol", "h1", Role::User).unwrap();
        assert!(db.add_user("carol", "h2", Role::User).is_err());
    }

    #[test]
    fn unknown_stored_role_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO users (username, password_hash, role) VALUES ('dave', 'h', 'root')",
                [],
            )
            .unwrap();
        assert!(db.get_user("dave").is_err());
    }
}
