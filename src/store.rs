// src/store.rs
//
// SQLite-backed record store behind the admin collaborator's surface:
// insert, list (newest first), update plate, delete one, delete all, and a
// CSV materialization of the listing. Inserts are per-candidate and
// independent; the store relies on SQLite's own row-level atomicity for
// concurrent pipeline runs.

use crate::types::ViolationRecord;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const CSV_HEADER: &str = "ID, Date&Time(UTC), Violation Type, Fine Amount, Number Plate";

pub struct ViolationStore {
    conn: Connection,
}

impl ViolationStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening violation store {}", path.display()))?;
        Self::init_schema(&conn)?;
        info!("Violation store ready: {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS violations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_utc TEXT NOT NULL,
                file_path TEXT NOT NULL,
                violation_type TEXT NOT NULL,
                fine INTEGER NOT NULL,
                number_plate TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Insert one committed violation, stamped with the current UTC time.
    /// Returns the store-assigned id.
    pub fn insert(&self, file_path: &str, violation_type: &str, fine: i64) -> Result<i64> {
        let ts_utc = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        self.conn.execute(
            "INSERT INTO violations (ts_utc, file_path, violation_type, fine)
             VALUES (?1, ?2, ?3, ?4)",
            params![ts_utc, file_path, violation_type, fine],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All records, newest first. Ties on timestamp break by id so repeated
    /// calls return identical ordered output.
    pub fn list_all(&self) -> Result<Vec<ViolationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ts_utc, file_path, violation_type, fine, number_plate
             FROM violations ORDER BY ts_utc DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ViolationRecord {
                id: row.get(0)?,
                ts_utc: row.get(1)?,
                file_path: row.get(2)?,
                violation_type: row.get(3)?,
                fine: row.get(4)?,
                number_plate: row.get(5)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("listing violations")
    }

    /// Set or clear a record's number plate (empty plate stores NULL).
    /// Returns false when the id does not exist.
    pub fn update_plate(&self, id: i64, plate: &str) -> Result<bool> {
        let plate = plate.trim();
        let stored = if plate.is_empty() { None } else { Some(plate) };
        let changed = self.conn.execute(
            "UPDATE violations SET number_plate = ?1 WHERE id = ?2",
            params![stored, id],
        )?;
        Ok(changed > 0)
    }

    /// Returns false when the id does not exist.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM violations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Returns the number of records removed.
    pub fn delete_all(&self) -> Result<usize> {
        let count = self.conn.execute("DELETE FROM violations", [])?;
        Ok(count)
    }

    pub fn find(&self, id: i64) -> Result<Option<ViolationRecord>> {
        self.conn
            .query_row(
                "SELECT id, ts_utc, file_path, violation_type, fine, number_plate
                 FROM violations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ViolationRecord {
                        id: row.get(0)?,
                        ts_utc: row.get(1)?,
                        file_path: row.get(2)?,
                        violation_type: row.get(3)?,
                        fine: row.get(4)?,
                        number_plate: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("looking up violation")
    }

    /// One CSV row per record, in list_all order, under a fixed header.
    pub fn export_csv(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        writeln!(out, "{}", CSV_HEADER)?;
        for record in self.list_all()? {
            writeln!(
                out,
                "{},{},{},{},{}",
                record.id,
                csv_escape(&record.ts_utc),
                csv_escape(&record.violation_type),
                record.fine,
                csv_escape(record.number_plate.as_deref().unwrap_or("")),
            )?;
        }
        Ok(out)
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
