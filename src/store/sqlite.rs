//! SQLite-backed report store.
//!
//! Uniqueness of drug names and of (drug, side effect name) pairs is
//! enforced by the schema. Inserts use `INSERT OR IGNORE`, so losing a race
//! to another writer leaves the desired row in place and is not an error.

use crate::analysis::Reconciliation;
use crate::error::StoreError;
use crate::models::{AggregatedEffect, Drug, SideEffectReport};
use crate::store::{AppliedChanges, ReportStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS drugs (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS side_effect_reports (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        drug_id           INTEGER NOT NULL REFERENCES drugs(id),
        side_effect_name  TEXT NOT NULL,
        probability       REAL NOT NULL,
        recorded_at       TEXT NOT NULL,
        UNIQUE (drug_id, side_effect_name)
    );

    CREATE INDEX IF NOT EXISTS idx_reports_drug ON side_effect_reports(drug_id);
";

/// Report store over a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!("Opening report store at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp(format!("{raw}: {e}")))
}

fn row_to_drug(row: &Row<'_>) -> rusqlite::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_drug((id, name, created_at): (i64, String, String)) -> Result<Drug, StoreError> {
    Ok(Drug {
        id,
        name,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn find_drug_in(conn: &Connection, name: &str) -> Result<Option<Drug>, StoreError> {
    conn.query_row(
        "SELECT id, name, created_at FROM drugs WHERE name = ?1",
        params![name],
        row_to_drug,
    )
    .optional()?
    .map(into_drug)
    .transpose()
}

/// Create the drug if absent. Returns whether this call created it.
fn upsert_drug_in(conn: &Connection, name: &str) -> Result<(Drug, bool), StoreError> {
    let created = conn.execute(
        "INSERT OR IGNORE INTO drugs (name, created_at) VALUES (?1, ?2)",
        params![name, Utc::now().to_rfc3339()],
    )? > 0;

    let drug = find_drug_in(conn, name)?.ok_or_else(|| StoreError::UnknownDrug(name.to_string()))?;
    if created {
        debug!("Created drug '{}' with id {}", drug.name, drug.id);
    }
    Ok((drug, created))
}

fn insert_report_in(
    conn: &Connection,
    drug_id: i64,
    effect: &AggregatedEffect,
) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO side_effect_reports
             (drug_id, side_effect_name, probability, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            drug_id,
            effect.name,
            effect.probability,
            Utc::now().to_rfc3339()
        ],
    )? > 0;

    if !inserted {
        debug!(
            "Report '{}' already stored for drug {}, leaving it untouched",
            effect.name, drug_id
        );
    }
    Ok(inserted)
}

impl ReportStore for SqliteStore {
    fn list_drugs(&self) -> Result<Vec<Drug>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM drugs ORDER BY name")?;
        let rows = stmt.query_map([], row_to_drug)?;

        let drugs = rows
            .map(|row| into_drug(row?))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(drugs)
    }

    fn find_drug(&self, name: &str) -> Result<Option<Drug>, StoreError> {
        find_drug_in(&self.conn, name)
    }

    fn reports_for(&self, drug_name: &str) -> Result<Option<Vec<SideEffectReport>>, StoreError> {
        let Some(drug) = self.find_drug(drug_name)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT side_effect_name, probability, recorded_at
             FROM side_effect_reports WHERE drug_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![drug.id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut reports = Vec::new();
        for row in rows {
            let (side_effect_name, probability, recorded_at) = row?;
            reports.push(SideEffectReport {
                side_effect_name,
                probability,
                recorded_at: parse_timestamp(&recorded_at)?,
            });
        }

        Ok(Some(reports))
    }

    fn upsert_drug(&mut self, name: &str) -> Result<(Drug, bool), StoreError> {
        upsert_drug_in(&self.conn, name)
    }

    fn apply(&mut self, reconciliation: &Reconciliation) -> Result<AppliedChanges, StoreError> {
        let tx = self.conn.transaction()?;

        let (drug, drug_created) = upsert_drug_in(&tx, &reconciliation.drug_name)?;
        let mut reports_inserted = 0;
        for effect in &reconciliation.effects_to_persist {
            if insert_report_in(&tx, drug.id, effect)? {
                reports_inserted += 1;
            }
        }

        tx.commit()?;

        info!(
            "Stored {} new side effects for '{}'",
            reports_inserted, drug.name
        );
        Ok(AppliedChanges {
            drug_created,
            reports_inserted,
        })
    }
}
