//! Report persistence.
//!
//! The tracker talks to storage through [`ReportStore`]. The store must
//! enforce uniqueness of (drug, side effect name) itself, so concurrent
//! writers computing overlapping sets cannot duplicate a report.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::analysis::Reconciliation;
use crate::error::StoreError;
use crate::models::{Drug, SideEffectReport};
use serde::Serialize;

/// What a call to [`ReportStore::apply`] actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppliedChanges {
    pub drug_created: bool,
    /// Reports written. A name lost to a concurrent writer is not counted.
    pub reports_inserted: usize,
}

pub trait ReportStore {
    /// All drugs, ordered by name.
    fn list_drugs(&self) -> Result<Vec<Drug>, StoreError>;

    fn find_drug(&self, name: &str) -> Result<Option<Drug>, StoreError>;

    /// Stored reports for a drug, or `None` if the drug is unknown.
    fn reports_for(&self, drug_name: &str) -> Result<Option<Vec<SideEffectReport>>, StoreError>;

    /// Create the drug if absent. Returns the drug and whether it was created.
    fn upsert_drug(&mut self, name: &str) -> Result<(Drug, bool), StoreError>;

    /// Apply a reconciliation atomically. This is the only way reports are
    /// written.
    fn apply(&mut self, reconciliation: &Reconciliation) -> Result<AppliedChanges, StoreError>;
}
