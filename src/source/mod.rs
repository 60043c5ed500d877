//! Study feed collaborators.
//!
//! The tracker only depends on [`StudySource`]; the ClinicalTrials.gov
//! client is the production implementation.

pub mod clinical_trials;

pub use clinical_trials::{ClinicalTrialsClient, SourceConfig};

use crate::error::FetchError;
use crate::models::StudyRecord;

/// Supplies the studies matching a drug query.
///
/// An empty list is a valid answer. Transport failures are reported as
/// [`FetchError`] so callers can tell them apart from "no studies".
#[allow(async_fn_in_trait)]
pub trait StudySource {
    async fn fetch_studies(&self, drug_name: &str) -> Result<Vec<StudyRecord>, FetchError>;
}
