//! Search pipeline: fetch, aggregate, reconcile, persist.
//!
//! The tracker owns its study source and report store, both injected by
//! the caller. Every write goes through [`reconcile`], so no entry point
//! can store a duplicate side effect for a drug.

use crate::analysis::{aggregate, normalize_drug_name, reconcile, Reconciliation};
use crate::error::{InputError, StoreError, TrackerResult};
use crate::models::{AggregatedEffect, Drug, SearchOutcome, SideEffectReport};
use crate::source::StudySource;
use crate::store::ReportStore;
use chrono::Utc;
use tracing::{debug, info};

pub struct SideEffectTracker<S, R> {
    source: S,
    store: R,
    threshold: f64,
}

impl<S: StudySource, R: ReportStore> SideEffectTracker<S, R> {
    pub fn new(source: S, store: R, threshold: f64) -> Self {
        Self {
            source,
            store,
            threshold,
        }
    }

    /// Fetch and aggregate the current effects for a drug without touching the store.
    pub async fn fetch_side_effects(&self, drug_name: &str) -> TrackerResult<Vec<AggregatedEffect>> {
        let drug_name = normalize_drug_name(drug_name)?;
        let studies = self.source.fetch_studies(drug_name).await?;
        let effects = aggregate(&studies, self.threshold);

        debug!(
            "Aggregated {} effects above {} from {} studies",
            effects.len(),
            self.threshold,
            studies.len()
        );
        Ok(effects)
    }

    /// Search a drug and store every effect not recorded yet.
    pub async fn search(&mut self, drug_name: &str) -> TrackerResult<SearchOutcome> {
        self.run_search(drug_name, true).await
    }

    /// Search a drug and report what would be stored, without writing.
    pub async fn preview(&mut self, drug_name: &str) -> TrackerResult<SearchOutcome> {
        self.run_search(drug_name, false).await
    }

    async fn run_search(&mut self, drug_name: &str, persist: bool) -> TrackerResult<SearchOutcome> {
        let drug_name = normalize_drug_name(drug_name)?.to_string();
        let side_effects = self.fetch_side_effects(&drug_name).await?;

        let existing = self.store.reports_for(&drug_name)?;
        let reconciliation = reconcile(&drug_name, &side_effects, existing.as_deref())?;

        if persist && !reconciliation.is_noop() {
            self.store.apply(&reconciliation)?;
        }

        info!(
            "'{}': {} side effects, {} new",
            drug_name,
            side_effects.len(),
            reconciliation.effects_to_persist.len()
        );

        Ok(SearchOutcome {
            drug: drug_name,
            total_side_effects: side_effects.len(),
            new_side_effects: reconciliation.effects_to_persist.len(),
            drug_is_new: reconciliation.drug_is_new,
            persisted: persist,
            side_effects,
            new_effects: reconciliation.effects_to_persist,
            searched_at: Utc::now(),
        })
    }

    pub fn list_drugs(&self) -> TrackerResult<Vec<Drug>> {
        Ok(self.store.list_drugs()?)
    }

    /// Stored reports for a drug, or `None` if the drug is unknown.
    pub fn list_side_effects(&self, drug_name: &str) -> TrackerResult<Option<Vec<SideEffectReport>>> {
        let drug_name = normalize_drug_name(drug_name)?;
        Ok(self.store.reports_for(drug_name)?)
    }

    /// Create a drug if absent. Returns the drug and whether it was created.
    pub fn create_drug(&mut self, drug_name: &str) -> TrackerResult<(Drug, bool)> {
        let drug_name = normalize_drug_name(drug_name)?;
        Ok(self.store.upsert_drug(drug_name)?)
    }

    /// Record a single side effect for an existing drug.
    ///
    /// The effect is reconciled like any search result, so a name that is
    /// already stored is left as is and the returned reconciliation is empty.
    pub fn record_side_effect(
        &mut self,
        drug_name: &str,
        side_effect_name: &str,
        probability: f64,
    ) -> TrackerResult<Reconciliation> {
        let drug_name = normalize_drug_name(drug_name)?;
        if side_effect_name.trim().is_empty() {
            return Err(InputError::BlankSideEffectName.into());
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(InputError::ProbabilityOutOfRange(probability).into());
        }

        let existing = self
            .store
            .reports_for(drug_name)?
            .ok_or_else(|| StoreError::UnknownDrug(drug_name.to_string()))?;

        let effect = AggregatedEffect::new(side_effect_name, probability);
        let reconciliation = reconcile(drug_name, &[effect], Some(&existing))?;
        self.store.apply(&reconciliation)?;

        Ok(reconciliation)
    }
}
