//! Reconciliation of freshly aggregated effects against stored reports.
//!
//! Only effect names that are absent from the store are selected for
//! writing. Stored probabilities are never recomputed: the first recorded
//! value for a (drug, side effect) pair wins.

use crate::error::InputError;
use crate::models::{AggregatedEffect, SideEffectReport};
use serde::Serialize;
use std::collections::HashSet;

/// The writes needed to bring the store up to date for one drug.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Trimmed drug name the writes apply to.
    pub drug_name: String,
    /// Effects whose names are not yet stored for this drug.
    pub effects_to_persist: Vec<AggregatedEffect>,
    /// Whether the drug itself must be created.
    pub drug_is_new: bool,
}

impl Reconciliation {
    /// True when nothing has to be written.
    pub fn is_noop(&self) -> bool {
        !self.drug_is_new && self.effects_to_persist.is_empty()
    }
}

/// Validate and trim a drug name.
pub fn normalize_drug_name(drug_name: &str) -> Result<&str, InputError> {
    let trimmed = drug_name.trim();
    if trimmed.is_empty() {
        return Err(InputError::BlankDrugName);
    }
    Ok(trimmed)
}

/// Decide which effects must be written for `drug_name`.
///
/// `existing` is `None` when the drug is not in the store yet, otherwise
/// the drug's stored reports. Names are compared exactly. Duplicate names
/// inside `new_effects` are persisted once, keeping the first.
pub fn reconcile(
    drug_name: &str,
    new_effects: &[AggregatedEffect],
    existing: Option<&[SideEffectReport]>,
) -> Result<Reconciliation, InputError> {
    let drug_name = normalize_drug_name(drug_name)?;

    let mut known: HashSet<&str> = existing
        .unwrap_or_default()
        .iter()
        .map(|report| report.side_effect_name.as_str())
        .collect();

    let mut effects_to_persist = Vec::new();
    for effect in new_effects {
        if known.insert(effect.name.as_str()) {
            effects_to_persist.push(effect.clone());
        }
    }

    Ok(Reconciliation {
        drug_name: drug_name.to_string(),
        effects_to_persist,
        drug_is_new: existing.is_none(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn report(name: &str, probability: f64) -> SideEffectReport {
        SideEffectReport {
            side_effect_name: name.to_string(),
            probability,
            recorded_at: Utc::now(),
        }
    }

    /// Apply a reconciliation the way a store would.
    fn apply(existing: &mut Option<Vec<SideEffectReport>>, rec: &Reconciliation) {
        let reports = existing.get_or_insert_with(Vec::new);
        for effect in &rec.effects_to_persist {
            reports.push(report(&effect.name, effect.probability));
        }
    }

    #[test]
    fn test_only_new_names_are_persisted() {
        let existing = vec![report("Nausea", 0.15)];
        let new_effects = vec![
            AggregatedEffect::new("Nausea", 0.30),
            AggregatedEffect::new("Headache", 0.05),
        ];

        let rec = reconcile("Aspirin", &new_effects, Some(&existing)).unwrap();

        assert_eq!(
            rec.effects_to_persist,
            vec![AggregatedEffect::new("Headache", 0.05)]
        );
        assert!(!rec.drug_is_new);
        assert_eq!(existing[0].probability, 0.15);
    }

    #[test]
    fn test_unknown_drug_is_new() {
        let new_effects = vec![AggregatedEffect::new("Rash", 0.2)];
        let rec = reconcile("Ibuprofen", &new_effects, None).unwrap();

        assert!(rec.drug_is_new);
        assert_eq!(rec.effects_to_persist.len(), 1);
        assert!(!rec.is_noop());
    }

    #[test]
    fn test_known_drug_without_reports_is_not_new() {
        let rec = reconcile("Ibuprofen", &[], Some(&[])).unwrap();
        assert!(!rec.drug_is_new);
        assert!(rec.is_noop());
    }

    #[test]
    fn test_blank_drug_name_rejected() {
        let effects = vec![AggregatedEffect::new("Rash", 0.2)];
        assert_eq!(
            reconcile("", &effects, None),
            Err(InputError::BlankDrugName)
        );
        assert_eq!(
            reconcile("   \t", &effects, None),
            Err(InputError::BlankDrugName)
        );
    }

    #[test]
    fn test_drug_name_is_trimmed() {
        let rec = reconcile("  Aspirin ", &[], None).unwrap();
        assert_eq!(rec.drug_name, "Aspirin");
    }

    #[test]
    fn test_names_compared_exactly() {
        let existing = vec![report("Nausea", 0.15)];
        let new_effects = vec![AggregatedEffect::new("nausea", 0.2)];

        let rec = reconcile("Aspirin", &new_effects, Some(&existing)).unwrap();
        assert_eq!(rec.effects_to_persist.len(), 1);
    }

    #[test]
    fn test_duplicate_inputs_persisted_once() {
        let new_effects = vec![
            AggregatedEffect::new("Rash", 0.2),
            AggregatedEffect::new("Rash", 0.4),
        ];

        let rec = reconcile("Aspirin", &new_effects, None).unwrap();
        assert_eq!(
            rec.effects_to_persist,
            vec![AggregatedEffect::new("Rash", 0.2)]
        );
    }

    #[test]
    fn test_second_run_is_empty() {
        let new_effects = vec![
            AggregatedEffect::new("Rash", 0.2),
            AggregatedEffect::new("Fever", 0.1),
        ];
        let mut stored = None;

        let first = reconcile("Aspirin", &new_effects, stored.as_deref()).unwrap();
        apply(&mut stored, &first);
        let second = reconcile("Aspirin", &new_effects, stored.as_deref()).unwrap();

        assert_eq!(first.effects_to_persist.len(), 2);
        assert!(second.is_noop());
    }

    fn arb_effects() -> impl Strategy<Value = Vec<AggregatedEffect>> {
        prop::collection::vec(
            ("[a-e]{1,2}", 0.0f64..=1.0).prop_map(|(name, p)| AggregatedEffect::new(name, p)),
            0..10,
        )
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_idempotent(effects in arb_effects()) {
            let mut stored = None;
            let first = reconcile("Aspirin", &effects, stored.as_deref()).unwrap();
            apply(&mut stored, &first);

            let second = reconcile("Aspirin", &effects, stored.as_deref()).unwrap();
            prop_assert!(second.effects_to_persist.is_empty());
            prop_assert!(!second.drug_is_new);
        }

        #[test]
        fn prop_stored_names_stay_unique(batches in prop::collection::vec(arb_effects(), 1..5)) {
            let mut stored = None;
            for batch in &batches {
                let rec = reconcile("Aspirin", batch, stored.as_deref()).unwrap();
                apply(&mut stored, &rec);
            }

            let reports = stored.unwrap_or_default();
            let unique: HashSet<_> = reports.iter().map(|r| r.side_effect_name.as_str()).collect();
            prop_assert_eq!(unique.len(), reports.len());
        }

        #[test]
        fn prop_first_write_wins(first_p in 0.0f64..=1.0, later_p in 0.0f64..=1.0) {
            let mut stored = None;
            let first = reconcile("Aspirin", &[AggregatedEffect::new("Rash", first_p)], stored.as_deref()).unwrap();
            apply(&mut stored, &first);
            let later = reconcile("Aspirin", &[AggregatedEffect::new("Rash", later_p)], stored.as_deref()).unwrap();
            apply(&mut stored, &later);

            let reports = stored.unwrap_or_default();
            prop_assert_eq!(reports.len(), 1);
            prop_assert_eq!(reports[0].probability, first_p);
        }
    }
}
