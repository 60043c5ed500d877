//! Serious adverse event aggregation.
//!
//! This module merges per-study event counts into one probability per
//! side-effect name. Each study contributes one ratio per event regardless
//! of its sample size, and the probability is the plain mean of those ratios.

use crate::models::{AggregatedEffect, StudyRecord};
use std::collections::HashMap;
use tracing::debug;

/// Probability an effect must exceed to be reported.
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Aggregate serious events across studies.
///
/// Studies without results, and events without usable counts, are skipped.
/// Names are matched exactly. Effects whose mean probability is not strictly
/// above `threshold` are dropped. Output follows first appearance.
pub fn aggregate(studies: &[StudyRecord], threshold: f64) -> Vec<AggregatedEffect> {
    let grouped = group_ratios_by_term(studies);

    grouped
        .into_iter()
        .map(|(name, ratios)| AggregatedEffect::new(name, mean(&ratios)))
        .filter(|effect| effect.probability > threshold)
        .collect()
}

/// Collect per-study ratios keyed by raw event term, in first-seen order.
pub fn group_ratios_by_term(studies: &[StudyRecord]) -> Vec<(String, Vec<f64>)> {
    let mut grouped: Vec<(String, Vec<f64>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (position, study) in studies.iter().enumerate() {
        let Some(events) = study.serious_events() else {
            debug!("Study {} has no serious events, skipping", position);
            continue;
        };

        for event in events {
            let Some(ratio) = event.ratio() else {
                debug!("Event '{}' has no usable stats, skipping", event.term());
                continue;
            };

            let term = event.term();
            let slot = match index.get(term) {
                Some(&slot) => slot,
                None => {
                    index.insert(term.to_string(), grouped.len());
                    grouped.push((term.to_string(), Vec::new()));
                    grouped.len() - 1
                }
            };
            grouped[slot].1.push(ratio);
        }
    }

    grouped
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdverseEvent, AdverseEventsModule, ResultsSection};
    use proptest::prelude::*;

    fn study(events: Vec<AdverseEvent>) -> StudyRecord {
        StudyRecord {
            has_results: true,
            results_section: Some(ResultsSection {
                adverse_events_module: Some(AdverseEventsModule {
                    serious_events: Some(events),
                }),
            }),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_mean_of_two_studies() {
        let studies = vec![
            study(vec![AdverseEvent::new("Nausea", 10, 100)]),
            study(vec![AdverseEvent::new("Nausea", 20, 100)]),
        ];

        let effects = aggregate(&studies, DEFAULT_THRESHOLD);

        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].name, "Nausea");
        assert_close(effects[0].probability, 0.15);
    }

    #[test]
    fn test_threshold_is_strict() {
        let studies = vec![
            study(vec![AdverseEvent::new("Nausea", 10, 100)]),
            study(vec![AdverseEvent::new("Nausea", 20, 100)]),
        ];
        assert!(aggregate(&studies, 0.2).is_empty());

        let exact = vec![study(vec![AdverseEvent::new("Rash", 1, 100)])];
        assert!(aggregate(&exact, 0.01).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[], DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn test_study_without_results_is_ignored() {
        let mut gated = study(vec![AdverseEvent::new("Nausea", 50, 100)]);
        gated.has_results = false;

        assert!(aggregate(&[gated.clone()], DEFAULT_THRESHOLD).is_empty());

        let effects = aggregate(
            &[gated, study(vec![AdverseEvent::new("Nausea", 10, 100)])],
            DEFAULT_THRESHOLD,
        );
        assert_close(effects[0].probability, 0.1);
    }

    #[test]
    fn test_missing_sections_are_skipped() {
        let studies = vec![
            StudyRecord {
                has_results: true,
                results_section: None,
            },
            StudyRecord {
                has_results: true,
                results_section: Some(ResultsSection {
                    adverse_events_module: None,
                }),
            },
            StudyRecord {
                has_results: true,
                results_section: Some(ResultsSection {
                    adverse_events_module: Some(AdverseEventsModule {
                        serious_events: None,
                    }),
                }),
            },
        ];
        assert!(aggregate(&studies, DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn test_zero_at_risk_contributes_nothing() {
        let studies = vec![
            study(vec![AdverseEvent::new("Headache", 5, 0)]),
            study(vec![AdverseEvent::new("Headache", 30, 100)]),
        ];

        let effects = aggregate(&studies, DEFAULT_THRESHOLD);
        assert_eq!(effects.len(), 1);
        assert_close(effects[0].probability, 0.3);
    }

    #[test]
    fn test_terms_are_not_normalized() {
        let studies = vec![study(vec![
            AdverseEvent::new("Nausea", 10, 100),
            AdverseEvent::new("nausea", 20, 100),
            AdverseEvent::new("Nausea ", 30, 100),
        ])];

        let effects = aggregate(&studies, DEFAULT_THRESHOLD);
        let names: Vec<_> = effects.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Nausea", "nausea", "Nausea "]);
    }

    #[test]
    fn test_unweighted_by_sample_size() {
        let studies = vec![
            study(vec![AdverseEvent::new("Fatigue", 1, 10)]),
            study(vec![AdverseEvent::new("Fatigue", 300, 1000)]),
        ];

        let effects = aggregate(&studies, DEFAULT_THRESHOLD);
        assert_close(effects[0].probability, 0.2);
    }

    #[test]
    fn test_group_ratios_keeps_first_seen_order() {
        let studies = vec![
            study(vec![
                AdverseEvent::new("Rash", 1, 10),
                AdverseEvent::new("Fever", 2, 10),
            ]),
            study(vec![AdverseEvent::new("Rash", 3, 10)]),
        ];

        let grouped = group_ratios_by_term(&studies);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "Rash");
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[1].0, "Fever");
    }

    fn arb_event() -> impl Strategy<Value = AdverseEvent> {
        ("[A-C]", 0u64..200, 0u64..200).prop_map(|(term, at_risk, affected)| {
            AdverseEvent::new(&term, affected.min(at_risk), at_risk)
        })
    }

    fn arb_studies() -> impl Strategy<Value = Vec<StudyRecord>> {
        prop::collection::vec(
            (any::<bool>(), prop::collection::vec(arb_event(), 0..6)).prop_map(
                |(has_results, events)| {
                    let mut record = study(events);
                    record.has_results = has_results;
                    record
                },
            ),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn prop_probabilities_within_unit_interval(studies in arb_studies(), threshold in 0.0f64..1.0) {
            for effect in aggregate(&studies, threshold) {
                prop_assert!(effect.probability > threshold);
                prop_assert!(effect.probability <= 1.0);
            }
        }

        #[test]
        fn prop_zero_at_risk_entries_do_not_change_result(studies in arb_studies(), term in "[A-C]") {
            let baseline = aggregate(&studies, DEFAULT_THRESHOLD);

            let mut noisy = studies.clone();
            noisy.push(study(vec![AdverseEvent::new(&term, 7, 0)]));
            for record in noisy.iter_mut() {
                if let Some(events) = record
                    .results_section
                    .as_mut()
                    .and_then(|s| s.adverse_events_module.as_mut())
                    .and_then(|m| m.serious_events.as_mut())
                {
                    events.push(AdverseEvent::new(&term, 3, 0));
                }
            }

            prop_assert_eq!(aggregate(&noisy, DEFAULT_THRESHOLD), baseline);
        }

        #[test]
        fn prop_names_are_unique(studies in arb_studies()) {
            let effects = aggregate(&studies, 0.0);
            let mut names: Vec<_> = effects.iter().map(|e| e.name.clone()).collect();
            names.sort();
            names.dedup();
            prop_assert_eq!(names.len(), effects.len());
        }
    }
}
