//! Data models for the side-effect tracker.
//!
//! This module contains the wire shapes received from ClinicalTrials.gov,
//! the aggregated effects computed from them, and the durable entities
//! kept in the report store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Term recorded when a serious event carries no name.
pub const UNKNOWN_TERM: &str = "Unknown";

/// One trial result as returned by the studies endpoint.
///
/// Every nested section is optional: studies without posted results are
/// common and simply contribute nothing to an aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyRecord {
    /// Whether results have been posted for this study.
    #[serde(default)]
    pub has_results: bool,
    /// Posted results, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_section: Option<ResultsSection>,
}

impl StudyRecord {
    /// Serious events of a study that has posted results.
    ///
    /// Returns `None` when the study is gated out or any section on the
    /// path is absent.
    pub fn serious_events(&self) -> Option<&[AdverseEvent]> {
        if !self.has_results {
            return None;
        }

        self.results_section
            .as_ref()?
            .adverse_events_module
            .as_ref()?
            .serious_events
            .as_deref()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adverse_events_module: Option<AdverseEventsModule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdverseEventsModule {
    /// Entries that fail to decode are dropped one by one; their siblings
    /// still count.
    #[serde(
        default,
        deserialize_with = "deserialize_events",
        skip_serializing_if = "Option::is_none"
    )]
    pub serious_events: Option<Vec<AdverseEvent>>,
}

fn deserialize_events<'de, D>(deserializer: D) -> Result<Option<Vec<AdverseEvent>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(entries) = Option::<Vec<Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };

    let events = entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match serde_json::from_value(entry) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Skipping malformed serious event {}: {}", position, e);
                None
            }
        })
        .collect();
    Ok(Some(events))
}

/// A single serious adverse event entry of a study.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdverseEvent {
    /// Side-effect name exactly as the study reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    /// Per-group counts. Only the first group is read.
    #[serde(default)]
    pub stats: Vec<EventStats>,
}

impl AdverseEvent {
    /// Creates an event with a single stats group.
    #[cfg(test)]
    pub fn new(term: &str, num_affected: u64, num_at_risk: u64) -> Self {
        Self {
            term: Some(term.to_string()),
            stats: vec![EventStats {
                num_affected: Some(num_affected),
                num_at_risk: Some(num_at_risk),
            }],
        }
    }

    /// The event's name, or [`UNKNOWN_TERM`] when none was reported.
    pub fn term(&self) -> &str {
        self.term.as_deref().unwrap_or(UNKNOWN_TERM)
    }

    /// Ratio of affected subjects to subjects at risk in the first group.
    ///
    /// `None` when there are no stats, either count is missing, or nobody
    /// was at risk.
    pub fn ratio(&self) -> Option<f64> {
        let stats = self.stats.first()?;
        let at_risk = stats.num_at_risk.filter(|n| *n > 0)?;
        let affected = stats.num_affected?;
        Some(affected as f64 / at_risk as f64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_affected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_at_risk: Option<u64>,
}

/// One side effect with its averaged probability across studies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEffect {
    /// Raw event term, case-sensitive and untrimmed.
    pub name: String,
    /// Mean of the per-study ratios, in `[0, 1]`.
    pub probability: f64,
}

impl AggregatedEffect {
    pub fn new(name: impl Into<String>, probability: f64) -> Self {
        Self {
            name: name.into(),
            probability,
        }
    }
}

/// A drug known to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A stored side effect of one drug.
///
/// Names are unique per drug and the probability is never rewritten once
/// recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectReport {
    pub side_effect_name: String,
    pub probability: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Result of a search for one drug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Drug name as searched (trimmed).
    pub drug: String,
    /// Number of effects above the threshold in this query.
    pub total_side_effects: usize,
    /// Number of effects that were not stored before.
    pub new_side_effects: usize,
    /// Whether the drug was unknown before this search.
    pub drug_is_new: bool,
    /// Whether the new effects were written to the store.
    pub persisted: bool,
    /// Every effect computed by this query.
    pub side_effects: Vec<AggregatedEffect>,
    /// The subset of `side_effects` that is new to the store.
    pub new_effects: Vec<AggregatedEffect>,
    /// When the search completed.
    pub searched_at: DateTime<Utc>,
}
