//! Markdown and JSON rendering.
//!
//! This module renders search outcomes and store listings for the
//! terminal or for a file.

use crate::agent::AgentOutcome;
use crate::models::{AggregatedEffect, Drug, SearchOutcome, SideEffectReport};
use anyhow::Result;
use serde::Serialize;

/// Generate a complete Markdown report for one search.
pub fn generate_search_markdown(outcome: &SearchOutcome) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Side Effects: {}\n\n", outcome.drug));
    output.push_str(&generate_summary_section(outcome));
    output.push_str(&generate_new_effects_section(outcome));
    output.push_str(&generate_all_effects_section(&outcome.side_effects));
    output.push_str(&generate_footer());

    output
}

/// Generate the summary section.
fn generate_summary_section(outcome: &SearchOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "- **Searched:** {}\n",
        outcome.searched_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Side Effects Found:** {}\n",
        outcome.total_side_effects
    ));
    section.push_str(&format!(
        "- **New Side Effects:** {}\n",
        outcome.new_side_effects
    ));
    if outcome.drug_is_new {
        section.push_str("- **First search for this drug**\n");
    }
    if !outcome.persisted {
        section.push_str("- **Dry run:** nothing was written to the store\n");
    }
    section.push('\n');

    section
}

/// Generate the section listing effects that were not stored before.
fn generate_new_effects_section(outcome: &SearchOutcome) -> String {
    let mut section = String::new();

    section.push_str("## New Side Effects\n\n");

    if outcome.new_effects.is_empty() {
        section.push_str("No new side effects since the last search.\n\n");
        return section;
    }

    section.push_str(&effects_table(&outcome.new_effects));
    section
}

fn generate_all_effects_section(effects: &[AggregatedEffect]) -> String {
    if effects.is_empty() {
        return "## All Side Effects\n\nNo serious adverse events above the threshold were reported.\n\n"
            .to_string();
    }

    let mut section = String::new();
    section.push_str("## All Side Effects\n\n");
    section.push_str(&effects_table(&sorted_by_probability(effects)));
    section
}

/// Effects ordered from most to least likely, ties by name.
fn sorted_by_probability(effects: &[AggregatedEffect]) -> Vec<AggregatedEffect> {
    let mut sorted = effects.to_vec();
    sorted.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    sorted
}

fn effects_table(effects: &[AggregatedEffect]) -> String {
    let mut table = String::new();

    table.push_str("| Side Effect | Probability |\n");
    table.push_str("|:---|---:|\n");
    for effect in effects {
        table.push_str(&format!(
            "| {} | {} |\n",
            escape_cell(&effect.name),
            format_probability(effect.probability)
        ));
    }
    table.push('\n');

    table
}

/// Generate a Markdown list of stored drugs.
pub fn generate_drugs_markdown(drugs: &[Drug]) -> String {
    let mut output = String::from("# Drugs\n\n");

    if drugs.is_empty() {
        output.push_str("No drugs have been searched yet.\n");
        return output;
    }

    output.push_str("| Drug | First Searched |\n");
    output.push_str("|:---|:---|\n");
    for drug in drugs {
        output.push_str(&format!(
            "| {} | {} |\n",
            escape_cell(&drug.name),
            drug.created_at.format("%Y-%m-%d")
        ));
    }

    output
}

/// Generate a Markdown table of a drug's stored reports.
pub fn generate_reports_markdown(drug_name: &str, reports: &[SideEffectReport]) -> String {
    let mut output = format!("# Stored Side Effects: {}\n\n", drug_name);

    if reports.is_empty() {
        output.push_str("No side effects recorded for this drug.\n");
        return output;
    }

    output.push_str("| Side Effect | Probability | Recorded |\n");
    output.push_str("|:---|---:|:---|\n");
    for report in reports {
        output.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&report.side_effect_name),
            format_probability(report.probability),
            report.recorded_at.format("%Y-%m-%d")
        ));
    }

    output
}

/// Generate Markdown for an assistant answer and what it stored.
pub fn generate_agent_markdown(outcome: &AgentOutcome) -> String {
    let mut output = String::from("# Assistant\n\n");

    output.push_str(outcome.response.trim());
    output.push_str("\n\n");

    if !outcome.recorded.is_empty() {
        output.push_str("## Recorded Side Effects\n\n");
        output.push_str("| Drug | Side Effect | Probability |\n");
        output.push_str("|:---|:---|---:|\n");
        for recorded in &outcome.recorded {
            output.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&recorded.drug_name),
                escape_cell(&recorded.effect.name),
                format_probability(recorded.effect.probability)
            ));
        }
        output.push('\n');
    }

    output
}

/// Format a probability as a percentage with two decimals.
pub fn format_probability(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Source: serious adverse events posted on ClinicalTrials.gov. \
     Probabilities are unweighted means of per-study ratios.*\n"
        .to_string()
}

/// Render any serializable value as pretty JSON.
pub fn generate_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_outcome() -> SearchOutcome {
        let side_effects = vec![
            AggregatedEffect::new("Headache", 0.05),
            AggregatedEffect::new("Nausea", 0.15),
        ];
        SearchOutcome {
            drug: "Aspirin".to_string(),
            total_side_effects: 2,
            new_side_effects: 1,
            drug_is_new: false,
            persisted: true,
            new_effects: vec![side_effects[0].clone()],
            side_effects,
            searched_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_search_markdown() {
        let markdown = generate_search_markdown(&create_test_outcome());

        assert!(markdown.contains("# Side Effects: Aspirin"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("**New Side Effects:** 1"));
        assert!(markdown.contains("| Headache | 5.00% |"));
        assert!(markdown.contains("| Nausea | 15.00% |"));
        assert!(!markdown.contains("Dry run"));
    }

    #[test]
    fn test_all_effects_sorted_by_probability() {
        let markdown = generate_all_effects_section(&create_test_outcome().side_effects);
        let nausea = markdown.find("Nausea").unwrap();
        let headache = markdown.find("Headache").unwrap();
        assert!(nausea < headache);
    }

    #[test]
    fn test_dry_run_and_empty_sections() {
        let mut outcome = create_test_outcome();
        outcome.persisted = false;
        outcome.new_effects.clear();
        outcome.side_effects.clear();

        let markdown = generate_search_markdown(&outcome);
        assert!(markdown.contains("Dry run"));
        assert!(markdown.contains("No new side effects"));
        assert!(markdown.contains("No serious adverse events"));
    }

    #[test]
    fn test_generate_reports_markdown() {
        let reports = vec![SideEffectReport {
            side_effect_name: "Rash | severe".to_string(),
            probability: 0.2,
            recorded_at: Utc::now(),
        }];

        let markdown = generate_reports_markdown("Aspirin", &reports);
        assert!(markdown.contains("Rash \\| severe"));
        assert!(markdown.contains("20.00%"));

        assert!(generate_reports_markdown("Aspirin", &[]).contains("No side effects recorded"));
    }

    #[test]
    fn test_generate_drugs_markdown() {
        assert!(generate_drugs_markdown(&[]).contains("No drugs"));

        let drugs = vec![Drug {
            id: 1,
            name: "Aspirin".to_string(),
            created_at: Utc::now(),
        }];
        assert!(generate_drugs_markdown(&drugs).contains("| Aspirin |"));
    }

    #[test]
    fn test_generate_agent_markdown() {
        let outcome = AgentOutcome {
            response: "Aspirin has one new side effect.\n".to_string(),
            recorded: vec![crate::agent::tools::RecordedEffect {
                drug_name: "Aspirin".to_string(),
                effect: AggregatedEffect::new("Headache", 0.05),
            }],
            iterations: 4,
        };

        let markdown = generate_agent_markdown(&outcome);
        assert!(markdown.contains("Aspirin has one new side effect."));
        assert!(markdown.contains("| Aspirin | Headache | 5.00% |"));
    }

    #[test]
    fn test_generate_json() {
        let json = generate_json(&create_test_outcome()).unwrap();

        assert!(json.contains("\"drug\": \"Aspirin\""));
        assert!(json.contains("\"new_side_effects\": 1"));
        assert!(json.contains("\"side_effects\""));
    }
}
