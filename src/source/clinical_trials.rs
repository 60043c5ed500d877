//! ClinicalTrials.gov v2 API client.
//!
//! Queries the studies endpoint for a drug name and decodes each study
//! independently, so one malformed record cannot fail the whole page.

use crate::error::FetchError;
use crate::models::StudyRecord;
use crate::source::StudySource;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for the studies endpoint.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_url: String,
    pub page_size: usize,
    pub sort: String,
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://clinicaltrials.gov/api/v2".to_string(),
            page_size: 25,
            sort: "ResultsFirstPostDate".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl From<&crate::config::SourceSettings> for SourceConfig {
    fn from(settings: &crate::config::SourceSettings) -> Self {
        Self {
            api_url: settings.api_url.clone(),
            page_size: settings.page_size,
            sort: settings.sort.clone(),
            timeout_seconds: settings.timeout_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StudiesPage {
    #[serde(default)]
    studies: Vec<Value>,
}

/// HTTP client for ClinicalTrials.gov.
pub struct ClinicalTrialsClient {
    config: SourceConfig,
    http_client: reqwest::Client,
}

impl ClinicalTrialsClient {
    /// Create a client with the configured timeout.
    pub fn new(config: SourceConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn studies_url(&self) -> String {
        format!("{}/studies", self.config.api_url.trim_end_matches('/'))
    }

    fn map_send_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                seconds: self.config.timeout_seconds,
            }
        } else if e.is_connect() {
            FetchError::Connect {
                url: self.config.api_url.clone(),
            }
        } else {
            FetchError::Request(e)
        }
    }
}

impl StudySource for ClinicalTrialsClient {
    async fn fetch_studies(&self, drug_name: &str) -> Result<Vec<StudyRecord>, FetchError> {
        let url = self.studies_url();
        let page_size = self.config.page_size.to_string();

        info!("Querying {} for '{}'", url, drug_name);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("query.term", drug_name),
                ("pageSize", page_size.as_str()),
                ("sort", self.config.sort.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let studies = decode_studies(&body)?;

        info!("Received {} studies for '{}'", studies.len(), drug_name);
        Ok(studies)
    }
}

/// Decode a studies page, dropping records that do not fit the expected shape.
pub fn decode_studies(body: &str) -> Result<Vec<StudyRecord>, FetchError> {
    let page: StudiesPage =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let mut studies = Vec::with_capacity(page.studies.len());
    for (position, raw) in page.studies.into_iter().enumerate() {
        match serde_json::from_value::<StudyRecord>(raw) {
            Ok(study) => studies.push(study),
            Err(e) => debug!("Skipping malformed study {}: {}", position, e),
        }
    }

    Ok(studies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, DEFAULT_THRESHOLD};
    use crate::models::AggregatedEffect;

    #[test]
    fn test_decode_page() {
        let body = r#"{
            "studies": [
                {"hasResults": false},
                {"hasResults": true, "resultsSection": {"adverseEventsModule": {"seriousEvents": [
                    {"term": "Nausea", "stats": [{"numAffected": 1, "numAtRisk": 20}]}
                ]}}}
            ],
            "nextPageToken": "abc"
        }"#;

        let studies = decode_studies(body).unwrap();
        assert_eq!(studies.len(), 2);
        assert!(studies[1].serious_events().is_some());
    }

    #[test]
    fn test_missing_studies_key_is_empty() {
        assert!(decode_studies("{}").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_study_is_dropped() {
        let body = r#"{"studies": [
            {"hasResults": "yes"},
            {"hasResults": true, "resultsSection": {"adverseEventsModule": {"seriousEvents": "none"}}},
            {"hasResults": true}
        ]}"#;

        let studies = decode_studies(body).unwrap();
        assert_eq!(studies.len(), 1);
    }

    #[test]
    fn test_malformed_event_drops_only_that_event() {
        let body = r#"{"studies": [
            {"hasResults": true, "resultsSection": {"adverseEventsModule": {"seriousEvents": [
                {"term": "Nausea", "stats": [{"numAffected": 10, "numAtRisk": 100}]},
                {"term": "Rash", "stats": null},
                {"term": "Fever", "stats": [{"numAffected": -1, "numAtRisk": 100}]},
                {"term": "Cough", "stats": [{"numAffected": "many", "numAtRisk": 10}]}
            ]}}}
        ]}"#;

        let studies = decode_studies(body).unwrap();
        assert_eq!(studies.len(), 1);

        let effects = aggregate(&studies, DEFAULT_THRESHOLD);
        assert_eq!(effects, vec![AggregatedEffect::new("Nausea", 0.1)]);
    }

    #[test]
    fn test_invalid_body_is_decode_error() {
        assert!(matches!(
            decode_studies("<html>"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_studies_url_trims_slash() {
        let client = ClinicalTrialsClient::new(SourceConfig {
            api_url: "https://example.org/api/v2/".to_string(),
            ..SourceConfig::default()
        })
        .unwrap();
        assert_eq!(client.studies_url(), "https://example.org/api/v2/studies");
    }
}
