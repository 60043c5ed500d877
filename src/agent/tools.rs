//! Tool definitions for the side-effect assistant.
//!
//! This module defines the tools the LLM can call. Read tools expose the
//! study feed and the store; write tools go through the tracker, so the
//! model cannot store a side effect that is already recorded.

use crate::error::TrackerError;
use crate::models::AggregatedEffect;
use crate::source::StudySource;
use crate::store::ReportStore;
use crate::tracker::SideEffectTracker;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Tool definition for Ollama's tool-calling API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call made by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }

    fn json(value: Value) -> Self {
        Self::success(value.to_string())
    }
}

impl From<TrackerError> for ToolResult {
    fn from(e: TrackerError) -> Self {
        ToolResult::error(e.to_string())
    }
}

/// A side effect the assistant stored during a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEffect {
    pub drug_name: String,
    pub effect: AggregatedEffect,
}

/// Executes tool calls against a tracker.
pub struct ToolExecutor<S, R> {
    tracker: SideEffectTracker<S, R>,
    recorded: Vec<RecordedEffect>,
}

impl<S: StudySource, R: ReportStore> ToolExecutor<S, R> {
    pub fn new(tracker: SideEffectTracker<S, R>) -> Self {
        Self {
            tracker,
            recorded: Vec::new(),
        }
    }

    /// Side effects stored through `create_side_effect` so far.
    pub fn recorded(&self) -> &[RecordedEffect] {
        &self.recorded
    }

    /// Execute a tool call and return the result.
    pub async fn execute(&mut self, tool_call: &ToolCall) -> ToolResult {
        let name = &tool_call.function.name;
        let args = &tool_call.function.arguments;

        debug!("Executing tool: {} with args: {:?}", name, args);

        match name.as_str() {
            "get_side_effects_for_drug" => self.get_side_effects_for_drug(args).await,
            "list_drugs" => self.list_drugs(),
            "list_side_effects" => self.list_side_effects(args),
            "create_drug" => self.create_drug(args),
            "create_side_effect" => self.create_side_effect(args),
            "finish" => ToolResult::success("done".to_string()),
            _ => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }

    /// Fetch and aggregate current side effects from ClinicalTrials.gov.
    async fn get_side_effects_for_drug(&self, args: &Value) -> ToolResult {
        let drug_name = match required_str(args, "drug_name") {
            Ok(name) => name,
            Err(e) => return e,
        };

        match self.tracker.fetch_side_effects(drug_name).await {
            Ok(effects) => ToolResult::json(json!(effects
                .iter()
                .map(|e| json!({
                    "side_effect_name": e.name,
                    "side_effect_probability": e.probability,
                }))
                .collect::<Vec<_>>())),
            Err(e) => e.into(),
        }
    }

    fn list_drugs(&self) -> ToolResult {
        match self.tracker.list_drugs() {
            Ok(drugs) => ToolResult::json(json!(drugs
                .into_iter()
                .map(|d| d.name)
                .collect::<Vec<_>>())),
            Err(e) => e.into(),
        }
    }

    fn list_side_effects(&self, args: &Value) -> ToolResult {
        let drug_name = match required_str(args, "drug_name") {
            Ok(name) => name,
            Err(e) => return e,
        };

        match self.tracker.list_side_effects(drug_name) {
            Ok(Some(reports)) => ToolResult::json(json!(reports
                .iter()
                .map(|r| json!({
                    "name": r.side_effect_name,
                    "probability": r.probability,
                }))
                .collect::<Vec<_>>())),
            Ok(None) => ToolResult::error(format!("Drug '{}' not found", drug_name)),
            Err(e) => e.into(),
        }
    }

    fn create_drug(&mut self, args: &Value) -> ToolResult {
        let drug_name = match required_str(args, "drug_name") {
            Ok(name) => name,
            Err(e) => return e,
        };

        match self.tracker.create_drug(drug_name) {
            Ok((drug, true)) => ToolResult::success(format!(
                "Drug '{}' created with ID {}",
                drug.name, drug.id
            )),
            Ok((drug, false)) => ToolResult::success(format!(
                "Drug '{}' already exists with ID {}",
                drug.name, drug.id
            )),
            Err(e) => e.into(),
        }
    }

    fn create_side_effect(&mut self, args: &Value) -> ToolResult {
        let drug_name = match required_str(args, "drug_name") {
            Ok(name) => name,
            Err(e) => return e,
        };
        let side_effect_name = match required_str(args, "side_effect_name") {
            Ok(name) => name,
            Err(e) => return e,
        };
        let Some(probability) = args.get("probability").and_then(|v| v.as_f64()) else {
            return ToolResult::error("Missing required parameter: probability".to_string());
        };

        match self
            .tracker
            .record_side_effect(drug_name, side_effect_name, probability)
        {
            Ok(reconciliation) if reconciliation.effects_to_persist.is_empty() => {
                ToolResult::success(format!(
                    "Side effect '{}' already exists for '{}'",
                    side_effect_name, reconciliation.drug_name
                ))
            }
            Ok(reconciliation) => {
                for effect in reconciliation.effects_to_persist {
                    self.recorded.push(RecordedEffect {
                        drug_name: reconciliation.drug_name.clone(),
                        effect,
                    });
                }
                ToolResult::success(format!(
                    "Side effect '{}' added to '{}'",
                    side_effect_name, reconciliation.drug_name
                ))
            }
            Err(e) => e.into(),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::error(format!("Missing required parameter: {}", key)))
}

fn function(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

fn drug_name_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "drug_name": {
                "type": "string",
                "description": "Name of the drug"
            }
        },
        "required": ["drug_name"]
    })
}

/// Get the tool definitions for the Ollama API.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        function(
            "get_side_effects_for_drug",
            "Get serious side effects reported on ClinicalTrials.gov for a drug. Returns a list of side_effect_name and side_effect_probability.",
            drug_name_parameters(),
        ),
        function(
            "list_drugs",
            "List all drugs in the database.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        function(
            "list_side_effects",
            "List all side effects stored for a specific drug.",
            drug_name_parameters(),
        ),
        function(
            "create_drug",
            "Create a new drug in the database. Use list_drugs first to check whether it already exists.",
            drug_name_parameters(),
        ),
        function(
            "create_side_effect",
            "Store a new side effect for an existing drug. Side effects that are already stored are left unchanged.",
            json!({
                "type": "object",
                "properties": {
                    "drug_name": {
                        "type": "string",
                        "description": "Name of an existing drug"
                    },
                    "side_effect_name": {
                        "type": "string",
                        "description": "Side effect name exactly as returned by get_side_effects_for_drug"
                    },
                    "probability": {
                        "type": "number",
                        "description": "Probability between 0 and 1"
                    }
                },
                "required": ["drug_name", "side_effect_name", "probability"]
            }),
        ),
        function(
            "finish",
            "Call this when you are done. Pass your final summary of what was found and what was new.",
            json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Summary for the user"
                    }
                },
                "required": ["summary"]
            }),
        ),
    ]
}
