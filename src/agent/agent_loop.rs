//! Agent loop for tool-based side-effect research.
//!
//! The model follows a fixed procedure: check the store, fetch current
//! trial data, record what is new, then summarise. All tool calls run
//! through [`ToolExecutor`].

use crate::agent::tools::{get_tool_definitions, RecordedEffect, ToolCall, ToolExecutor};
use crate::source::StudySource;
use crate::store::ReportStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_iterations: usize,
    pub timeout_seconds: u64,
    /// Max tool results to keep in context (sliding window)
    pub max_context_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            max_iterations: 25,
            timeout_seconds: 300,
            max_context_messages: 10,
        }
    }
}

impl From<&crate::config::ModelConfig> for AgentConfig {
    fn from(model: &crate::config::ModelConfig) -> Self {
        Self {
            ollama_url: model.ollama_url.clone(),
            model_name: model.name.clone(),
            temperature: model.temperature,
            max_iterations: model.max_iterations,
            timeout_seconds: model.timeout_seconds,
            max_context_messages: model.max_context_messages,
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// What a finished agent run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    /// The model's final answer.
    pub response: String,
    /// Side effects stored during the run.
    pub recorded: Vec<RecordedEffect>,
    /// Model round trips used.
    pub iterations: usize,
}

/// The side-effect research agent.
pub struct SideEffectAgent<S, R> {
    config: AgentConfig,
    http_client: reqwest::Client,
    tool_executor: ToolExecutor<S, R>,
    messages: Vec<ChatMessage>,
}

impl<S: StudySource, R: ReportStore> SideEffectAgent<S, R> {
    /// Create a new agent around a tool executor.
    pub fn new(config: AgentConfig, tool_executor: ToolExecutor<S, R>) -> Result<Self> {
        info!(
            "Initializing agent with model {} at {}",
            config.model_name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
            tool_executor,
            messages: Vec::new(),
        })
    }

    /// Answer a user query, calling tools until the model is done.
    pub async fn run(&mut self, query: &str) -> Result<AgentOutcome> {
        info!("Starting agent run");

        self.messages.clear();
        self.messages
            .push(ChatMessage::new("system", AGENT_SYSTEM_PROMPT));
        self.messages.push(ChatMessage::new("user", query));

        let mut final_response = None;
        let mut iterations = 0;

        for iteration in 0..self.config.max_iterations {
            iterations = iteration + 1;
            debug!("Agent iteration {}", iterations);

            let response = self.chat_with_tools().await?;

            let Some(tool_calls) = response.tool_calls.filter(|calls| !calls.is_empty()) else {
                // A plain answer ends the run
                final_response = Some(response.content);
                break;
            };

            let mut finished = None;
            for tool_call in tool_calls {
                let tool_name = tool_call.function.name.clone();

                if tool_name == "finish" {
                    let summary = tool_call
                        .function
                        .arguments
                        .get("summary")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    info!("Agent finished");
                    finished = Some(summary);
                    break;
                }

                let result = self.tool_executor.execute(&tool_call).await;

                self.messages.push(ChatMessage::new(
                    "tool",
                    if result.success {
                        result.output
                    } else {
                        format!("Error: {}", result.error.unwrap_or_default())
                    },
                ));

                // Sliding window: prune old tool messages to save context
                self.prune_old_messages();

                info!("Tool {} executed", tool_name);
            }

            if let Some(summary) = finished {
                final_response = Some(summary);
                break;
            }
        }

        let response = match final_response {
            Some(response) => response,
            None => {
                warn!(
                    "Agent stopped after {} iterations without a final answer",
                    self.config.max_iterations
                );
                self.last_assistant_content().unwrap_or_default()
            }
        };

        let recorded = self.tool_executor.recorded().to_vec();
        info!(
            "Agent run complete. Recorded {} new side effects.",
            recorded.len()
        );

        Ok(AgentOutcome {
            response,
            recorded,
            iterations,
        })
    }

    fn last_assistant_content(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant" && !m.content.is_empty())
            .map(|m| m.content.clone())
    }

    /// Prune old tool messages to keep context small (sliding window).
    fn prune_old_messages(&mut self) {
        // Keep: system prompt + user query + last N messages
        let keep_start = 2;
        let max_keep = self.config.max_context_messages + keep_start;

        if self.messages.len() > max_keep {
            let remove_count = self.messages.len() - max_keep;
            self.messages.drain(keep_start..keep_start + remove_count);
            debug!("Pruned {} old messages to save context", remove_count);
        }
    }

    /// Send a chat request with tools to Ollama.
    async fn chat_with_tools(&mut self) -> Result<ChatMessage> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let tools_json = get_tool_definitions()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
            .context("Failed to serialize tool definitions")?;

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: self.messages.clone(),
            tools: tools_json,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending chat request with {} messages", self.messages.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!(
                        "Request timed out after {}s. Try a different model.",
                        self.config.timeout_seconds
                    )
                } else if e.is_connect() {
                    anyhow::anyhow!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.config.ollama_url
                    )
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        self.messages.push(ChatMessage {
            role: "assistant".to_string(),
            content: chat_response.message.content.clone(),
            tool_calls: chat_response.message.tool_calls.clone(),
        });

        Ok(chat_response.message)
    }
}

/// System prompt for tool-calling mode
const AGENT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant for finding side effects of drugs.

## Available Tools

- `list_drugs()` - List all drugs in the database
- `list_side_effects(drug_name)` - List stored side effects of a drug
- `get_side_effects_for_drug(drug_name)` - Get current side effects from ClinicalTrials.gov
- `create_drug(drug_name)` - Add a drug to the database
- `create_side_effect(drug_name, side_effect_name, probability)` - Store a new side effect
- `finish(summary)` - Call when done

## Your Process

1. List all drugs in the database
2. If the drug already exists, list all side effects for that drug
3. Get new side effects using the get_side_effects_for_drug tool
4. If the drug does not exist yet, create it
5. For every side effect that is not in the database, create a new side effect report for that drug
6. Call finish with a summary of what you found and what was new

Use side effect names exactly as returned by get_side_effects_for_drug.
"#;
