//! LLM agent modules for side-effect research.
//!
//! This module provides the tool-calling assistant behind `--query`.

pub mod agent_loop;
pub mod tools;

pub use agent_loop::{AgentConfig, AgentOutcome, SideEffectAgent};
pub use tools::ToolExecutor;
