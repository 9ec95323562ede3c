//! Agent profile served to the agent host.
//!
//! The host owns the model loop; this crate only tells it which model to
//! run, with which system prompt, and which of the registered tools it may
//! call.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::AgentConfig;
use crate::traits::ToolRegistry;

/// System prompt used when neither `agent.instruction` nor
/// `agent.instruction_path` is configured.
pub const DEFAULT_INSTRUCTION: &str = "You help teachers find exam questions in the question bank. \
Use retrieve_exam_questions for free-text requests, retrieve_questions_by_concept when the teacher \
names a concept, and retrieve_question_by_id when they give a question ID such as q_001. \
Quote question IDs and concepts exactly as the tools return them and never invent questions. \
If a lookup returns nothing, say so.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub model: String,
    pub instruction: String,
    /// Names of the tools the agent may call, in registration order.
    pub tools: Vec<String>,
}

impl AgentProfile {
    pub fn from_config(config: &AgentConfig, registry: &ToolRegistry) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            model: config.model.clone(),
            instruction: resolve_instruction(config)?,
            tools: registry.names(),
        })
    }
}

/// Inline instruction, else the prompt file, else [`DEFAULT_INSTRUCTION`].
fn resolve_instruction(config: &AgentConfig) -> Result<String> {
    if let Some(ref inline) = config.instruction {
        if !inline.trim().is_empty() {
            return Ok(inline.trim().to_string());
        }
    }
    if let Some(ref path) = config.instruction_path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent instruction: {}", path.display()))?;
        return Ok(text.trim().to_string());
    }
    Ok(DEFAULT_INSTRUCTION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_describe_builtin_tools() {
        let profile =
            AgentProfile::from_config(&AgentConfig::default(), &ToolRegistry::with_builtins())
                .unwrap();
        assert_eq!(profile.name, "question_rag");
        assert_eq!(profile.model, "gemini-2.5-pro");
        assert_eq!(
            profile.tools,
            vec![
                "retrieve_exam_questions",
                "retrieve_questions_by_concept",
                "retrieve_question_by_id"
            ]
        );
        for tool in &profile.tools {
            assert!(profile.instruction.contains(tool.as_str()));
        }
    }

    #[test]
    fn instruction_sources_in_priority_order() {
        let tmp = TempDir::new().unwrap();
        let prompt = tmp.path().join("prompt.txt");
        std::fs::write(&prompt, "\n  From file.\n").unwrap();

        let mut cfg = AgentConfig {
            instruction_path: Some(prompt),
            ..AgentConfig::default()
        };
        assert_eq!(resolve_instruction(&cfg).unwrap(), "From file.");

        cfg.instruction = Some("Inline.".to_string());
        assert_eq!(resolve_instruction(&cfg).unwrap(), "Inline.");

        cfg.instruction = None;
        cfg.instruction_path = Some(tmp.path().join("missing.txt"));
        assert!(resolve_instruction(&cfg).is_err());
    }
}
