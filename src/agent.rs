//! Analysis Roles
//!
//! Six fixed specialisations, each bound to an instruction template:
//! 1. Parser - splits the paper into sections
//! 2. Introduction - problem statement, research questions, significance
//! 3. Methodology - methods, experimental design, data collection
//! 4. Results - findings, statistics, visualisations
//! 5. Discussion - interpretation, implications, limitations
//! 6. Synthesis - cohesive review and page summaries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{Backend, BackendError};

/// Role in the analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Parser,
    Introduction,
    Methodology,
    Results,
    Discussion,
    Synthesis,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        AgentRole::Parser,
        AgentRole::Introduction,
        AgentRole::Methodology,
        AgentRole::Results,
        AgentRole::Discussion,
        AgentRole::Synthesis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Parser => "Parser_Agent",
            AgentRole::Introduction => "Introduction_Expert",
            AgentRole::Methodology => "Methodology_Expert",
            AgentRole::Results => "Results_Expert",
            AgentRole::Discussion => "Discussion_Expert",
            AgentRole::Synthesis => "Synthesis_Expert",
        }
    }

    /// Built-in instruction template
    pub fn default_template(&self) -> &'static str {
        match self {
            AgentRole::Parser => PARSER_PROMPT,
            AgentRole::Introduction => INTRODUCTION_PROMPT,
            AgentRole::Methodology => METHODOLOGY_PROMPT,
            AgentRole::Results => RESULTS_PROMPT,
            AgentRole::Discussion => DISCUSSION_PROMPT,
            AgentRole::Synthesis => SYNTHESIS_PROMPT,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable role → system prompt table
#[derive(Debug, Clone)]
pub struct RoleTemplates {
    templates: HashMap<AgentRole, Arc<str>>,
}

impl Default for RoleTemplates {
    fn default() -> Self {
        let templates = AgentRole::ALL
            .into_iter()
            .map(|role| (role, Arc::from(role.default_template())))
            .collect();
        Self { templates }
    }
}

impl RoleTemplates {
    /// Replace one role's template (builder style, before agents are made)
    pub fn with_template(mut self, role: AgentRole, template: impl Into<String>) -> Self {
        self.templates.insert(role, Arc::from(template.into()));
        self
    }

    pub fn get(&self, role: AgentRole) -> &str {
        // Every role is seeded in Default and never removed
        self.templates
            .get(&role)
            .map(|t| t.as_ref())
            .unwrap_or_else(|| role.default_template())
    }

    /// Bind a role to a backend
    pub fn agent(&self, role: AgentRole, backend: Arc<dyn Backend>) -> AnalysisAgent {
        AnalysisAgent {
            role,
            system_prompt: self
                .templates
                .get(&role)
                .cloned()
                .unwrap_or_else(|| Arc::from(role.default_template())),
            backend,
        }
    }
}

/// A role bound to its instructions and a backend
#[derive(Clone)]
pub struct AnalysisAgent {
    role: AgentRole,
    system_prompt: Arc<str>,
    backend: Arc<dyn Backend>,
}

impl AnalysisAgent {
    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Single backend round-trip, no retries
    pub async fn respond(&self, message: &str) -> Result<String, BackendError> {
        debug!(
            role = self.role.name(),
            backend = self.backend.name(),
            message_len = message.len(),
            "Agent request"
        );
        self.backend.complete(&self.system_prompt, message).await
    }
}

impl fmt::Debug for AnalysisAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisAgent")
            .field("role", &self.role)
            .field("backend", &self.backend.name())
            .finish()
    }
}

// ============================================================================
// ROLE SYSTEM PROMPTS
// ============================================================================

const PARSER_PROMPT: &str = "You are responsible for parsing and preprocessing the research paper. \
Parse the paper into sections (Introduction, Methodology, Results, Discussion) and handle any \
necessary preprocessing steps. Respond with a single JSON object whose keys are section names \
and whose values are the section text. Omit sections the paper does not contain.";

const INTRODUCTION_PROMPT: &str = "You are an expert in analyzing research paper introductions. \
Focus on the problem statement, research questions, and significance of the study.";

const METHODOLOGY_PROMPT: &str = "You are an expert in research methodologies. Analyze the \
methods, experimental design, and data collection techniques used in the paper.";

const RESULTS_PROMPT: &str = "You are an expert in interpreting research results. Analyze the \
findings, statistical analyses, and data visualizations presented in the paper.";

const DISCUSSION_PROMPT: &str = "You are an expert in research paper discussions. Analyze the \
interpretation of results, implications, limitations, and future research directions.";

const SYNTHESIS_PROMPT: &str = "You are an expert in synthesizing information from all parts of \
a research paper. Provide a cohesive analysis that highlights the key aspects and contributions \
of the study.";
