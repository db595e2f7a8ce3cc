//! Shared test backend

#![allow(dead_code)]

use async_trait::async_trait;
use paper_analyst::{AgentRole, Backend, BackendError, RoleTemplates};
use std::collections::HashMap;
use std::sync::Mutex;

/// Backend that answers by role, looked up from the default templates
pub struct ScriptedBackend {
    parser_reply: String,
    /// Transient failures still to hand out, per role
    flaky: Mutex<HashMap<AgentRole, usize>>,
    /// Roles that are always rejected
    rejected: Vec<AgentRole>,
    /// Page summaries for pages containing this marker are rejected
    rejected_page_marker: Option<String>,
    calls: Mutex<Vec<(AgentRole, String)>>,
}

impl ScriptedBackend {
    pub fn new(parser_reply: impl Into<String>) -> Self {
        Self {
            parser_reply: parser_reply.into(),
            flaky: Mutex::new(HashMap::new()),
            rejected: Vec::new(),
            rejected_page_marker: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn flaky(self, role: AgentRole, failures: usize) -> Self {
        self.flaky.lock().unwrap().insert(role, failures);
        self
    }

    pub fn rejecting(mut self, role: AgentRole) -> Self {
        self.rejected.push(role);
        self
    }

    pub fn rejecting_pages_with(mut self, marker: impl Into<String>) -> Self {
        self.rejected_page_marker = Some(marker.into());
        self
    }

    pub fn calls(&self) -> Vec<(AgentRole, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, role: AgentRole) -> usize {
        self.calls().iter().filter(|(r, _)| *r == role).count()
    }

    fn role_of(system: &str) -> AgentRole {
        let templates = RoleTemplates::default();
        AgentRole::ALL
            .into_iter()
            .find(|role| templates.get(*role) == system)
            .expect("system prompt matches a default template")
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, message: &str) -> Result<String, BackendError> {
        let role = Self::role_of(system);
        self.calls.lock().unwrap().push((role, message.to_string()));

        if self.rejected.contains(&role) {
            return Err(BackendError::Rejected(format!("{} refused", role)));
        }

        let is_page_summary = role == AgentRole::Synthesis && message.starts_with("Summarize");
        if let Some(marker) = &self.rejected_page_marker {
            if is_page_summary && message.contains(marker.as_str()) {
                return Err(BackendError::Rejected("page refused".to_string()));
            }
        }

        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(&role) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::RateLimited { retry_after: None });
            }
        }

        let reply = match role {
            AgentRole::Parser => self.parser_reply.clone(),
            AgentRole::Synthesis if message.starts_with("Synthesize") => {
                "A coherent review of the paper.".to_string()
            }
            AgentRole::Synthesis => {
                let page = message.rsplit("\n\n").next().unwrap_or_default();
                format!("This page covers {}.", page.lines().next().unwrap_or_default())
            }
            expert => format!("{} analysis of {} chars", expert, message.len()),
        };
        Ok(reply)
    }
}
