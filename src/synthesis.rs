//! Synthesis Stage
//!
//! Merges section analyses into one review and produces a one-sentence
//! summary per page, both through the Synthesis role.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::agent::{AgentRole, AnalysisAgent};
use crate::error::{AnalysisError, PipelineResult};
use crate::recovery::RetryExecutor;
use crate::runner::SectionAnalyses;

const SYNTHESIS_PREFIX: &str = "Synthesize the following analyses into a comprehensive review:\n\n";

/// Page index → one-sentence summary
pub type PageSummaries = BTreeMap<usize, String>;

pub fn build_synthesis_prompt(analyses: &SectionAnalyses) -> String {
    let mut prompt = String::from(SYNTHESIS_PREFIX);
    for (section, analysis) in analyses {
        prompt.push_str(&format!("{}:\n{}\n\n", section, analysis));
    }
    prompt
}

pub fn build_page_prompt(page: &str) -> String {
    format!("Summarize this page content in one sentence:\n\n{}", page)
}

#[derive(Debug, Clone)]
pub struct SynthesisStage {
    agent: AnalysisAgent,
    retry: RetryExecutor,
}

impl SynthesisStage {
    pub fn new(agent: AnalysisAgent, retry: RetryExecutor) -> Self {
        debug_assert_eq!(agent.role(), AgentRole::Synthesis);
        Self { agent, retry }
    }

    /// One Synthesis call over every analysis, in canonical section order
    pub async fn synthesize(&self, analyses: &SectionAnalyses) -> PipelineResult<String> {
        let prompt = build_synthesis_prompt(analyses);
        let review = self
            .retry
            .execute("synthesis", || self.agent.respond(&prompt))
            .await?;

        info!(sections = analyses.len(), chars = review.len(), "Synthesis complete");
        Ok(review)
    }

    /// Summarize pages one at a time, keeping each page's outcome separate
    pub async fn summarize_pages_isolated(
        &self,
        pages: &BTreeMap<usize, String>,
    ) -> BTreeMap<usize, PipelineResult<String>> {
        let mut outcomes = BTreeMap::new();

        for (&index, page) in pages {
            let prompt = build_page_prompt(page);
            let label = format!("page {}", index);
            let outcome = self
                .retry
                .execute(&label, || self.agent.respond(&prompt))
                .await;

            if let Err(ref e) = outcome {
                warn!(page = index, error = %e, "Page summary failed");
            }
            outcomes.insert(index, outcome);
        }

        outcomes
    }

    /// Summarize every page, failing if any page could not be summarized
    pub async fn summarize_pages(&self, pages: &BTreeMap<usize, String>) -> PipelineResult<PageSummaries> {
        let mut summaries = PageSummaries::new();
        let mut failed_pages = Vec::new();
        let mut first_error = None;

        for (index, outcome) in self.summarize_pages_isolated(pages).await {
            match outcome {
                Ok(summary) => {
                    summaries.insert(index, summary);
                }
                Err(e) => {
                    failed_pages.push(index);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(source) = first_error {
            return Err(AnalysisError::PageSummaryFailure {
                failed_pages,
                source: Box::new(source),
            });
        }

        info!(pages = summaries.len(), "Page summaries complete");
        Ok(summaries)
    }
}
