//! Analysis Pipeline
//!
//! Fixed flow for one paper:
//! ```text
//! Start → Parsed → SectionsAnalyzed → Synthesized → PagesSummarized → Done
//!   └──────────── any failure ────────────────────────────────────→ Failed
//! ```
//! No partial result ever leaves this module.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::{AgentRole, RoleTemplates};
use crate::backend::Backend;
use crate::config::Config;
use crate::document::Document;
use crate::error::PipelineResult;
use crate::parser::SectionParser;
use crate::recovery::{RetryExecutor, RetryPolicy, RetryStats};
use crate::runner::{ParallelAnalysisRunner, SectionAnalyses};
use crate::store::ResultStore;
use crate::synthesis::{PageSummaries, SynthesisStage};

/// Final artifact for one paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub section_analyses: SectionAnalyses,
    pub final_synthesis: String,
    pub page_summaries: PageSummaries,
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    Parsed,
    SectionsAnalyzed,
    Synthesized,
    PagesSummarized,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Start => "start",
            PipelineStage::Parsed => "parsed",
            PipelineStage::SectionsAnalyzed => "sections_analyzed",
            PipelineStage::Synthesized => "synthesized",
            PipelineStage::PagesSummarized => "pages_summarized",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse → analyze sections → synthesize → summarize pages
#[derive(Clone)]
pub struct AnalysisPipeline {
    parser: SectionParser,
    runner: ParallelAnalysisRunner,
    synthesis: SynthesisStage,
    retry: RetryExecutor,
}

impl AnalysisPipeline {
    /// Wire every stage to one backend, one template table and one retry policy
    pub fn new(
        templates: RoleTemplates,
        backend: Arc<dyn Backend>,
        policy: RetryPolicy,
        max_concurrency: usize,
    ) -> Self {
        let templates = Arc::new(templates);
        let retry = RetryExecutor::new(policy);

        let parser = SectionParser::new(
            templates.agent(AgentRole::Parser, backend.clone()),
            retry.clone(),
        );
        let synthesis = SynthesisStage::new(
            templates.agent(AgentRole::Synthesis, backend.clone()),
            retry.clone(),
        );
        let runner = ParallelAnalysisRunner::new(templates, backend, retry.clone(), max_concurrency);

        Self {
            parser,
            runner,
            synthesis,
            retry,
        }
    }

    pub fn from_config(config: &Config, backend: Arc<dyn Backend>) -> Self {
        Self::new(
            RoleTemplates::default(),
            backend,
            config.retry.clone(),
            config.max_concurrency,
        )
    }

    /// Retry counters across every stage and run so far
    pub fn retry_stats(&self) -> RetryStats {
        self.retry.stats()
    }

    /// Run the full flow for one paper
    pub async fn analyze(&self, document: &Document) -> PipelineResult<AnalysisResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("analysis", run_id = %run_id, title = document.title());

        async {
            let started = Instant::now();
            let mut stage = PipelineStage::Start;
            info!(stage = %stage, pages = document.page_count(), "Analysis started");

            match self.drive(document, &mut stage).await {
                Ok(result) => {
                    info!(
                        stage = %PipelineStage::Done,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        retries = %self.retry.stats().format(),
                        "Analysis complete"
                    );
                    Ok(result)
                }
                Err(e) => {
                    error!(
                        stage = %PipelineStage::Failed,
                        after = %stage,
                        attempts = e.attempts(),
                        error = %e,
                        "Analysis failed"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Analyze, then persist under the document title. Nothing is written on failure.
    pub async fn analyze_and_save(
        &self,
        document: &Document,
        store: &ResultStore,
    ) -> PipelineResult<(AnalysisResult, PathBuf)> {
        let result = self.analyze(document).await?;
        let path = store.save(document.title(), &result).await?;
        Ok((result, path))
    }

    async fn drive(
        &self,
        document: &Document,
        stage: &mut PipelineStage,
    ) -> PipelineResult<AnalysisResult> {
        let sections = self.parser.parse(document.full_text()).await?;
        advance(stage, PipelineStage::Parsed);

        let section_analyses = self.runner.run(&sections).await?;
        advance(stage, PipelineStage::SectionsAnalyzed);

        let final_synthesis = self.synthesis.synthesize(&section_analyses).await?;
        advance(stage, PipelineStage::Synthesized);

        let page_summaries = self.synthesis.summarize_pages(document.pages()).await?;
        advance(stage, PipelineStage::PagesSummarized);

        Ok(AnalysisResult {
            section_analyses,
            final_synthesis,
            page_summaries,
        })
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    let from = *stage;
    info!(from = %from, to = %next, "Stage transition");
    *stage = next;
}
