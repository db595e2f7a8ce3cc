//! Parallel Section Analysis
//!
//! Fans section → role pairs out over a bounded set of tokio tasks and
//! collects the analyses keyed by section, whatever order they finish in.
//! The first terminal failure aborts the remaining tasks.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::agent::{AgentRole, RoleTemplates};
use crate::backend::Backend;
use crate::document::{Section, SectionSet};
use crate::error::{AnalysisError, PipelineResult};
use crate::recovery::RetryExecutor;

/// Section → analysis text, iterated in canonical order
pub type SectionAnalyses = BTreeMap<Section, String>;

/// Role list and section set disagree in length
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot pair {roles} roles with {sections} sections")]
pub struct PairingMismatch {
    pub roles: usize,
    pub sections: usize,
}

/// One unit of fan-out work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTask {
    pub role: AgentRole,
    pub section: Section,
    pub content: String,
}

/// Zip an ordered role list against sections in canonical order
pub fn pair_positionally(
    roles: &[AgentRole],
    sections: &SectionSet,
) -> Result<Vec<SectionTask>, PairingMismatch> {
    if roles.len() != sections.len() {
        return Err(PairingMismatch {
            roles: roles.len(),
            sections: sections.len(),
        });
    }

    Ok(roles
        .iter()
        .zip(sections)
        .map(|(role, (section, content))| SectionTask {
            role: *role,
            section: *section,
            content: content.clone(),
        })
        .collect())
}

/// Pair each section with the expert for that section
pub fn pair_by_section(sections: &SectionSet) -> Vec<SectionTask> {
    sections
        .iter()
        .map(|(section, content)| SectionTask {
            role: section.role(),
            section: *section,
            content: content.clone(),
        })
        .collect()
}

pub fn build_analysis_prompt(section: Section, content: &str) -> String {
    format!("Analyze the {} section:\n\n{}", section, content)
}

/// Bounded fan-out of section analyses
#[derive(Clone)]
pub struct ParallelAnalysisRunner {
    templates: Arc<RoleTemplates>,
    backend: Arc<dyn Backend>,
    retry: RetryExecutor,
    max_concurrency: usize,
}

impl ParallelAnalysisRunner {
    pub fn new(
        templates: Arc<RoleTemplates>,
        backend: Arc<dyn Backend>,
        retry: RetryExecutor,
        max_concurrency: usize,
    ) -> Self {
        Self {
            templates,
            backend,
            retry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Analyze every section with its matching expert
    pub async fn run(&self, sections: &SectionSet) -> PipelineResult<SectionAnalyses> {
        self.run_tasks(pair_by_section(sections)).await
    }

    /// Analyze pre-paired tasks. A section listed twice is refused before dispatch.
    pub async fn run_tasks(&self, tasks: Vec<SectionTask>) -> PipelineResult<SectionAnalyses> {
        let mut seen = BTreeSet::new();
        if let Some(task) = tasks.iter().find(|t| !seen.insert(t.section)) {
            return Err(AnalysisError::DuplicateTask(task.section));
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();

        for SectionTask {
            role,
            section,
            content,
        } in tasks
        {
            info!(role = role.name(), section = section.as_str(), "Dispatching section analysis");

            let agent = self.templates.agent(role, self.backend.clone());
            let retry = self.retry.clone();
            let semaphore = semaphore.clone();

            set.spawn(async move {
                let work = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| AnalysisError::WorkerLost(e.to_string()))?;
                    let prompt = build_analysis_prompt(section, &content);
                    retry
                        .execute(section.as_str(), || agent.respond(&prompt))
                        .await
                };

                let result = AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(AnalysisError::WorkerLost(panic_message(&*panic))));

                (section, result)
            });
        }

        let mut analyses = SectionAnalyses::new();

        // Returning early drops the set, which aborts every task still running
        while let Some(joined) = set.join_next().await {
            let (section, result) = joined.map_err(|e| AnalysisError::WorkerLost(e.to_string()))?;

            match result {
                Ok(analysis) => {
                    info!(section = section.as_str(), chars = analysis.len(), "Section analyzed");
                    analyses.insert(section, analysis);
                }
                Err(e) => {
                    error!(section = section.as_str(), error = %e, "Section analysis failed, aborting batch");
                    set.abort_all();
                    return Err(AnalysisError::SectionFanoutFailure {
                        section,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(analyses)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::recovery::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers "<system>|<message length>" after a short sleep, tracking overlap
    #[derive(Default)]
    struct SlowEcho {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        messages: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        panic_on: Option<&'static str>,
    }

    #[async_trait]
    impl Backend for SlowEcho {
        fn name(&self) -> &str {
            "slow-echo"
        }

        async fn complete(&self, system: &str, message: &str) -> Result<String, BackendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.messages.lock().unwrap().push(message.to_string());

            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on.is_some_and(|m| message.contains(m)) {
                panic!("backend exploded");
            }
            if self.fail_on.is_some_and(|m| message.contains(m)) {
                return Err(BackendError::Rejected("bad request".into()));
            }
            Ok(format!("{}|{}", system, message.len()))
        }
    }

    fn runner(backend: Arc<SlowEcho>, max_concurrency: usize) -> ParallelAnalysisRunner {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(100)).unwrap();
        ParallelAnalysisRunner::new(
            Arc::new(RoleTemplates::default()),
            backend,
            RetryExecutor::new(policy),
            max_concurrency,
        )
    }

    fn sections(n: usize) -> SectionSet {
        Section::ALL
            .into_iter()
            .take(n)
            .map(|s| (s, format!("{} body", s)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_set_preserved() {
        for n in 1..=4 {
            let input = sections(n);
            let output = runner(Arc::new(SlowEcho::default()), 4).run(&input).await.unwrap();
            assert_eq!(
                output.keys().collect::<Vec<_>>(),
                input.keys().collect::<Vec<_>>()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sections_go_to_matching_expert() {
        let backend = Arc::new(SlowEcho::default());
        let output = runner(backend.clone(), 4).run(&sections(4)).await.unwrap();

        for (section, analysis) in &output {
            let template = section.role().default_template();
            assert!(analysis.starts_with(&format!("{}|", template)), "{}: {}", section, analysis);
        }

        let messages = backend.messages.lock().unwrap();
        assert!(messages.contains(&"Analyze the Results section:\n\nResults body".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let backend = Arc::new(SlowEcho::default());
        runner(backend.clone(), 2).run(&sections(4)).await.unwrap();
        assert_eq!(backend.peak.load(Ordering::SeqCst), 2);

        let backend = Arc::new(SlowEcho::default());
        runner(backend.clone(), 1).run(&sections(4)).await.unwrap();
        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_batch() {
        let backend = Arc::new(SlowEcho {
            fail_on: Some("Methodology"),
            ..Default::default()
        });

        let err = runner(backend, 4).run(&sections(4)).await.unwrap_err();
        match err {
            AnalysisError::SectionFanoutFailure { section, source } => {
                assert_eq!(section, Section::Methodology);
                assert!(matches!(*source, AnalysisError::BackendRejected { .. }));
            }
            other => panic!("expected fan-out failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_is_reported() {
        let backend = Arc::new(SlowEcho {
            panic_on: Some("Discussion"),
            ..Default::default()
        });

        let err = runner(backend, 4).run(&sections(4)).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::SectionFanoutFailure {
                section: Section::Discussion,
                ref source,
            } if matches!(**source, AnalysisError::WorkerLost(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_set_yields_empty_map() {
        let output = runner(Arc::new(SlowEcho::default()), 2)
            .run(&SectionSet::new())
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_positional_tasks_use_given_roles() {
        let backend = Arc::new(SlowEcho::default());
        let tasks =
            pair_positionally(&[AgentRole::Discussion, AgentRole::Results], &sections(2)).unwrap();

        let output = runner(backend, 2).run_tasks(tasks).await.unwrap();

        let discussion = format!("{}|", AgentRole::Discussion.default_template());
        let results = format!("{}|", AgentRole::Results.default_template());
        assert!(output[&Section::Introduction].starts_with(&discussion));
        assert!(output[&Section::Methodology].starts_with(&results));
    }

    #[tokio::test]
    async fn test_duplicate_task_refused() {
        let backend = Arc::new(SlowEcho::default());
        let task = SectionTask {
            role: AgentRole::Results,
            section: Section::Results,
            content: "x".to_string(),
        };

        let err = runner(backend.clone(), 2)
            .run_tasks(vec![task.clone(), task])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::DuplicateTask(Section::Results)));
        assert!(backend.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_positional_pairing() {
        let input = sections(2);
        let tasks =
            pair_positionally(&[AgentRole::Discussion, AgentRole::Results], &input).unwrap();
        assert_eq!(tasks[0].role, AgentRole::Discussion);
        assert_eq!(tasks[0].section, Section::Introduction);
        assert_eq!(tasks[1].role, AgentRole::Results);

        assert_eq!(
            pair_positionally(&[AgentRole::Results], &input),
            Err(PairingMismatch {
                roles: 1,
                sections: 2
            })
        );
    }

    #[test]
    fn test_pair_by_section() {
        let tasks = pair_by_section(&sections(3));
        assert!(tasks.iter().all(|t| t.role == t.section.role()));
    }
}
