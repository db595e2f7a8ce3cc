//! Paper Analyst
//!
//! Research paper analysis over the Claude API.
//!
//! # Features
//!
//! - **Section Parsing**: the Parser role splits a paper into Introduction,
//!   Methodology, Results and Discussion
//! - **Expert Fan-out**: one specialist role per section, run concurrently
//!   with a bounded worker set
//! - **Retry With Backoff**: exponential backoff plus jitter around every call
//! - **Synthesis**: one cohesive review and a one-sentence summary per page
//! - **Result Store**: pretty JSON per paper, keyed by title
//!
//! # Architecture
//!
//! ```text
//! Document ──► SectionParser ──► ParallelAnalysisRunner ──► SynthesisStage ──► ResultStore
//!                   │                 │  │  │  │                 │
//!                   └─────────────────┴──┴──┴──┴─────────────────┘
//!                                RetryExecutor ──► Backend (Claude API)
//! ```

pub mod agent;
pub mod backend;
pub mod claude;
pub mod config;
pub mod document;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod recovery;
pub mod runner;
pub mod store;
pub mod synthesis;

pub use agent::{AgentRole, AnalysisAgent, RoleTemplates};
pub use backend::{Backend, BackendError};
pub use claude::ClaudeClient;
pub use config::{Config, ConfigError};
pub use document::{Document, Section, SectionSet};
pub use error::{AnalysisError, PipelineResult};
pub use parser::{ParseError, SectionParser};
pub use pipeline::{AnalysisPipeline, AnalysisResult, PipelineStage};
pub use recovery::{RetryExecutor, RetryOutcome, RetryPolicy, RetryStats};
pub use runner::{ParallelAnalysisRunner, SectionAnalyses};
pub use store::{ResultStore, StoreError};
pub use synthesis::{PageSummaries, SynthesisStage};
