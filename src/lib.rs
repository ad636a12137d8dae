//! swe-eval: declarative benchmark evaluation harness.
//!
//! A run loads a YAML configuration, resolves templates against each
//! dataset instance, prepares a sandbox with configurers, then runs
//! evaluation pipelines and scores them into a report.

// Core modules
pub mod cli;
pub mod config;
pub mod configurer;
pub mod error;
pub mod evaluator;
pub mod options;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod sandbox;
pub mod scoring;
pub mod template;

// Re-export commonly used types
pub use error::{ConfigurationError, ExecutionError, HarnessError, ResolutionError};
pub use pipeline::{EvaluationPipeline, EvaluatorSpec, PipelineExecutor, PipelineResult};
pub use runner::{RunContext, RunOptions, Runner};
pub use scoring::{compute_score, ScoringConfig, ScoringMethod};
pub use template::{resolve, ResolutionScope};
