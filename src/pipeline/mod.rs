//! Evaluation pipelines.
//!
//! An [`EvaluationPipeline`] is an ordered list of [`EvaluatorSpec`]s plus a
//! scoring configuration. [`PipelineExecutor`] runs one pipeline against one
//! prepared sandbox and produces a [`PipelineResult`] with exactly one
//! [`EvaluatorResult`] per declared evaluator.

pub mod executor;
pub mod result;
pub mod spec;

pub use executor::{PipelineExecutor, PipelineInput};
pub use result::{EvaluatorResult, EvaluatorStatus, FailureCause, PipelineResult, PipelineStatus};
pub use spec::{EvaluationPipeline, EvaluatorSpec};
