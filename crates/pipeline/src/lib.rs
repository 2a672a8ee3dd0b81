//! # deepdive-pipeline
//!
//! The event-driven research workflow. A research query moves through four
//! stages, each triggered by the previous stage's completion event:
//!
//! ```text
//! research.started → planning → plan.completed → gathering
//!   → findings.completed → analysis → analysis.completed → synthesis
//!   → report.completed
//! ```
//!
//! Any stage failure marks the record `failed` and publishes `stage.failed`.

pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod repository;
pub mod stage;
pub mod stages;
pub mod status;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use pipeline::{PipelineSettings, ResearchPipeline};
pub use repository::ResearchRepository;
pub use stage::{StageContext, StageHandler, StageOutput, run_stage};
pub use status::{ResearchView, StatusAssembler};
