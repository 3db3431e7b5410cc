//! The daily pipeline: extraction, validation, state, orchestration.

pub mod extract;
pub mod orchestrator;
pub mod state;
pub mod validate;

pub use extract::extract_payload;
pub use orchestrator::{PipelineOrchestrator, RunContext, Stage};
pub use state::WorkflowState;
pub use validate::{validate_stage, StageFailure};
