pub mod engine;
pub mod states;

pub use engine::{CompliancePipeline, PipelineDefinition, PipelineEngine, PipelineTransitionError};
pub use states::{
    PipelineAction, PipelineContext, PipelineEvent, PipelineState, TransitionOutcome,
};
