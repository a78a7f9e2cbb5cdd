use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Gathering,
    Generating,
    Validating,
    Approved,
    Exhausted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Exhausted | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    EvidenceGathered,
    DraftProduced,
    VerdictApproved,
    VerdictRejected,
    StageFailed,
}

/// Counters the transition function needs to decide whether a rejection can
/// buy another generation round. `iterations_used` counts completed
/// generate/validate rounds, so it is at least 1 whenever a verdict arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub iterations_used: u32,
    pub max_iterations: u32,
}

impl PipelineContext {
    pub fn new(max_iterations: u32) -> Self {
        Self { iterations_used: 0, max_iterations }
    }

    pub fn budget_remaining(&self) -> bool {
        self.iterations_used < self.max_iterations
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineAction {
    ComposeDraft,
    ReviewDraft,
    PersistOutcome,
    IndexReport,
    RenderArtifact,
    RecordFailure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineState,
    pub to: PipelineState,
    pub event: PipelineEvent,
    pub actions: Vec<PipelineAction>,
}
