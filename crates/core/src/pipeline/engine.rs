use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::pipeline::states::{
    PipelineAction, PipelineContext, PipelineEvent, PipelineState, TransitionOutcome,
};

/// The legal state transitions of a report run. Kept behind a trait so the
/// controller and its tests drive the same table the audit trail records.
pub trait PipelineDefinition {
    fn initial_state(&self) -> PipelineState;
    fn transition(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct CompliancePipeline;

impl PipelineDefinition for CompliancePipeline {
    fn initial_state(&self) -> PipelineState {
        PipelineState::Gathering
    }

    fn transition(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        transition_compliance(current, event, context)
    }
}

pub struct PipelineEngine<P> {
    pipeline: P,
}

impl<P> PipelineEngine<P>
where
    P: PipelineDefinition,
{
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn initial_state(&self) -> PipelineState {
        self.pipeline.initial_state()
    }

    pub fn apply(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        self.pipeline.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.report_id,
                        audit.correlation_id.clone(),
                        "pipeline.transition_applied",
                        AuditCategory::Pipeline,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event))
                    .with_metadata("iteration", context.iterations_used.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.report_id,
                        audit.correlation_id.clone(),
                        "pipeline.transition_rejected",
                        AuditCategory::Pipeline,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for PipelineEngine<CompliancePipeline> {
    fn default() -> Self {
        Self::new(CompliancePipeline)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PipelineState, event: PipelineEvent },
}

fn transition_compliance(
    current: &PipelineState,
    event: &PipelineEvent,
    context: &PipelineContext,
) -> Result<TransitionOutcome, PipelineTransitionError> {
    use PipelineAction::{
        ComposeDraft, IndexReport, PersistOutcome, RecordFailure, RenderArtifact, ReviewDraft,
    };
    use PipelineEvent::{
        DraftProduced, EvidenceGathered, StageFailed, VerdictApproved, VerdictRejected,
    };
    use PipelineState::{Approved, Exhausted, Failed, Gathering, Generating, Validating};

    let commit_actions = || vec![PersistOutcome, IndexReport, RenderArtifact];

    let (to, actions) = match (current, event) {
        (Gathering, EvidenceGathered) => (Generating, vec![ComposeDraft]),
        (Generating, DraftProduced) => (Validating, vec![ReviewDraft]),
        (Validating, VerdictApproved) => (Approved, commit_actions()),
        (Validating, VerdictRejected) => {
            if context.budget_remaining() {
                (Generating, vec![ComposeDraft])
            } else {
                (Exhausted, commit_actions())
            }
        }
        (Approved | Exhausted | Failed, _) => {
            return Err(PipelineTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
        (_, StageFailed) => (Failed, vec![RecordFailure]),
        _ => {
            return Err(PipelineTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}
