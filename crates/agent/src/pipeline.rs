use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use routewatch_core::audit::{AuditContext, AuditSink};
use routewatch_core::errors::{ApplicationError, DomainError};
use routewatch_core::pipeline::{
    CompliancePipeline, PipelineContext, PipelineEngine, PipelineEvent, PipelineState,
};
use routewatch_core::{
    CompanyProfile, EvidenceItem, Report, ReportContent, ReportId, ReportStatus, SearchMetadata,
    ValidationRecord,
};
use routewatch_db::repositories::ReportRepository;
use routewatch_search::ReportIndex;

use crate::drafter::ReportDrafter;
use crate::gatherer::EvidenceSource;
use crate::validator::ReportValidator;

/// Commit-phase document rendering seam. Returns the artifact path; a
/// failure here never changes a run's outcome.
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self, report: &Report, evidence: &[EvidenceItem]) -> anyhow::Result<String>;
}

/// Orchestrates one report run: gather once, then generate/validate rounds
/// under the iteration budget, then commit the terminal record.
///
/// Stage fallbacks keep the loop alive (malformed drafts repair to a
/// skeleton, broken verdicts pass fail-open); what remains fatal is a
/// gatherer that could not run at all, a dead LLM during drafting, or a
/// persistence failure on the terminal record. The first two produce a
/// `Failed` report; only the last surfaces as an error.
pub struct PipelineController {
    gatherer: Arc<dyn EvidenceSource>,
    drafter: ReportDrafter,
    validator: ReportValidator,
    repository: Arc<dyn ReportRepository>,
    index: Arc<dyn ReportIndex>,
    renderer: Option<Arc<dyn ArtifactRenderer>>,
    audit: Arc<dyn AuditSink>,
    engine: PipelineEngine<CompliancePipeline>,
    max_iterations: u32,
}

impl PipelineController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gatherer: Arc<dyn EvidenceSource>,
        drafter: ReportDrafter,
        validator: ReportValidator,
        repository: Arc<dyn ReportRepository>,
        index: Arc<dyn ReportIndex>,
        audit: Arc<dyn AuditSink>,
        max_iterations: u32,
    ) -> Self {
        Self {
            gatherer,
            drafter,
            validator,
            repository,
            index,
            renderer: None,
            audit,
            engine: PipelineEngine::default(),
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Runs the full pipeline for one profile. Always terminates in exactly
    /// one of Approved, Exhausted, or Failed; the returned report is the
    /// persisted record (Failed records are persisted best-effort).
    pub async fn run(
        &self,
        profile: &CompanyProfile,
        correlation_id: &str,
    ) -> Result<Report, ApplicationError> {
        let report_id = ReportId::generate();
        let audit_context =
            AuditContext::new(Some(report_id), correlation_id, "pipeline-controller");
        let mut state = self.engine.initial_state();
        let mut context = PipelineContext::new(self.max_iterations);
        let mut history: Vec<ValidationRecord> = Vec::new();

        info!(
            report_id = %report_id,
            company = %profile.company_name,
            max_iterations = self.max_iterations,
            "pipeline run started"
        );

        let gathered = self.gatherer.gather(profile).await;
        if !gathered.success {
            let reason = gathered
                .error
                .unwrap_or_else(|| "evidence gathering failed".to_string());
            return Ok(self
                .fail_run(report_id, profile, reason, &state, &context, history, &audit_context)
                .await);
        }
        state = self.transition(&state, &PipelineEvent::EvidenceGathered, &context, &audit_context)?;

        if let Err(index_error) =
            self.index.index_evidence(&report_id, &gathered.evidence).await
        {
            warn!(report_id = %report_id, error = %index_error, "evidence indexing failed; continuing");
        }

        let mut previous_feedback: Option<String> = None;
        let mut draft: Option<ReportContent> = None;
        let status;

        loop {
            context.iterations_used += 1;
            let iteration = context.iterations_used;
            info!(report_id = %report_id, iteration, "generation round started");

            let composed = match self
                .drafter
                .compose(profile, &gathered.evidence, previous_feedback.as_deref())
                .await
            {
                Ok(content) => content,
                Err(stage_error) => {
                    return Ok(self
                        .fail_run(
                            report_id,
                            profile,
                            format!("draft generation failed: {stage_error:#}"),
                            &state,
                            &context,
                            history,
                            &audit_context,
                        )
                        .await);
                }
            };
            state =
                self.transition(&state, &PipelineEvent::DraftProduced, &context, &audit_context)?;

            let verdict = self.validator.review(&composed, profile, &gathered.evidence).await;
            history.push(ValidationRecord::from_verdict(iteration, &verdict));
            draft = Some(composed);

            let event = if verdict.is_approved {
                PipelineEvent::VerdictApproved
            } else {
                PipelineEvent::VerdictRejected
            };
            state = self.transition(&state, &event, &context, &audit_context)?;

            match state {
                PipelineState::Approved => {
                    info!(report_id = %report_id, iteration, "draft approved");
                    status = ReportStatus::Approved;
                    break;
                }
                PipelineState::Exhausted => {
                    warn!(
                        report_id = %report_id,
                        iteration,
                        "iteration budget spent; accepting last draft"
                    );
                    status = ReportStatus::Exhausted;
                    break;
                }
                PipelineState::Generating => {
                    previous_feedback = Some(verdict.feedback);
                }
                ref other => {
                    return Err(ApplicationError::Domain(DomainError::InvariantViolation(
                        format!("verdict left the pipeline in state {other:?}"),
                    )));
                }
            }
        }

        let mut report = Report {
            id: report_id,
            company_name: profile.company_name.clone(),
            status,
            content: draft,
            error: None,
            generated_at: Utc::now(),
            validation_history: history,
            iteration_count: context.iterations_used,
            search_metadata: SearchMetadata {
                total_sources: gathered.evidence.len() as u32,
                queries_used: gathered.queries_used,
            },
            pdf_path: None,
        };

        self.commit(&mut report, &gathered.evidence).await?;
        info!(
            report_id = %report_id,
            status = report.status.as_str(),
            iterations = report.iteration_count,
            "pipeline run complete"
        );
        Ok(report)
    }

    /// Persists the terminal record, then runs the non-fatal commit steps.
    async fn commit(
        &self,
        report: &mut Report,
        evidence: &[EvidenceItem],
    ) -> Result<(), ApplicationError> {
        self.repository.insert(report).await.map_err(|persist_error| {
            ApplicationError::Persistence(format!(
                "storing report {}: {persist_error}",
                report.id
            ))
        })?;

        if let Err(index_error) = self.index.index_report(report).await {
            warn!(report_id = %report.id, error = %index_error, "report indexing failed; continuing");
        }

        if let Some(renderer) = &self.renderer {
            match renderer.render(report, evidence).await {
                Ok(pdf_path) => {
                    if let Err(persist_error) =
                        self.repository.record_pdf_path(&report.id, &pdf_path).await
                    {
                        warn!(
                            report_id = %report.id,
                            error = %persist_error,
                            "recording artifact path failed"
                        );
                    } else {
                        report.pdf_path = Some(pdf_path);
                    }
                }
                Err(render_error) => {
                    warn!(
                        report_id = %report.id,
                        error = %render_error,
                        "artifact rendering failed; report stands without one"
                    );
                }
            }
        }

        Ok(())
    }

    /// Terminates the run as Failed with whatever history accumulated.
    /// Persisting the failure record is best-effort.
    #[allow(clippy::too_many_arguments)]
    async fn fail_run(
        &self,
        report_id: ReportId,
        profile: &CompanyProfile,
        reason: String,
        state: &PipelineState,
        context: &PipelineContext,
        history: Vec<ValidationRecord>,
        audit_context: &AuditContext,
    ) -> Report {
        error!(report_id = %report_id, reason = %reason, "pipeline run failed");

        if let Err(transition_error) = self.engine.apply_with_audit(
            state,
            &PipelineEvent::StageFailed,
            context,
            &*self.audit,
            audit_context,
        ) {
            warn!(report_id = %report_id, error = %transition_error, "failure transition rejected");
        }

        let report = Report::failed(
            report_id,
            profile.company_name.clone(),
            reason,
            context.iterations_used,
            history,
        );
        if let Err(persist_error) = self.repository.insert(&report).await {
            warn!(
                report_id = %report_id,
                error = %persist_error,
                "could not persist failure record"
            );
        }
        report
    }

    fn transition(
        &self,
        state: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
        audit_context: &AuditContext,
    ) -> Result<PipelineState, ApplicationError> {
        let outcome = self
            .engine
            .apply_with_audit(state, event, context, &*self.audit, audit_context)
            .map_err(DomainError::from)?;
        Ok(outcome.to)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use routewatch_core::audit::InMemoryAuditSink;
    use routewatch_core::domain::profile::{
        CargoCategory, CompanyProfile, ContactInfo, FleetVehicle, MonitoringPreferences,
        RoutePoint, TransportRoute, VehicleType,
    };
    use routewatch_core::{EvidenceItem, Report, ReportId, ReportStatus};
    use routewatch_db::repositories::{InMemoryReportRepository, ReportRepository};
    use routewatch_search::{IndexError, IndexHit, InMemoryReportIndex, ReportIndex};

    use super::{ArtifactRenderer, PipelineController};
    use crate::drafter::ReportDrafter;
    use crate::gatherer::{EvidenceSource, GatherOutcome};
    use crate::llm::ScriptedLlm;
    use crate::validator::ReportValidator;

    fn profile() -> CompanyProfile {
        CompanyProfile {
            company_name: "Nordlicht Spedition GmbH".to_string(),
            contact: ContactInfo {
                email: "ops@nordlicht.example".to_string(),
                phone: "+49 40 555 0100".to_string(),
            },
            fleet: vec![FleetVehicle { vehicle_type: VehicleType::Truck, quantity: 8 }],
            routes: vec![TransportRoute {
                name: "Hamburg-Rotterdam".to_string(),
                origin: RoutePoint { country_code: "DE".to_string(), city: None },
                destination: RoutePoint { country_code: "NL".to_string(), city: None },
                transit_countries: Vec::new(),
            }],
            cargo_categories: vec![CargoCategory::Standard],
            monitoring_preferences: MonitoringPreferences::default(),
        }
    }

    fn evidence(count: usize) -> Vec<EvidenceItem> {
        (0..count)
            .map(|n| EvidenceItem {
                url: format!("https://example.eu/{n}"),
                title: format!("source {n}"),
                snippet: "regulatory update".to_string(),
                published_date: None,
            })
            .collect()
    }

    struct ScriptedSource(GatherOutcome);

    #[async_trait]
    impl EvidenceSource for ScriptedSource {
        async fn gather(&self, _profile: &CompanyProfile) -> GatherOutcome {
            self.0.clone()
        }
    }

    fn gather_success(sources: usize) -> GatherOutcome {
        GatherOutcome {
            success: true,
            evidence: evidence(sources),
            queries_used: vec!["EU transport law changes 2024".to_string()],
            total_results: sources as u32,
            error: None,
        }
    }

    const DRAFT_REPLY: &str = r#"{
        "summary": {"total_changes": 1, "overall_risk": "high", "key_takeaways": ["Toll rise"]},
        "legal_changes": [],
        "route_impacts": [],
        "recommended_actions": []
    }"#;

    fn approve_reply() -> String {
        r#"{"is_approved": true, "quality_score": 85, "feedback": "Report meets quality standards", "issues": []}"#.to_string()
    }

    fn reject_reply(feedback: &str) -> String {
        format!(
            r#"{{"is_approved": false, "quality_score": 40, "feedback": "{feedback}", "issues": ["too thin"]}}"#
        )
    }

    struct Harness {
        controller: PipelineController,
        repository: Arc<InMemoryReportRepository>,
        audit: Arc<InMemoryAuditSink>,
        llm: Arc<ScriptedLlm>,
    }

    fn harness(llm: ScriptedLlm, gather: GatherOutcome, max_iterations: u32) -> Harness {
        let llm = Arc::new(llm);
        let repository = Arc::new(InMemoryReportRepository::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let controller = PipelineController::new(
            Arc::new(ScriptedSource(gather)),
            ReportDrafter::new(Arc::clone(&llm) as Arc<_>),
            ReportValidator::new(Arc::clone(&llm) as Arc<_>, 50),
            Arc::clone(&repository) as Arc<_>,
            Arc::new(InMemoryReportIndex::default()),
            Arc::clone(&audit) as Arc<_>,
            max_iterations,
        );
        Harness { controller, repository, audit, llm }
    }

    #[tokio::test]
    async fn first_round_approval_finishes_in_one_iteration() {
        let llm = ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply());
        let harness = harness(llm, gather_success(3), 3);

        let report =
            harness.controller.run(&profile(), "req-1").await.expect("run should complete");

        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.iteration_count, 1);
        assert_eq!(report.validation_history.len(), 1);
        assert!(report.validation_history[0].is_approved);
        assert_eq!(report.search_metadata.total_sources, 3);

        let stored =
            harness.repository.find_by_id(&report.id).await.expect("lookup").expect("stored");
        assert_eq!(stored.status, ReportStatus::Approved);
    }

    #[tokio::test]
    async fn rejected_feedback_is_threaded_into_the_next_draft() {
        // reject, reject, approve under a budget of 3.
        let llm = ScriptedLlm::new()
            .respond_with(DRAFT_REPLY)
            .respond_with(reject_reply("Add route impacts"))
            .respond_with(DRAFT_REPLY)
            .respond_with(reject_reply("Still no deadlines"))
            .respond_with(DRAFT_REPLY)
            .respond_with(approve_reply());
        let harness = harness(llm, gather_success(2), 3);

        let report = harness.controller.run(&profile(), "req-2").await.expect("run");

        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.iteration_count, 3);
        assert_eq!(report.validation_history.len(), 3);
        assert_eq!(report.validation_history[2].iteration, 3);

        let compose_prompts = harness.llm.prompts_for("compose_report");
        assert_eq!(compose_prompts.len(), 3);
        assert!(!compose_prompts[0].contains("Validator Feedback"));
        assert!(compose_prompts[1].contains("Add route impacts"));
        assert!(compose_prompts[2].contains("Still no deadlines"));
    }

    #[tokio::test]
    async fn persistent_rejection_exhausts_the_budget_but_delivers_the_draft() {
        let llm = ScriptedLlm::new()
            .respond_with(DRAFT_REPLY)
            .respond_with(reject_reply("no"))
            .respond_with(DRAFT_REPLY)
            .respond_with(reject_reply("still no"))
            .respond_with(DRAFT_REPLY)
            .respond_with(reject_reply("never"));
        let harness = harness(llm, gather_success(1), 3);

        let report = harness.controller.run(&profile(), "req-3").await.expect("run");

        assert_eq!(report.status, ReportStatus::Exhausted);
        assert_eq!(report.iteration_count, 3);
        assert_eq!(report.validation_history.len(), 3);
        assert!(report.content.is_some(), "the last draft is delivered, not discarded");
        assert!(report.validation_history.iter().all(|record| !record.is_approved));
    }

    #[tokio::test]
    async fn single_iteration_budget_exhausts_on_first_rejection() {
        let llm = ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(reject_reply("no"));
        let harness = harness(llm, gather_success(1), 1);

        let report = harness.controller.run(&profile(), "req-4").await.expect("run");

        assert_eq!(report.status, ReportStatus::Exhausted);
        assert_eq!(report.validation_history.len(), 1);
        assert_eq!(harness.llm.prompts_for("compose_report").len(), 1, "no retry after budget");
    }

    #[tokio::test]
    async fn validator_transport_error_passes_fail_open() {
        // Draft succeeds, validation call dies: error_pass approves at score 0.
        let llm = ScriptedLlm::new().respond_with(DRAFT_REPLY).fail_with("judge timeout");
        let harness = harness(llm, gather_success(1), 3);

        let report = harness.controller.run(&profile(), "req-5").await.expect("run");

        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.iteration_count, 1);
        assert_eq!(report.validation_history[0].quality_score, 0);
        assert_eq!(report.validation_history[0].feedback, "Validation skipped due to error");
    }

    #[tokio::test]
    async fn malformed_draft_repairs_to_skeleton_and_continues() {
        let llm = ScriptedLlm::new()
            .respond_with("this is not json at all")
            .respond_with(approve_reply());
        let harness = harness(llm, gather_success(1), 3);

        let report = harness.controller.run(&profile(), "req-6").await.expect("run");

        assert_eq!(report.status, ReportStatus::Approved);
        let content = report.content.expect("fallback content delivered");
        assert_eq!(content.summary.key_takeaways, vec!["Report generation in progress"]);
    }

    #[tokio::test]
    async fn gatherer_failure_is_fatal_and_persists_a_failed_record() {
        let llm = ScriptedLlm::new();
        let harness = harness(llm, GatherOutcome::failure("search backend unreachable"), 3);

        let report = harness.controller.run(&profile(), "req-7").await.expect("run");

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.content.is_none());
        assert!(report.error.as_deref().unwrap_or_default().contains("unreachable"));
        assert_eq!(report.iteration_count, 0);

        let stored =
            harness.repository.find_by_id(&report.id).await.expect("lookup").expect("stored");
        assert_eq!(stored.status, ReportStatus::Failed);
    }

    #[tokio::test]
    async fn dead_llm_during_drafting_fails_the_run() {
        let llm = ScriptedLlm::new().fail_with("connection refused");
        let harness = harness(llm, gather_success(1), 3);

        let report = harness.controller.run(&profile(), "req-8").await.expect("run");

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.error.as_deref().unwrap_or_default().contains("draft generation failed"));
    }

    #[tokio::test]
    async fn zero_evidence_gathering_still_drafts() {
        let llm = ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply());
        let harness = harness(llm, gather_success(0), 3);

        let report = harness.controller.run(&profile(), "req-9").await.expect("run");

        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.search_metadata.total_sources, 0);
    }

    struct BrokenIndex;

    #[async_trait]
    impl ReportIndex for BrokenIndex {
        async fn index_evidence(
            &self,
            _report_id: &ReportId,
            _evidence: &[EvidenceItem],
        ) -> Result<(), IndexError> {
            Err(IndexError::Gateway { status: 500, body: "index down".to_string() })
        }

        async fn index_report(&self, _report: &Report) -> Result<(), IndexError> {
            Err(IndexError::Gateway { status: 500, body: "index down".to_string() })
        }

        async fn search_reports(
            &self,
            _query: &str,
            _limit: u32,
        ) -> Result<Vec<IndexHit>, IndexError> {
            Err(IndexError::Gateway { status: 500, body: "index down".to_string() })
        }

        async fn remove_report(&self, _report_id: &ReportId) -> Result<(), IndexError> {
            Err(IndexError::Gateway { status: 500, body: "index down".to_string() })
        }
    }

    #[tokio::test]
    async fn index_failures_never_change_the_outcome() {
        let llm =
            Arc::new(ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply()));
        let repository = Arc::new(InMemoryReportRepository::default());
        let controller = PipelineController::new(
            Arc::new(ScriptedSource(gather_success(2))),
            ReportDrafter::new(Arc::clone(&llm) as Arc<_>),
            ReportValidator::new(Arc::clone(&llm) as Arc<_>, 50),
            Arc::clone(&repository) as Arc<_>,
            Arc::new(BrokenIndex),
            Arc::new(InMemoryAuditSink::default()),
            3,
        );

        let report = controller.run(&profile(), "req-10").await.expect("run");
        assert_eq!(report.status, ReportStatus::Approved);
    }

    struct BrokenRenderer;

    #[async_trait]
    impl ArtifactRenderer for BrokenRenderer {
        async fn render(
            &self,
            _report: &Report,
            _evidence: &[EvidenceItem],
        ) -> anyhow::Result<String> {
            anyhow::bail!("wkhtmltopdf is not installed")
        }
    }

    struct StubRenderer;

    #[async_trait]
    impl ArtifactRenderer for StubRenderer {
        async fn render(
            &self,
            report: &Report,
            _evidence: &[EvidenceItem],
        ) -> anyhow::Result<String> {
            Ok(format!("/tmp/compliance_report_{}.pdf", report.id))
        }
    }

    #[tokio::test]
    async fn render_failure_leaves_the_record_without_an_artifact() {
        let llm = ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply());
        let harness = harness(llm, gather_success(1), 3);
        let controller = harness.controller.with_renderer(Arc::new(BrokenRenderer));

        let report = controller.run(&profile(), "req-11").await.expect("run");

        assert_eq!(report.status, ReportStatus::Approved);
        assert!(report.pdf_path.is_none());
    }

    #[tokio::test]
    async fn successful_render_records_the_artifact_path() {
        let llm = ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply());
        let harness = harness(llm, gather_success(1), 3);
        let controller = harness.controller.with_renderer(Arc::new(StubRenderer));

        let report = controller.run(&profile(), "req-12").await.expect("run");

        assert!(report.pdf_path.as_deref().unwrap_or_default().ends_with(".pdf"));
    }

    #[tokio::test]
    async fn every_transition_lands_in_the_audit_trail() {
        let llm = ScriptedLlm::new()
            .respond_with(DRAFT_REPLY)
            .respond_with(reject_reply("more detail"))
            .respond_with(DRAFT_REPLY)
            .respond_with(approve_reply());
        let harness = harness(llm, gather_success(1), 3);

        let report = harness.controller.run(&profile(), "req-13").await.expect("run");

        let events = harness.audit.events();
        // gathered + (draft, verdict) * 2 rounds
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|event| event.report_id == Some(report.id)));
        assert!(events.iter().all(|event| event.correlation_id == "req-13"));
        assert!(events
            .iter()
            .all(|event| event.event_type == "pipeline.transition_applied"));
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_serialize_on_shared_state() {
        let first = harness(
            ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply()),
            gather_success(1),
            3,
        );
        let second = harness(
            ScriptedLlm::new().respond_with(DRAFT_REPLY).respond_with(approve_reply()),
            gather_success(1),
            3,
        );

        let profile_a = profile();
        let profile_b = profile();
        let (a, b) = tokio::join!(
            first.controller.run(&profile_a, "req-a"),
            second.controller.run(&profile_b, "req-b"),
        );

        let a = a.expect("first run");
        let b = b.expect("second run");
        assert_ne!(a.id, b.id, "each run owns a fresh report id");
        assert_eq!(a.status, ReportStatus::Approved);
        assert_eq!(b.status, ReportStatus::Approved);
    }
}
