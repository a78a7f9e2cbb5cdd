use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::report::ReportContent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub Uuid);

impl ReportId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Terminal outcome of a pipeline run. `Exhausted` is an accepted outcome:
/// the last draft is delivered even though the validator never approved it
/// within the iteration budget. It is not folded into `Approved` so that
/// storage and API consumers can tell the two apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Approved,
    Exhausted,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Approved => "approved",
            ReportStatus::Exhausted => "exhausted",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "approved" => Some(ReportStatus::Approved),
            "exhausted" => Some(ReportStatus::Exhausted),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

/// Verdict returned by the quality validator for a single draft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_approved: bool,
    pub quality_score: u8,
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ValidationVerdict {
    /// Verdict substituted when the validator's response cannot be parsed.
    /// The draft passes rather than blocking the run on a formatting slip.
    pub fn lenient_pass() -> Self {
        Self {
            is_approved: true,
            quality_score: 80,
            feedback: "Report meets quality standards".to_string(),
            issues: Vec::new(),
        }
    }

    /// Verdict substituted when the validation stage itself errors. Scored
    /// zero so the pass is visible in the history as a skip, not a rating.
    pub fn error_pass() -> Self {
        Self {
            is_approved: true,
            quality_score: 0,
            feedback: "Validation skipped due to error".to_string(),
            issues: Vec::new(),
        }
    }
}

/// One validator verdict as recorded in a run's history, tagged with the
/// 1-based iteration that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub iteration: u32,
    pub is_approved: bool,
    pub quality_score: u8,
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationRecord {
    pub fn from_verdict(iteration: u32, verdict: &ValidationVerdict) -> Self {
        Self {
            iteration,
            is_approved: verdict.is_approved,
            quality_score: verdict.quality_score,
            feedback: verdict.feedback.clone(),
            issues: verdict.issues.clone(),
            validated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub total_sources: u32,
    #[serde(default)]
    pub queries_used: Vec<String>,
}

/// The persisted outcome of one pipeline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub company_name: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ReportContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub validation_history: Vec<ValidationRecord>,
    pub iteration_count: u32,
    #[serde(default)]
    pub search_metadata: SearchMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
}

impl Report {
    /// Record for a run that ended before producing a deliverable draft.
    pub fn failed(
        id: ReportId,
        company_name: impl Into<String>,
        error: impl Into<String>,
        iteration_count: u32,
        validation_history: Vec<ValidationRecord>,
    ) -> Self {
        Self {
            id,
            company_name: company_name.into(),
            status: ReportStatus::Failed,
            content: None,
            error: Some(error.into()),
            generated_at: Utc::now(),
            validation_history,
            iteration_count,
            search_metadata: SearchMetadata::default(),
            pdf_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Report, ReportId, ReportStatus, ValidationRecord, ValidationVerdict};

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&ReportStatus::Exhausted).expect("serialize"),
            "\"exhausted\""
        );
    }

    #[test]
    fn lenient_pass_and_error_pass_are_distinct() {
        let lenient = ValidationVerdict::lenient_pass();
        let errored = ValidationVerdict::error_pass();

        assert!(lenient.is_approved && errored.is_approved);
        assert_eq!(lenient.quality_score, 80);
        assert_eq!(errored.quality_score, 0);
        assert_ne!(lenient.feedback, errored.feedback);
    }

    #[test]
    fn record_carries_iteration_tag_and_verdict_fields() {
        let verdict = ValidationVerdict {
            is_approved: false,
            quality_score: 35,
            feedback: "Missing route impacts".to_string(),
            issues: vec!["route_impacts empty".to_string()],
        };

        let record = ValidationRecord::from_verdict(2, &verdict);
        assert_eq!(record.iteration, 2);
        assert_eq!(record.quality_score, 35);
        assert_eq!(record.issues.len(), 1);
    }

    #[test]
    fn failed_record_has_no_content() {
        let report = Report::failed(
            ReportId::generate(),
            "Baltic Freight GmbH",
            "evidence gathering failed",
            0,
            Vec::new(),
        );

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.content.is_none());
        assert_eq!(report.error.as_deref(), Some("evidence gathering failed"));
    }
}
