use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use routewatch_core::domain::chat::ChatMessage;
use routewatch_core::domain::profile::CompanyProfile;
use routewatch_core::domain::report::RiskLevel;
use routewatch_core::domain::run::{Report, ReportId, ReportStatus};

pub mod chat;
pub mod memory;
pub mod profile;
pub mod report;

pub use chat::SqlChatRepository;
pub use memory::{InMemoryChatRepository, InMemoryProfileStore, InMemoryReportRepository};
pub use profile::SqlProfileStore;
pub use report::SqlReportRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Holds the single monitored company profile for a deployment.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self) -> Result<Option<CompanyProfile>, RepositoryError>;
    async fn store(&self, profile: &CompanyProfile) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Persists the report row and its validation history atomically.
    async fn insert(&self, report: &Report) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError>;

    /// Newest-first page of report summaries plus the unpaged total.
    async fn list(&self, limit: u32, offset: u32) -> Result<ReportPage, RepositoryError>;

    /// Removes the report and everything hanging off it. Returns whether a
    /// row existed.
    async fn delete(&self, id: &ReportId) -> Result<bool, RepositoryError>;

    async fn record_pdf_path(&self, id: &ReportId, pdf_path: &str)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn append(
        &self,
        report_id: &ReportId,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError>;

    /// Thread history in the order the messages were written.
    async fn history(&self, report_id: &ReportId) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// Returns the number of removed messages.
    async fn clear(&self, report_id: &ReportId) -> Result<u64, RepositoryError>;
}

/// Summary row returned by report listings. Content-derived fields are
/// `None` for runs that failed before producing a draft.
#[derive(Clone, Debug, Serialize)]
pub struct ReportListItem {
    pub id: ReportId,
    pub company_name: String,
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
    pub iteration_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_changes: Option<u32>,
    pub has_pdf: bool,
}

impl ReportListItem {
    pub fn from_report(report: &Report) -> Self {
        Self {
            id: report.id,
            company_name: report.company_name.clone(),
            status: report.status,
            generated_at: report.generated_at,
            iteration_count: report.iteration_count,
            overall_risk: report.content.as_ref().map(|content| content.summary.overall_risk),
            total_changes: report.content.as_ref().map(|content| content.summary.total_changes),
            has_pdf: report.pdf_path.is_some(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportPage {
    pub reports: Vec<ReportListItem>,
    pub total: u64,
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` out of range: {value}")))
}

pub(crate) fn parse_u8(column: &str, value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` out of range: {value}")))
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("column `{column}` has invalid timestamp: {error}"))
        })
}
