use std::collections::HashMap;

use tokio::sync::RwLock;

use routewatch_core::domain::chat::ChatMessage;
use routewatch_core::domain::profile::CompanyProfile;
use routewatch_core::domain::run::{Report, ReportId};

use super::{
    ChatRepository, ProfileStore, ReportListItem, ReportPage, ReportRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryProfileStore {
    profile: RwLock<Option<CompanyProfile>>,
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self) -> Result<Option<CompanyProfile>, RepositoryError> {
        let profile = self.profile.read().await;
        Ok(profile.clone())
    }

    async fn store(&self, profile: &CompanyProfile) -> Result<(), RepositoryError> {
        let mut slot = self.profile.write().await;
        *slot = Some(profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryReportRepository {
    reports: RwLock<Vec<Report>>,
}

#[async_trait::async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn insert(&self, report: &Report) -> Result<(), RepositoryError> {
        let mut reports = self.reports.write().await;
        reports.push(report.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        let reports = self.reports.read().await;
        Ok(reports.iter().find(|report| report.id == *id).cloned())
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<ReportPage, RepositoryError> {
        let reports = self.reports.read().await;
        let mut ordered: Vec<&Report> = reports.iter().collect();
        ordered.sort_by(|a, b| {
            b.generated_at
                .cmp(&a.generated_at)
                .then_with(|| b.id.to_string().cmp(&a.id.to_string()))
        });

        let page = ordered
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(ReportListItem::from_report)
            .collect();

        Ok(ReportPage { reports: page, total: reports.len() as u64 })
    }

    async fn delete(&self, id: &ReportId) -> Result<bool, RepositoryError> {
        let mut reports = self.reports.write().await;
        let before = reports.len();
        reports.retain(|report| report.id != *id);
        Ok(reports.len() < before)
    }

    async fn record_pdf_path(
        &self,
        id: &ReportId,
        pdf_path: &str,
    ) -> Result<(), RepositoryError> {
        let mut reports = self.reports.write().await;
        for report in reports.iter_mut() {
            if report.id == *id {
                report.pdf_path = Some(pdf_path.to_string());
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    threads: RwLock<HashMap<ReportId, Vec<ChatMessage>>>,
}

#[async_trait::async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn append(
        &self,
        report_id: &ReportId,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        threads.entry(*report_id).or_default().push(message.clone());
        Ok(())
    }

    async fn history(&self, report_id: &ReportId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(report_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, report_id: &ReportId) -> Result<u64, RepositoryError> {
        let mut threads = self.threads.write().await;
        Ok(threads.remove(report_id).map(|messages| messages.len() as u64).unwrap_or(0))
    }
}
