use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use routewatch_core::{EvidenceItem, Report, ReportId};

const SNIPPET_CHARS: usize = 180;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("index gateway returned status {status}: {body}")]
    Gateway { status: u16, body: String },
}

/// One match from a report search, ordered by descending relevance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexHit {
    pub report_id: ReportId,
    pub company_name: String,
    pub snippet: String,
    pub relevance: f64,
}

/// Secondary index over generated reports and their gathered evidence.
/// Index writes never gate a pipeline run; callers log failures and move on.
#[async_trait]
pub trait ReportIndex: Send + Sync {
    async fn index_evidence(
        &self,
        report_id: &ReportId,
        evidence: &[EvidenceItem],
    ) -> Result<(), IndexError>;

    async fn index_report(&self, report: &Report) -> Result<(), IndexError>;

    async fn search_reports(&self, query: &str, limit: u32)
        -> Result<Vec<IndexHit>, IndexError>;

    async fn remove_report(&self, report_id: &ReportId) -> Result<(), IndexError>;
}

/// Flattens a report into the text that gets indexed for search.
pub(crate) fn report_search_text(report: &Report) -> String {
    let mut lines = vec![report.company_name.clone()];
    if let Some(content) = &report.content {
        lines.extend(content.summary.key_takeaways.iter().cloned());
        for change in &content.legal_changes {
            lines.push(format!("{}. {}", change.title, change.description));
        }
        for impact in &content.route_impacts {
            lines.push(format!("{}: {}", impact.route_name, impact.impact_description));
        }
        for action in &content.recommended_actions {
            lines.push(action.action.clone());
        }
    }
    lines.join("\n")
}

pub(crate) fn evidence_search_text(evidence: &[EvidenceItem]) -> String {
    evidence
        .iter()
        .map(|item| format!("{}. {}", item.title, item.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Default)]
struct IndexedDocument {
    company_name: String,
    report_text: String,
    evidence_text: String,
}

impl IndexedDocument {
    fn full_text(&self) -> String {
        format!("{}\n{}", self.report_text, self.evidence_text)
    }
}

/// Token-overlap index used in tests and when no gateway is configured.
#[derive(Default)]
pub struct InMemoryReportIndex {
    documents: RwLock<HashMap<ReportId, IndexedDocument>>,
}

#[async_trait]
impl ReportIndex for InMemoryReportIndex {
    async fn index_evidence(
        &self,
        report_id: &ReportId,
        evidence: &[EvidenceItem],
    ) -> Result<(), IndexError> {
        let mut documents = self.documents.write().await;
        let document = documents.entry(*report_id).or_default();
        document.evidence_text = evidence_search_text(evidence);
        Ok(())
    }

    async fn index_report(&self, report: &Report) -> Result<(), IndexError> {
        let mut documents = self.documents.write().await;
        let document = documents.entry(report.id).or_default();
        document.company_name = report.company_name.clone();
        document.report_text = report_search_text(report);
        Ok(())
    }

    async fn search_reports(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.documents.read().await;
        let mut hits: Vec<IndexHit> = documents
            .iter()
            .filter_map(|(report_id, document)| {
                let text = document.full_text();
                let document_tokens = tokenize(&text);
                let overlap = query_tokens
                    .iter()
                    .filter(|token| document_tokens.contains(*token))
                    .count();
                if overlap == 0 {
                    return None;
                }
                Some(IndexHit {
                    report_id: *report_id,
                    company_name: document.company_name.clone(),
                    snippet: snippet_of(&text),
                    relevance: overlap as f64 / query_tokens.len() as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.company_name.cmp(&b.company_name))
                .then_with(|| a.report_id.to_string().cmp(&b.report_id.to_string()))
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn remove_report(&self, report_id: &ReportId) -> Result<(), IndexError> {
        let mut documents = self.documents.write().await;
        documents.remove(report_id);
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }

    let mut tokens: Vec<String> =
        sanitized.split_whitespace().filter(|token| token.len() >= 2).map(String::from).collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn snippet_of(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= SNIPPET_CHARS {
        return flattened;
    }
    let mut snippet: String = flattened.chars().take(SNIPPET_CHARS).collect();
    snippet.push('…');
    snippet
}
