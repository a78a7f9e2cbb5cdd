//! HTML and PDF rendering for finished reports.
//!
//! A Tera template turns a stored report into a printable HTML page;
//! wkhtmltopdf (when present on PATH) converts that page into
//! `{data_dir}/pdf/compliance_report_{id}.pdf`. The pipeline treats a render
//! failure as non-fatal, so everything here errors loudly and lets the
//! caller log and move on.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{info, warn};

use routewatch_agent::ArtifactRenderer;
use routewatch_core::{EvidenceItem, Report, ReportContent};

const REPORT_TEMPLATE: &str = "report.html";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
    #[error("wkhtmltopdf is not installed")]
    ConverterMissing,
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ReportRenderer {
    tera: Tera,
    wkhtmltopdf_path: Option<PathBuf>,
    data_dir: PathBuf,
}

impl ReportRenderer {
    pub fn new(data_dir: &Path) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(REPORT_TEMPLATE, include_str!("../templates/report.html"))
            .map_err(|error| RenderError::Template(error.to_string()))?;

        let wkhtmltopdf_path = which::which("wkhtmltopdf").ok();
        match &wkhtmltopdf_path {
            Some(path) => info!(path = %path.display(), "wkhtmltopdf found"),
            None => warn!("wkhtmltopdf not found in PATH; reports will have no PDF artifact"),
        }

        Ok(Self { tera, wkhtmltopdf_path, data_dir: data_dir.to_path_buf() })
    }

    pub fn render_html(
        &self,
        report: &Report,
        evidence: &[EvidenceItem],
    ) -> Result<String, RenderError> {
        let placeholder = ReportContent::fallback();
        let content = report.content.as_ref().unwrap_or(&placeholder);

        let mut context = Context::new();
        context.insert("company_name", &report.company_name);
        context.insert("status", report.status.as_str());
        context.insert("generated_at", &report.generated_at.format("%Y-%m-%d %H:%M UTC").to_string());
        context.insert("iteration_count", &report.iteration_count);
        context.insert("search_metadata", &report.search_metadata);
        context.insert("content", content);
        context.insert("evidence", evidence);

        self.tera
            .render(REPORT_TEMPLATE, &context)
            .map_err(|error| RenderError::Template(error.to_string()))
    }

    async fn convert(&self, html: &str, pdf_path: &Path) -> Result<(), RenderError> {
        let Some(wkhtmltopdf) = &self.wkhtmltopdf_path else {
            return Err(RenderError::ConverterMissing);
        };

        let html_path = std::env::temp_dir().join(format!("report_{}.html", uuid::Uuid::new_v4()));
        tokio::fs::write(&html_path, html).await?;

        let output = Command::new(wkhtmltopdf)
            .arg("--page-size")
            .arg("A4")
            .arg("--margin-top")
            .arg("10mm")
            .arg("--margin-bottom")
            .arg("10mm")
            .arg("--margin-left")
            .arg("10mm")
            .arg("--margin-right")
            .arg("10mm")
            .arg("--encoding")
            .arg("utf-8")
            .arg("--enable-local-file-access")
            .arg(&html_path)
            .arg(pdf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let _ = tokio::fs::remove_file(&html_path).await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(RenderError::Conversion(stderr));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactRenderer for ReportRenderer {
    async fn render(&self, report: &Report, evidence: &[EvidenceItem]) -> anyhow::Result<String> {
        let html = self.render_html(report, evidence)?;

        let pdf_dir = self.data_dir.join("pdf");
        tokio::fs::create_dir_all(&pdf_dir).await.map_err(RenderError::from)?;
        let pdf_path = pdf_dir.join(format!("compliance_report_{}.pdf", report.id));

        self.convert(&html, &pdf_path).await?;
        info!(path = %pdf_path.display(), "report artifact written");
        Ok(pdf_path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use routewatch_core::{
        EvidenceItem, LegalChange, RecommendedAction, Report, ReportContent, ReportId,
        ReportStatus, ReportSummary, RiskLevel, RouteImpact, SearchMetadata,
    };

    use super::{RenderError, ReportRenderer};

    fn report() -> Report {
        Report {
            id: ReportId::generate(),
            company_name: "Nordlicht Spedition GmbH".to_string(),
            status: ReportStatus::Approved,
            content: Some(ReportContent {
                summary: ReportSummary {
                    total_changes: 1,
                    overall_risk: RiskLevel::High,
                    key_takeaways: vec!["Toll costs rise on German motorways".to_string()],
                },
                legal_changes: vec![LegalChange {
                    title: "CO2 toll differentiation".to_string(),
                    description: "Toll rates now scale with emission class".to_string(),
                    effective_date: Some("2024-07-01".to_string()),
                    source_url: Some("https://example.eu/tolls".to_string()),
                    affected_routes: vec!["Hamburg-Rotterdam".to_string()],
                    risk_level: RiskLevel::High,
                }],
                route_impacts: vec![RouteImpact {
                    route_name: "Hamburg-Rotterdam".to_string(),
                    impact_description: "Higher per-kilometre cost".to_string(),
                    severity: RiskLevel::Medium,
                }],
                recommended_actions: vec![RecommendedAction {
                    action: "Review fleet emission classes".to_string(),
                    priority: RiskLevel::High,
                    deadline: Some("2024-06-15".to_string()),
                    related_change: Some("CO2 toll differentiation".to_string()),
                }],
            }),
            error: None,
            generated_at: Utc::now(),
            validation_history: Vec::new(),
            iteration_count: 1,
            search_metadata: SearchMetadata {
                total_sources: 1,
                queries_used: vec!["german toll changes".to_string()],
            },
            pdf_path: None,
        }
    }

    fn evidence() -> Vec<EvidenceItem> {
        vec![EvidenceItem {
            url: "https://example.eu/tolls".to_string(),
            title: "CO2 toll differentiation".to_string(),
            snippet: "New toll classes".to_string(),
            published_date: None,
        }]
    }

    #[test]
    fn report_renders_to_html_with_all_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = ReportRenderer::new(dir.path()).expect("renderer");

        let html = renderer.render_html(&report(), &evidence()).expect("render");

        assert!(html.contains("Nordlicht Spedition GmbH"));
        assert!(html.contains("CO2 toll differentiation"));
        assert!(html.contains("Hamburg-Rotterdam"));
        assert!(html.contains("Review fleet emission classes"));
        assert!(html.contains("https://example.eu/tolls"));
    }

    #[test]
    fn content_free_report_still_renders() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = ReportRenderer::new(dir.path()).expect("renderer");
        let mut report = report();
        report.content = None;

        let html = renderer.render_html(&report, &[]).expect("render");
        assert!(html.contains("Report generation in progress"));
    }

    #[tokio::test]
    async fn conversion_without_wkhtmltopdf_reports_the_missing_converter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut renderer = ReportRenderer::new(dir.path()).expect("renderer");
        renderer.wkhtmltopdf_path = None;

        let error = renderer
            .convert("<html></html>", &dir.path().join("out.pdf"))
            .await
            .expect_err("no converter");
        assert!(matches!(error, RenderError::ConverterMissing));
    }
}
