use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use routewatch_core::domain::report::ReportContent;
use routewatch_core::domain::run::{
    Report, ReportId, ReportStatus, SearchMetadata, ValidationRecord,
};

use super::{
    parse_timestamp, parse_u32, parse_u8, ReportListItem, ReportPage, ReportRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlReportRepository {
    pool: DbPool,
}

impl SqlReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for SqlReportRepository {
    async fn insert(&self, report: &Report) -> Result<(), RepositoryError> {
        let content_json = report
            .content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Encode(format!("report content: {error}")))?;
        let queries_json = serde_json::to_string(&report.search_metadata.queries_used)
            .map_err(|error| RepositoryError::Encode(format!("search queries: {error}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO reports (
                id,
                company_name,
                status,
                content_json,
                error,
                generated_at,
                iteration_count,
                total_sources,
                queries_json,
                pdf_path
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report.id.to_string())
        .bind(&report.company_name)
        .bind(report.status.as_str())
        .bind(content_json.as_deref())
        .bind(report.error.as_deref())
        .bind(report.generated_at.to_rfc3339())
        .bind(i64::from(report.iteration_count))
        .bind(i64::from(report.search_metadata.total_sources))
        .bind(&queries_json)
        .bind(report.pdf_path.as_deref())
        .execute(&mut *tx)
        .await?;

        for record in &report.validation_history {
            let issues_json = serde_json::to_string(&record.issues)
                .map_err(|error| RepositoryError::Encode(format!("verdict issues: {error}")))?;

            sqlx::query(
                "INSERT INTO validation_events (
                    report_id,
                    iteration,
                    is_approved,
                    quality_score,
                    feedback,
                    issues_json,
                    validated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(report.id.to_string())
            .bind(i64::from(record.iteration))
            .bind(record.is_approved)
            .bind(i64::from(record.quality_score))
            .bind(&record.feedback)
            .bind(&issues_json)
            .bind(record.validated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ReportId) -> Result<Option<Report>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_name, status, content_json, error, generated_at,
                    iteration_count, total_sources, queries_json, pdf_path
             FROM reports
             WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut report = report_from_row(row)?;

        let event_rows = sqlx::query(
            "SELECT iteration, is_approved, quality_score, feedback, issues_json, validated_at
             FROM validation_events
             WHERE report_id = ?
             ORDER BY iteration ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        report.validation_history = event_rows
            .into_iter()
            .map(validation_record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(report))
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<ReportPage, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reports").fetch_one(&self.pool).await?;

        let rows = sqlx::query(
            "SELECT id, company_name, status, content_json, error, generated_at,
                    iteration_count, total_sources, queries_json, pdf_path
             FROM reports
             ORDER BY generated_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        let reports = rows
            .into_iter()
            .map(|row| report_from_row(row).map(|report| ReportListItem::from_report(&report)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReportPage { reports, total: u64::try_from(total).unwrap_or(0) })
    }

    async fn delete(&self, id: &ReportId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_pdf_path(
        &self,
        id: &ReportId,
        pdf_path: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE reports SET pdf_path = ? WHERE id = ?")
            .bind(pdf_path)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn report_from_row(row: SqliteRow) -> Result<Report, RepositoryError> {
    let id_raw = row.try_get::<String, _>("id")?;
    let id = Uuid::parse_str(&id_raw).map(ReportId).map_err(|error| {
        RepositoryError::Decode(format!("invalid report id `{id_raw}`: {error}"))
    })?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = ReportStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown report status `{status_raw}`")))?;

    let content = row
        .try_get::<Option<String>, _>("content_json")?
        .map(|json| serde_json::from_str::<ReportContent>(&json))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("report content: {error}")))?;

    let queries_json = row.try_get::<String, _>("queries_json")?;
    let queries_used = serde_json::from_str(&queries_json)
        .map_err(|error| RepositoryError::Decode(format!("search queries: {error}")))?;

    Ok(Report {
        id,
        company_name: row.try_get("company_name")?,
        status,
        content,
        error: row.try_get("error")?,
        generated_at: parse_timestamp("generated_at", row.try_get("generated_at")?)?,
        validation_history: Vec::new(),
        iteration_count: parse_u32("iteration_count", row.try_get("iteration_count")?)?,
        search_metadata: SearchMetadata {
            total_sources: parse_u32("total_sources", row.try_get("total_sources")?)?,
            queries_used,
        },
        pdf_path: row.try_get("pdf_path")?,
    })
}

fn validation_record_from_row(row: SqliteRow) -> Result<ValidationRecord, RepositoryError> {
    let issues_json = row.try_get::<String, _>("issues_json")?;
    let issues = serde_json::from_str(&issues_json)
        .map_err(|error| RepositoryError::Decode(format!("verdict issues: {error}")))?;

    Ok(ValidationRecord {
        iteration: parse_u32("iteration", row.try_get("iteration")?)?,
        is_approved: row.try_get("is_approved")?,
        quality_score: parse_u8("quality_score", row.try_get("quality_score")?)?,
        feedback: row.try_get("feedback")?,
        issues,
        validated_at: parse_timestamp("validated_at", row.try_get("validated_at")?)?,
    })
}
