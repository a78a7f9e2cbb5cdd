use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use routewatch_core::domain::chat::{ChatMessage, ChatRole};
use routewatch_core::domain::run::ReportId;

use super::{parse_timestamp, ChatRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChatRepository {
    pool: DbPool,
}

impl SqlChatRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for SqlChatRepository {
    async fn append(
        &self,
        report_id: &ReportId,
        message: &ChatMessage,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_messages (report_id, role, content, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(report_id.to_string())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history(&self, report_id: &ReportId) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at
             FROM chat_messages
             WHERE report_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(report_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(chat_message_from_row).collect()
    }

    async fn clear(&self, report_id: &ReportId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE report_id = ?")
            .bind(report_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn chat_message_from_row(row: SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = ChatRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown chat role `{role_raw}`")))?;

    Ok(ChatMessage {
        role,
        content: row.try_get("content")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sqlx::Row;

    use routewatch_core::domain::chat::{ChatMessage, ChatRole};
    use routewatch_core::domain::run::{Report, ReportId};

    use super::SqlChatRepository;
    use crate::repositories::{ChatRepository, ReportRepository, SqlReportRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    async fn seed_report(pool: &DbPool) -> ReportId {
        let report = Report::failed(
            ReportId::generate(),
            "Nordlicht Spedition GmbH",
            "seeded for chat tests",
            0,
            Vec::new(),
        );
        SqlReportRepository::new(pool.clone()).insert(&report).await.expect("seed report");
        report.id
    }

    fn message(role: ChatRole, content: &str, minute: u32) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 8, 12, 10, minute, 0).single().expect("date"),
        }
    }

    #[tokio::test]
    async fn history_returns_messages_in_written_order() {
        let pool = setup_pool().await;
        let report_id = seed_report(&pool).await;
        let repository = SqlChatRepository::new(pool);

        repository
            .append(&report_id, &message(ChatRole::User, "Which routes are affected?", 1))
            .await
            .expect("append question");
        repository
            .append(&report_id, &message(ChatRole::Assistant, "The Hamburg leg.", 2))
            .await
            .expect("append answer");

        let history = repository.history(&report_id).await.expect("history");

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].content, "Which routes are affected?");
        assert_eq!(history[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn history_is_scoped_per_report() {
        let pool = setup_pool().await;
        let first = seed_report(&pool).await;
        let second = seed_report(&pool).await;
        let repository = SqlChatRepository::new(pool);

        repository
            .append(&first, &message(ChatRole::User, "first thread", 1))
            .await
            .expect("append");

        assert_eq!(repository.history(&first).await.expect("history").len(), 1);
        assert!(repository.history(&second).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn clear_reports_how_many_messages_were_removed() {
        let pool = setup_pool().await;
        let report_id = seed_report(&pool).await;
        let repository = SqlChatRepository::new(pool);

        repository
            .append(&report_id, &message(ChatRole::User, "one", 1))
            .await
            .expect("append");
        repository
            .append(&report_id, &message(ChatRole::Assistant, "two", 2))
            .await
            .expect("append");

        assert_eq!(repository.clear(&report_id).await.expect("clear"), 2);
        assert!(repository.history(&report_id).await.expect("history").is_empty());
        assert_eq!(repository.clear(&report_id).await.expect("second clear"), 0);
    }

    #[tokio::test]
    async fn deleting_the_report_cascades_its_thread() {
        let pool = setup_pool().await;
        let report_id = seed_report(&pool).await;
        let chat = SqlChatRepository::new(pool.clone());
        chat.append(&report_id, &message(ChatRole::User, "orphan me", 1))
            .await
            .expect("append");

        let removed = SqlReportRepository::new(pool.clone())
            .delete(&report_id)
            .await
            .expect("delete report");
        assert!(removed);

        let remaining = sqlx::query("SELECT COUNT(*) AS count FROM chat_messages")
            .fetch_one(&pool)
            .await
            .expect("count messages")
            .get::<i64, _>("count");
        assert_eq!(remaining, 0);
    }
}
