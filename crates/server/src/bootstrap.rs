//! Wires configuration into a ready-to-serve application: database pool with
//! migrations applied, search provider and report index (gateway-backed when
//! `search.gateway_url` is set, local otherwise), SQL repositories, and the
//! PDF renderer.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use routewatch_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use routewatch_core::config::{AppConfig, ConfigError, LoadOptions};
use routewatch_db::repositories::{SqlChatRepository, SqlProfileStore, SqlReportRepository};
use routewatch_db::{connect_with_settings, migrations, DbPool};
use routewatch_search::{
    GatewayReportIndex, GatewaySearchClient, InMemoryReportIndex, IndexError, ReportIndex,
    SearchError, SearchProvider, StaticSearchProvider,
};

use crate::api::AppState;
use crate::render::{RenderError, ReportRenderer};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("search gateway client failed: {0}")]
    SearchGateway(#[from] SearchError),
    #[error("report index client failed: {0}")]
    IndexGateway(#[from] IndexError),
    #[error("report renderer failed: {0}")]
    Renderer(#[from] RenderError),
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: Arc<AppState>,
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(url = %config.database.url, "database ready");

    let search_timeout = Duration::from_secs(config.search.timeout_secs);
    let (provider, index): (Arc<dyn SearchProvider>, Arc<dyn ReportIndex>) =
        match &config.search.gateway_url {
            Some(gateway_url) => {
                info!(gateway_url, "using search gateway");
                let provider = GatewaySearchClient::new(
                    gateway_url.clone(),
                    config.search.api_key.clone(),
                    search_timeout,
                )?;
                let index = GatewayReportIndex::new(
                    gateway_url.clone(),
                    config.search.api_key.clone(),
                    search_timeout,
                )?;
                (Arc::new(provider), Arc::new(index))
            }
            None => {
                warn!("no search gateway configured; using built-in provider and index");
                (
                    Arc::new(StaticSearchProvider::default()),
                    Arc::new(InMemoryReportIndex::default()),
                )
            }
        };

    let renderer = ReportRenderer::new(&config.server.data_dir)?;

    let state = Arc::new(AppState {
        profiles: Arc::new(SqlProfileStore::new(db_pool.clone())),
        reports: Arc::new(SqlReportRepository::new(db_pool.clone())),
        chats: Arc::new(SqlChatRepository::new(db_pool.clone())),
        index,
        provider,
        renderer: Arc::new(renderer),
        audit: Arc::new(LogAuditSink),
        llm_override: None,
        config: config.clone(),
    });

    Ok(Application { config, db_pool, state })
}

/// Audit sink for the running server: every event becomes a structured log
/// line keyed by its correlation id.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => info!(
                event_type = %event.event_type,
                correlation_id = %event.correlation_id,
                report_id = ?event.report_id,
                actor = %event.actor,
                %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_type = %event.event_type,
                correlation_id = %event.correlation_id,
                report_id = ?event.report_id,
                actor = %event.actor,
                %metadata,
                "audit event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use routewatch_core::config::AppConfig;

    use crate::bootstrap::bootstrap_with_config;

    fn test_config(data_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:?cache=shared".to_string();
        config.database.max_connections = 1;
        config.search.gateway_url = None;
        config.server.data_dir = data_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn bootstrap_migrates_an_empty_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap_with_config(test_config(dir.path())).await.expect("bootstrap");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&app.db_pool)
        .await
        .expect("table listing");

        for expected in ["chat_messages", "profiles", "reports", "validation_events"] {
            assert!(tables.iter().any(|table| table == expected), "missing table {expected}");
        }
        assert!(app.state.llm_override.is_none());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_without_gateway_uses_builtin_search() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap_with_config(test_config(dir.path())).await.expect("bootstrap");

        // The built-in index starts empty, so an arbitrary query finds nothing.
        let hits = app.state.index.search_reports("tolls", 5).await.expect("search");
        assert!(hits.is_empty());

        app.db_pool.close().await;
    }
}
