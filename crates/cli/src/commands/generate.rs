use std::sync::Arc;
use std::time::Duration;

use routewatch_agent::{
    AnthropicClient, EvidenceGatherer, GathererSettings, PipelineController, ReportDrafter,
    ReportValidator,
};
use routewatch_core::audit::InMemoryAuditSink;
use routewatch_core::config::{AppConfig, LoadOptions};
use routewatch_core::{Report, ReportStatus};
use routewatch_db::repositories::{ProfileStore, SqlProfileStore, SqlReportRepository};
use routewatch_db::{connect_with_settings, migrations};
use routewatch_search::{
    GatewayReportIndex, GatewaySearchClient, InMemoryReportIndex, ReportIndex, SearchProvider,
    StaticSearchProvider,
};

use crate::commands::CommandResult;

/// One-shot pipeline run against the stored profile. The report lands in the
/// database exactly as it would through the HTTP API; only PDF rendering is
/// skipped, that stays a server concern.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let llm = match AnthropicClient::new(&config.llm) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "llm_configuration",
                format!("{error} (set ANTHROPIC_API_KEY or llm.api_key)"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let profiles = SqlProfileStore::new(pool.clone());
        let profile = profiles
            .load()
            .await
            .map_err(|error| ("profile_load", error.to_string(), 4u8))?
            .ok_or_else(|| {
                (
                    "missing_profile",
                    "no company profile is configured; run `routewatch seed` or PUT /api/profile"
                        .to_string(),
                    6u8,
                )
            })?;

        let search_timeout = Duration::from_secs(config.search.timeout_secs);
        let (provider, index): (Arc<dyn SearchProvider>, Arc<dyn ReportIndex>) =
            match &config.search.gateway_url {
                Some(gateway_url) => {
                    let provider = GatewaySearchClient::new(
                        gateway_url.clone(),
                        config.search.api_key.clone(),
                        search_timeout,
                    )
                    .map_err(|error| ("search_gateway", error.to_string(), 4u8))?;
                    let index = GatewayReportIndex::new(
                        gateway_url.clone(),
                        config.search.api_key.clone(),
                        search_timeout,
                    )
                    .map_err(|error| ("search_gateway", error.to_string(), 4u8))?;
                    (Arc::new(provider), Arc::new(index))
                }
                None => (
                    Arc::new(StaticSearchProvider::default()),
                    Arc::new(InMemoryReportIndex::default()),
                ),
            };

        let gatherer = EvidenceGatherer::new(
            llm.clone(),
            provider,
            GathererSettings::from_config(&config.pipeline, &config.search),
        );
        let controller = PipelineController::new(
            Arc::new(gatherer),
            ReportDrafter::new(llm.clone()),
            ReportValidator::new(llm, config.pipeline.approval_threshold),
            Arc::new(SqlReportRepository::new(pool.clone())),
            index,
            Arc::new(InMemoryAuditSink::default()),
            config.pipeline.max_iterations,
        );

        let correlation_id = format!("cli-{}", uuid::Uuid::new_v4());
        let report = controller
            .run(&profile, &correlation_id)
            .await
            .map_err(|error| ("pipeline", error.to_string(), 7u8))?;

        pool.close().await;
        Ok::<Report, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) if report.status == ReportStatus::Failed => CommandResult::failure(
            "generate",
            "pipeline_failed",
            format!(
                "report {} failed: {}",
                report.id,
                report.error.unwrap_or_else(|| "unknown error".to_string())
            ),
            7,
        ),
        Ok(report) => {
            let score = report
                .validation_history
                .last()
                .map(|record| record.quality_score.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            CommandResult::success(
                "generate",
                format!(
                    "report {} for `{}` finished as {} after {} iteration(s); quality score {}; \
                     {} source(s) consulted",
                    report.id,
                    report.company_name,
                    report.status.as_str(),
                    report.iteration_count,
                    score,
                    report.search_metadata.total_sources
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("generate", error_class, message, exit_code)
        }
    }
}
