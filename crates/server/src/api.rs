//! JSON API over profiles, report runs, search, artifacts, and chat.
//!
//! Endpoints:
//! - `GET|PUT /api/profile`                      — the monitored company profile
//! - `POST /api/reports/generate`                — run the pipeline (X-API-Key aware)
//! - `GET  /api/reports?limit&offset`            — newest-first report listing
//! - `GET  /api/reports/search?q&limit`          — full-text report search
//! - `GET|DELETE /api/reports/{id}`              — fetch / remove one report
//! - `GET  /api/reports/{id}/pdf`                — download the rendered artifact
//! - `POST /api/chat/{report_id}/message`        — ask a question about a report
//! - `GET|DELETE /api/chat/{report_id}/history`  — thread history / clear
//! - `GET  /api/chat/{report_id}/suggestions`    — suggested follow-up questions
//!
//! Every failure answers JSON `{ error, correlation_id }`; the correlation id
//! also tags the tracing events the request produced.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use routewatch_agent::{
    ArtifactRenderer, ChatError, ChatService, EvidenceGatherer, GathererSettings, LlmClient,
    PipelineController, ReportDrafter, ReportValidator,
};
use routewatch_core::audit::AuditSink;
use routewatch_core::config::{validate_api_key_format, AppConfig, LlmConfig};
use routewatch_core::{
    ApplicationError, CompanyProfile, DomainError, InterfaceError, ReportId, ReportStatus,
};
use routewatch_db::repositories::{
    ChatRepository, ProfileStore, ReportRepository, RepositoryError,
};
use routewatch_search::{ReportIndex, SearchProvider};

/// Shared dependencies behind every handler. The LLM client is built per
/// request (the X-API-Key header can override the configured key for one
/// run); `llm_override` pins a client instead, which tests use to substitute
/// a scripted model.
pub struct AppState {
    pub config: AppConfig,
    pub profiles: Arc<dyn ProfileStore>,
    pub reports: Arc<dyn ReportRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub index: Arc<dyn ReportIndex>,
    pub provider: Arc<dyn SearchProvider>,
    pub renderer: Arc<dyn ArtifactRenderer>,
    pub audit: Arc<dyn AuditSink>,
    pub llm_override: Option<Arc<dyn LlmClient>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/profile", get(get_profile).put(put_profile))
        .route("/api/reports/generate", post(generate_report))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/search", get(search_reports))
        .route("/api/reports/{id}", get(get_report).delete(delete_report))
        .route("/api/reports/{id}/pdf", get(report_pdf))
        .route("/api/chat/{report_id}/message", post(chat_message))
        .route("/api/chat/{report_id}/history", get(chat_history).delete(chat_clear))
        .route("/api/chat/{report_id}/suggestions", get(chat_suggestions))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub struct ApiError {
    status: StatusCode,
    message: String,
    correlation_id: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, correlation_id: &str) -> Self {
        Self { status, message: message.into(), correlation_id: correlation_id.to_string() }
    }

    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, correlation_id)
    }

    fn not_found(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, correlation_id)
    }

    fn service_unavailable(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, correlation_id)
    }

    fn internal(message: impl Into<String>, correlation_id: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, correlation_id)
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        warn!(
            correlation_id,
            reason_code = error.reason_code(),
            error = %error,
            "request failed"
        );
        let interface = error.into_interface(correlation_id);
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, interface.user_message(), correlation_id)
    }

    fn from_repository(error: RepositoryError, correlation_id: &str) -> Self {
        warn!(correlation_id, error = %error, "repository access failed");
        Self::service_unavailable(
            "The service is temporarily unavailable. Please retry shortly.",
            correlation_id,
        )
    }

    fn from_chat(error: ChatError, correlation_id: &str) -> Self {
        match error {
            ChatError::ReportNotFound(id) => {
                Self::not_found(format!("report {id} was not found"), correlation_id)
            }
            ChatError::Repository(inner) => Self::from_repository(inner, correlation_id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message, "correlation_id": self.correlation_id });
        (self.status, Json(body)).into_response()
    }
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

async fn get_profile(State(state): State<Arc<AppState>>) -> Result<Json<CompanyProfile>, ApiError> {
    let correlation_id = new_correlation_id();
    state
        .profiles
        .load()
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no company profile is configured", &correlation_id))
}

async fn put_profile(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<CompanyProfile>,
) -> Result<Json<CompanyProfile>, ApiError> {
    let correlation_id = new_correlation_id();

    if let Err(DomainError::InvalidProfile { violations }) = profile.validate() {
        let detail = violations
            .iter()
            .map(|violation| format!("{}: {}", violation.field, violation.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::bad_request(format!("invalid profile: {detail}"), &correlation_id));
    }

    state
        .profiles
        .store(&profile)
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?;
    info!(correlation_id, company = %profile.company_name, "company profile stored");
    Ok(Json(profile))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

async fn generate_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let api_key = resolve_api_key(&headers, &state.config, &correlation_id)?;

    let profile = state
        .profiles
        .load()
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?
        .ok_or_else(|| {
            ApiError::bad_request("no company profile is configured", &correlation_id)
        })?;

    let llm = build_llm(&state, api_key, &correlation_id)?;
    let controller = build_controller(&state, llm);

    let report = controller
        .run(&profile, &correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    let status = if report.status == ReportStatus::Failed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)).into_response())
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0);

    let page = state
        .reports
        .list(limit, offset)
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?;
    Ok(Json(page).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<u32>,
}

async fn search_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let limit = query.limit.unwrap_or(10).clamp(1, 50);

    let hits = state.index.search_reports(&query.q, limit).await.map_err(|error| {
        warn!(correlation_id, error = %error, "report search failed");
        ApiError::service_unavailable("report search is temporarily unavailable", &correlation_id)
    })?;

    Ok(Json(json!({ "query": query.q, "total": hits.len(), "results": hits })).into_response())
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&id, &correlation_id)?;

    let report = state
        .reports
        .find_by_id(&report_id)
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?
        .ok_or_else(|| {
            ApiError::not_found(format!("report {report_id} was not found"), &correlation_id)
        })?;
    Ok(Json(report).into_response())
}

async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&id, &correlation_id)?;

    let report = state
        .reports
        .find_by_id(&report_id)
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?
        .ok_or_else(|| {
            ApiError::not_found(format!("report {report_id} was not found"), &correlation_id)
        })?;

    state
        .reports
        .delete(&report_id)
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?;

    if let Err(index_error) = state.index.remove_report(&report_id).await {
        warn!(correlation_id, error = %index_error, "index cleanup failed; continuing");
    }
    if let Some(pdf_path) = &report.pdf_path {
        if let Err(io_error) = tokio::fs::remove_file(pdf_path).await {
            warn!(correlation_id, error = %io_error, "artifact cleanup failed; continuing");
        }
    }

    info!(correlation_id, report_id = %report_id, "report deleted");
    Ok(Json(json!({ "deleted": true, "report_id": report_id })).into_response())
}

async fn report_pdf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&id, &correlation_id)?;

    let report = state
        .reports
        .find_by_id(&report_id)
        .await
        .map_err(|error| ApiError::from_repository(error, &correlation_id))?
        .ok_or_else(|| {
            ApiError::not_found(format!("report {report_id} was not found"), &correlation_id)
        })?;

    let pdf_path = report.pdf_path.as_deref().ok_or_else(|| {
        ApiError::not_found(format!("report {report_id} has no PDF artifact"), &correlation_id)
    })?;

    let bytes = tokio::fs::read(pdf_path).await.map_err(|io_error| {
        warn!(correlation_id, error = %io_error, path = pdf_path, "artifact read failed");
        ApiError::not_found(format!("report {report_id} has no PDF artifact"), &correlation_id)
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"compliance_report_{report_id}.pdf\""),
        )
        .body(Body::from(bytes))
        .map_err(|error| ApiError::internal(error.to_string(), &correlation_id))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatMessageRequest {
    message: String,
}

async fn chat_message(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ChatMessageRequest>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&report_id, &correlation_id)?;
    let api_key = resolve_api_key(&headers, &state.config, &correlation_id)?;

    let llm = build_llm(&state, api_key, &correlation_id)?;
    let chat = ChatService::new(llm, Arc::clone(&state.reports), Arc::clone(&state.chats));

    let reply = chat
        .send_message(&report_id, &body.message)
        .await
        .map_err(|error| ApiError::from_chat(error, &correlation_id))?;

    Ok(Json(json!({ "answer": reply.content, "report_id": report_id })).into_response())
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&report_id, &correlation_id)?;

    let chat = ambient_chat(&state);
    let messages = chat
        .history(&report_id)
        .await
        .map_err(|error| ApiError::from_chat(error, &correlation_id))?;
    Ok(Json(json!({ "report_id": report_id, "messages": messages })).into_response())
}

async fn chat_clear(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&report_id, &correlation_id)?;

    let chat = ambient_chat(&state);
    let cleared = chat
        .clear(&report_id)
        .await
        .map_err(|error| ApiError::from_chat(error, &correlation_id))?;
    Ok(Json(json!({ "report_id": report_id, "cleared": cleared })).into_response())
}

async fn chat_suggestions(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = new_correlation_id();
    let report_id = parse_report_id(&report_id, &correlation_id)?;

    let chat = ambient_chat(&state);
    let suggestions = chat
        .suggestions(&report_id)
        .await
        .map_err(|error| ApiError::from_chat(error, &correlation_id))?;
    Ok(Json(json!({ "report_id": report_id, "suggestions": suggestions })).into_response())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_report_id(raw: &str, correlation_id: &str) -> Result<ReportId, ApiError> {
    Uuid::parse_str(raw)
        .map(ReportId)
        .map_err(|_| ApiError::bad_request(format!("invalid report id `{raw}`"), correlation_id))
}

/// The effective Anthropic key for a request: the `X-API-Key` header wins
/// over the configured key. Missing or malformed keys are a 400.
fn resolve_api_key(
    headers: &HeaderMap,
    config: &AppConfig,
    correlation_id: &str,
) -> Result<String, ApiError> {
    let header_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string);

    let key = header_key
        .or_else(|| config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()))
        .ok_or_else(|| {
            ApiError::bad_request(
                "no API key: set llm.api_key or pass the X-API-Key header",
                correlation_id,
            )
        })?;

    validate_api_key_format(&key)
        .map_err(|error| ApiError::bad_request(error.to_string(), correlation_id))?;
    Ok(key)
}

fn build_llm(
    state: &AppState,
    api_key: String,
    correlation_id: &str,
) -> Result<Arc<dyn LlmClient>, ApiError> {
    if let Some(llm) = &state.llm_override {
        return Ok(Arc::clone(llm));
    }

    let llm_config = LlmConfig { api_key: Some(api_key.into()), ..state.config.llm.clone() };
    routewatch_agent::AnthropicClient::new(&llm_config)
        .map(|client| Arc::new(client) as Arc<dyn LlmClient>)
        .map_err(|error| ApiError::internal(error.to_string(), correlation_id))
}

/// Chat access without a per-request key (history, clear, suggestions). If
/// no key is configured the client errors on use, which the chat service
/// absorbs into its static fallbacks.
fn ambient_chat(state: &Arc<AppState>) -> ChatService {
    let llm: Arc<dyn LlmClient> = if let Some(llm) = &state.llm_override {
        Arc::clone(llm)
    } else if state.config.has_llm_api_key() {
        match routewatch_agent::AnthropicClient::new(&state.config.llm) {
            Ok(client) => Arc::new(client),
            Err(_) => Arc::new(UnconfiguredLlm),
        }
    } else {
        Arc::new(UnconfiguredLlm)
    };
    ChatService::new(llm, Arc::clone(&state.reports), Arc::clone(&state.chats))
}

struct UnconfiguredLlm;

#[async_trait::async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(&self, _request: routewatch_agent::LlmRequest) -> anyhow::Result<String> {
        anyhow::bail!("llm api key is not configured")
    }
}

fn build_controller(state: &AppState, llm: Arc<dyn LlmClient>) -> PipelineController {
    let gatherer = EvidenceGatherer::new(
        Arc::clone(&llm),
        Arc::clone(&state.provider),
        GathererSettings::from_config(&state.config.pipeline, &state.config.search),
    );

    PipelineController::new(
        Arc::new(gatherer),
        ReportDrafter::new(Arc::clone(&llm)),
        ReportValidator::new(llm, state.config.pipeline.approval_threshold),
        Arc::clone(&state.reports),
        Arc::clone(&state.index),
        Arc::clone(&state.audit),
        state.config.pipeline.max_iterations,
    )
    .with_renderer(Arc::clone(&state.renderer))
}
