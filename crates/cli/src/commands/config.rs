use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use routewatch_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(
            key_path,
            Some(env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        )
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "ROUTEWATCH_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "ROUTEWATCH_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "ROUTEWATCH_DATABASE_TIMEOUT_SECS"),
    ));

    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "ROUTEWATCH_LLM_API_KEY"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "ROUTEWATCH_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", "ROUTEWATCH_LLM_BASE_URL"),
    ));
    lines.push(render_line(
        "llm.max_tokens",
        &config.llm.max_tokens.to_string(),
        source("llm.max_tokens", "ROUTEWATCH_LLM_MAX_TOKENS"),
    ));

    lines.push(render_line(
        "search.gateway_url",
        config.search.gateway_url.as_deref().unwrap_or("<unset>"),
        source("search.gateway_url", "ROUTEWATCH_SEARCH_GATEWAY_URL"),
    ));
    let search_api_key = if config.search.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "search.api_key",
        search_api_key,
        source("search.api_key", "ROUTEWATCH_SEARCH_API_KEY"),
    ));
    lines.push(render_line(
        "search.max_results_per_query",
        &config.search.max_results_per_query.to_string(),
        source("search.max_results_per_query", "ROUTEWATCH_SEARCH_MAX_RESULTS"),
    ));

    lines.push(render_line(
        "pipeline.max_iterations",
        &config.pipeline.max_iterations.to_string(),
        source("pipeline.max_iterations", "ROUTEWATCH_PIPELINE_MAX_ITERATIONS"),
    ));
    lines.push(render_line(
        "pipeline.approval_threshold",
        &config.pipeline.approval_threshold.to_string(),
        source("pipeline.approval_threshold", "ROUTEWATCH_PIPELINE_APPROVAL_THRESHOLD"),
    ));
    lines.push(render_line(
        "pipeline.evidence_cap",
        &config.pipeline.evidence_cap.to_string(),
        source("pipeline.evidence_cap", "ROUTEWATCH_PIPELINE_EVIDENCE_CAP"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "ROUTEWATCH_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "ROUTEWATCH_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.data_dir",
        &config.server.data_dir.display().to_string(),
        source("server.data_dir", "ROUTEWATCH_SERVER_DATA_DIR"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "ROUTEWATCH_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "ROUTEWATCH_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    if let Some(value) = env::var_os("ROUTEWATCH_CONFIG") {
        let path = PathBuf::from(value);
        if path.exists() {
            return Some(path);
        }
    }

    let root = PathBuf::from("routewatch.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/routewatch.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
