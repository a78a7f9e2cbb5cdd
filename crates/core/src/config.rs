use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub gateway_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub max_results_per_query: u32,
    pub timeout_secs: u64,
}

/// Knobs for the generate/validate loop. `max_iterations` bounds how many
/// drafts a single run may produce; `evidence_cap` bounds how many unique
/// sources reach the drafter.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub max_iterations: u32,
    pub evidence_cap: usize,
    pub approval_threshold: u8,
    pub search_concurrency: usize,
    pub query_cap: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub max_iterations: Option<u32>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://routewatch.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-haiku-4-5".to_string(),
                max_tokens: 4096,
                timeout_secs: 60,
                max_retries: 2,
            },
            search: SearchConfig {
                gateway_url: None,
                api_key: None,
                max_results_per_query: 5,
                timeout_secs: 30,
            },
            pipeline: PipelineConfig {
                max_iterations: 3,
                evidence_cap: 15,
                approval_threshold: 50,
                search_concurrency: 4,
                query_cap: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                data_dir: PathBuf::from("./data"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("routewatch.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(search) = patch.search {
            if let Some(gateway_url) = search.gateway_url {
                self.search.gateway_url = Some(gateway_url);
            }
            if let Some(api_key_value) = search.api_key {
                self.search.api_key = Some(secret_value(api_key_value));
            }
            if let Some(max_results_per_query) = search.max_results_per_query {
                self.search.max_results_per_query = max_results_per_query;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(max_iterations) = pipeline.max_iterations {
                self.pipeline.max_iterations = max_iterations;
            }
            if let Some(evidence_cap) = pipeline.evidence_cap {
                self.pipeline.evidence_cap = evidence_cap;
            }
            if let Some(approval_threshold) = pipeline.approval_threshold {
                self.pipeline.approval_threshold = approval_threshold;
            }
            if let Some(search_concurrency) = pipeline.search_concurrency {
                self.pipeline.search_concurrency = search_concurrency;
            }
            if let Some(query_cap) = pipeline.query_cap {
                self.pipeline.query_cap = query_cap;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(data_dir) = server.data_dir {
                self.server.data_dir = PathBuf::from(data_dir);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ROUTEWATCH_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ROUTEWATCH_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ROUTEWATCH_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ROUTEWATCH_DATABASE_TIMEOUT_SECS", &value)?;
        }

        // ANTHROPIC_API_KEY is the conventional variable name; the prefixed
        // form wins when both are set.
        let llm_api_key =
            read_env("ROUTEWATCH_LLM_API_KEY").or_else(|| read_env("ANTHROPIC_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ROUTEWATCH_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("ROUTEWATCH_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ROUTEWATCH_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("ROUTEWATCH_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ROUTEWATCH_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("ROUTEWATCH_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("ROUTEWATCH_SEARCH_GATEWAY_URL") {
            self.search.gateway_url = Some(value);
        }
        if let Some(value) = read_env("ROUTEWATCH_SEARCH_API_KEY") {
            self.search.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ROUTEWATCH_SEARCH_MAX_RESULTS") {
            self.search.max_results_per_query = parse_u32("ROUTEWATCH_SEARCH_MAX_RESULTS", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("ROUTEWATCH_SEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROUTEWATCH_PIPELINE_MAX_ITERATIONS") {
            self.pipeline.max_iterations = parse_u32("ROUTEWATCH_PIPELINE_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_PIPELINE_EVIDENCE_CAP") {
            self.pipeline.evidence_cap =
                parse_u32("ROUTEWATCH_PIPELINE_EVIDENCE_CAP", &value)? as usize;
        }
        if let Some(value) = read_env("ROUTEWATCH_PIPELINE_APPROVAL_THRESHOLD") {
            self.pipeline.approval_threshold =
                parse_u8("ROUTEWATCH_PIPELINE_APPROVAL_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_PIPELINE_SEARCH_CONCURRENCY") {
            self.pipeline.search_concurrency =
                parse_u32("ROUTEWATCH_PIPELINE_SEARCH_CONCURRENCY", &value)? as usize;
        }
        if let Some(value) = read_env("ROUTEWATCH_PIPELINE_QUERY_CAP") {
            self.pipeline.query_cap = parse_u32("ROUTEWATCH_PIPELINE_QUERY_CAP", &value)? as usize;
        }

        if let Some(value) = read_env("ROUTEWATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ROUTEWATCH_SERVER_PORT") {
            self.server.port = parse_u16("ROUTEWATCH_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ROUTEWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("ROUTEWATCH_SERVER_DATA_DIR") {
            self.server.data_dir = PathBuf::from(value);
        }

        let log_level =
            read_env("ROUTEWATCH_LOGGING_LEVEL").or_else(|| read_env("ROUTEWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ROUTEWATCH_LOGGING_FORMAT").or_else(|| read_env("ROUTEWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.pipeline.max_iterations = max_iterations;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.server.data_dir = data_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_search(&self.search)?;
        validate_pipeline(&self.pipeline)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Whether a live LLM key is configured at all. Doctor and the generate
    /// endpoint decide what to do about an absent key; validation only
    /// rejects keys that are present but malformed.
    pub fn has_llm_api_key(&self) -> bool {
        self.llm
            .api_key
            .as_ref()
            .map(|key| !key.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }
}

/// Anthropic key shape check, shared with the API-key header path.
pub fn validate_api_key_format(key: &str) -> Result<(), ConfigError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Validation("llm.api_key must not be empty".to_string()));
    }
    if !trimmed.starts_with("sk-ant-") {
        let hint = if trimmed.starts_with("sk-") {
            " (hint: this looks like a key for a different provider; Anthropic keys start with `sk-ant-`)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "llm.api_key must start with `sk-ant-`{hint}"
        )));
    }
    Ok(())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    if let Some(value) = env::var_os("ROUTEWATCH_CONFIG") {
        let path = PathBuf::from(value);
        return path.exists().then_some(path);
    }

    [PathBuf::from("routewatch.toml"), PathBuf::from("config/routewatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(key) = &llm.api_key {
        let exposed = key.expose_secret();
        if !exposed.trim().is_empty() {
            validate_api_key_format(exposed)?;
        }
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.timeout_secs == 0 || search.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if search.max_results_per_query == 0 || search.max_results_per_query > 20 {
        return Err(ConfigError::Validation(
            "search.max_results_per_query must be in range 1..=20".to_string(),
        ));
    }

    if let Some(gateway_url) = &search.gateway_url {
        if !gateway_url.starts_with("http://") && !gateway_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "search.gateway_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.max_iterations == 0 || pipeline.max_iterations > 10 {
        return Err(ConfigError::Validation(
            "pipeline.max_iterations must be in range 1..=10".to_string(),
        ));
    }

    if pipeline.evidence_cap == 0 {
        return Err(ConfigError::Validation(
            "pipeline.evidence_cap must be greater than zero".to_string(),
        ));
    }

    if pipeline.approval_threshold > 100 {
        return Err(ConfigError::Validation(
            "pipeline.approval_threshold must be in range 0..=100".to_string(),
        ));
    }

    if pipeline.search_concurrency == 0 {
        return Err(ConfigError::Validation(
            "pipeline.search_concurrency must be greater than zero".to_string(),
        ));
    }

    if pipeline.query_cap == 0 {
        return Err(ConfigError::Validation(
            "pipeline.query_cap must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    search: Option<SearchPatch>,
    pipeline: Option<PipelinePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    gateway_url: Option<String>,
    api_key: Option<String>,
    max_results_per_query: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    max_iterations: Option<u32>,
    evidence_cap: Option<usize>,
    approval_threshold: Option<u8>,
    search_concurrency: Option<usize>,
    query_cap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        validate_api_key_format, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_key_material() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["ANTHROPIC_API_KEY", "ROUTEWATCH_LLM_API_KEY"]);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.pipeline.max_iterations == 3, "default iteration budget should be 3")?;
        ensure(config.pipeline.evidence_cap == 15, "default evidence cap should be 15")?;
        ensure(config.pipeline.approval_threshold == 50, "default threshold should be 50")?;
        ensure(!config.has_llm_api_key(), "no key should be configured by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ANTHROPIC_KEY", "sk-ant-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("routewatch.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_ANTHROPIC_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(
                key.as_deref() == Some("sk-ant-from-env"),
                "api key should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_ANTHROPIC_KEY"]);
        result
    }

    #[test]
    fn anthropic_env_alias_is_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ANTHROPIC_API_KEY", "sk-ant-alias-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.has_llm_api_key(), "alias variable should populate the llm key")
        })();

        clear_vars(&["ANTHROPIC_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROUTEWATCH_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ROUTEWATCH_PIPELINE_MAX_ITERATIONS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("routewatch.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[pipeline]
max_iterations = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.pipeline.max_iterations == 5,
                "env iteration budget should win over file",
            )
        })();

        clear_vars(&["ROUTEWATCH_DATABASE_URL", "ROUTEWATCH_PIPELINE_MAX_ITERATIONS"]);
        result
    }

    #[test]
    fn malformed_api_key_fails_validation_with_hint() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROUTEWATCH_LLM_API_KEY", "sk-proj-not-anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("sk-ant-") && message.contains("hint")
            );
            ensure(has_message, "validation failure should mention the expected prefix")
        })();

        clear_vars(&["ROUTEWATCH_LLM_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROUTEWATCH_LOG_LEVEL", "warn");
        env::set_var("ROUTEWATCH_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["ROUTEWATCH_LOG_LEVEL", "ROUTEWATCH_LOG_FORMAT"]);
        result
    }

    #[test]
    fn zero_iteration_budget_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROUTEWATCH_PIPELINE_MAX_ITERATIONS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("a zero iteration budget must not validate".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("max_iterations")
                ),
                "validation failure should mention max_iterations",
            )
        })();

        clear_vars(&["ROUTEWATCH_PIPELINE_MAX_ITERATIONS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROUTEWATCH_LLM_API_KEY", "sk-ant-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("sk-ant-secret-value"),
                "debug output should not contain the api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["ROUTEWATCH_LLM_API_KEY"]);
        result
    }

    #[test]
    fn api_key_format_check_rejects_empty_and_foreign_prefixes() {
        assert!(validate_api_key_format("sk-ant-abc123").is_ok());
        assert!(validate_api_key_format("").is_err());
        assert!(validate_api_key_format("sk-proj-abc").is_err());
        assert!(validate_api_key_format("token").is_err());
    }
}
