use routewatch_core::config::{validate_api_key_format, AppConfig, LoadOptions};
use routewatch_db::connect_with_settings;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_api_key(&config));
            checks.push(check_database_connectivity(&config));
            checks.push(check_pdf_converter());
            checks.push(check_search_gateway(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in
                ["llm_api_key", "database_connectivity", "pdf_converter", "search_gateway"]
            {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Warn,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: no failing readiness checks".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// A missing key is only a warning: report generation still works when the
/// caller supplies an X-API-Key header. A present but malformed key fails.
fn check_api_key(config: &AppConfig) -> DoctorCheck {
    match &config.llm.api_key {
        None => DoctorCheck {
            name: "llm_api_key",
            status: CheckStatus::Warn,
            details: "no API key configured; requests must supply X-API-Key".to_string(),
        },
        Some(key) => match validate_api_key_format(key.expose_secret()) {
            Ok(()) => DoctorCheck {
                name: "llm_api_key",
                status: CheckStatus::Pass,
                details: "API key format accepted".to_string(),
            },
            Err(error) => DoctorCheck {
                name: "llm_api_key",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        },
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

/// Rendering is non-fatal at runtime, so a missing converter only warns.
fn check_pdf_converter() -> DoctorCheck {
    match which::which("wkhtmltopdf") {
        Ok(path) => DoctorCheck {
            name: "pdf_converter",
            status: CheckStatus::Pass,
            details: format!("wkhtmltopdf found at `{}`", path.display()),
        },
        Err(_) => DoctorCheck {
            name: "pdf_converter",
            status: CheckStatus::Warn,
            details: "wkhtmltopdf not found in PATH; reports will have no PDF artifact"
                .to_string(),
        },
    }
}

fn check_search_gateway(config: &AppConfig) -> DoctorCheck {
    let Some(gateway_url) = &config.search.gateway_url else {
        return DoctorCheck {
            name: "search_gateway",
            status: CheckStatus::Warn,
            details: "no search gateway configured; the built-in provider will be used"
                .to_string(),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "search_gateway",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.search.timeout_secs))
            .build()
            .map_err(|error| error.to_string())?;
        // Any HTTP answer counts as reachable; only transport failures fail.
        client.get(gateway_url).send().await.map_err(|error| error.to_string())?;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "search_gateway",
            status: CheckStatus::Pass,
            details: format!("gateway reachable at `{gateway_url}`"),
        },
        Err(error) => DoctorCheck {
            name: "search_gateway",
            status: CheckStatus::Fail,
            details: format!("gateway `{gateway_url}` unreachable: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
