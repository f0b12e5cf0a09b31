use citabot_core::config::{AppConfig, LlmProvider, LoadOptions};
use serde::Serialize;

use super::CommandResult;

const DOCTOR_FAILURE_EXIT_CODE: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { DOCTOR_FAILURE_EXIT_CODE };

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
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_llm(&config));
            checks.push(check_grid_store(&config));
            checks.push(check_calendar_store(&config));
            checks.push(check_persistence_reachable(&config));
            checks.push(check_outbound(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm", "grid_store", "calendar_store", "persistence", "outbound_transport"] {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider {
        LlmProvider::Disabled => DoctorCheck::skipped(
            "llm",
            "language model disabled; keyword intent detection and templated replies in use",
        ),
        provider => DoctorCheck::pass(
            "llm",
            format!("{provider:?} configured with model `{}`", config.llm.model),
        ),
    }
}

fn check_grid_store(config: &AppConfig) -> DoctorCheck {
    if !config.sheets.enabled {
        return DoctorCheck::skipped("grid_store", "sheets.enabled is false");
    }
    DoctorCheck::pass(
        "grid_store",
        format!(
            "spreadsheet `{}` sheet `{}` with {} bookable rows",
            config.sheets.spreadsheet_id.as_deref().unwrap_or_default(),
            config.sheets.sheet_name,
            config.business.time_slots.len()
        ),
    )
}

fn check_calendar_store(config: &AppConfig) -> DoctorCheck {
    if !config.calendar.enabled {
        return DoctorCheck::skipped("calendar_store", "calendar.enabled is false");
    }
    DoctorCheck::pass(
        "calendar_store",
        format!(
            "calendar `{}` in timezone {}",
            config.calendar.calendar_id.as_deref().unwrap_or_default(),
            config.calendar.timezone
        ),
    )
}

/// Strict confirmation with no backend would reject every booking.
fn check_persistence_reachable(config: &AppConfig) -> DoctorCheck {
    use citabot_core::ConfirmationPolicy;

    let any_backend = config.sheets.enabled || config.calendar.enabled;
    match (any_backend, config.dialog.confirmation_policy) {
        (true, _) => DoctorCheck::pass("persistence", "at least one appointment backend enabled"),
        (false, ConfirmationPolicy::Always) => DoctorCheck::skipped(
            "persistence",
            "no appointment backend enabled; bookings are confirmed but not recorded",
        ),
        (false, ConfirmationPolicy::RequireAnyBackend) => DoctorCheck {
            name: "persistence",
            status: CheckStatus::Fail,
            details: "confirmation_policy require_any_backend needs sheets or calendar enabled"
                .to_string(),
        },
    }
}

fn check_outbound(config: &AppConfig) -> DoctorCheck {
    match config.transport.outbound_url.as_deref() {
        Some(url) => DoctorCheck::pass("outbound_transport", format!("replies posted to {url}")),
        None => DoctorCheck::skipped(
            "outbound_transport",
            "transport.outbound_url unset; replies are only logged",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
