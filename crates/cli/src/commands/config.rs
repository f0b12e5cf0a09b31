use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use citabot_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key: Some(env_key), value: value.into() }
    }

    fn file_only(key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key: None, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("llm.provider", "CITABOT_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        Field::new("llm.model", "CITABOT_LLM_MODEL", config.llm.model.as_str()),
        Field::new(
            "llm.base_url",
            "CITABOT_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", "CITABOT_LLM_API_KEY", redact_secret(config.llm.api_key.as_ref())),
        Field::new("sheets.enabled", "CITABOT_SHEETS_ENABLED", config.sheets.enabled.to_string()),
        Field::new(
            "sheets.spreadsheet_id",
            "CITABOT_SHEETS_SPREADSHEET_ID",
            config.sheets.spreadsheet_id.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("sheets.sheet_name", "CITABOT_SHEETS_SHEET_NAME", config.sheets.sheet_name.as_str()),
        Field::new(
            "sheets.access_token",
            "CITABOT_SHEETS_ACCESS_TOKEN",
            redact_secret(config.sheets.access_token.as_ref()),
        ),
        Field::new(
            "calendar.enabled",
            "CITABOT_CALENDAR_ENABLED",
            config.calendar.enabled.to_string(),
        ),
        Field::new(
            "calendar.calendar_id",
            "CITABOT_CALENDAR_ID",
            config.calendar.calendar_id.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "calendar.timezone",
            "CITABOT_CALENDAR_TIMEZONE",
            config.calendar.timezone.as_str(),
        ),
        Field::new(
            "calendar.access_token",
            "CITABOT_CALENDAR_ACCESS_TOKEN",
            redact_secret(config.calendar.access_token.as_ref()),
        ),
        Field::new(
            "dialog.quiet_window_secs",
            "CITABOT_DIALOG_QUIET_WINDOW_SECS",
            config.dialog.quiet_window_secs.to_string(),
        ),
        Field::new(
            "dialog.history_limit",
            "CITABOT_DIALOG_HISTORY_LIMIT",
            config.dialog.history_limit.to_string(),
        ),
        Field::new(
            "dialog.confirmation_policy",
            "CITABOT_DIALOG_CONFIRMATION_POLICY",
            format!("{:?}", config.dialog.confirmation_policy),
        ),
        Field::new("business.name", "CITABOT_BUSINESS_NAME", config.business.name.as_str()),
        Field::file_only("business.time_slots", config.business.time_slots.join(", ")),
        Field::file_only("business.staff", render_list(&config.business.staff)),
        Field::new(
            "transport.webhook_port",
            "CITABOT_TRANSPORT_WEBHOOK_PORT",
            config.transport.webhook_port.to_string(),
        ),
        Field::new(
            "transport.outbound_url",
            "CITABOT_TRANSPORT_OUTBOUND_URL",
            config.transport.outbound_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "transport.outbound_token",
            "CITABOT_TRANSPORT_OUTBOUND_TOKEN",
            redact_secret(config.transport.outbound_token.as_ref()),
        ),
        Field::new(
            "transport.webhook_secret",
            "CITABOT_TRANSPORT_WEBHOOK_SECRET",
            redact_secret(config.transport.webhook_secret.as_ref()),
        ),
        Field::new(
            "server.bind_address",
            "CITABOT_SERVER_BIND_ADDRESS",
            config.server.bind_address.as_str(),
        ),
        Field::new(
            "server.health_check_port",
            "CITABOT_SERVER_HEALTH_CHECK_PORT",
            config.server.health_check_port.to_string(),
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            "CITABOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new("logging.level", "CITABOT_LOGGING_LEVEL", config.logging.level.as_str()),
        Field::new(
            "logging.format",
            "CITABOT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["citabot.toml", "config/citabot.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn render_list(values: &[String]) -> String {
    if values.is_empty() {
        "<none>".to_string()
    } else {
        values.join(", ")
    }
}

/// Shows a four-character prefix of longer secrets so operators can tell tokens apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() < 12 {
        return "<redacted>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
