use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::profile::{BusinessProfile, ServiceOffering};
use crate::normalize::to_24_hour;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub sheets: SheetsConfig,
    pub calendar: CalendarConfig,
    pub dialog: DialogConfig,
    pub business: BusinessProfile,
    pub transport: TransportConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub enabled: bool,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub access_token: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub enabled: bool,
    pub calendar_id: Option<String>,
    pub access_token: Option<SecretString>,
    pub base_url: String,
    pub timezone: String,
    pub timeout_secs: u64,
}

impl CalendarConfig {
    /// Business timezone; "today" and event wall-clock times are read in it.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::Validation(format!(
                "calendar.timezone `{}` is not an IANA timezone name",
                self.timezone
            ))
        })
    }
}

#[derive(Clone, Debug)]
pub struct DialogConfig {
    pub quiet_window_secs: u64,
    pub history_limit: usize,
    pub confirmation_policy: ConfirmationPolicy,
    pub collaborator_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub webhook_port: u16,
    pub outbound_url: Option<String>,
    pub outbound_token: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
    Disabled,
}

/// Whether a booking is confirmed to the user when persistence did not fully succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Confirm regardless of backend failures.
    Always,
    /// Confirm only when at least one backend accepted the write.
    RequireAnyBackend,
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub sheets_enabled: Option<bool>,
    pub calendar_enabled: Option<bool>,
    pub quiet_window_secs: Option<u64>,
    pub business_name: Option<String>,
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
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 20,
            },
            sheets: SheetsConfig {
                enabled: false,
                spreadsheet_id: None,
                sheet_name: "Agenda".to_string(),
                access_token: None,
                base_url: "https://sheets.googleapis.com/v4".to_string(),
                timeout_secs: 15,
            },
            calendar: CalendarConfig {
                enabled: false,
                calendar_id: None,
                access_token: None,
                base_url: "https://www.googleapis.com/calendar/v3".to_string(),
                timezone: "America/Mexico_City".to_string(),
                timeout_secs: 15,
            },
            dialog: DialogConfig {
                quiet_window_secs: 5,
                history_limit: 10,
                confirmation_policy: ConfirmationPolicy::Always,
                collaborator_timeout_secs: 20,
            },
            business: BusinessProfile::default(),
            transport: TransportConfig {
                webhook_port: 8081,
                outbound_url: None,
                outbound_token: None,
                webhook_secret: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
            ))),
        }
    }
}

impl std::str::FromStr for ConfirmationPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "require_any_backend" => Ok(Self::RequireAnyBackend),
            other => Err(ConfigError::Validation(format!(
                "unsupported confirmation policy `{other}` (expected always|require_any_backend)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("citabot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(sheets) = patch.sheets {
            if let Some(enabled) = sheets.enabled {
                self.sheets.enabled = enabled;
            }
            if let Some(spreadsheet_id) = sheets.spreadsheet_id {
                self.sheets.spreadsheet_id = Some(spreadsheet_id);
            }
            if let Some(sheet_name) = sheets.sheet_name {
                self.sheets.sheet_name = sheet_name;
            }
            if let Some(access_token) = sheets.access_token {
                self.sheets.access_token = Some(secret_value(access_token));
            }
            if let Some(base_url) = sheets.base_url {
                self.sheets.base_url = base_url;
            }
            if let Some(timeout_secs) = sheets.timeout_secs {
                self.sheets.timeout_secs = timeout_secs;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(enabled) = calendar.enabled {
                self.calendar.enabled = enabled;
            }
            if let Some(calendar_id) = calendar.calendar_id {
                self.calendar.calendar_id = Some(calendar_id);
            }
            if let Some(access_token) = calendar.access_token {
                self.calendar.access_token = Some(secret_value(access_token));
            }
            if let Some(base_url) = calendar.base_url {
                self.calendar.base_url = base_url;
            }
            if let Some(timezone) = calendar.timezone {
                self.calendar.timezone = timezone;
            }
            if let Some(timeout_secs) = calendar.timeout_secs {
                self.calendar.timeout_secs = timeout_secs;
            }
        }

        if let Some(dialog) = patch.dialog {
            if let Some(quiet_window_secs) = dialog.quiet_window_secs {
                self.dialog.quiet_window_secs = quiet_window_secs;
            }
            if let Some(history_limit) = dialog.history_limit {
                self.dialog.history_limit = history_limit;
            }
            if let Some(confirmation_policy) = dialog.confirmation_policy {
                self.dialog.confirmation_policy = confirmation_policy;
            }
            if let Some(collaborator_timeout_secs) = dialog.collaborator_timeout_secs {
                self.dialog.collaborator_timeout_secs = collaborator_timeout_secs;
            }
        }

        if let Some(business) = patch.business {
            if let Some(name) = business.name {
                self.business.name = name;
            }
            if let Some(address) = business.address {
                self.business.address = address;
            }
            if let Some(hours) = business.hours {
                self.business.hours = hours;
            }
            if let Some(welcome_message) = business.welcome_message {
                self.business.welcome_message = Some(welcome_message);
            }
            if let Some(staff) = business.staff {
                self.business.staff = staff;
            }
            if let Some(services) = business.services {
                self.business.services = services;
            }
            if let Some(time_slots) = business.time_slots {
                self.business.time_slots = time_slots;
            }
        }

        if let Some(transport) = patch.transport {
            if let Some(webhook_port) = transport.webhook_port {
                self.transport.webhook_port = webhook_port;
            }
            if let Some(outbound_url) = transport.outbound_url {
                self.transport.outbound_url = Some(outbound_url);
            }
            if let Some(outbound_token) = transport.outbound_token {
                self.transport.outbound_token = Some(secret_value(outbound_token));
            }
            if let Some(webhook_secret) = transport.webhook_secret {
                self.transport.webhook_secret = Some(secret_value(webhook_secret));
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("CITABOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CITABOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CITABOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CITABOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CITABOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CITABOT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CITABOT_SHEETS_ENABLED") {
            self.sheets.enabled = parse_bool("CITABOT_SHEETS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CITABOT_SHEETS_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = Some(value);
        }
        if let Some(value) = read_env("CITABOT_SHEETS_SHEET_NAME") {
            self.sheets.sheet_name = value;
        }
        if let Some(value) = read_env("CITABOT_SHEETS_ACCESS_TOKEN") {
            self.sheets.access_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("CITABOT_CALENDAR_ENABLED") {
            self.calendar.enabled = parse_bool("CITABOT_CALENDAR_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CITABOT_CALENDAR_ID") {
            self.calendar.calendar_id = Some(value);
        }
        if let Some(value) = read_env("CITABOT_CALENDAR_ACCESS_TOKEN") {
            self.calendar.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CITABOT_CALENDAR_TIMEZONE") {
            self.calendar.timezone = value;
        }

        if let Some(value) = read_env("CITABOT_DIALOG_QUIET_WINDOW_SECS") {
            self.dialog.quiet_window_secs = parse_u64("CITABOT_DIALOG_QUIET_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("CITABOT_DIALOG_HISTORY_LIMIT") {
            self.dialog.history_limit = parse_usize("CITABOT_DIALOG_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("CITABOT_DIALOG_CONFIRMATION_POLICY") {
            self.dialog.confirmation_policy = value.parse()?;
        }

        if let Some(value) = read_env("CITABOT_BUSINESS_NAME") {
            self.business.name = value;
        }

        if let Some(value) = read_env("CITABOT_TRANSPORT_WEBHOOK_PORT") {
            self.transport.webhook_port = parse_u16("CITABOT_TRANSPORT_WEBHOOK_PORT", &value)?;
        }
        if let Some(value) = read_env("CITABOT_TRANSPORT_OUTBOUND_URL") {
            self.transport.outbound_url = Some(value);
        }
        if let Some(value) = read_env("CITABOT_TRANSPORT_OUTBOUND_TOKEN") {
            self.transport.outbound_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CITABOT_TRANSPORT_WEBHOOK_SECRET") {
            self.transport.webhook_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("CITABOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CITABOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("CITABOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("CITABOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CITABOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("CITABOT_LOGGING_LEVEL").or_else(|| read_env("CITABOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CITABOT_LOGGING_FORMAT").or_else(|| read_env("CITABOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(enabled) = overrides.sheets_enabled {
            self.sheets.enabled = enabled;
        }
        if let Some(enabled) = overrides.calendar_enabled {
            self.calendar.enabled = enabled;
        }
        if let Some(quiet_window_secs) = overrides.quiet_window_secs {
            self.dialog.quiet_window_secs = quiet_window_secs;
        }
        if let Some(business_name) = overrides.business_name {
            self.business.name = business_name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_sheets(&self.sheets)?;
        validate_calendar(&self.calendar)?;
        validate_dialog(&self.dialog)?;
        validate_business(&self.business)?;
        validate_transport(&self.transport)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("citabot.toml"), PathBuf::from("config/citabot.toml")]
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

fn is_blank_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_http_url(key: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    match llm.provider {
        LlmProvider::OpenAi => {
            if is_blank_secret(llm.api_key.as_ref()) {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
    }

    if let Some(base_url) = &llm.base_url {
        validate_http_url("llm.base_url", base_url)?;
    }

    Ok(())
}

fn validate_sheets(sheets: &SheetsConfig) -> Result<(), ConfigError> {
    validate_timeout("sheets.timeout_secs", sheets.timeout_secs)?;
    validate_http_url("sheets.base_url", &sheets.base_url)?;

    if sheets.sheet_name.trim().is_empty() {
        return Err(ConfigError::Validation("sheets.sheet_name must not be empty".to_string()));
    }

    if sheets.enabled {
        let missing_id =
            sheets.spreadsheet_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_id {
            return Err(ConfigError::Validation(
                "sheets.enabled is true but sheets.spreadsheet_id is missing".to_string(),
            ));
        }
        if is_blank_secret(sheets.access_token.as_ref()) {
            return Err(ConfigError::Validation(
                "sheets.enabled is true but sheets.access_token is missing".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    validate_timeout("calendar.timeout_secs", calendar.timeout_secs)?;
    validate_http_url("calendar.base_url", &calendar.base_url)?;

    if calendar.timezone.trim().is_empty() {
        return Err(ConfigError::Validation("calendar.timezone must not be empty".to_string()));
    }
    calendar.tz()?;

    if calendar.enabled {
        let missing_id =
            calendar.calendar_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_id {
            return Err(ConfigError::Validation(
                "calendar.enabled is true but calendar.calendar_id is missing".to_string(),
            ));
        }
        if is_blank_secret(calendar.access_token.as_ref()) {
            return Err(ConfigError::Validation(
                "calendar.enabled is true but calendar.access_token is missing".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_dialog(dialog: &DialogConfig) -> Result<(), ConfigError> {
    if dialog.quiet_window_secs > 300 {
        return Err(ConfigError::Validation(
            "dialog.quiet_window_secs must be at most 300".to_string(),
        ));
    }
    if dialog.history_limit == 0 {
        return Err(ConfigError::Validation(
            "dialog.history_limit must be greater than zero".to_string(),
        ));
    }
    validate_timeout("dialog.collaborator_timeout_secs", dialog.collaborator_timeout_secs)
}

fn validate_business(business: &BusinessProfile) -> Result<(), ConfigError> {
    if business.name.trim().is_empty() {
        return Err(ConfigError::Validation("business.name must not be empty".to_string()));
    }
    if business.time_slots.is_empty() {
        return Err(ConfigError::Validation(
            "business.time_slots must list at least one bookable time".to_string(),
        ));
    }
    for slot in &business.time_slots {
        to_24_hour(slot).map_err(|error| {
            ConfigError::Validation(format!(
                "business.time_slots entry `{slot}` must look like `9:00 AM`: {error}"
            ))
        })?;
    }
    if business.services.iter().any(|service| service.name.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "business.services entries must have a name".to_string(),
        ));
    }
    Ok(())
}

fn validate_transport(transport: &TransportConfig) -> Result<(), ConfigError> {
    if transport.webhook_port == 0 {
        return Err(ConfigError::Validation(
            "transport.webhook_port must be greater than zero".to_string(),
        ));
    }
    if let Some(outbound_url) = &transport.outbound_url {
        validate_http_url("transport.outbound_url", outbound_url)?;
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    sheets: Option<SheetsPatch>,
    calendar: Option<CalendarPatch>,
    dialog: Option<DialogPatch>,
    business: Option<BusinessPatch>,
    transport: Option<TransportPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetsPatch {
    enabled: Option<bool>,
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
    access_token: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    enabled: Option<bool>,
    calendar_id: Option<String>,
    access_token: Option<String>,
    base_url: Option<String>,
    timezone: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DialogPatch {
    quiet_window_secs: Option<u64>,
    history_limit: Option<usize>,
    confirmation_policy: Option<ConfirmationPolicy>,
    collaborator_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessPatch {
    name: Option<String>,
    address: Option<String>,
    hours: Option<String>,
    welcome_message: Option<String>,
    staff: Option<Vec<String>>,
    services: Option<Vec<ServiceOffering>>,
    time_slots: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TransportPatch {
    webhook_port: Option<u16>,
    outbound_url: Option<String>,
    outbound_token: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
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

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, ConfirmationPolicy, LlmProvider, LoadOptions,
        LogFormat,
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
    fn defaults_are_valid_with_every_collaborator_disabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Disabled, "llm should default to disabled")?;
        ensure(!config.sheets.enabled, "sheets should default to disabled")?;
        ensure(!config.calendar.enabled, "calendar should default to disabled")?;
        ensure(config.dialog.quiet_window_secs == 5, "quiet window should default to 5s")?;
        ensure(config.dialog.history_limit == 10, "history should default to 10 entries")?;
        ensure(
            config.dialog.confirmation_policy == ConfirmationPolicy::Always,
            "confirmation policy should default to always",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation_and_business_profile() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CITABOT_SHEETS_TOKEN", "ya29.sheets-token");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("citabot.toml");
            fs::write(
                &path,
                r#"
[sheets]
enabled = true
spreadsheet_id = "sheet-123"
access_token = "${TEST_CITABOT_SHEETS_TOKEN}"

[business]
name = "Salón Luna"
staff = ["Ana", "Luis"]
time_slots = ["9:00 AM", "10:00 AM"]

[[business.services]]
name = "Corte"
price = "150.00"
duration_minutes = 45
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .sheets
                    .access_token
                    .as_ref()
                    .is_some_and(|token| token.expose_secret() == "ya29.sheets-token"),
                "sheets token should be interpolated from the environment",
            )?;
            ensure(config.business.name == "Salón Luna", "business name should load from file")?;
            ensure(config.business.worker_required(), "two staff members require a worker slot")?;
            ensure(
                config.business.services[0].price == Some(Decimal::new(15000, 2)),
                "service price should parse as a decimal",
            )?;
            ensure(config.business.time_slots.len() == 2, "time slots should load from file")
        })();

        clear_vars(&["TEST_CITABOT_SHEETS_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CITABOT_LOG_LEVEL", "warn");
        env::set_var("CITABOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["CITABOT_LOG_LEVEL", "CITABOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CITABOT_DIALOG_QUIET_WINDOW_SECS", "8");
        env::set_var("CITABOT_BUSINESS_NAME", "Desde Env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("citabot.toml");
            fs::write(
                &path,
                r#"
[dialog]
quiet_window_secs = 3
history_limit = 6

[business]
name = "Desde Archivo"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    business_name: Some("Desde Override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.business.name == "Desde Override", "override business name should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.dialog.quiet_window_secs == 8, "env quiet window should win over file")?;
            ensure(config.dialog.history_limit == 6, "file history limit should win over default")
        })();

        clear_vars(&["CITABOT_DIALOG_QUIET_WINDOW_SECS", "CITABOT_BUSINESS_NAME"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CITABOT_CALENDAR_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("calendar.calendar_id")
            );
            ensure(has_message, "validation failure should mention calendar.calendar_id")
        })();

        clear_vars(&["CITABOT_CALENDAR_ENABLED"]);
        result
    }

    #[test]
    fn unknown_timezone_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CITABOT_CALENDAR_TIMEZONE", "America/Ciudad_Gotica");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected unknown timezone to be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("Ciudad_Gotica")),
                "validation failure should name the timezone",
            )
        })();

        clear_vars(&["CITABOT_CALENDAR_TIMEZONE"]);
        result
    }

    #[test]
    fn default_timezone_resolves() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(
            matches!(config.calendar.tz(), Ok(chrono_tz::Tz::America__Mexico_City)),
            "default timezone should be Mexico City",
        )
    }

    #[test]
    fn malformed_time_slot_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("citabot.toml");
        fs::write(&path, "[business]\ntime_slots = [\"14:00\"]\n").map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected malformed slot to be rejected".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("14:00")),
            "validation failure should name the malformed slot",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CITABOT_LLM_PROVIDER", "openai");
        env::set_var("CITABOT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["CITABOT_LLM_PROVIDER", "CITABOT_LLM_API_KEY"]);
        result
    }
}
