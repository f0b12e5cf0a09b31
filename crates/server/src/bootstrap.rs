use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use citabot_agent::{
    BookingCoordinator, CalendarTarget, ConfirmationGenerator, DialogEngine, DialogSettings,
    GridTarget, LlmClient, Templates, TextGenerator,
};
use citabot_core::config::{AppConfig, ConfigError, LoadOptions};
use citabot_core::{ProfileSource, SystemClock};
use citabot_store::{InMemorySessionStore, SessionStore};
use citabot_transport::{MessageSender, ReconnectPolicy, TransportRunner};

use crate::calendar::GoogleCalendarStore;
use crate::handler::DialogHandler;
use crate::health::{Collaborators, HealthState};
use crate::llm::ChatCompletionsClient;
use crate::sheets::SheetsGridStore;
use crate::webhook::{self, WebhookState};

pub struct Application {
    pub config: AppConfig,
    pub profiles: Arc<ProfileSource>,
    pub engine: Arc<DialogEngine>,
    pub collaborators: Collaborators,
    pub webhook: WebhookState,
    pub runner: TransportRunner,
}

impl Application {
    pub fn health_state(&self) -> HealthState {
        HealthState::new(self.engine.sessions().clone(), self.collaborators)
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("prompt templates failed to compile: {0}")]
    Templates(#[source] tera::Error),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let llm = ChatCompletionsClient::from_config(&config.llm).map_err(BootstrapError::HttpClient)?;
    let grid = SheetsGridStore::from_config(&config.sheets).map_err(BootstrapError::HttpClient)?;
    let calendar =
        GoogleCalendarStore::from_config(&config.calendar).map_err(BootstrapError::HttpClient)?;
    let collaborator_timeout = Duration::from_secs(config.dialog.collaborator_timeout_secs);
    let sender: Arc<dyn MessageSender> =
        webhook::sender_from_config(&config.transport, collaborator_timeout)
            .map_err(BootstrapError::HttpClient)?;

    let collaborators = Collaborators {
        llm: llm.is_some(),
        sheets: grid.is_some(),
        calendar: calendar.is_some(),
        outbound: config.transport.outbound_url.is_some(),
    };
    info!(
        event_name = "system.bootstrap.collaborators",
        correlation_id = "bootstrap",
        llm = collaborators.llm,
        sheets = collaborators.sheets,
        calendar = collaborators.calendar,
        outbound = collaborators.outbound,
        "collaborators resolved"
    );

    let generator = TextGenerator::new(
        llm.map(|client| Arc::new(client) as Arc<dyn LlmClient>),
        Duration::from_secs(config.llm.timeout_secs),
    );
    let templates = Arc::new(Templates::new().map_err(BootstrapError::Templates)?);
    let booking = BookingCoordinator::new(
        grid.map(|store| GridTarget {
            store: Arc::new(store),
            sheet_name: config.sheets.sheet_name.clone(),
        }),
        calendar.map(|store| CalendarTarget {
            store: Arc::new(store),
            timezone: config.calendar.timezone.clone(),
        }),
        collaborator_timeout,
        config.dialog.confirmation_policy,
        ConfirmationGenerator::new(generator.clone(), templates.clone()),
    );

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::default());
    let profiles = Arc::new(ProfileSource::new(config.business.clone()));
    let engine = Arc::new(DialogEngine::new(
        sessions,
        profiles.clone(),
        Arc::new(SystemClock::new(config.calendar.tz()?)),
        generator,
        templates,
        booking,
        DialogSettings::from(&config.dialog),
    ));

    let (webhook_state, transport) = webhook::channel(config.transport.webhook_secret.clone());
    let runner = TransportRunner::new(
        Arc::new(transport),
        sender,
        Arc::new(DialogHandler::new(engine.clone())),
        ReconnectPolicy::default(),
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        business = %config.business.name,
        "application bootstrap complete"
    );

    Ok(Application { config, profiles, engine, collaborators, webhook: webhook_state, runner })
}

#[cfg(test)]
mod tests {
    use citabot_core::config::{ConfigOverrides, LlmProvider, LoadOptions};
    use citabot_transport::{IncomingText, MessageContext, MessageHandler};

    use crate::bootstrap::bootstrap;
    use crate::handler::DialogHandler;

    #[tokio::test]
    async fn bootstrap_fails_fast_when_openai_key_is_missing() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                llm_api_key: Some("  ".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[tokio::test]
    async fn offline_bootstrap_runs_a_conversation_without_collaborators() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Disabled),
                sheets_enabled: Some(false),
                calendar_enabled: Some(false),
                business_name: Some("Salón Prueba".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed offline");

        assert!(!app.collaborators.llm);
        assert!(!app.collaborators.sheets);
        assert_eq!(app.profiles.snapshot().name, "Salón Prueba");

        let handler = DialogHandler::new(app.engine.clone());
        let reply = handler
            .handle(
                &IncomingText {
                    message_id: "m-1".to_owned(),
                    sender: "5215550009".to_owned(),
                    display_name: "Luz".to_owned(),
                    text: "hola".to_owned(),
                },
                &MessageContext { correlation_id: "m-1".to_owned() },
            )
            .await
            .expect("handled")
            .expect("reply");

        assert!(reply.contains("Salón Prueba"));
    }
}
