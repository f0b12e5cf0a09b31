use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use citabot_agent::{DialogEngine, UserMessage};
use citabot_transport::{HandlerError, IncomingText, MessageContext, MessageHandler};

/// Feeds filtered transport messages into the dialog engine.
pub struct DialogHandler {
    engine: Arc<DialogEngine>,
}

impl DialogHandler {
    pub fn new(engine: Arc<DialogEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MessageHandler for DialogHandler {
    async fn handle(
        &self,
        message: &IncomingText,
        ctx: &MessageContext,
    ) -> Result<Option<String>, HandlerError> {
        let user_message = UserMessage {
            identity: message.sender.clone(),
            display_name: message.display_name.clone(),
            text: message.text.clone(),
            correlation_id: ctx.correlation_id.clone(),
        };

        match self.engine.handle(&user_message).await {
            Ok(turn) => {
                info!(
                    event_name = "dialog.turn_completed",
                    correlation_id = %ctx.correlation_id,
                    sender = %message.sender,
                    state = ?turn.state,
                    replied = turn.reply.is_some(),
                    "dialog turn completed"
                );
                Ok(turn.reply)
            }
            Err(failure) => {
                let interface = failure.into_interface(ctx.correlation_id.as_str());
                error!(
                    event_name = "dialog.turn_failed",
                    correlation_id = %ctx.correlation_id,
                    sender = %message.sender,
                    error = %interface,
                    "dialog turn failed; sending user-safe message"
                );
                Ok(Some(interface.user_message().to_owned()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use citabot_agent::{
        BookingCoordinator, ConfirmationGenerator, DialogEngine, DialogSettings, Templates,
        TextGenerator,
    };
    use citabot_core::{BusinessProfile, ConfirmationPolicy, ProfileSource, SystemClock};
    use citabot_store::InMemorySessionStore;
    use citabot_transport::{IncomingText, MessageContext, MessageHandler};

    use super::DialogHandler;

    fn engine() -> Arc<DialogEngine> {
        let templates = Arc::new(Templates::new().expect("templates"));
        let booking = BookingCoordinator::new(
            None,
            None,
            Duration::from_secs(1),
            ConfirmationPolicy::Always,
            ConfirmationGenerator::new(TextGenerator::disabled(), templates.clone()),
        );
        Arc::new(DialogEngine::new(
            Arc::new(InMemorySessionStore::default()),
            Arc::new(ProfileSource::new(BusinessProfile::default())),
            Arc::new(SystemClock::default()),
            TextGenerator::disabled(),
            templates,
            booking,
            DialogSettings::default(),
        ))
    }

    #[tokio::test]
    async fn booking_keyword_gets_the_name_prompt() {
        let handler = DialogHandler::new(engine());
        let reply = handler
            .handle(
                &IncomingText {
                    message_id: "wamid-1".to_owned(),
                    sender: "5215550001".to_owned(),
                    display_name: "Ana".to_owned(),
                    text: "Quiero agendar una cita".to_owned(),
                },
                &MessageContext { correlation_id: "wamid-1".to_owned() },
            )
            .await
            .expect("handled");

        assert!(reply.is_some_and(|text| text.contains("nombre")));
    }
}
