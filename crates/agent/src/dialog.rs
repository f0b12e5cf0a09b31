use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use citabot_core::clock::Clock;
use citabot_core::config::DialogConfig;
use citabot_core::domain::appointment::Appointment;
use citabot_core::domain::profile::{BusinessProfile, ProfileSource};
use citabot_core::domain::session::{ExtractedSlots, Session, SlotName, Speaker, COLLECTION_ORDER};
use citabot_core::errors::{ApplicationError, DomainError};
use citabot_core::flows::{
    BookingFlow, DialogAction, DialogContext, DialogEvent, DialogState, FlowEngine,
    TransitionOutcome,
};
use citabot_core::normalize::text::mentions_any;
use citabot_core::normalize::{fold, normalize_date, TimeParseError};
use citabot_store::{acquire, reset, SessionStore};

use crate::booking::{BookingCoordinator, PersistenceReport};
use crate::llm::{CompletionRequest, LlmError, TextGenerator};
use crate::nlu::{IntentRouter, KeywordIntentClassifier, NluRequest, NluResult};
use crate::templates::Templates;

pub const FALLBACK_APOLOGY: &str = "Disculpa, no pude procesar tu mensaje. ¿Podrías repetirlo?";
pub const SAVE_APOLOGY: &str = "Lo siento, no pude registrar tu cita en este momento. \
Escríbeme de nuevo en unos minutos para intentarlo otra vez.";

const PRICING_KEYWORDS: [&str; 5] = ["precio", "costo", "cuesta", "cuanto", "servicio"];
const HOURS_KEYWORDS: [&str; 4] = ["horario", "hora", "abren", "cierran"];
const LOCATION_KEYWORDS: [&str; 3] = ["donde", "ubicacion", "direccion"];
const GREETING_KEYWORDS: [&str; 5] = ["hola", "buenos dias", "buenas tardes", "buenas noches", "saludos"];

/// Keyword family of a non-booking message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Pricing,
    Hours,
    Location,
    Greeting,
    General,
}

impl Topic {
    pub fn detect(message: &str) -> Self {
        let folded = fold(message);
        if mentions_any(&folded, &PRICING_KEYWORDS) {
            Self::Pricing
        } else if mentions_any(&folded, &HOURS_KEYWORDS) {
            Self::Hours
        } else if mentions_any(&folded, &LOCATION_KEYWORDS) {
            Self::Location
        } else if mentions_any(&folded, &GREETING_KEYWORDS) {
            Self::Greeting
        } else {
            Self::General
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Pricing => "pricing",
            Self::Hours => "hours",
            Self::Location => "location",
            Self::Greeting => "greeting",
            Self::General => "general",
        }
    }

    /// The slice of the business profile the answer may draw on.
    fn context(&self, profile: &BusinessProfile) -> String {
        match self {
            Self::Pricing => format!("Servicios y precios:\n{}", profile.services_summary()),
            Self::Hours => format!(
                "Horario: {}\nHorarios de cita: {}",
                profile.hours,
                profile.time_slots.join(", ")
            ),
            Self::Location => format!(
                "Dirección: {}",
                if profile.address.is_empty() { "no especificada" } else { profile.address.as_str() }
            ),
            Self::Greeting | Self::General => profile.context(),
        }
    }
}

fn slot_label(slot: SlotName) -> &'static str {
    match slot {
        SlotName::Name => "nombre del cliente",
        SlotName::Service => "servicio",
        SlotName::Worker => "profesional que atenderá",
        SlotName::Date => "fecha de la cita",
        SlotName::Time => "hora de la cita",
    }
}

#[derive(Clone, Debug)]
pub struct DialogSettings {
    pub quiet_window: chrono::Duration,
    pub history_limit: usize,
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self { quiet_window: chrono::Duration::seconds(5), history_limit: 10 }
    }
}

impl From<&DialogConfig> for DialogSettings {
    fn from(config: &DialogConfig) -> Self {
        Self {
            quiet_window: chrono::Duration::seconds(config.quiet_window_secs as i64),
            history_limit: config.history_limit,
        }
    }
}

/// One inbound text message, already filtered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserMessage {
    pub identity: String,
    pub display_name: String,
    pub text: String,
    pub correlation_id: String,
}

/// What a single message did to the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DialogTurn {
    /// `None` means nothing should be sent.
    pub reply: Option<String>,
    pub state: DialogState,
    pub requested_slot: Option<SlotName>,
    pub persistence: Option<PersistenceReport>,
}

impl DialogTurn {
    fn reply(state: DialogState, text: String) -> Self {
        Self { reply: Some(text), state, requested_slot: None, persistence: None }
    }

    fn prompt(slot: SlotName, text: String) -> Self {
        Self {
            reply: Some(text),
            state: DialogState::Collecting,
            requested_slot: Some(slot),
            persistence: None,
        }
    }
}

pub struct DialogEngine {
    sessions: Arc<dyn SessionStore>,
    profiles: Arc<ProfileSource>,
    clock: Arc<dyn Clock>,
    intents: IntentRouter,
    generator: TextGenerator,
    templates: Arc<Templates>,
    booking: BookingCoordinator,
    flow: FlowEngine<BookingFlow>,
    settings: DialogSettings,
}

impl DialogEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        profiles: Arc<ProfileSource>,
        clock: Arc<dyn Clock>,
        generator: TextGenerator,
        templates: Arc<Templates>,
        booking: BookingCoordinator,
        settings: DialogSettings,
    ) -> Self {
        Self {
            sessions,
            profiles,
            clock,
            intents: IntentRouter::from_generator(&generator),
            generator,
            templates,
            booking,
            flow: FlowEngine::default(),
            settings,
        }
    }

    pub fn with_intent_router(mut self, intents: IntentRouter) -> Self {
        self.intents = intents;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Advances the conversation of `message.identity` by one message.
    ///
    /// The identity's session stays locked for the whole call, so concurrent
    /// messages from one sender are processed one at a time.
    pub async fn handle(&self, message: &UserMessage) -> Result<DialogTurn, ApplicationError> {
        let profile = self.profiles.snapshot();
        let now = self.clock.now();
        let mut session = acquire(self.sessions.as_ref(), &message.identity).await;

        if session.saved {
            if session.in_quiet_window(now, self.settings.quiet_window) {
                self.transition(
                    DialogState::Saved,
                    DialogEvent::DuplicateWithinQuietWindow,
                    &DialogContext::default(),
                    message,
                )?;
                return Ok(DialogTurn {
                    reply: None,
                    state: DialogState::Saved,
                    requested_slot: None,
                    persistence: None,
                });
            }

            self.transition(
                DialogState::Saved,
                DialogEvent::QuietWindowElapsed,
                &DialogContext::default(),
                message,
            )?;
            reset(self.sessions.as_ref(), &message.identity, &mut session).await;
            drop(session);
            session = acquire(self.sessions.as_ref(), &message.identity).await;
        }

        let history = session.history_text();
        session.last_message_at = Some(now);
        session.push_history(Speaker::User, message.text.as_str(), self.settings.history_limit);

        let state = DialogState::of(&session, profile.worker_required());
        let request = NluRequest {
            message: message.text.clone(),
            history: history.clone(),
            scheduling: session.scheduling,
            business_context: profile.context(),
        };
        let nlu = self.intents.classify(&request, &message.correlation_id).await;

        let turn = if state == DialogState::Idle && !nlu.wants_to_schedule {
            self.transition(
                DialogState::Idle,
                DialogEvent::ConversationTurn,
                &DialogContext::default(),
                message,
            )?;
            DialogTurn::reply(DialogState::Idle, self.converse(message, &profile, &history).await)
        } else {
            let event = if state == DialogState::Idle {
                session.scheduling = true;
                DialogEvent::BookingIntentDetected
            } else {
                DialogEvent::SlotsMerged
            };
            self.collect(&mut session, state, event, &nlu, message, &profile, &history).await?
        };

        if let Some(reply) = &turn.reply {
            session.push_history(Speaker::Assistant, reply.as_str(), self.settings.history_limit);
        }
        Ok(turn)
    }

    #[allow(clippy::too_many_arguments)]
    async fn collect(
        &self,
        session: &mut OwnedMutexGuard<Session>,
        state: DialogState,
        event: DialogEvent,
        nlu: &NluResult,
        message: &UserMessage,
        profile: &BusinessProfile,
        history: &str,
    ) -> Result<DialogTurn, ApplicationError> {
        let today = self.clock.today();
        let times = profile.time_normalizer();
        let worker_required = profile.worker_required();

        let mut candidates = nlu.extracted_slots.clone();
        if candidates.is_empty() && state != DialogState::Idle {
            if let Some(slot) = session.awaiting {
                let restates_intent = KeywordIntentClassifier.detect(&message.text).wants_to_schedule;
                if !restates_intent {
                    candidates.insert(slot, message.text.trim().to_owned());
                }
            }
        }

        let mut accepted = ExtractedSlots::new();
        let mut rejected: Option<(SlotName, String)> = None;
        for (slot, value) in candidates {
            let valid = session.slots.is_filled(slot)
                || match slot {
                    SlotName::Date => normalize_date(&value, today).is_ok(),
                    SlotName::Time => times
                        .normalize(&value)
                        .is_ok_and(|time| times.slot_index(&time).is_some()),
                    _ => true,
                };
            if valid {
                accepted.insert(slot, value);
            } else if rejected.is_none() {
                rejected = Some((slot, value));
            }
        }

        let filled = session.slots.merge(&accepted);
        let missing = session.slots.missing(worker_required);
        session.step =
            COLLECTION_ORDER.iter().filter(|slot| session.slots.is_filled(**slot)).count() as u32;
        debug!(
            event_name = "dialog.slots_merged",
            correlation_id = %message.correlation_id,
            filled = ?filled,
            missing = ?missing,
            "slots merged"
        );

        let context = DialogContext { missing_slots: missing };
        let outcome = self.transition(state, event, &context, message)?;

        match outcome.actions.first() {
            Some(DialogAction::PromptForSlot(next)) => {
                let turn = match rejected {
                    Some((slot, value)) => {
                        info!(
                            event_name = "dialog.slot_rejected",
                            correlation_id = %message.correlation_id,
                            slot = slot.key(),
                            "slot value could not be normalized or is off schedule; asking to rephrase"
                        );
                        let text = match times.normalize(&value) {
                            Ok(time) if slot == SlotName::Time => {
                                self.templates.unavailable_time(&time, profile)
                            }
                            _ => self.templates.rephrase(slot, &value),
                        };
                        DialogTurn::prompt(slot, text)
                    }
                    None => DialogTurn::prompt(
                        *next,
                        self.slot_prompt(*next, session, message, profile, history).await,
                    ),
                };
                session.awaiting = turn.requested_slot;
                Ok(turn)
            }
            Some(DialogAction::PersistAppointment) => {
                self.persist(session, message, profile).await
            }
            other => Err(ApplicationError::Domain(DomainError::InvariantViolation(format!(
                "unexpected action {other:?} while collecting slots"
            )))),
        }
    }

    async fn persist(
        &self,
        session: &mut OwnedMutexGuard<Session>,
        message: &UserMessage,
        profile: &BusinessProfile,
    ) -> Result<DialogTurn, ApplicationError> {
        let appointment = match Appointment::from_slots(
            &session.slots,
            &message.identity,
            self.clock.today(),
            &profile.time_normalizer(),
            profile.worker_required(),
        ) {
            Ok(appointment) => appointment,
            Err(DomainError::TimeParse(error)) => {
                let slot = match error {
                    TimeParseError::UnrecognizedDate(_) => SlotName::Date,
                    _ => SlotName::Time,
                };
                let value = session.slots.get(slot).unwrap_or_default().to_owned();
                session.slots.clear(slot);
                session.awaiting = Some(slot);
                return Ok(DialogTurn::prompt(slot, self.templates.rephrase(slot, &value)));
            }
            Err(error) => return Err(error.into()),
        };

        let result = self.booking.book(&appointment, profile, &message.correlation_id).await;
        let persistence = Some(result.report);

        match result.confirmation {
            Some(confirmation) => {
                self.transition(
                    DialogState::ReadyToSave,
                    DialogEvent::AppointmentPersisted,
                    &DialogContext::default(),
                    message,
                )?;
                session.saved = true;
                session.awaiting = None;
                Ok(DialogTurn {
                    reply: Some(confirmation),
                    state: DialogState::Saved,
                    requested_slot: None,
                    persistence,
                })
            }
            None => {
                self.transition(
                    DialogState::ReadyToSave,
                    DialogEvent::PersistenceDeclined,
                    &DialogContext::default(),
                    message,
                )?;
                Ok(DialogTurn {
                    reply: Some(SAVE_APOLOGY.to_owned()),
                    state: DialogState::ReadyToSave,
                    requested_slot: None,
                    persistence,
                })
            }
        }
    }

    /// Generated question for exactly one slot, or the template when generation fails.
    async fn slot_prompt(
        &self,
        slot: SlotName,
        session: &Session,
        message: &UserMessage,
        profile: &BusinessProfile,
        history: &str,
    ) -> String {
        let collected = COLLECTION_ORDER
            .iter()
            .filter_map(|known| session.slots.get(*known).map(|value| format!("{}: {value}", known.key())))
            .collect::<Vec<_>>()
            .join(", ");
        let request = CompletionRequest {
            system_prompt: format!(
                "Eres el asistente de citas de {}. Haz una sola pregunta breve y amable para \
                 obtener únicamente el siguiente dato: {}. No pidas ningún otro dato.",
                profile.name,
                slot_label(slot)
            ),
            history: history.to_owned(),
            context: format!("{}\nDatos ya recopilados: {}", profile.context(), collected),
            user_message: message.text.clone(),
        };

        match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(error) => {
                self.log_generation_fallback(&error, message, "slot_prompt");
                self.templates.slot_prompt(slot, profile)
            }
        }
    }

    async fn converse(&self, message: &UserMessage, profile: &BusinessProfile, history: &str) -> String {
        let topic = Topic::detect(&message.text);
        if topic == Topic::Greeting {
            return self.welcome(message, profile, history).await;
        }

        let request = CompletionRequest {
            system_prompt: format!(
                "Eres el asistente virtual de {}. Responde en español, de forma breve, usando \
                 solo la información del contexto. Si el cliente quiere una cita, invítalo a agendarla.",
                profile.name
            ),
            history: history.to_owned(),
            context: topic.context(profile),
            user_message: message.text.clone(),
        };

        match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(LlmError::NotConfigured) => self.templates.topic_answer(topic.key(), profile),
            Err(error) => {
                self.log_generation_fallback(&error, message, topic.key());
                FALLBACK_APOLOGY.to_owned()
            }
        }
    }

    async fn welcome(&self, message: &UserMessage, profile: &BusinessProfile, history: &str) -> String {
        let client_name = Some(message.display_name.as_str())
            .filter(|name| !name.is_empty() && *name != message.identity);
        if profile.welcome_message.is_some() {
            return self.templates.welcome(profile, client_name);
        }

        let request = CompletionRequest {
            system_prompt: format!(
                "Eres el asistente virtual de {}. Da una bienvenida cálida y breve, menciona que \
                 puedes informar sobre servicios, horarios y ubicación, y ayudar a agendar citas.",
                profile.name
            ),
            history: history.to_owned(),
            context: format!("Nombre del cliente: {}", client_name.unwrap_or("desconocido")),
            user_message: message.text.clone(),
        };

        match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(error) => {
                self.log_generation_fallback(&error, message, "welcome");
                self.templates.welcome(profile, client_name)
            }
        }
    }

    fn log_generation_fallback(&self, error: &LlmError, message: &UserMessage, purpose: &str) {
        if matches!(error, LlmError::NotConfigured) {
            return;
        }
        warn!(
            event_name = "dialog.generation_fallback",
            correlation_id = %message.correlation_id,
            purpose,
            error = %error,
            "text generation failed; using fallback"
        );
    }

    fn transition(
        &self,
        from: DialogState,
        event: DialogEvent,
        context: &DialogContext,
        message: &UserMessage,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let outcome = self.flow.apply(&from, &event, context).map_err(DomainError::from)?;
        info!(
            event_name = "dialog.transition",
            correlation_id = %message.correlation_id,
            identity = %message.identity,
            from = ?outcome.from,
            to = ?outcome.to,
            event = ?outcome.event,
            "dialog transition"
        );
        Ok(outcome)
    }
}
