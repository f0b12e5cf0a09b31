use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use citabot_core::domain::session::{is_blank_slot_value, ExtractedSlots, SlotName};
use citabot_core::normalize::fold;
use citabot_core::normalize::text::contains_any;

use crate::llm::{CompletionRequest, LlmError, TextGenerator};

/// Folded keywords that declare booking intent when the model is unavailable.
pub const BOOKING_KEYWORDS: [&str; 5] = ["cita", "agendar", "turno", "reservar", "apartar"];

const NLU_SYSTEM_PROMPT: &str = "Eres el analizador de mensajes de un asistente de citas. \
Responde únicamente con JSON con la forma \
{\"wants_to_schedule\": bool, \"extracted_slots\": {\"name\": string|null, \"service\": string|null, \
\"worker\": string|null, \"date\": string|null, \"time\": string|null}, \"confidence\": número entre 0 y 1}. \
Incluye solo los datos que el cliente escribió explícitamente. Para la fecha usa el día de la semana, \
una palabra relativa (hoy, mañana, pasado mañana) o DD/MM/YYYY.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NluRequest {
    pub message: String,
    pub history: String,
    pub scheduling: bool,
    pub business_context: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NluResult {
    pub wants_to_schedule: bool,
    pub extracted_slots: ExtractedSlots,
    pub confidence: f32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NluError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("malformed NLU response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn classify(&self, request: &NluRequest) -> Result<NluResult, NluError>;
}

/// Model-backed classifier: asks the text-generation collaborator for a JSON verdict.
pub struct ModelIntentClassifier {
    generator: TextGenerator,
}

impl ModelIntentClassifier {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl IntentClassifier for ModelIntentClassifier {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn classify(&self, request: &NluRequest) -> Result<NluResult, NluError> {
        let completion = CompletionRequest {
            system_prompt: NLU_SYSTEM_PROMPT.to_owned(),
            history: request.history.clone(),
            context: format!(
                "{}\nEl cliente {} está agendando una cita.",
                request.business_context,
                if request.scheduling { "ya" } else { "todavía no" }
            ),
            user_message: request.message.clone(),
        };
        let raw = self.generator.generate(&completion).await?;
        parse_nlu_response(&raw)
    }
}

/// Keyword heuristic. Detects intent only and never extracts slots.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn detect(&self, message: &str) -> NluResult {
        let wants_to_schedule = contains_any(&fold(message), &BOOKING_KEYWORDS);
        NluResult {
            wants_to_schedule,
            extracted_slots: ExtractedSlots::new(),
            confidence: if wants_to_schedule { 0.5 } else { 0.0 },
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(&self, request: &NluRequest) -> Result<NluResult, NluError> {
        Ok(self.detect(&request.message))
    }
}

/// Uses the primary classifier when one is available and falls back to
/// keywords whenever it is missing or fails.
#[derive(Clone)]
pub struct IntentRouter {
    primary: Option<Arc<dyn IntentClassifier>>,
    fallback: KeywordIntentClassifier,
}

impl IntentRouter {
    pub fn new(primary: Option<Arc<dyn IntentClassifier>>) -> Self {
        Self { primary, fallback: KeywordIntentClassifier }
    }

    pub fn from_generator(generator: &TextGenerator) -> Self {
        let primary = generator.is_configured().then(|| {
            Arc::new(ModelIntentClassifier::new(generator.clone())) as Arc<dyn IntentClassifier>
        });
        Self::new(primary)
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary.as_ref().map(|classifier| classifier.name()).unwrap_or(self.fallback.name())
    }

    pub async fn classify(&self, request: &NluRequest, correlation_id: &str) -> NluResult {
        let Some(primary) = &self.primary else {
            return self.fallback.detect(&request.message);
        };

        match primary.classify(request).await {
            Ok(result) => {
                debug!(
                    event_name = "nlu.classified",
                    correlation_id = %correlation_id,
                    classifier = primary.name(),
                    wants_to_schedule = result.wants_to_schedule,
                    extracted = result.extracted_slots.len(),
                    confidence = result.confidence,
                    "message classified"
                );
                result
            }
            Err(error) => {
                warn!(
                    event_name = "nlu.fallback",
                    correlation_id = %correlation_id,
                    classifier = primary.name(),
                    error = %error,
                    "intent classifier failed; using keyword heuristic"
                );
                self.fallback.detect(&request.message)
            }
        }
    }
}

/// Parses the model's JSON verdict. Tolerates surrounding prose or code
/// fences, unknown slot keys, and `null` or empty slot values.
pub fn parse_nlu_response(raw: &str) -> Result<NluResult, NluError> {
    let start = raw.find('{').ok_or_else(|| NluError::Malformed("no JSON object".to_owned()))?;
    let end = raw.rfind('}').ok_or_else(|| NluError::Malformed("unterminated JSON".to_owned()))?;
    if end < start {
        return Err(NluError::Malformed("unterminated JSON".to_owned()));
    }

    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|error| NluError::Malformed(error.to_string()))?;
    let object =
        value.as_object().ok_or_else(|| NluError::Malformed("expected an object".to_owned()))?;

    let wants_to_schedule = match object.get("wants_to_schedule").or_else(|| object.get("quiere_agendar"))
    {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "si" | "sí"),
        Some(Value::Null) | None => false,
        Some(other) => {
            return Err(NluError::Malformed(format!("wants_to_schedule is not a boolean: {other}")))
        }
    };

    let mut extracted_slots = ExtractedSlots::new();
    let slots = object.get("extracted_slots").or_else(|| object.get("slots"));
    if let Some(Value::Object(slots)) = slots {
        for (key, value) in slots {
            let Some(slot) = SlotName::parse(key) else {
                continue;
            };
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                _ => continue,
            };
            if !is_blank_slot_value(&text) {
                extracted_slots.insert(slot, text.trim().to_owned());
            }
        }
    }

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|confidence| confidence.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);

    Ok(NluResult { wants_to_schedule, extracted_slots, confidence })
}
