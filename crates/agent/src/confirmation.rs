use std::sync::Arc;

use tracing::{debug, warn};

use citabot_core::domain::appointment::Appointment;
use citabot_core::domain::profile::BusinessProfile;

use crate::llm::{CompletionRequest, LlmError, TextGenerator};
use crate::templates::Templates;

const CONFIRMATION_SYSTEM_PROMPT: &str = "Eres el asistente de citas de un negocio. \
Redacta en español un mensaje breve y cordial que confirme la cita descrita en el contexto. \
Incluye el nombre del cliente, el servicio, el profesional si existe, el día y la hora exactos. \
No inventes datos.";

pub struct ConfirmationGenerator {
    generator: TextGenerator,
    templates: Arc<Templates>,
}

impl ConfirmationGenerator {
    pub fn new(generator: TextGenerator, templates: Arc<Templates>) -> Self {
        Self { generator, templates }
    }

    /// Always returns non-empty text: the template covers every generator failure.
    pub async fn generate(
        &self,
        appointment: &Appointment,
        profile: &BusinessProfile,
        correlation_id: &str,
    ) -> String {
        let request = CompletionRequest {
            system_prompt: CONFIRMATION_SYSTEM_PROMPT.to_owned(),
            history: String::new(),
            context: format!("{}\n\n{}", appointment_facts(appointment), profile.context()),
            user_message: "Confirma la cita.".to_owned(),
        };

        match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(LlmError::NotConfigured) => self.templates.confirmation(appointment, profile),
            Err(error) => {
                warn!(
                    event_name = "booking.confirmation_fallback",
                    correlation_id = %correlation_id,
                    error = %error,
                    "confirmation generation failed; using template"
                );
                self.templates.confirmation(appointment, profile)
            }
        }
    }
}

fn appointment_facts(appointment: &Appointment) -> String {
    let mut facts = format!(
        "Cita agendada:\nCliente: {}\nServicio: {}\nFecha: {}",
        appointment.client_name,
        appointment.service,
        appointment.when()
    );
    if let Some(worker) = &appointment.worker {
        facts.push_str(&format!("\nProfesional: {worker}"));
    }
    debug!(facts = %facts, "confirmation facts prepared");
    facts
}
