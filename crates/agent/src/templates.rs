use serde::Serialize;
use tera::{Context, Tera};
use tracing::warn;

use citabot_core::domain::appointment::Appointment;
use citabot_core::domain::profile::BusinessProfile;
use citabot_core::domain::session::SlotName;

const SLOT_PROMPT: &str = "\
{% if slot == \"name\" %}¡Con gusto te ayudo a agendar! ¿A nombre de quién registro la cita?\
{% elif slot == \"service\" %}¿Qué servicio te gustaría agendar?{% if services %} Tenemos: {{ services }}.{% endif %}\
{% elif slot == \"date\" %}¿Para qué día quieres tu cita? Puedes decirme el día de la semana, por ejemplo \"lunes\".\
{% elif slot == \"time\" %}¿A qué hora te acomoda?{% if slots %} Horarios disponibles: {{ slots }}.{% endif %}\
{% else %}¿Con quién te gustaría atenderte?{% if staff %} Opciones: {{ staff }}.{% endif %}{% endif %}";

const REPHRASE: &str = "\
{% if slot == \"date\" %}No logré entender la fecha \"{{ value }}\". ¿Me la puedes escribir como día de la semana (por ejemplo \"martes\") o como DD/MM/AAAA?\
{% else %}No logré entender la hora \"{{ value }}\". ¿Me la puedes escribir como \"10:00 AM\" o \"3 de la tarde\"?{% endif %}";

const UNAVAILABLE_TIME: &str = "\
No tenemos citas a las {{ time }}.{% if slots %} Horarios disponibles: {{ slots }}.{% endif %} ¿Cuál te acomoda?";

const WELCOME: &str = "\
¡Hola{% if client_name %} {{ client_name }}{% endif %}! Bienvenido a {{ business }}. \
Puedo darte información de nuestros servicios, horarios y ubicación, o ayudarte a agendar una cita.";

const TOPIC_ANSWER: &str = "\
{% if topic == \"pricing\" %}Estos son nuestros servicios:\n{{ services }}\
{% elif topic == \"hours\" %}Nuestro horario es: {{ hours }}.\
{% elif topic == \"location\" %}{% if address %}Nos encuentras en {{ address }}.{% else %}Escríbenos y con gusto te compartimos nuestra ubicación.{% endif %}\
{% else %}Soy el asistente de {{ business }}. ¿Te gustaría agendar una cita?{% endif %}";

const CONFIRMATION: &str = "\
¡Listo, {{ name }}! Tu cita quedó agendada.\n\
Servicio: {{ service }}\n\
{% if worker %}Profesional: {{ worker }}\n{% endif %}\
Fecha: {{ when }}\n\
¡Te esperamos en {{ business }}!";

#[derive(Serialize)]
struct ConfirmationFacts<'a> {
    name: &'a str,
    service: &'a str,
    worker: Option<&'a str>,
    when: String,
    business: &'a str,
}

/// Fallback texts used whenever generated text is unavailable.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("slot_prompt", SLOT_PROMPT),
            ("rephrase", REPHRASE),
            ("unavailable_time", UNAVAILABLE_TIME),
            ("welcome", WELCOME),
            ("topic_answer", TOPIC_ANSWER),
            ("confirmation", CONFIRMATION),
        ])?;
        Ok(Self { tera })
    }

    pub fn slot_prompt(&self, slot: SlotName, profile: &BusinessProfile) -> String {
        let mut context = Context::new();
        context.insert("slot", slot.key());
        let services = profile.services.iter().map(|service| service.name.as_str()).collect::<Vec<_>>();
        context.insert("services", &services.join(", "));
        context.insert("slots", &profile.time_slots.join(", "));
        context.insert("staff", &profile.staff.join(", "));
        self.render("slot_prompt", &context, || {
            format!("¿Me compartes el dato \"{}\" para tu cita?", slot.key())
        })
    }

    pub fn rephrase(&self, slot: SlotName, value: &str) -> String {
        let mut context = Context::new();
        context.insert("slot", slot.key());
        context.insert("value", value);
        self.render("rephrase", &context, || {
            "No logré entender tu respuesta. ¿Podrías escribirla de otra forma?".to_owned()
        })
    }

    /// For a time that was understood but is not one of the bookable slots.
    pub fn unavailable_time(&self, time: &str, profile: &BusinessProfile) -> String {
        let mut context = Context::new();
        context.insert("time", time);
        context.insert("slots", &profile.time_slots.join(", "));
        self.render("unavailable_time", &context, || {
            format!("No tenemos citas a las {time}. ¿Qué otro horario te acomoda?")
        })
    }

    pub fn welcome(&self, profile: &BusinessProfile, client_name: Option<&str>) -> String {
        if let Some(message) = profile.welcome_message.as_deref().filter(|text| !text.trim().is_empty()) {
            return message.to_owned();
        }
        let mut context = Context::new();
        context.insert("business", &profile.name);
        context.insert("client_name", &client_name);
        self.render("welcome", &context, || format!("¡Hola! Bienvenido a {}.", profile.name))
    }

    pub fn topic_answer(&self, topic: &str, profile: &BusinessProfile) -> String {
        let mut context = Context::new();
        context.insert("topic", topic);
        context.insert("business", &profile.name);
        context.insert("services", &profile.services_summary());
        context.insert("hours", &profile.hours);
        context.insert("address", &profile.address);
        self.render("topic_answer", &context, || profile.context())
    }

    pub fn confirmation(&self, appointment: &Appointment, profile: &BusinessProfile) -> String {
        let facts = ConfirmationFacts {
            name: &appointment.client_name,
            service: &appointment.service,
            worker: appointment.worker.as_deref(),
            when: appointment.when(),
            business: &profile.name,
        };
        let fallback = || {
            format!(
                "Tu cita quedó agendada: {} para {} el {}.",
                appointment.service,
                appointment.client_name,
                appointment.when()
            )
        };
        match Context::from_serialize(&facts) {
            Ok(context) => self.render("confirmation", &context, fallback),
            Err(error) => {
                warn!(error = %error, "confirmation facts could not be serialized");
                fallback()
            }
        }
    }

    fn render(&self, name: &str, context: &Context, fallback: impl FnOnce() -> String) -> String {
        match self.tera.render(name, context) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => fallback(),
            Err(error) => {
                warn!(template = name, error = %error, "template rendering failed");
                fallback()
            }
        }
    }
}
