use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::normalize::TimeNormalizer;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Business facts used as prompt context and for slot rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub name: String,
    pub address: String,
    pub hours: String,
    pub welcome_message: Option<String>,
    pub staff: Vec<String>,
    pub services: Vec<ServiceOffering>,
    pub time_slots: Vec<String>,
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            name: "Citabot".to_owned(),
            address: String::new(),
            hours: "Lunes a sábado de 9:00 AM a 6:00 PM".to_owned(),
            welcome_message: None,
            staff: Vec::new(),
            services: Vec::new(),
            time_slots: default_time_slots(),
        }
    }
}

/// Hourly slots from 9:00 AM to 6:00 PM.
pub fn default_time_slots() -> Vec<String> {
    (9..=18u32)
        .map(|hour| match hour {
            0..=11 => format!("{hour}:00 AM"),
            12 => "12:00 PM".to_owned(),
            _ => format!("{}:00 PM", hour - 12),
        })
        .collect()
}

impl BusinessProfile {
    pub fn worker_required(&self) -> bool {
        self.staff.len() > 1
    }

    pub fn time_normalizer(&self) -> TimeNormalizer {
        TimeNormalizer::new(self.time_slots.clone())
    }

    pub fn services_summary(&self) -> String {
        if self.services.is_empty() {
            return "Sin catálogo de servicios configurado.".to_owned();
        }
        self.services
            .iter()
            .map(|service| {
                let mut line = format!("- {}", service.name);
                if let Some(price) = service.price {
                    line.push_str(&format!(": ${price}"));
                }
                if let Some(minutes) = service.duration_minutes {
                    line.push_str(&format!(" ({minutes} min)"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn staff_summary(&self) -> String {
        if self.staff.is_empty() {
            "Sin personal configurado.".to_owned()
        } else {
            self.staff.join(", ")
        }
    }

    /// Compact description fed to generative collaborators.
    pub fn context(&self) -> String {
        format!(
            "Negocio: {}\nDirección: {}\nHorario: {}\nServicios:\n{}\nPersonal: {}\nHorarios disponibles: {}",
            self.name,
            if self.address.is_empty() { "no especificada" } else { self.address.as_str() },
            self.hours,
            self.services_summary(),
            self.staff_summary(),
            self.time_slots.join(", ")
        )
    }
}

/// Read side of the business profile. Readers take an immutable snapshot per
/// call; an external refresher may swap in a new profile at any time.
#[derive(Debug, Default)]
pub struct ProfileSource {
    current: RwLock<Arc<BusinessProfile>>,
}

impl ProfileSource {
    pub fn new(profile: BusinessProfile) -> Self {
        Self { current: RwLock::new(Arc::new(profile)) }
    }

    pub fn snapshot(&self) -> Arc<BusinessProfile> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, profile: BusinessProfile) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(profile);
    }
}
