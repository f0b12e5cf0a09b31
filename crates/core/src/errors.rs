use thiserror::Error;

use crate::domain::session::SlotName;
use crate::flows::DialogTransitionError;
use crate::normalize::TimeParseError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("appointment is missing required slot `{}`", .0.key())]
    MissingSlot(SlotName),
    #[error(transparent)]
    TimeParse(#[from] TimeParseError),
    #[error(transparent)]
    DialogTransition(#[from] DialogTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Safe to send to the end user over chat.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "No pude entender tu mensaje. ¿Podrías escribirlo de otra forma?"
            }
            Self::ServiceUnavailable { .. } => {
                "El servicio no está disponible en este momento. Intenta de nuevo en unos minutos."
            }
            Self::Internal { .. } => "Ocurrió un error inesperado. Disculpa las molestias.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::session::SlotName;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::normalize::TimeParseError;

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::MissingSlot(SlotName::Date)).into_interface("msg-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "msg-1" && message.contains("`date`")
        ));
    }

    #[test]
    fn time_parse_errors_convert_into_domain_errors() {
        let error = DomainError::from(TimeParseError::UnrecognizedTime("luego".to_owned()));
        assert_eq!(error.to_string(), "unrecognized time phrase `luego`");
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Integration("calendar timeout".to_owned()).into_interface("msg-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "El servicio no está disponible en este momento. Intenta de nuevo en unos minutos."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing sheet id".to_owned()).into_interface("msg-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "Ocurrió un error inesperado. Disculpa las molestias.");
    }
}
