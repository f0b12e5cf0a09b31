use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Document,
    Sticker,
    #[serde(other)]
    Other,
}

/// Raw delivery as received from the messaging network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub is_group: bool,
}

/// A delivery that passed upstream filtering and is ready for the dialog engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingText {
    pub message_id: String,
    pub sender: String,
    pub display_name: String,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    GroupOrigin,
    NonText,
    EmptyText,
    MissingSender,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GroupOrigin => "group_origin",
            Self::NonText => "non_text",
            Self::EmptyText => "empty_text",
            Self::MissingSender => "missing_sender",
        }
    }
}

impl InboundMessage {
    /// Group chats and non-text payloads never reach the dialog engine.
    pub fn accept(&self) -> Result<IncomingText, Rejection> {
        if self.is_group {
            return Err(Rejection::GroupOrigin);
        }
        if self.kind != MessageKind::Text {
            return Err(Rejection::NonText);
        }
        let sender = self.from.trim();
        if sender.is_empty() {
            return Err(Rejection::MissingSender);
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyText);
        }

        let display_name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(sender);

        Ok(IncomingText {
            message_id: self.id.clone(),
            sender: sender.to_owned(),
            display_name: display_name.to_owned(),
            text: text.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{InboundMessage, MessageKind, Rejection};

    fn text_message() -> InboundMessage {
        InboundMessage {
            id: "wamid-1".to_owned(),
            from: "5215550001".to_owned(),
            name: Some("Ana".to_owned()),
            text: "  quiero una cita ".to_owned(),
            kind: MessageKind::Text,
            is_group: false,
        }
    }

    #[test]
    fn accepts_direct_text_messages() {
        let accepted = text_message().accept().expect("direct text is accepted");
        assert_eq!(accepted.sender, "5215550001");
        assert_eq!(accepted.display_name, "Ana");
        assert_eq!(accepted.text, "quiero una cita");
    }

    #[test]
    fn filters_group_and_non_text_deliveries() {
        let group = InboundMessage { is_group: true, ..text_message() };
        assert_eq!(group.accept(), Err(Rejection::GroupOrigin));

        let audio = InboundMessage { kind: MessageKind::Audio, ..text_message() };
        assert_eq!(audio.accept(), Err(Rejection::NonText));

        let blank = InboundMessage { text: "   ".to_owned(), ..text_message() };
        assert_eq!(blank.accept(), Err(Rejection::EmptyText));
    }

    #[test]
    fn display_name_falls_back_to_sender() {
        let anonymous = InboundMessage { name: None, ..text_message() };
        assert_eq!(anonymous.accept().expect("accepted").display_name, "5215550001");
    }

    #[test]
    fn unknown_kinds_deserialize_as_other() {
        let parsed: InboundMessage = serde_json::from_str(
            r#"{"id":"m1","from":"5215550001","text":"","kind":"reaction"}"#,
        )
        .expect("payload parses");
        assert_eq!(parsed.kind, MessageKind::Other);
        assert!(!parsed.is_group);
    }
}
