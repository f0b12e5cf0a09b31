use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Name,
    Service,
    Worker,
    Date,
    Time,
}

/// Order in which missing slots are requested from the user.
pub const COLLECTION_ORDER: [SlotName; 5] =
    [SlotName::Name, SlotName::Service, SlotName::Date, SlotName::Time, SlotName::Worker];

impl SlotName {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Service => "service",
            Self::Worker => "worker",
            Self::Date => "date",
            Self::Time => "time",
        }
    }

    /// Accepts the English keys plus the Spanish aliases NLU models tend to emit.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" | "nombre" | "client_name" => Some(Self::Name),
            "service" | "servicio" => Some(Self::Service),
            "worker" | "trabajador" | "estilista" | "profesional" | "staff" => Some(Self::Worker),
            "date" | "fecha" | "dia" => Some(Self::Date),
            "time" | "hora" | "horario" => Some(Self::Time),
            _ => None,
        }
    }
}

/// Slot values extracted from a single message, already keyed by slot.
pub type ExtractedSlots = BTreeMap<SlotName, String>;

/// NLU collaborators report a missing value as an absent key, an empty string, or `"null"`.
pub fn is_blank_slot_value(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("none")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSet {
    pub name: Option<String>,
    pub service: Option<String>,
    pub worker: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

impl SlotSet {
    pub fn get(&self, slot: SlotName) -> Option<&str> {
        let value = match slot {
            SlotName::Name => &self.name,
            SlotName::Service => &self.service,
            SlotName::Worker => &self.worker,
            SlotName::Date => &self.date,
            SlotName::Time => &self.time,
        };
        value.as_deref().filter(|value| !is_blank_slot_value(value))
    }

    pub fn is_filled(&self, slot: SlotName) -> bool {
        self.get(slot).is_some()
    }

    fn slot_mut(&mut self, slot: SlotName) -> &mut Option<String> {
        match slot {
            SlotName::Name => &mut self.name,
            SlotName::Service => &mut self.service,
            SlotName::Worker => &mut self.worker,
            SlotName::Date => &mut self.date,
            SlotName::Time => &mut self.time,
        }
    }

    /// First write wins: returns false when the slot already holds a value
    /// or the candidate is blank.
    pub fn fill(&mut self, slot: SlotName, value: &str) -> bool {
        if self.is_filled(slot) || is_blank_slot_value(value) {
            return false;
        }
        *self.slot_mut(slot) = Some(value.trim().to_owned());
        true
    }

    /// Drops a value that failed downstream validation so it can be asked again.
    pub fn clear(&mut self, slot: SlotName) {
        *self.slot_mut(slot) = None;
    }

    /// Merges an extraction pass and returns the slots it newly filled.
    pub fn merge(&mut self, extracted: &ExtractedSlots) -> Vec<SlotName> {
        let mut filled = Vec::new();
        for (slot, value) in extracted {
            if self.fill(*slot, value) {
                filled.push(*slot);
            }
        }
        filled
    }

    /// Missing slots in collection order. `worker` is only required when the
    /// business has more than one staff member.
    pub fn missing(&self, worker_required: bool) -> Vec<SlotName> {
        COLLECTION_ORDER
            .iter()
            .copied()
            .filter(|slot| *slot != SlotName::Worker || worker_required)
            .filter(|slot| !self.is_filled(*slot))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Per end-user conversational state. Owned by the session store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub scheduling: bool,
    pub step: u32,
    pub slots: SlotSet,
    pub history: VecDeque<HistoryEntry>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub saved: bool,
    /// Slot requested by the last prompt, if any.
    pub awaiting: Option<SlotName>,
    retired: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an utterance and drops the oldest entries beyond `limit`.
    pub fn push_history(&mut self, speaker: Speaker, text: impl Into<String>, limit: usize) {
        self.history.push_back(HistoryEntry { speaker, text: text.into() });
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    pub fn history_text(&self) -> String {
        self.history
            .iter()
            .map(|entry| match entry.speaker {
                Speaker::User => format!("Cliente: {}", entry.text),
                Speaker::Assistant => format!("Asistente: {}", entry.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True while a saved session is still inside the post-save quiet window.
    pub fn in_quiet_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (self.saved, self.last_message_at) {
            (true, Some(last)) => now.signed_duration_since(last) < window,
            _ => false,
        }
    }

    /// Marks the session as detached from the store. Holders of a retired
    /// session must re-acquire a fresh one.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}
