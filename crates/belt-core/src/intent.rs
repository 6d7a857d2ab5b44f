//! Structured understanding of a request: intent, entities, and the step plan.
//!
//! Deserialization is deliberately lenient. The model that produces these
//! payloads drifts between English and Dutch labels, emits numbers where
//! strings are expected, and nests extra entities under `other`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Canonical entity slot names.
pub mod slot {
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const CONTACT_NAME: &str = "contact_name";
    pub const MESSAGE_BODY: &str = "message_body";
    pub const SUBJECT: &str = "subject";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const PARTY_SIZE: &str = "party_size";
    pub const VENUE: &str = "venue";
    pub const EVENT_TITLE: &str = "event_title";
    pub const EVENT_START: &str = "event_start";
    pub const EVENT_END: &str = "event_end";
}

/// Classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum IntentType {
    Call,
    Sms,
    Mail,
    Calendar,
    Reservation,
    Info,
    Purchase,
    Other,
}

impl From<String> for IntentType {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "call" | "bellen" | "bel" | "phone" | "telefoon" => Self::Call,
            "sms" | "text" => Self::Sms,
            "mail" | "email" | "e-mail" => Self::Mail,
            "calendar" | "agenda" | "afspraak" | "appointment" => Self::Calendar,
            "reservation" | "reservering" | "booking" => Self::Reservation,
            "info" | "information" | "informatie" | "vraag" | "question" => Self::Info,
            "purchase" | "aankoop" => Self::Purchase,
            _ => Self::Other,
        }
    }
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Sms => "sms",
            Self::Mail => "mail",
            Self::Calendar => "calendar",
            Self::Reservation => "reservation",
            Self::Info => "info",
            Self::Purchase => "purchase",
            Self::Other => "other",
        }
    }

    /// Intent types whose action is irreversible or costly.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self,
            Self::Call | Self::Sms | Self::Mail | Self::Reservation | Self::Purchase
        )
    }
}

/// How urgent the user considers the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Urgency {
    High,
    #[default]
    Normal,
    Low,
}

impl From<String> for Urgency {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" | "hoog" | "urgent" => Self::High,
            "low" | "laag" => Self::Low,
            _ => Self::Normal,
        }
    }
}

/// Slot name -> value, with keys normalised to the names in [`slot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, serde_json::Value>")]
pub struct Entities(BTreeMap<String, String>);

impl Entities {
    pub fn get(&self, slot: &str) -> Option<&str> {
        self.0.get(slot).map(String::as_str)
    }

    pub fn has(&self, slot: &str) -> bool {
        self.0.contains_key(slot)
    }

    /// Set a slot. Blank values are ignored.
    pub fn insert(&mut self, slot: &str, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.0.insert(slot.to_string(), trimmed.to_string());
        }
    }

    /// Set a slot only when it is not already filled.
    pub fn fill(&mut self, slot: &str, value: impl Into<String>) {
        if !self.has(slot) {
            self.insert(slot, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, serde_json::Value>> for Entities {
    fn from(raw: BTreeMap<String, serde_json::Value>) -> Self {
        let mut entities = Entities::default();
        for (key, value) in raw {
            absorb_entity(&mut entities, &key, value, true);
        }
        entities
    }
}

fn absorb_entity(entities: &mut Entities, key: &str, value: serde_json::Value, nested: bool) {
    use serde_json::Value;
    let slot = canonical_slot(key);
    match value {
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            // Models like to echo "unknown" instead of omitting the slot.
            if !matches!(lowered.as_str(), "" | "null" | "none" | "onbekend" | "unknown" | "n/a") {
                entities.fill(&slot, s);
            }
        }
        Value::Number(n) => entities.fill(&slot, n.to_string()),
        Value::Object(map) if nested => {
            for (k, v) in map {
                absorb_entity(entities, &k, v, false);
            }
        }
        _ => {}
    }
}

/// Map the model's slot names onto the canonical ones.
fn canonical_slot(key: &str) -> String {
    let key = key.trim().to_lowercase();
    let canonical = match key.as_str() {
        "phone" | "phone_number" | "telefoonnummer" | "telefoon" | "number" => slot::PHONE,
        "email" | "e-mail" | "email_address" | "mail" => slot::EMAIL,
        "contact_name" | "contact" | "name" | "recipient" | "ontvanger" => slot::CONTACT_NAME,
        "message_body" | "message" | "body" | "bericht" => slot::MESSAGE_BODY,
        "subject" | "onderwerp" => slot::SUBJECT,
        "date" | "datum" => slot::DATE,
        "time" | "tijd" => slot::TIME,
        "party_size" | "personen" | "aantal_personen" | "guests" => slot::PARTY_SIZE,
        "venue" | "venue_name" | "restaurant" => slot::VENUE,
        "event_title" | "title" | "event" => slot::EVENT_TITLE,
        "event_start" | "start" => slot::EVENT_START,
        "event_end" | "end" => slot::EVENT_END,
        _ => return key,
    };
    canonical.to_string()
}

/// Structured classification of a free-text request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type", alias = "intent")]
    pub kind: IntentType,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
}

impl Intent {
    pub fn new(kind: IntentType) -> Self {
        Self {
            kind,
            entities: Entities::default(),
            urgency: Urgency::Normal,
            needs_clarification: false,
            clarification_questions: Vec::new(),
        }
    }

    /// Degraded intent used when the model reply cannot be decoded.
    pub fn fallback() -> Self {
        Self {
            needs_clarification: true,
            clarification_questions: vec!["Kun je je vraag verduidelijken?".to_string()],
            ..Self::new(IntentType::Other)
        }
    }
}

/// The kind of action the router can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ActionKind {
    Call,
    Sms,
    Email,
    Calendar,
    Browser,
    /// No executor: answer from the model's own knowledge.
    Answer,
}

impl From<String> for ActionKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "call" | "voice" | "phone" | "bellen" => Self::Call,
            "sms" => Self::Sms,
            "email" | "mail" | "e-mail" | "gmail" => Self::Email,
            "calendar" | "agenda" => Self::Calendar,
            "answer" | "none" => Self::Answer,
            _ => Self::Browser,
        }
    }
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Calendar => "calendar",
            Self::Browser => "browser",
            Self::Answer => "answer",
        }
    }

    /// Actions that reach another person and cannot be taken back.
    pub fn is_irreversible(&self) -> bool {
        matches!(self, Self::Call | Self::Sms | Self::Email)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, alias = "step_number")]
    pub index: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(alias = "agent_type", default = "default_step_action")]
    pub action_type: ActionKind,
    #[serde(default, deserialize_with = "lenient_string")]
    pub estimated_duration: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

fn default_step_action() -> ActionKind {
    ActionKind::Browser
}

/// Ordered execution plan derived from a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, deserialize_with = "lenient_string")]
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(
        default,
        alias = "estimated_total_duration",
        deserialize_with = "lenient_string"
    )]
    pub estimated_duration: String,
    #[serde(default, alias = "requires_user_confirmation")]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Plan {
    /// Single-step plan echoing the raw request, used when the model reply
    /// cannot be decoded.
    pub fn fallback(request: &str, reason: &str) -> Self {
        Self {
            goal: request.to_string(),
            steps: vec![Step {
                index: 1,
                description: format!("Uitvoeren: {request}"),
                action_type: ActionKind::Browser,
                estimated_duration: "5-10 minuten".to_string(),
                fallback: None,
            }],
            estimated_duration: "5-10 minuten".to_string(),
            requires_confirmation: false,
            warnings: vec![format!("Kon geen gedetailleerd plan maken: {reason}")],
        }
    }

    /// Repair a decoded plan: goal defaults to the request, step indexes run
    /// 1..=n, and a plan that needs confirmation always has a step.
    pub fn normalized(mut self, request: &str) -> Self {
        if self.goal.trim().is_empty() {
            self.goal = request.to_string();
        }
        if self.requires_confirmation && self.steps.is_empty() {
            self.steps.push(Step {
                index: 1,
                description: self.goal.clone(),
                action_type: ActionKind::Browser,
                estimated_duration: self.estimated_duration.clone(),
                fallback: None,
            });
        }
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.index = i as u32 + 1;
        }
        self
    }

    /// Action type of the first step, if any.
    pub fn first_action(&self) -> Option<ActionKind> {
        self.steps.first().map(|s| s.action_type)
    }

    pub fn has_step(&self, kind: ActionKind) -> bool {
        self.steps.iter().any(|s| s.action_type == kind)
    }

    /// Description of the first step with the given action type.
    pub fn step_description(&self, kind: ActionKind) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.action_type == kind)
            .map(|s| s.description.as_str())
    }
}

/// Accept strings, numbers, and null where a string is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}
