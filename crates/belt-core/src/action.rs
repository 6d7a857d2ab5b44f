use crate::{error::ExecutorError, intent::ActionKind};
use serde::{Deserialize, Serialize};

/// Uniform outcome of one executor contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub kind: ActionKind,
    pub success: bool,
    /// Failure description, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Action-specific identifier: call id, message sid, or event id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Prose produced by the action (browser result, informational answer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Number of initiation attempts made (voice only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// User-facing remediation hint for terminal failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ActionResult {
    pub fn ok(kind: ActionKind) -> Self {
        Self {
            kind,
            success: true,
            error: None,
            id: None,
            text: None,
            attempts: None,
            hint: None,
        }
    }

    pub fn failed(kind: ActionKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok(kind)
        }
    }

    /// Failure built from an executor error, carrying its remediation hint.
    pub fn from_error(kind: ActionKind, err: &ExecutorError) -> Self {
        Self {
            hint: err.remediation_hint().map(String::from),
            ..Self::failed(kind, err.to_string())
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}

/// Status of an outbound phone call as reported by the voice provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Forwarding,
    Ended,
    Failed,
    Busy,
    NoAnswer,
    Unknown,
}

impl From<String> for CallStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl CallStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().replace('_', "-").as_str() {
            "queued" => Self::Queued,
            "ringing" => Self::Ringing,
            "in-progress" => Self::InProgress,
            "forwarding" => Self::Forwarding,
            "ended" | "completed" => Self::Ended,
            "failed" => Self::Failed,
            "busy" => Self::Busy,
            "no-answer" => Self::NoAnswer,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Forwarding => "forwarding",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no-answer",
            Self::Unknown => "unknown",
        }
    }

    /// No further transition occurs from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Busy | Self::NoAnswer)
    }

    /// Dutch label shown in call notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "In de wachtrij",
            Self::Ringing => "Gaat over",
            Self::InProgress => "Gesprek bezig",
            Self::Forwarding => "Wordt doorgeschakeld",
            Self::Ended => "Beëindigd",
            Self::Failed => "Mislukt",
            Self::Busy => "In gesprek",
            Self::NoAnswer => "Niet opgenomen",
            Self::Unknown => "Onbekend",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status poll of an in-flight call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatusReport {
    pub status: CallStatus,
    #[serde(default)]
    pub ended_reason: Option<String>,
}

/// Conversation record fetched once a call is terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTranscript {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

/// An entry in the user's contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
