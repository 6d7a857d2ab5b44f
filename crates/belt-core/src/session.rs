//! Conversation-scoped records held between inbound messages.

use crate::{intent::ActionKind, message::ChatContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored yes/no gate awaiting explicit approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Opaque unique id.
    pub token: String,
    pub user_id: String,
    pub chat_context: ChatContext,
    /// The original request, re-submitted with `confirmed=true` on approval.
    pub pending_message: String,
    pub created_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn new(user_id: &str, chat_context: &ChatContext, pending_message: &str) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            chat_context: chat_context.clone(),
            pending_message: pending_message.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// One step of a guided slot-filling flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    SelectContact,
    /// Detour when the selected contact has no phone number.
    EnterPhone,
    /// Detour when the selected contact has no e-mail address.
    EnterEmail,
    EnterSubject,
    EnterMessage,
    EnterTitle,
    EnterDatetime,
    Confirm,
}

/// Slots collected so far by a wizard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardSlots {
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub message_body: Option<String>,
    pub subject: Option<String>,
    pub event_title: Option<String>,
    pub event_datetime: Option<String>,
}

/// An active guided flow. At most one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub action_type: ActionKind,
    pub current_step: WizardStep,
    pub user_id: String,
    pub chat_context: ChatContext,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub slots: WizardSlots,
}

/// In-memory tracking record for a call that has not reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub user_id: String,
    pub chat_context: ChatContext,
    pub started_at: DateTime<Utc>,
    /// Initiation attempts it took to place the call.
    pub attempt_count: u32,
    pub phone: String,
    /// What the call is about, used in notifications.
    pub purpose: String,
}
