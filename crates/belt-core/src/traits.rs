use crate::{
    action::{CallStatus, CallStatusReport, CallTranscript, Contact},
    context::Context,
    error::{BeltError, ExecutorError},
    message::{IncomingMessage, OutgoingMessage},
    session::{CallRecord, PendingConfirmation, WizardState},
};
use async_trait::async_trait;

/// Language model provider used for intent analysis, planning and answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Whether this provider requires an API key to function.
    fn requires_api_key(&self) -> bool;

    /// Send a conversation context to the provider and get a response.
    async fn complete(&self, context: &Context) -> Result<OutgoingMessage, BeltError>;

    /// Check if the provider is available and ready.
    async fn is_available(&self) -> bool;
}

/// Messaging channel: receives user text and delivers replies and
/// asynchronous notifications.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, BeltError>;

    /// Send a message back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), BeltError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), BeltError>;
}

/// Outbound phone calls.
#[async_trait]
pub trait VoiceExecutor: Send + Sync {
    /// Place a call. Returns the provider's call id.
    async fn initiate_call(
        &self,
        phone_e164: &str,
        opening_line: &str,
        behavior_prompt: &str,
    ) -> Result<String, ExecutorError>;

    async fn poll_status(&self, call_id: &str) -> Result<CallStatusReport, ExecutorError>;

    async fn fetch_transcript(&self, call_id: &str) -> Result<CallTranscript, ExecutorError>;
}

/// SMS or e-mail delivery.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a message. Returns the provider's message id.
    async fn send(
        &self,
        destination: &str,
        body: &str,
        subject: Option<&str>,
    ) -> Result<String, ExecutorError>;
}

#[async_trait]
pub trait CalendarExecutor: Send + Sync {
    /// Create an event. Returns the event id or link.
    async fn create_event(
        &self,
        title: &str,
        start_iso: &str,
        end_iso: &str,
        timezone: &str,
    ) -> Result<String, ExecutorError>;
}

/// Web automation.
#[async_trait]
pub trait BrowserExecutor: Send + Sync {
    /// Carry out free-text instructions. Returns the result prose.
    async fn run_task(&self, instructions: &str) -> Result<String, ExecutorError>;
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Case-insensitive lookup of a user's contact.
    async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<Contact>, BeltError>;
}

/// User profile preferences (favourite venue, dietary wishes, ...).
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn store_preferences(
        &self,
        user_id: &str,
        preferences: &[(String, String)],
    ) -> Result<(), BeltError>;

    async fn get_preferences(&self, user_id: &str) -> Result<Vec<(String, String)>, BeltError>;
}

/// Persisted call history, separate from in-flight tracking.
#[async_trait]
pub trait CallLog: Send + Sync {
    async fn log_call_started(&self, record: &CallRecord) -> Result<(), BeltError>;

    async fn log_call_finished(
        &self,
        call_id: &str,
        status: CallStatus,
        ended_reason: Option<&str>,
        transcript: &CallTranscript,
    ) -> Result<(), BeltError>;
}

/// Conversation state held between inbound messages.
///
/// Implementations keep at most one pending confirmation and one wizard per
/// user: storing a new one replaces the old.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put_confirmation(&self, pending: PendingConfirmation) -> Result<(), BeltError>;

    /// Remove and return the user's pending confirmation.
    async fn take_confirmation(&self, user_id: &str)
        -> Result<Option<PendingConfirmation>, BeltError>;

    async fn peek_confirmation(&self, user_id: &str)
        -> Result<Option<PendingConfirmation>, BeltError>;

    async fn put_wizard(&self, state: WizardState) -> Result<(), BeltError>;

    async fn get_wizard(&self, user_id: &str) -> Result<Option<WizardState>, BeltError>;

    async fn remove_wizard(&self, user_id: &str) -> Result<Option<WizardState>, BeltError>;

    async fn put_call(&self, record: CallRecord) -> Result<(), BeltError>;

    async fn remove_call(&self, call_id: &str) -> Result<Option<CallRecord>, BeltError>;

    async fn active_calls(&self) -> Result<Vec<CallRecord>, BeltError>;
}
