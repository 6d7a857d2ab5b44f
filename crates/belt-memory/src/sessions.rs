//! Process-local state, lost on restart.
//!
//! Suitable for a single-process deployment and for tests. Concurrent
//! requests from the same user are last-write-wins.

use async_trait::async_trait;
use belt_core::{
    action::{CallStatus, CallTranscript, Contact},
    error::BeltError,
    session::{CallRecord, PendingConfirmation, WizardState},
    traits::{CallLog, ContactDirectory, PreferenceStore, SessionStore},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// One row of call history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLogEntry {
    pub call_id: String,
    pub user_id: String,
    pub phone: String,
    pub purpose: String,
    pub attempts: u32,
    pub status: CallStatus,
    pub ended_reason: Option<String>,
    pub duration_secs: Option<u64>,
    pub summary: Option<String>,
}

/// In-memory implementation of every storage trait.
#[derive(Default)]
pub struct InMemorySessions {
    /// Keyed by token, scanned by user id.
    confirmations: Mutex<HashMap<String, PendingConfirmation>>,
    wizards: Mutex<HashMap<String, WizardState>>,
    calls: Mutex<HashMap<String, CallRecord>>,
    contacts: Mutex<HashMap<String, Vec<Contact>>>,
    preferences: Mutex<HashMap<String, BTreeMap<String, String>>>,
    call_log: Mutex<Vec<CallLogEntry>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a contact (matched case-insensitively by name).
    pub fn add_contact(&self, user_id: &str, contact: Contact) {
        let mut contacts = lock(&self.contacts);
        let list = contacts.entry(user_id.to_string()).or_default();
        list.retain(|c| !c.name.eq_ignore_ascii_case(&contact.name));
        list.push(contact);
    }

    /// Snapshot of the call history, oldest first.
    pub fn call_history(&self) -> Vec<CallLogEntry> {
        lock(&self.call_log).clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn put_confirmation(&self, pending: PendingConfirmation) -> Result<(), BeltError> {
        let mut map = lock(&self.confirmations);
        map.retain(|_, p| p.user_id != pending.user_id);
        map.insert(pending.token.clone(), pending);
        Ok(())
    }

    async fn take_confirmation(
        &self,
        user_id: &str,
    ) -> Result<Option<PendingConfirmation>, BeltError> {
        let mut map = lock(&self.confirmations);
        let token = map
            .values()
            .find(|p| p.user_id == user_id)
            .map(|p| p.token.clone());
        Ok(token.and_then(|t| map.remove(&t)))
    }

    async fn peek_confirmation(
        &self,
        user_id: &str,
    ) -> Result<Option<PendingConfirmation>, BeltError> {
        Ok(lock(&self.confirmations)
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn put_wizard(&self, state: WizardState) -> Result<(), BeltError> {
        lock(&self.wizards).insert(state.user_id.clone(), state);
        Ok(())
    }

    async fn get_wizard(&self, user_id: &str) -> Result<Option<WizardState>, BeltError> {
        Ok(lock(&self.wizards).get(user_id).cloned())
    }

    async fn remove_wizard(&self, user_id: &str) -> Result<Option<WizardState>, BeltError> {
        Ok(lock(&self.wizards).remove(user_id))
    }

    async fn put_call(&self, record: CallRecord) -> Result<(), BeltError> {
        lock(&self.calls).insert(record.call_id.clone(), record);
        Ok(())
    }

    async fn remove_call(&self, call_id: &str) -> Result<Option<CallRecord>, BeltError> {
        Ok(lock(&self.calls).remove(call_id))
    }

    async fn active_calls(&self) -> Result<Vec<CallRecord>, BeltError> {
        let mut calls: Vec<CallRecord> = lock(&self.calls).values().cloned().collect();
        calls.sort_by_key(|c| c.started_at);
        Ok(calls)
    }
}

#[async_trait]
impl ContactDirectory for InMemorySessions {
    async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<Contact>, BeltError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let contacts = lock(&self.contacts);
        let Some(list) = contacts.get(user_id) else {
            return Ok(None);
        };
        let exact = list.iter().find(|c| c.name.to_lowercase() == needle);
        let prefix = || list.iter().find(|c| c.name.to_lowercase().starts_with(&needle));
        Ok(exact.or_else(prefix).cloned())
    }
}

#[async_trait]
impl PreferenceStore for InMemorySessions {
    async fn store_preferences(
        &self,
        user_id: &str,
        preferences: &[(String, String)],
    ) -> Result<(), BeltError> {
        let mut map = lock(&self.preferences);
        let entry = map.entry(user_id.to_string()).or_default();
        for (key, value) in preferences {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Vec<(String, String)>, BeltError> {
        Ok(lock(&self.preferences)
            .get(user_id)
            .map(|prefs| {
                prefs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CallLog for InMemorySessions {
    async fn log_call_started(&self, record: &CallRecord) -> Result<(), BeltError> {
        lock(&self.call_log).push(CallLogEntry {
            call_id: record.call_id.clone(),
            user_id: record.user_id.clone(),
            phone: record.phone.clone(),
            purpose: record.purpose.clone(),
            attempts: record.attempt_count,
            status: CallStatus::Queued,
            ended_reason: None,
            duration_secs: None,
            summary: None,
        });
        Ok(())
    }

    async fn log_call_finished(
        &self,
        call_id: &str,
        status: CallStatus,
        ended_reason: Option<&str>,
        transcript: &CallTranscript,
    ) -> Result<(), BeltError> {
        let mut log = lock(&self.call_log);
        let entry = log
            .iter_mut()
            .find(|e| e.call_id == call_id)
            .ok_or_else(|| BeltError::Memory(format!("unknown call {call_id}")))?;
        entry.status = status;
        entry.ended_reason = ended_reason.map(String::from);
        entry.duration_secs = transcript.duration_secs;
        entry.summary = Some(transcript.summary.clone()).filter(|s| !s.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use belt_core::{intent::ActionKind, message::ChatContext, session::WizardStep};
    use chrono::Utc;

    fn chat() -> ChatContext {
        ChatContext::new("console", "u1")
    }

    #[tokio::test]
    async fn test_one_confirmation_per_user() {
        let store = InMemorySessions::new();
        store
            .put_confirmation(PendingConfirmation::new("u1", &chat(), "bel Jan"))
            .await
            .unwrap();
        store
            .put_confirmation(PendingConfirmation::new("u1", &chat(), "sms Piet"))
            .await
            .unwrap();
        store
            .put_confirmation(PendingConfirmation::new("u2", &chat(), "mail Kees"))
            .await
            .unwrap();

        let peeked = store.peek_confirmation("u1").await.unwrap().unwrap();
        assert_eq!(peeked.pending_message, "sms Piet");

        let taken = store.take_confirmation("u1").await.unwrap().unwrap();
        assert_eq!(taken.pending_message, "sms Piet");
        assert!(store.take_confirmation("u1").await.unwrap().is_none());
        assert!(store.peek_confirmation("u2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wizard_replaced_and_removed() {
        let store = InMemorySessions::new();
        let mut state = WizardState {
            action_type: ActionKind::Sms,
            current_step: WizardStep::SelectContact,
            user_id: "u1".into(),
            chat_context: chat(),
            started_at: Utc::now(),
            slots: Default::default(),
        };
        store.put_wizard(state.clone()).await.unwrap();
        state.action_type = ActionKind::Email;
        store.put_wizard(state).await.unwrap();

        let current = store.get_wizard("u1").await.unwrap().unwrap();
        assert_eq!(current.action_type, ActionKind::Email);
        assert!(store.remove_wizard("u1").await.unwrap().is_some());
        assert!(store.get_wizard("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contact_lookup_case_insensitive() {
        let store = InMemorySessions::new();
        store.add_contact(
            "u1",
            Contact {
                name: "Jan de Vries".into(),
                phone: Some("+31612345678".into()),
                email: None,
            },
        );
        let found = store.find_by_name("u1", "jan de vries").await.unwrap();
        assert_eq!(found.unwrap().phone.as_deref(), Some("+31612345678"));
        let prefix = store.find_by_name("u1", "Jan").await.unwrap();
        assert!(prefix.is_some());
        assert!(store.find_by_name("u2", "Jan").await.unwrap().is_none());
        assert!(store.find_by_name("u1", "  ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preferences_upsert() {
        let store = InMemorySessions::new();
        store
            .store_preferences("u1", &[("favorite_venue".into(), "De Kas".into())])
            .await
            .unwrap();
        store
            .store_preferences("u1", &[("favorite_venue".into(), "Ciel Bleu".into())])
            .await
            .unwrap();
        let prefs = store.get_preferences("u1").await.unwrap();
        assert_eq!(prefs, vec![("favorite_venue".into(), "Ciel Bleu".into())]);
    }

    #[tokio::test]
    async fn test_call_log_lifecycle() {
        let store = InMemorySessions::new();
        let record = CallRecord {
            call_id: "call-1".into(),
            user_id: "u1".into(),
            chat_context: chat(),
            started_at: Utc::now(),
            attempt_count: 2,
            phone: "+31612345678".into(),
            purpose: "Tafel reserveren".into(),
        };
        store.log_call_started(&record).await.unwrap();
        store
            .log_call_finished(
                "call-1",
                CallStatus::Ended,
                Some("customer-ended-call"),
                &CallTranscript {
                    transcript: String::new(),
                    summary: "Gereserveerd".into(),
                    duration_secs: Some(42),
                },
            )
            .await
            .unwrap();
        let history = store.call_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallStatus::Ended);
        assert_eq!(history[0].attempts, 2);
        assert_eq!(history[0].duration_secs, Some(42));

        let missing = store
            .log_call_finished("nope", CallStatus::Failed, None, &CallTranscript::default())
            .await;
        assert!(missing.is_err());
    }
}
