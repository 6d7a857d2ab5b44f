//! End-to-end tests of the request pipeline against mock collaborators.

use super::{
    analyzer::{INTENT_HEADER, PLAN_HEADER, PREFERENCES_HEADER},
    tracker::{initiate_with_retry, Initiation, RetryPolicy},
    Executors, Gateway, Storage,
};
use async_trait::async_trait;
use belt_core::{
    action::{CallStatus, CallStatusReport, CallTranscript, Contact},
    config::{Config, VoiceConfig},
    context::Context,
    error::{BeltError, ExecutorError},
    intent::ActionKind,
    message::{ChatContext, IncomingMessage, OutgoingMessage},
    session::{WizardSlots, WizardState, WizardStep},
    traits::{
        BrowserExecutor, CalendarExecutor, Channel, MessageSender, Provider, SessionStore,
        VoiceExecutor,
    },
};
use belt_memory::InMemorySessions;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

struct MockProvider {
    intent: String,
    plan: String,
    answer: String,
    calls: AtomicUsize,
}

impl MockProvider {
    fn new(intent: &str, plan: &str) -> Self {
        Self {
            intent: intent.to_string(),
            plan: plan.to_string(),
            answer: "Geen idee.".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn answering(mut self, answer: &str) -> Self {
        self.answer = answer.to_string();
        self
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn complete(&self, context: &Context) -> Result<OutgoingMessage, BeltError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &context.system_prompt;
        let text = if prompt.starts_with(INTENT_HEADER) {
            self.intent.clone()
        } else if prompt.starts_with(PLAN_HEADER) {
            self.plan.clone()
        } else if prompt.starts_with(PREFERENCES_HEADER) {
            "none".to_string()
        } else {
            self.answer.clone()
        };
        Ok(OutgoingMessage {
            text,
            ..Default::default()
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct MockVoice {
    initiations: Mutex<VecDeque<Result<String, ExecutorError>>>,
    statuses: Mutex<VecDeque<CallStatusReport>>,
    transcript: CallTranscript,
    dialed: Mutex<Vec<String>>,
}

impl MockVoice {
    fn scripted(initiations: Vec<Result<String, ExecutorError>>) -> Self {
        Self {
            initiations: Mutex::new(initiations.into()),
            ..Default::default()
        }
    }

    fn with_statuses(mut self, statuses: &[(CallStatus, Option<&str>)]) -> Self {
        self.statuses = Mutex::new(
            statuses
                .iter()
                .map(|(status, reason)| CallStatusReport {
                    status: *status,
                    ended_reason: reason.map(String::from),
                })
                .collect(),
        );
        self
    }

    fn with_transcript(mut self, transcript: &str, summary: &str, duration_secs: u64) -> Self {
        self.transcript = CallTranscript {
            transcript: transcript.to_string(),
            summary: summary.to_string(),
            duration_secs: Some(duration_secs),
        };
        self
    }

    fn dialed(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceExecutor for MockVoice {
    async fn initiate_call(
        &self,
        phone_e164: &str,
        _opening_line: &str,
        _behavior_prompt: &str,
    ) -> Result<String, ExecutorError> {
        self.dialed.lock().unwrap().push(phone_e164.to_string());
        self.initiations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("call-1".to_string()))
    }

    async fn poll_status(&self, _call_id: &str) -> Result<CallStatusReport, ExecutorError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CallStatusReport {
                status: CallStatus::Queued,
                ended_reason: None,
            }))
    }

    async fn fetch_transcript(&self, _call_id: &str) -> Result<CallTranscript, ExecutorError> {
        Ok(self.transcript.clone())
    }
}

#[derive(Default)]
struct MockSender {
    sent: Mutex<Vec<(String, String, Option<String>)>>,
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send(
        &self,
        destination: &str,
        body: &str,
        subject: Option<&str>,
    ) -> Result<String, ExecutorError> {
        self.sent.lock().unwrap().push((
            destination.to_string(),
            body.to_string(),
            subject.map(String::from),
        ));
        Ok("msg-1".to_string())
    }
}

#[derive(Default)]
struct MockCalendar {
    events: Mutex<Vec<(String, String, String, String)>>,
}

#[async_trait]
impl CalendarExecutor for MockCalendar {
    async fn create_event(
        &self,
        title: &str,
        start_iso: &str,
        end_iso: &str,
        timezone: &str,
    ) -> Result<String, ExecutorError> {
        self.events.lock().unwrap().push((
            title.to_string(),
            start_iso.to_string(),
            end_iso.to_string(),
            timezone.to_string(),
        ));
        Ok("evt-1".to_string())
    }
}

struct MockBrowser {
    result: Result<String, ExecutorError>,
    tasks: Mutex<Vec<String>>,
}

impl MockBrowser {
    fn returning(result: Result<String, ExecutorError>) -> Self {
        Self {
            result,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BrowserExecutor for MockBrowser {
    async fn run_task(&self, instructions: &str) -> Result<String, ExecutorError> {
        self.tasks.lock().unwrap().push(instructions.to_string());
        self.result.clone()
    }
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "test"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, BeltError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), BeltError> {
        self.sent.lock().unwrap().push(message.text);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BeltError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    gw: Gateway,
    provider: Arc<MockProvider>,
    voice: Arc<MockVoice>,
    sms: Arc<MockSender>,
    email: Arc<MockSender>,
    calendar: Arc<MockCalendar>,
    browser: Arc<MockBrowser>,
    sessions: Arc<InMemorySessions>,
    channel: Arc<RecordingChannel>,
}

impl Harness {
    fn new(provider: MockProvider) -> Self {
        Self::with(
            provider,
            MockVoice::default(),
            MockBrowser::returning(Ok("Klaar.".to_string())),
            Config::default(),
        )
    }

    fn with(provider: MockProvider, voice: MockVoice, browser: MockBrowser, config: Config) -> Self {
        let provider = Arc::new(provider);
        let voice = Arc::new(voice);
        let sms = Arc::new(MockSender::default());
        let email = Arc::new(MockSender::default());
        let calendar = Arc::new(MockCalendar::default());
        let browser = Arc::new(browser);
        let sessions = Arc::new(InMemorySessions::new());
        let channel = Arc::new(RecordingChannel::default());

        let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
        channels.insert("test".to_string(), channel.clone());

        let executors = Executors {
            voice: voice.clone(),
            sms: sms.clone(),
            email: email.clone(),
            calendar: calendar.clone(),
            browser: browser.clone(),
        };
        let gw = Gateway::new(
            provider.clone(),
            channels,
            executors,
            Storage::from_shared(sessions.clone()),
            &config,
        );

        Self {
            gw,
            provider,
            voice,
            sms,
            email,
            calendar,
            browser,
            sessions,
            channel,
        }
    }

    async fn say(&self, text: &str) -> belt_core::message::Reply {
        self.gw.handle_user_text("u1", &chat(), text, false).await
    }

    async fn say_confirmed(&self, text: &str) -> belt_core::message::Reply {
        self.gw.handle_user_text("u1", &chat(), text, true).await
    }

    /// Let background polls run to completion on the paused clock.
    async fn wait_for_calls(&self) {
        for _ in 0..1000 {
            if self.gw.active_calls().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("calls still being tracked");
    }
}

fn chat() -> ChatContext {
    ChatContext::new("test", "u1")
}

const CALL_INTENT: &str = r#"{"type": "call", "entities": {"contact_name": "De Kas", "phone": "+31612345678"}, "urgency": "normal"}"#;

const CALL_PLAN: &str = r#"```json
{"goal": "De Kas bellen", "steps": [{"index": 1, "description": "Vragen of er vrijdag plek is", "action_type": "call"}], "estimated_duration": "5 minuten", "requires_confirmation": true}
```"#;

// ---------------------------------------------------------------------------
// Confirmation and calls
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_call_request_confirms_places_and_tracks() {
    let voice = MockVoice::default()
        .with_statuses(&[
            (CallStatus::Ringing, None),
            (CallStatus::Ringing, None),
            (CallStatus::InProgress, None),
            (CallStatus::Ended, Some("customer-ended-call")),
        ])
        .with_transcript("...", "Vrijdag om 19:00 is er plek.", 65);
    let h = Harness::with(
        MockProvider::new(CALL_INTENT, CALL_PLAN),
        voice,
        MockBrowser::returning(Ok(String::new())),
        Config::default(),
    );

    let reply = h
        .say("bel De Kas +31612345678 om te vragen of ze vrijdag plek hebben")
        .await;
    assert!(reply.text.starts_with("Ik ga het volgende doen:\n🎯 De Kas bellen"));
    assert!(reply.text.ends_with("Zal ik doorgaan? (ja/nee)"));
    assert!(h.voice.dialed().is_empty());
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_some());

    let reply = h.say("ja").await;
    assert_eq!(reply.text, "📞 Ik bel nu +31612345678.");
    assert_eq!(reply.followups, vec!["Ik laat je weten hoe het gesprek verloopt."]);
    assert_eq!(h.voice.dialed(), vec!["+31612345678"]);
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_none());
    assert_eq!(h.sessions.active_calls().await.unwrap().len(), 1);

    h.wait_for_calls().await;

    let notifications = h.channel.texts();
    assert_eq!(notifications.len(), 3, "{notifications:?}");
    assert_eq!(notifications[0], "📞 Gaat over bij +31612345678…");
    assert_eq!(notifications[1], "🗣️ Gesprek bezig met +31612345678.");
    assert!(notifications[2]
        .starts_with("✅ Gesprek met +31612345678 afgerond (1m 05s): Vragen of er vrijdag plek is"));
    assert!(notifications[2].ends_with("📝 Vrijdag om 19:00 is er plek."));

    assert!(h.sessions.active_calls().await.unwrap().is_empty());
    let history = h.sessions.call_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, CallStatus::Ended);
}

#[tokio::test]
async fn test_decline_executes_nothing() {
    let h = Harness::new(MockProvider::new(CALL_INTENT, CALL_PLAN));

    h.say("bel De Kas +31612345678").await;
    let reply = h.say("Nee").await;
    assert_eq!(reply.text, "Oké, geannuleerd. Er is niets uitgevoerd.");
    assert!(h.voice.dialed().is_empty());
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_request_supersedes_pending() {
    let h = Harness::new(MockProvider::new(CALL_INTENT, CALL_PLAN));

    h.say("bel De Kas +31612345678").await;
    let reply = h.say("bel toch maar +31687654321").await;
    assert!(reply.text.ends_with("(ja/nee)"));
    let pending = h.sessions.peek_confirmation("u1").await.unwrap().unwrap();
    assert_eq!(pending.pending_message, "bel toch maar +31687654321");
    assert!(h.voice.dialed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_call_failure_after_retries() {
    let voice = MockVoice::scripted(vec![
        Err(ExecutorError::Connection("503".into())),
        Err(ExecutorError::Connection("503".into())),
        Err(ExecutorError::Connection("503".into())),
        Err(ExecutorError::Connection("503".into())),
    ]);
    let h = Harness::with(
        MockProvider::new(CALL_INTENT, CALL_PLAN),
        voice,
        MockBrowser::returning(Ok(String::new())),
        Config::default(),
    );

    let reply = h.say_confirmed("bel De Kas +31612345678").await;
    assert!(
        reply
            .text
            .starts_with("❌ Telefoongesprek mislukt na 4 pogingen: connection error: 503"),
        "{}",
        reply.text
    );
    assert!(reply.text.contains("\n💡 "));
    assert!(reply.followups.is_empty());
    assert_eq!(h.voice.dialed().len(), 4);
    assert_eq!(h.gw.active_calls().await, 0);
    assert!(h.sessions.active_calls().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_budget_exhausted() {
    let mut config = Config::default();
    config.voice.poll_max_attempts = 3;
    let h = Harness::with(
        MockProvider::new(CALL_INTENT, CALL_PLAN),
        MockVoice::default(),
        MockBrowser::returning(Ok(String::new())),
        config,
    );

    h.say_confirmed("bel De Kas +31612345678").await;
    h.wait_for_calls().await;

    let notifications = h.channel.texts();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].starts_with("⏱️ Geen eindstatus ontvangen"));
    assert!(notifications[0].contains("dashboard"));
    assert!(h.sessions.active_calls().await.unwrap().is_empty());
    assert_eq!(
        h.sessions.call_history()[0].ended_reason.as_deref(),
        Some("poll-timeout")
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_polls() {
    let h = Harness::new(MockProvider::new(CALL_INTENT, CALL_PLAN));

    h.say_confirmed("bel De Kas +31612345678").await;
    assert_eq!(h.gw.active_calls().await, 1);
    h.gw.shutdown().await;
    assert_eq!(h.gw.active_calls().await, 0);
    assert!(h.channel.texts().is_empty());
}

// ---------------------------------------------------------------------------
// Initiation retry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_initiation_succeeds_on_third_attempt() {
    let voice = MockVoice::scripted(vec![
        Err(ExecutorError::Connection("reset".into())),
        Err(ExecutorError::Timeout),
        Ok("call-7".into()),
    ]);
    let policy = RetryPolicy::from_config(&VoiceConfig::default());
    let start = tokio::time::Instant::now();

    let outcome = initiate_with_retry(&voice, &policy, "+31612345678", "Hallo", "Kort").await;
    assert_eq!(
        outcome,
        Initiation::Placed {
            call_id: "call-7".into(),
            attempts: 3
        }
    );
    // 2s after the first failure, 4s after the second.
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(6) && waited < Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_initiation_gives_up_after_max_attempts() {
    let voice = MockVoice::scripted(
        (0..10)
            .map(|_| {
                Err(ExecutorError::Provider {
                    code: None,
                    status: Some(503),
                    message: "unavailable".into(),
                })
            })
            .collect(),
    );
    let policy = RetryPolicy::from_config(&VoiceConfig::default());

    let outcome = initiate_with_retry(&voice, &policy, "+31612345678", "Hallo", "Kort").await;
    match outcome {
        Initiation::Failed { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(voice.dialed().len(), 4);
}

#[tokio::test]
async fn test_terminal_error_is_not_retried() {
    let voice = MockVoice::scripted(vec![Err(ExecutorError::NotConfigured(
        "no outbound number".into(),
    ))]);
    let policy = RetryPolicy::from_config(&VoiceConfig::default());

    let outcome = initiate_with_retry(&voice, &policy, "+31612345678", "Hallo", "Kort").await;
    assert!(matches!(outcome, Initiation::Failed { attempts: 1, .. }));
    assert_eq!(voice.dialed().len(), 1);
}

// ---------------------------------------------------------------------------
// Clarification, answers, fallbacks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bare_sms_asks_for_details() {
    let h = Harness::new(MockProvider::new(
        r#"{"type": "sms"}"#,
        r#"{"goal": "SMS sturen", "steps": [{"description": "SMS sturen", "action_type": "sms"}]}"#,
    ));

    let reply = h.say("sms").await;
    assert_eq!(
        reply.text,
        "Ik heb nog wat informatie nodig:\n\
         1. Naar wie wil je de sms sturen?\n\
         2. Wat moet er in de sms staan?"
    );
    assert!(h.sms.sent.lock().unwrap().is_empty());
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sms_to_contact_after_confirmation() {
    let h = Harness::new(MockProvider::new(
        r#"{"type": "sms", "entities": {"contact_name": "Jan", "message_body": "Ik ben tien minuten later"}}"#,
        r#"{"goal": "Jan laten weten dat je later bent", "steps": [{"description": "SMS sturen", "action_type": "sms"}]}"#,
    ));
    h.sessions.add_contact(
        "u1",
        Contact {
            name: "Jan".into(),
            phone: Some("06 12345678".into()),
            email: None,
        },
    );

    let reply = h.say_confirmed("sms Jan dat ik tien minuten later ben").await;
    assert_eq!(reply.text, "💬 SMS verstuurd naar Jan (+31612345678).");
    let sent = h.sms.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![(
            "+31612345678".to_string(),
            "Ik ben tien minuten later".to_string(),
            None
        )]
    );
}

#[tokio::test]
async fn test_info_question_answered_directly() {
    let h = Harness::new(
        MockProvider::new(
            r#"{"type": "info", "entities": {"venue": "De Kas"}}"#,
            r#"{"goal": "Openingstijden", "steps": [{"description": "Antwoord geven", "action_type": "answer"}]}"#,
        )
        .answering("De Kas is open van 12:00 tot 22:00."),
    );

    let reply = h.say("Hoe laat is De Kas open?").await;
    assert_eq!(reply.text, "De Kas is open van 12:00 tot 22:00.");
    assert!(reply.followups.is_empty());
    assert!(h.browser.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_model_output_asks_to_clarify() {
    let h = Harness::new(MockProvider::new("Sorry, dat weet ik niet.", "Geen plan."));

    let reply = h.say("regel iets leuks").await;
    assert_eq!(
        reply.text,
        "Ik heb nog wat informatie nodig:\n1. Kun je je vraag verduidelijken?"
    );
    assert!(h.browser.tasks.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_browser_task_falls_back_to_call() {
    let voice = MockVoice::default()
        .with_statuses(&[(CallStatus::Ended, Some("assistant-ended-call"))])
        .with_transcript(
            "Restaurant: Dat is genoteerd, uw reserveringsnummer is KAS-12. Tot dan!",
            "",
            40,
        );
    let h = Harness::with(
        MockProvider::new(
            r#"{"type": "reservation", "entities": {"venue": "De Kas", "date": "2026-10-23", "time": "19:00", "party_size": 4, "phone": "020 462 4562"}}"#,
            r#"{"goal": "Tafel voor 4 bij De Kas", "steps": [
                {"description": "Online reserveren bij De Kas", "action_type": "browser"},
                {"description": "De Kas bellen om een tafel te reserveren", "action_type": "call"}
            ], "requires_confirmation": true}"#,
        ),
        voice,
        MockBrowser::returning(Err(ExecutorError::Connection("site down".into()))),
        Config::default(),
    );

    let reply = h
        .say_confirmed("reserveer bij De Kas vrijdag 19:00 voor 4 personen")
        .await;
    assert!(reply
        .text
        .starts_with("❌ Online taak mislukt: connection error: site down"));
    assert!(reply.text.ends_with("📞 Ik bel nu +31204624562."));
    assert_eq!(h.voice.dialed(), vec!["+31204624562"]);
    assert_eq!(h.browser.tasks.lock().unwrap().len(), 1);

    h.wait_for_calls().await;
    let notifications = h.channel.texts();
    let last = notifications.last().unwrap();
    assert!(last.contains("Reservering bevestigd (#KAS-12)"), "{last}");
}

// ---------------------------------------------------------------------------
// Wizards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mail_wizard_detours_to_email() {
    let h = Harness::new(MockProvider::new("{}", "{}"));
    h.sessions.add_contact(
        "u1",
        Contact {
            name: "Jan".into(),
            phone: Some("+31612345678".into()),
            email: None,
        },
    );

    assert!(h.say("/mail").await.text.starts_with("📧 Naar wie wil je mailen?"));

    let reply = h.say("jan").await;
    assert_eq!(reply.text, "Ik heb geen e-mailadres van Jan. Wat is het adres?");
    let state = h.sessions.get_wizard("u1").await.unwrap().unwrap();
    assert_eq!(state.current_step, WizardStep::EnterEmail);

    let reply = h.say("geen idee").await;
    assert!(reply.text.starts_with("Dat lijkt geen geldig e-mailadres"));
    let state = h.sessions.get_wizard("u1").await.unwrap().unwrap();
    assert_eq!(state.current_step, WizardStep::EnterEmail);

    assert_eq!(
        h.say("jan@example.nl").await.text,
        "Wat is het onderwerp van de e-mail?"
    );
    assert_eq!(h.say("Etentje").await.text, "Wat moet er in het bericht staan?");
    let confirm = h.say("Zullen we vrijdag eten?").await;
    assert!(confirm.text.starts_with("📧 E-mail naar Jan (jan@example.nl)"));
    assert!(confirm.text.ends_with("Klopt dit? (ja/nee)"));

    let reply = h.say("ja").await;
    assert_eq!(reply.text, "📧 E-mail verstuurd naar Jan (jan@example.nl).");
    assert_eq!(
        h.email.sent.lock().unwrap().clone(),
        vec![(
            "jan@example.nl".to_string(),
            "Zullen we vrijdag eten?".to_string(),
            Some("Etentje".to_string())
        )]
    );
    assert!(h.sessions.get_wizard("u1").await.unwrap().is_none());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_calendar_wizard_creates_event() {
    let h = Harness::new(MockProvider::new("{}", "{}"));

    h.say("/agenda").await;
    h.say("Tandarts").await;
    let reply = h.say("morgen ergens").await;
    assert!(reply.text.starts_with("Die datum begrijp ik niet"));
    let confirm = h.say("20-10-2026 14:30").await;
    assert!(confirm.text.starts_with("📅 Afspraak: Tandarts\nWanneer: 2026-10-20 14:30"));

    let reply = h.say("ja").await;
    assert_eq!(
        reply.text,
        "📅 Afspraak \"Tandarts\" ingepland op 20-10-2026 om 14:30."
    );
    assert_eq!(
        h.calendar.events.lock().unwrap().clone(),
        vec![(
            "Tandarts".to_string(),
            "2026-10-20T14:30:00".to_string(),
            "2026-10-20T15:30:00".to_string(),
            "Europe/Amsterdam".to_string()
        )]
    );
}

#[tokio::test]
async fn test_wizard_declined_at_confirm() {
    let h = Harness::new(MockProvider::new("{}", "{}"));

    h.say("/sms").await;
    h.say("+31612345678").await;
    h.say("Ik kom eraan").await;
    assert_eq!(h.say("nee").await.text, "Oké, geannuleerd.");
    assert!(h.sms.sent.lock().unwrap().is_empty());
    assert!(h.sessions.get_wizard("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_wizard_is_discarded() {
    let h = Harness::new(MockProvider::new("{}", "{}"));
    h.sessions
        .put_wizard(WizardState {
            action_type: ActionKind::Sms,
            current_step: WizardStep::EnterMessage,
            user_id: "u1".into(),
            chat_context: chat(),
            started_at: chrono::Utc::now() - chrono::Duration::seconds(301),
            slots: WizardSlots::default(),
        })
        .await
        .unwrap();

    let reply = h.say("Ik kom eraan").await;
    assert!(reply.text.starts_with("Deze flow is verlopen."));
    assert!(h.sessions.get_wizard("u1").await.unwrap().is_none());
    assert!(h.sms.sent.lock().unwrap().is_empty());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_commands_bypass_analysis() {
    let h = Harness::new(MockProvider::new("{}", "{}"));

    assert!(h.say("/help").await.text.contains("/bel"));
    assert!(h.say("/status").await.text.contains("Provider: mock"));
    assert_eq!(
        h.say("/onbekend").await.text,
        "Onbekend commando. Typ /help voor een overzicht."
    );
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Confirmation per action kind
// ---------------------------------------------------------------------------

/// Ask, decline, ask again and approve; the executor runs only on approval.
async fn decline_then_approve(
    h: &Harness,
    text: &str,
    invocations: impl Fn() -> usize,
) -> belt_core::message::Reply {
    let prompt = h.say(text).await;
    assert!(prompt.text.ends_with("Zal ik doorgaan? (ja/nee)"), "{}", prompt.text);
    assert_eq!(invocations(), 0);

    assert_eq!(h.say("nee").await.text, "Oké, geannuleerd. Er is niets uitgevoerd.");
    assert_eq!(invocations(), 0);

    h.say(text).await;
    assert_eq!(invocations(), 0);
    let reply = h.say("ja").await;
    assert_eq!(invocations(), 1);
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_none());
    reply
}

#[tokio::test]
async fn test_sms_sent_once_after_approval() {
    let h = Harness::new(MockProvider::new(
        r#"{"type": "sms", "entities": {"phone": "+31612345678", "message_body": "Ik ben later"}}"#,
        r#"{"goal": "SMS sturen", "steps": [{"description": "SMS sturen", "action_type": "sms"}]}"#,
    ));

    let reply = decline_then_approve(&h, "sms +31612345678 dat ik later ben", || {
        h.sms.sent.lock().unwrap().len()
    })
    .await;
    assert_eq!(reply.text, "💬 SMS verstuurd naar +31612345678.");
    assert!(h.email.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_mail_sent_once_after_approval() {
    let h = Harness::new(MockProvider::new(
        r#"{"type": "mail", "entities": {"email": "jan@example.nl", "subject": "Etentje", "message_body": "Zullen we vrijdag eten?"}}"#,
        r#"{"goal": "Jan mailen over het etentje", "steps": [{"description": "E-mail sturen", "action_type": "email"}]}"#,
    ));

    let reply = decline_then_approve(&h, "mail jan@example.nl over het etentje", || {
        h.email.sent.lock().unwrap().len()
    })
    .await;
    assert_eq!(reply.text, "📧 E-mail verstuurd naar jan@example.nl.");
    assert_eq!(
        h.email.sent.lock().unwrap().clone(),
        vec![(
            "jan@example.nl".to_string(),
            "Zullen we vrijdag eten?".to_string(),
            Some("Etentje".to_string())
        )]
    );
    assert!(h.sms.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reservation_runs_once_after_approval() {
    let h = Harness::new(MockProvider::new(
        r#"{"type": "reservation", "entities": {"venue": "De Kas", "date": "2026-10-23", "time": "19:00", "party_size": "4"}}"#,
        r#"{"goal": "Tafel voor 4 bij De Kas", "steps": [
            {"description": "Online reserveren bij De Kas", "action_type": "browser"},
            {"description": "De Kas bellen om een tafel te reserveren", "action_type": "call"}
        ]}"#,
    ));

    let reply = decline_then_approve(
        &h,
        "reserveer bij De Kas vrijdag om 19:00 voor 4 personen",
        || h.browser.tasks.lock().unwrap().len(),
    )
    .await;
    assert_eq!(reply.text, "✅ Klaar.");
    assert!(h.voice.dialed().is_empty());
}

#[tokio::test]
async fn test_date_in_request_is_not_dialed() {
    let h = Harness::new(MockProvider::new(
        r#"{"type": "call", "entities": {"contact_name": "De Kas"}}"#,
        CALL_PLAN,
    ));
    h.sessions.add_contact(
        "u1",
        Contact {
            name: "De Kas".into(),
            phone: Some("+31204624562".into()),
            email: None,
        },
    );

    let reply = h
        .say_confirmed("bel De Kas voor een tafel op 23-10-2026 19:00")
        .await;
    assert_eq!(reply.text, "📞 Ik bel nu +31204624562.");
    assert_eq!(h.voice.dialed(), vec!["+31204624562"]);
    h.gw.shutdown().await;
}

#[tokio::test]
async fn test_wizard_start_drops_pending_confirmation() {
    let h = Harness::new(MockProvider::new(CALL_INTENT, CALL_PLAN));

    h.say("bel De Kas +31612345678").await;
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_some());

    h.say("/sms").await;
    assert!(h.sessions.peek_confirmation("u1").await.unwrap().is_none());

    h.say("/cancel").await;
    h.say("ja").await;
    assert!(h.voice.dialed().is_empty());
}
