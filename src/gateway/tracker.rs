//! Call lifecycle tracking.
//!
//! Initiation is synchronous with the request and retried with exponential
//! backoff on retryable failures. Once a call is placed, a background task
//! polls its status, announces `ringing` and `in-progress` once each, and
//! sends one final notification when the call is terminal or the poll budget
//! runs out. Poll tasks are cancelled and joined on shutdown.

use super::outcome::{analyze_transcript, CallOutcome};
use belt_core::{
    action::{CallStatus, CallStatusReport, CallTranscript},
    config::VoiceConfig,
    error::ExecutorError,
    message::{ChatContext, OutgoingMessage},
    session::CallRecord,
    traits::{CallLog, Channel, SessionStore, VoiceExecutor},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Provider end-reason codes and their user-facing explanation.
const ENDED_REASONS: &[(&str, &str)] = &[
    ("customer-did-not-answer", "Er werd niet opgenomen."),
    ("customer-ended-call", "De andere partij heeft opgehangen."),
    ("customer-busy", "De lijn was bezet."),
    (
        "twilio-failed-to-connect-call",
        "De telefoonprovider kon geen verbinding maken. Controleer het uitgaande nummer.",
    ),
    (
        "vonage-failed-to-connect-call",
        "De telefoonprovider kon geen verbinding maken.",
    ),
    (
        "assistant-error",
        "Er ging iets mis in de spraakassistent. Controleer het model en de stem.",
    ),
    (
        "assistant-join-timed-out",
        "De spraakassistent kon niet op tijd deelnemen. Probeer het opnieuw.",
    ),
    ("assistant-not-provided", "Er is geen spraakassistent ingesteld."),
    (
        "call.start.error-get-phone-number",
        "Het uitgaande nummer kon niet worden opgehaald. Controleer de configuratie.",
    ),
    (
        "call.start.error-get-assistant",
        "De configuratie van de spraakassistent kon niet worden geladen.",
    ),
    (
        "call.start.error-get-customer",
        "Het gebelde nummer is ongeldig of ontbreekt.",
    ),
    (
        "call.start.error-get-resources-validation",
        "Validatiefout bij het starten van het gesprek. Bekijk het dashboard van de belprovider.",
    ),
    (
        "call-start-error-neither-assistant-nor-server-set",
        "Er is geen spraakassistent ingesteld voor dit gesprek.",
    ),
    ("silence-timed-out", "Het gesprek is beëindigd wegens te lange stilte."),
    ("voicemail", "Het gesprek ging naar de voicemail."),
    ("exceeded-max-duration", "De maximale gespreksduur is bereikt."),
    (
        "phone-call-provider-closed-websocket",
        "De verbinding met de telefoonprovider werd verbroken.",
    ),
    (
        "pipeline-no-available-llm-model",
        "Er was geen taalmodel beschikbaar. Controleer de credentials bij de belprovider.",
    ),
    (
        "unknown-error",
        "Onbekende fout. Bekijk het dashboard van de belprovider voor dit gesprek.",
    ),
];

/// End reasons that mean the conversation actually took place.
const CONVERSATION_HELD: &[&str] = &[
    "customer-ended-call",
    "assistant-ended-call",
    "assistant-said-end-call-phrase",
    "assistant-forwarded-call",
];

/// User-facing explanation for a provider end-reason code.
pub fn ended_reason_message(code: &str) -> String {
    ENDED_REASONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, msg)| msg.to_string())
        .unwrap_or_else(|| {
            format!("Onbekende reden ({code}). Bekijk het dashboard van de belprovider voor dit gesprek.")
        })
}

/// Backoff for call initiation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &VoiceConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay after failed attempt `attempt` (1-based): base doubling, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of placing a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initiation {
    Placed { call_id: String, attempts: u32 },
    Failed { error: ExecutorError, attempts: u32 },
}

/// Place a call, retrying retryable failures with backoff.
pub async fn initiate_with_retry(
    voice: &dyn VoiceExecutor,
    policy: &RetryPolicy,
    phone: &str,
    opening_line: &str,
    behavior_prompt: &str,
) -> Initiation {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match voice.initiate_call(phone, opening_line, behavior_prompt).await {
            Ok(call_id) => {
                info!("call {call_id} to {phone} placed on attempt {attempt}");
                return Initiation::Placed {
                    call_id,
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts() => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "call to {phone} failed on attempt {attempt}/{}: {e}; retrying in {}ms",
                    policy.max_attempts(),
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!("call to {phone} failed after {attempt} attempt(s): {e}");
                return Initiation::Failed {
                    error: e,
                    attempts: attempt,
                };
            }
        }
    }
}

/// Intermediate notification for a newly observed status.
pub fn status_notification(status: CallStatus, record: &CallRecord) -> String {
    match status {
        CallStatus::Ringing => format!("📞 {} bij {}…", status.label(), record.phone),
        CallStatus::InProgress => format!("🗣️ {} met {}.", status.label(), record.phone),
        other => format!("📞 {}: {}", record.phone, other.label()),
    }
}

/// Final notification for a terminal call.
pub fn final_notification(
    record: &CallRecord,
    report: &CallStatusReport,
    transcript: &CallTranscript,
    outcome: Option<&CallOutcome>,
) -> String {
    let reason = report.ended_reason.as_deref();
    let held = report.status == CallStatus::Ended
        && reason.map_or(true, |r| CONVERSATION_HELD.contains(&r));

    if !held {
        let explanation = match (reason, report.status) {
            (Some(code), _) => ended_reason_message(code),
            (None, CallStatus::Busy) => ended_reason_message("customer-busy"),
            (None, CallStatus::NoAnswer) => ended_reason_message("customer-did-not-answer"),
            (None, _) => "Onbekende reden.".to_string(),
        };
        return format!(
            "❌ Gesprek met {} niet gelukt ({}): {explanation}",
            record.phone,
            report.status.label()
        );
    }

    let mut text = format!("✅ Gesprek met {} afgerond", record.phone);
    if let Some(secs) = transcript.duration_secs {
        text.push_str(&format!(" ({}m {:02}s)", secs / 60, secs % 60));
    }
    text.push_str(&format!(": {}", record.purpose));
    if let Some(outcome) = outcome {
        text.push_str(&format!("\n{}", outcome.summary));
    }
    if !transcript.summary.trim().is_empty() {
        text.push_str(&format!("\n📝 {}", transcript.summary.trim()));
    }
    text
}

/// Owns the background poll tasks of in-flight calls.
pub struct CallTracker {
    voice: Arc<dyn VoiceExecutor>,
    sessions: Arc<dyn SessionStore>,
    call_log: Arc<dyn CallLog>,
    channels: HashMap<String, Arc<dyn Channel>>,
    retry: RetryPolicy,
    poll_interval: Duration,
    poll_max_attempts: u32,
    cancel: CancellationToken,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl CallTracker {
    pub fn new(
        voice: Arc<dyn VoiceExecutor>,
        sessions: Arc<dyn SessionStore>,
        call_log: Arc<dyn CallLog>,
        channels: HashMap<String, Arc<dyn Channel>>,
        cfg: &VoiceConfig,
    ) -> Self {
        Self {
            voice,
            sessions,
            call_log,
            channels,
            retry: RetryPolicy::from_config(cfg),
            poll_interval: cfg.poll_interval(),
            poll_max_attempts: cfg.poll_max_attempts,
            cancel: CancellationToken::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Place a call with initiation retries.
    pub async fn place_call(&self, phone: &str, opening_line: &str, behavior_prompt: &str) -> Initiation {
        initiate_with_retry(
            self.voice.as_ref(),
            &self.retry,
            phone,
            opening_line,
            behavior_prompt,
        )
        .await
    }

    /// Record a placed call and start polling it in the background.
    pub async fn track(&self, record: CallRecord, analyze_reservation: bool) {
        if let Err(e) = self.sessions.put_call(record.clone()).await {
            warn!("failed to store call record {}: {e}", record.call_id);
        }
        if let Err(e) = self.call_log.log_call_started(&record).await {
            warn!("failed to log call {}: {e}", record.call_id);
        }

        let call_id = record.call_id.clone();
        let job = PollJob {
            voice: self.voice.clone(),
            sessions: self.sessions.clone(),
            call_log: self.call_log.clone(),
            channels: self.channels.clone(),
            interval: self.poll_interval,
            max_attempts: self.poll_max_attempts,
            cancel: self.cancel.child_token(),
            record,
            analyze_reservation,
        };
        let handle = tokio::spawn(job.run());

        let mut handles = self.handles.lock().await;
        handles.retain(|_, h| !h.is_finished());
        handles.insert(call_id, handle);
    }

    /// Number of calls still being polled.
    pub async fn active_count(&self) -> usize {
        let mut handles = self.handles.lock().await;
        handles.retain(|_, h| !h.is_finished());
        handles.len()
    }

    /// Cancel outstanding polls and wait for them to stop.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<(String, JoinHandle<()>)> = self.handles.lock().await.drain().collect();
        for (call_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!("poll task for call {call_id} ended abnormally: {e}");
            }
        }
        info!("call tracker stopped");
    }
}

/// Everything one poll task needs, owned so it can outlive the request.
struct PollJob {
    voice: Arc<dyn VoiceExecutor>,
    sessions: Arc<dyn SessionStore>,
    call_log: Arc<dyn CallLog>,
    channels: HashMap<String, Arc<dyn Channel>>,
    interval: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
    record: CallRecord,
    analyze_reservation: bool,
}

impl PollJob {
    async fn run(self) {
        let call_id = self.record.call_id.clone();
        let mut announced_ringing = false;
        let mut announced_in_progress = false;

        for attempt in 1..=self.max_attempts {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("polling for call {call_id} cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let report = match self.voice.poll_status(&call_id).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("status poll {attempt} for call {call_id} failed: {e}");
                    continue;
                }
            };
            debug!("call {call_id} poll {attempt}: {}", report.status);

            match report.status {
                CallStatus::Ringing if !announced_ringing => {
                    announced_ringing = true;
                    self.notify(&status_notification(report.status, &self.record))
                        .await;
                }
                CallStatus::InProgress if !announced_in_progress => {
                    announced_in_progress = true;
                    self.notify(&status_notification(report.status, &self.record))
                        .await;
                }
                status if status.is_terminal() => {
                    self.finish(report).await;
                    return;
                }
                _ => {}
            }
        }

        self.time_out().await;
    }

    async fn finish(&self, report: CallStatusReport) {
        let call_id = &self.record.call_id;
        info!(
            "call {call_id} terminal: {} ({})",
            report.status,
            report.ended_reason.as_deref().unwrap_or("no reason")
        );

        let transcript = match self.voice.fetch_transcript(call_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!("failed to fetch transcript for call {call_id}: {e}");
                CallTranscript::default()
            }
        };
        let outcome = (self.analyze_reservation && !transcript.transcript.trim().is_empty())
            .then(|| analyze_transcript(&transcript.transcript));

        self.notify(&final_notification(
            &self.record,
            &report,
            &transcript,
            outcome.as_ref(),
        ))
        .await;

        if let Err(e) = self.sessions.remove_call(call_id).await {
            warn!("failed to remove call record {call_id}: {e}");
        }
        if let Err(e) = self
            .call_log
            .log_call_finished(
                call_id,
                report.status,
                report.ended_reason.as_deref(),
                &transcript,
            )
            .await
        {
            warn!("failed to log end of call {call_id}: {e}");
        }
    }

    async fn time_out(&self) {
        let call_id = &self.record.call_id;
        let waited = self.interval.saturating_mul(self.max_attempts);
        warn!(
            "call {call_id} not terminal after {} polls ({}s)",
            self.max_attempts,
            waited.as_secs()
        );

        self.notify(&format!(
            "⏱️ Geen eindstatus ontvangen voor het gesprek met {} na {} minuten. \
             Bekijk het dashboard van de belprovider voor de uitkomst.",
            self.record.phone,
            waited.as_secs().div_ceil(60)
        ))
        .await;

        if let Err(e) = self.sessions.remove_call(call_id).await {
            warn!("failed to remove call record {call_id}: {e}");
        }
        if let Err(e) = self
            .call_log
            .log_call_finished(
                call_id,
                CallStatus::Unknown,
                Some("poll-timeout"),
                &CallTranscript::default(),
            )
            .await
        {
            warn!("failed to log timeout of call {call_id}: {e}");
        }
    }

    async fn notify(&self, text: &str) {
        notify(&self.channels, &self.record.chat_context, text).await;
    }
}

/// Send a text to the chat it belongs to.
pub async fn notify(channels: &HashMap<String, Arc<dyn Channel>>, chat: &ChatContext, text: &str) {
    match channels.get(&chat.channel) {
        Some(channel) => {
            if let Err(e) = channel.send(OutgoingMessage::notification(chat, text)).await {
                warn!("failed to notify {}:{}: {e}", chat.channel, chat.reply_target);
            }
        }
        None => warn!("no channel named {} for notification", chat.channel),
    }
}
