//! Action routing: the per-request state machine, action selection and
//! per-kind execution against the executor contracts.

use super::{call_script, entities, tracker::Initiation, Gateway};
use belt_core::{
    action::{ActionResult, Contact},
    error::ExecutorError,
    intent::{slot, ActionKind, Intent, IntentType, Plan},
    message::ChatContext,
    session::CallRecord,
};
use chrono::{Local, Timelike, Utc};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Where one request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Analyzing,
    Clarifying,
    Confirming,
    Dispatching,
    Executing(ActionKind),
    Synthesizing,
    Done,
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyzing => write!(f, "analyzing"),
            Self::Clarifying => write!(f, "clarifying"),
            Self::Confirming => write!(f, "confirming"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Executing(kind) => write!(f, "executing:{kind}"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid route transition: {from} -> {to}")]
pub struct RouteError {
    pub from: RouteState,
    pub to: RouteState,
}

/// Validate a route transition.
pub fn validate_transition(from: RouteState, to: RouteState) -> Result<(), RouteError> {
    use RouteState::*;
    let valid = matches!(
        (from, to),
        (Analyzing, Clarifying)
            | (Analyzing, Confirming)
            | (Analyzing, Dispatching)
            | (Clarifying, Synthesizing)
            | (Confirming, Synthesizing)
            | (Dispatching, Executing(_))
            | (Executing(ActionKind::Browser), Executing(ActionKind::Call))
            | (Executing(_), Synthesizing)
            | (Synthesizing, Done)
    );
    if valid {
        Ok(())
    } else {
        Err(RouteError { from, to })
    }
}

/// The state of one request plus the path it took.
#[derive(Debug, Clone)]
pub struct Route {
    state: RouteState,
    trail: Vec<RouteState>,
}

impl Default for Route {
    fn default() -> Self {
        Self::new()
    }
}

impl Route {
    pub fn new() -> Self {
        Self {
            state: RouteState::Analyzing,
            trail: vec![RouteState::Analyzing],
        }
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    pub fn trail(&self) -> &[RouteState] {
        &self.trail
    }

    pub fn advance(&mut self, to: RouteState) -> Result<(), RouteError> {
        validate_transition(self.state, to)?;
        self.state = to;
        self.trail.push(to);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

static KEYWORDS: LazyLock<Vec<(ActionKind, Regex)>> = LazyLock::new(|| {
    [
        (ActionKind::Call, r"(?i)\b(?:bel|bellen|belt|telefoneer|call)\b"),
        (ActionKind::Sms, r"(?i)\b(?:sms|smsen|sms'en|sms'je|smsje)\b"),
        (ActionKind::Email, r"(?i)\b(?:mail|mailen|mailtje|e-mail|email)\b"),
        (ActionKind::Calendar, r"(?i)\b(?:agenda|afspraak|inplannen|calendar)\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid keyword regex")))
    .collect()
});

/// Choose the action to execute.
///
/// An explicit keyword in the text wins (earliest occurrence first), then
/// the intent type, then the plan's first step.
pub fn select_action(text: &str, intent: &Intent, plan: &Plan) -> ActionKind {
    let by_keyword = KEYWORDS
        .iter()
        .filter_map(|(kind, re)| re.find(text).map(|m| (m.start(), *kind)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, kind)| kind);
    if let Some(kind) = by_keyword {
        return kind;
    }

    match intent.kind {
        IntentType::Call => ActionKind::Call,
        IntentType::Sms => ActionKind::Sms,
        IntentType::Mail => ActionKind::Email,
        IntentType::Calendar => ActionKind::Calendar,
        IntentType::Info => ActionKind::Answer,
        _ => plan.first_action().unwrap_or(ActionKind::Answer),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Everything an executor needs from the analysed request.
pub struct Dispatch<'a> {
    pub user_id: &'a str,
    pub chat: &'a ChatContext,
    pub text: &'a str,
    pub intent: &'a Intent,
    pub plan: &'a Plan,
    pub preferences: &'a [(String, String)],
}

impl Gateway {
    /// Run the selected action, with a voice fallback when a browser task
    /// fails and the plan contains a call step.
    pub(super) async fn execute_route(
        &self,
        route: &mut Route,
        dispatch: &Dispatch<'_>,
        selected: ActionKind,
    ) -> Result<Vec<ActionResult>, RouteError> {
        route.advance(RouteState::Executing(selected))?;
        let first = self.execute(selected, dispatch).await;

        let fall_back = selected == ActionKind::Browser
            && !first.success
            && dispatch.plan.has_step(ActionKind::Call);
        let mut results = vec![first];

        if fall_back {
            info!("browser task failed; falling back to a phone call");
            route.advance(RouteState::Executing(ActionKind::Call))?;
            results.push(self.execute(ActionKind::Call, dispatch).await);
        }
        Ok(results)
    }

    async fn execute(&self, kind: ActionKind, dispatch: &Dispatch<'_>) -> ActionResult {
        info!("executing {kind} for {}", dispatch.user_id);
        let result = match kind {
            ActionKind::Call => self.execute_call(dispatch).await,
            ActionKind::Sms => self.execute_sms(dispatch).await,
            ActionKind::Email => self.execute_email(dispatch).await,
            ActionKind::Calendar => self.execute_calendar(dispatch).await,
            ActionKind::Browser => self.execute_browser(dispatch).await,
            ActionKind::Answer => self.execute_answer(dispatch).await,
        };
        if !result.success {
            warn!(
                "{kind} failed for {}: {}",
                dispatch.user_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }

    async fn execute_call(&self, d: &Dispatch<'_>) -> ActionResult {
        let phone = match self.resolve_phone(d).await {
            Some(phone) => phone,
            None => {
                return ActionResult::from_error(
                    ActionKind::Call,
                    &ExecutorError::Validation("geen geldig telefoonnummer gevonden".into()),
                )
            }
        };
        let purpose = d
            .plan
            .step_description(ActionKind::Call)
            .unwrap_or(&d.plan.goal)
            .to_string();
        let opening = call_script::opening_line(&purpose, Local::now().hour());
        let behavior = call_script::behavior_prompt(&purpose, &d.intent.entities);

        match self.tracker.place_call(&phone, &opening, &behavior).await {
            Initiation::Placed { call_id, attempts } => {
                let record = CallRecord {
                    call_id: call_id.clone(),
                    user_id: d.user_id.to_string(),
                    chat_context: d.chat.clone(),
                    started_at: Utc::now(),
                    attempt_count: attempts,
                    phone: phone.clone(),
                    purpose,
                };
                self.tracker
                    .track(record, d.intent.kind == IntentType::Reservation)
                    .await;
                ActionResult::ok(ActionKind::Call)
                    .with_id(call_id)
                    .with_text(format!("Ik bel nu {phone}."))
                    .with_attempts(attempts)
            }
            Initiation::Failed { error, attempts } => {
                ActionResult::from_error(ActionKind::Call, &error).with_attempts(attempts)
            }
        }
    }

    async fn execute_sms(&self, d: &Dispatch<'_>) -> ActionResult {
        let Some(body) = d.intent.entities.get(slot::MESSAGE_BODY) else {
            return missing(ActionKind::Sms, "geen berichttekst");
        };
        let Some(phone) = self.resolve_phone(d).await else {
            return missing(ActionKind::Sms, "geen geldig telefoonnummer gevonden");
        };

        match self.executors.sms.send(&phone, body, None).await {
            Ok(id) => ActionResult::ok(ActionKind::Sms)
                .with_id(id)
                .with_text(format!("SMS verstuurd naar {}.", recipient_label(d, &phone))),
            Err(e) => ActionResult::from_error(ActionKind::Sms, &e),
        }
    }

    async fn execute_email(&self, d: &Dispatch<'_>) -> ActionResult {
        let slots = &d.intent.entities;
        let Some(body) = slots.get(slot::MESSAGE_BODY) else {
            return missing(ActionKind::Email, "geen berichttekst");
        };
        let subject = slots.get(slot::SUBJECT).unwrap_or(&d.plan.goal);

        let address = match slots.get(slot::EMAIL).filter(|e| entities::looks_like_email(e)) {
            Some(address) => Some(address.to_string()),
            None => self
                .lookup_contact(d)
                .await
                .and_then(|c| c.email)
                .filter(|e| entities::looks_like_email(e)),
        };
        let Some(address) = address else {
            return missing(ActionKind::Email, "geen geldig e-mailadres gevonden");
        };

        match self.executors.email.send(&address, body, Some(subject)).await {
            Ok(id) => ActionResult::ok(ActionKind::Email)
                .with_id(id)
                .with_text(format!("E-mail verstuurd naar {}.", recipient_label(d, &address))),
            Err(e) => ActionResult::from_error(ActionKind::Email, &e),
        }
    }

    async fn execute_calendar(&self, d: &Dispatch<'_>) -> ActionResult {
        let slots = &d.intent.entities;
        let Some((start, end)) = entities::event_window(slots) else {
            return missing(ActionKind::Calendar, "geen geldige datum of tijd");
        };
        let title = slots.get(slot::EVENT_TITLE).unwrap_or(&d.plan.goal);
        let start_iso = start.format("%Y-%m-%dT%H:%M:%S").to_string();
        let end_iso = end.format("%Y-%m-%dT%H:%M:%S").to_string();

        match self
            .executors
            .calendar
            .create_event(title, &start_iso, &end_iso, &self.timezone)
            .await
        {
            Ok(id) => ActionResult::ok(ActionKind::Calendar).with_id(id).with_text(format!(
                "Afspraak \"{title}\" ingepland op {}.",
                start.format("%d-%m-%Y om %H:%M")
            )),
            Err(e) => ActionResult::from_error(ActionKind::Calendar, &e),
        }
    }

    async fn execute_browser(&self, d: &Dispatch<'_>) -> ActionResult {
        let instructions = match d.plan.step_description(ActionKind::Browser) {
            Some(step) if step != d.text => format!("{step}\n\nOorspronkelijk verzoek: {}", d.text),
            _ => d.text.to_string(),
        };
        match self.executors.browser.run_task(&instructions).await {
            Ok(prose) => ActionResult::ok(ActionKind::Browser).with_text(prose),
            Err(e) => ActionResult::from_error(ActionKind::Browser, &e),
        }
    }

    async fn execute_answer(&self, d: &Dispatch<'_>) -> ActionResult {
        match self.answer(d.text, d.preferences).await {
            Ok(prose) => ActionResult::ok(ActionKind::Answer).with_text(prose),
            Err(e) => ActionResult::failed(ActionKind::Answer, e.to_string()),
        }
    }

    /// Phone from the slots, else from the user's contacts.
    async fn resolve_phone(&self, d: &Dispatch<'_>) -> Option<String> {
        if let Some(phone) = d
            .intent
            .entities
            .get(slot::PHONE)
            .and_then(entities::normalize_phone)
        {
            return Some(phone);
        }
        self.lookup_contact(d)
            .await
            .and_then(|c| c.phone)
            .and_then(|p| entities::normalize_phone(&p))
    }

    /// Contact named in the request (contact name, else venue).
    async fn lookup_contact(&self, d: &Dispatch<'_>) -> Option<Contact> {
        let slots = &d.intent.entities;
        let name = slots
            .get(slot::CONTACT_NAME)
            .or_else(|| slots.get(slot::VENUE))?;
        match self.storage.contacts.find_by_name(d.user_id, name).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!("contact lookup for {name:?} failed: {e}");
                None
            }
        }
    }
}

fn missing(kind: ActionKind, what: &str) -> ActionResult {
    ActionResult::from_error(kind, &ExecutorError::Validation(what.to_string()))
}

/// "Jan (+316...)" when a name is known, else just the address.
fn recipient_label(d: &Dispatch<'_>, address: &str) -> String {
    match d.intent.entities.get(slot::CONTACT_NAME) {
        Some(name) => format!("{name} ({address})"),
        None => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use belt_core::intent::Step;

    fn plan_with(steps: &[ActionKind]) -> Plan {
        Plan {
            goal: "doel".into(),
            steps: steps
                .iter()
                .enumerate()
                .map(|(i, kind)| Step {
                    index: i as u32 + 1,
                    description: format!("stap {}", i + 1),
                    action_type: *kind,
                    estimated_duration: String::new(),
                    fallback: None,
                })
                .collect(),
            estimated_duration: String::new(),
            requires_confirmation: false,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_valid_paths() {
        let mut route = Route::new();
        route.advance(RouteState::Dispatching).unwrap();
        route
            .advance(RouteState::Executing(ActionKind::Browser))
            .unwrap();
        route.advance(RouteState::Executing(ActionKind::Call)).unwrap();
        route.advance(RouteState::Synthesizing).unwrap();
        route.advance(RouteState::Done).unwrap();
        assert_eq!(route.trail().len(), 6);
        assert_eq!(route.state(), RouteState::Done);

        let mut gated = Route::new();
        gated.advance(RouteState::Confirming).unwrap();
        gated.advance(RouteState::Synthesizing).unwrap();
        gated.advance(RouteState::Done).unwrap();
    }

    #[test]
    fn test_invalid_transitions() {
        use RouteState::*;
        assert!(validate_transition(Analyzing, Executing(ActionKind::Call)).is_err());
        assert!(validate_transition(Clarifying, Dispatching).is_err());
        assert!(validate_transition(Confirming, Dispatching).is_err());
        assert!(validate_transition(Done, Analyzing).is_err());
        // Only a failed browser task may fall back, and only to voice.
        assert!(
            validate_transition(Executing(ActionKind::Call), Executing(ActionKind::Browser))
                .is_err()
        );
        assert!(
            validate_transition(Executing(ActionKind::Browser), Executing(ActionKind::Sms))
                .is_err()
        );
    }

    #[test]
    fn test_route_keeps_state_on_error() {
        let mut route = Route::new();
        let err = route.advance(RouteState::Done).unwrap_err();
        assert_eq!(err.to_string(), "invalid route transition: analyzing -> done");
        assert_eq!(route.state(), RouteState::Analyzing);
        assert_eq!(route.trail(), &[RouteState::Analyzing]);
    }

    #[test]
    fn test_keyword_wins_over_intent() {
        let intent = Intent::new(IntentType::Reservation);
        let plan = plan_with(&[ActionKind::Browser]);
        assert_eq!(
            select_action("bel De Kas voor een tafel", &intent, &plan),
            ActionKind::Call
        );
        assert_eq!(
            select_action("Stuur een SMS naar Jan", &intent, &plan),
            ActionKind::Sms
        );
    }

    #[test]
    fn test_earliest_keyword_wins() {
        let intent = Intent::new(IntentType::Other);
        let plan = plan_with(&[]);
        assert_eq!(
            select_action("mail Jan over de afspraak", &intent, &plan),
            ActionKind::Email
        );
        assert_eq!(
            select_action("zet de afspraak in mijn agenda en mail Jan", &intent, &plan),
            ActionKind::Calendar
        );
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let intent = Intent::new(IntentType::Info);
        let plan = plan_with(&[]);
        // "belangrijk" and "Gmail" contain keywords but are not requests.
        assert_eq!(
            select_action("wat is belangrijk aan Gmail", &intent, &plan),
            ActionKind::Answer
        );
    }

    #[test]
    fn test_intent_then_plan_fallback() {
        let plan = plan_with(&[ActionKind::Browser, ActionKind::Call]);
        assert_eq!(
            select_action("plan iets", &Intent::new(IntentType::Calendar), &plan),
            ActionKind::Calendar
        );
        assert_eq!(
            select_action("reserveer een tafel", &Intent::new(IntentType::Reservation), &plan),
            ActionKind::Browser
        );
        assert_eq!(
            select_action("iets", &Intent::new(IntentType::Other), &plan_with(&[])),
            ActionKind::Answer
        );
    }
}
