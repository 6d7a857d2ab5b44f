//! Guided multi-turn slot filling for one action.
//!
//! Each action kind has a fixed list of steps. Contact input is looked up in
//! the user's directory; a contact without the needed phone number or e-mail
//! address detours through an extra step that asks for it. Confirming the
//! last step dispatches directly: the wizard itself is the confirmation.

use super::{
    entities::{looks_like_email, normalize_phone, parse_datetime},
    pipeline::{is_no, is_yes},
    router::{Dispatch, Route, RouteState},
    Gateway,
};
use belt_core::{
    action::Contact,
    intent::{slot, ActionKind, Intent, IntentType, Plan, Step},
    message::{ChatContext, Reply},
    session::{WizardSlots, WizardState, WizardStep},
};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use WizardStep::*;

const CALL_STEPS: &[WizardStep] = &[SelectContact, EnterMessage, Confirm];
const SMS_STEPS: &[WizardStep] = &[SelectContact, EnterMessage, Confirm];
const EMAIL_STEPS: &[WizardStep] = &[SelectContact, EnterSubject, EnterMessage, Confirm];
const CALENDAR_STEPS: &[WizardStep] = &[EnterTitle, EnterDatetime, Confirm];

/// The fixed step list of an action kind. Empty when the kind has no wizard.
pub fn steps_for(kind: ActionKind) -> &'static [WizardStep] {
    match kind {
        ActionKind::Call => CALL_STEPS,
        ActionKind::Sms => SMS_STEPS,
        ActionKind::Email => EMAIL_STEPS,
        ActionKind::Calendar => CALENDAR_STEPS,
        ActionKind::Browser | ActionKind::Answer => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(WizardStep),
    Complete,
}

/// Move past `current`. Detour steps resume after contact selection.
pub fn advance(kind: ActionKind, current: WizardStep) -> Advance {
    let current = match current {
        EnterPhone | EnterEmail => SelectContact,
        other => other,
    };
    let steps = steps_for(kind);
    match steps.iter().position(|s| *s == current) {
        Some(i) if i + 1 < steps.len() => Advance::Next(steps[i + 1]),
        _ => Advance::Complete,
    }
}

pub fn is_expired(state: &WizardState, timeout_secs: u64, now: DateTime<Utc>) -> bool {
    (now - state.started_at).num_seconds() > timeout_secs as i64
}

/// What to ask at a step.
pub fn prompt_for(kind: ActionKind, step: WizardStep, slots: &WizardSlots) -> String {
    let name = slots.contact_name.as_deref().unwrap_or("dit contact");
    match step {
        SelectContact => match kind {
            ActionKind::Email => {
                "📧 Naar wie wil je mailen? Geef een naam uit je contacten of een e-mailadres."
                    .to_string()
            }
            ActionKind::Sms => {
                "💬 Naar wie wil je een sms sturen? Geef een naam uit je contacten of een telefoonnummer."
                    .to_string()
            }
            _ => "📞 Wie wil je bellen? Geef een naam uit je contacten of een telefoonnummer."
                .to_string(),
        },
        EnterPhone => format!("Ik heb geen telefoonnummer van {name}. Wat is het nummer?"),
        EnterEmail => format!("Ik heb geen e-mailadres van {name}. Wat is het adres?"),
        EnterSubject => "Wat is het onderwerp van de e-mail?".to_string(),
        EnterMessage if kind == ActionKind::Call => {
            "Wat moet ik tijdens het gesprek vragen of regelen?".to_string()
        }
        EnterMessage => "Wat moet er in het bericht staan?".to_string(),
        EnterTitle => "📅 Hoe heet de afspraak?".to_string(),
        EnterDatetime => {
            "Wanneer is de afspraak? Bijvoorbeeld 2026-10-20 14:30 of 20-10-2026 14:30."
                .to_string()
        }
        Confirm => format!("{}\n\nKlopt dit? (ja/nee)", summary(kind, slots)),
    }
}

fn summary(kind: ActionKind, slots: &WizardSlots) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    let recipient = |address: &Option<String>| match (&slots.contact_name, address) {
        (Some(name), Some(addr)) => format!("{name} ({addr})"),
        (None, Some(addr)) => addr.clone(),
        (Some(name), None) => name.clone(),
        (None, None) => String::new(),
    };
    match kind {
        ActionKind::Call => format!(
            "📞 Bellen naar {}\nDoel: {}",
            recipient(&slots.phone),
            field(&slots.message_body)
        ),
        ActionKind::Sms => format!(
            "💬 SMS naar {}\nBericht: {}",
            recipient(&slots.phone),
            field(&slots.message_body)
        ),
        ActionKind::Email => format!(
            "📧 E-mail naar {}\nOnderwerp: {}\nBericht: {}",
            recipient(&slots.email),
            field(&slots.subject),
            field(&slots.message_body)
        ),
        _ => format!(
            "📅 Afspraak: {}\nWanneer: {}",
            field(&slots.event_title),
            field(&slots.event_datetime)
        ),
    }
}

/// Intent and plan equivalent to the collected slots.
fn compose(kind: ActionKind, slots: &WizardSlots) -> (String, Intent, Plan) {
    let intent_kind = match kind {
        ActionKind::Call => IntentType::Call,
        ActionKind::Sms => IntentType::Sms,
        ActionKind::Email => IntentType::Mail,
        _ => IntentType::Calendar,
    };
    let mut intent = Intent::new(intent_kind);
    for (key, value) in [
        (slot::CONTACT_NAME, &slots.contact_name),
        (slot::PHONE, &slots.phone),
        (slot::EMAIL, &slots.email),
        (slot::SUBJECT, &slots.subject),
        (slot::MESSAGE_BODY, &slots.message_body),
        (slot::EVENT_TITLE, &slots.event_title),
        (slot::EVENT_START, &slots.event_datetime),
    ] {
        if let Some(value) = value {
            intent.entities.insert(key, value.as_str());
        }
    }

    let task = summary(kind, slots).replace('\n', ". ");
    let description = match kind {
        ActionKind::Call => slots.message_body.clone().unwrap_or_else(|| task.clone()),
        _ => task.clone(),
    };
    let plan = Plan {
        goal: task.clone(),
        steps: vec![Step {
            index: 1,
            description,
            action_type: kind,
            estimated_duration: String::new(),
            fallback: None,
        }],
        estimated_duration: String::new(),
        requires_confirmation: false,
        warnings: Vec::new(),
    };
    (task, intent, plan)
}

/// Outcome of feeding one input to the current step.
enum StepInput {
    Accept(WizardStep),
    /// Accepted, but the flow continues at a detour step.
    Detour(WizardStep),
    Reject(&'static str),
}

impl Gateway {
    /// Start a wizard, replacing any active one.
    pub(super) async fn start_wizard(
        &self,
        user_id: &str,
        chat: &ChatContext,
        kind: ActionKind,
    ) -> Reply {
        let Some(first) = steps_for(kind).first().copied() else {
            return Reply::text("Voor deze actie is geen stap-voor-stap flow beschikbaar.");
        };
        let state = WizardState {
            action_type: kind,
            current_step: first,
            user_id: user_id.to_string(),
            chat_context: chat.clone(),
            started_at: Utc::now(),
            slots: WizardSlots::default(),
        };
        let prompt = prompt_for(kind, first, &state.slots);
        match self.storage.sessions.take_confirmation(user_id).await {
            Ok(Some(pending)) => info!("pending request {} dropped for wizard {kind}", pending.token),
            Ok(None) => {}
            Err(e) => warn!("failed to clear pending confirmation for {user_id}: {e}"),
        }
        if let Err(e) = self.storage.sessions.put_wizard(state).await {
            warn!("failed to store wizard for {user_id}: {e}");
            return Reply::text("Ik kon de flow niet starten. Probeer het later opnieuw.");
        }
        info!("wizard {kind} started for {user_id}");
        Reply::text(format!("{prompt}\n(typ /cancel om te stoppen)"))
    }

    /// Feed one input to the user's active wizard.
    pub(super) async fn continue_wizard(&self, mut state: WizardState, text: &str) -> Reply {
        let kind = state.action_type;
        let input = text.trim();

        if state.current_step == Confirm {
            if is_yes(input) {
                self.remove_wizard(&state.user_id).await;
                return self.dispatch_wizard(&state).await;
            }
            if is_no(input) {
                self.remove_wizard(&state.user_id).await;
                return Reply::text("Oké, geannuleerd.");
            }
            return Reply::text(prompt_for(kind, Confirm, &state.slots));
        }

        let next = match self.accept_input(&mut state, input).await {
            StepInput::Reject(message) => return Reply::text(message),
            StepInput::Detour(step) => step,
            StepInput::Accept(step) => match advance(kind, step) {
                Advance::Next(step) => step,
                Advance::Complete => Confirm,
            },
        };

        state.current_step = next;
        let prompt = prompt_for(kind, next, &state.slots);
        if let Err(e) = self.storage.sessions.put_wizard(state).await {
            warn!("failed to store wizard progress: {e}");
        }
        Reply::text(prompt)
    }

    async fn accept_input(&self, state: &mut WizardState, input: &str) -> StepInput {
        let step = state.current_step;
        let slots = &mut state.slots;
        match step {
            SelectContact if input.is_empty() => {
                StepInput::Reject("Geef een naam, telefoonnummer of e-mailadres.")
            }
            SelectContact if state.action_type == ActionKind::Email => {
                if looks_like_email(input) {
                    slots.email = Some(input.to_string());
                    return StepInput::Accept(step);
                }
                let contact = self.find_contact(&state.user_id, input).await;
                slots.contact_name = Some(
                    contact
                        .as_ref()
                        .map_or_else(|| input.to_string(), |c| c.name.clone()),
                );
                match contact.and_then(|c| c.email).filter(|e| looks_like_email(e)) {
                    Some(email) => {
                        slots.email = Some(email);
                        StepInput::Accept(step)
                    }
                    None => StepInput::Detour(EnterEmail),
                }
            }
            SelectContact => {
                if let Some(phone) = normalize_phone(input) {
                    slots.phone = Some(phone);
                    return StepInput::Accept(step);
                }
                let contact = self.find_contact(&state.user_id, input).await;
                slots.contact_name = Some(
                    contact
                        .as_ref()
                        .map_or_else(|| input.to_string(), |c| c.name.clone()),
                );
                match contact
                    .and_then(|c| c.phone)
                    .and_then(|p| normalize_phone(&p))
                {
                    Some(phone) => {
                        slots.phone = Some(phone);
                        StepInput::Accept(step)
                    }
                    None => StepInput::Detour(EnterPhone),
                }
            }
            EnterPhone => match normalize_phone(input) {
                Some(phone) => {
                    slots.phone = Some(phone);
                    StepInput::Accept(step)
                }
                None => StepInput::Reject(
                    "Dat lijkt geen geldig telefoonnummer. Probeer het opnieuw, bijvoorbeeld +31612345678.",
                ),
            },
            EnterEmail => {
                if looks_like_email(input) {
                    slots.email = Some(input.to_string());
                    StepInput::Accept(step)
                } else {
                    StepInput::Reject(
                        "Dat lijkt geen geldig e-mailadres. Probeer het opnieuw, bijvoorbeeld naam@voorbeeld.nl.",
                    )
                }
            }
            EnterDatetime => match parse_datetime(input) {
                Some(when) => {
                    slots.event_datetime = Some(when.format("%Y-%m-%d %H:%M").to_string());
                    StepInput::Accept(step)
                }
                None => StepInput::Reject(
                    "Die datum begrijp ik niet. Gebruik bijvoorbeeld 2026-10-20 14:30.",
                ),
            },
            _ if input.is_empty() => StepInput::Reject("Dit mag niet leeg zijn. Probeer het opnieuw."),
            EnterSubject => {
                slots.subject = Some(input.to_string());
                StepInput::Accept(step)
            }
            EnterMessage => {
                slots.message_body = Some(input.to_string());
                StepInput::Accept(step)
            }
            EnterTitle => {
                slots.event_title = Some(input.to_string());
                StepInput::Accept(step)
            }
            Confirm => StepInput::Accept(step),
        }
    }

    async fn find_contact(&self, user_id: &str, name: &str) -> Option<Contact> {
        match self.storage.contacts.find_by_name(user_id, name).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!("contact lookup for {name:?} failed: {e}");
                None
            }
        }
    }

    async fn remove_wizard(&self, user_id: &str) {
        if let Err(e) = self.storage.sessions.remove_wizard(user_id).await {
            warn!("failed to remove wizard for {user_id}: {e}");
        }
    }

    async fn dispatch_wizard(&self, state: &WizardState) -> Reply {
        let kind = state.action_type;
        let (task, intent, plan) = compose(kind, &state.slots);
        info!("wizard {kind} confirmed by {}", state.user_id);

        let dispatch = Dispatch {
            user_id: &state.user_id,
            chat: &state.chat_context,
            text: &task,
            intent: &intent,
            plan: &plan,
            preferences: &[],
        };
        let mut route = Route::new();
        let outcome = match route.advance(RouteState::Dispatching) {
            Ok(()) => self.dispatch(&mut route, &dispatch, kind, true).await,
            Err(e) => Err(e),
        };
        outcome.unwrap_or_else(|e| {
            error!("wizard dispatch for {}: {e}", state.user_id);
            Reply::text("Er ging iets mis bij het uitvoeren. Probeer het opnieuw.")
        })
    }
}
