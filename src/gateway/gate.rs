//! Clarification and confirmation gate.
//!
//! Pure decision logic over the analyzer's output. Clarification is checked
//! first: a confirmation prompt is useless while required data is missing.

use belt_core::intent::{slot, ActionKind, Entities, Intent, IntentType, Plan};

/// What to do with an analysed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Ask these questions and do not dispatch.
    Clarify(Vec<String>),
    /// Ask for a yes/no and do not dispatch.
    Confirm { prompt: String },
    Dispatch,
}

/// Decide between clarification, confirmation and dispatch.
///
/// `selected` is the action the router would dispatch to; its slot
/// requirements and cost apply even when the model labelled the intent
/// differently.
pub fn evaluate(
    intent: &Intent,
    plan: &Plan,
    selected: ActionKind,
    confirmed: bool,
    max_questions: usize,
) -> GateDecision {
    let questions = merge_questions(
        &intent.clarification_questions,
        missing_slot_questions(intent.kind, selected, &intent.entities),
        max_questions,
    );
    if !questions.is_empty() {
        return GateDecision::Clarify(questions);
    }

    if !confirmed && requires_confirmation(intent, plan, selected) {
        return GateDecision::Confirm {
            prompt: confirmation_prompt(plan),
        };
    }

    GateDecision::Dispatch
}

/// A plan step that contacts someone counts too: a failed browser task may
/// fall back to it.
fn requires_confirmation(intent: &Intent, plan: &Plan, selected: ActionKind) -> bool {
    plan.requires_confirmation
        || intent.kind.requires_confirmation()
        || selected.is_irreversible()
        || plan.steps.iter().any(|s| s.action_type.is_irreversible())
}

/// Rule-based questions for slots the request cannot do without.
pub fn missing_slot_questions(
    kind: IntentType,
    selected: ActionKind,
    entities: &Entities,
) -> Vec<String> {
    let mut questions = Vec::new();
    let mut ask = |missing: bool, question: &str| {
        if missing {
            questions.push(question.to_string());
        }
    };

    let has = |key: &str| entities.has(key);
    let has_recipient = has(slot::PHONE) || has(slot::CONTACT_NAME);

    if kind == IntentType::Call || selected == ActionKind::Call {
        ask(
            !has_recipient && !has(slot::VENUE),
            "Wie wil je bellen? Geef een naam of telefoonnummer.",
        );
    }
    if kind == IntentType::Sms || selected == ActionKind::Sms {
        ask(!has_recipient, "Naar wie wil je de sms sturen?");
        ask(!has(slot::MESSAGE_BODY), "Wat moet er in de sms staan?");
    }
    if kind == IntentType::Mail || selected == ActionKind::Email {
        ask(
            !has(slot::EMAIL) && !has(slot::CONTACT_NAME),
            "Naar wie wil je de e-mail sturen?",
        );
        ask(!has(slot::SUBJECT), "Wat is het onderwerp van de e-mail?");
        ask(!has(slot::MESSAGE_BODY), "Wat moet er in de e-mail staan?");
    }
    if kind == IntentType::Calendar || selected == ActionKind::Calendar {
        ask(
            !has(slot::DATE) && !has(slot::EVENT_START),
            "Op welke datum (en hoe laat) is de afspraak?",
        );
    }
    if kind == IntentType::Reservation {
        ask(!has(slot::VENUE), "Bij welk restaurant wil je reserveren?");
        ask(!has(slot::DATE), "Voor welke datum wil je reserveren?");
        ask(!has(slot::TIME), "Hoe laat wil je reserveren?");
        ask(!has(slot::PARTY_SIZE), "Voor hoeveel personen?");
    }
    questions
}

/// Model questions first, then rule questions; case-insensitive dedup, capped.
pub fn merge_questions(model: &[String], rules: Vec<String>, cap: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for question in model.iter().cloned().chain(rules) {
        if merged.len() >= cap {
            break;
        }
        let question = question.trim().to_string();
        if question.is_empty() {
            continue;
        }
        let lowered = question.to_lowercase();
        if merged.iter().any(|q| q.to_lowercase() == lowered) {
            continue;
        }
        merged.push(question);
    }
    merged
}

/// Yes/no prompt built from the plan.
pub fn confirmation_prompt(plan: &Plan) -> String {
    let mut prompt = format!("Ik ga het volgende doen:\n🎯 {}\n", plan.goal);
    for step in &plan.steps {
        prompt.push_str(&format!("{}. {}\n", step.index, step.description));
    }
    if !plan.estimated_duration.is_empty() {
        prompt.push_str(&format!("⏱️ Geschatte duur: {}\n", plan.estimated_duration));
    }
    for warning in &plan.warnings {
        prompt.push_str(&format!("⚠️ {warning}\n"));
    }
    prompt.push_str("\nZal ik doorgaan? (ja/nee)");
    prompt
}
