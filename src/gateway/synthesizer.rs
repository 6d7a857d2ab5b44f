//! Turns the outcome of a request into the user-facing reply.

use belt_core::{
    action::ActionResult,
    intent::{ActionKind, Intent, IntentType},
};

/// What happened to a request, in reply priority order.
#[derive(Debug, Clone, Copy)]
pub enum Synthesis<'a> {
    Clarify(&'a [String]),
    Confirm(&'a str),
    Executed {
        intent: &'a Intent,
        results: &'a [ActionResult],
    },
}

pub fn synthesize(input: Synthesis<'_>) -> String {
    match input {
        Synthesis::Clarify(questions) => clarification(questions),
        Synthesis::Confirm(prompt) => prompt.to_string(),
        Synthesis::Executed { intent, results } => {
            if let Some(answer) = direct_answer(intent, results) {
                return answer;
            }
            if results.is_empty() {
                return "Taak verwerkt.".to_string();
            }
            results
                .iter()
                .map(result_lines)
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

fn clarification(questions: &[String]) -> String {
    let mut text = String::from("Ik heb nog wat informatie nodig:");
    for (i, question) in questions.iter().enumerate() {
        text.push_str(&format!("\n{}. {question}", i + 1));
    }
    text
}

/// Prose from an informational request, passed through as-is.
fn direct_answer(intent: &Intent, results: &[ActionResult]) -> Option<String> {
    let [only] = results else {
        return None;
    };
    let informational = only.kind == ActionKind::Answer
        || (intent.kind == IntentType::Info && only.kind == ActionKind::Browser);
    if !informational || !only.success {
        return None;
    }
    only.text.clone().filter(|t| !t.trim().is_empty())
}

fn result_lines(result: &ActionResult) -> String {
    if result.success {
        return success_line(result);
    }

    let error = result.error.as_deref().unwrap_or("onbekende fout");
    let mut line = match result.kind {
        ActionKind::Call => {
            let attempts = result.attempts.unwrap_or(1);
            let noun = if attempts == 1 { "poging" } else { "pogingen" };
            format!("❌ Telefoongesprek mislukt na {attempts} {noun}: {error}")
        }
        ActionKind::Sms => format!("❌ SMS mislukt: {error}"),
        ActionKind::Email => format!("❌ E-mail mislukt: {error}"),
        ActionKind::Calendar => format!("❌ Afspraak inplannen mislukt: {error}"),
        ActionKind::Browser => format!("❌ Online taak mislukt: {error}"),
        ActionKind::Answer => format!("❌ Ik kon geen antwoord geven: {error}"),
    };
    if let Some(hint) = &result.hint {
        line.push_str(&format!("\n💡 {hint}"));
    }
    line
}

fn success_line(result: &ActionResult) -> String {
    let (icon, default) = match result.kind {
        ActionKind::Call => ("📞", "Gesprek gestart."),
        ActionKind::Sms => ("💬", "SMS verstuurd."),
        ActionKind::Email => ("📧", "E-mail verstuurd."),
        ActionKind::Calendar => ("📅", "Afspraak ingepland."),
        ActionKind::Browser => ("✅", "Online taak uitgevoerd."),
        ActionKind::Answer => return result.text.clone().unwrap_or_default(),
    };
    let text = result.text.as_deref().unwrap_or(default);
    match result.attempts {
        Some(n) if n > 1 => format!("{icon} {text} (na {n} pogingen)"),
        _ => format!("{icon} {text}"),
    }
}
