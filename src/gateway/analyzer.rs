//! Model-backed analysis: intent classification, plan creation, preference
//! capture and direct answers. Every call degrades to a safe default when
//! the model is unreachable or its reply cannot be decoded.

use super::{decode::decode, entities, Gateway};
use belt_core::{
    context::Context,
    error::BeltError,
    intent::{Intent, Plan},
};
use chrono::Local;
use tracing::{debug, warn};

/// First line of the intent prompt.
pub(super) const INTENT_HEADER: &str = "You classify requests for a Dutch personal assistant.";

/// First line of the plan prompt.
pub(super) const PLAN_HEADER: &str = "You turn a request into an execution plan.";

/// First line of the preference prompt.
pub(super) const PREFERENCES_HEADER: &str = "You extract lasting user preferences.";

const MAX_PREFERENCES: usize = 10;

fn today() -> String {
    Local::now().format("%A %Y-%m-%d").to_string()
}

fn intent_prompt() -> String {
    format!(
        "{INTENT_HEADER}\n\
         The assistant can place phone calls, send SMS and e-mail, create calendar \
         events, perform web tasks and answer questions. Today is {}.\n\n\
         Reply with ONLY a JSON object:\n\
         {{\"type\": \"call|sms|mail|calendar|reservation|info|purchase|other\", \
         \"entities\": {{\"phone\": \"\", \"email\": \"\", \"contact_name\": \"\", \
         \"message_body\": \"\", \"subject\": \"\", \"date\": \"YYYY-MM-DD\", \
         \"time\": \"HH:MM\", \"party_size\": \"\", \"venue\": \"\", \
         \"event_title\": \"\", \"event_start\": \"YYYY-MM-DD HH:MM\", \
         \"event_end\": \"YYYY-MM-DD HH:MM\"}}, \
         \"urgency\": \"high|normal|low\", \"needs_clarification\": false, \
         \"clarification_questions\": []}}\n\n\
         Only include entities that are stated or clearly implied; resolve relative \
         dates against today. Ask clarification questions (in Dutch, at most 3) only \
         for information without which the request cannot be carried out.",
        today()
    )
}

fn plan_prompt(preferences: &[(String, String)]) -> String {
    let mut prompt = format!(
        "{PLAN_HEADER}\n\
         Today is {}. Available action types: call (phone call), sms, email, \
         calendar, browser (web task), answer (reply from own knowledge).\n\n\
         Reply with ONLY a JSON object:\n\
         {{\"goal\": \"\", \"steps\": [{{\"index\": 1, \"description\": \"\", \
         \"action_type\": \"browser\", \"estimated_duration\": \"\", \"fallback\": null}}], \
         \"estimated_duration\": \"\", \"requires_confirmation\": false, \"warnings\": []}}\n\n\
         Set requires_confirmation to true when the plan costs money, books something \
         or contacts another person. Write goal, descriptions and warnings in Dutch.",
        today()
    );
    append_preferences(&mut prompt, preferences);
    prompt
}

fn preferences_prompt() -> String {
    format!(
        "{PREFERENCES_HEADER}\n\
         Look for things worth remembering about the user: favourite restaurants, \
         dietary wishes, usual party size, preferred times, home city.\n\
         Reply with one `key: value` per line using snake_case keys, or `none`."
    )
}

fn append_preferences(prompt: &mut String, preferences: &[(String, String)]) {
    if preferences.is_empty() {
        return;
    }
    prompt.push_str("\n\nKnown preferences of this user:");
    for (key, value) in preferences {
        prompt.push_str(&format!("\n- {key}: {value}"));
    }
}

/// Parse `key: value` lines. Keys become snake_case; anything else is skipped.
pub fn parse_preferences(reply: &str) -> Vec<(String, String)> {
    reply
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(['-', '*']).trim();
            let (key, value) = line.split_once(':')?;
            let key = key
                .trim()
                .trim_matches('`')
                .to_lowercase()
                .replace([' ', '-'], "_");
            let value = value.trim().trim_matches('`').trim();
            let valid_key = !key.is_empty()
                && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            let empty = value.is_empty() || matches!(value.to_lowercase().as_str(), "none" | "geen");
            (valid_key && !empty).then(|| (key, value.to_string()))
        })
        .take(MAX_PREFERENCES)
        .collect()
}

impl Gateway {
    /// Classify a request. Falls back to a clarifying intent on any failure.
    pub(super) async fn analyze_intent(&self, text: &str) -> Intent {
        let mut ctx = Context::with_system(&intent_prompt(), text);
        ctx.max_tokens = Some(512);

        let mut intent = match self.provider.complete(&ctx).await {
            Ok(resp) => match decode::<Intent>(&resp.text) {
                Ok(intent) => intent,
                Err(e) => {
                    warn!("intent reply not usable: {e}");
                    Intent::fallback()
                }
            },
            Err(e) => {
                warn!("intent analysis failed: {e}");
                Intent::fallback()
            }
        };
        entities::enrich(&mut intent, text);
        debug!(
            "intent: {} with {} slot(s)",
            intent.kind.as_str(),
            intent.entities.iter().count()
        );
        intent
    }

    /// Build a plan. Falls back to a single-step plan on any failure.
    pub(super) async fn create_plan(&self, text: &str, preferences: &[(String, String)]) -> Plan {
        let ctx = Context::with_system(&plan_prompt(preferences), text);
        match self.provider.complete(&ctx).await {
            Ok(resp) => match decode::<Plan>(&resp.text) {
                Ok(plan) => plan.normalized(text),
                Err(e) => {
                    warn!("plan reply not usable: {e}");
                    Plan::fallback(text, &e.to_string())
                }
            },
            Err(e) => {
                warn!("planning failed: {e}");
                Plan::fallback(text, &e.to_string())
            }
        }
    }

    /// Extract and store preferences in the background. Never blocks or
    /// fails the request.
    pub(super) fn capture_preferences(&self, user_id: &str, text: &str) {
        let provider = self.provider.clone();
        let store = self.storage.preferences.clone();
        let user_id = user_id.to_string();
        let text = text.to_string();

        tokio::spawn(async move {
            let ctx = Context::with_system(&preferences_prompt(), &text);
            let reply = match provider.complete(&ctx).await {
                Ok(resp) => resp.text,
                Err(e) => {
                    warn!("preference extraction failed: {e}");
                    return;
                }
            };
            let preferences = parse_preferences(&reply);
            if preferences.is_empty() {
                return;
            }
            match store.store_preferences(&user_id, &preferences).await {
                Ok(()) => debug!("stored {} preference(s) for {user_id}", preferences.len()),
                Err(e) => warn!("failed to store preferences for {user_id}: {e}"),
            }
        });
    }

    /// Best-effort preference lookup.
    pub(super) async fn load_preferences(&self, user_id: &str) -> Vec<(String, String)> {
        match self.storage.preferences.get_preferences(user_id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("failed to load preferences for {user_id}: {e}");
                Vec::new()
            }
        }
    }

    /// Answer an informational request from the model's own knowledge.
    pub(super) async fn answer(
        &self,
        text: &str,
        preferences: &[(String, String)],
    ) -> Result<String, BeltError> {
        let mut ctx = Context::new(text);
        append_preferences(&mut ctx.system_prompt, preferences);
        let resp = self.provider.complete(&ctx).await?;
        Ok(resp.text.trim().to_string())
    }
}
